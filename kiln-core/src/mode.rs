//! Controller mode and direction of action

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Who owns the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    /// Output follows the manual output setting
    #[default]
    Manual,
    /// Output is computed by the PID law
    Automatic,
}

/// Sign of the controller action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// More output raises the process value (heating)
    #[default]
    Direct,
    /// More output lowers the process value (cooling)
    Reverse,
}

impl Direction {
    /// +1.0 for direct action, -1.0 for reverse
    #[inline]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Direct => 1.0,
            Self::Reverse => -1.0,
        }
    }

    /// The opposite direction
    #[inline]
    pub const fn inverted(self) -> Self {
        match self {
            Self::Direct => Self::Reverse,
            Self::Reverse => Self::Direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::Direct.sign(), 1.0);
        assert_eq!(Direction::Reverse.sign(), -1.0);
        assert_eq!(Direction::Direct.inverted(), Direction::Reverse);
        assert_eq!(Direction::Reverse.inverted().inverted(), Direction::Reverse);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Mode::default(), Mode::Manual);
        assert_eq!(Direction::default(), Direction::Direct);
    }
}
