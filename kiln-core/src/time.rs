//! Wrap-tolerant millisecond arithmetic
//!
//! The controller runs on a free-running `u32` millisecond counter that
//! wraps roughly every 49.7 days. All interval checks go through these
//! helpers so that a wrap never stalls the loop or fires a timeout early.

/// Milliseconds elapsed from `since` to `now`, modulo 2^32
#[inline]
pub const fn elapsed(now_ms: u32, since_ms: u32) -> u32 {
    now_ms.wrapping_sub(since_ms)
}

/// Deadline `delay_ms` after `now_ms`
#[inline]
pub const fn deadline(now_ms: u32, delay_ms: u32) -> u32 {
    now_ms.wrapping_add(delay_ms)
}

/// Check whether `deadline_ms` has been reached
///
/// Uses the sign bit of the wrapped difference, so deadlines up to 2^31 ms
/// in the future or past are ordered correctly.
#[inline]
pub const fn reached(now_ms: u32, deadline_ms: u32) -> bool {
    (now_ms.wrapping_sub(deadline_ms) as i32) >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_across_wrap() {
        assert_eq!(elapsed(10, u32::MAX - 9), 20);
        assert_eq!(elapsed(1_000, 250), 750);
    }

    #[test]
    fn test_reached() {
        let due = deadline(u32::MAX - 5, 10);
        assert_eq!(due, 4);
        assert!(!reached(u32::MAX, due));
        assert!(reached(4, due));
        assert!(reached(100, due));
    }
}
