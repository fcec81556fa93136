//! Build script for kiln-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates controller.toml at compile time
//! - Generates the default settings constants from it

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Tuning method names in `TuningMethod::ALL` order
const METHODS: [&str; 10] = [
    "ziegler_nichols_pi",
    "ziegler_nichols_pid",
    "tyreus_luyben_pi",
    "tyreus_luyben_pid",
    "ciancone_marlin_pi",
    "ciancone_marlin_pid",
    "pessen_integral_pid",
    "some_overshoot_pid",
    "no_overshoot_pid",
    "amigof_pi",
];

fn main() {
    setup_linker();
    let config = load_config();
    let defaults = validate_config(&config);
    write_defaults(&defaults);
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Read and parse controller.toml
fn load_config() -> toml::Value {
    println!("cargo:rerun-if-changed=controller.toml");

    let config_path = Path::new("controller.toml");
    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: controller.toml not found!                               ║\n\
            ║                                                                  ║\n\
            ║  The firmware requires a controller.toml file in the             ║\n\
            ║  kiln-firmware directory.                                        ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read controller.toml                           ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in controller.toml                   ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                {}\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&e.to_string())
            );
        }
    }
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Field reader that collects errors instead of stopping at the first
struct Reader<'a> {
    config: &'a toml::Value,
    errors: Vec<String>,
}

impl<'a> Reader<'a> {
    fn field(&mut self, section: &str, key: &str) -> Option<&'a toml::Value> {
        let config: &'a toml::Value = self.config;
        match config.get(section) {
            Some(toml::Value::Table(t)) => match t.get(key) {
                Some(value) => Some(value),
                None => {
                    self.errors.push(format!("[{}] missing '{}'", section, key));
                    None
                }
            },
            Some(_) => {
                self.errors.push(format!("[{}] must be a table", section));
                None
            }
            None => {
                self.errors.push(format!("Missing [{}] section", section));
                None
            }
        }
    }

    /// Number in `min..=max`, integers accepted
    fn number(&mut self, section: &str, key: &str, min: f64, max: f64) -> f64 {
        let value = match self.field(section, key) {
            Some(toml::Value::Float(v)) => *v,
            Some(toml::Value::Integer(v)) => *v as f64,
            Some(_) => {
                self.errors.push(format!("[{}] '{}' must be a number", section, key));
                return min;
            }
            None => return min,
        };
        if !(min..=max).contains(&value) {
            self.errors
                .push(format!("[{}] '{}' must be {}..={}", section, key, min, max));
        }
        value
    }

    /// Integer in `min..=max`
    fn integer(&mut self, section: &str, key: &str, min: i64, max: i64) -> i64 {
        let value = match self.field(section, key) {
            Some(toml::Value::Integer(v)) => *v,
            Some(_) => {
                self.errors.push(format!("[{}] '{}' must be an integer", section, key));
                return min;
            }
            None => return min,
        };
        if !(min..=max).contains(&value) {
            self.errors
                .push(format!("[{}] '{}' must be {}..={}", section, key, min, max));
        }
        value
    }

    fn boolean(&mut self, section: &str, key: &str) -> bool {
        match self.field(section, key) {
            Some(toml::Value::Boolean(v)) => *v,
            Some(_) => {
                self.errors.push(format!("[{}] '{}' must be true or false", section, key));
                false
            }
            None => false,
        }
    }

    /// Index of a string value within `choices`
    fn choice(&mut self, section: &str, key: &str, choices: &[&str]) -> usize {
        match self.field(section, key) {
            Some(toml::Value::String(s)) => match choices.iter().position(|c| c == s) {
                Some(i) => i,
                None => {
                    self.errors.push(format!(
                        "[{}] '{}' must be one of: {}",
                        section,
                        key,
                        choices.join(", ")
                    ));
                    0
                }
            },
            Some(_) => {
                self.errors.push(format!("[{}] '{}' must be a string", section, key));
                0
            }
            None => 0,
        }
    }
}

/// Validated values, already in fixed-point form
struct Defaults {
    constants: Vec<(&'static str, &'static str, String)>,
}

impl Defaults {
    fn push(&mut self, name: &'static str, ty: &'static str, value: impl ToString) {
        self.constants.push((name, ty, value.to_string()));
    }
}

/// Scale to a fixed-point raw value
fn raw(value: f64, decimals: u32) -> i64 {
    (value * 10f64.powi(decimals as i32)).round() as i64
}

/// Validate controller.toml and collect the constants
fn validate_config(config: &toml::Value) -> Defaults {
    let mut r = Reader {
        config,
        errors: Vec::new(),
    };
    let mut d = Defaults {
        constants: Vec::new(),
    };

    // Gains are FixedDecimal<3>, everything else in percent or degrees
    // FixedDecimal<1>
    let gain_max = i32::MAX as f64 / 1000.0;
    d.push("KP_RAW", "i32", raw(r.number("controller", "kp", 0.0, gain_max), 3));
    d.push("KI_RAW", "i32", raw(r.number("controller", "ki", 0.0, gain_max), 3));
    d.push("KD_RAW", "i32", raw(r.number("controller", "kd", 0.0, gain_max), 3));
    let reverse = r.choice("controller", "direction", &["direct", "reverse"]) == 1;
    d.push("DIRECTION_REVERSE", "bool", reverse);
    let automatic = r.choice("controller", "mode", &["manual", "automatic"]) == 1;
    d.push("MODE_AUTOMATIC", "bool", automatic);
    d.push(
        "SAMPLE_TIME_MS",
        "u32",
        r.integer("controller", "sample_time_ms", 100, 60_000),
    );
    d.push(
        "SETPOINT_RAW",
        "i32",
        raw(r.number("controller", "setpoint", -200.0, 1_500.0), 1),
    );
    let output_min = r.number("controller", "output_min", 0.0, 100.0);
    let output_max = r.number("controller", "output_max", 0.0, 100.0);
    if output_min >= output_max {
        r.errors
            .push("[controller] output_min must be below output_max".to_string());
    }
    d.push("OUTPUT_MIN_RAW", "i32", raw(output_min, 1));
    d.push("OUTPUT_MAX_RAW", "i32", raw(output_max, 1));
    d.push(
        "MANUAL_OUTPUT_RAW",
        "i32",
        raw(r.number("controller", "manual_output", 0.0, 100.0), 1),
    );

    d.push("TUNE_METHOD", "usize", r.choice("autotune", "method", &METHODS));
    d.push(
        "TUNE_STEP_RAW",
        "i32",
        raw(r.number("autotune", "step", 0.1, 100.0), 1),
    );
    d.push(
        "TUNE_NOISE_BAND_RAW",
        "i32",
        raw(r.number("autotune", "noise_band", 0.0, 100.0), 3),
    );
    d.push(
        "TUNE_LOOKBACK_S",
        "u16",
        r.integer("autotune", "lookback_s", 1, 600),
    );
    d.push("TUNE_RELAY_BIAS", "bool", r.boolean("autotune", "relay_bias"));
    d.push("TUNE_ON_BOOT", "bool", r.boolean("autotune", "start_on_boot"));

    d.push(
        "THERMISTOR_NOMINAL_OHMS",
        "f64",
        format!("{:?}", r.number("thermistor", "nominal_ohms", 1.0, 1e7)),
    );
    d.push(
        "THERMISTOR_B",
        "f64",
        format!("{:?}", r.number("thermistor", "b_coefficient", 1.0, 1e5)),
    );
    d.push(
        "THERMISTOR_NOMINAL_CELSIUS",
        "f64",
        format!("{:?}", r.number("thermistor", "nominal_celsius", -50.0, 200.0)),
    );
    d.push(
        "THERMISTOR_REFERENCE_OHMS",
        "f64",
        format!("{:?}", r.number("thermistor", "reference_ohms", 1.0, 1e7)),
    );
    d.push(
        "THERMISTOR_CALIBRATION_RAW",
        "i32",
        raw(r.number("thermistor", "calibration", -50.0, 50.0), 1),
    );

    d.push(
        "SSR_WINDOW_RAW",
        "i32",
        raw(r.number("ssr", "window_s", 1.0, 600.0), 1),
    );
    d.push("SSR_INVERTED", "bool", r.boolean("ssr", "inverted"));

    d.push("TRIP_ENABLED", "bool", r.boolean("trip", "enabled"));
    let lower = r.number("trip", "lower", -200.0, 1_500.0);
    let upper = r.number("trip", "upper", -200.0, 1_500.0);
    if lower >= upper {
        r.errors.push("[trip] lower must be below upper".to_string());
    }
    d.push("TRIP_LOWER_RAW", "i32", raw(lower, 1));
    d.push("TRIP_UPPER_RAW", "i32", raw(upper, 1));
    d.push("TRIP_AUTO_RESET", "bool", r.boolean("trip", "auto_reset"));

    if !r.errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid controller.toml                                  ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            r.errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    println!("cargo:warning=controller.toml validated successfully");
    d
}

/// Write the constants to `$OUT_DIR/defaults.rs`
fn write_defaults(defaults: &Defaults) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let mut f = File::create(out_dir.join("defaults.rs")).unwrap();
    writeln!(f, "// Generated from controller.toml").unwrap();
    for (name, ty, value) in &defaults.constants {
        writeln!(f, "pub const {}: {} = {};", name, ty, value).unwrap();
    }
}
