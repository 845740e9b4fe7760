use clap::{Parser, ValueEnum};
use image_fault_injector::prelude::*;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
/// Injection mode names accepted in config files and on the command line
pub enum ModeName {
    Full,
    Partial,
    Randomized,
}

/// Configuration structure that can be loaded from JSON5
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default = "Config::default_fault")]
    pub fault: String,
    #[serde(default = "Config::default_rate")]
    pub fault_rate: u32,
    #[serde(default)]
    pub mode: Option<ModeName>,
    #[serde(default)]
    pub randomize: bool,
    #[serde(default = "Config::default_rate")]
    pub implementation_rate: u32,
    #[serde(default)]
    pub first_n: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "Config::default_threads")]
    pub threads: usize,
    #[serde(default = "Config::default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub detail: bool,
}

impl Config {
    // Keep defaults in sync with CLI defaults
    fn default_fault() -> String {
        FaultKind::Gaussian.name().to_string()
    }

    fn default_rate() -> u32 {
        100
    }

    fn default_threads() -> usize {
        1
    }

    fn default_log_dir() -> PathBuf {
        PathBuf::from(DEFAULT_LOG_DIR)
    }

    /// Load configuration from JSON5 file
    pub fn from_file(path: &PathBuf) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        json5::from_str(&content).map_err(|e| format!("Failed to parse JSON5 config: {}", e))
    }

    /// Create Config from command line arguments
    pub fn from_args(args: &Args) -> Self {
        Self {
            source: args.source.clone(),
            destination: args.destination.clone(),
            fault: args
                .fault
                .map_or_else(Self::default_fault, |fault| fault.name().to_string()),
            fault_rate: args.fault_rate.unwrap_or_else(Self::default_rate),
            mode: args.mode,
            randomize: args.randomize,
            implementation_rate: args
                .implementation_rate
                .unwrap_or_else(Self::default_rate),
            first_n: args.first_n,
            seed: args.seed,
            threads: args.threads.unwrap_or_else(Self::default_threads),
            log_dir: args.log_dir.clone().unwrap_or_else(Self::default_log_dir),
            log_level: args.log_level.clone(),
            detail: args.detail,
        }
    }

    /// Override config values with command line arguments
    pub fn override_with_args(&mut self, args: &Args) {
        // Only override boolean flags if they're true (explicitly set by user)
        if args.randomize {
            self.randomize = true;
        }
        if args.first_n {
            self.first_n = true;
        }
        if args.detail {
            self.detail = true;
        }

        // Override options only if provided
        if args.source.is_some() {
            self.source = args.source.clone();
        }
        if args.destination.is_some() {
            self.destination = args.destination.clone();
        }
        if let Some(fault) = args.fault {
            self.fault = fault.name().to_string();
        }
        if let Some(rate) = args.fault_rate {
            self.fault_rate = rate;
        }
        if args.mode.is_some() {
            self.mode = args.mode;
        }
        if let Some(rate) = args.implementation_rate {
            self.implementation_rate = rate;
        }
        if let Some(threads) = args.threads {
            self.threads = threads;
        }
        if args.seed.is_some() {
            self.seed = args.seed;
        }
        if let Some(log_dir) = &args.log_dir {
            self.log_dir = log_dir.clone();
        }
        if args.log_level.is_some() {
            self.log_level = args.log_level.clone();
        }
    }

    /// Injection mode: an explicit `mode` wins over the randomize flag and
    /// the implementation rate.
    pub fn injection_mode(&self) -> Result<InjectionMode, String> {
        let mode = match self.mode {
            Some(ModeName::Full) => Ok(InjectionMode::Full),
            Some(ModeName::Randomized) => Ok(InjectionMode::Randomized),
            Some(ModeName::Partial) if (1..=100).contains(&self.implementation_rate) => {
                Ok(InjectionMode::PartialDeterministic {
                    implementation_rate: self.implementation_rate,
                })
            }
            Some(ModeName::Partial) => Err(InjectionError::InvalidPercentage(
                self.implementation_rate,
            )),
            None => InjectionMode::from_flags(self.randomize, self.implementation_rate),
        };
        mode.map_err(|e| e.to_string())
    }

    /// Build the run request described by this configuration
    pub fn to_request(&self) -> Result<RunRequest, String> {
        let source = self
            .source
            .clone()
            .ok_or("No source directory given (--source)")?;
        let destination = self
            .destination
            .clone()
            .ok_or("No destination directory given (--destination)")?;

        let mut request = RunRequest::new(
            source,
            destination,
            &self.fault,
            self.fault_rate,
            self.injection_mode()?,
        );
        request.threads = self.threads;
        request.detail = self.detail;
        if self.first_n {
            request.strategy = SelectionStrategy::FirstN;
        }
        Ok(request)
    }
}

/// Command-line arguments of the image fault injector.
///
/// Every option can also be given in a JSON5 file passed with `--config`;
/// options given on the command line win.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Load configuration from JSON5 file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Directory of normal images
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Output directory for the faulty data set (created if absent)
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// Fault to inject
    #[arg(short, long, value_enum, ignore_case = true)]
    pub fault: Option<FaultKind>,

    /// Fault rate in percent (1..=100)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub fault_rate: Option<u32>,

    /// Injection mode. Without it the mode follows --randomize and --implementation-rate
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeName>,

    /// Corrupt a random number of images
    #[arg(long, default_value_t = false)]
    pub randomize: bool,

    /// Percentage of images to corrupt (1..=100)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub implementation_rate: Option<u32>,

    /// Partial injection takes the first images in listing order instead of a random walk
    #[arg(long, default_value_t = false)]
    pub first_n: bool,

    /// Seed of the random source, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of threads writing images in parallel [default: 1]
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Directory of the fault injection logs
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace (default: RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,

    /// List the corrupted image names in the report
    #[arg(long, default_value_t = false)]
    pub detail: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Args {
        Args::parse_from(std::iter::once("image_fault_injector").chain(list.iter().copied()))
    }

    #[test]
    fn cli_builds_a_partial_request() {
        let config = Config::from_args(&args(&[
            "--source", "normal", "--destination", "faulty", "--fault", "e", "-r", "50", "-i", "30",
        ]));
        let request = config.to_request().unwrap();
        assert_eq!("Erosion", request.fault_name);
        assert_eq!(50, request.percentage);
        assert_eq!(
            InjectionMode::PartialDeterministic {
                implementation_rate: 30
            },
            request.mode
        );
        assert_eq!(SelectionStrategy::RandomWalk, request.strategy);
    }

    #[test]
    fn randomize_flag_wins_over_rate() {
        let config = Config::from_args(&args(&["-s", "a", "-d", "b", "--randomize", "-i", "30"]));
        assert_eq!(InjectionMode::Randomized, config.injection_mode().unwrap());
    }

    #[test]
    fn defaults_give_full_injection() {
        let config = Config::from_args(&args(&["-s", "a", "-d", "b"]));
        assert_eq!(InjectionMode::Full, config.injection_mode().unwrap());
        assert_eq!(PathBuf::from(DEFAULT_LOG_DIR), config.log_dir);
    }

    #[test]
    fn missing_destination_is_reported() {
        let config = Config::from_args(&args(&["-s", "a"]));
        assert!(config.to_request().is_err());
    }

    #[test]
    fn config_file_values_survive_absent_flags() {
        let mut config: Config =
            json5::from_str(r#"{ source: "a", destination: "b", threads: 4, detail: true }"#)
                .unwrap();
        config.override_with_args(&args(&["--config", "run.json5"]));
        assert_eq!(4, config.threads);
        assert!(config.detail);
        assert_eq!(1, Config::from_args(&args(&[])).threads);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let error = Config::from_file(&PathBuf::from("does/not/exist.json5")).unwrap_err();
        assert!(error.starts_with("Failed to read config file"));
    }

    #[test]
    fn json5_config_is_overridden_by_cli() {
        let mut config: Config = json5::from_str(
            r#"{
                // data set of the line camera
                source: "normal",
                destination: "faulty",
                fault: "Motion-blur",
                fault_rate: 40,
                mode: "partial",
                implementation_rate: 20,
                seed: 7,
            }"#,
        )
        .unwrap();
        config.override_with_args(&args(&["--fault", "gradient", "--first-n", "-t", "4"]));

        let request = config.to_request().unwrap();
        assert_eq!("Gradient", request.fault_name);
        assert_eq!(40, request.percentage);
        assert_eq!(4, request.threads);
        assert_eq!(SelectionStrategy::FirstN, request.strategy);
        assert_eq!(Some(7), config.seed);
    }
}
