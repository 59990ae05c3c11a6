//! Command-line front end of the `icesheet` executable.
//!
//! Options take a single dash, as in `icesheet -i start.bin -y 1000 -o
//! end.bin`. Any configuration parameter may be given the same way:
//! `-do_age` or `-maximum_time_step_years 5`. Before parsing, every
//! single-dash option is rewritten into the double-dash form `clap`
//! understands, and unrecognised names become `--set name=value`.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::cli::normalize_args;
//!
//! let args = ["icesheet", "-ys", "-1000", "-do_age", "-ssa_dirichlet_bc", "false"];
//! let normalized = normalize_args(args.iter().map(|s| s.to_string()));
//! assert_eq!(
//!     normalized,
//!     ["icesheet", "--ys=-1000", "--set", "do_age=true", "--set", "ssa_dirichlet_bc=false"]
//! );
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
#[cfg(feature = "mpi")]
use crate::grid::MpiComm;
use crate::grid::Communicator;
#[cfg(not(feature = "mpi"))]
use crate::grid::SerialComm;
use crate::simulation::{ExitCause, Model, Signals};

/// Options that take a value.
const VALUED: [&str; 7] = ["i", "y", "ys", "ye", "o", "config", "verbose"];

/// Options that take no value.
const SWITCHES: [&str; 4] = ["bootstrap", "options_left", "help", "version"];

/// Thermomechanically coupled ice-sheet model
#[derive(Debug, Parser)]
#[command(name = "icesheet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Thermomechanically coupled ice-sheet model", long_about = None)]
pub struct Cli {
    /// State file to start from
    #[arg(long = "i", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Treat the input file as partial data and fill absent fields
    #[arg(long = "bootstrap")]
    pub bootstrap: bool,

    /// Run length, years
    #[arg(long = "y", value_name = "YEARS")]
    pub run_length: Option<f64>,

    /// Start year
    #[arg(long = "ys", value_name = "YEAR")]
    pub start_year: Option<f64>,

    /// End year
    #[arg(long = "ye", value_name = "YEAR")]
    pub end_year: Option<f64>,

    /// Output file
    #[arg(long = "o", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// TOML file of configuration parameters
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List options that were set but never used
    #[arg(long = "options_left")]
    pub options_left: bool,

    /// Verbosity: 1 warnings, 2 info, 3 debug, 4 trace
    #[arg(long = "verbose", value_name = "LEVEL", num_args = 0..=1, default_missing_value = "3")]
    pub verbose: Option<u8>,

    /// Configuration parameter as NAME=VALUE
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,
}

fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    Ok((name.to_string(), value.to_string()))
}

fn is_number(s: &str) -> bool {
    s.parse::<f64>().is_ok()
}

/// A token that can follow an option as its value.
fn is_value(s: &str) -> bool {
    !s.starts_with('-') || is_number(s)
}

/// Rewrite single-dash options into the form [`Cli`] parses.
///
/// The first item (the program name) passes through unchanged.
pub fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut iter = args.into_iter().peekable();
    let mut out: Vec<String> = iter.next().into_iter().collect();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") || !arg.starts_with('-') || is_number(&arg) {
            out.push(arg);
            continue;
        }
        let name = arg.trim_start_matches('-');
        let (name, inline) = match name.split_once('=') {
            Some((n, v)) => (n.to_string(), Some(v.to_string())),
            None => (name.to_string(), None),
        };
        if SWITCHES.contains(&name.as_str()) {
            out.push(format!("--{}", name));
        } else if VALUED.contains(&name.as_str()) {
            match inline.or_else(|| iter.next_if(|next| is_value(next))) {
                Some(value) => out.push(format!("--{}={}", name, value)),
                None => out.push(format!("--{}", name)),
            }
        } else {
            let value = inline
                .or_else(|| iter.next_if(|next| is_value(next)))
                .unwrap_or_else(|| "true".to_string());
            out.push("--set".to_string());
            out.push(format!("{}={}", name, value));
        }
    }
    out
}

/// Tracing level for a verbosity number.
pub fn verbosity_level(verbosity: i64) -> Level {
    match verbosity {
        i64::MIN..=1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

impl Cli {
    /// Parse the process arguments.
    pub fn from_env() -> Self {
        Self::parse_from(normalize_args(std::env::args()))
    }

    /// Build the configuration: defaults, then the TOML file, then
    /// `--set` assignments, then the dedicated options.
    pub fn to_config(&self) -> Result<Config> {
        let mut config = Config::defaults();
        if let Some(path) = &self.config {
            config
                .merge_toml_file(path)
                .with_context(|| format!("reading configuration file {}", path.display()))?;
        }
        for (name, value) in &self.set {
            config
                .set_from_str(name, value)
                .with_context(|| format!("option -{}", name))?;
        }
        if let Some(input) = &self.input {
            config.set_string("input_file", input.to_string_lossy().to_string())?;
        }
        if self.bootstrap {
            config.set_flag("bootstrap", true)?;
        }
        if let Some(y) = self.run_length {
            config.set_double("run_length_years", y)?;
        }
        if let Some(ys) = self.start_year {
            config.set_double("start_year", ys)?;
        }
        if let Some(ye) = self.end_year {
            config.set_double("end_year", ye)?;
        }
        if let Some(output) = &self.output {
            config.set_string("output_file", output.to_string_lossy().to_string())?;
        }
        if let Some(v) = self.verbose {
            config.set_integer("verbosity", i64::from(v))?;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `verbosity`.
pub fn init_logging(verbosity: i64) {
    let level = verbosity_level(verbosity);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn executable_name() -> String {
    std::env::args()
        .next()
        .and_then(|a| Path::new(&a).file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| "icesheet".to_string())
}

/// The communicator the executable runs on.
#[cfg(feature = "mpi")]
fn world() -> Result<Arc<dyn Communicator>> {
    Ok(Arc::new(MpiComm::init().context("initializing MPI")?))
}

#[cfg(not(feature = "mpi"))]
fn world() -> Result<Arc<dyn Communicator>> {
    Ok(Arc::new(SerialComm::new()))
}

/// Run the model as the executable does.
pub fn run(cli: Cli) -> Result<ExitCause> {
    let config = cli.to_config()?;
    init_logging(config.get_integer("verbosity")?);

    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let mut model = Model::with_comm(config, world()?)
        .context("initializing the model")?
        .with_signals(Signals::install()?)
        .with_executable(executable_name());
    model.note(&command_line);

    let summary = model.run().context("running the model")?;
    if cli.options_left {
        let left = model.config().options_left();
        if left.is_empty() {
            info!("every option set was used");
        }
        for name in left {
            warn!(option = %name, "option was set but never used");
        }
    }
    Ok(summary.exit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(args: &[&str]) -> Vec<String> {
        normalize_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_normalize_known_options() {
        assert_eq!(
            norm(&["icesheet", "-i", "in.bin", "-bootstrap", "-y", "100", "-o", "out.nc"]),
            ["icesheet", "--i=in.bin", "--bootstrap", "--y=100", "--o=out.nc"]
        );
        assert_eq!(norm(&["icesheet", "-verbose"]), ["icesheet", "--verbose"]);
        assert_eq!(norm(&["icesheet", "--set", "a=1"]), ["icesheet", "--set", "a=1"]);
    }

    #[test]
    fn test_normalize_parameters() {
        assert_eq!(
            norm(&["icesheet", "-sea_level", "-120", "-do_skip", "-y", "5"]),
            ["icesheet", "--set", "sea_level=-120", "--set", "do_skip=true", "--y=5"]
        );
        assert_eq!(norm(&["icesheet", "-skip_max=4"]), ["icesheet", "--set", "skip_max=4"]);
    }

    #[test]
    fn test_cli_to_config() {
        let cli = Cli::parse_from(norm(&[
            "icesheet",
            "-ys",
            "-500",
            "-y",
            "20",
            "-skip_max",
            "4",
            "-verbose",
            "1",
        ]));
        let config = cli.to_config().unwrap();
        assert_eq!(config.get_double("start_year").unwrap(), -500.0);
        assert_eq!(config.get_double("run_length_years").unwrap(), 20.0);
        assert_eq!(config.get_integer("skip_max").unwrap(), 4);
        assert_eq!(config.get_integer("verbosity").unwrap(), 1);
        assert!(!config.is_set("end_year"));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let cli = Cli::parse_from(norm(&["icesheet", "-no_such_option", "3"]));
        let err = cli.to_config().unwrap_err();
        assert!(err.to_string().contains("no_such_option"));
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(verbosity_level(1), Level::WARN);
        assert_eq!(verbosity_level(2), Level::INFO);
        assert_eq!(verbosity_level(3), Level::DEBUG);
        assert_eq!(verbosity_level(7), Level::TRACE);
    }
}
