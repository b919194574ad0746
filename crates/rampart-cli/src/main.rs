//! `rampart` command line
//!
//! - `simulate`: run the reference resilience scenarios on a virtual clock
//! - `config`: print the effective configuration

mod simulator;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use rampart_core::ResilienceConfig;
use simulator::{run_simulator, Scenario, SimulatorConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rampart", version, about = "Client-side fault recovery toolkit")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run reference scenarios on a paused clock
    Simulate {
        /// Scenario to run
        #[arg(long, value_enum, default_value_t = ScenarioArg::All)]
        scenario: ScenarioArg,

        /// Seed for jitter
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config {
        /// Configuration file (.toml, .yaml, .yml or .json)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScenarioArg {
    A,
    B,
    C,
    D,
    All,
}

impl ScenarioArg {
    fn scenarios(self) -> Vec<Scenario> {
        match self {
            Self::A => vec![Scenario::A],
            Self::B => vec![Scenario::B],
            Self::C => vec![Scenario::C],
            Self::D => vec![Scenario::D],
            Self::All => Scenario::ALL.to_vec(),
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ResilienceConfig> {
    match path {
        Some(path) => ResilienceConfig::from_path(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(ResilienceConfig::default()),
    }
}

fn render_config(config: &ResilienceConfig, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(config)?)
    } else {
        Ok(toml::to_string_pretty(config)?)
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Simulate {
            scenario,
            seed,
            json,
        } => {
            let config = SimulatorConfig {
                seed,
                scenarios: scenario.scenarios(),
            };
            tracing::info!(seed, scenarios = config.scenarios.len(), "running simulator");

            let report = run_simulator(&config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }
            Ok(if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Config { path, json } => {
            let config = load_config(path.as_deref())?;
            println!("{}", render_config(&config, json)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    run(cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn simulate_defaults_to_all_scenarios() {
        let cli = Cli::try_parse_from(["rampart", "simulate"]).unwrap();
        match cli.command {
            Command::Simulate { scenario, seed, .. } => {
                assert_eq!(scenario.scenarios(), Scenario::ALL.to_vec());
                assert_eq!(seed, 42);
            }
            Command::Config { .. } => panic!("parsed the wrong subcommand"),
        }
    }

    #[test]
    fn log_format_is_global() {
        let cli =
            Cli::try_parse_from(["rampart", "config", "--json", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[context]\ncapacity = 25").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.context.capacity, 25);
        assert_eq!(config.stream, ResilienceConfig::default().stream);
    }

    #[test]
    fn rendered_config_parses_back() {
        let config = ResilienceConfig::default();
        let rendered = render_config(&config, false).unwrap();
        assert_eq!(ResilienceConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
