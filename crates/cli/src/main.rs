//! sepcheck CLI - SEP conformance test runner.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use sepcheck_core::{Config, ResultStatus, RunStats, Sep, SepConfig, TestCatalog, TestResult};
use sepcheck_execution::{get_tests, run};
use sepcheck_seps::Fetcher;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sepcheck")]
#[command(about = "Conformance tests for Stellar anchor servers", long_about = None)]
struct Cli {
    /// Log debug output and print network calls
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests against a server
    Run {
        #[command(flatten)]
        target: Target,
        /// Print each result as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// List the tests a run would execute, dependencies included
    List {
        #[command(flatten)]
        target: Target,
    },
    /// List every known test
    Catalog {
        /// Also print the failures each test may report
        #[arg(long)]
        failure_modes: bool,
    },
}

#[derive(Args)]
struct Target {
    /// Home domain of the server under test
    #[arg(long)]
    home_domain: String,
    /// SEPs to test (e.g. 1 10 24)
    #[arg(long, num_args = 1.., required = true)]
    seps: Vec<Sep>,
    /// Only run tests whose group or assertion contains one of these
    #[arg(long, num_args = 1..)]
    search_strings: Vec<String>,
    /// JSON file with per-SEP configuration
    #[arg(long)]
    sep_config: Option<PathBuf>,
    /// Timeout for each request, in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

impl Target {
    fn config(&self) -> Result<Config> {
        let home_domain = Config::parse_home_domain(&self.home_domain)?;
        let mut config = Config::new(home_domain, self.seps.iter().copied())
            .with_request_timeout(Duration::from_secs(self.timeout_secs));

        if !self.search_strings.is_empty() {
            config = config.with_search_strings(self.search_strings.clone());
        }
        if let Some(path) = &self.sep_config {
            config = SepConfig::load(path)?
                .into_iter()
                .fold(config, Config::with_sep_config);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let fetcher = Arc::new(Fetcher::new()?);
    let catalog = Arc::new(sepcheck_seps::catalog(fetcher)?);

    match cli.command {
        Commands::Catalog { failure_modes } => {
            println!("Catalog ({})", catalog.len());
            for line in describe_catalog(&catalog, failure_modes) {
                println!("  {}", line);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List { target } => {
            let config = target.config()?;
            let tests = get_tests(&config, &catalog)?;

            println!("Tests ({})", tests.len());
            for test in tests {
                println!("  {}", test.id);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { target, json } => {
            let config = target.config()?;
            info!("Testing {} for {:?}", config.home_domain, config.seps);

            let mut results = Box::pin(run(config, catalog)?);
            let mut stats = RunStats::default();
            while let Some(result) = results.next().await {
                stats.record(&result);
                if json {
                    println!("{}", serde_json::to_string(&result)?);
                } else {
                    print_result(&result, cli.verbose);
                }
            }

            if !json {
                println!();
                println!(
                    "{} passed, {} failed, {} skipped ({} total)",
                    stats.passed,
                    stats.failed,
                    stats.skipped,
                    stats.total()
                );
            }
            Ok(if stats.all_passed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

/// One line per test in registration order, each followed by its declared
/// failure modes when asked for.
fn describe_catalog(catalog: &TestCatalog, failure_modes: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for test in catalog.list() {
        lines.push(test.id.to_string());
        if failure_modes {
            for mode in test.failure_modes.modes() {
                lines.push(format!("    {}: {}", mode.name, mode.template));
            }
        }
    }
    lines
}

fn print_result(result: &TestResult, verbose: bool) {
    let millis = result.duration.as_millis();
    println!("{} {} ({}ms)", format_status(&result.status), result.test, millis);

    if let ResultStatus::Failed(failure) = &result.status {
        println!("       {}: {}", failure.name, failure.text);
        if let (Some(expected), Some(actual)) = (&failure.expected, &failure.actual) {
            println!("       expected {}, got {}", expected, actual);
        }
    }

    if verbose {
        for call in &result.network_calls {
            let status = call
                .response
                .as_ref()
                .map(|response| response.status.to_string())
                .unwrap_or_else(|| "no response".to_string());
            println!("       {} {} -> {}", call.request.method, call.request.url, status);
        }
    }
}

fn format_status(status: &ResultStatus) -> &'static str {
    match status {
        ResultStatus::Passed => "PASS",
        ResultStatus::Failed(_) => "FAIL",
        ResultStatus::Skipped => "SKIP",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::try_parse_from([
            "sepcheck",
            "run",
            "--home-domain",
            "anchor.test",
            "--seps",
            "1",
            "sep10",
            "--search-strings",
            "toml",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Run { target, json } = cli.command else { panic!("expected run") };
        assert!(!json);
        assert_eq!(target.seps, vec![Sep::Sep1, Sep::Sep10]);

        let config = target.config().unwrap();
        assert_eq!(config.home_domain.as_str(), "https://anchor.test/");
        assert_eq!(config.search_strings, Some(vec!["toml".to_string()]));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_seps_are_required() {
        assert!(Cli::try_parse_from(["sepcheck", "list", "--home-domain", "anchor.test"]).is_err());
        let unknown = ["sepcheck", "list", "--home-domain", "a.test", "--seps", "99"];
        assert!(Cli::try_parse_from(unknown).is_err());
    }

    #[test]
    fn test_format_status() {
        assert_eq!(format_status(&ResultStatus::Passed), "PASS");
        assert_eq!(format_status(&ResultStatus::Skipped), "SKIP");
    }

    #[test]
    fn test_describe_catalog() {
        let fetcher = Arc::new(Fetcher::new().unwrap());
        let catalog = sepcheck_seps::catalog(fetcher).unwrap();

        let tests = describe_catalog(&catalog, false);
        assert_eq!(tests.len(), catalog.len());
        assert_eq!(tests[0], catalog.list()[0].id.to_string());

        let detailed = describe_catalog(&catalog, true);
        assert!(detailed.len() > tests.len());
        assert!(detailed.iter().any(|line| line.starts_with("    CONNECTION_ERROR: ")));

        let cli = Cli::try_parse_from(["sepcheck", "catalog", "--failure-modes"]).unwrap();
        assert!(matches!(cli.command, Commands::Catalog { failure_modes: true }));
    }
}
