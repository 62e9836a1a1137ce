//! Logging setup
//!
//! Console output plus an optional `run.log` inside the run directory.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// debug > verbose > default > quiet
pub fn log_level(verbose: bool, debug: bool, quiet: bool) -> &'static str {
    if debug {
        "trace"
    } else if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
/// Keep the returned guard alive for as long as `run.log` should be written.
pub fn init_logging(level: &str, run_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("research_agency={}", level)));

    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match run_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, "run.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_writer(writer);

            Registry::default()
                .with(filter)
                .with(console)
                .with(file)
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            Registry::default().with(filter).with(console).try_init()?;
            Ok(None)
        }
    }
}
