use clap::Parser;
use indexer::{build_index, normalize_args, Cli};
use searchcore::SearchConfig;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        // usage errors exit 2, -help exits 0
        Err(e) => e.exit(),
    };
    let config = SearchConfig::from_env();

    match build_index(&cli.docs, &cli.index, &config) {
        Ok(report) => {
            eprintln!(
                "Indexed {} documents ({} failed) into {}",
                report.indexed,
                report.failed,
                cli.index.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "index build failed");
            ExitCode::from(1)
        }
    }
}
