use clap::Parser;
use retriever::{normalize_args, run, Cli};
use searchcore::SearchConfig;
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    // stdout carries the HTML page, keep logs off it
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    let config = SearchConfig::from_env();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let code = run(&cli, &config, &mut out, &mut std::io::stderr());
    if let Err(e) = out.flush() {
        tracing::error!(error = %e, "failed to flush results");
    }
    ExitCode::from(code)
}
