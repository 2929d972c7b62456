use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod actions;
mod app;
mod detect;
mod paths;
mod picker;
mod project;
mod registry;
mod routine;
mod scanner;
mod sessions;
mod settings;
mod store;
mod template;
mod tmux;

use actions::Cli;
use app::App;
use paths::KataPaths;

async fn run(cli: Cli) -> Result<()> {
    let mut app = App::new(KataPaths::from_env()?);
    app.handle_action(cli.action).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KATA_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Dropping the command future on Ctrl-C releases anything it holds
    let result = tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted.");
            return ExitCode::from(130);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
