use clap::Parser;
use dependency_check::{
    config,
    preflight::{CommandInstaller, SystemResolver},
    exit_code, run,
};
use std::{io, process::ExitCode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Checks for missing native dependencies and optionally installs them.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Install missing packages without prompting.
    #[arg(long, default_value_t = false)]
    auto_install: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let settings = config::get_configuration()?;
    let log_level = settings.log_level.as_str();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let installer = CommandInstaller::new(&settings.installer)?;
    let stdin = io::stdin();

    let satisfied = run(
        &settings.dependencies,
        &SystemResolver,
        &installer,
        args.auto_install,
        &mut stdin.lock(),
        &mut io::stdout(),
    )?;

    Ok(exit_code(satisfied))
}
