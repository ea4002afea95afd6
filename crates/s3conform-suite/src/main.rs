use std::fs::File;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use s3conform_suite::cli::Cli;
use s3conform_suite::{catalog, connect, Runner, ServiceDefinition};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (stderr_layer, file_layer) = match &cli.log {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            (None, Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))))
        }
        None => (Some(fmt::layer().with_writer(std::io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let target = ServiceDefinition::parse(&cli.target)?;
    let declared = cli.declared_quirks()?;
    let emulated = cli.emulated_quirks()?;
    let provider = connect(&target, emulated)?;

    let scenarios = cli.filter()?.select(catalog());
    tracing::info!(target_uri = %target, selected = scenarios.len(), "s3conform starting");

    let runner = Runner::new(target.to_string(), provider, declared);
    let report = runner.run_with(&scenarios, |case| println!("{}", case.line())).await;

    for case in report.failures() {
        println!("\n{}:\n  {}", case.full_name(), case.outcome);
    }
    println!("\n{}", report.summary_line());

    if let Some(path) = &cli.json {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("cannot write JSON report {}", path.display()))?;
    }
    if let Some(path) = &cli.junit {
        std::fs::write(path, report.to_junit_xml())
            .with_context(|| format!("cannot write JUnit report {}", path.display()))?;
    }

    Ok(if report.is_passing() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
