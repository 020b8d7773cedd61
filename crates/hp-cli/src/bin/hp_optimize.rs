use clap::Parser;
use hp_cli::{run, Args};
use hp_optimizer::TrialStatus;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let report = run(&args)?;

    println!(
        "{}: trials {}..{} ({} completed, {} failed, peak {} live)",
        report.run,
        report.first_trial,
        report.target,
        report.completed,
        report.failed,
        report.peak_concurrency
    );
    for trial in report.trials.iter().filter(|t| t.status == TrialStatus::Failed) {
        println!(
            "  trial {} on slot {} failed: {}",
            trial.trial_index,
            trial.slot_id,
            trial.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
