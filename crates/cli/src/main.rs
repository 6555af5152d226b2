mod cli;
mod jobfile;
mod report;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use fanout_core::PoolConfig;
use fanout_pool::{CommandRunnable, Progress, Runnable, Scheduler};
use tracing::info;

use crate::cli::{CliArgs, Command};
use crate::jobfile::{build_scheduler, JobFile, JobSpec};
use crate::report::JobReport;

fn main() -> Result<ExitCode> {
    fanout_core::load_dotenv();

    // Logs go to stderr so stdout stays clean for job output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let (config, specs, default_timeout) = match &args.command {
        Command::Run { path, pool } => {
            let file = JobFile::load(path)?;
            let mut config = file.pool;
            pool.apply(&mut config);
            config.validate().context("invalid pool settings")?;
            (config, file.jobs, pool.default_timeout())
        }
        Command::Exec { pool, commands } => {
            let mut config = PoolConfig::default();
            config.apply_env_overrides();
            pool.apply(&mut config);
            config.validate().context("invalid pool settings")?;
            let specs = commands.iter().map(JobSpec::from_command).collect();
            (config, specs, pool.default_timeout())
        }
    };

    info!(config = %config.summary(), jobs = specs.len(), "starting");

    let mut scheduler = build_scheduler(&specs, &config, default_timeout)?;
    drive(&mut scheduler, args.json)?;

    let metrics = scheduler.metrics();
    info!(
        finished = metrics.jobs_finished,
        succeeded = metrics.jobs_succeeded(),
        failed = metrics.jobs_failed,
        peak_running = metrics.peak_running,
        "done"
    );

    Ok(if metrics.jobs_failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Print each job as it finishes.
fn drive(scheduler: &mut Scheduler<CommandRunnable>, json: bool) -> Result<()> {
    let width = scheduler
        .keys()
        .map(|k| k.to_string().len())
        .max()
        .unwrap_or(0);

    while let Some(progress) = scheduler.advance() {
        let key = match progress {
            Progress::Finished(key) => key,
            Progress::Idle => {
                info!(
                    running = scheduler.running_len(),
                    waiting = scheduler.waiting_len(),
                    "still working"
                );
                continue;
            }
        };

        let error = scheduler.last_error(None).cloned();
        let Some(job) = scheduler.job_mut(&key) else {
            continue;
        };
        job.wait();
        let report = JobReport::new(key, job, error.as_ref());

        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            print!("{}", report.render_text(width));
        }
    }
    Ok(())
}
