use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use swarmfetch_config::FetchSettings;
use swarmfetch_core::{FetchOutcome, FetchRequest, MagnetLink, ProgressSink};
use swarmfetch_engine::FetchEngine;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{CliError, CliResult, GetArgs};
use crate::output::ProgressPrinter;

/// Concurrency and retry policy for one invocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunLimits {
    pub(crate) max_concurrent: usize,
    pub(crate) retry_attempts: u32,
}

impl From<&FetchSettings> for RunLimits {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent_fetches.max(1),
            retry_attempts: settings.retry_attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FetchJob {
    pub(crate) index: usize,
    pub(crate) label: String,
    pub(crate) magnet: String,
    pub(crate) printer: ProgressPrinter,
}

#[derive(Debug)]
pub(crate) struct JobReport {
    pub(crate) index: usize,
    pub(crate) label: String,
    pub(crate) attempts: u32,
    pub(crate) outcome: FetchOutcome,
}

pub(crate) async fn handle_get(
    engine: &FetchEngine,
    settings: &FetchSettings,
    args: &GetArgs,
) -> CliResult<()> {
    let jobs = plan_jobs(&args.magnets, args.quiet)?;
    let shutdown = CancellationToken::new();
    let listener = tokio::spawn(cancel_on_interrupt(shutdown.clone()));

    let (reports, aborted) = fetch_all(
        engine,
        jobs,
        &args.destination,
        RunLimits::from(settings),
        &shutdown,
    )
    .await;
    listener.abort();

    summarize(reports, aborted)
}

/// Validate every magnet up front and pick a progress style.
pub(crate) fn plan_jobs(magnets: &[String], quiet: bool) -> CliResult<Vec<FetchJob>> {
    let many = magnets.len() > 1;
    magnets
        .iter()
        .enumerate()
        .map(|(index, magnet)| {
            let link = MagnetLink::parse(magnet).map_err(|err| {
                CliError::validation(format!("argument {}: {err}", index + 1))
            })?;
            let label = link
                .display_name()
                .map_or_else(|| short_hash(link.info_hash()), str::to_string);
            let printer = if quiet {
                ProgressPrinter::Silent
            } else if many {
                ProgressPrinter::Labelled(label.clone())
            } else {
                ProgressPrinter::Inline
            };
            Ok(FetchJob {
                index,
                label,
                magnet: magnet.clone(),
                printer,
            })
        })
        .collect()
}

fn short_hash(info_hash: &str) -> String {
    info_hash.chars().take(12).collect()
}

/// Run every job under the concurrency cap, resubmitting retryable failures.
///
/// Reports come back in submission order. The second value counts tasks that
/// panicked or were aborted.
pub(crate) async fn fetch_all(
    engine: &FetchEngine,
    jobs: Vec<FetchJob>,
    destination: &Path,
    limits: RunLimits,
    shutdown: &CancellationToken,
) -> (Vec<JobReport>, usize) {
    let permits = Arc::new(Semaphore::new(limits.max_concurrent));
    let mut tasks = JoinSet::new();
    for job in jobs {
        tasks.spawn(run_job(
            engine.clone(),
            job,
            destination.to_path_buf(),
            limits.retry_attempts,
            Arc::clone(&permits),
            shutdown.clone(),
        ));
    }

    let mut reports = Vec::new();
    let mut aborted = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(err) => {
                warn!(error = %err, "fetch task aborted");
                aborted += 1;
            }
        }
    }
    reports.sort_by_key(|report| report.index);
    (reports, aborted)
}

async fn run_job(
    engine: FetchEngine,
    job: FetchJob,
    destination: PathBuf,
    retry_attempts: u32,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
) -> JobReport {
    let permit = tokio::select! {
        biased;
        () = shutdown.cancelled() => None,
        permit = permits.acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
        return JobReport {
            index: job.index,
            label: job.label,
            attempts: 0,
            outcome: FetchOutcome::Cancelled,
        };
    };

    let sink: Arc<dyn ProgressSink> = Arc::new(job.printer.clone());
    let mut attempts = 0;
    loop {
        attempts += 1;
        let request =
            FetchRequest::new(job.magnet.clone(), destination.clone()).with_sink(Arc::clone(&sink));
        let outcome = engine.start_child_fetch(request, &shutdown).outcome().await;
        job.printer.finish();

        match &outcome {
            FetchOutcome::Failed(err)
                if err.is_retryable() && attempts <= retry_attempts && !shutdown.is_cancelled() =>
            {
                warn!(label = %job.label, attempt = attempts, error = %err, "retrying fetch");
            }
            _ => {
                return JobReport {
                    index: job.index,
                    label: job.label,
                    attempts,
                    outcome,
                };
            }
        }
    }
}

async fn cancel_on_interrupt(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("interrupt received; cancelling fetches");
        shutdown.cancel();
    }
}

/// Print completed paths to stdout and problems to stderr.
fn summarize(reports: Vec<JobReport>, aborted: usize) -> CliResult<()> {
    let total = reports.len() + aborted;
    let mut failed = aborted;
    let mut cancelled = 0;
    for report in reports {
        match report.outcome {
            FetchOutcome::Completed { path, .. } => println!("{}", path.display()),
            FetchOutcome::Cancelled => {
                cancelled += 1;
                eprintln!("[{}] cancelled", report.label);
            }
            FetchOutcome::Failed(err) => {
                failed += 1;
                eprintln!(
                    "[{}] failed after {} attempt(s): {:#}",
                    report.label,
                    report.attempts,
                    anyhow::Error::new(err)
                );
            }
        }
    }

    if failed > 0 {
        Err(CliError::failure(anyhow!("{failed} of {total} fetches failed")))
    } else if cancelled > 0 {
        Err(CliError::Cancelled)
    } else {
        Ok(())
    }
}
