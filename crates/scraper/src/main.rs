//! ScrapeForge scraper worker
//!
//! Runs one scrape job to a terminal state:
//!
//! ```text
//! scraper <user_id> <source[,source...]> <keyword>...
//! ```
//!
//! Ctrl+C (or SIGTERM) cancels the job; the worker still waits for it to
//! reach `cancelled` so the final state is persisted.

use anyhow::Context;
use scrapeforge_common::{config::AppConfig, telemetry, VERSION};
use scrapeforge_scraper::{bootstrap, JobOptions, JobStatus, SourceName};
use tokio::signal;
use tracing::{error, info, warn};

const USAGE: &str = "usage: scraper <user_id> <source[,source...]> <keyword>...";

struct Args {
    user_id: String,
    sources: Vec<SourceName>,
    keywords: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut args = args.into_iter();
    let user_id = args.next().context(USAGE)?;
    let sources: Vec<SourceName> = args
        .next()
        .context(USAGE)?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SourceName::from)
        .collect();
    let keywords: Vec<String> = args.collect();

    if sources.is_empty() || keywords.is_empty() {
        anyhow::bail!(USAGE);
    }
    Ok(Args {
        user_id,
        sources,
        keywords,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("loading configuration")?;
    telemetry::init_tracing(&config.observability);
    info!("Starting ScrapeForge scraper v{}", VERSION);

    if let Err(e) = telemetry::install_metrics_exporter(&config.observability) {
        warn!(error = %e, "Metrics exporter not installed");
    }

    let args = parse_args(std::env::args().skip(1))?;
    let orchestrator = bootstrap::build_orchestrator(&config).await?;

    let options = JobOptions {
        max_documents_per_keyword: config.scraper.max_documents_per_keyword,
        ..JobOptions::default()
    };
    let job_id = orchestrator
        .submit_job(&args.user_id, args.keywords, args.sources, options)
        .await?;
    info!(%job_id, "Job submitted");

    let job = tokio::select! {
        job = orchestrator.wait_for_terminal(job_id) => job?,
        _ = shutdown_signal() => {
            info!(%job_id, "Cancelling job");
            orchestrator.cancel_job(job_id).await?;
            orchestrator.wait_for_terminal(job_id).await?
        }
    };

    match job.status {
        JobStatus::Failed => error!(
            %job_id,
            error = job.error.as_deref().unwrap_or("unknown"),
            stats = ?job.stats,
            "Job failed"
        ),
        status => info!(
            %job_id,
            %status,
            progress = job.progress,
            artifacts = job.stats.artifacts_stored,
            stats = ?job.stats,
            "Job finished"
        ),
    }

    if job.status == JobStatus::Failed {
        anyhow::bail!("job {} failed", job_id);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args(strings(&["user-1", "arxiv, crossref", "fiscal policy", "budget"])).unwrap();
        assert_eq!(args.user_id, "user-1");
        assert_eq!(args.sources, vec![SourceName::from("arxiv"), SourceName::from("crossref")]);
        assert_eq!(args.keywords, vec!["fiscal policy", "budget"]);
    }

    #[test]
    fn test_parse_args_requires_keywords() {
        assert!(parse_args(strings(&["user-1", "arxiv"])).is_err());
        assert!(parse_args(strings(&["user-1", ",", "budget"])).is_err());
        assert!(parse_args(strings(&[])).is_err());
    }
}
