mod analytics;
mod jobs;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use kwpulse_core::{JobStatus, JobType, PeriodType};
use kwpulse_jobs::Pipeline;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "kwpulse-cli")]
#[command(about = "Keyword scraping queue and analytics operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Check database connectivity
    Ping,
    /// Queue a scraping job for a keyword
    CreateJob {
        #[arg(long)]
        keyword: i64,
        /// social, maps, search, reviews or custom
        #[arg(long = "type")]
        job_type: JobType,
        /// 1 (lowest) to 10 (highest); defaults to the keyword's priority
        #[arg(long)]
        priority: Option<i64>,
        /// Acting user; must own the keyword
        #[arg(long)]
        caller: Uuid,
        /// Job configuration as a JSON object
        #[arg(long)]
        config: Option<String>,
        #[arg(long)]
        max_retries: Option<i32>,
    },
    /// Lease the next pending job for a worker
    Lease {
        #[arg(long)]
        worker: String,
    },
    /// Report a job status change
    UpdateStatus {
        job_id: i64,
        #[arg(long)]
        status: JobStatus,
        #[arg(long)]
        results: Option<i32>,
        #[arg(long)]
        error: Option<String>,
        #[arg(long)]
        error_code: Option<String>,
        #[arg(long)]
        actor: Option<Uuid>,
        /// Reporting worker; the update is rejected unless it holds the lease
        #[arg(long)]
        worker: Option<String>,
    },
    /// Requeue a failed job
    Retry { job_id: i64 },
    /// Return jobs with expired leases to pending
    Reclaim,
    /// Requeue failed jobs that still have retry budget
    RetrySweep {
        #[arg(long, default_value = "100")]
        limit: u32,
    },
    /// Compute one analytics period for a keyword
    ComputePeriod {
        #[arg(long)]
        keyword: i64,
        /// Any date inside the period (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// daily, weekly, monthly or quarterly
        #[arg(long, default_value = "daily")]
        period: PeriodType,
    },
    /// Compute daily analytics for every active keyword
    BatchDaily {
        /// Defaults to yesterday (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Refresh derived datasets
    Refresh {
        /// Refresh only this dataset
        #[arg(long)]
        dataset: Option<String>,
    },
    /// Show the current keyword trends
    Trends {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Show per-category rollups for an owner
    Rollups {
        #[arg(long)]
        owner: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("kwpulse-cli ready; run with --help for commands");
        return Ok(());
    };

    let config = kwpulse_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = kwpulse_db::PoolConfig::from_app_config(&config);
    let pool = kwpulse_db::connect_pool(&config.database_url, pool_config).await?;
    let pipeline = Pipeline::postgres(pool.clone(), &config);
    tracing::debug!(?command, env = %config.env, "running command");

    let result = run(command, &pool, &pipeline).await;
    pool.close().await;
    result
}

async fn run(
    command: Commands,
    pool: &sqlx::PgPool,
    pipeline: &Pipeline<kwpulse_jobs::PgStore>,
) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            let applied = kwpulse_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Ping => {
            kwpulse_db::ping(pool).await?;
            println!("database reachable");
        }
        Commands::CreateJob {
            keyword,
            job_type,
            priority,
            caller,
            config,
            max_retries,
        } => {
            let request = jobs::build_create_request(
                keyword,
                job_type,
                priority,
                config.as_deref(),
                max_retries,
            )?;
            jobs::run_create_job(pipeline, request, caller).await?;
        }
        Commands::Lease { worker } => jobs::run_lease(pipeline, &worker).await?,
        Commands::UpdateStatus {
            job_id,
            status,
            results,
            error,
            error_code,
            actor,
            worker,
        } => {
            let update =
                jobs::build_status_update(status, results, error, error_code, actor, worker);
            jobs::run_update_status(pipeline, job_id, update).await?;
        }
        Commands::Retry { job_id } => jobs::run_retry(pipeline, job_id).await?,
        Commands::Reclaim => jobs::run_reclaim(pipeline).await?,
        Commands::RetrySweep { limit } => jobs::run_retry_sweep(pipeline, limit).await?,
        Commands::ComputePeriod {
            keyword,
            date,
            period,
        } => analytics::run_compute_period(pipeline, keyword, date, period).await?,
        Commands::BatchDaily { date } => analytics::run_batch_daily(pipeline, date).await?,
        Commands::Refresh { dataset } => {
            analytics::run_refresh(pipeline, dataset.as_deref()).await?;
        }
        Commands::Trends { limit } => analytics::run_trends(pipeline, limit).await?,
        Commands::Rollups { owner } => analytics::run_rollups(pipeline, owner).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests;
