use super::*;

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["kwpulse-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_migrate_command() {
    let cli = Cli::try_parse_from(["kwpulse-cli", "migrate"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::Migrate)));
}

#[test]
fn parses_create_job_with_defaults() {
    let caller = Uuid::new_v4().to_string();
    let cli = Cli::try_parse_from([
        "kwpulse-cli",
        "create-job",
        "--keyword",
        "42",
        "--type",
        "maps",
        "--caller",
        &caller,
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::CreateJob {
            keyword: 42,
            job_type: JobType::Maps,
            priority: None,
            config: None,
            max_retries: None,
            ..
        })
    ));
}

#[test]
fn create_job_rejects_unknown_type() {
    let caller = Uuid::new_v4().to_string();
    let result = Cli::try_parse_from([
        "kwpulse-cli",
        "create-job",
        "--keyword",
        "42",
        "--type",
        "carrier-pigeon",
        "--caller",
        &caller,
    ]);
    assert!(result.is_err());
}

#[test]
fn create_job_requires_a_caller() {
    let result =
        Cli::try_parse_from(["kwpulse-cli", "create-job", "--keyword", "1", "--type", "social"]);
    assert!(result.is_err());
}

#[test]
fn parses_update_status_with_error() {
    let cli = Cli::try_parse_from([
        "kwpulse-cli",
        "update-status",
        "9",
        "--status",
        "failed",
        "--error",
        "upstream 503",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::UpdateStatus {
            job_id: 9,
            status: JobStatus::Failed,
            error: Some(ref e),
            ..
        }) if e == "upstream 503"
    ));
}

#[test]
fn parses_update_status_from_a_worker() {
    let cli = Cli::try_parse_from([
        "kwpulse-cli",
        "update-status",
        "4",
        "--status",
        "running",
        "--worker",
        "w-2",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::UpdateStatus {
            job_id: 4,
            status: JobStatus::Running,
            worker: Some(ref w),
            ..
        }) if w == "w-2"
    ));
}

#[test]
fn rollups_require_an_owner() {
    assert!(Cli::try_parse_from(["kwpulse-cli", "rollups"]).is_err());

    let owner = Uuid::new_v4().to_string();
    let cli = Cli::try_parse_from(["kwpulse-cli", "rollups", "--owner", &owner]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Rollups { .. })));
}

#[test]
fn parses_lease_worker() {
    let cli = Cli::try_parse_from(["kwpulse-cli", "lease", "--worker", "w-7"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Lease { ref worker }) if worker == "w-7"
    ));
}

#[test]
fn retry_sweep_limit_defaults_to_100() {
    let cli = Cli::try_parse_from(["kwpulse-cli", "retry-sweep"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::RetrySweep { limit: 100 })
    ));
}

#[test]
fn compute_period_defaults_to_daily() {
    let cli = Cli::try_parse_from([
        "kwpulse-cli",
        "compute-period",
        "--keyword",
        "3",
        "--date",
        "2026-09-01",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::ComputePeriod {
            keyword: 3,
            period: PeriodType::Daily,
            ..
        })
    ));
}

#[test]
fn batch_daily_accepts_explicit_date() {
    let cli =
        Cli::try_parse_from(["kwpulse-cli", "batch-daily", "--date", "2026-09-01"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::BatchDaily { date: Some(d) })
            if d == NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()
    ));
}

#[test]
fn refresh_single_dataset() {
    let cli =
        Cli::try_parse_from(["kwpulse-cli", "refresh", "--dataset", "keyword_trends"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Refresh { dataset: Some(ref d) }) if d == "keyword_trends"
    ));
}
