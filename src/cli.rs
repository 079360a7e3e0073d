use chrono::{Days, Utc};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use adsync::config::Config;
use adsync::jobs::{JobRecord, JobStatus};
use adsync::pipeline::{FetchParams, ImportParams, JobRequest};
use adsync::runtime::Runtime;
use adsync::spreadsheet::validate_columns;
use adsync::storage::{UPLOAD_EXTENSIONS, generate_upload_id, is_key_segment, upload_key};

pub type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

const JOB_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "adsync")]
#[command(about = "Ads performance report ingestion", version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API with its worker pool
    Server(ServerArgs),
    /// Fetch a keyword report for the last N days and wait for the job
    Fetch(FetchArgs),
    /// Import a local CSV or Excel export and wait for the job
    Import(ImportArgs),
    /// Print the effective configuration (secrets redacted)
    Config,
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Ads profile id (defaults to ads.default_profile_id)
    #[arg(long, value_parser = parse_profile_id)]
    pub profile_id: Option<String>,

    /// Number of days to fetch, ending today
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=365))]
    pub days: u64,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Spreadsheet to import
    pub file: PathBuf,

    #[arg(long, value_parser = parse_profile_id)]
    pub profile_id: String,
}

/// Profile ids become storage key segments, so they get the same check
/// as the HTTP API applies.
fn parse_profile_id(value: &str) -> Result<String, String> {
    let value = value.trim();
    if is_key_segment(value) {
        Ok(value.to_string())
    } else {
        Err("only letters, digits, '-' and '_' are allowed".to_string())
    }
}

pub async fn fetch(config: Config, args: FetchArgs) -> Result<(), AnyError> {
    let profile_id = args
        .profile_id
        .or_else(|| config.ads.default_profile_id.clone())
        .ok_or("no --profile-id given and ads.default_profile_id is not set")?;

    let end_date = Utc::now().date_naive();
    let start_date = end_date
        .checked_sub_days(Days::new(args.days))
        .ok_or("date range out of bounds")?;

    let runtime = Runtime::start(config)?;
    let job_id = runtime
        .dispatcher()
        .submit(JobRequest::Fetch(FetchParams {
            profile_id,
            start_date,
            end_date,
            report_type: None,
        }))
        .await?;
    info!(job_id = %job_id, %start_date, %end_date, "Fetch job submitted");

    finish(runtime, &job_id).await
}

pub async fn import(config: Config, args: ImportArgs) -> Result<(), AnyError> {
    let filename = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or("file path has no file name")?
        .to_string();
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| UPLOAD_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| format!("unsupported file type: {}", filename))?;

    let data = tokio::fs::read(&args.file).await?;
    if data.is_empty() {
        return Err(format!("{} is empty", args.file.display()).into());
    }
    let check = validate_columns(&data, &filename)?;
    if !check.missing.is_empty() {
        return Err(format!("missing required columns: {}", check.missing.join(", ")).into());
    }

    let runtime = Runtime::start(config)?;
    let upload_id = generate_upload_id();
    let key = upload_key(&args.profile_id, &upload_id, &ext);
    runtime.uploads().upload(&key, data).await?;

    let job_id = runtime
        .dispatcher()
        .submit(JobRequest::Import(ImportParams {
            profile_id: args.profile_id,
            upload_id,
            upload_key: key,
            start_date: None,
            end_date: None,
        }))
        .await?;
    info!(job_id = %job_id, file = %args.file.display(), "Import job submitted");

    finish(runtime, &job_id).await
}

pub fn print_config(config: &Config) -> Result<(), AnyError> {
    println!("{}", config.to_redacted_toml()?);
    Ok(())
}

/// Wait for the job, print its final record and map the outcome to an exit status
async fn finish(runtime: Runtime, job_id: &str) -> Result<(), AnyError> {
    let job: Option<JobRecord> = runtime.wait_for(job_id, JOB_POLL_INTERVAL).await;
    runtime.shutdown().await;

    let job = job.ok_or_else(|| format!("job {} disappeared from the registry", job_id))?;
    println!("{}", serde_json::to_string_pretty(&job)?);

    match job.status {
        JobStatus::Completed => Ok(()),
        status => Err(format!("job {} finished as {}", job_id, status).into()),
    }
}
