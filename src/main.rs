use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use squad_upload::config::UploadSettings;

#[derive(Parser)]
#[command(
    name = "squad-upload",
    about = "Upload JUnit test results to Zephyr Squad test cycles",
    version,
    long_about = None
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a test cycle and upload the results of the given reports
    Upload {
        /// JUnit XML report files
        #[arg(required = true)]
        reports: Vec<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Show the results found in reports without uploading
    Parse {
        /// JUnit XML report files
        #[arg(required = true)]
        reports: Vec<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct SettingsArgs {
    /// TOML config file (defaults to $SQUAD_UPLOAD_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Jira REST API base URL
    #[arg(long, env = "SQUAD_JIRA_ENDPOINT")]
    jira_endpoint: Option<String>,

    /// Zephyr Squad REST API base URL
    #[arg(long, env = "SQUAD_ZEPHYR_ENDPOINT")]
    zephyr_endpoint: Option<String>,

    /// Jira project name
    #[arg(long)]
    project: Option<String>,

    /// Project version; the cycle goes under "Unscheduled" without one
    #[arg(long = "project-version")]
    version: Option<String>,

    /// Back-fill untested Test issues of this component (repeatable)
    #[arg(long = "component")]
    components: Vec<String>,

    /// Back-fill untested Test issues linked from stories of this epic (repeatable, overrides components)
    #[arg(long = "epic")]
    epics: Vec<String>,

    /// Jira username
    #[arg(long, env = "SQUAD_USERNAME")]
    username: Option<String>,

    /// Jira password or API token
    #[arg(long, env = "SQUAD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    request_timeout: Option<u64>,
}

impl SettingsArgs {
    fn overlay(&self) -> UploadSettings {
        let set = |values: &[String]| {
            (!values.is_empty()).then(|| values.iter().cloned().collect::<BTreeSet<_>>())
        };
        UploadSettings {
            jira_endpoint: self.jira_endpoint.clone(),
            zephyr_endpoint: self.zephyr_endpoint.clone(),
            project: self.project.clone(),
            version: self.version.clone(),
            components: set(&self.components),
            epics: set(&self.epics),
            username: self.username.clone(),
            password: self.password.clone(),
            request_timeout_secs: self.request_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Upload { reports, settings } => {
            let config = UploadSettings::discover(settings.config.as_deref())?
                .merge(settings.overlay())
                .validate()?;
            tracing::debug!(?config, "Resolved configuration");

            let summary = squad_upload::upload_reports(&reports, config).await?;

            println!("\n=== Zephyr Squad Upload ===");
            println!("Cycle:      {}", summary.cycle.cycle_id);
            println!("Project:    {}", summary.cycle.project_id);
            println!("Version:    {}", summary.cycle.version_id);
            println!("Uploaded:   {}", summary.executed.len());
            println!(
                "Back-filled: {} of {}",
                summary.backfilled().count(),
                summary.residual.len()
            );
            if !summary.skipped.is_empty() {
                println!("\nSkipped (no matching Test issue or write failed):");
                for key in &summary.skipped {
                    println!(" - {}", key);
                }
            }
            println!("===========================\n");
        }
        Commands::Parse { reports, json } => {
            let results = squad_upload::junit::load_results(&reports)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("{:<15} | {:<12} | {:>10} | Message", "Key", "Outcome", "Time (ms)");
                println!("{:-<15}-|-{:-<12}-|-{:->10}-|-{:-<30}", "", "", "", "");
                for r in &results {
                    let millis = r
                        .duration
                        .map(|d| d.as_millis().to_string())
                        .unwrap_or_default();
                    let message = r
                        .message
                        .as_deref()
                        .and_then(|m| m.lines().next())
                        .unwrap_or("");
                    println!(
                        "{:<15} | {:<12} | {:>10} | {}",
                        r.key,
                        r.outcome.to_string(),
                        millis,
                        message
                    );
                }
                println!("\n{} result(s)", results.len());
            }
        }
    }

    Ok(())
}
