//! squad-upload -- Upload JUnit test results to Zephyr Squad.
//!
//! This crate reads JUnit XML reports, matches every test to the Jira issue
//! named by its key, and records the results as executions in a new Zephyr
//! Squad test cycle. Tracked tests of the configured components or epics that
//! produced no result are added as not executed.

pub mod config;
pub mod junit;
pub mod model;
pub mod remote;
pub mod upload;

use std::path::Path;

use anyhow::{Context, Result};

pub use config::{UploadConfig, UploadSettings};
pub use model::{Cycle, OutcomeKind, TestResult};
pub use upload::{UploadSummary, Uploader};

/// Read the given reports and upload their results with `config`.
pub async fn upload_reports<P: AsRef<Path>>(
    reports: &[P],
    config: UploadConfig,
) -> Result<UploadSummary> {
    let results = junit::load_results(reports)?;
    tracing::info!(
        reports = reports.len(),
        results = results.len(),
        project = %config.project,
        "Uploading test results"
    );

    Uploader::new(config)
        .run(results)
        .await
        .context("upload failed")
}
