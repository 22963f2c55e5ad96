//! Upload orchestration: cycle construction, matched dispatch and residual back-fill.
//!
//! One run goes through these stages, stopping early only when the cycle
//! cannot be built:
//!
//! 1. **Initializing**: status vocabulary, project id, version id, new cycle.
//! 2. **Matched dispatch**: one execution per input result whose issue exists.
//! 3. **Residual resolution**: when epics or components are configured, a
//!    not-executed entry for every tracked test that got no result.
//!
//! Remote calls are strictly sequential. Zephyr allocates a new execution per
//! create request, so overlapping writes for the same cycle could leave
//! duplicate shells behind.

pub mod residual;

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::model::{Cycle, TestResult};
use crate::remote::{Gateway, GatewayError};

use self::residual::{residual_keys, residual_results};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("could not set up test cycle: {0}")]
    Cycle(#[source] GatewayError),
}

/// What one successful run did.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub cycle: Cycle,
    /// Keys with an execution created in this run, matched or residual.
    pub executed: BTreeSet<String>,
    /// Keys whose result could not be uploaded, in dispatch order.
    pub skipped: Vec<String>,
    /// Tracked keys that had no local result. Back-filling each was attempted;
    /// those that failed are also in `skipped`.
    pub residual: BTreeSet<String>,
}

impl UploadSummary {
    /// Residual keys that actually got a not-executed entry.
    pub fn backfilled(&self) -> impl Iterator<Item = &String> {
        self.residual.intersection(&self.executed)
    }
}

/// Uploads test results into a freshly created Zephyr Squad cycle.
#[derive(Debug, Clone)]
pub struct Uploader {
    config: UploadConfig,
}

impl Uploader {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload and report only whether the cycle could be created.
    ///
    /// Individual results that are skipped do not make the upload fail.
    pub async fn upload<I>(&self, results: I) -> bool
    where
        I: IntoIterator<Item = TestResult>,
    {
        match self.run(results).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "upload aborted");
                false
            }
        }
    }

    pub async fn run<I>(&self, results: I) -> Result<UploadSummary, UploadError>
    where
        I: IntoIterator<Item = TestResult>,
    {
        let gateway = Gateway::from_config(&self.config)?;
        self.run_with(&gateway, results).await
    }

    pub async fn run_with<I>(
        &self,
        gateway: &Gateway,
        results: I,
    ) -> Result<UploadSummary, UploadError>
    where
        I: IntoIterator<Item = TestResult>,
    {
        let cycle = self.build_cycle(gateway).await.map_err(|e| {
            warn!(
                stage = "initializing",
                operation = e.operation(),
                status = ?e.status(),
                error = %e,
                "cycle construction failed"
            );
            UploadError::Cycle(e)
        })?;
        info!(
            project_id = %cycle.project_id,
            version_id = %cycle.version_id,
            cycle_id = %cycle.cycle_id,
            "created test cycle"
        );

        let mut dispatch = Dispatch::new(gateway, &cycle);

        info!(stage = "matched-dispatch", "uploading test results");
        dispatch.send_all(results).await;

        let mut residual = BTreeSet::new();
        if let Some(candidates) = self.candidate_keys(gateway).await {
            residual = residual_keys(&candidates, &dispatch.executed);
            info!(
                stage = "residual-resolution",
                candidates = candidates.len(),
                residual = residual.len(),
                "back-filling tests without results"
            );
            dispatch.send_all(residual_results(&residual)).await;
        }

        let Dispatch {
            executed, skipped, ..
        } = dispatch;
        info!(
            stage = "done",
            uploaded = executed.len(),
            skipped = skipped.len(),
            "upload finished"
        );

        Ok(UploadSummary {
            cycle,
            executed,
            skipped,
            residual,
        })
    }

    /// Each step runs only after the previous one succeeded.
    async fn build_cycle(&self, gateway: &Gateway) -> Result<Cycle, GatewayError> {
        let statuses = gateway.resolve_execution_statuses().await?;
        let project_id = gateway.resolve_project_id(&self.config.project).await?;
        let version_id = gateway
            .resolve_version_id(&project_id, self.config.version.as_deref())
            .await?;
        let cycle_id = gateway.create_cycle(&project_id, &version_id).await?;
        Ok(Cycle {
            project_id,
            version_id,
            cycle_id,
            statuses,
        })
    }

    /// Tracked test keys to reconcile against. Epics win over components.
    async fn candidate_keys(&self, gateway: &Gateway) -> Option<BTreeSet<String>> {
        let found = if let Some(epics) = self.config.epics() {
            gateway.resolve_issue_keys_for_epics(epics).await
        } else if let Some(components) = self.config.components() {
            gateway.resolve_issue_keys_for_components(components).await
        } else {
            return None;
        };

        match found {
            Ok(keys) => Some(keys),
            Err(e) => {
                warn!(
                    operation = e.operation(),
                    error = %e,
                    "could not list tracked tests, skipping back-fill"
                );
                None
            }
        }
    }
}

/// Sequential execution writer for one cycle.
struct Dispatch<'a> {
    gateway: &'a Gateway,
    cycle: &'a Cycle,
    executed: BTreeSet<String>,
    skipped: Vec<String>,
}

impl<'a> Dispatch<'a> {
    fn new(gateway: &'a Gateway, cycle: &'a Cycle) -> Self {
        Self {
            gateway,
            cycle,
            executed: BTreeSet::new(),
            skipped: Vec::new(),
        }
    }

    /// Send one pass of results in order. Only the first result per key is sent.
    async fn send_all<I>(&mut self, results: I)
    where
        I: IntoIterator<Item = TestResult>,
    {
        let mut results = results.into_iter().peekable();
        if results.peek().is_none() {
            return;
        }

        let mut attempted = BTreeSet::new();
        let test_type = match self.gateway.resolve_test_issue_type_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "test issue type unknown, results in this pass are skipped");
                None
            }
        };

        for result in results {
            if !attempted.insert(result.key.clone()) {
                debug!(key = %result.key, "duplicate result for issue, skipping");
                continue;
            }
            let uploaded = match &test_type {
                Some(test_type) => self.send(test_type, &result).await,
                None => false,
            };
            if uploaded {
                self.executed.insert(result.key);
            } else {
                self.skipped.push(result.key);
            }
        }
    }

    /// Upload one result. Stricter than requiring only that the issue exists:
    /// an issue whose type id is known and differs from the Test type is
    /// skipped as well.
    async fn send(&self, test_type: &str, result: &TestResult) -> bool {
        let issue = match self.gateway.resolve_issue(&result.key).await {
            Ok(issue) => issue,
            Err(e) => {
                debug!(key = %result.key, error = %e, "no matching issue, skipping");
                return false;
            }
        };

        if issue
            .issue_type_id
            .as_deref()
            .is_some_and(|t| t != test_type)
        {
            debug!(
                key = %result.key,
                issue_type = ?issue.issue_type_name,
                "issue is not a test, skipping"
            );
            return false;
        }

        match self
            .gateway
            .create_execution(self.cycle, &issue.id, result)
            .await
        {
            Ok(execution_id) => {
                info!(
                    key = %result.key,
                    outcome = %result.outcome,
                    %execution_id,
                    "uploaded execution"
                );
                true
            }
            Err(e) => {
                warn!(
                    key = %result.key,
                    operation = e.operation(),
                    status = ?e.status(),
                    error = %e,
                    "execution not created"
                );
                false
            }
        }
    }
}
