//! Typed operations against Zephyr Squad and Jira.
//!
//! Every call succeeds only on HTTP 200 with a body of the expected shape.
//! Anything else becomes a [`GatewayError`] naming the operation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Local, NaiveDate, SecondsFormat, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::UploadConfig;
use crate::model::{Cycle, ExecutionStatuses, Issue, OutcomeKind, TestResult};
use crate::remote::{GatewayError, RemoteClient};

/// Version id Zephyr uses for the "Unscheduled" pseudo-version.
pub const UNSCHEDULED_VERSION_ID: &str = "-1";

/// Jira issue type name of test issues.
pub const TEST_ISSUE_TYPE: &str = "Test";

/// Upper bound on issues returned by one search.
const SEARCH_PAGE_SIZE: &str = "1000";

#[derive(Debug, Clone)]
pub struct Gateway {
    client: RemoteClient,
    jira_endpoint: String,
    zephyr_endpoint: String,
}

impl Gateway {
    pub fn new(client: RemoteClient, jira_endpoint: &str, zephyr_endpoint: &str) -> Self {
        Self {
            client,
            jira_endpoint: jira_endpoint.trim_end_matches('/').to_string(),
            zephyr_endpoint: zephyr_endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Result<Self, reqwest::Error> {
        let client = RemoteClient::new(&config.username, &config.password, config.request_timeout)?;
        Ok(Self::new(client, &config.jira_endpoint, &config.zephyr_endpoint))
    }

    /// Id of the project whose label is exactly `name`.
    pub async fn resolve_project_id(&self, name: &str) -> Result<String, GatewayError> {
        const OP: &str = "resolve project";
        let body = self.get(OP, self.zephyr("/util/project-list"), &[]).await?;
        let projects: ProjectList = decode(OP, body)?;
        find_by_label(projects.options.iter(), name).ok_or_else(|| {
            GatewayError::ConfigurationMissing {
                operation: OP,
                kind: "project",
                name: name.to_string(),
            }
        })
    }

    /// Id of the version labelled `name`, searching released versions first.
    ///
    /// Without a name the cycle goes under "Unscheduled" and nothing is fetched.
    pub async fn resolve_version_id(
        &self,
        project_id: &str,
        name: Option<&str>,
    ) -> Result<String, GatewayError> {
        const OP: &str = "resolve version";
        let Some(name) = name else {
            return Ok(UNSCHEDULED_VERSION_ID.to_string());
        };
        let body = self
            .get(
                OP,
                self.zephyr("/util/versionBoard-list"),
                &[("projectId", project_id)],
            )
            .await?;
        let board: VersionBoard = decode(OP, body)?;
        let versions = board
            .released_versions
            .iter()
            .chain(board.unreleased_versions.iter());
        find_by_label(versions, name).ok_or_else(|| GatewayError::ConfigurationMissing {
            operation: OP,
            kind: "version",
            name: name.to_string(),
        })
    }

    /// Numeric status codes for the four known outcomes. Fails unless all four exist.
    pub async fn resolve_execution_statuses(&self) -> Result<ExecutionStatuses, GatewayError> {
        const OP: &str = "resolve execution statuses";
        let body = self
            .get(OP, self.zephyr("/util/testExecutionStatus"), &[])
            .await?;
        let entries: Vec<StatusEntry> = decode(OP, body)?;
        let map: BTreeMap<OutcomeKind, i64> = entries
            .into_iter()
            .filter_map(|e| Some((OutcomeKind::from_zephyr_name(&e.name)?, e.id)))
            .collect();
        ExecutionStatuses::from_map(map).ok_or_else(|| GatewayError::Decode {
            operation: OP,
            reason: "status vocabulary lacks one of PASS, FAIL, UNEXECUTED, WIP".to_string(),
        })
    }

    /// Create a cycle named after the current time, starting and ending today.
    pub async fn create_cycle(
        &self,
        project_id: &str,
        version_id: &str,
    ) -> Result<String, GatewayError> {
        const OP: &str = "create cycle";
        let now = Utc::now();
        let day = cycle_day(now.with_timezone(&Local).date_naive());
        let payload = json!({
            "name": cycle_name(now),
            "projectId": project_id,
            "versionId": version_id,
            "startDate": day,
            "endDate": day,
        });
        let body = self
            .send(OP, Method::POST, self.zephyr("/cycle"), &[], Some(&payload))
            .await?;
        body.get("id").and_then(id_string).ok_or_else(|| GatewayError::Decode {
            operation: OP,
            reason: "cycle id missing".to_string(),
        })
    }

    pub async fn resolve_issue(&self, key: &str) -> Result<Issue, GatewayError> {
        const OP: &str = "resolve issue";
        let url = self.jira(&format!("/issue/{key}"));
        let body = match self.get(OP, url, &[("fields", "id,key,issuetype")]).await {
            Err(GatewayError::Status { status: 404, .. }) => {
                return Err(GatewayError::NotFound {
                    operation: OP,
                    what: format!("issue {key}"),
                })
            }
            other => other?,
        };
        let issue: IssueBody = decode(OP, body)?;
        let issue_type = issue.fields.issuetype.unwrap_or_default();
        Ok(Issue {
            id: issue.id.into_string(),
            key: issue.key,
            issue_type_id: issue_type.id.map(RawId::into_string),
            issue_type_name: issue_type.name,
        })
    }

    /// Id of the Jira issue type Zephyr treats as a test.
    pub async fn resolve_test_issue_type_id(&self) -> Result<String, GatewayError> {
        const OP: &str = "resolve test issue type";
        let body = self
            .get(OP, self.zephyr("/util/zephyrTestIssueType"), &[])
            .await?;
        body.get("testcaseIssueTypeId")
            .and_then(id_string)
            .ok_or_else(|| GatewayError::Decode {
                operation: OP,
                reason: "testcaseIssueTypeId missing".to_string(),
            })
    }

    /// Create an execution shell for `issue_id` in the cycle, then execute it
    /// with the result's status and comment. Returns the execution id.
    pub async fn create_execution(
        &self,
        cycle: &Cycle,
        issue_id: &str,
        result: &TestResult,
    ) -> Result<String, GatewayError> {
        const CREATE: &str = "create execution";
        const EXECUTE: &str = "execute execution";

        let shell = json!({
            "projectId": cycle.project_id,
            "versionId": cycle.version_id,
            "issueId": issue_id,
            "cycleId": cycle.cycle_id,
        });
        let created = self
            .send(CREATE, Method::POST, self.zephyr("/execution"), &[], Some(&shell))
            .await?;
        let mut execution = first_execution(created).ok_or_else(|| GatewayError::Decode {
            operation: CREATE,
            reason: "no execution object in response".to_string(),
        })?;
        let id = execution
            .get("id")
            .and_then(id_string)
            .ok_or_else(|| GatewayError::Decode {
                operation: CREATE,
                reason: "execution id missing".to_string(),
            })?;

        execution.insert(
            "status".to_string(),
            Value::String(cycle.statuses.code(result.outcome).to_string()),
        );
        if let Some(message) = &result.message {
            execution.insert("comment".to_string(), Value::String(message.clone()));
        }
        debug!(key = %result.key, execution_id = %id, outcome = %result.outcome, "executing");

        let url = self.zephyr(&format!("/execution/{id}/execute"));
        let updated = self
            .send(EXECUTE, Method::PUT, url, &[], Some(&Value::Object(execution)))
            .await?;
        updated
            .get("id")
            .and_then(id_string)
            .ok_or_else(|| GatewayError::Decode {
                operation: EXECUTE,
                reason: "execution id missing".to_string(),
            })
    }

    /// Keys of all test issues in any of the given components.
    pub async fn resolve_issue_keys_for_components(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, GatewayError> {
        const OP: &str = "search component tests";
        let jql = component_query(names);
        let body = self
            .get(
                OP,
                self.jira("/search"),
                &[("fields", "key"), ("maxResults", SEARCH_PAGE_SIZE), ("jql", &jql)],
            )
            .await?;
        let found: SearchResult = decode(OP, body)?;
        Ok(found.issues.into_iter().filter_map(|i| i.key).collect())
    }

    /// Keys of the test issues linked from stories of the given epics.
    ///
    /// Epic membership only exists on stories, so this goes epic → story → outward test link.
    pub async fn resolve_issue_keys_for_epics(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, GatewayError> {
        const OP: &str = "search epic tests";
        let jql = epic_query(names);
        let body = self
            .get(
                OP,
                self.jira("/search"),
                &[
                    ("fields", "issuelinks"),
                    ("maxResults", SEARCH_PAGE_SIZE),
                    ("jql", &jql),
                ],
            )
            .await?;
        let found: SearchResult = decode(OP, body)?;
        Ok(found
            .issues
            .into_iter()
            .flat_map(|story| story.fields.issuelinks)
            .filter_map(|link| link.outward_issue)
            .filter(|linked| {
                linked
                    .fields
                    .issuetype
                    .as_ref()
                    .and_then(|t| t.name.as_deref())
                    == Some(TEST_ISSUE_TYPE)
            })
            .filter_map(|linked| linked.key)
            .collect())
    }

    fn jira(&self, path: &str) -> String {
        format!("{}{}", self.jira_endpoint, path)
    }

    fn zephyr(&self, path: &str) -> String {
        format!("{}{}", self.zephyr_endpoint, path)
    }

    async fn get(
        &self,
        operation: &'static str,
        url: String,
        query: &[(&str, &str)],
    ) -> Result<Value, GatewayError> {
        self.send(operation, Method::GET, url, query, None).await
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        url: String,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let response = self
            .client
            .request(method, &url, query, body)
            .await
            .map_err(|source| GatewayError::Transport { operation, source })?;
        if response.status != StatusCode::OK {
            return Err(GatewayError::Status {
                operation,
                status: response.status.as_u16(),
            });
        }
        response.json.ok_or_else(|| GatewayError::Decode {
            operation,
            reason: "body is not JSON".to_string(),
        })
    }
}

/// `d/MMM/yy`, the date format Zephyr expects, e.g. `5/Jan/24`.
pub fn cycle_day(date: NaiveDate) -> String {
    date.format("%-d/%b/%y").to_string()
}

fn cycle_name(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn component_query(names: &BTreeSet<String>) -> String {
    format!("component in ({}) AND type = {TEST_ISSUE_TYPE}", jql_list(names))
}

pub fn epic_query(names: &BTreeSet<String>) -> String {
    format!("\"epic link\" in ({}) AND type = Story", jql_list(names))
}

fn jql_list(names: &BTreeSet<String>) -> String {
    names
        .iter()
        .map(|n| jql_value(n))
        .collect::<Vec<_>>()
        .join(",")
}

/// Bare when the name is a plain word, otherwise a quoted JQL string.
fn jql_value(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn find_by_label<'a>(
    mut options: impl Iterator<Item = &'a LabelledOption>,
    name: &str,
) -> Option<String> {
    options
        .find(|o| o.label.as_deref() == Some(name) && o.value.is_some())
        .and_then(|o| o.value.as_ref().map(RawId::to_string))
}

/// The create call answers with `{ "<id>": { "id": <id>, ... } }`.
fn first_execution(created: Value) -> Option<Map<String, Value>> {
    let Value::Object(map) = created else {
        return None;
    };
    map.into_iter().find_map(|(_, v)| match v {
        Value::Object(execution) => Some(execution),
        _ => None,
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decode<T: DeserializeOwned>(operation: &'static str, body: Value) -> Result<T, GatewayError> {
    serde_json::from_value(body).map_err(|e| GatewayError::Decode {
        operation,
        reason: e.to_string(),
    })
}

/// Ids arrive as strings from some endpoints and as numbers from others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

impl std::fmt::Display for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawId::Text(s) => write!(f, "{s}"),
            RawId::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelledOption {
    label: Option<String>,
    value: Option<RawId>,
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    #[serde(default)]
    options: Vec<LabelledOption>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionBoard {
    #[serde(default)]
    released_versions: Vec<LabelledOption>,
    #[serde(default)]
    unreleased_versions: Vec<LabelledOption>,
}

#[derive(Debug, Deserialize)]
struct StatusEntry {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssueBody {
    id: RawId,
    key: String,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
struct IssueFields {
    issuetype: Option<IssueType>,
    #[serde(default)]
    issuelinks: Vec<IssueLink>,
}

#[derive(Debug, Default, Deserialize)]
struct IssueType {
    id: Option<RawId>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueLink {
    outward_issue: Option<LinkedIssue>,
}

#[derive(Debug, Deserialize)]
struct LinkedIssue {
    key: Option<String>,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    issues: Vec<SearchIssue>,
}

#[derive(Debug, Deserialize)]
struct SearchIssue {
    key: Option<String>,
    #[serde(default)]
    fields: IssueFields,
}
