//! Mock Jira / Zephyr Squad server shared by the integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use squad_upload::config::UploadConfig;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const PROJECT_ID: &str = "10000";
pub const VERSION_ID: &str = "100";
pub const CYCLE_ID: &str = "77";
pub const TEST_TYPE_ID: &str = "10100";

pub const PASS: &str = "1";
pub const FAIL: &str = "2";
pub const UNEXECUTED: &str = "-1";

pub struct Remote {
    pub server: MockServer,
}

impl Remote {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn jira(&self) -> String {
        format!("{}/jira", self.server.uri())
    }

    pub fn zephyr(&self) -> String {
        format!("{}/zapi", self.server.uri())
    }

    /// Project "Project", version "1.0", user `ci` / `secret`.
    pub fn config(&self) -> UploadConfig {
        UploadConfig::new(self.jira(), self.zephyr(), "Project", "ci", "secret").with_version("1.0")
    }

    pub async fn mount_statuses(&self) {
        Mock::given(method("GET"))
            .and(path("/zapi/util/testExecutionStatus"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "name": "PASS", "color": "#75B000" },
                { "id": 2, "name": "FAIL", "color": "#CC3300" },
                { "id": -1, "name": "UNEXECUTED", "color": "#A0A0A0" },
                { "id": 3, "name": "WIP", "color": "#F2B000" },
                { "id": 4, "name": "BLOCKED", "color": "#6693B0" },
            ])))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_projects(&self) {
        Mock::given(method("GET"))
            .and(path("/zapi/util/project-list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "options": [
                    { "label": "Other", "value": "20000", "type": "software" },
                    { "label": "Project", "value": PROJECT_ID, "type": "software" },
                ]
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_versions(&self) {
        Mock::given(method("GET"))
            .and(path("/zapi/util/versionBoard-list"))
            .and(query_param("projectId", PROJECT_ID))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "releasedVersions": [
                    { "label": "0.9", "value": "90", "archived": false },
                    { "label": "1.0", "value": VERSION_ID, "archived": false },
                ],
                "unreleasedVersions": [
                    { "label": "2.0", "value": "200", "archived": false },
                ],
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_cycle(&self) {
        Mock::given(method("POST"))
            .and(path("/zapi/cycle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": CYCLE_ID,
                "responseMessage": "Cycle 77 created successfully."
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_test_issue_type(&self) {
        Mock::given(method("GET"))
            .and(path("/zapi/util/zephyrTestIssueType"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "testcaseIssueTypeId": TEST_TYPE_ID })),
            )
            .mount(&self.server)
            .await;
    }

    /// Everything needed to get a cycle built and dispatch started.
    pub async fn mount_cycle_context(&self) {
        self.mount_statuses().await;
        self.mount_projects().await;
        self.mount_versions().await;
        self.mount_cycle().await;
        self.mount_test_issue_type().await;
    }

    pub async fn mount_issue(&self, key: &str, id: &str) {
        self.mount_issue_of_type(key, id, TEST_TYPE_ID, "Test").await;
    }

    pub async fn mount_issue_of_type(&self, key: &str, id: &str, type_id: &str, type_name: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/jira/issue/{key}")))
            .and(query_param("fields", "id,key,issuetype"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "key": key,
                "fields": { "issuetype": { "id": type_id, "name": type_name } }
            })))
            .mount(&self.server)
            .await;
    }

    /// Create and execute endpoints for the execution of `issue_id`.
    pub async fn mount_execution(&self, issue_id: &str, execution_id: u64) {
        let numeric_issue: u64 = issue_id.parse().unwrap();
        Mock::given(method("POST"))
            .and(path("/zapi/execution"))
            .and(body_partial_json(json!({ "issueId": issue_id, "cycleId": CYCLE_ID })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                execution_id.to_string(): {
                    "id": execution_id,
                    "issueId": numeric_issue,
                    "cycleId": 77,
                    "executionStatus": "-1"
                }
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("PUT"))
            .and(path(format!("/zapi/execution/{execution_id}/execute")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": execution_id, "executionStatus": "1" })),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Bodies of all execute calls, in the order they were received.
    pub async fn executed(&self) -> Vec<(String, Value)> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method.as_str() == "PUT" && r.url.path().ends_with("/execute"))
            .map(|r| {
                let body: Value = serde_json::from_slice(&r.body).unwrap();
                (r.url.path().to_string(), body)
            })
            .collect()
    }
}
