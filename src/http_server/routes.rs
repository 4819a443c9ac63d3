//! Coordinator HTTP routes
//!
//! The four `/aquaserver/*` endpoints: test polling, result reporting,
//! status, and the report document. Every response is JSON with a 200
//! status; reporting problems are logged server-side and never bounced
//! back to the client.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coordinator::{now_millis, Coordinator};
use crate::dispatch::deliver_browser_test;
use crate::observability::Logger;

/// Build the coordinator's router
pub fn aqua_routes(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/aquaserver/next-test", get(next_test_handler))
        .route("/aquaserver/test-result", get(test_result_handler))
        .route("/aquaserver/status", get(status_handler))
        .route("/aquaserver/report", get(report_handler))
        .fallback(fallback_handler)
        .with_state(coordinator)
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Deserialize)]
pub struct NextTestQuery {
    /// `old=true` requests es5-capable tests only
    #[serde(default)]
    pub old: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NextTestResponse {
    #[serde(rename = "snapshotName")]
    pub snapshot_name: Option<String>,
    pub test: Option<Vec<String>>,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct TestResultQuery {
    pub result: String,
}

/// Shape posted back by browser pollers
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedResult {
    pub snapshot_name: String,
    pub test: Vec<String>,
    pub passed: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ReceivedResponse {
    pub received: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(rename = "startupTimestamp")]
    pub startup_timestamp: i64,
    #[serde(rename = "lastErrorString")]
    pub last_error_string: String,
}

// ==================
// Handlers
// ==================

async fn next_test_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Query(query): Query<NextTestQuery>,
) -> Json<NextTestResponse> {
    let es5_only = query.old.as_deref() == Some("true");

    let dispatched = {
        let mut state = coordinator.state();
        let mut rng = rand::thread_rng();
        deliver_browser_test(&mut state.snapshots, es5_only, &mut rng)
    };

    match dispatched {
        Some(dispatched) => {
            Logger::info(
                "SEND",
                &[
                    ("snapshot", dispatched.snapshot_name.as_str()),
                    ("test", &dispatched.names.join(",")),
                    ("url", dispatched.url.as_str()),
                ],
            );
            Json(NextTestResponse {
                snapshot_name: Some(dispatched.snapshot_name),
                test: Some(dispatched.names),
                url: dispatched.url,
            })
        }
        None => Json(NextTestResponse {
            snapshot_name: None,
            test: None,
            url: "no-test.html".to_string(),
        }),
    }
}

async fn test_result_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Query(query): Query<TestResultQuery>,
) -> Json<ReceivedResponse> {
    let received = Json(ReceivedResponse { received: "true" });

    let result: ReportedResult = match serde_json::from_str(&query.result) {
        Ok(result) => result,
        Err(e) => {
            Logger::info(
                "RESULT_DISCARDED",
                &[("reason", &format!("malformed result JSON: {}", e))],
            );
            return received;
        }
    };

    // Browser-side timeouts of the harness page itself are noise
    if let Some(message) = &result.message {
        if message.contains("errors.html#timeout") {
            return received;
        }
    }

    let message = if result.passed {
        None
    } else {
        Some(failure_message(
            result.message.as_deref(),
            result.id.as_ref(),
        ))
    };

    coordinator.record_test_result(
        &result.snapshot_name,
        &result.test,
        result.passed,
        now_millis() - result.timestamp,
        message,
    );

    received
}

/// Failure text with the reporting client's id appended
fn failure_message(message: Option<&str>, id: Option<&Value>) -> String {
    let id_string = id.map(|id| match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    match (message, id_string) {
        (Some(message), Some(id)) => format!("{}\nid: {}", message, id),
        (Some(message), None) => message.to_string(),
        (None, Some(id)) => format!("id: {}", id),
        (None, None) => String::new(),
    }
}

async fn status_handler(State(coordinator): State<Arc<Coordinator>>) -> Json<StatusResponse> {
    let state = coordinator.state();
    Json(StatusResponse {
        status: state.status.clone(),
        startup_timestamp: state.startup_timestamp,
        last_error_string: state.last_error.clone(),
    })
}

async fn report_handler(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    let report = coordinator.state().report_json.clone();
    ([(header::CONTENT_TYPE, "application/json")], report)
}

/// Unrecognized paths answer with an empty success, never an error page
async fn fallback_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_message_shapes() {
        assert_eq!(
            failure_message(Some("boom"), Some(&json!("client-7"))),
            "boom\nid: client-7"
        );
        assert_eq!(failure_message(Some("boom"), None), "boom");
        assert_eq!(failure_message(None, Some(&json!(12))), "id: 12");
        assert_eq!(failure_message(None, None), "");
    }

    #[test]
    fn test_reported_result_parses_camel_case() {
        let result: ReportedResult = serde_json::from_str(
            r#"{"snapshotName":"snapshot-5","test":["alpha","fuzz"],"passed":false,"message":"boom","id":"x","timestamp":100}"#,
        )
        .unwrap();
        assert_eq!(result.snapshot_name, "snapshot-5");
        assert_eq!(result.test, vec!["alpha", "fuzz"]);
        assert!(!result.passed);
        assert_eq!(result.timestamp, 100);
    }

    #[test]
    fn test_next_test_response_field_names() {
        let response = NextTestResponse {
            snapshot_name: None,
            test: None,
            url: "no-test.html".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("snapshotName").is_some());
        assert_eq!(json["url"], "no-test.html");
        assert_eq!(json["test"], Value::Null);
    }
}
