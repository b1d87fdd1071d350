//! `/v1/tools` — list and invoke.

use crate::error::HttpError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use crossbar_tools::InvocationOutcome;
use serde_json::{json, Value};

pub async fn list(State(state): State<AppState>) -> Json<Value> {
    let data: Vec<Value> = state
        .tools
        .list_allowed()
        .iter()
        .map(|d| {
            json!({
                "name": d.name,
                "description": d.description,
                "parameters": d.parameters,
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

/// Retrieve a logged invocation by replay ID.
pub async fn replay(
    State(state): State<AppState>,
    Path(replay_id): Path<String>,
) -> Result<axum::response::Response, HttpError> {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    match state.tools.lookup_replay(&replay_id)? {
        Some(record) => Ok(Json(serde_json::to_value(record).unwrap_or(Value::Null)).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "replay_not_found",
                "message": format!("no invocation logged under {replay_id}"),
            })),
        )
            .into_response()),
    }
}

/// Invoke one tool. Tool failures are not HTTP failures: a tool that ran
/// and errored still answers 200, with `outcome: "failed"`.
pub async fn invoke(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, HttpError> {
    let arguments = body
        .and_then(|Json(v)| v.get("arguments").cloned())
        .unwrap_or_else(|| json!({}));

    let record = state.tools.invoke(&name, &arguments).await?;

    let mut response = json!({
        "replay_id": record.replay_id,
        "request_hash": record.request_hash,
        "outcome": record.outcome,
    });
    match record.outcome {
        InvocationOutcome::Ok => response["result"] = record.result_or_error,
        _ => response["error"] = record.result_or_error,
    }
    Ok(Json(response))
}
