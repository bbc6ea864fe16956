use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::state::AppState;

const DEFAULT_PAGE: usize = 100;
const MAX_PAGE: usize = 500;

#[derive(Deserialize, Default)]
pub struct ReadParams {
    pub offset: Option<u64>,
    pub limit: Option<usize>,
}

impl ReadParams {
    fn page_size(&self) -> usize {
        match self.limit {
            Some(0) | None => DEFAULT_PAGE,
            Some(n) => n.min(MAX_PAGE),
        }
    }
}

fn known_topic(state: &AppState, topic: &str) -> bool {
    let relay = &state.relay;
    topic == relay.list_topic || topic == relay.add_topic || topic == relay.response_topic
}

/// 原样写入请求 topic，由 relay 消费
pub async fn publish_raw(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), (StatusCode, String)> {
    if topic != state.relay.list_topic && topic != state.relay.add_topic {
        return Err((StatusCode::NOT_FOUND, format!("unknown input topic: {}", topic)));
    }

    let offset = state.bus.append(&topic, None, &body).map_err(|e| {
        warn!("Failed to append to {}: {}", topic, e);
        (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;
    debug!(topic = %topic, offset, "Accepted raw command");

    Ok((StatusCode::ACCEPTED, Json(json!({ "topic": topic, "offset": offset }))))
}

pub async fn read_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(params): Query<ReadParams>,
) -> Result<Json<Vec<Value>>, (StatusCode, String)> {
    if !known_topic(&state, &topic) {
        return Err((StatusCode::NOT_FOUND, format!("unknown topic: {}", topic)));
    }

    let messages = state
        .bus
        .read(&topic, params.offset.unwrap_or(0), params.page_size())
        .into_iter()
        .map(|m| {
            // 非 JSON 负载按字符串返回
            let payload = serde_json::from_slice::<Value>(&m.payload)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&m.payload).into_owned()));
            json!({
                "offset": m.offset,
                "key": m.key.map(|k| String::from_utf8_lossy(&k).into_owned()),
                "payload": payload,
            })
        })
        .collect();

    Ok(Json(messages))
}
