use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use domain::protocol::{CommandEnvelope, COMMENTS_PATH};
use relay::Reply;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(news_id): Path<String>,
    Query(page): Query<PageParams>,
) -> (StatusCode, Json<Value>) {
    let cmd = CommandEnvelope {
        request_id: request_id(&headers),
        path: format!("{}/{}", COMMENTS_PATH, news_id),
        method: "GET".to_string(),
        body: json!({ "limit": page.limit, "offset": page.offset }),
    };
    render(state.dispatcher.dispatch(&cmd).await)
}

pub async fn post_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let cmd = CommandEnvelope {
        request_id: request_id(&headers),
        path: COMMENTS_PATH.to_string(),
        method: "POST".to_string(),
        body: payload,
    };
    render(state.dispatcher.dispatch(&cmd).await)
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| hex::encode(rand::random::<[u8; 16]>()))
}

fn render(reply: Reply) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match (reply.data, reply.error) {
        (_, Some(error)) => json!({ "error": error }),
        (Some(data), None) => data,
        (None, None) => Value::Null,
    };
    (status, Json(body))
}
