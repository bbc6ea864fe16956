use serde_json::{json, Value};
use std::time::Duration;

use domain::protocol::{CommandEnvelope, ResponseEnvelope};

const BASE_URL: &str = "http://127.0.0.1:3000";
const NEWS_ID: i64 = 1;
const LIST_TOPIC: &str = "comments_input";
const RESPONSE_TOPIC: &str = "comments";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    println!("Starting comments test client...");

    println!("\n[1/3] Posting a comment over HTTP...");
    let resp = client
        .post(format!("{}/api/comments", BASE_URL))
        .json(&json!({
            "text": "This is a message from the comments test client!",
            "post_id": NEWS_ID,
        }))
        .send()
        .await?;

    let status = resp.status();
    let body: Value = resp.json().await?;
    if status.is_success() {
        println!("   -> ✅ Created {}", body["id"]);
    } else {
        println!("   -> ❌ Failed ({}): {}", status, body["error"]);
        return Ok(());
    }

    println!("\n[2/3] Sending a list command through the bus...");
    let request_id = format!("client-{}", std::process::id());
    let cmd = CommandEnvelope {
        request_id: request_id.clone(),
        path: format!("/comments/{}", NEWS_ID),
        method: "GET".to_string(),
        body: Value::Null,
    };
    let accepted: Value = client
        .post(format!("{}/api/bus/{}", BASE_URL, LIST_TOPIC))
        .json(&cmd)
        .send()
        .await?
        .json()
        .await?;
    println!("   -> Queued at offset {}", accepted["offset"]);

    println!("\n[3/3] Waiting for the response...");
    for _ in 0..30 {
        let messages: Vec<Value> = client
            .get(format!("{}/api/bus/{}", BASE_URL, RESPONSE_TOPIC))
            .send()
            .await?
            .json()
            .await?;

        let found = messages
            .into_iter()
            .filter_map(|m| serde_json::from_value::<ResponseEnvelope>(m["payload"].clone()).ok())
            .find(|r| r.request_id == request_id);

        if let Some(response) = found {
            if response.is_error() {
                println!(
                    "   -> ❌ Status {}: {}",
                    response.status,
                    response.error.unwrap_or_default()
                );
                return Ok(());
            }
            println!("   -> Status {}", response.status);
            let comments = response
                .data
                .as_ref()
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            println!("   -> Retrieved {} comment(s):", comments.len());
            for c in comments {
                println!("      - [{}] {}", c["created_at"], c["content"]);
            }
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    println!("   -> ❌ No response for {}", request_id);
    Ok(())
}
