use config::ConfigError;
use domain::protocol::Paging;
use relay::RelaySettings;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const ENV_PREFIX: &str = "COMMENTS_";

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub news: NewsSettings,
    pub relay: RelayConfig,
    pub comments: CommentSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NewsMode {
    Http,
    Sql,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewsSettings {
    pub mode: NewsMode,
    // http 模式：新闻服务地址
    pub base_url: String,
    // sql 模式：新闻库连接串
    pub database_url: String,
    pub timeout_secs: u64,
}

impl NewsSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct RelayConfig {
    pub group: String,
    pub list_topic: String,
    pub add_topic: String,
    pub response_topic: String,
    pub poll_interval_ms: u64,
    pub backoff_ms: u64,
    // 无人消费的 topic（响应）最多保留的消息数
    pub bus_retention: usize,
}

impl RelayConfig {
    pub fn to_relay_settings(&self) -> RelaySettings {
        RelaySettings {
            group: self.group.clone(),
            list_topic: self.list_topic.clone(),
            add_topic: self.add_topic.clone(),
            response_topic: self.response_topic.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct CommentSettings {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl CommentSettings {
    pub fn paging(&self) -> Paging {
        Paging {
            default_limit: self.default_limit,
            max_limit: self.max_limit.max(self.default_limit),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        Self::build(&run_mode, collect_env_vars())
    }

    fn build(run_mode: &str, env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let env_json = serde_json::to_string(&env_map)
            .map_err(|e| ConfigError::Message(format!("Failed to serialize environment: {}", e)))?;

        let s = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.cors_origins", "*")?
            .set_default("database.url", "sqlite://data/comments.db")?
            .set_default("news.mode", "http")?
            .set_default("news.base_url", "http://localhost:8080")?
            .set_default("news.database_url", "sqlite://data/news.db")?
            .set_default("news.timeout_secs", 5)?
            .set_default("relay.group", "comments")?
            .set_default("relay.list_topic", "comments_input")?
            .set_default("relay.add_topic", "add_comments")?
            .set_default("relay.response_topic", "comments")?
            .set_default("relay.poll_interval_ms", 500)?
            .set_default("relay.backoff_ms", 1000)?
            .set_default("relay.bus_retention", 1000)?
            .set_default("comments.default_limit", 20)?
            .set_default("comments.max_limit", 100)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::File::with_name(&format!("config.{}", run_mode)).required(false))
            .add_source(config::File::from_str(&env_json, config::FileFormat::Json))
            .build()?;

        s.try_deserialize()
    }
}

fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .map(|(k, v)| {
            let new_key = k
                .trim_start_matches(ENV_PREFIX)
                .replace("__", ".")
                .to_lowercase();
            (new_key, v)
        })
        .collect()
}
