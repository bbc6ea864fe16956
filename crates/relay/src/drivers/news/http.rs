use async_trait::async_trait;
use domain::ArticleId;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use crate::error::CheckError;
use crate::traits::ArticleChecker;

/// Asks the news service over HTTP: `GET {base_url}/news/{id}`.
pub struct HttpArticleChecker {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpArticleChecker {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl ArticleChecker for HttpArticleChecker {
    async fn exists(&self, news_id: ArticleId) -> Result<bool, CheckError> {
        let url = format!("{}/news/{}", self.base_url, news_id);
        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                CheckError::Unavailable(format!("news service timed out after {:?}", self.timeout))
            } else {
                CheckError::Unavailable(e.to_string())
            }
        })?;

        let status = resp.status();
        debug!("News service answered {} for {}", status, url);
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(CheckError::Unavailable(format!("news service returned {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode as AxumStatus, routing::get, Router};

    async fn news(Path(id): Path<i64>) -> AxumStatus {
        match id {
            42 => AxumStatus::OK,
            7 => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                AxumStatus::OK
            }
            500 => AxumStatus::INTERNAL_SERVER_ERROR,
            _ => AxumStatus::NOT_FOUND,
        }
    }

    async fn spawn_news_service() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/news/:id", get(news));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn maps_statuses() {
        let base = spawn_news_service().await;
        let checker = HttpArticleChecker::new(&format!("{}/", base), Duration::from_secs(1)).unwrap();

        assert!(checker.exists(ArticleId::new_unchecked(42)).await.unwrap());
        assert!(!checker.exists(ArticleId::new_unchecked(999)).await.unwrap());
        assert!(matches!(
            checker.exists(ArticleId::new_unchecked(500)).await,
            Err(CheckError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn slow_service_fails_fast() {
        let base = spawn_news_service().await;
        let checker = HttpArticleChecker::new(&base, Duration::from_millis(200)).unwrap();

        let started = std::time::Instant::now();
        let err = checker.exists(ArticleId::new_unchecked(7)).await.unwrap_err();
        assert!(matches!(err, CheckError::Unavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = HttpArticleChecker::new(&format!("http://{}", addr), Duration::from_millis(500)).unwrap();
        assert!(matches!(
            checker.exists(ArticleId::new_unchecked(1)).await,
            Err(CheckError::Unavailable(_))
        ));
    }
}
