use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::sync::{Arc, Mutex};
use std::{fs, path::Path};
use tracing::info;

mod error;
mod models;
mod repo;

pub use error::StoreError;

#[derive(Clone)]
pub struct Db {
    pub(crate) pool: Pool<Sqlite>,
    clock: Arc<Mutex<NaiveDateTime>>,
}

impl Db {
    /// Opens the comments database, creating it when missing, and applies
    /// pending migrations.
    pub async fn new(db_url: &str) -> anyhow::Result<Self> {
        if !is_in_memory(db_url) {
            if let Some(parent) = file_path(db_url).and_then(Path::parent) {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
            }
            if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
                Sqlite::create_database(db_url).await?;
            }
        }
        let db = Self::open(db_url).await?;
        sqlx::migrate!("../../migrations").run(&db.pool).await?;
        Ok(db)
    }

    /// Opens an existing database without touching its schema. Used for the
    /// news database, which this service only reads; a missing database is
    /// an error.
    pub async fn connect(db_url: &str) -> anyhow::Result<Self> {
        if !is_in_memory(db_url) && !Sqlite::database_exists(db_url).await? {
            anyhow::bail!("database does not exist: {}", redact_url(db_url));
        }
        Self::open(db_url).await
    }

    async fn open(db_url: &str) -> anyhow::Result<Self> {
        // 内存库每个连接都是独立的库，只能用单连接
        let mut options = SqlitePoolOptions::new();
        if is_in_memory(db_url) {
            options = options.max_connections(1).idle_timeout(None).max_lifetime(None);
        }
        let pool = options.connect(db_url).await?;

        sqlx::query("PRAGMA journal_mode = WAL;")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL;")
            .execute(&pool)
            .await?;

        info!("Database connection established: {}", redact_url(db_url));
        Ok(Self {
            pool,
            clock: Arc::new(Mutex::new(NaiveDateTime::MIN)),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    // 保证同一进程内每次插入的时间戳严格递增
    pub(crate) fn next_timestamp(&self) -> NaiveDateTime {
        let now = Utc::now().naive_utc();
        let mut last = match self.clock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = if now > *last {
            now
        } else {
            *last + Duration::microseconds(1)
        };
        *last = next;
        next
    }
}

fn is_in_memory(db_url: &str) -> bool {
    db_url.contains(":memory:")
}

fn file_path(db_url: &str) -> Option<&Path> {
    db_url
        .strip_prefix("sqlite://")
        .map(|p| Path::new(p.split('?').next().unwrap_or(p)))
}

fn redact_url(db_url: &str) -> String {
    match db_url.split_once('@') {
        Some((scheme_and_user, host)) => {
            let scheme = scheme_and_user.split("://").next().unwrap_or("db");
            format!("{}://***@{}", scheme, host)
        }
        None => db_url.to_string(),
    }
}
