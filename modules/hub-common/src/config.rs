use std::env;

/// Process configuration loaded from environment variables.
///
/// Each binary loads only the fields it needs via one of the `*_from_env`
/// constructors below, following the teacher's
/// `Config::{scout,web,supervisor,editions}_from_env` split — a worker has
/// no business demanding `public_base_url`, and the API server has no
/// business demanding `feed_storage_dir` to be a writable local path if it
/// never touches the feed engine directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rabbitmq_url: String,
    pub redis_url: String,
    pub api_key_pepper: String,
    pub credentials_encryption_key: String,
    pub internal_admin_key: String,
    pub public_base_url: String,
    pub feed_storage_dir: String,
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Config for `hub-api`: needs everything an inbound HTTP request can
    /// touch (DB, rate-limit store, API-key pepper, public feed base URL).
    pub fn api_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            rabbitmq_url: env::var("RABBITMQ_URL").unwrap_or_default(),
            redis_url: required_env("REDIS_URL"),
            api_key_pepper: required_env("API_KEY_PEPPER"),
            credentials_encryption_key: required_env("CREDENTIALS_ENCRYPTION_KEY"),
            internal_admin_key: required_env("INTERNAL_ADMIN_KEY"),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            feed_storage_dir: env::var("FEED_STORAGE_DIR")
                .unwrap_or_else(|_| "./data/feeds".to_string()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }

    /// Config for the `hub-worker` dispatcher binaries: DB, broker, rate
    /// limiter (the delivery worker still rate-limits hosted-feed noop
    /// paths via the same store), and the credential key for delivery.
    pub fn worker_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            rabbitmq_url: env::var("RABBITMQ_URL").unwrap_or_default(),
            redis_url: env::var("REDIS_URL").unwrap_or_default(),
            api_key_pepper: String::new(),
            credentials_encryption_key: required_env("CREDENTIALS_ENCRYPTION_KEY"),
            internal_admin_key: String::new(),
            public_base_url: String::new(),
            feed_storage_dir: env::var("FEED_STORAGE_DIR")
                .unwrap_or_else(|_| "./data/feeds".to_string()),
            web_host: String::new(),
            web_port: 0,
        }
    }

    /// Config for `hub-migrate`: just the database.
    pub fn migrate_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            rabbitmq_url: String::new(),
            redis_url: String::new(),
            api_key_pepper: String::new(),
            credentials_encryption_key: String::new(),
            internal_admin_key: String::new(),
            public_base_url: String::new(),
            feed_storage_dir: String::new(),
            web_host: String::new(),
            web_port: 0,
        }
    }

    /// Log the presence and length (never the value) of each sensitive
    /// field, mirroring the teacher's `Config::log_redacted`.
    pub fn log_redacted(&self) {
        let vars = [
            ("API_KEY_PEPPER", &self.api_key_pepper),
            ("CREDENTIALS_ENCRYPTION_KEY", &self.credentials_encryption_key),
            ("INTERNAL_ADMIN_KEY", &self.internal_admin_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
