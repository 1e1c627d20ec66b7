pub mod client;
pub mod domain;
pub mod export;
pub mod render;
pub mod session;
pub mod storage;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_HISTORY_DIR: &str = ".retention_history";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub prediction_base_url: Option<String>,
        pub history_dir: PathBuf,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                prediction_base_url: std::env::var("PREDICTION_BASE_URL").ok(),
                history_dir: std::env::var("HISTORY_DIR")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_DIR)),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_prediction_base_url(&self) -> anyhow::Result<&str> {
            self.prediction_base_url
                .as_deref()
                .context("PREDICTION_BASE_URL is required")
        }
    }
}
