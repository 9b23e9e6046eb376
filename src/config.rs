use std::path::PathBuf;

use rocket::figment::Figment;
use serde::Deserialize;

/// Application settings, read from the `portfolio` section of rocket's
/// figment (`Rocket.toml` or `ROCKET_PORTFOLIO_*` environment variables).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub session_idle_minutes: i64,
    pub session_absolute_minutes: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://portfolio.db".into(),
            upload_dir: PathBuf::from("webroot/uploads"),
            session_idle_minutes: 120,
            session_absolute_minutes: 1440,
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Self {
        match figment.extract_inner("portfolio") {
            Ok(config) => config,
            Err(e) => {
                warn!("Could not read the portfolio configuration, using defaults: {e}");
                Self::default()
            }
        }
    }
}
