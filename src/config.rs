use std::env;

use anyhow::{ensure, Result};
use dotenvy::dotenv;

use crate::hooks::Event;
use crate::logging::LogFormat;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub event: String,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:clean_urls.db?mode=rwc".to_string());
        let event = env::var("CLEAN_URLS_EVENT").unwrap_or_else(|_| "send".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| {
            match env::var("APP_ENV").as_deref() {
                Ok("production") => "json".to_string(),
                _ => "pretty".to_string(),
            }
        });

        Self {
            database_url,
            event,
            log_format,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.database_url.trim().is_empty(),
            "DATABASE_URL must not be empty"
        );
        self.event()?;
        self.log_format()?;
        Ok(())
    }

    /// Hook the stdin host feeds messages into.
    pub fn event(&self) -> Result<Event> {
        Ok(self.event.parse()?)
    }

    pub fn log_format(&self) -> Result<LogFormat> {
        self.log_format.parse()
    }
}
