use std::env;

use crate::error::{GridironError, Result};

/// Service configuration, read once at startup.
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base_url: String,
    pub api_host: String,
    pub database_url: String,
    pub listen_port: u16,
    pub league: String,
    pub season: String,
}

const DEFAULT_BASE_URL: &str = "https://v1.american-football.api-sports.io";
const DEFAULT_API_HOST: &str = "v1.american-football.api-sports.io";

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = match env::var("SPORTS_API_KEY") {
            Ok(v) if !v.trim().is_empty() => v,
            Ok(_) => {
                return Err(GridironError::Config(
                    "SPORTS_API_KEY is set but empty".into(),
                ))
            }
            Err(_) => {
                return Err(GridironError::Config(
                    "SPORTS_API_KEY environment variable is not set".into(),
                ))
            }
        };

        // Prevent accidental use of sample/placeholder keys
        let key_lower = api_key.trim().to_lowercase();
        if key_lower.contains("change_me") || key_lower.contains("your_") {
            return Err(GridironError::Config(
                "SPORTS_API_KEY appears to be a placeholder value".into(),
            ));
        }

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "sqlite://nfl_data.db?mode=rwc".to_string());

        Ok(Self {
            api_key,
            api_base_url: env::var("SPORTS_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_host: env::var("SPORTS_API_HOST")
                .unwrap_or_else(|_| DEFAULT_API_HOST.to_string()),
            database_url,
            listen_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            league: env::var("LEAGUE").unwrap_or_else(|_| "1".to_string()),
            season: env::var("SEASON").unwrap_or_else(|_| "2024".to_string()),
        })
    }
}
