use thiserror::Error;

/// Error taxonomy for the prediction service.
///
/// `TeamNotFound`/`GameNotFound` map to 404 responses, `StatsUnavailable` is
/// returned inside an otherwise-successful analysis body, and everything else
/// surfaces as a generic upstream/internal failure. Nothing here is fatal to
/// the process.
#[derive(Error, Debug)]
pub enum GridironError {
    #[error("team not found: {0}")]
    TeamNotFound(String),

    #[error("game not found: {0}")]
    GameNotFound(i64),

    #[error("upstream API error: {0}")]
    Upstream(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stats unavailable: {0}")]
    StatsUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GridironError>;
