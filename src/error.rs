use thiserror::Error;

/// Main error type for the trading runtime
#[derive(Error, Debug)]
pub enum TraderError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Broker transport errors (submission, cancel, subscription)
    #[error("Order submission failed: {0}")]
    OrderSubmission(String),

    #[error("Order cancel failed: {0}")]
    OrderCancel(String),

    #[error("Subscription change failed: {0}")]
    Subscription(String),

    #[error("Broker query failed: {0}")]
    BrokerQuery(String),

    // Session-boundary errors, fatal at session start
    #[error("Trading calendar lookup failed: {0}")]
    Calendar(String),

    #[error("No trading session for {0}")]
    MarketClosed(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for TraderError
pub type Result<T> = std::result::Result<T, TraderError>;
