// src/error.rs
use thiserror::Error;

/// Conditions that end the whole run. Everything else is logged and
/// skipped at the step, athlete or team level.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("EMAIL/PASSWORD must be set in .env")]
    MissingCredentials,

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("profiles page did not load (url: {url})")]
    ProfilesPageUnreachable { url: String },

    #[error("no team options start with: {0}")]
    NoTeamsMatched(String),
}
