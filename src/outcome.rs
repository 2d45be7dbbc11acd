// src/outcome.rs

/// Result of a UI wait that is allowed to fail softly. Hard failures
/// (broken WebDriver session, I/O) still travel through `anyhow::Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Ok(T),
    NotFound,
    TimedOut,
}

impl<T> Outcome<T> {
    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::Ok(_) => "ok",
            Outcome::NotFound => "not-found",
            Outcome::TimedOut => "timeout",
        }
    }
}
