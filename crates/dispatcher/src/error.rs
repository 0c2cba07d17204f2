//! Dispatcher error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// At least one sink is required
    #[error("no sinks configured")]
    NoSinks,

    /// Sink names key metrics and mosaics
    #[error("duplicate sink name '{0}'")]
    DuplicateSink(String),
}
