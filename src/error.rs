use crate::engine::UnknownTracker;
use crate::feed::FetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("feed fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    UnknownTracker(#[from] UnknownTracker),
}
