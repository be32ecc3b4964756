use thiserror::Error;

#[derive(Debug, Error)]
pub enum GolemError {
    #[error("action bus has no subscribers")]
    BusClosed,
}
