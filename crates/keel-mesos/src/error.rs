use thiserror::Error;

#[derive(Error, Debug)]
pub enum MesosError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    /// Malformed or unexpected message from the manager.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("manager rejected call with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no active subscription")]
    NotSubscribed,
}
