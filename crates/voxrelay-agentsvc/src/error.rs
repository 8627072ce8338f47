use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentSvcError {
    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("agent service request timed out")]
    Timeout,

    #[error("agent service returned an error status: {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("agent service request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to parse agent service response: {0}")]
    Decode(#[from] serde_json::Error),
}
