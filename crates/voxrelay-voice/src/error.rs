use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("agent service error: {0}")]
    AgentSvc(#[from] voxrelay_agentsvc::AgentSvcError),

    #[error("fabric error: {0}")]
    Fabric(#[from] voxrelay_fabric::FabricError),

    #[error("provider request failed: {0}")]
    Provider(#[from] reqwest::Error),

    #[error("provider returned an error status: {0}")]
    ProviderStatus(reqwest::StatusCode),

    #[error("memory has not been loaded for this agent yet")]
    MemoryNotLoaded,

    #[error("malformed data-channel message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("all retry attempts exhausted")]
    RetriesExhausted,

    #[error("provider subprocess error: {0}")]
    ProviderIo(String),
}
