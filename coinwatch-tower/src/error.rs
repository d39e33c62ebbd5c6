use coinwatch_client::ConfigError;
use thiserror::Error;

/// Failure to build the gate. Probing itself never fails: an unreachable
/// backend counts as "no session".
#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid route table: {0}")]
    Routes(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build probe client: {0}")]
    Http(#[from] reqwest::Error),
}
