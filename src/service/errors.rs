use thiserror::Error;

use crate::engine::RuleDefinitionError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to spawn diagnosis worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Invalid diagnosis rules: {0}")]
    Definition(#[from] RuleDefinitionError),
}
