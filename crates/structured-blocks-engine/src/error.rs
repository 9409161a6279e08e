use crate::markup::MarkupError;
use crate::models::Uid;

/// Errors surfaced by the synchronisation core.
///
/// None of these are transient: the core does no I/O, so every error means
/// either bad input (aborted before the document is touched) or a contract
/// broken by a block definition or a corrupt document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown block type: {0}")]
    UnknownType(String),

    #[error("Block type is already registered: {0}")]
    DuplicateType(String),

    #[error("Render contract violated by block type {type_name}: {reason}")]
    RenderContractViolation { type_name: String, reason: String },

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("No block instance with uid {0}")]
    UnknownInstance(Uid),

    #[error("Invalid value for property {property} of block type {type_name}: {reason}")]
    InvalidProperty {
        type_name: String,
        property: String,
        reason: String,
    },

    #[error("Invalid document operation: {0}")]
    InvalidOperation(String),

    #[error("A mutation batch was started while another batch was being classified")]
    ReentrantMutation,

    #[error(transparent)]
    Markup(#[from] MarkupError),
}

impl EngineError {
    pub(crate) fn render(type_name: &str, reason: impl Into<String>) -> Self {
        EngineError::RenderContractViolation {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
