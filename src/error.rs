//! Error types for the session and theme controllers.

use thiserror::Error;

use crate::session::Status;

/// Result type alias defaulting to [`SessionError`].
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

// ============================================================================
// Engine / Backend
// ============================================================================

/// An error reported by the rendering engine or its module loader.
///
/// Cloneable so a single failed load can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The engine rejected the input (malformed emoji, malformed profile, ...).
    #[error("{0}")]
    Rejected(String),

    /// The engine module could not be fetched or initialized.
    #[error("Failed to load engine module: {0}")]
    Load(String),

    #[error("No icon available at requested size {0}")]
    NoIconForSize(u32),

    /// The render surface refused the rendered image.
    #[error("Render surface error: {0}")]
    Surface(String),
}

impl EngineError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::Load(message.into())
    }
}

/// A failed backend IPC request.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Backend request `{command}` failed: {message}")]
pub struct BackendError {
    pub command: String,
    pub message: String,
}

impl BackendError {
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Why an `init()` attempt failed.
///
/// Never returned to callers of `init()`; its message becomes the session's
/// error field.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    EngineLoad(EngineError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Failed to decode icon base: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to create renderer from icon base: {0}")]
    EngineConstruct(EngineError),
}

// ============================================================================
// Session
// ============================================================================

/// Errors returned by session controller operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An engine operation was attempted outside the `Ready` state.
    #[error("Renderer not initialized. Call init() first. (`{operation}` while {status})")]
    InvalidState {
        operation: &'static str,
        status: Status,
    },

    /// The engine rejected a delegated call.
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Unknown folder color preset: {0}")]
    UnknownColorPreset(String),
}

impl SessionError {
    /// Returns true for the usage-bug class of errors.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

// ============================================================================
// Theme
// ============================================================================

/// Errors raised by the theme controller's collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThemeError {
    #[error("Failed to query system theme: {0}")]
    Query(String),

    #[error("Failed to subscribe to theme changes: {0}")]
    Subscribe(String),

    #[error("Failed to persist theme preference: {0}")]
    Storage(String),
}
