//! Session lifecycle types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::ColorMetadata;

/// Observable lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything owned by a ready session.
pub(crate) struct ReadySession<I> {
    pub engine: I,
    pub available_sizes: Vec<u32>,
    pub available_colors: Vec<ColorMetadata>,
}

/// The lifecycle state. `Ready` carries the engine instance, so a ready
/// session without an engine cannot be represented.
pub(crate) enum Lifecycle<I> {
    Uninitialized,
    Loading,
    Ready(ReadySession<I>),
    Error(String),
}

impl<I> Lifecycle<I> {
    pub fn status(&self) -> Status {
        match self {
            Self::Uninitialized => Status::Uninitialized,
            Self::Loading => Status::Loading,
            Self::Ready(_) => Status::Ready,
            Self::Error(_) => Status::Error,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn ready(&self) -> Option<&ReadySession<I>> {
        match self {
            Self::Ready(ready) => Some(ready),
            _ => None,
        }
    }
}

/// A point-in-time copy of a session's observable fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub status: Status,
    pub error: Option<String>,
    pub available_sizes: Vec<u32>,
    pub available_colors: Vec<ColorMetadata>,
    pub version: u64,
}

/// Notifications delivered to session subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StatusChanged(Status),
    /// The customization changed; consumers should re-render.
    VersionChanged(u64),
}
