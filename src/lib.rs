//! folco-session: client-side session layer for the folder icon customizer.
//!
//! This crate coordinates an external icon rendering engine for a UI. It
//! loads the engine module once, fetches the folder icon base from the
//! application backend, and exposes the engine's customization operations
//! behind a guarded lifecycle with a version counter that tells the UI when
//! to re-render.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use folco_session::{EngineLoader, OverlayPosition, SessionController, Status};
//!
//! let loader = Arc::new(EngineLoader::new(wasm_source));
//! let session = SessionController::new(loader, tauri_backend);
//!
//! session.init().await;
//! assert_eq!(session.status(), Status::Ready);
//!
//! let mut version = session.watch_version();
//! session.set_folder_color_target(59, 130, 246)?;
//! session.set_overlay_emoji("🦆", OverlayPosition::BottomRight, 0.4)?;
//!
//! // Once per frame
//! if version.has_changed()? {
//!     version.borrow_and_update();
//!     let pixels = session.render_to_pixels(256)?;
//! }
//! ```
//!
//! # Themes
//!
//! [`ThemeController`] is independent of the session. It resolves a
//! light/dark/system preference against the OS theme and follows OS theme
//! changes while the preference is `system`.

mod backend;
mod config;
mod engine;
mod error;
mod icon_base;
mod loader;
mod session;
mod theme;

#[cfg(test)]
mod testing;

pub use backend::{Backend, ICON_BASE_COMMAND, fetch_icon_base};
pub use config::{EmojiFailurePolicy, SessionConfig, ThemeConfig};
pub use engine::{ColorMetadata, EngineInstance, EngineModule, OverlayPosition, RenderSurface};
pub use error::{BackendError, EngineError, InitError, Result, SessionError, ThemeError};
pub use icon_base::{IconBase, IconBaseImage, RectPx, SizePx};
pub use loader::{EngineLoader, ModuleSource};
pub use session::{SessionController, SessionEvent, SessionSnapshot, Status};
pub use theme::{
    MemoryPreferenceStore, OsTheme, ParsePreferenceError, PreferenceStore, ResolvedTheme,
    ThemeController, ThemeEvent, ThemeHandler, ThemePreference, ThemeTarget, Unlisten,
};
