//! The session controller.
//!
//! [`SessionController`] guards the engine instance behind a lifecycle:
//!
//! ```text
//! Uninitialized ──init()──▶ Loading ──ok──▶ Ready
//!       ▲                      │
//!       │                      └──err──▶ Error ──init()──▶ Loading
//!       └────────── destroy() from any state
//! ```
//!
//! `init()` loads the engine module and requests the icon base from the
//! backend concurrently; both must succeed for the session to become ready.
//! Initialization failures are absorbed into the `Error` status and its
//! message. Every engine operation requires `Ready` and otherwise fails with
//! [`SessionError::InvalidState`].
//!
//! Each mutating operation bumps a version counter exactly once, after
//! delegating to the engine and whether or not the engine accepted the
//! change. Consumers re-render whenever the version moves. Reads (rendering,
//! dimension queries, profile export, cache clearing) never bump it.
//!
//! The version lives in a [`watch`] channel so a render loop can poll
//! [`watch::Receiver::has_changed`] every frame; status transitions and
//! version bumps are also published on a [`broadcast`] channel.

mod state;

pub use state::{SessionEvent, SessionSnapshot, Status};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::TryFutureExt;
use futures_util::future::try_join;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, fetch_icon_base};
use crate::config::{EmojiFailurePolicy, SessionConfig};
use crate::engine::{ColorMetadata, EngineInstance, EngineModule, OverlayPosition, RenderSurface};
use crate::error::{EngineError, InitError, Result, SessionError};
use crate::icon_base::SizePx;
use crate::loader::{EngineLoader, ModuleSource};
use state::{Lifecycle, ReadySession};

type InstanceOf<S> = <<S as ModuleSource>::Module as EngineModule>::Instance;

/// Events buffered per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

struct Inner<I> {
    lifecycle: Lifecycle<I>,
    /// Bumped by `destroy()`; an `init()` that started in an older epoch
    /// discards its result.
    epoch: u64,
}

impl<I> Inner<I> {
    fn ready(&self, operation: &'static str) -> Result<&ReadySession<I>> {
        self.lifecycle.ready().ok_or(SessionError::InvalidState {
            operation,
            status: self.lifecycle.status(),
        })
    }

    fn engine_mut(&mut self, operation: &'static str) -> Result<&mut I> {
        match &mut self.lifecycle {
            Lifecycle::Ready(ready) => Ok(&mut ready.engine),
            other => Err(SessionError::InvalidState {
                operation,
                status: other.status(),
            }),
        }
    }
}

// ============================================================================
// SessionController
// ============================================================================

/// Owns the engine instance and exposes the customization API to the UI.
pub struct SessionController<S: ModuleSource, B: Backend> {
    loader: Arc<EngineLoader<S>>,
    backend: B,
    config: SessionConfig,
    inner: Mutex<Inner<InstanceOf<S>>>,
    version: watch::Sender<u64>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl<S: ModuleSource, B: Backend> SessionController<S, B> {
    /// Creates an uninitialized session using a shared engine loader.
    pub fn new(loader: Arc<EngineLoader<S>>, backend: B) -> Self {
        Self::with_config(loader, backend, SessionConfig::default())
    }

    /// Creates an uninitialized session with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `loader` - The engine loader, usually shared by every session
    /// * `backend` - The application backend answering the icon base request
    /// * `config` - Backend command name and emoji failure policy
    pub fn with_config(loader: Arc<EngineLoader<S>>, backend: B, config: SessionConfig) -> Self {
        let (version, _) = watch::channel(0);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            loader,
            backend,
            config,
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::Uninitialized,
                epoch: 0,
            }),
            version,
            event_tx,
        }
    }

    // ---- Lifecycle ----

    /// Loads the engine and creates the renderer.
    ///
    /// Does nothing while a previous call is loading or after it succeeded.
    /// Never fails: errors end up in [`status`](Self::status) and
    /// [`error`](Self::error).
    pub async fn init(&self) {
        let epoch = {
            let mut inner = self.lock();
            if matches!(inner.lifecycle, Lifecycle::Loading | Lifecycle::Ready(_)) {
                debug!(status = %inner.lifecycle.status(), "Renderer init skipped");
                return;
            }
            inner.lifecycle = Lifecycle::Loading;
            inner.epoch
        };
        self.notify(SessionEvent::StatusChanged(Status::Loading));

        let outcome = self.load().await;

        let status = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                debug!("Session destroyed while initializing, discarding renderer");
                if let Ok(ready) = outcome {
                    ready.engine.release();
                }
                return;
            }
            inner.lifecycle = match outcome {
                Ok(ready) => {
                    info!(
                        sizes = ?ready.available_sizes,
                        colors = ready.available_colors.len(),
                        "Renderer ready"
                    );
                    Lifecycle::Ready(ready)
                }
                Err(err) => {
                    error!(error = %err, "Failed to initialize renderer");
                    Lifecycle::Error(err.to_string())
                }
            };
            inner.lifecycle.status()
        };
        self.notify(SessionEvent::StatusChanged(status));
    }

    async fn load(&self) -> std::result::Result<ReadySession<InstanceOf<S>>, InitError> {
        let (module, icon_base) = try_join(
            self.loader.ensure_loaded().map_err(InitError::EngineLoad),
            fetch_icon_base(&self.backend, &self.config.icon_base_command),
        )
        .await?;

        let available_colors = module.available_colors();
        let available_sizes = icon_base.available_sizes();
        let engine = module
            .from_icon_base(&icon_base)
            .map_err(InitError::EngineConstruct)?;

        Ok(ReadySession {
            engine,
            available_sizes,
            available_colors,
        })
    }

    /// Releases the renderer and returns to `Uninitialized`.
    ///
    /// Safe to call in any state, including repeatedly.
    pub fn destroy(&self) {
        let previous = {
            let mut inner = self.lock();
            inner.epoch += 1;
            std::mem::replace(&mut inner.lifecycle, Lifecycle::Uninitialized)
        };

        let was = previous.status();
        if let Lifecycle::Ready(ready) = previous {
            ready.engine.release();
            debug!("Renderer released");
        }
        if was != Status::Uninitialized {
            self.notify(SessionEvent::StatusChanged(Status::Uninitialized));
        }
    }

    // ---- Observable state ----

    /// The current lifecycle status.
    pub fn status(&self) -> Status {
        self.lock().lifecycle.status()
    }

    /// The message of the last failed `init()`, if the session is in `Error`.
    pub fn error(&self) -> Option<String> {
        self.lock().lifecycle.error().map(str::to_string)
    }

    /// Shorthand for `status() == Status::Ready`.
    pub fn is_ready(&self) -> bool {
        self.status() == Status::Ready
    }

    /// The number of mutating operations applied so far.
    ///
    /// Starts at 0 and never decreases, not even across `destroy()`.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Returns a receiver for the version counter.
    ///
    /// The current value is marked as seen, so `has_changed()` reports only
    /// bumps made after this call.
    pub fn watch_version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Logical icon sizes, ascending. Empty unless ready.
    pub fn available_sizes(&self) -> Vec<u32> {
        self.lock()
            .lifecycle
            .ready()
            .map(|ready| ready.available_sizes.clone())
            .unwrap_or_default()
    }

    /// Folder color presets. Empty unless ready.
    pub fn available_colors(&self) -> Vec<ColorMetadata> {
        self.lock()
            .lifecycle
            .ready()
            .map(|ready| ready.available_colors.clone())
            .unwrap_or_default()
    }

    /// Copies every observable field under a single lock.
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        let ready = inner.lifecycle.ready();
        SessionSnapshot {
            status: inner.lifecycle.status(),
            error: inner.lifecycle.error().map(str::to_string),
            available_sizes: ready.map(|r| r.available_sizes.clone()).unwrap_or_default(),
            available_colors: ready.map(|r| r.available_colors.clone()).unwrap_or_default(),
            version: *self.version.borrow(),
        }
    }

    /// Subscribe to session events.
    ///
    /// The receiver gets a [`SessionEvent`] after every status transition
    /// and version bump made after this call. Dropping it unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The engine loader this session draws its module from.
    pub fn loader(&self) -> &Arc<EngineLoader<S>> {
        &self.loader
    }

    /// The backend used for the icon base request.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ---- Rendering ----

    /// Renders the current icon onto `surface`.
    pub fn render_to_canvas(&self, surface: &mut dyn RenderSurface, size: u32) -> Result<()> {
        self.with_engine("render_to_canvas", |engine| {
            engine.render_to_canvas(surface, size)
        })
    }

    /// Renders the current icon and returns raw RGBA pixel data.
    pub fn render_to_pixels(&self, size: u32) -> Result<Vec<u8>> {
        self.with_engine("render_to_pixels", |engine| engine.render_to_pixels(size))
    }

    /// Returns the pixel dimensions of the icon rendered at `size`.
    pub fn rendered_dimensions(&self, size: u32) -> Result<SizePx> {
        self.with_engine("rendered_dimensions", |engine| {
            engine.rendered_dimensions(size)
        })
    }

    // ---- Customization ----

    /// Tints the folder with the given color and enables the tint.
    ///
    /// # Arguments
    ///
    /// * `r` - Red component (0-255)
    /// * `g` - Green component (0-255)
    /// * `b` - Blue component (0-255)
    pub fn set_folder_color_target(&self, r: u8, g: u8, b: u8) -> Result<()> {
        self.mutate("set_folder_color_target", |engine| {
            engine.set_color_target(r, g, b)
        })
    }

    /// Toggles the folder tint without forgetting its color.
    pub fn set_folder_color_target_enabled(&self, enabled: bool) -> Result<()> {
        self.mutate("set_folder_color_target_enabled", |engine| {
            engine.set_color_target_enabled(enabled)
        })
    }

    /// Targets the color of one of the [`available_colors`](Self::available_colors).
    ///
    /// An unknown id is rejected without touching the engine or the version.
    pub fn set_folder_color_preset(&self, id: &str) -> Result<()> {
        let rgb = {
            let inner = self.lock();
            inner
                .ready("set_folder_color_preset")?
                .available_colors
                .iter()
                .find(|color| color.id == id)
                .and_then(ColorMetadata::rgb)
                .ok_or_else(|| SessionError::UnknownColorPreset(id.to_string()))?
        };
        self.set_folder_color_target(rgb.red, rgb.green, rgb.blue)
    }

    /// Sets the decal SVG. `None` disables the decal.
    ///
    /// # Arguments
    ///
    /// * `svg_data` - SVG source, or `None` to disable the decal
    /// * `scale` - Decal size relative to the icon (0.0 - 1.0)
    pub fn set_decal(&self, svg_data: Option<&str>, scale: f32) -> Result<()> {
        self.mutate("set_decal", |engine| engine.set_decal(svg_data, scale))
    }

    /// Toggles the decal without forgetting its SVG.
    pub fn set_decal_enabled(&self, enabled: bool) -> Result<()> {
        self.mutate("set_decal_enabled", |engine| engine.set_decal_enabled(enabled))
    }

    /// Sets the overlay SVG. `None` disables the overlay.
    ///
    /// # Arguments
    ///
    /// * `svg_data` - SVG source, or `None` to disable the overlay
    /// * `position` - Corner or center the overlay is anchored to
    /// * `scale` - Overlay size relative to the icon (0.0 - 1.0)
    pub fn set_overlay(
        &self,
        svg_data: Option<&str>,
        position: OverlayPosition,
        scale: f32,
    ) -> Result<()> {
        self.mutate("set_overlay", |engine| {
            engine.set_overlay(svg_data, position, scale)
        })
    }

    /// Sets the overlay to an emoji.
    ///
    /// With [`EmojiFailurePolicy::Log`] (the default) an emoji the engine
    /// rejects is logged and not reported. The version advances either way.
    pub fn set_overlay_emoji(
        &self,
        emoji: &str,
        position: OverlayPosition,
        scale: f32,
    ) -> Result<()> {
        let policy = self.config.emoji_failure_policy;
        self.mutate("set_overlay_emoji", |engine| {
            match engine.set_overlay_emoji(emoji, position, scale) {
                Err(err) if policy == EmojiFailurePolicy::Log => {
                    warn!(error = %err, emoji, "Failed to set overlay emoji");
                    Ok(())
                }
                other => other,
            }
        })
    }

    /// Toggles the overlay without forgetting its content.
    pub fn set_overlay_enabled(&self, enabled: bool) -> Result<()> {
        self.mutate("set_overlay_enabled", |engine| {
            engine.set_overlay_enabled(enabled)
        })
    }

    // ---- Profile ----

    /// Exports the current customization as the engine's profile JSON.
    pub fn export_profile_json(&self) -> Result<String> {
        self.with_engine("export_profile_json", |engine| engine.export_profile_json())
    }

    /// Replaces the current customization with a previously exported profile.
    ///
    /// A malformed profile is rejected by the engine; the version still
    /// advances.
    pub fn import_profile_json(&self, json: &str) -> Result<()> {
        self.mutate("import_profile_json", |engine| engine.import_profile_json(json))
    }

    /// Clears all customizations and returns to the base icon.
    pub fn reset(&self) -> Result<()> {
        self.mutate("reset", |engine| engine.reset())
    }

    /// Clears the engine's render cache.
    pub fn clear_cache(&self) -> Result<()> {
        self.with_engine("clear_cache", |engine| {
            engine.clear_cache();
            Ok(())
        })
    }

    // ---- Internals ----

    fn with_engine<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut InstanceOf<S>) -> std::result::Result<T, EngineError>,
    ) -> Result<T> {
        let mut inner = self.lock();
        let engine = inner.engine_mut(operation)?;
        Ok(f(engine)?)
    }

    /// Delegates to the engine, then bumps the version exactly once.
    fn mutate(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut InstanceOf<S>) -> std::result::Result<(), EngineError>,
    ) -> Result<()> {
        let (outcome, version) = {
            let mut inner = self.lock();
            let engine = inner.engine_mut(operation)?;
            let outcome = f(engine);
            let version = *self.version.borrow() + 1;
            self.version.send_replace(version);
            (outcome, version)
        };
        self.notify(SessionEvent::VersionChanged(version));
        Ok(outcome?)
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Inner<InstanceOf<S>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: ModuleSource, B: Backend> Drop for SessionController<S, B> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Lifecycle::Ready(ready) =
            std::mem::replace(&mut inner.lifecycle, Lifecycle::Uninitialized)
        {
            ready.engine.release();
        }
    }
}
