//! In-memory collaborators for tests.
//!
//! The fake engine keeps a small serde profile and paints a deterministic
//! image from it, so tests can observe customizations through rendering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Notify, broadcast};

use crate::backend::{Backend, ICON_BASE_COMMAND};
use crate::engine::{ColorMetadata, EngineInstance, EngineModule, OverlayPosition, RenderSurface};
use crate::error::{BackendError, EngineError, ThemeError};
use crate::icon_base::{IconBase, SizePx};
use crate::loader::ModuleSource;
use crate::theme::{OsTheme, PreferenceStore, ResolvedTheme, ThemeHandler, ThemeTarget, Unlisten};

/// Collects every event already queued on `rx`.
pub fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

// ============================================================================
// Engine
// ============================================================================

/// Counts engine instances across a test.
#[derive(Debug, Default)]
pub struct EngineStats {
    created: AtomicUsize,
    released: AtomicUsize,
    cache_clears: AtomicUsize,
}

impl EngineStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn cache_clears(&self) -> usize {
        self.cache_clears.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeModuleSource {
    loads: AtomicUsize,
    failure: Mutex<Option<String>>,
    stats: Arc<EngineStats>,
}

impl FakeModuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Makes the next fetch fail with `message`.
    pub fn fail_next_load(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }
}

impl ModuleSource for FakeModuleSource {
    type Module = FakeModule;

    async fn fetch(&self) -> Result<FakeModule, EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let failure = self.failure.lock().unwrap().take();
        tokio::task::yield_now().await;
        match failure {
            Some(message) => Err(EngineError::load(message)),
            None => Ok(FakeModule {
                stats: Arc::clone(&self.stats),
            }),
        }
    }
}

#[derive(Debug)]
pub struct FakeModule {
    stats: Arc<EngineStats>,
}

pub fn preset_colors() -> Vec<ColorMetadata> {
    vec![
        ColorMetadata::new("blue", "Blue", "#3b82f6"),
        ColorMetadata::new("green", "Green", "#22c55e"),
        ColorMetadata::new("broken", "Broken", "not-a-color"),
    ]
}

impl EngineModule for FakeModule {
    type Instance = FakeEngine;

    fn available_colors(&self) -> Vec<ColorMetadata> {
        preset_colors()
    }

    fn from_icon_base(&self, base: &IconBase) -> Result<FakeEngine, EngineError> {
        if base.is_empty() {
            return Err(EngineError::rejected("Icon base has no images"));
        }
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeEngine {
            base: base.clone(),
            profile: FakeProfile::default(),
            cache: HashMap::new(),
            stats: Arc::clone(&self.stats),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColorTargetSettings {
    rgb: [u8; 3],
    enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecalSettings {
    svg_data: String,
    scale: f32,
    enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverlaySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    svg_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emoji: Option<String>,
    position: OverlayPosition,
    scale: f32,
    enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FakeProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    color_target: Option<ColorTargetSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decal: Option<DecalSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overlay: Option<OverlaySettings>,
}

pub struct FakeEngine {
    base: IconBase,
    profile: FakeProfile,
    cache: HashMap<u32, RgbaImage>,
    stats: Arc<EngineStats>,
}

impl FakeEngine {
    fn render(&mut self, size: u32) -> Result<RgbaImage, EngineError> {
        if let Some(cached) = self.cache.get(&size) {
            return Ok(cached.clone());
        }
        let SizePx { width, height } = self
            .base
            .find_by_logical_size(size)
            .ok_or(EngineError::NoIconForSize(size))?
            .dimensions();

        let fill = match &self.profile.color_target {
            Some(target) if target.enabled => {
                let [r, g, b] = target.rgb;
                Rgba([r, g, b, 255])
            }
            _ => Rgba([200, 200, 200, 255]),
        };
        let mut image = RgbaImage::from_pixel(width, height, fill);

        if let Some(decal) = self.profile.decal.as_ref().filter(|d| d.enabled) {
            let shade = (decal.scale.clamp(0.0, 1.0) * 255.0) as u8;
            image.put_pixel(width / 2, height / 2, Rgba([shade, 0, 0, 255]));
        }
        if let Some(overlay) = self.profile.overlay.as_ref().filter(|o| o.enabled) {
            let (x, y) = match overlay.position {
                OverlayPosition::TopLeft => (0, 0),
                OverlayPosition::TopRight => (width - 1, 0),
                OverlayPosition::BottomLeft => (0, height - 1),
                OverlayPosition::BottomRight => (width - 1, height - 1),
                OverlayPosition::Center => (width / 2, height / 2),
            };
            image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
        }

        self.cache.insert(size, image.clone());
        Ok(image)
    }

    fn changed(&mut self) {
        self.cache.clear();
    }
}

impl EngineInstance for FakeEngine {
    fn render_to_canvas(
        &mut self,
        surface: &mut dyn RenderSurface,
        size: u32,
    ) -> Result<(), EngineError> {
        let image = self.render(size)?;
        surface.draw(&image)
    }

    fn render_to_pixels(&mut self, size: u32) -> Result<Vec<u8>, EngineError> {
        Ok(self.render(size)?.into_raw())
    }

    fn rendered_dimensions(&self, size: u32) -> Result<SizePx, EngineError> {
        self.base
            .find_by_logical_size(size)
            .map(|img| img.dimensions())
            .ok_or(EngineError::NoIconForSize(size))
    }

    fn set_color_target(&mut self, r: u8, g: u8, b: u8) -> Result<(), EngineError> {
        self.profile.color_target = Some(ColorTargetSettings {
            rgb: [r, g, b],
            enabled: true,
        });
        self.changed();
        Ok(())
    }

    fn set_color_target_enabled(&mut self, enabled: bool) -> Result<(), EngineError> {
        if let Some(target) = &mut self.profile.color_target {
            target.enabled = enabled;
        }
        self.changed();
        Ok(())
    }

    fn set_decal(&mut self, svg_data: Option<&str>, scale: f32) -> Result<(), EngineError> {
        match svg_data {
            Some(svg) if !svg.is_empty() => {
                self.profile.decal = Some(DecalSettings {
                    svg_data: svg.to_string(),
                    scale,
                    enabled: true,
                });
            }
            _ => {
                if let Some(decal) = &mut self.profile.decal {
                    decal.enabled = false;
                }
            }
        }
        self.changed();
        Ok(())
    }

    fn set_decal_enabled(&mut self, enabled: bool) -> Result<(), EngineError> {
        if let Some(decal) = &mut self.profile.decal {
            decal.enabled = enabled;
        }
        self.changed();
        Ok(())
    }

    fn set_overlay(
        &mut self,
        svg_data: Option<&str>,
        position: OverlayPosition,
        scale: f32,
    ) -> Result<(), EngineError> {
        match svg_data {
            Some(svg) if !svg.is_empty() => {
                self.profile.overlay = Some(OverlaySettings {
                    svg_data: Some(svg.to_string()),
                    emoji: None,
                    position,
                    scale,
                    enabled: true,
                });
            }
            _ => {
                if let Some(overlay) = &mut self.profile.overlay {
                    overlay.enabled = false;
                }
            }
        }
        self.changed();
        Ok(())
    }

    fn set_overlay_emoji(
        &mut self,
        emoji: &str,
        position: OverlayPosition,
        scale: f32,
    ) -> Result<(), EngineError> {
        if emoji.is_empty() || emoji.is_ascii() {
            return Err(EngineError::rejected(format!("Unsupported emoji: {emoji}")));
        }
        self.profile.overlay = Some(OverlaySettings {
            svg_data: None,
            emoji: Some(emoji.to_string()),
            position,
            scale,
            enabled: true,
        });
        self.changed();
        Ok(())
    }

    fn set_overlay_enabled(&mut self, enabled: bool) -> Result<(), EngineError> {
        if let Some(overlay) = &mut self.profile.overlay {
            overlay.enabled = enabled;
        }
        self.changed();
        Ok(())
    }

    fn export_profile_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(&self.profile)
            .map_err(|e| EngineError::rejected(format!("Failed to serialize profile: {e}")))
    }

    fn import_profile_json(&mut self, json: &str) -> Result<(), EngineError> {
        self.profile = serde_json::from_str(json)
            .map_err(|e| EngineError::rejected(format!("Failed to parse profile: {e}")))?;
        self.changed();
        Ok(())
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.profile = FakeProfile::default();
        self.changed();
        Ok(())
    }

    fn clear_cache(&mut self) {
        self.stats.cache_clears.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
    }

    fn release(self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Backend
// ============================================================================

pub struct FakeBackend {
    payload: Value,
    failure: Option<String>,
    gate: Option<Arc<Notify>>,
    requests: Mutex<Vec<String>>,
}

impl FakeBackend {
    /// Answers the icon base command with one variant per `(width, scale)`.
    pub fn with_sizes(variants: &[(u32, f64)]) -> Self {
        let images: Vec<Value> = variants
            .iter()
            .map(|(width, scale)| json!({ "width": width, "scale": scale, "pngData": "" }))
            .collect();
        Self::with_payload(json!({ "images": images }))
    }

    pub fn with_payload(payload: Value) -> Self {
        Self {
            payload,
            failure: None,
            gate: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::with_payload(Value::Null)
        }
    }

    /// Holds every response until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Backend for FakeBackend {
    async fn invoke(&self, command: &str) -> Result<Value, BackendError> {
        self.requests.lock().unwrap().push(command.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        tokio::task::yield_now().await;

        if command != ICON_BASE_COMMAND {
            return Err(BackendError::new(command, "unknown command"));
        }
        match &self.failure {
            Some(message) => Err(BackendError::new(command, message.clone())),
            None => Ok(self.payload.clone()),
        }
    }
}

// ============================================================================
// Theme
// ============================================================================

#[derive(Default)]
pub struct FakeOsTheme {
    current: Mutex<Option<ResolvedTheme>>,
    handlers: Arc<Mutex<Vec<(u64, ThemeHandler)>>>,
    next_id: AtomicU64,
    fail_queries: AtomicBool,
    fail_subscriptions: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeOsTheme {
    pub fn new(theme: Option<ResolvedTheme>) -> Self {
        Self {
            current: Mutex::new(theme),
            ..Self::default()
        }
    }

    /// Changes the OS theme and notifies every registered handler.
    pub fn change_theme(&self, theme: ResolvedTheme) {
        *self.current.lock().unwrap() = Some(theme);
        let handlers: Vec<ThemeHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(theme);
        }
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    /// Holds every later theme query until `gate` is notified.
    pub fn gate_queries(&self, gate: Arc<Notify>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

impl OsTheme for FakeOsTheme {
    async fn theme(&self) -> Result<Option<ResolvedTheme>, ThemeError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        tokio::task::yield_now().await;
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ThemeError::Query("window closed".to_string()));
        }
        Ok(*self.current.lock().unwrap())
    }

    async fn on_theme_changed(&self, handler: ThemeHandler) -> Result<Unlisten, ThemeError> {
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(ThemeError::Subscribe("event loop closed".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().push((id, handler));

        let handlers = Arc::clone(&self.handlers);
        Ok(Box::new(move || {
            handlers.lock().unwrap().retain(|(entry_id, _)| *entry_id != id);
        }))
    }
}

/// A preference store whose writes always fail, like a full quota.
pub struct ReadOnlyStore {
    value: Option<String>,
}

impl ReadOnlyStore {
    pub fn new(value: Option<&str>) -> Self {
        Self {
            value: value.map(str::to_string),
        }
    }
}

impl PreferenceStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> Option<String> {
        self.value.clone()
    }

    fn set(&self, key: &str, _value: &str) -> Result<(), ThemeError> {
        Err(ThemeError::Storage(format!("quota exceeded writing `{key}`")))
    }
}

/// Stands in for the document root; records every applied theme.
#[derive(Default)]
pub struct RecordingTarget {
    applied: Mutex<Vec<ResolvedTheme>>,
}

impl RecordingTarget {
    pub fn applied(&self) -> Vec<ResolvedTheme> {
        self.applied.lock().unwrap().clone()
    }

    /// Whether the root currently carries the `dark` class.
    pub fn is_dark(&self) -> bool {
        self.applied.lock().unwrap().last() == Some(&ResolvedTheme::Dark)
    }
}

impl ThemeTarget for Arc<RecordingTarget> {
    fn apply(&self, theme: ResolvedTheme) {
        self.applied.lock().unwrap().push(theme);
    }
}
