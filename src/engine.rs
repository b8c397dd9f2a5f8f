//! The rendering engine's capability contract.
//!
//! Compositing, tinting and caching live in an external engine. This module
//! fixes what the session controller needs from it: a module that lists the
//! folder color presets and builds instances from an [`IconBase`], and an
//! [`EngineInstance`] that owns the customization profile and renders it.

use std::str::FromStr;

use image::RgbaImage;
use palette::Srgb;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::icon_base::{IconBase, SizePx};

// ============================================================================
// ColorMetadata
// ============================================================================

/// A named folder color preset exposed by the engine module.
///
/// ```json
/// { "id": "blue", "name": "Blue", "hex": "#3b82f6" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ColorMetadata {
    pub id: String,
    pub name: String,
    /// Target color as `#rrggbb`.
    pub hex: String,
}

impl ColorMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>, hex: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            hex: hex.into(),
        }
    }

    /// Parses the preset's hex color.
    pub fn rgb(&self) -> Option<Srgb<u8>> {
        Srgb::from_str(&self.hex).ok()
    }
}

// ============================================================================
// OverlayPosition
// ============================================================================

/// Position for overlay placement within the icon's content bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    BottomLeft,
    #[default]
    BottomRight,
    TopLeft,
    TopRight,
    Center,
}

impl OverlayPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::Center => "center",
        }
    }
}

impl FromStr for OverlayPosition {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to [`OverlayPosition::BottomRight`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "top-left" => Self::TopLeft,
            "top-right" => Self::TopRight,
            "bottom-left" => Self::BottomLeft,
            "center" => Self::Center,
            _ => Self::BottomRight,
        })
    }
}

// ============================================================================
// RenderSurface
// ============================================================================

/// A drawing target for [`EngineInstance::render_to_canvas`].
///
/// The surface is resized to the rendered image before drawing, the way a
/// canvas element is.
pub trait RenderSurface {
    fn draw(&mut self, image: &RgbaImage) -> Result<(), EngineError>;
}

impl RenderSurface for RgbaImage {
    fn draw(&mut self, image: &RgbaImage) -> Result<(), EngineError> {
        if self.dimensions() != image.dimensions() {
            *self = RgbaImage::new(image.width(), image.height());
        }
        self.copy_from_slice(image.as_raw());
        Ok(())
    }
}

// ============================================================================
// Engine traits
// ============================================================================

/// A loaded and initialized engine module.
pub trait EngineModule: Send + Sync + 'static {
    type Instance: EngineInstance;

    /// All folder color presets known to the engine.
    fn available_colors(&self) -> Vec<ColorMetadata>;

    /// Builds a renderer for the given icon base.
    fn from_icon_base(&self, base: &IconBase) -> Result<Self::Instance, EngineError>;
}

/// A renderer owning one customization profile.
///
/// The instance holds resources outside Rust's ownership and must be
/// released explicitly with [`release`](Self::release).
pub trait EngineInstance {
    // ---- Rendering ----

    fn render_to_canvas(
        &mut self,
        surface: &mut dyn RenderSurface,
        size: u32,
    ) -> Result<(), EngineError>;

    /// Renders the icon at `size` and returns raw RGBA pixels.
    fn render_to_pixels(&mut self, size: u32) -> Result<Vec<u8>, EngineError>;

    fn rendered_dimensions(&self, size: u32) -> Result<SizePx, EngineError>;

    // ---- Layer configuration ----

    fn set_color_target(&mut self, r: u8, g: u8, b: u8) -> Result<(), EngineError>;

    fn set_color_target_enabled(&mut self, enabled: bool) -> Result<(), EngineError>;

    /// Sets the decal SVG. `None` or an empty string disables the decal.
    fn set_decal(&mut self, svg_data: Option<&str>, scale: f32) -> Result<(), EngineError>;

    fn set_decal_enabled(&mut self, enabled: bool) -> Result<(), EngineError>;

    /// Sets the overlay SVG. `None` or an empty string disables the overlay.
    fn set_overlay(
        &mut self,
        svg_data: Option<&str>,
        position: OverlayPosition,
        scale: f32,
    ) -> Result<(), EngineError>;

    /// Sets the overlay to an emoji. Rejects emoji the engine cannot draw.
    fn set_overlay_emoji(
        &mut self,
        emoji: &str,
        position: OverlayPosition,
        scale: f32,
    ) -> Result<(), EngineError>;

    fn set_overlay_enabled(&mut self, enabled: bool) -> Result<(), EngineError>;

    // ---- Profile ----

    fn export_profile_json(&self) -> Result<String, EngineError>;

    fn import_profile_json(&mut self, json: &str) -> Result<(), EngineError>;

    /// Clears all customizations and returns to the base icon.
    fn reset(&mut self) -> Result<(), EngineError>;

    /// Clears the render cache to free memory.
    fn clear_cache(&mut self);

    /// Frees the instance's underlying resources.
    fn release(self);
}
