//! Icon base payload types.
//!
//! The backend describes the system folder icon as a set of image variants,
//! each with a pixel width and a display scale factor. The session controller
//! only needs the variants' logical sizes; everything else in the payload is
//! carried through untouched to the engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// A rectangle defined in pixel coordinates.
///
/// Used to specify regions within an image, such as content bounds
/// that indicate where the actual icon content exists (excluding padding/margins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct RectPx {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RectPx {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// A 2D size in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizePx {
    pub width: u32,
    pub height: u32,
}

impl SizePx {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

// ============================================================================
// IconBaseImage
// ============================================================================

/// One image variant of the icon base.
///
/// ```json
/// { "width": 64, "height": 64, "scale": 2.0, "pngData": "..." }
/// ```
///
/// Fields this layer does not interpret (encoded pixels, etc.) are kept in
/// [`extra`](Self::extra) so the payload can be handed to the engine as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct IconBaseImage {
    /// Pixel width of the image.
    pub width: u32,

    /// Pixel height of the image. Defaults to `width` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// The display scale factor (1.0 for @1x, 2.0 for @2x, ...).
    pub scale: f64,

    /// The region within the image that contains the actual icon content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_bounds: Option<RectPx>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IconBaseImage {
    /// Creates a variant with no extra payload.
    pub fn new(width: u32, scale: f64) -> Self {
        Self {
            width,
            height: None,
            scale,
            content_bounds: None,
            extra: Map::new(),
        }
    }

    /// Returns the pixel dimensions of the image.
    pub fn dimensions(&self) -> SizePx {
        SizePx::new(self.width, self.height.unwrap_or(self.width))
    }

    /// Returns the logical size, `round(width / scale)`.
    ///
    /// Returns `None` when the scale is zero, negative, or not finite.
    pub fn logical_size(&self) -> Option<u32> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return None;
        }
        Some((f64::from(self.width) / self.scale).round() as u32)
    }
}

// ============================================================================
// IconBase
// ============================================================================

/// The backend-supplied icon base: every available source image variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct IconBase {
    pub images: Vec<IconBaseImage>,
}

impl IconBase {
    pub fn from_images(images: Vec<IconBaseImage>) -> Self {
        Self { images }
    }

    /// Decodes an icon base from a backend JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Logical sizes of all variants, deduplicated and sorted ascending.
    ///
    /// Variants with an unusable scale are skipped.
    pub fn available_sizes(&self) -> Vec<u32> {
        let mut sizes: Vec<u32> = self
            .images
            .iter()
            .filter_map(|img| {
                let size = img.logical_size();
                if size.is_none() {
                    warn!(
                        width = img.width,
                        scale = img.scale,
                        "Skipping icon variant with invalid scale"
                    );
                }
                size
            })
            .collect();
        sizes.sort_unstable();
        sizes.dedup();
        sizes
    }

    /// Finds the variant whose logical size is closest to `target_size`.
    pub fn find_by_logical_size(&self, target_size: u32) -> Option<&IconBaseImage> {
        self.images
            .iter()
            .filter_map(|img| img.logical_size().map(|size| (img, size)))
            .min_by_key(|(_, size)| size.abs_diff(target_size))
            .map(|(img, _)| img)
    }
}
