//! Configuration for stamping and publishing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Layout of the stamp drawn onto page 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampConfig {
    /// Side of the square QR image, in points (and in pixels for the marker).
    pub stamp_size: f32,

    /// Y used when the mapped stamp would start below the page.
    pub bottom_fallback: f32,

    /// Stamps at or below this Y get their label above the image.
    pub label_threshold: f32,

    /// First label line.
    pub caption: String,

    /// Caption font size in points.
    pub caption_font_size: f32,

    /// URL font size in points.
    pub url_font_size: f32,

    /// Caption gray level (0 = black).
    pub caption_gray: f32,

    /// URL fill color (RGB, 0..1).
    pub url_color: [f32; 3],

    /// Width of the clickable label region.
    pub link_width: f32,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StampConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            stamp_size: 80.0,
            bottom_fallback: 40.0,
            label_threshold: 40.0,
            caption: "Watch the explanatory video:".to_string(),
            caption_font_size: 8.0,
            url_font_size: 7.0,
            caption_gray: 0.3,
            url_color: [0.0, 0.4, 0.8],
            link_width: 200.0,
        }
    }

    /// Set the stamp size.
    pub fn with_stamp_size(mut self, size: f32) -> Self {
        self.stamp_size = size;
        self
    }

    /// Set the bottom fallback offset.
    pub fn with_bottom_fallback(mut self, offset: f32) -> Self {
        self.bottom_fallback = offset;
        self
    }

    /// Set the caption text.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }
}

/// Portal-level settings: where things are uploaded and how links look.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Origin the landing URL is built on, e.g. `https://portal.example`.
    pub origin: String,

    /// Bucket for explanatory videos.
    pub video_bucket: String,

    /// Bucket for stamped documents.
    pub document_bucket: String,

    /// Largest accepted video upload.
    pub max_video_bytes: u64,

    /// Title stored when the form leaves it blank.
    pub default_title: String,

    /// Pixel size of the generated QR raster.
    pub qr_pixel_size: u32,

    /// Stamp layout.
    pub stamp: StampConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PortalConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            origin: "http://localhost:5173".to_string(),
            video_bucket: "videos".to_string(),
            document_bucket: "documents".to_string(),
            max_video_bytes: 50 * 1024 * 1024,
            default_title: "Case document".to_string(),
            qr_pixel_size: 320,
            stamp: StampConfig::default(),
        }
    }

    /// Set the origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Set the video size limit.
    pub fn with_max_video_bytes(mut self, limit: u64) -> Self {
        self.max_video_bytes = limit;
        self
    }

    /// Set the stamp layout.
    pub fn with_stamp(mut self, stamp: StampConfig) -> Self {
        self.stamp = stamp;
        self
    }

    /// Parse configuration from JSON. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loaded portal configuration from {}", path.display());
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PortalConfig::default();
        assert_eq!(config.max_video_bytes, 52_428_800);
        assert_eq!(config.stamp.stamp_size, 80.0);
        assert_eq!(config.stamp.bottom_fallback, 40.0);
        assert_eq!(config.stamp.label_threshold, 40.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PortalConfig::from_json_str(
            r#"{ "origin": "https://law.example", "stamp": { "caption": "Assista:" } }"#,
        )
        .unwrap();
        assert_eq!(config.origin, "https://law.example");
        assert_eq!(config.stamp.caption, "Assista:");
        assert_eq!(config.stamp.stamp_size, 80.0);
        assert_eq!(config.video_bucket, "videos");
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = PortalConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_video_bytes": 1024 }}"#).unwrap();
        let config = PortalConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_video_bytes, 1024);
    }

    #[test]
    fn test_builders() {
        let config = PortalConfig::new()
            .with_origin("https://a.example")
            .with_max_video_bytes(10)
            .with_stamp(StampConfig::new().with_stamp_size(64.0).with_caption("Scan me"));
        assert_eq!(config.origin, "https://a.example");
        assert_eq!(config.max_video_bytes, 10);
        assert_eq!(config.stamp.stamp_size, 64.0);
        assert_eq!(config.stamp.caption, "Scan me");
    }
}
