//! Render-space to PDF-space coordinate mapping.
//!
//! The editor shows page 1 scaled to fit the viewport and lets the user drag a
//! square marker over it. The marker's top-left pixel position is converted
//! here into the point-based, bottom-left-origin coordinates the stamp is drawn
//! at.
//!
//! Nothing in this module fails: out-of-range input is clamped, since the
//! caller is an interactive tool where silent correction beats blocking.

use crate::config::StampConfig;
use crate::geometry::{Point, Rect};

/// Top-left corner of the marker in render space (pixels, y grows downward).
pub type MarkerPosition = Point;

/// Page 1 as shown on screen, together with its native size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedPage {
    /// Displayed width in pixels
    pub rendered_width: f32,
    /// Displayed height in pixels
    pub rendered_height: f32,
    /// Native width in points
    pub native_width: f32,
    /// Native height in points
    pub native_height: f32,
}

impl RenderedPage {
    /// Create a rendered page description.
    pub fn new(rendered_width: f32, rendered_height: f32, native_width: f32, native_height: f32) -> Self {
        Self {
            rendered_width,
            rendered_height,
            native_width,
            native_height,
        }
    }

    /// Render a page of `native` size so it is `display_width` pixels wide.
    pub fn fit_width(native_width: f32, native_height: f32, display_width: f32) -> Self {
        let ratio = if native_width > 0.0 {
            display_width / native_width
        } else {
            1.0
        };
        Self::new(display_width, native_height * ratio, native_width, native_height)
    }

    /// True once both sizes are known and non-degenerate.
    pub fn is_ready(&self) -> bool {
        positive(self.rendered_width)
            && positive(self.rendered_height)
            && positive(self.native_width)
            && positive(self.native_height)
    }

    /// The native page box in PDF user space.
    pub fn page_box(&self) -> Rect {
        Rect::new(0.0, 0.0, self.native_width.max(0.0), self.native_height.max(0.0))
    }
}

/// The marker converted into PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfStampCoordinate {
    /// Lower-left x of the stamp, in points
    pub x: f32,
    /// Lower-left y of the stamp, in points
    pub y: f32,
    /// Whether the naive y was negative and replaced by the bottom fallback
    pub fallback_applied: bool,
}

impl PdfStampCoordinate {
    /// Lower-left corner as a point.
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// The square the stamp image occupies.
    pub fn stamp_rect(&self, size: f32) -> Rect {
        Rect::new(self.x, self.y, size, size)
    }
}

fn positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Clamp a marker so it stays fully inside the rendered page.
pub fn clamp_marker(page: &RenderedPage, marker: MarkerPosition, size: f32) -> MarkerPosition {
    let max_x = (finite_or_zero(page.rendered_width) - size).max(0.0);
    let max_y = (finite_or_zero(page.rendered_height) - size).max(0.0);
    Point::new(
        finite_or_zero(marker.x).clamp(0.0, max_x),
        finite_or_zero(marker.y).clamp(0.0, max_y),
    )
}

/// Marker position for a pointer event, where the pointer is the marker's centre.
///
/// `pointer` is relative to the top-left of the rendered page.
pub fn marker_from_pointer(page: &RenderedPage, pointer: Point, size: f32) -> MarkerPosition {
    let half = size / 2.0;
    clamp_marker(page, Point::new(pointer.x - half, pointer.y - half), size)
}

/// Initial marker placement: centred on the page.
pub fn centered_marker(page: &RenderedPage, size: f32) -> MarkerPosition {
    let half = size / 2.0;
    clamp_marker(
        page,
        Point::new(page.rendered_width / 2.0 - half, page.rendered_height / 2.0 - half),
        size,
    )
}

/// Converts marker positions into stamp coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    stamp_size: f32,
    bottom_fallback: f32,
}

impl Default for CoordinateMapper {
    fn default() -> Self {
        Self::from_config(&StampConfig::default())
    }
}

impl CoordinateMapper {
    /// Create a mapper for a stamp of `stamp_size` points.
    pub fn new(stamp_size: f32, bottom_fallback: f32) -> Self {
        Self {
            stamp_size,
            bottom_fallback,
        }
    }

    /// Create a mapper from the stamp layout.
    pub fn from_config(config: &StampConfig) -> Self {
        Self::new(config.stamp_size, config.bottom_fallback)
    }

    /// Stamp side length in points.
    pub fn stamp_size(&self) -> f32 {
        self.stamp_size
    }

    /// Points per pixel along each axis.
    ///
    /// A degenerate rendered dimension maps 1:1.
    pub fn scale(&self, page: &RenderedPage) -> (f32, f32) {
        let axis = |native: f32, rendered: f32| {
            if positive(rendered) && native.is_finite() {
                native / rendered
            } else {
                1.0
            }
        };
        (
            axis(page.native_width, page.rendered_width),
            axis(page.native_height, page.rendered_height),
        )
    }

    /// Y before any correction: invert the axis, then drop by the stamp height
    /// because images are anchored at their lower-left corner.
    pub fn unclamped_y(&self, page: &RenderedPage, marker: MarkerPosition) -> f32 {
        let (_, scale_y) = self.scale(page);
        page.native_height - finite_or_zero(marker.y) * scale_y - self.stamp_size
    }

    /// Map a marker to the stamp's lower-left corner in PDF user space.
    ///
    /// The result always keeps the stamp square inside the native page box
    /// (for pages at least as large as the stamp).
    pub fn map(&self, page: &RenderedPage, marker: MarkerPosition) -> PdfStampCoordinate {
        let (scale_x, _) = self.scale(page);
        let max_x = (finite_or_zero(page.native_width) - self.stamp_size).max(0.0);
        let max_y = (finite_or_zero(page.native_height) - self.stamp_size).max(0.0);

        let x = (finite_or_zero(marker.x) * scale_x).clamp(0.0, max_x);
        let naive_y = self.unclamped_y(page, marker);

        let (y, fallback_applied) = if naive_y < 0.0 || !naive_y.is_finite() {
            log::debug!(
                "Stamp y {:.1} is below the page, using fallback {:.1}",
                naive_y,
                self.bottom_fallback
            );
            (self.bottom_fallback.clamp(0.0, max_y), true)
        } else {
            (naive_y.min(max_y), false)
        };

        PdfStampCoordinate {
            x,
            y,
            fallback_applied,
        }
    }
}
