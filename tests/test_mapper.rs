//! Integration tests for render-space → PDF-space mapping.
//!
//! Covers the worked A4 example, Y-axis inversion, and property tests for
//! scale correctness and bottom-edge clamping.

use proptest::prelude::*;
use qr_stamp::geometry::Point;
use qr_stamp::mapper::{clamp_marker, CoordinateMapper, RenderedPage};
use qr_stamp::writer::stamp::{LabelLayout, LabelPlacement};
use qr_stamp::StampConfig;

const SIZE: f32 = 80.0;

#[test]
fn test_a4_worked_example() {
    let mapper = CoordinateMapper::default();
    let page = RenderedPage::new(650.0, 919.0, 595.0, 842.0);
    let marker = Point::new(305.0, 879.0);

    let (sx, sy) = mapper.scale(&page);
    assert!((sx - 0.915).abs() < 0.001, "scaleX = {}", sx);
    assert!((sy - 0.916).abs() < 0.001, "scaleY = {}", sy);

    let naive = mapper.unclamped_y(&page, marker);
    assert!(naive < 0.0);
    assert!((naive - -43.0).abs() < 1.0, "naive y = {}", naive);

    let coord = mapper.map(&page, marker);
    assert!((coord.x - 279.0).abs() < 1.0, "x = {}", coord.x);
    assert_eq!(coord.y, 40.0);
    assert!(coord.fallback_applied);

    let label = LabelLayout::compute(&StampConfig::default(), &coord, &page.page_box());
    assert_eq!(label.placement, LabelPlacement::Above);
}

#[test]
fn test_y_axis_inversion() {
    let mapper = CoordinateMapper::default();
    let page = RenderedPage::new(612.0, 792.0, 612.0, 792.0);

    let top = mapper.map(&page, Point::new(0.0, 0.0));
    assert_eq!(top.y, 792.0 - SIZE);

    let bottom = mapper.map(&page, Point::new(0.0, 792.0 - SIZE));
    assert!(bottom.y.abs() < 0.01);
    assert!(!bottom.fallback_applied);
}

#[test]
fn test_half_scale_render() {
    let mapper = CoordinateMapper::default();
    let page = RenderedPage::new(306.0, 396.0, 612.0, 792.0);
    let coord = mapper.map(&page, Point::new(100.0, 100.0));
    assert_eq!(coord.x, 200.0);
    assert_eq!(coord.y, 792.0 - 200.0 - SIZE);
}

#[test]
fn test_custom_fallback() {
    let mapper = CoordinateMapper::from_config(&StampConfig::new().with_bottom_fallback(10.0));
    let page = RenderedPage::new(595.0, 842.0, 595.0, 842.0);
    let coord = mapper.map(&page, Point::new(0.0, 842.0));
    assert!(coord.fallback_applied);
    assert_eq!(coord.y, 10.0);
}

fn dimension() -> impl Strategy<Value = f32> {
    100.0f32..2000.0
}

fn fraction() -> impl Strategy<Value = f32> {
    0.0f32..=1.0
}

proptest! {
    /// The stamp's lower-left corner stays inside the native page.
    #[test]
    fn prop_mapped_point_inside_page(
        rw in dimension(),
        rh in dimension(),
        nw in dimension(),
        nh in dimension(),
        fx in fraction(),
        fy in fraction(),
    ) {
        let mapper = CoordinateMapper::default();
        let page = RenderedPage::new(rw, rh, nw, nh);
        let marker = clamp_marker(&page, Point::new(fx * rw, fy * rh), SIZE);
        let coord = mapper.map(&page, marker);

        prop_assert!(coord.x >= 0.0 && coord.x <= nw, "x {} outside [0, {}]", coord.x, nw);
        prop_assert!(coord.y >= 0.0 && coord.y <= nh, "y {} outside [0, {}]", coord.y, nh);
    }

    /// The whole stamp square fits on the page.
    #[test]
    fn prop_stamp_rect_inside_page_box(
        rw in dimension(),
        rh in dimension(),
        nw in 100.0f32..2000.0,
        nh in 100.0f32..2000.0,
        x in -500.0f32..3000.0,
        y in -500.0f32..3000.0,
    ) {
        let mapper = CoordinateMapper::default();
        let page = RenderedPage::new(rw, rh, nw, nh);
        let coord = mapper.map(&page, Point::new(x, y));
        let rect = coord.stamp_rect(SIZE);
        let bounds = page.page_box();

        prop_assert!(rect.left() >= bounds.left() - 0.001);
        prop_assert!(rect.bottom() >= bounds.bottom() - 0.001);
        prop_assert!(rect.right() <= bounds.right() + 0.01);
        prop_assert!(rect.top() <= bounds.top() + 0.01);
    }

    /// A negative naive Y is always replaced, never passed through.
    #[test]
    fn prop_never_negative_y(
        rh in dimension(),
        nh in dimension(),
        y in 0.0f32..4000.0,
    ) {
        let mapper = CoordinateMapper::default();
        let page = RenderedPage::new(595.0, rh, 595.0, nh);
        let marker = Point::new(0.0, y);
        let coord = mapper.map(&page, marker);

        prop_assert!(coord.y >= 0.0);
        prop_assert_eq!(coord.fallback_applied, mapper.unclamped_y(&page, marker) < 0.0);
    }

    /// X is a plain linear scale before clamping.
    #[test]
    fn prop_x_scales_linearly(
        rw in dimension(),
        nw in 200.0f32..2000.0,
        f in 0.0f32..0.5,
    ) {
        let mapper = CoordinateMapper::default();
        let page = RenderedPage::new(rw, 1000.0, nw, 1000.0);
        let x = f * rw;
        let coord = mapper.map(&page, Point::new(x, 0.0));
        let expected = (x * nw / rw).min(nw - SIZE);
        prop_assert!((coord.x - expected).abs() < 0.01, "x {} expected {}", coord.x, expected);
    }
}
