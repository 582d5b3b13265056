//! Geometric primitives for render space and PDF user space.
//!
//! Render space has its origin at the top-left and grows downward (pixels).
//! PDF user space has its origin at the bottom-left and grows upward (points).
//! [`Rect`] is used for the latter, so `y` is the bottom edge.

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point.
    ///
    /// # Examples
    ///
    /// ```
    /// use qr_stamp::geometry::Point;
    ///
    /// let point = Point::new(10.0, 20.0);
    /// assert_eq!(point.x, 10.0);
    /// assert_eq!(point.y, 20.0);
    /// ```
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// X coordinate of the lower-left corner
    pub x: f32,
    /// Y coordinate of the lower-left corner
    pub y: f32,
    /// Width of rectangle
    pub width: f32,
    /// Height of rectangle
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle from its lower-left corner and dimensions.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle from two corner points.
    ///
    /// # Examples
    ///
    /// ```
    /// use qr_stamp::geometry::Rect;
    ///
    /// let rect = Rect::from_points(10.0, 20.0, 110.0, 70.0);
    /// assert_eq!(rect.x, 10.0);
    /// assert_eq!(rect.width, 100.0);
    /// assert_eq!(rect.height, 50.0);
    /// ```
    pub fn from_points(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    /// Left edge.
    pub fn left(&self) -> f32 {
        self.x
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f32 {
        self.y
    }

    /// Top edge.
    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    /// Check whether `other` lies entirely inside this rectangle.
    ///
    /// # Examples
    ///
    /// ```
    /// use qr_stamp::geometry::Rect;
    ///
    /// let page = Rect::new(0.0, 0.0, 595.0, 842.0);
    /// assert!(page.contains_rect(&Rect::new(10.0, 10.0, 80.0, 80.0)));
    /// assert!(!page.contains_rect(&Rect::new(550.0, 10.0, 80.0, 80.0)));
    /// ```
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.left() >= self.left()
            && other.right() <= self.right()
            && other.bottom() >= self.bottom()
            && other.top() <= self.top()
    }

    /// Clip this rectangle to `bounds`.
    ///
    /// Returns a zero-sized rectangle at the nearest edge when the two do not overlap.
    pub fn clip_to(&self, bounds: &Rect) -> Rect {
        let x0 = self.left().clamp(bounds.left(), bounds.right());
        let y0 = self.bottom().clamp(bounds.bottom(), bounds.top());
        let x1 = self.right().clamp(bounds.left(), bounds.right());
        let y1 = self.top().clamp(bounds.bottom(), bounds.top());
        Rect::from_points(x0, y0, x1, y1)
    }

    /// Corner coordinates as `[llx, lly, urx, ury]`, the order PDF arrays use.
    pub fn to_pdf_array(&self) -> [f32; 4] {
        [self.left(), self.bottom(), self.right(), self.top()]
    }
}
