//! Pixel rectangles on the logical screen.
//!
//! Coordinates are unsigned; `right` and `bottom` are exclusive. A rectangle
//! with no area is empty and drops out of unions.

/// Placement and size of a frame, or of a region inside one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const EMPTY: Rect = Rect { x: 0, y: 0, width: 0, height: 0 };

    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect { x, y, width, height }
    }

    /// Rectangle covering a whole `width`×`height` surface.
    pub const fn of_size(width: u32, height: u32) -> Self {
        Rect { x: 0, y: 0, width, height }
    }

    /// Rectangle spanning `left..right` × `top..bottom`. Inverted edges
    /// give an empty rectangle.
    pub fn from_edges(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Rect::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top))
    }

    /// The 1×1 rectangle at the center of a `width`×`height` surface.
    pub fn center_pixel(width: u32, height: u32) -> Self {
        Rect::new(width / 2, height / 2, 1, 1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Smallest rectangle covering both. Empty inputs are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::from_edges(x, y, self.right().max(other.right()), self.bottom().max(other.bottom()))
    }

    /// Overlapping part of both rectangles, empty when they are disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        if r <= x || b <= y {
            return Rect::EMPTY;
        }
        Rect::from_edges(x, y, r, b)
    }

    /// The same rectangle expressed relative to the origin `(ox, oy)`.
    pub fn relative_to(&self, ox: u32, oy: u32) -> Rect {
        debug_assert!(self.x >= ox && self.y >= oy);
        Rect::new(self.x - ox, self.y - oy, self.width, self.height)
    }
}
