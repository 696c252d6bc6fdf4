use std::{
    fmt,
    marker::PhantomData,
    ops::{Add, Sub},
};

/// Type-level marker for the physical coordinate space of a display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Physical;

/// Type-level marker for the buffer coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Buffer;

/// A point in the coordinate space `Kind`
///
/// Arithmetic on points saturates instead of overflowing.
pub struct Point<N, Kind> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
    _kind: PhantomData<Kind>,
}

/// Width and height of an area in the coordinate space `Kind`
pub struct Size<N, Kind> {
    /// horizontal extent
    pub w: N,
    /// vertical extent
    pub h: N,
    _kind: PhantomData<Kind>,
}

/// An axis-aligned area, given by its top-left corner and its size
pub struct Rectangle<N, Kind> {
    /// Top-left corner
    pub loc: Point<N, Kind>,
    /// Extent, starting at `loc`
    pub size: Size<N, Kind>,
}

impl<N, Kind> From<(N, N)> for Point<N, Kind> {
    #[inline]
    fn from((x, y): (N, N)) -> Self {
        Point {
            x,
            y,
            _kind: PhantomData,
        }
    }
}

impl<N, Kind> From<(N, N)> for Size<N, Kind> {
    #[inline]
    fn from((w, h): (N, N)) -> Self {
        Size {
            w,
            h,
            _kind: PhantomData,
        }
    }
}

impl<N: Clone, Kind> Clone for Point<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        (self.x.clone(), self.y.clone()).into()
    }
}

impl<N: Copy, Kind> Copy for Point<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Point<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<N: Eq, Kind> Eq for Point<N, Kind> {}

impl<N: Default, Kind> Default for Point<N, Kind> {
    fn default() -> Self {
        (N::default(), N::default()).into()
    }
}

impl<N: Clone, Kind> Clone for Size<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        (self.w.clone(), self.h.clone()).into()
    }
}

impl<N: Copy, Kind> Copy for Size<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Size<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.w == other.w && self.h == other.h
    }
}

impl<N: Eq, Kind> Eq for Size<N, Kind> {}

impl<N: Default, Kind> Default for Size<N, Kind> {
    fn default() -> Self {
        (N::default(), N::default()).into()
    }
}

impl<N: Clone, Kind> Clone for Rectangle<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Rectangle {
            loc: self.loc.clone(),
            size: self.size.clone(),
        }
    }
}

impl<N: Copy, Kind> Copy for Rectangle<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Rectangle<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.loc == other.loc && self.size == other.size
    }
}

impl<N: Eq, Kind> Eq for Rectangle<N, Kind> {}

impl<N: Default, Kind> Default for Rectangle<N, Kind> {
    fn default() -> Self {
        Rectangle {
            loc: Point::default(),
            size: Size::default(),
        }
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Point<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {:?})", self.x, self.y)
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Size<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}x{:?}", self.w, self.h)
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Rectangle<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{:?}", self.size, self.loc)
    }
}

impl<Kind> Add for Point<i32, Kind> {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        (self.x.saturating_add(other.x), self.y.saturating_add(other.y)).into()
    }
}

impl<Kind> Sub for Point<i32, Kind> {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        (self.x.saturating_sub(other.x), self.y.saturating_sub(other.y)).into()
    }
}

impl<Kind> Add<Size<i32, Kind>> for Point<i32, Kind> {
    type Output = Self;

    #[inline]
    fn add(self, size: Size<i32, Kind>) -> Self {
        (self.x.saturating_add(size.w), self.y.saturating_add(size.h)).into()
    }
}

impl<Kind> Size<i32, Kind> {
    /// True if the area covers no pixel
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

impl Size<i32, Buffer> {
    /// The area this buffer size covers on a display
    ///
    /// Buffers are composited unscaled and untransformed, one buffer pixel
    /// covers exactly one physical pixel.
    #[inline]
    pub fn to_physical(self) -> Size<i32, Physical> {
        (self.w, self.h).into()
    }
}

impl<Kind> Rectangle<i32, Kind> {
    /// Rectangle at `loc` spanning `size`
    #[inline]
    pub fn new(loc: Point<i32, Kind>, size: Size<i32, Kind>) -> Self {
        Rectangle { loc, size }
    }

    /// Rectangle spanning `size` from the origin
    #[inline]
    pub fn from_size(size: Size<i32, Kind>) -> Self {
        Rectangle::new((0, 0).into(), size)
    }

    /// Rectangle between a top-left and a bottom-right corner
    ///
    /// Corners in the wrong order result in an empty rectangle.
    pub fn from_extremities(topleft: impl Into<Point<i32, Kind>>, bottomright: impl Into<Point<i32, Kind>>) -> Self {
        let topleft = topleft.into();
        let extent = bottomright.into() - topleft;
        Rectangle::new(topleft, (extent.x.max(0), extent.y.max(0)).into())
    }

    /// The bottom-right corner, exclusive
    #[inline]
    pub fn bottom_right(&self) -> Point<i32, Kind> {
        self.loc + self.size
    }

    /// True if the rectangle covers no pixel
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    /// Checks whether `point` lies inside of the rectangle
    pub fn contains(&self, point: impl Into<Point<i32, Kind>>) -> bool {
        let point = point.into();
        let end = self.bottom_right();
        (self.loc.x..end.x).contains(&point.x) && (self.loc.y..end.y).contains(&point.y)
    }

    /// Checks whether the two rectangles share at least one pixel
    ///
    /// Rectangles that only touch do not overlap.
    pub fn overlaps(&self, other: impl Into<Rectangle<i32, Kind>>) -> bool {
        self.intersection(other).is_some()
    }

    /// The area covered by both rectangles, `None` if they do not overlap
    pub fn intersection(&self, other: impl Into<Rectangle<i32, Kind>>) -> Option<Self> {
        let other = other.into();
        let (end, other_end) = (self.bottom_right(), other.bottom_right());
        let area = Rectangle::from_extremities(
            (self.loc.x.max(other.loc.x), self.loc.y.max(other.loc.y)),
            (end.x.min(other_end.x), end.y.min(other_end.y)),
        );
        (!area.is_empty()).then_some(area)
    }
}
