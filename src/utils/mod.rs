//! Various utilities functions and types

mod geometry;
pub(crate) mod ids;

pub use self::geometry::{Buffer, Physical, Point, Rectangle, Size};
