//! Pixel layout tables for DRM formats.
//!
//! [`has_alpha`] returns true if the format has an alpha channel.
//!
//! ```
//! # use buffer_streams::backend::allocator::Fourcc;
//! # use buffer_streams::backend::allocator::format::has_alpha;
//! assert!(has_alpha(Fourcc::Argb8888));
//! assert!(!has_alpha(Fourcc::Xrgb8888));
//! ```
//!
//! [`get_bpp`] returns the number of bits per pixel of a format.
//!
//! ```
//! # use buffer_streams::backend::allocator::Fourcc;
//! # use buffer_streams::backend::allocator::format::get_bpp;
//! assert_eq!(get_bpp(Fourcc::Argb8888), Some(32));
//! assert_eq!(get_bpp(Fourcc::Rgb565), Some(16));
//! ```
//!
//! Only single-plane, packed formats are listed. Every other format is
//! reported as unknown.

use super::Fourcc;

macro_rules! format_tables {
    (
        $($fourcc: ident {
            alpha: $alpha: expr,
            bpp: $bpp: expr $(,)?
        }),*
    ) => {
        /// Returns true if the format has an alpha channel.
        ///
        /// Unknown formats will always return `false`.
        pub const fn has_alpha(fourcc: Fourcc) -> bool {
            match fourcc {
                $(Fourcc::$fourcc => $alpha,)*
                _ => false,
            }
        }

        /// Returns the bits per pixel of the specified format.
        ///
        /// Unknown formats will always return [`None`].
        pub const fn get_bpp(fourcc: Fourcc) -> Option<usize> {
            match fourcc {
                $(Fourcc::$fourcc => Some($bpp),)*
                _ => None,
            }
        }

        #[cfg(test)]
        fn known_formats() -> &'static [Fourcc] {
            &[$(Fourcc::$fourcc,)*]
        }
    };
}

format_tables! {
    Argb8888 { alpha: true, bpp: 32 },
    Xrgb8888 { alpha: false, bpp: 32 },
    Abgr8888 { alpha: true, bpp: 32 },
    Xbgr8888 { alpha: false, bpp: 32 },
    Rgba8888 { alpha: true, bpp: 32 },
    Rgbx8888 { alpha: false, bpp: 32 },
    Bgra8888 { alpha: true, bpp: 32 },
    Bgrx8888 { alpha: false, bpp: 32 },
    Argb2101010 { alpha: true, bpp: 32 },
    Xrgb2101010 { alpha: false, bpp: 32 },
    Abgr2101010 { alpha: true, bpp: 32 },
    Xbgr2101010 { alpha: false, bpp: 32 },
    Rgb888 { alpha: false, bpp: 24 },
    Bgr888 { alpha: false, bpp: 24 },
    Rgb565 { alpha: false, bpp: 16 },
    Bgr565 { alpha: false, bpp: 16 },
    Abgr16161616f { alpha: true, bpp: 64 },
    Xbgr16161616f { alpha: false, bpp: 64 }
}

/// Returns the minimal stride in bytes of a row of `width` pixels in the given format.
///
/// Returns [`None`] for unknown formats or if the stride does not fit into an `i32`.
pub fn get_stride(fourcc: Fourcc, width: i32) -> Option<i32> {
    let bpp = get_bpp(fourcc)?;
    let bytes = usize::try_from(width).ok()?.checked_mul(bpp)? / 8;
    i32::try_from(bytes).ok()
}
