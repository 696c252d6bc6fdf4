//! Buffers backed by plain memory
//!
//! [`MemoryAllocator`] is a software allocator, usable without any graphics hardware.
//! It is meant for software rendering clients, headless servers and tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use tracing::debug;

use super::{format, AllocError, Allocator, Buffer, BufferProperties, Fourcc, NativeBuffer};
use crate::utils::{Buffer as BufferCoords, Size};

/// Pixel storage in memory
#[derive(Debug)]
pub struct MemoryBuffer {
    size: Size<i32, BufferCoords>,
    format: Fourcc,
    stride: i32,
    data: Mutex<Vec<u8>>,
    live: Arc<AtomicUsize>,
}

impl MemoryBuffer {
    /// Length of a row of pixels in bytes
    pub fn stride(&self) -> i32 {
        self.stride
    }

    /// Read the pixel contents of this buffer
    pub fn with_data<T, F: FnOnce(&[u8]) -> T>(&self, f: F) -> T {
        let data = self.data.lock().unwrap();
        f(&data)
    }

    /// Write to the pixel contents of this buffer
    ///
    /// Only the party currently owning the buffer is supposed to do this.
    pub fn with_data_mut<T, F: FnOnce(&mut [u8]) -> T>(&self, f: F) -> T {
        let mut data = self.data.lock().unwrap();
        f(&mut data)
    }
}

impl NativeBuffer for MemoryBuffer {
    fn size(&self) -> Size<i32, BufferCoords> {
        self.size
    }

    fn format(&self) -> Fourcc {
        self.format
    }
}

impl Drop for MemoryBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Allocator creating [`MemoryBuffer`]s
///
/// An optional limit on the number of simultaneously alive buffers can be set,
/// allocations beyond that limit fail with [`AllocError::Exhausted`].
#[derive(Debug, Default)]
pub struct MemoryAllocator {
    limit: Option<usize>,
    live: Arc<AtomicUsize>,
}

impl MemoryAllocator {
    /// Create a new allocator without a buffer limit
    pub fn new() -> MemoryAllocator {
        MemoryAllocator::default()
    }

    /// Create a new allocator that keeps at most `limit` buffers alive
    pub fn with_limit(limit: usize) -> MemoryAllocator {
        MemoryAllocator {
            limit: Some(limit),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of buffers created by this allocator, that are still alive
    pub fn live_buffers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn reserve(&self) -> Result<(), AllocError> {
        let limit = self.limit.unwrap_or(usize::MAX);
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < limit).then_some(live + 1)
            })
            .map(|_| ())
            .map_err(|live| AllocError::Exhausted { live })
    }
}

impl Allocator for MemoryAllocator {
    fn alloc_buffer(&self, properties: &BufferProperties) -> Result<Buffer, AllocError> {
        let size = properties.size;
        if size.is_empty() {
            return Err(AllocError::InvalidSize(size));
        }
        if format::get_bpp(properties.format).is_none() {
            return Err(AllocError::UnsupportedFormat(properties.format));
        }
        let stride = format::get_stride(properties.format, size.w).ok_or(AllocError::InvalidSize(size))?;
        let len = usize::try_from(stride)
            .ok()
            .and_then(|stride| stride.checked_mul(size.h as usize))
            .ok_or(AllocError::InvalidSize(size))?;

        self.reserve()?;
        debug!(?size, format = %properties.format, len, "Allocating memory buffer");

        let native = MemoryBuffer {
            size,
            format: properties.format,
            stride,
            data: Mutex::new(vec![0; len]),
            live: self.live.clone(),
        };
        Ok(Buffer::new(*properties, native))
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryAllocator, MemoryBuffer};
    use crate::backend::allocator::{AllocError, Allocator, BufferProperties, BufferUsage, Fourcc};

    fn properties(w: i32, h: i32) -> BufferProperties {
        BufferProperties::new((w, h), Fourcc::Argb8888, BufferUsage::Software)
    }

    #[test]
    fn allocates_zeroed_storage() {
        let allocator = MemoryAllocator::new();
        let buffer = allocator.alloc_buffer(&properties(16, 8)).unwrap();

        let native = buffer.native::<MemoryBuffer>().unwrap();
        assert_eq!(native.stride(), 64);
        native.with_data(|data| {
            assert_eq!(data.len(), 64 * 8);
            assert!(data.iter().all(|&b| b == 0));
        });

        native.with_data_mut(|data| data[0] = 0xff);
        assert_eq!(native.with_data(|data| data[0]), 0xff);
    }

    #[test]
    fn limit_is_enforced_and_released() {
        let allocator = MemoryAllocator::with_limit(2);
        let first = allocator.alloc_buffer(&properties(4, 4)).unwrap();
        let _second = allocator.alloc_buffer(&properties(4, 4)).unwrap();

        assert!(matches!(
            allocator.alloc_buffer(&properties(4, 4)),
            Err(AllocError::Exhausted { live: 2 })
        ));

        drop(first);
        assert_eq!(allocator.live_buffers(), 1);
        assert!(allocator.alloc_buffer(&properties(4, 4)).is_ok());
    }

    #[test]
    fn rejects_invalid_requests() {
        let allocator = MemoryAllocator::new();
        assert!(matches!(
            allocator.alloc_buffer(&properties(0, 4)),
            Err(AllocError::InvalidSize(_))
        ));
        assert!(matches!(
            allocator.alloc_buffer(&BufferProperties::new(
                (4, 4),
                Fourcc::Nv12,
                BufferUsage::Hardware
            )),
            Err(AllocError::UnsupportedFormat(Fourcc::Nv12))
        ));
        assert_eq!(allocator.live_buffers(), 0);
    }
}
