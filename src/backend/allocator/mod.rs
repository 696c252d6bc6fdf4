//! Buffer allocation and management.
//!
//! Collection of common traits and types around buffer creation.
//!
//! A [`Buffer`] is a shared, reference-counted handle to some native pixel storage
//! described by [`BufferProperties`]. Buffers are never created by the compositor core
//! itself; they are produced by an [`Allocator`] implementation.
//!
//! Allocators provided:
//! - [`MemoryAllocator`](memory::MemoryAllocator), backing buffers by plain memory
//!
//! Helpers:
//! - [`format`] to query pixel layout information of a [`Fourcc`] code

pub mod format;
pub mod memory;

use std::{fmt, sync::Arc};

use downcast_rs::{impl_downcast, DowncastSync};
use tracing::trace;

use crate::utils::{ids::id_gen, Buffer as BufferCoords, Size};

pub use drm_fourcc::{DrmFourcc as Fourcc, UnrecognizedFourcc};

id_gen!(buffer_id);

/// Process-unique identity of a [`Buffer`]
///
/// Ids are assigned in increasing order and are not handed out again
/// as long as the buffer they identify is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    /// Raw value of this id
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Intended usage of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// The client renders into the buffer using the GPU
    #[default]
    Hardware,
    /// The client writes the pixels with the CPU
    Software,
}

/// Properties requested for a buffer at allocation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferProperties {
    /// Dimensions of the buffer in pixels
    pub size: Size<i32, BufferCoords>,
    /// Pixel format of the buffer
    pub format: Fourcc,
    /// Intended usage of the buffer
    pub usage: BufferUsage,
}

impl BufferProperties {
    /// Create a new set of buffer properties
    pub fn new(size: impl Into<Size<i32, BufferCoords>>, format: Fourcc, usage: BufferUsage) -> Self {
        BufferProperties {
            size: size.into(),
            format,
            usage,
        }
    }
}

/// Native storage backing a [`Buffer`]
///
/// This is what an [`Allocator`] actually creates. The compositor core only ever
/// looks at it through the [`Buffer`] handle, renderers can get back the concrete type
/// through [`Buffer::native`].
pub trait NativeBuffer: DowncastSync + fmt::Debug {
    /// Size (w x h) of the two-dimensional buffer
    fn size(&self) -> Size<i32, BufferCoords>;
    /// Pixel format of the buffer
    fn format(&self) -> Fourcc;
}
impl_downcast!(sync NativeBuffer);

/// Shared handle to an allocated buffer
///
/// Cloning the handle is cheap. The native storage is released once the last handle
/// is dropped, which includes handles held by in-flight render passes or transmissions.
#[derive(Clone)]
pub struct Buffer(Arc<BufferInner>);

struct BufferInner {
    id: BufferId,
    properties: BufferProperties,
    native: Box<dyn NativeBuffer>,
}

impl Buffer {
    /// Wrap a freshly allocated native buffer, assigning it a new [`BufferId`]
    ///
    /// This is meant to be called by [`Allocator`] implementations.
    pub fn new(properties: BufferProperties, native: impl NativeBuffer) -> Buffer {
        debug_assert_eq!(native.size(), properties.size);
        debug_assert_eq!(native.format(), properties.format);

        let id = BufferId(buffer_id::next());
        trace!(buffer = %id, ?properties, "Buffer created");
        Buffer(Arc::new(BufferInner {
            id,
            properties,
            native: Box::new(native),
        }))
    }

    /// Identity of this buffer
    pub fn id(&self) -> BufferId {
        self.0.id
    }

    /// Properties this buffer was allocated with
    pub fn properties(&self) -> &BufferProperties {
        &self.0.properties
    }

    /// Size (w x h) of the two-dimensional buffer
    pub fn size(&self) -> Size<i32, BufferCoords> {
        self.0.properties.size
    }

    /// Pixel format of the buffer
    pub fn format(&self) -> Fourcc {
        self.0.properties.format
    }

    /// Access the native storage, if it is of type `T`
    pub fn native<T: NativeBuffer>(&self) -> Option<&T> {
        self.0.native.downcast_ref::<T>()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.0.id)
            .field("properties", &self.0.properties)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Buffer {}

impl Drop for BufferInner {
    fn drop(&mut self) {
        trace!(buffer = %self.id, "Buffer destroyed");
        buffer_id::release(self.id.0);
    }
}

/// Errors thrown by an [`Allocator`]
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// The allocator ran out of resources
    #[error("The allocator is out of resources ({live} buffers alive)")]
    Exhausted {
        /// Number of buffers that were alive when the allocation failed
        live: usize,
    },
    /// The requested pixel format is not supported by the allocator
    #[error("Pixel format {0} is not supported by the allocator")]
    UnsupportedFormat(Fourcc),
    /// The requested size is empty or too large
    #[error("Invalid buffer size {0:?}")]
    InvalidSize(Size<i32, BufferCoords>),
    /// Allocator specific failure
    #[error("Allocator failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Interface to create Buffers
///
/// Allocators are shared between all streams of a server and may be called
/// from any thread.
pub trait Allocator: Send + Sync {
    /// Try to create a buffer with the given properties
    fn alloc_buffer(&self, properties: &BufferProperties) -> Result<Buffer, AllocError>;
}

impl<A: Allocator + ?Sized> Allocator for Arc<A> {
    fn alloc_buffer(&self, properties: &BufferProperties) -> Result<Buffer, AllocError> {
        (**self).alloc_buffer(properties)
    }
}
