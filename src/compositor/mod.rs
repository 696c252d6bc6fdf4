//! Server side handling of buffer streams
//!
//! A client renders into a small set of buffers that is shared with the compositor.
//! This module tracks that set and moves buffers between the two parties:
//!
//! - [`BufferMap`] is the ownership ledger of one stream. It knows which party may touch
//!   a buffer and notifies the client through an [`EventSink`](crate::frontend::EventSink)
//!   whenever a buffer is handed over.
//! - [`AllocationStrategy`] decides how many buffers a stream gets.
//! - [`BufferStream`] implements the flow control between client submissions and the
//!   frames the compositor puts on screen.
//! - [`RenderLoop`] composites the frames of all streams onto a
//!   [`Display`](crate::backend::display::Display), typically driven by a [`calloop`] timer.
//!
//! ## Threading
//!
//! Client connections and the render loop usually live on different threads. All types
//! of this module are `Send + Sync` and do their own locking. Locks are always taken in
//! the same order: the scene of the render loop, the state of a stream, then its buffer map.
//!
//! ```
//! use std::sync::Arc;
//! use buffer_streams::{
//!     backend::allocator::{memory::MemoryAllocator, BufferProperties, BufferUsage, Fourcc},
//!     backend::display::HeadlessDisplay,
//!     compositor::{AllocationStrategy, BufferStream, RenderLoop},
//!     frontend::{BufferMessage, BufferStreamId, RecordingEventSink},
//! };
//!
//! let sink = Arc::new(RecordingEventSink::new());
//! let stream = Arc::new(BufferStream::new(
//!     BufferStreamId::next(),
//!     BufferProperties::new((256, 256), Fourcc::Argb8888, BufferUsage::Software),
//!     AllocationStrategy::DoubleBuffer,
//!     Arc::new(MemoryAllocator::new()),
//!     sink.clone(),
//! ).unwrap());
//!
//! // the client received both buffers and submits the first one
//! let buffers: Vec<_> = sink.take().iter().map(BufferMessage::id).collect();
//! stream.submit_buffer(buffers[0]).unwrap();
//!
//! let render_loop = RenderLoop::new();
//! render_loop.add_stream(stream.clone(), (0, 0));
//! let mut display = HeadlessDisplay::new((1920, 1080), 60_000);
//! let stats = render_loop.render(&mut display).unwrap();
//! assert_eq!(stats.composited, 1);
//! ```

mod buffer_map;
mod render_loop;
mod strategy;
mod stream;

pub use self::buffer_map::{BufferMap, BufferNotFound, Owner};
pub use self::render_loop::{RenderLoop, RenderStats};
pub use self::strategy::{AllocationStrategy, InvalidStrategy};
pub use self::stream::{BufferStream, Frame, StreamError};
