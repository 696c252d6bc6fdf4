use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument, trace};

use super::{AllocationStrategy, BufferMap, BufferNotFound, Owner};
use crate::{
    backend::allocator::{AllocError, Allocator, Buffer, BufferId, BufferProperties},
    frontend::{BufferStreamId, EventSink},
    utils::{Buffer as BufferCoords, Size},
};

/// Errors of the flow control done by a [`BufferStream`]
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Allocating a buffer failed
    #[error("Failed to allocate a buffer")]
    Alloc(#[from] AllocError),
    /// The buffer is not part of the stream
    #[error(transparent)]
    NotFound(#[from] BufferNotFound),
    /// The client submitted a buffer it does not own
    #[error("Buffer {0} is not owned by the client")]
    NotClientOwned(BufferId),
    /// The client asked for more buffers than the allocation strategy provisioned
    #[error("Client exceeded the {provisioned} buffers provisioned for this stream")]
    StrategyViolation {
        /// Number of buffers provisioned by the strategy
        provisioned: usize,
    },
}

#[derive(Debug)]
struct StreamState {
    properties: BufferProperties,
    /// Newest submitted buffer, not yet picked up by a render pass
    pending: Option<BufferId>,
    /// Submission picked up by a render pass that did not finish yet
    in_flight: Option<BufferId>,
    /// Buffer presented by the last successful render pass with new content
    on_screen: Option<BufferId>,
}

/// A buffer handed to a render pass by [`BufferStream::prepare_frame`]
#[derive(Debug, Clone)]
pub struct Frame {
    /// The buffer to present
    pub buffer: Buffer,
    /// True if the buffer was submitted since the last presented frame
    ///
    /// A new frame has to be settled with [`BufferStream::finish_frame`] once the
    /// render pass is done with it.
    pub is_new: bool,
}

/// A stream of buffers of one client surface
///
/// Wraps the [`BufferMap`] of the stream and decides when buffers change hands:
///
/// - the client submits buffers it finished rendering with [`submit_buffer`](BufferStream::submit_buffer)
/// - a render pass picks up the frame to show with [`prepare_frame`](BufferStream::prepare_frame)
///   and settles it with [`finish_frame`](BufferStream::finish_frame)
/// - buffers that are no longer needed for presentation go back to the client
///
/// A buffer stays server-owned for as long as it may be on screen. The buffer a new
/// frame replaces is only handed back once the new frame was actually presented.
///
/// Neither side ever waits for the other. A client that stops submitting simply
/// leaves the render loop without new content for this stream.
#[derive(Debug)]
pub struct BufferStream {
    map: BufferMap,
    strategy: AllocationStrategy,
    state: Mutex<StreamState>,
}

impl BufferStream {
    /// Set up a new stream and allocate its buffer set
    ///
    /// All buffers start out owned by the client, which is told about each of them
    /// through `sink`.
    #[instrument(level = "debug", skip(allocator, sink), fields(stream = %id))]
    pub fn new(
        id: BufferStreamId,
        properties: BufferProperties,
        strategy: AllocationStrategy,
        allocator: Arc<dyn Allocator>,
        sink: Arc<dyn EventSink>,
    ) -> Result<BufferStream, AllocError> {
        let map = BufferMap::new(id, sink, allocator);
        let buffers = strategy.populate(&map, &properties)?;
        info!(%strategy, buffers = buffers.len(), "Buffer stream created");

        Ok(BufferStream {
            map,
            strategy,
            state: Mutex::new(StreamState {
                properties,
                pending: None,
                in_flight: None,
                on_screen: None,
            }),
        })
    }

    /// Id of this stream
    pub fn id(&self) -> BufferStreamId {
        self.map.stream_id()
    }

    /// Properties used for the buffers of this stream
    pub fn properties(&self) -> BufferProperties {
        self.state.lock().unwrap().properties
    }

    /// Allocation strategy of this stream
    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    /// Ownership ledger of this stream
    pub fn buffer_map(&self) -> &BufferMap {
        &self.map
    }

    /// Number of buffers currently owned by the client
    pub fn client_owned_buffers(&self) -> usize {
        self.map.client_owned_buffer_count()
    }

    /// The client finished rendering into a buffer
    ///
    /// The buffer becomes server-owned and will be picked up by the next render pass.
    /// If an earlier submission was not picked up yet, it is dropped in favor of this one
    /// and goes straight back to the client.
    ///
    /// Buffers that are no longer part of the stream, e.g. after a concurrent
    /// [`resize`](BufferStream::resize), are ignored.
    pub fn submit_buffer(&self, id: BufferId) -> Result<(), StreamError> {
        let mut state = self.state.lock().unwrap();
        match self.map.owner(id) {
            Err(BufferNotFound(_)) => {
                trace!(stream = %self.id(), buffer = %id, "Ignoring submission of stale buffer");
                return Ok(());
            }
            Ok(Owner::Server) => return Err(StreamError::NotClientOwned(id)),
            Ok(Owner::Client) => {}
        }

        self.map.receive_buffer(id);
        trace!(stream = %self.id(), buffer = %id, "Buffer submitted");
        if let Some(dropped) = state.pending.replace(id) {
            trace!(stream = %self.id(), buffer = %dropped, "Dropping unpresented frame");
            self.map.send_buffer(dropped);
        }
        Ok(())
    }

    /// Pick up the frame a render pass should show for this stream
    ///
    /// This is the newest submission if there is one, otherwise the frame that is
    /// already on screen. Returns `None` if the stream never presented anything.
    ///
    /// A new submission is reserved for the running pass, it has to be settled with
    /// [`finish_frame`](BufferStream::finish_frame). Until then the current frame
    /// stays on screen and server-owned.
    pub fn prepare_frame(&self) -> Option<Frame> {
        let mut state = self.state.lock().unwrap();
        if state.in_flight.is_none() {
            state.in_flight = state.pending.take();
        }
        if let Some(id) = state.in_flight {
            match self.map.server_buffer(id) {
                Some(buffer) => {
                    trace!(stream = %self.id(), buffer = %id, "Frame prepared");
                    return Some(Frame { buffer, is_new: true });
                }
                // removed concurrently
                None => state.in_flight = None,
            }
        }
        state
            .on_screen
            .and_then(|id| self.map.server_buffer(id))
            .map(|buffer| Frame { buffer, is_new: false })
    }

    /// Settle the new frame handed out by [`prepare_frame`](BufferStream::prepare_frame)
    ///
    /// If the frame was `presented`, it becomes the frame on screen and the frame it
    /// replaces goes back to the client. Otherwise the frame is pending again, unless
    /// the client submitted a newer one in the meantime, in which case it goes back to
    /// the client as well.
    pub fn finish_frame(&self, presented: bool) {
        let mut state = self.state.lock().unwrap();
        let Some(id) = state.in_flight.take() else {
            return;
        };

        if presented {
            if let Some(previous) = state.on_screen.replace(id) {
                if previous != id {
                    self.map.send_buffer(previous);
                }
            }
            trace!(stream = %self.id(), buffer = %id, "Frame presented");
        } else if state.pending.is_none() {
            state.pending = Some(id);
            trace!(stream = %self.id(), buffer = %id, "Frame not presented, pending again");
        } else {
            trace!(stream = %self.id(), buffer = %id, "Dropping unpresented frame");
            self.map.send_buffer(id);
        }
    }

    /// Pick up the newest submission and mark it presented right away
    ///
    /// Returns `None` if nothing was submitted since the last presented frame.
    pub fn acquire_frame(&self) -> Option<Buffer> {
        let frame = self.prepare_frame().filter(|frame| frame.is_new)?;
        self.finish_frame(true);
        Some(frame.buffer)
    }

    /// Buffer currently on screen, if any
    pub fn current_frame(&self) -> Option<Buffer> {
        let state = self.state.lock().unwrap();
        state.on_screen.and_then(|id| self.map.server_buffer(id))
    }

    /// The client asks for one more buffer
    ///
    /// This is only granted while the stream holds fewer buffers than its strategy
    /// provisioned, otherwise the client violates the strategy and nothing is allocated.
    pub fn request_buffer(&self) -> Result<BufferId, StreamError> {
        let state = self.state.lock().unwrap();
        if !self.strategy.may_allocate(&self.map) {
            return Err(StreamError::StrategyViolation {
                provisioned: self.strategy.buffer_count(),
            });
        }
        Ok(self.map.add_buffer(&state.properties)?)
    }

    /// Change the size of the buffers of this stream
    ///
    /// A complete new buffer set is allocated before the current buffers are removed.
    /// If that allocation fails the stream keeps its current buffers and size. Handles
    /// still held by a running render pass keep their buffer alive until they are dropped.
    #[instrument(level = "debug", skip(self), fields(stream = %self.id()))]
    pub fn resize(&self, size: Size<i32, BufferCoords>) -> Result<(), StreamError> {
        let mut state = self.state.lock().unwrap();
        if state.properties.size == size {
            return Ok(());
        }

        let mut properties = state.properties;
        properties.size = size;
        let previous = self.map.buffer_ids();
        let buffers = self
            .map
            .add_buffers(&properties, self.strategy.buffer_count())?;

        for id in previous {
            self.map.remove_buffer(id)?;
        }
        state.pending = None;
        state.in_flight = None;
        state.on_screen = None;
        state.properties = properties;

        debug!(buffers = buffers.len(), "Buffer stream resized");
        Ok(())
    }
}
