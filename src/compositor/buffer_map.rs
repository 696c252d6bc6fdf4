use std::{
    fmt,
    sync::{Arc, Mutex},
};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::{
    backend::allocator::{AllocError, Allocator, Buffer, BufferId, BufferProperties},
    frontend::{BufferIpcMsgType, BufferStreamId, EventSink},
};

/// Party currently allowed to access the pixels of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The compositor may read the buffer for presentation
    Server,
    /// The client may render into the buffer
    Client,
}

/// A buffer id was not found in a [`BufferMap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Cannot find buffer {0} in the buffer map")]
pub struct BufferNotFound(pub BufferId);

#[derive(Debug)]
struct Entry {
    buffer: Buffer,
    owner: Owner,
}

/// Ownership ledger of the buffers of one stream
///
/// The map holds every buffer belonging to a stream and records for each of them
/// whether the client or the server may currently access it. It is shared between
/// the thread handling the client connection and the render thread.
///
/// Every mutation is serialized together with the notification it causes, so a client
/// is never told it owns a buffer before the map agrees. The lock protecting the
/// entries themselves is only held for the mutation, so lookups done by the render
/// thread never wait for the [`EventSink`] or the [`Allocator`].
///
/// Operations for buffers that are not part of the map are handled in two ways:
/// - [`send_buffer`](BufferMap::send_buffer) and [`receive_buffer`](BufferMap::receive_buffer)
///   ignore them, as the buffer may have been removed concurrently by a resize or teardown.
/// - [`remove_buffer`](BufferMap::remove_buffer) and [`get`](BufferMap::get) fail with
///   [`BufferNotFound`], as the caller made a mistake.
pub struct BufferMap {
    stream_id: BufferStreamId,
    sink: Arc<dyn EventSink>,
    allocator: Arc<dyn Allocator>,
    transfers: Mutex<()>,
    buffers: Mutex<IndexMap<BufferId, Entry>>,
}

impl fmt::Debug for BufferMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferMap")
            .field("stream_id", &self.stream_id)
            .field("buffers", &self.buffers)
            .finish_non_exhaustive()
    }
}

impl BufferMap {
    /// Create an empty buffer map for the given stream
    ///
    /// Notifications for this stream go to `sink`, new buffers are created by `allocator`.
    pub fn new(stream_id: BufferStreamId, sink: Arc<dyn EventSink>, allocator: Arc<dyn Allocator>) -> BufferMap {
        BufferMap {
            stream_id,
            sink,
            allocator,
            transfers: Mutex::new(()),
            buffers: Mutex::new(IndexMap::new()),
        }
    }

    /// Id of the stream served by this map
    pub fn stream_id(&self) -> BufferStreamId {
        self.stream_id
    }

    /// Allocate a new buffer and hand it to the client
    ///
    /// The buffer is inserted as client-owned and the client receives its full description.
    /// On allocation failure the map is left untouched.
    pub fn add_buffer(&self, properties: &BufferProperties) -> Result<BufferId, AllocError> {
        let mut ids = self.add_buffers(properties, 1)?;
        Ok(ids.remove(0))
    }

    /// Allocate `count` new buffers and hand them to the client
    ///
    /// Either all buffers are added or none: every buffer is allocated before the first
    /// one is inserted, a failed allocation releases the ones allocated so far.
    pub fn add_buffers(&self, properties: &BufferProperties, count: usize) -> Result<Vec<BufferId>, AllocError> {
        let buffers = (0..count)
            .map(|_| self.allocator.alloc_buffer(properties))
            .collect::<Result<Vec<_>, _>>()?;
        debug_assert!(buffers.iter().all(|buffer| buffer.properties() == properties));

        let _transfer = self.transfers.lock().unwrap();
        {
            let mut entries = self.buffers.lock().unwrap();
            for buffer in &buffers {
                entries.insert(
                    buffer.id(),
                    Entry {
                        buffer: buffer.clone(),
                        owner: Owner::Client,
                    },
                );
            }
        }
        for buffer in &buffers {
            debug!(stream = %self.stream_id, buffer = %buffer.id(), "Buffer added");
            self.sink
                .send_buffer(self.stream_id, buffer, BufferIpcMsgType::Full);
        }

        Ok(buffers.iter().map(Buffer::id).collect())
    }

    /// Remove a buffer from the map
    ///
    /// The removed handle is returned, the buffer is destroyed once it and every other
    /// handle to it are dropped. The caller must make sure the buffer is not part of an
    /// ongoing transfer, this function does not wait for anything.
    pub fn remove_buffer(&self, id: BufferId) -> Result<Buffer, BufferNotFound> {
        let _transfer = self.transfers.lock().unwrap();
        let entry = self
            .buffers
            .lock()
            .unwrap()
            .shift_remove(&id)
            .ok_or(BufferNotFound(id))?;
        debug!(stream = %self.stream_id, buffer = %id, "Buffer removed");
        Ok(entry.buffer)
    }

    /// Hand a buffer to the client
    ///
    /// Marks the buffer client-owned and notifies the client. Every call sends exactly
    /// one notification, even if the client already owned the buffer.
    /// Does nothing if the buffer is not part of the map.
    pub fn send_buffer(&self, id: BufferId) {
        let _transfer = self.transfers.lock().unwrap();
        let buffer = {
            let mut buffers = self.buffers.lock().unwrap();
            match buffers.get_mut(&id) {
                Some(entry) => {
                    entry.owner = Owner::Client;
                    entry.buffer.clone()
                }
                None => {
                    trace!(stream = %self.stream_id, buffer = %id, "Ignoring send of unknown buffer");
                    return;
                }
            }
        };
        trace!(stream = %self.stream_id, buffer = %id, "Buffer sent to client");
        self.sink
            .send_buffer(self.stream_id, &buffer, BufferIpcMsgType::Update);
    }

    /// Take a buffer back from the client
    ///
    /// Marks the buffer server-owned, the client signals with this that it finished
    /// rendering into it. Does nothing if the buffer is not part of the map.
    pub fn receive_buffer(&self, id: BufferId) {
        let _transfer = self.transfers.lock().unwrap();
        match self.buffers.lock().unwrap().get_mut(&id) {
            Some(entry) => {
                entry.owner = Owner::Server;
                trace!(stream = %self.stream_id, buffer = %id, "Buffer received from client");
            }
            None => {
                trace!(stream = %self.stream_id, buffer = %id, "Ignoring receive of unknown buffer");
            }
        }
    }

    /// Look up a buffer of this map
    pub fn get(&self, id: BufferId) -> Result<Buffer, BufferNotFound> {
        self.buffers
            .lock()
            .unwrap()
            .get(&id)
            .map(|entry| entry.buffer.clone())
            .ok_or(BufferNotFound(id))
    }

    /// Current owner of a buffer of this map
    pub fn owner(&self, id: BufferId) -> Result<Owner, BufferNotFound> {
        self.buffers
            .lock()
            .unwrap()
            .get(&id)
            .map(|entry| entry.owner)
            .ok_or(BufferNotFound(id))
    }

    /// Look up a buffer, if it is part of the map and currently owned by the server
    ///
    /// This is what the render thread uses to fetch pixels, it never returns a buffer
    /// the client may still be writing to.
    pub fn server_buffer(&self, id: BufferId) -> Option<Buffer> {
        self.buffers
            .lock()
            .unwrap()
            .get(&id)
            .filter(|entry| entry.owner == Owner::Server)
            .map(|entry| entry.buffer.clone())
    }

    /// Number of buffers currently owned by the client
    pub fn client_owned_buffer_count(&self) -> usize {
        self.buffers
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.owner == Owner::Client)
            .count()
    }

    /// Ids of all buffers of this map, in the order they were added
    pub fn buffer_ids(&self) -> Vec<BufferId> {
        self.buffers.lock().unwrap().keys().copied().collect()
    }

    /// Number of buffers in this map
    pub fn len(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }

    /// Returns true if the map holds no buffers
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
