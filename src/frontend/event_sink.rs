use std::{fmt, sync::Mutex};

use calloop::channel::{self, Channel, Sender};
use tracing::debug;

use super::BufferStreamId;
use crate::backend::allocator::{Buffer, BufferId, BufferProperties};

/// Kind of buffer notification sent to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferIpcMsgType {
    /// First transfer of a buffer, the client needs its full description
    Full,
    /// The client already knows the buffer, only the ownership transfer is signaled
    Update,
}

/// Capability to notify a client about buffers it now owns
///
/// An event sink is bound to a single client connection. Delivery is
/// fire-and-forget: a sink must not block and handles delivery failures
/// (like a dead connection) itself.
pub trait EventSink: Send + Sync {
    /// Tell the client that `buffer` of `stream` is now available to it
    fn send_buffer(&self, stream: BufferStreamId, buffer: &Buffer, kind: BufferIpcMsgType);
}

/// Message describing a buffer transfer to a client
#[derive(Debug, Clone)]
pub enum BufferMessage {
    /// A buffer the client has not seen before
    Full {
        /// Stream the buffer belongs to
        stream: BufferStreamId,
        /// The buffer itself, for the client side to register
        buffer: Buffer,
    },
    /// A known buffer is handed back to the client
    Update {
        /// Stream the buffer belongs to
        stream: BufferStreamId,
        /// Id of the buffer
        id: BufferId,
    },
}

impl BufferMessage {
    fn new(stream: BufferStreamId, buffer: &Buffer, kind: BufferIpcMsgType) -> BufferMessage {
        match kind {
            BufferIpcMsgType::Full => BufferMessage::Full {
                stream,
                buffer: buffer.clone(),
            },
            BufferIpcMsgType::Update => BufferMessage::Update {
                stream,
                id: buffer.id(),
            },
        }
    }

    /// Stream this message is about
    pub fn stream(&self) -> BufferStreamId {
        match self {
            BufferMessage::Full { stream, .. } | BufferMessage::Update { stream, .. } => *stream,
        }
    }

    /// Id of the transferred buffer
    pub fn id(&self) -> BufferId {
        match self {
            BufferMessage::Full { buffer, .. } => buffer.id(),
            BufferMessage::Update { id, .. } => *id,
        }
    }

    /// Kind of this message
    pub fn kind(&self) -> BufferIpcMsgType {
        match self {
            BufferMessage::Full { .. } => BufferIpcMsgType::Full,
            BufferMessage::Update { .. } => BufferIpcMsgType::Update,
        }
    }

    /// Full description of the buffer, for [`BufferMessage::Full`] messages
    pub fn properties(&self) -> Option<&BufferProperties> {
        match self {
            BufferMessage::Full { buffer, .. } => Some(buffer.properties()),
            BufferMessage::Update { .. } => None,
        }
    }
}

/// [`EventSink`] forwarding messages to the event loop of a client connection
///
/// The receiving end is a [`calloop`] [`Channel`], to be inserted into the event loop
/// serving the client.
pub struct ChannelEventSink {
    sender: Sender<BufferMessage>,
}

impl fmt::Debug for ChannelEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEventSink").finish_non_exhaustive()
    }
}

impl ChannelEventSink {
    /// Create a new sink and the channel receiving its messages
    pub fn new() -> (ChannelEventSink, Channel<BufferMessage>) {
        let (sender, channel) = channel::channel();
        (ChannelEventSink::from_sender(sender), channel)
    }

    /// Create a sink sending into an existing channel
    pub fn from_sender(sender: Sender<BufferMessage>) -> ChannelEventSink {
        ChannelEventSink { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn send_buffer(&self, stream: BufferStreamId, buffer: &Buffer, kind: BufferIpcMsgType) {
        let message = BufferMessage::new(stream, buffer, kind);
        if self.sender.send(message).is_err() {
            debug!(%stream, buffer = %buffer.id(), "Client connection is gone, dropping buffer message");
        }
    }
}

/// [`EventSink`] storing all messages in memory
///
/// Useful for headless setups and tests, where no real client connection exists.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    messages: Mutex<Vec<BufferMessage>>,
}

impl RecordingEventSink {
    /// Create a new, empty sink
    pub fn new() -> RecordingEventSink {
        RecordingEventSink::default()
    }

    /// Take all messages recorded so far
    pub fn take(&self) -> Vec<BufferMessage> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }

    /// Number of messages recorded so far
    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    /// Returns true if no message was recorded since the last [`take`](Self::take)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingEventSink {
    fn send_buffer(&self, stream: BufferStreamId, buffer: &Buffer, kind: BufferIpcMsgType) {
        self.messages
            .lock()
            .unwrap()
            .push(BufferMessage::new(stream, buffer, kind));
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use calloop::{channel::Event, EventLoop};

    use super::{BufferIpcMsgType, BufferMessage, ChannelEventSink, EventSink};
    use crate::{
        backend::allocator::{memory::MemoryAllocator, Allocator, BufferProperties, BufferUsage, Fourcc},
        frontend::BufferStreamId,
    };

    #[test]
    fn channel_sink_delivers_to_event_loop() {
        let allocator = MemoryAllocator::new();
        let buffer = allocator
            .alloc_buffer(&BufferProperties::new((8, 8), Fourcc::Argb8888, BufferUsage::Software))
            .unwrap();
        let stream = BufferStreamId::next();

        let (sink, channel) = ChannelEventSink::new();
        let mut event_loop: EventLoop<'_, Vec<BufferMessage>> = EventLoop::try_new().unwrap();
        event_loop
            .handle()
            .insert_source(channel, |event, _, received| {
                if let Event::Msg(msg) = event {
                    received.push(msg);
                }
            })
            .unwrap();

        sink.send_buffer(stream, &buffer, BufferIpcMsgType::Full);
        sink.send_buffer(stream, &buffer, BufferIpcMsgType::Update);

        let mut received = Vec::new();
        event_loop
            .dispatch(Some(Duration::ZERO), &mut received)
            .unwrap();

        assert_eq!(received.len(), 2);
        assert_eq!(received[0].kind(), BufferIpcMsgType::Full);
        assert_eq!(received[0].properties(), Some(buffer.properties()));
        assert_eq!(received[1].kind(), BufferIpcMsgType::Update);
        assert!(received.iter().all(|msg| msg.stream() == stream && msg.id() == buffer.id()));
    }

    #[test]
    fn channel_sink_survives_closed_connection() {
        let allocator = MemoryAllocator::new();
        let buffer = allocator
            .alloc_buffer(&BufferProperties::new((8, 8), Fourcc::Argb8888, BufferUsage::Software))
            .unwrap();

        let (sink, channel) = ChannelEventSink::new();
        drop(channel);
        sink.send_buffer(BufferStreamId::next(), &buffer, BufferIpcMsgType::Update);
    }

    #[test]
    fn channel_sink_is_shared_between_threads() {
        let allocator = MemoryAllocator::new();
        let buffer = allocator
            .alloc_buffer(&BufferProperties::new((8, 8), Fourcc::Argb8888, BufferUsage::Software))
            .unwrap();
        let stream = BufferStreamId::next();

        let (sink, channel) = ChannelEventSink::new();
        let sink = Arc::new(sink);
        let senders = (0..4)
            .map(|_| {
                let (sink, buffer) = (sink.clone(), buffer.clone());
                thread::spawn(move || {
                    for _ in 0..8 {
                        sink.send_buffer(stream, &buffer, BufferIpcMsgType::Update);
                    }
                })
            })
            .collect::<Vec<_>>();
        for sender in senders {
            sender.join().unwrap();
        }

        let mut event_loop: EventLoop<'_, usize> = EventLoop::try_new().unwrap();
        event_loop
            .handle()
            .insert_source(channel, |event, _, received| {
                if let Event::Msg(_) = event {
                    *received += 1;
                }
            })
            .unwrap();
        let mut received = 0;
        event_loop
            .dispatch(Some(Duration::ZERO), &mut received)
            .unwrap();
        assert_eq!(received, 32);
    }
}
