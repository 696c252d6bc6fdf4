//! Boundary towards client connections
//!
//! The protocol layer handling client connections is not part of this crate.
//! This module contains what the compositor core needs to talk to it:
//!
//! - [`BufferStreamId`], naming the stream a message is about
//! - the [`EventSink`] capability, notifying one client about buffer transfers,
//!   along with a [`calloop`] channel based implementation in [`ChannelEventSink`]

mod event_sink;

pub use self::event_sink::{
    BufferIpcMsgType, BufferMessage, ChannelEventSink, EventSink, RecordingEventSink,
};

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a buffer stream
///
/// Each stream of buffers, usually one per client surface, has a unique id
/// that is part of every message about its buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferStreamId(u64);

impl BufferStreamId {
    /// Allocate a new, process-unique stream id
    pub fn next() -> BufferStreamId {
        BufferStreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value of this id
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferStreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}
