#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # buffer-streams: buffer ownership and flow control for compositors
//!
//! This crate implements the server side of buffer streams, the mechanism through which
//! clients of a display server hand rendered frames to the compositor. A stream owns a
//! small set of buffers and every buffer is at any time either owned by the client,
//! which may render into it, or by the server, which may present it.
//!
//! ## Structure of the crate
//!
//! - [`compositor`] contains the ownership ledger of a stream, the allocation strategies,
//!   the per-stream flow control and the render loop compositing all streams.
//! - [`backend`] contains the buffer allocators and the display abstraction.
//! - [`frontend`] is the boundary towards client connections. The protocol itself is
//!   not part of this crate, only the [`EventSink`](frontend::EventSink) through which
//!   clients are told about buffer transfers.
//!
//! ## General principles
//!
//! ### The event loop
//!
//! The render loop can be driven by [`calloop`], the callback-oriented event loop used
//! throughout this crate. [`RenderLoop::insert_into_loop`](compositor::RenderLoop::insert_into_loop)
//! registers a timer firing once per refresh cycle of the display, and
//! [`ChannelEventSink`](frontend::ChannelEventSink) delivers buffer notifications into
//! the event loop of a client connection.
//!
//! ### Threading
//!
//! Client connections and rendering usually happen on different threads, so every type
//! shared between them is `Send + Sync`. Notifications towards a client are sent while
//! the transfer they announce is serialized with all other transfers of the same stream,
//! a client therefore sees the transfers in the order they happened.
//!
//! ### Logging
//!
//! This crate makes extensive use of [`tracing`] for its internal logging.
//!
//! For release builds it is recommended to limit the log level during compile time.
//! This can be done by adding a dependency to [`tracing`] and enabling the corresponding features.
//! For example to enable `trace` messages for debug builds, but limit release builds to `debug` add
//! the following in your binary crate `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["max_level_trace", "release_max_level_debug"] }
//! ```
//!
//! If you do not want to use [`tracing`], refer to [`log compatibility`](tracing#log-compatibility)
//! for how to forward the debug output to other `log` compatible frameworks.

pub mod backend;
pub mod compositor;
pub mod frontend;
pub mod utils;

pub mod reexports;
