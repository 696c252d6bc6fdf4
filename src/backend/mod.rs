//! Backend helpers
//!
//! Everything that touches memory or hardware lives here:
//!
//! - [`allocator`] allocates the buffers shared with clients
//! - [`display`] abstracts the output a render loop presents onto

pub mod allocator;
pub mod display;
