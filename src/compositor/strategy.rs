use std::{fmt, num::NonZeroUsize, str::FromStr};

use tracing::debug;

use super::BufferMap;
use crate::backend::allocator::{AllocError, BufferId, BufferProperties};

/// Policy deciding how many buffers a stream gets
///
/// Both variants allocate their whole buffer set when the stream is set up. Afterwards
/// buffers are only recycled by transferring their ownership, never allocated or freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AllocationStrategy {
    /// Preallocate a fixed number of buffers
    ///
    /// Chosen when a predictable memory footprint matters more than latency, more
    /// buffers let the client render ahead of the server.
    FixedCount(NonZeroUsize),
    /// Exactly two buffers, one on screen and one for the client
    ///
    /// Minimizes the latency between a client submission and its presentation, at the
    /// cost of stalling the client whenever the server does not keep up.
    #[default]
    DoubleBuffer,
}

impl AllocationStrategy {
    /// Strategy preallocating `count` buffers, `None` if `count` is zero
    pub fn fixed_count(count: usize) -> Option<AllocationStrategy> {
        NonZeroUsize::new(count).map(AllocationStrategy::FixedCount)
    }

    /// Number of buffers provisioned for a stream
    pub fn buffer_count(&self) -> usize {
        match self {
            AllocationStrategy::FixedCount(count) => count.get(),
            AllocationStrategy::DoubleBuffer => 2,
        }
    }

    /// Returns true if a stream served by `map` is allowed to hold one more buffer
    pub fn may_allocate(&self, map: &BufferMap) -> bool {
        map.len() < self.buffer_count()
    }

    /// Allocate the buffer set of a stream into `map`
    ///
    /// Every buffer is handed to the client right away. The set is added as a whole:
    /// if an allocation fails, nothing is added and the error is returned.
    pub fn populate(
        &self,
        map: &BufferMap,
        properties: &BufferProperties,
    ) -> Result<Vec<BufferId>, AllocError> {
        let missing = self.buffer_count().saturating_sub(map.len());
        map.add_buffers(properties, missing).map_err(|err| {
            debug!(stream = %map.stream_id(), strategy = %self, "Failed to populate buffer set: {}", err);
            err
        })
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationStrategy::FixedCount(count) => write!(f, "fixed:{}", count),
            AllocationStrategy::DoubleBuffer => f.write_str("double"),
        }
    }
}

/// A string could not be parsed as an [`AllocationStrategy`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid allocation strategy `{0}`, expected `double` or `fixed:<count>`")]
pub struct InvalidStrategy(String);

impl FromStr for AllocationStrategy {
    type Err = InvalidStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "double" => Ok(AllocationStrategy::DoubleBuffer),
            Some(("fixed", count)) => count
                .parse::<usize>()
                .ok()
                .and_then(AllocationStrategy::fixed_count)
                .ok_or_else(|| InvalidStrategy(s.to_owned())),
            _ => Err(InvalidStrategy(s.to_owned())),
        }
    }
}
