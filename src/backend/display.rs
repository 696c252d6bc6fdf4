//! Display abstraction used by the render loop
//!
//! A [`Display`] is whatever the composited frames end up on: a hardware output,
//! a nested window or, with [`HeadlessDisplay`], nothing at all.

use std::{convert::Infallible, time::Duration};

use crate::{
    backend::allocator::{Buffer, BufferId},
    frontend::BufferStreamId,
    utils::{Physical, Rectangle, Size},
};

/// A buffer placed on a display by a render pass
#[derive(Debug, Clone)]
pub struct RenderElement {
    /// Stream the buffer belongs to
    pub stream: BufferStreamId,
    /// The buffer to present
    pub buffer: Buffer,
    /// Position and size of the buffer on the display
    pub geometry: Rectangle<i32, Physical>,
    /// Part of `geometry` inside the visible area of the display
    pub visible: Rectangle<i32, Physical>,
}

/// Output a render loop composites onto
pub trait Display {
    /// Error type returned when compositing fails
    type Error: std::error::Error;

    /// Currently visible area of the display
    fn view_area(&self) -> Rectangle<i32, Physical>;

    /// Present the given elements, ordered bottom to top
    fn composite(&mut self, elements: &[RenderElement]) -> Result<(), Self::Error>;

    /// A new frame was presented
    fn notify_update(&mut self);
}

/// A single presented frame, as recorded by [`HeadlessDisplay`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedFrame {
    /// Stream and buffer of every element, bottom to top
    pub elements: Vec<(BufferStreamId, BufferId)>,
}

/// [`Display`] without any hardware attached
///
/// Records what was presented, which is useful for headless servers and tests.
#[derive(Debug)]
pub struct HeadlessDisplay {
    size: Size<i32, Physical>,
    refresh: i32,
    frames: Vec<PresentedFrame>,
    updates: usize,
}

impl HeadlessDisplay {
    /// Create a new headless display
    ///
    /// `refresh` is the refresh rate in millihertz, `60_000` is 60 frames per second.
    pub fn new(size: impl Into<Size<i32, Physical>>, refresh: i32) -> HeadlessDisplay {
        HeadlessDisplay {
            size: size.into(),
            refresh,
            frames: Vec::new(),
            updates: 0,
        }
    }

    /// Duration of one refresh cycle of this display
    pub fn frame_interval(&self) -> Duration {
        frame_interval(self.refresh)
    }

    /// All frames presented so far
    pub fn frames(&self) -> &[PresentedFrame] {
        &self.frames
    }

    /// Number of times [`Display::notify_update`] was called
    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl Display for HeadlessDisplay {
    type Error = Infallible;

    fn view_area(&self) -> Rectangle<i32, Physical> {
        Rectangle::from_size(self.size)
    }

    fn composite(&mut self, elements: &[RenderElement]) -> Result<(), Self::Error> {
        self.frames.push(PresentedFrame {
            elements: elements
                .iter()
                .map(|element| (element.stream, element.buffer.id()))
                .collect(),
        });
        Ok(())
    }

    fn notify_update(&mut self) {
        self.updates += 1;
    }
}

/// Duration of one refresh cycle for a refresh rate in millihertz
///
/// Non-positive refresh rates fall back to 60Hz.
pub fn frame_interval(refresh: i32) -> Duration {
    let refresh = if refresh > 0 { refresh } else { 60_000 };
    Duration::from_nanos(1_000_000_000_000 / refresh as u64)
}
