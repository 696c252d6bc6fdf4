use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use calloop::{
    timer::{TimeoutAction, Timer},
    InsertError, LoopHandle, RegistrationToken,
};
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::BufferStream;
use crate::{
    backend::display::{Display, RenderElement},
    frontend::BufferStreamId,
    utils::{Physical, Point, Rectangle},
};

/// Outcome of a single render pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    /// Streams that contributed a new frame
    pub composited: usize,
    /// Visible streams showing the same frame as before
    pub unchanged: usize,
    /// Visible streams without any frame to show
    pub skipped: usize,
    /// Streams outside of the visible area
    pub hidden: usize,
}

#[derive(Debug)]
struct SceneEntry {
    stream: Arc<BufferStream>,
    location: Point<i32, Physical>,
}

/// Composites the buffer streams of a display
///
/// Streams are stacked in the order they were added, the last one on top. A render
/// pass holds the scene for its whole duration, so a stream removed with
/// [`remove_stream`](RenderLoop::remove_stream) is guaranteed to not be read by any
/// pass anymore once that call returns. Remove a stream here before tearing it down.
///
/// The render loop never touches buffer ownership directly. It asks every stream for
/// the frame to show and tells it afterwards whether the frame made it to the display.
#[derive(Debug, Default)]
pub struct RenderLoop {
    scene: Mutex<IndexMap<BufferStreamId, SceneEntry>>,
}

impl RenderLoop {
    /// Create a render loop with an empty scene
    pub fn new() -> RenderLoop {
        RenderLoop::default()
    }

    /// Place a stream on top of the scene
    ///
    /// Adding a stream that is already part of the scene moves it to the given location.
    pub fn add_stream(&self, stream: Arc<BufferStream>, location: impl Into<Point<i32, Physical>>) {
        let location = location.into();
        let id = stream.id();
        debug!(stream = %id, ?location, "Stream mapped");
        self.scene
            .lock()
            .unwrap()
            .insert(id, SceneEntry { stream, location });
    }

    /// Remove a stream from the scene
    ///
    /// Waits for a running render pass to finish.
    pub fn remove_stream(&self, id: BufferStreamId) -> Option<Arc<BufferStream>> {
        let entry = self.scene.lock().unwrap().shift_remove(&id)?;
        debug!(stream = %id, "Stream unmapped");
        Some(entry.stream)
    }

    /// Move a stream of the scene, returns false if the stream is unknown
    pub fn relocate_stream(&self, id: BufferStreamId, location: impl Into<Point<i32, Physical>>) -> bool {
        match self.scene.lock().unwrap().get_mut(&id) {
            Some(entry) => {
                entry.location = location.into();
                true
            }
            None => false,
        }
    }

    /// Ids of all streams of the scene, bottom to top
    pub fn streams(&self) -> Vec<BufferStreamId> {
        self.scene.lock().unwrap().keys().copied().collect()
    }

    /// Run a single render pass onto `display`
    ///
    /// Every stream visible on the display contributes its newest submitted frame, or
    /// the frame it already shows if nothing new was submitted. Streams that never
    /// presented anything are skipped. The display is notified exactly once per pass.
    ///
    /// If compositing fails, the display is not notified and no stream considers its
    /// new frame presented: the frames on screen stay server-owned and the new ones are
    /// picked up again by the next pass.
    #[profiling::function]
    pub fn render<D: Display>(&self, display: &mut D) -> Result<RenderStats, D::Error> {
        let view_area = display.view_area();
        let mut stats = RenderStats::default();
        let mut elements: SmallVec<[RenderElement; 8]> = SmallVec::new();
        let scene = self.scene.lock().unwrap();
        let mut new_frames: SmallVec<[&BufferStream; 8]> = SmallVec::new();
        for (id, entry) in scene.iter() {
            let geometry = Rectangle::new(entry.location, entry.stream.properties().size.to_physical());
            let Some(visible) = view_area.intersection(geometry) else {
                stats.hidden += 1;
                continue;
            };

            let Some(frame) = entry.stream.prepare_frame() else {
                stats.skipped += 1;
                continue;
            };
            if frame.is_new {
                stats.composited += 1;
                new_frames.push(&entry.stream);
            } else {
                stats.unchanged += 1;
            }
            elements.push(RenderElement {
                stream: *id,
                geometry: Rectangle::new(entry.location, frame.buffer.size().to_physical()),
                visible,
                buffer: frame.buffer,
            });
        }

        let result = display.composite(&elements);
        for stream in new_frames {
            stream.finish_frame(result.is_ok());
        }
        // release the scene only after the display is done with the buffers
        drop(scene);
        result?;

        display.notify_update();
        trace!(?stats, "Render pass finished");
        Ok(stats)
    }

    /// Drive render passes from a [`calloop`] event loop
    ///
    /// A pass is run right away and then every `interval`. Failed passes are logged
    /// and do not stop the loop. `on_frame` is called after every successful pass.
    pub fn insert_into_loop<'l, D, Data, F>(
        self: Arc<Self>,
        handle: &LoopHandle<'l, Data>,
        mut display: D,
        interval: Duration,
        mut on_frame: F,
    ) -> Result<RegistrationToken, InsertError<Timer>>
    where
        D: Display + 'l,
        Data: 'l,
        F: FnMut(&RenderStats, &mut Data) + 'l,
    {
        handle.insert_source(Timer::immediate(), move |_, _, data| {
            match self.render(&mut display) {
                Ok(stats) => on_frame(&stats, data),
                Err(err) => warn!("Render pass failed: {}", err),
            }
            TimeoutAction::ToDuration(interval)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{fmt, sync::Arc, time::Duration};

    use calloop::EventLoop;

    use super::{RenderLoop, RenderStats};
    use crate::{
        backend::{
            allocator::{memory::MemoryAllocator, BufferId, BufferProperties, BufferUsage, Fourcc},
            display::{Display, HeadlessDisplay, RenderElement},
        },
        compositor::{AllocationStrategy, BufferStream, Owner},
        frontend::{BufferMessage, BufferStreamId, RecordingEventSink},
        utils::{Physical, Rectangle},
    };

    fn stream(strategy: AllocationStrategy, size: (i32, i32)) -> (Arc<BufferStream>, Vec<BufferId>) {
        let sink = Arc::new(RecordingEventSink::new());
        let stream = BufferStream::new(
            BufferStreamId::next(),
            BufferProperties::new(size, Fourcc::Argb8888, BufferUsage::Software),
            strategy,
            Arc::new(MemoryAllocator::new()),
            sink.clone(),
        )
        .unwrap();
        let ids = sink.take().iter().map(BufferMessage::id).collect();
        (Arc::new(stream), ids)
    }

    #[test]
    fn empty_scene_still_presents() {
        let render_loop = RenderLoop::new();
        let mut display = HeadlessDisplay::new((640, 480), 60_000);

        let stats = render_loop.render(&mut display).unwrap();
        assert_eq!(stats, RenderStats::default());
        assert_eq!(display.updates(), 1);
        assert_eq!(display.frames().len(), 1);
        assert!(display.frames()[0].elements.is_empty());
    }

    #[test]
    fn double_buffered_stream_is_composited() {
        let (stream, ids) = stream(AllocationStrategy::DoubleBuffer, (100, 100));
        let render_loop = RenderLoop::new();
        render_loop.add_stream(stream.clone(), (0, 0));
        let mut display = HeadlessDisplay::new((640, 480), 60_000);

        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| stream.buffer_map().owner(*id) == Ok(Owner::Client)));

        // submitting receives the buffer into server ownership
        stream.submit_buffer(ids[0]).unwrap();
        assert_eq!(stream.buffer_map().owner(ids[0]), Ok(Owner::Server));
        let stats = render_loop.render(&mut display).unwrap();
        assert_eq!(stats.composited, 1);
        assert_eq!(display.frames()[0].elements, vec![(stream.id(), ids[0])]);
        assert_eq!(stream.current_frame().map(|buffer| buffer.id()), Some(ids[0]));

        // nothing new was submitted, the current frame stays on screen
        let stats = render_loop.render(&mut display).unwrap();
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(display.frames()[1].elements, vec![(stream.id(), ids[0])]);
        assert_eq!(display.updates(), 2);

        // the pool stays at two buffers
        assert!(stream.request_buffer().is_err());
        assert_eq!(stream.buffer_map().len(), 2);
    }

    #[test]
    fn only_visible_streams_are_composited() {
        let (visible, visible_ids) = stream(AllocationStrategy::DoubleBuffer, (100, 100));
        let (offscreen, offscreen_ids) = stream(AllocationStrategy::DoubleBuffer, (100, 100));
        let (idle, _) = stream(AllocationStrategy::DoubleBuffer, (100, 100));

        let render_loop = RenderLoop::new();
        render_loop.add_stream(visible.clone(), (600, 400));
        render_loop.add_stream(offscreen.clone(), (1000, 0));
        render_loop.add_stream(idle, (0, 0));

        visible.submit_buffer(visible_ids[0]).unwrap();
        offscreen.submit_buffer(offscreen_ids[0]).unwrap();

        let mut display = HeadlessDisplay::new((640, 480), 60_000);
        let stats = render_loop.render(&mut display).unwrap();
        assert_eq!(
            stats,
            RenderStats {
                composited: 1,
                unchanged: 0,
                skipped: 1,
                hidden: 1,
            }
        );
        assert_eq!(display.updates(), 1);

        // the hidden stream keeps its frame until it becomes visible
        assert!(render_loop.relocate_stream(offscreen.id(), (0, 0)));
        let stats = render_loop.render(&mut display).unwrap();
        assert_eq!(stats.composited, 1);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(
            display.frames()[1].elements,
            vec![(visible.id(), visible_ids[0]), (offscreen.id(), offscreen_ids[0])]
        );
    }

    /// Headless display whose next `failures` composites fail
    #[derive(Debug)]
    struct FlakyDisplay {
        inner: HeadlessDisplay,
        failures: usize,
    }

    #[derive(Debug)]
    struct DisplayLost;

    impl fmt::Display for DisplayLost {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("display lost")
        }
    }

    impl std::error::Error for DisplayLost {}

    impl Display for FlakyDisplay {
        type Error = DisplayLost;

        fn view_area(&self) -> Rectangle<i32, Physical> {
            self.inner.view_area()
        }

        fn composite(&mut self, elements: &[RenderElement]) -> Result<(), Self::Error> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(DisplayLost);
            }
            self.inner.composite(elements).map_err(|err| match err {})
        }

        fn notify_update(&mut self) {
            self.inner.notify_update();
        }
    }

    #[test]
    fn failed_composite_is_reported() {
        let render_loop = RenderLoop::new();
        let mut display = FlakyDisplay {
            inner: HeadlessDisplay::new((640, 480), 60_000),
            failures: 1,
        };
        assert!(render_loop.render(&mut display).is_err());
        assert_eq!(display.inner.updates(), 0);
        assert!(render_loop.render(&mut display).is_ok());
        assert_eq!(display.inner.updates(), 1);
    }

    #[test]
    fn failed_composite_keeps_frames_server_owned() {
        let (stream, ids) = stream(AllocationStrategy::DoubleBuffer, (100, 100));
        let render_loop = RenderLoop::new();
        render_loop.add_stream(stream.clone(), (0, 0));
        let mut display = FlakyDisplay {
            inner: HeadlessDisplay::new((640, 480), 60_000),
            failures: 0,
        };

        stream.submit_buffer(ids[0]).unwrap();
        render_loop.render(&mut display).unwrap();

        stream.submit_buffer(ids[1]).unwrap();
        display.failures = 1;
        assert!(render_loop.render(&mut display).is_err());
        assert_eq!(display.inner.updates(), 1);

        // the frame still on the display was not handed back to the client
        assert_eq!(stream.buffer_map().owner(ids[0]), Ok(Owner::Server));
        assert_eq!(stream.buffer_map().owner(ids[1]), Ok(Owner::Server));
        assert_eq!(stream.current_frame().map(|buffer| buffer.id()), Some(ids[0]));
        assert_eq!(stream.client_owned_buffers(), 0);

        // the next pass presents the frame that failed
        let stats = render_loop.render(&mut display).unwrap();
        assert_eq!(stats.composited, 1);
        assert_eq!(display.inner.frames()[1].elements, vec![(stream.id(), ids[1])]);
        assert_eq!(stream.buffer_map().owner(ids[0]), Ok(Owner::Client));
        assert_eq!(display.inner.updates(), 2);
    }

    #[test]
    fn unchanged_streams_stay_on_screen() {
        let (stream, ids) = stream(AllocationStrategy::fixed_count(3).unwrap(), (100, 100));
        let render_loop = RenderLoop::new();
        render_loop.add_stream(stream.clone(), (0, 0));
        let mut display = HeadlessDisplay::new((640, 480), 60_000);

        // before the first submission there is nothing to show
        assert_eq!(render_loop.render(&mut display).unwrap().skipped, 1);

        stream.submit_buffer(ids[0]).unwrap();
        render_loop.render(&mut display).unwrap();
        for _ in 0..3 {
            let stats = render_loop.render(&mut display).unwrap();
            assert_eq!((stats.composited, stats.unchanged, stats.skipped), (0, 1, 0));
        }

        assert_eq!(display.frames().len(), 5);
        assert!(display.frames()[1..]
            .iter()
            .all(|frame| frame.elements == vec![(stream.id(), ids[0])]));
        assert_eq!(stream.buffer_map().owner(ids[0]), Ok(Owner::Server));
    }

    #[test]
    fn removed_streams_are_not_rendered() {
        let (stream, ids) = stream(AllocationStrategy::DoubleBuffer, (10, 10));
        let render_loop = RenderLoop::new();
        render_loop.add_stream(stream.clone(), (0, 0));
        stream.submit_buffer(ids[0]).unwrap();

        let removed = render_loop.remove_stream(stream.id()).unwrap();
        assert!(Arc::ptr_eq(&removed, &stream));
        assert!(render_loop.remove_stream(stream.id()).is_none());
        assert!(render_loop.streams().is_empty());

        let mut display = HeadlessDisplay::new((640, 480), 60_000);
        assert_eq!(render_loop.render(&mut display).unwrap(), RenderStats::default());
    }

    #[test]
    fn event_loop_drives_render_passes() {
        let (stream, ids) = stream(AllocationStrategy::DoubleBuffer, (10, 10));
        let render_loop = Arc::new(RenderLoop::new());
        render_loop.add_stream(stream.clone(), (0, 0));
        stream.submit_buffer(ids[0]).unwrap();

        let mut event_loop: EventLoop<'_, usize> = EventLoop::try_new().unwrap();
        render_loop
            .insert_into_loop(
                &event_loop.handle(),
                HeadlessDisplay::new((640, 480), 60_000),
                Duration::from_millis(1),
                |stats: &RenderStats, composited: &mut usize| *composited += stats.composited,
            )
            .unwrap();

        let mut composited = 0;
        event_loop
            .dispatch(Some(Duration::from_millis(10)), &mut composited)
            .unwrap();
        assert_eq!(composited, 1);
    }
}
