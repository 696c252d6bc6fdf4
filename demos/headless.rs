use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use buffer_streams::{
    backend::{
        allocator::{
            memory::{MemoryAllocator, MemoryBuffer},
            Buffer, BufferId, BufferProperties, BufferUsage, Fourcc,
        },
        display::HeadlessDisplay,
    },
    compositor::{AllocationStrategy, BufferStream, RenderLoop, RenderStats},
    frontend::{BufferMessage, BufferStreamId, ChannelEventSink},
    reexports::calloop::{
        channel::{Channel, Event},
        EventLoop, LoopSignal,
    },
};
use clap::Parser;
use tracing::{info, warn};

/// Composite a number of simulated clients onto a headless display
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Buffer allocation strategy of every stream, `double` or `fixed:<count>`
    #[arg(short, long, default_value = "double")]
    strategy: AllocationStrategy,
    /// Number of frames to present before exiting
    #[arg(short, long, default_value_t = 120)]
    frames: usize,
    /// Number of simulated clients
    #[arg(short, long, default_value_t = 4)]
    clients: usize,
    /// Width of a client buffer
    #[arg(long, default_value_t = 256)]
    width: i32,
    /// Height of a client buffer
    #[arg(long, default_value_t = 256)]
    height: i32,
    /// Refresh rate of the display in millihertz
    #[arg(long, default_value_t = 60_000)]
    refresh: i32,
}

struct Compositor {
    signal: LoopSignal,
    target: usize,
    frames: usize,
    total: RenderStats,
}

#[derive(Default)]
struct Client {
    buffers: HashMap<BufferId, Buffer>,
    free: VecDeque<BufferId>,
    frame: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    if let Ok(env_filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().init();
    }

    let allocator = Arc::new(MemoryAllocator::new());
    let render_loop = Arc::new(RenderLoop::new());
    let stop = Arc::new(AtomicBool::new(false));

    let mut clients = Vec::with_capacity(args.clients);
    for i in 0..args.clients {
        let (sink, channel) = ChannelEventSink::new();
        let stream = Arc::new(BufferStream::new(
            BufferStreamId::next(),
            BufferProperties::new((args.width, args.height), Fourcc::Argb8888, BufferUsage::Software),
            args.strategy,
            allocator.clone(),
            Arc::new(sink),
        )?);
        let location = ((i as i32 % 4) * args.width, (i as i32 / 4) * args.height);
        render_loop.add_stream(stream.clone(), location);

        let stop = stop.clone();
        let color = 0xff00_0000 | ((0x40 * (i as u32 % 4 + 1)) & 0xff) << ((i % 3) * 8);
        clients.push((
            stream.id(),
            thread::Builder::new()
                .name(format!("client-{}", i))
                .spawn(move || run_client(stream, channel, stop, color))?,
        ));
    }

    let mut event_loop = EventLoop::<Compositor>::try_new()?;
    let display = HeadlessDisplay::new(
        ((args.width * 4).max(1), (args.height * ((args.clients as i32 + 3) / 4)).max(1)),
        args.refresh,
    );
    let interval = display.frame_interval();
    render_loop
        .clone()
        .insert_into_loop(&event_loop.handle(), display, interval, |stats, state: &mut Compositor| {
            state.frames += 1;
            state.total.composited += stats.composited;
            state.total.unchanged += stats.unchanged;
            state.total.skipped += stats.skipped;
            state.total.hidden += stats.hidden;
            if state.frames >= state.target {
                state.signal.stop();
            }
        })
        .map_err(|err| err.error)?;

    let mut state = Compositor {
        signal: event_loop.get_signal(),
        target: args.frames,
        frames: 0,
        total: RenderStats::default(),
    };
    info!(clients = args.clients, strategy = %args.strategy, "Starting render loop");
    event_loop.run(None, &mut state, |_| {})?;

    stop.store(true, Ordering::SeqCst);
    for (id, handle) in clients {
        render_loop.remove_stream(id);
        match handle.join() {
            Ok(Ok(submitted)) => info!(stream = %id, submitted, "Client finished"),
            Ok(Err(err)) => warn!(stream = %id, "Client failed: {}", err),
            Err(_) => warn!(stream = %id, "Client panicked"),
        }
    }

    info!(
        frames = state.frames,
        composited = state.total.composited,
        unchanged = state.total.unchanged,
        skipped = state.total.skipped,
        "Render loop finished"
    );
    Ok(())
}

/// Simulated client, renders into every buffer handed to it and submits it right away
fn run_client(
    stream: Arc<BufferStream>,
    channel: Channel<BufferMessage>,
    stop: Arc<AtomicBool>,
    color: u32,
) -> Result<u32, buffer_streams::reexports::calloop::Error> {
    let mut event_loop = EventLoop::<Client>::try_new()?;
    event_loop
        .handle()
        .insert_source(channel, |event, _, client| {
            if let Event::Msg(msg) = event {
                match msg {
                    BufferMessage::Full { buffer, .. } => {
                        client.free.push_back(buffer.id());
                        client.buffers.insert(buffer.id(), buffer);
                    }
                    BufferMessage::Update { id, .. } => client.free.push_back(id),
                }
            }
        })
        .map_err(|err| err.error)?;

    let mut client = Client::default();
    while !stop.load(Ordering::SeqCst) {
        event_loop.dispatch(Some(Duration::from_millis(16)), &mut client)?;

        let Some(id) = client.free.pop_front() else {
            continue;
        };
        if let Some(memory) = client.buffers.get(&id).and_then(|b| b.native::<MemoryBuffer>()) {
            let pixel = color.wrapping_add(client.frame % 0x40).to_le_bytes();
            memory.with_data_mut(|data| {
                for chunk in data.chunks_exact_mut(4) {
                    chunk.copy_from_slice(&pixel);
                }
            });
        }
        match stream.submit_buffer(id) {
            Ok(()) => client.frame += 1,
            Err(err) => warn!(stream = %stream.id(), "Failed to submit buffer: {}", err),
        }
    }

    Ok(client.frame)
}
