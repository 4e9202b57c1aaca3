//! Demo pipeline: synthetic depth camera into the frame dispatcher.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use color_eyre::Result;
use tracing::info;

use fathom::capture::source::{FrameSource, StreamSpec, SyntheticSource};
use fathom::display::{DisplayHub, LogSink};
use fathom::pipeline::{FrameDispatcher, ImageProcessor, ParseStage};
use fathom::utils::FpsCounter;
use fathom::{ComponentId, Config, PixelFormat};

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fathom=info".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    fathom::CONFIG.store(Arc::new(config.clone()));
    info!(?config, "fathom starting");

    let hub = Arc::new(DisplayHub::new(Box::new(LogSink)));
    let dispatcher = FrameDispatcher::with_options(
        Arc::clone(&hub),
        config.pipeline.queue_capacity,
        Duration::from_millis(config.pipeline.idle_poll_ms),
        config.pipeline.error_policy,
    );

    let mut streams = vec![
        StreamSpec {
            component: ComponentId::Depth,
            format: PixelFormat::Coord3dC16,
            width: config.source.width,
            height: config.source.height,
        },
        StreamSpec {
            component: ComponentId::Color,
            format: PixelFormat::Bgr8,
            width: config.source.width,
            height: config.source.height,
        },
    ];
    if config.source.tof_phase_ir {
        streams.push(StreamSpec {
            component: ComponentId::IrLeft,
            format: PixelFormat::TofIrFourGroupMono16,
            width: config.source.width,
            height: config.source.height,
        });
        dispatcher.set_processor(
            ComponentId::IrLeft,
            ImageProcessor::new("ir", Arc::clone(&hub)).with_stage(ParseStage::PhaseIntensity),
        );
    }

    let keys = dispatcher.key_events();
    let mut source = SyntheticSource::new(streams, config.source.frame_limit);
    let mut fps = FpsCounter::new();

    while let Some(frame) = source.next_frame()? {
        dispatcher.update(frame);
        if let Some(rate) = fps.tick() {
            info!(fps = rate, "streaming");
        }
        if let Ok(event) = keys.try_recv() {
            if event.code == 'q' as i32 || event.code == 'Q' as i32 {
                info!("exit requested");
                break;
            }
        }
        // Pace like a 30 fps device.
        thread::sleep(Duration::from_millis(33));
    }

    let stats = dispatcher.queue_stats();
    info!(
        pushed = stats.pushed,
        popped = stats.popped,
        dropped = stats.dropped,
        "pipeline stopped"
    );
    Ok(())
}
