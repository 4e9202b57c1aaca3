//! End-to-end pipeline tests: descriptor in, processed window out.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fathom::capture::frame::{CaptureDescriptor, Frame, SubImage};
use fathom::capture::source::{FrameSource, StreamSpec, SyntheticSource};
use fathom::display::{DisplayHub, TestSink};
use fathom::pipeline::{ErrorPolicy, FrameDispatcher, ImageProcessor, ParseStage};
use fathom::{ComponentId, ImageStatus, PixelFormat};

fn test_hub() -> (TestSink, Arc<DisplayHub>) {
    let sink = TestSink::new();
    let hub = Arc::new(DisplayHub::new(Box::new(sink.clone())));
    (sink, hub)
}

fn depth_frame(values: &[u16], width: u32, height: u32, sequence: u64) -> Arc<Frame> {
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let descriptor = CaptureDescriptor {
        data: &payload,
        images: vec![SubImage {
            component: ComponentId::Depth,
            format: PixelFormat::Coord3dC16,
            width,
            height,
            offset: 0,
            size: payload.len(),
            status: ImageStatus::Ok,
            timestamp: sequence * 33_333,
            sequence,
        }],
    };
    Arc::new(Frame::new(&descriptor).unwrap())
}

fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if done() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("pipeline made no progress within 2s");
}

#[test]
fn depth_frame_passes_through_and_flushes() {
    // Pass-through first, observed directly on a processor: parse must
    // store the exact input buffer.
    let (_sink, hub) = test_hub();
    let frame = depth_frame(&[100, 200, 300, 400], 2, 2, 1);
    let mut processor = ImageProcessor::new("depth-probe", Arc::clone(&hub));
    processor.parse(frame.depth_image().unwrap()).unwrap();
    assert_eq!(
        processor.image().unwrap().as_u16_samples().unwrap(),
        vec![100, 200, 300, 400]
    );
    drop(processor);

    // Then the same frame through a full dispatcher cycle: the depth window
    // must receive a colorized present, and flushing must not error (an
    // error would leave no present behind).
    let (sink, hub) = test_hub();
    let dispatcher = FrameDispatcher::new(hub);
    dispatcher.update(frame);
    wait_until(|| sink.presents_for("depth") > 0);

    let presents = sink.presents();
    let depth = presents.iter().find(|p| p.window == "depth").unwrap();
    assert_eq!(depth.format, PixelFormat::Bgr8);
    assert_eq!((depth.width, depth.height), (2, 2));
}

#[test]
fn quadrature_with_balanced_phases_yields_zero_intensity() {
    let (_sink, hub) = test_hub();
    let dispatcher = FrameDispatcher::new(Arc::clone(&hub));
    dispatcher.set_processor(
        ComponentId::IrLeft,
        ImageProcessor::new("ir", hub).with_stage(ParseStage::PhaseIntensity),
    );

    // Planes [phase180 | phase90 | phase0 | phase270]: phase0 == phase180
    // and phase90 == phase270 for every pixel.
    let plane = [900u16, 1000, 1100, 1200];
    let payload: Vec<u8> = plane
        .iter()
        .chain(plane.iter())
        .chain(plane.iter())
        .chain(plane.iter())
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let descriptor = CaptureDescriptor {
        data: &payload,
        images: vec![SubImage {
            component: ComponentId::IrLeft,
            format: PixelFormat::TofIrFourGroupMono16,
            width: 2,
            height: 2,
            offset: 0,
            size: payload.len(),
            status: ImageStatus::Ok,
            timestamp: 0,
            sequence: 1,
        }],
    };
    dispatcher.update(Arc::new(Frame::new(&descriptor).unwrap()));

    wait_until(|| dispatcher.current_image(ComponentId::IrLeft).is_some());
    let intensity = dispatcher.current_image(ComponentId::IrLeft).unwrap();
    assert_eq!(intensity.format(), PixelFormat::Mono16);
    assert!(intensity.as_u16_samples().unwrap().iter().all(|&v| v == 0));
}

#[test]
fn mixed_status_descriptor_exposes_only_successful_components() {
    let payload = vec![0u8; 12];
    let sub = |component, offset, status| SubImage {
        component,
        format: PixelFormat::Mono8,
        width: 4,
        height: 1,
        offset,
        size: 4,
        status,
        timestamp: 0,
        sequence: 1,
    };
    let descriptor = CaptureDescriptor {
        data: &payload,
        images: vec![
            sub(ComponentId::Depth, 0, ImageStatus::Ok),
            sub(ComponentId::IrLeft, 4, ImageStatus::Failed(-1013)),
            sub(ComponentId::Color, 8, ImageStatus::Ok),
        ],
    };
    let frame = Frame::new(&descriptor).unwrap();
    assert_eq!(frame.components().count(), 2);
    assert!(frame.left_ir_image().is_none());
}

#[test]
fn rapid_updates_against_a_draining_worker_stay_bounded() {
    let (_sink, hub) = test_hub();
    let dispatcher = Arc::new(FrameDispatcher::new(hub));

    let producer = {
        let dispatcher = Arc::clone(&dispatcher);
        thread::spawn(move || {
            for seq in 0..1000 {
                dispatcher.update(depth_frame(&[100, 200, 300, 400], 2, 2, seq));
            }
        })
    };
    producer.join().unwrap();

    let stats = dispatcher.queue_stats();
    assert_eq!(stats.pushed, 1000);
    assert!(stats.len <= 4, "queue overran its capacity: {}", stats.len);
    // Every frame was either processed or evicted, nothing duplicated.
    assert!(stats.popped + stats.dropped <= stats.pushed);

    wait_until(|| dispatcher.queue_stats().len == 0);
    let stats = dispatcher.queue_stats();
    assert_eq!(stats.popped + stats.dropped, stats.pushed);
}

#[test]
fn synthetic_source_feeds_the_dispatcher_end_to_end() {
    let (sink, hub) = test_hub();
    let dispatcher = FrameDispatcher::new(hub);
    let mut source = SyntheticSource::new(
        vec![
            StreamSpec {
                component: ComponentId::Depth,
                format: PixelFormat::Coord3dC16,
                width: 16,
                height: 8,
            },
            StreamSpec {
                component: ComponentId::Color,
                format: PixelFormat::Bgr8,
                width: 16,
                height: 8,
            },
        ],
        Some(5),
    );

    while let Some(frame) = source.next_frame().unwrap() {
        dispatcher.update(frame);
    }

    wait_until(|| sink.presents_for("depth") > 0 && sink.presents_for("color") > 0);
    assert_eq!(source.pool().available(), 2);
}

#[test]
fn key_event_stops_an_acquisition_loop() {
    let (sink, hub) = test_hub();
    let dispatcher = FrameDispatcher::new(hub);
    let keys = dispatcher.key_events();

    sink.script_key('q' as i32);
    let mut stopped = false;
    for seq in 0..200 {
        dispatcher.update(depth_frame(&[500, 600, 700, 800], 2, 2, seq));
        if let Ok(event) = keys.recv_timeout(Duration::from_millis(20)) {
            assert_eq!(event.code, 'q' as i32);
            stopped = true;
            break;
        }
    }
    assert!(stopped, "key event never surfaced");
}

#[test]
fn surfaced_error_policy_reports_component_and_sequence() {
    let (_sink, hub) = test_hub();
    let dispatcher =
        FrameDispatcher::with_options(hub, 4, Duration::from_millis(1), ErrorPolicy::Surface);
    let errors = dispatcher.processing_errors();

    let payload = vec![0u8; 16];
    let descriptor = CaptureDescriptor {
        data: &payload,
        images: vec![SubImage {
            component: ComponentId::Color,
            format: PixelFormat::Coord3dAbc32f,
            width: 2,
            height: 2,
            offset: 0,
            size: 16,
            status: ImageStatus::Ok,
            timestamp: 0,
            sequence: 77,
        }],
    };
    dispatcher.update(Arc::new(Frame::new(&descriptor).unwrap()));

    let err = errors.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(err.component, ComponentId::Color);
    assert_eq!(err.sequence, 77);
}
