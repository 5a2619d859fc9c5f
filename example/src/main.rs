//! Records a few frames on a render thread and two worker threads, feeds
//! simulated GPU timestamps back into the render recorder and prints the
//! aggregated call tree.

use std::{collections::VecDeque, error::Error, hint::black_box, sync::Arc, thread};

use perfscope::{
    Analyzer, Collector, ExecTree, GpuSampleHandle, PerfConfig, PointId, PointKind, SortVar,
};
use tracing::info;

const FRAMES: u64 = 12;

fn init_tracing() {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match tracing_subscriber::EnvFilter::try_new("error,perfscope=info") {
            Ok(filter) => filter,
            Err(_) => tracing_subscriber::EnvFilter::new("error"),
        },
    };

    let _ = tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .try_init();
}

fn spin(iterations: u64) -> u64 {
    (0..iterations).fold(0u64, |acc, n| black_box(acc.rotate_left(5) ^ n))
}

struct Points {
    frame: PointId,
    update: PointId,
    simulate: PointId,
    integrate: PointId,
    collide: PointId,
    bodies: PointId,
    render_pass: PointId,
    draw: PointId,
}

impl Points {
    fn register(collector: &Collector) -> Result<Self, perfscope::PerfError> {
        let scope = |func: &str, tag: &str, line: u32| {
            collector.register_point(PointKind::Scope, file!(), func, tag, line)
        };
        Ok(Self {
            frame: scope("demo::frame", "#", line!())?,
            update: scope("demo::update", "#", line!())?,
            simulate: scope("demo::simulate(usize)", "#", line!())?,
            integrate: scope("demo::integrate", "#", line!())?,
            collide: scope("demo::collide", "#", line!())?,
            bodies: collector.register_point(
                PointKind::Counter,
                file!(),
                "demo::simulate",
                "bodies#",
                line!(),
            )?,
            render_pass: scope("demo::render", "pass#", line!())?,
            draw: scope("demo::draw", "#", line!())?,
        })
    }
}

/// Stand-in for a GPU timestamp query pool.
#[derive(Default)]
struct FakeGpu {
    clock: u64,
    in_flight: VecDeque<(u64, Vec<(GpuSampleHandle, u64)>)>,
}

impl FakeGpu {
    fn stamp(
        &mut self,
        handle: Option<GpuSampleHandle>,
        work: u64,
        out: &mut Vec<(GpuSampleHandle, u64)>,
    ) {
        self.clock += work;
        if let Some(handle) = handle {
            out.push((handle, self.clock));
        }
    }
}

fn worker(collector: &Arc<Collector>, points: &Points, seed: usize) {
    let mut recorder = collector.recorder();
    for frame in 0..FRAMES as usize {
        recorder.enter(points.simulate);
        let bodies = 64 + (frame * 7 + seed * 13) % 32;
        recorder.set_counter(points.bodies, bodies as u64);
        recorder.child(points.integrate);
        spin(2_000 * bodies as u64);
        recorder.sibling(points.collide);
        for _ in 0..1 + frame % 3 {
            spin(5_000);
        }
        recorder.exit(points.collide);
        recorder.next_frame();
    }
    recorder.flush();
}

fn render(collector: &Arc<Collector>, points: &Points) {
    let latency = collector.config().gpu_latency_frames as u64;
    let mut recorder = collector.recorder();
    let mut gpu = FakeGpu::default();

    for frame in 0..FRAMES {
        recorder.enter(points.frame);
        recorder.child(points.update);
        spin(20_000);
        recorder.exit_single(points.update);

        let mut stamps = Vec::new();
        let pass = recorder.enter_gpu(points.render_pass);
        gpu.stamp(pass, 0, &mut stamps);
        for draw in 0..3 {
            let handle = recorder.enter_gpu(points.draw);
            gpu.stamp(handle, 50, &mut stamps);
            spin(1_000);
            let handle = recorder.exit_gpu(points.draw);
            gpu.stamp(handle, 200 + 100 * draw, &mut stamps);
        }
        let pass = recorder.exit_gpu(points.render_pass);
        gpu.stamp(pass, 30, &mut stamps);
        gpu.in_flight.push_back((recorder.frame_id(), stamps));

        recorder.exit(points.frame);
        recorder.next_frame();

        while gpu
            .in_flight
            .front()
            .is_some_and(|(id, _)| id + latency <= recorder.frame_id())
        {
            if let Some((frame_id, stamps)) = gpu.in_flight.pop_front() {
                recorder.resolve_gpu_scopes(frame_id, &stamps);
            }
        }
        info!("render frame {frame} recorded");
    }
    recorder.flush();
}

fn print_tree(analyzer: &Analyzer, tree: &ExecTree) {
    println!(
        "{:<40} {:>12} {:>12} {:>12} {:>10}",
        "name", "cpu avg", "cpu max", "gpu avg", "instances"
    );
    for &id in analyzer.visible() {
        let Some(row) = analyzer.row(id) else {
            continue;
        };
        let name = format!(
            "{}{}{}",
            "  ".repeat(tree.depth(id) as usize),
            analyzer.exec_name(tree, id),
            analyzer.instance_note(tree, id).unwrap_or_default()
        );
        println!(
            "{name:<40} {:>12} {:>12} {:>12} {:>10}",
            row.cpu.avg, row.cpu.max, row.gpu.avg, row.num_instances
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let config = PerfConfig::default()
        .with_num_swap_frames(2)
        .with_gpu_latency_frames(1);
    let collector = Collector::new(config)?;
    let points = Points::register(&collector)?;

    thread::scope(|scope| -> std::io::Result<()> {
        for seed in 0..2 {
            let collector = &collector;
            let points = &points;
            thread::Builder::new()
                .name(format!("worker-{seed}"))
                .spawn_scoped(scope, move || worker(collector, points, seed))?;
        }
        thread::Builder::new()
            .name("render".to_string())
            .spawn_scoped(scope, || render(&collector, &points))?;
        Ok(())
    })?;

    let added = collector.get_new_frames();
    collector.limit_memory_to_config();
    info!("collected {added} frames, {} bytes", collector.used_memory());

    let frames = collector.frames();
    let tree = collector.exec_tree();
    let mut analyzer = Analyzer::default();
    analyzer.set_sort(SortVar::CpuAvg, true);
    analyzer.set_last_frames(0.0, 8);
    analyzer.update(&tree, &frames);
    print_tree(&analyzer, &tree);

    if let Some(frame) = frames.last() {
        println!();
        print!("{}", analyzer.dump(&tree, frame));
    }

    println!("{}", analyzer.config(&tree).to_json()?);

    Ok(())
}
