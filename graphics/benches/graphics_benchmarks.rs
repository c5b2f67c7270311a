use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use lumen_core::jobs::JobSystem;
use lumen_core::math::Vec3;
use lumen_graphics::compiler::CompiledFrame;
use lumen_graphics::graph::FrameGraph;
use lumen_graphics::render_path::{AoMode, RenderPath3D, RenderStrategy};
use lumen_graphics::scene::{Aabb, ObjectFlags, Scene, SceneLight, SceneObject};
use lumen_graphics::scheduler::QueueType;
use lumen_graphics::{DeviceCapabilities, GraphicsDevice, TextureDescriptor, TextureFormat, TextureUsage};

// ---------------------------------------------------------------------------
// Frame graph construction
// ---------------------------------------------------------------------------

fn build_frame_graph(graph: &mut FrameGraph<&'static str>) {
    graph.add_job("prepare", QueueType::Graphics, &[], &["constants"]);
    graph.add_job("prepare_async", QueueType::Compute, &["constants"], &["tlas"]);
    graph.add_job("depth", QueueType::Graphics, &["constants"], &["depth", "primitive_id"]);
    graph.add_job("effects", QueueType::Compute, &["depth", "primitive_id", "tlas"], &["ao", "ssr", "tiles"]);
    graph.add_job("shadows", QueueType::Graphics, &["constants"], &["atlas"]);
    graph.add_job("opaque", QueueType::Graphics, &["ao", "ssr", "tiles", "atlas"], &["color"]);
    graph.add_job("transparent", QueueType::Graphics, &["depth", "tiles"], &["color", "distortion"]);
    graph.add_job("post", QueueType::Graphics, &["color", "distortion"], &["primitive_id"]);
}

fn bench_graph_build(c: &mut Criterion) {
    c.bench_function("frame_graph_build_8_jobs", |b| {
        let mut graph = FrameGraph::new();
        b.iter(|| {
            graph.clear();
            build_frame_graph(&mut graph);
            black_box(graph.job_count());
        });
    });
}

fn bench_graph_build_chain(c: &mut Criterion) {
    c.bench_function("frame_graph_build_64_jobs_mixed", |b| {
        let mut graph = FrameGraph::<u32>::new();
        b.iter(|| {
            graph.clear();
            for i in 0..64u32 {
                let queue = if i % 3 == 0 { QueueType::Compute } else { QueueType::Graphics };
                graph.add_job(format!("job_{i}"), queue, &[i % 16, (i + 5) % 16], &[(i + 1) % 16]);
            }
            black_box(graph.edges().len());
        });
    });
}

// ---------------------------------------------------------------------------
// Frame graph compilation
// ---------------------------------------------------------------------------

fn bench_graph_compile(c: &mut Criterion) {
    let mut graph = FrameGraph::new();
    build_frame_graph(&mut graph);
    let mut compiled = CompiledFrame::default();

    c.bench_function("frame_graph_compile_8_jobs", |b| {
        b.iter(|| {
            graph.compile_into(&mut compiled).unwrap();
            black_box(compiled.waits().len());
        });
    });
}

fn bench_graph_compile_large(c: &mut Criterion) {
    let mut graph = FrameGraph::<u32>::new();
    for i in 0..256u32 {
        let queue = match i % 4 {
            0 => QueueType::Compute,
            1 => QueueType::Copy,
            _ => QueueType::Graphics,
        };
        graph.add_job(format!("job_{i}"), queue, &[i % 32, (i * 7) % 32], &[(i + 3) % 32]);
    }
    let mut compiled = CompiledFrame::default();

    c.bench_function("frame_graph_compile_256_jobs", |b| {
        b.iter(|| {
            graph.compile_into(&mut compiled).unwrap();
            black_box(compiled.job_count());
        });
    });
}

// ---------------------------------------------------------------------------
// Resource lifecycle
// ---------------------------------------------------------------------------

fn bench_create_texture(c: &mut Criterion) {
    let device = GraphicsDevice::new("Bench Adapter", DeviceCapabilities::default());
    c.bench_function("device_create_texture_1080p", |b| {
        b.iter(|| {
            let texture = device
                .create_texture(&TextureDescriptor::new_2d(
                    1920,
                    1080,
                    TextureFormat::Rgba16Float,
                    TextureUsage::SAMPLED_ATTACHMENT,
                ))
                .unwrap();
            black_box(texture);
        });
    });
}

fn configured_path(strategy: RenderStrategy) -> RenderPath3D {
    let device = GraphicsDevice::new("Bench Adapter", DeviceCapabilities::full());
    let mut path = RenderPath3D::new(device, strategy);
    path.set_resolution(1920, 1080);
    path.set_ao(AoMode::Hbao).unwrap();
    path.set_ssr_enabled(true).unwrap();
    path.set_ssgi_enabled(true).unwrap();
    path.set_eye_adaption_enabled(true).unwrap();
    path.set_light_shafts_enabled(true).unwrap();
    path
}

fn bench_resize_buffers(c: &mut Criterion) {
    c.bench_function("resize_buffers_1080p_deferred", |b| {
        b.iter_batched(
            || configured_path(RenderStrategy::Deferred),
            |mut path| {
                path.resize_buffers().unwrap();
                black_box(path.memory_size_in_bytes())
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_resize_buffers_noop(c: &mut Criterion) {
    let mut path = configured_path(RenderStrategy::TiledForward);
    path.start().unwrap();
    c.bench_function("resize_buffers_unchanged", |b| {
        b.iter(|| path.resize_buffers().unwrap());
    });
}

// ---------------------------------------------------------------------------
// Full frame
// ---------------------------------------------------------------------------

fn bench_scene() -> Scene {
    let mut scene = Scene::new();
    for i in 0..256 {
        let x = (i % 16) as f32 - 8.0;
        let z = (i / 16) as f32 - 8.0;
        let center = Vec3::new(x, 0.5, z);
        scene.objects.push(SceneObject::new(
            format!("object_{i}"),
            Aabb::new(center - Vec3::repeat(0.4), center + Vec3::repeat(0.4)),
        ));
    }
    scene.objects.push(
        SceneObject::new(
            "water",
            Aabb::new(Vec3::new(-50.0, -0.1, -50.0), Vec3::new(50.0, 0.0, 50.0)),
        )
        .with_flags(ObjectFlags::PLANAR_REFLECTOR),
    );
    for i in 0..32 {
        scene
            .lights
            .push(SceneLight::point(Vec3::new(i as f32 - 16.0, 2.0, 0.0), 5.0));
    }
    scene
}

fn bench_full_frame(c: &mut Criterion) {
    let jobs = JobSystem::new(4);
    let mut scene = bench_scene();
    let mut path = configured_path(RenderStrategy::TiledForward);
    path.start().unwrap();

    c.bench_function("render_path_frame_1080p", |b| {
        b.iter(|| {
            path.update(&mut scene, 1.0 / 60.0, &jobs);
            let report = path.render(&scene, &jobs).unwrap();
            black_box(report.map(|r| r.command_count()))
        });
    });
}

criterion_group!(
    benches,
    bench_graph_build,
    bench_graph_build_chain,
    bench_graph_compile,
    bench_graph_compile_large,
    bench_create_texture,
    bench_resize_buffers,
    bench_resize_buffers_noop,
    bench_full_frame,
);

criterion_main!(benches);
