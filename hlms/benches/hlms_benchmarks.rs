use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use redlilium_hlms::pbs::PbsMaterial;
use redlilium_hlms::unlit::UnlitMaterial;
use redlilium_hlms::{
    Camera, CommandBuffer, Datablock, DummyRenderSystem, Hlms, HlmsConfig, Light, MaterialData,
    MaterialKind, MovableData, PassScene, PassTarget, QueuedRenderable, Renderable, VertexElement,
    VertexSemantic, WorkerContext,
};
use redlilium_hlms_core::math::{Mat4, Vec3};

fn mesh_layout() -> Vec<VertexElement> {
    vec![
        VertexElement::new(VertexSemantic::Position, 3),
        VertexElement::new(VertexSemantic::Normal, 3),
        VertexElement::tex_coord(0, 2),
    ]
}

fn scene() -> PassScene {
    let lights = (0..8)
        .map(|i| Light::point(Vec3::new(i as f32, 2.0, 0.0)))
        .chain(std::iter::once(Light::directional(Vec3::new(0.0, -1.0, 0.0))))
        .collect();
    PassScene::new(Camera::default(), PassTarget::new(1920, 1080)).with_lights(lights)
}

fn setup(kind: MaterialKind, material: MaterialData) -> (Hlms, Renderable) {
    let render_system = Arc::new(DummyRenderSystem::new());
    let mut hlms = Hlms::new(kind, HlmsConfig::default(), render_system).unwrap();
    let id = hlms.create_datablock(Datablock::new("bench", material)).unwrap();
    let mut renderable = Renderable::new(id, mesh_layout());
    let mut ctx = WorkerContext::new();
    renderable.set_hashes(hlms.calculate_hash_for(&mut ctx, &renderable).unwrap());
    (hlms, renderable)
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

fn bench_calculate_hash(c: &mut Criterion) {
    let (mut hlms, renderable) =
        setup(MaterialKind::Pbs, MaterialData::Pbs(PbsMaterial::default()));
    let mut ctx = WorkerContext::new();
    c.bench_function("pbs_calculate_hash_for", |b| {
        b.iter(|| black_box(hlms.calculate_hash_for(&mut ctx, black_box(&renderable)).unwrap()));
    });
}

fn bench_prepare_pass(c: &mut Criterion) {
    let (mut hlms, _) = setup(MaterialKind::Pbs, MaterialData::Pbs(PbsMaterial::default()));
    let scene = scene();
    c.bench_function("pbs_prepare_pass_hash_9_lights", |b| {
        b.iter(|| {
            let pass = hlms.prepare_pass_hash(black_box(&scene), false, false).unwrap();
            hlms.frame_ended();
            black_box(pass.hash)
        });
    });
}

// ---------------------------------------------------------------------------
// Object packing
// ---------------------------------------------------------------------------

fn bench_fill_buffers(c: &mut Criterion, name: &str, kind: MaterialKind, material: MaterialData) {
    let (mut hlms, renderable) = setup(kind, material);
    let scene = scene();
    let movable = MovableData::new(Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)));
    c.bench_function(name, |b| {
        b.iter(|| {
            let pass = hlms.prepare_pass_hash(&scene, false, false).unwrap();
            let entry = hlms.get_material(&pass, &renderable, false).unwrap();
            let mut commands = CommandBuffer::new();
            let mut last_hash = 0;
            for _ in 0..1024 {
                let queued = QueuedRenderable::new(&renderable, &movable);
                let instance = hlms
                    .fill_buffers_for(&entry, &queued, false, last_hash, &mut commands)
                    .unwrap();
                black_box(instance);
                last_hash = entry.hash;
            }
            hlms.pre_command_buffer_execution(&mut commands);
            hlms.frame_ended();
        });
    });
}

fn bench_fill_pbs(c: &mut Criterion) {
    bench_fill_buffers(
        c,
        "pbs_fill_buffers_1024",
        MaterialKind::Pbs,
        MaterialData::Pbs(PbsMaterial::default()),
    );
}

fn bench_fill_unlit(c: &mut Criterion) {
    bench_fill_buffers(
        c,
        "unlit_fill_buffers_1024",
        MaterialKind::Unlit,
        MaterialData::Unlit(UnlitMaterial::default()),
    );
}

criterion_group!(
    benches,
    bench_calculate_hash,
    bench_prepare_pass,
    bench_fill_pbs,
    bench_fill_unlit,
);
criterion_main!(benches);
