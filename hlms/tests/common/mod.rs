//! Shared setup for the HLMS integration tests.
//!
//! [`Frame`] drives one material kind through a frame the way a render
//! queue does: hash every renderable, prepare the pass, then look up each
//! permutation and pack its draw.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_hlms::{
    Camera, CommandBuffer, Datablock, DatablockId, DummyRenderSystem, Hlms, HlmsConfig,
    HlmsListener, Light, MaterialKind, MovableData, PassScene, PassTarget, QueuedRenderable,
    Renderable, RenderSystem, Result, ShaderCacheEntry, VertexElement, VertexSemantic,
    WorkerContext,
};
use redlilium_hlms_core::math::{look_at_rh, perspective_rh, Mat4, Vec3};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Position, normal and one UV set.
pub fn mesh_layout() -> Vec<VertexElement> {
    vec![
        VertexElement::new(VertexSemantic::Position, 3),
        VertexElement::new(VertexSemantic::Normal, 3),
        VertexElement::tex_coord(0, 2),
    ]
}

pub fn camera() -> Camera {
    let eye = Vec3::new(0.0, 5.0, 10.0);
    let view = look_at_rh(&eye, &Vec3::zeros(), &Vec3::y());
    let projection = perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 1000.0);
    Camera::new(view, projection, eye)
}

/// A lit scene with one light of each punctual type.
pub fn lit_scene() -> PassScene {
    PassScene::new(camera(), PassTarget::new(1280, 720)).with_lights(vec![
        Light::directional(Vec3::new(0.0, -1.0, -0.5)),
        Light::point(Vec3::new(2.0, 1.0, 0.0)).with_attenuation(20.0, 0.5, 0.1),
        Light::spotlight(Vec3::new(-2.0, 3.0, 0.0), Vec3::new(0.0, -1.0, 0.0)),
    ])
}

pub fn movable_at(x: f32, y: f32, z: f32) -> MovableData {
    MovableData::new(Mat4::new_translation(&Vec3::new(x, y, z)))
}

pub struct Frame {
    pub hlms: Hlms,
    pub render_system: Arc<DummyRenderSystem>,
    pub commands: CommandBuffer,
    /// Hash of the last drawn permutation, `0` before the first draw.
    pub last_hash: u32,
}

impl Frame {
    pub fn new(kind: MaterialKind) -> Self {
        Self::with_config(kind, HlmsConfig::default(), None)
    }

    pub fn with_config(
        kind: MaterialKind,
        config: HlmsConfig,
        listener: Option<Box<dyn HlmsListener>>,
    ) -> Self {
        init_logging();
        let render_system = Arc::new(DummyRenderSystem::new());
        let rs: Arc<dyn RenderSystem> = render_system.clone();
        let mut hlms = Hlms::new(kind, config, rs).unwrap();
        if let Some(listener) = listener {
            hlms = hlms.with_listener(listener);
        }
        Self {
            hlms,
            render_system,
            commands: CommandBuffer::new(),
            last_hash: 0,
        }
    }

    pub fn datablock(&mut self, datablock: Datablock) -> DatablockId {
        self.hlms.create_datablock(datablock).unwrap()
    }

    /// Bake pending datablocks, then hash `renderable`.
    pub fn hash(&mut self, renderable: &mut Renderable) {
        self.hlms.upload_dirty_datablocks().unwrap();
        let mut ctx = WorkerContext::new();
        let hashes = self.hlms.calculate_hash_for(&mut ctx, renderable).unwrap();
        assert_ne!(hashes.0, 0, "descriptor sets were not baked");
        renderable.set_hashes(hashes);
    }

    /// Prepare a pass and draw every renderable in order. Returns the
    /// permutations and instance indices of the draws.
    pub fn render(
        &mut self,
        scene: &PassScene,
        caster: bool,
        draws: &[(&Renderable, &MovableData)],
    ) -> Result<Vec<(Arc<ShaderCacheEntry>, u32)>> {
        let pass = self.hlms.prepare_pass_hash(scene, caster, false)?;
        let mut out = Vec::with_capacity(draws.len());
        for (renderable, movable) in draws {
            let entry = self.hlms.get_material(&pass, renderable, caster)?;
            let queued = QueuedRenderable::new(renderable, movable);
            let instance = self
                .hlms
                .fill_buffers_for(&entry, &queued, caster, self.last_hash, &mut self.commands)?;
            self.last_hash = entry.hash;
            out.push((entry, instance));
        }
        self.hlms.pre_command_buffer_execution(&mut self.commands);
        Ok(out)
    }

    pub fn end_frame(&mut self) {
        self.hlms.post_command_buffer_execution(&mut self.commands);
        self.hlms.frame_ended();
        self.commands = CommandBuffer::new();
        self.last_hash = 0;
    }
}
