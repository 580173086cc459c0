//! Listener hooks seen from a full frame.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use redlilium_hlms::listener::{ObjectDataContext, PER_OBJECT_DATA_SLOT, USE_ARBITRARY_COLOUR};
use redlilium_hlms::pbs::PbsMaterial;
use redlilium_hlms::{
    Command, CommandBuffer, Datablock, HlmsConfig, HlmsListener, MaterialData, MaterialKind,
    PassScene, PerObjectColourListener, QueuedRenderable, Renderable, RenderSystem, Result,
    StructuralErrorKind,
};
use redlilium_hlms_core::math::Vec4;
use redlilium_hlms_core::{BufferWriter, DescBindingKind, PropertyStore};

use common::{lit_scene, mesh_layout, movable_at, Frame};

const MARKER: [f32; 4] = [1234.5, -77.0, 0.25, 8.0];

/// What the hooks saw, shared with the test body.
#[derive(Debug, Default)]
struct Seen {
    type_changes: Vec<u16>,
    filled: Vec<ObjectDataContext>,
    frames_ended: u32,
}

struct RecordingListener {
    seen: Arc<Mutex<Seen>>,
    extra_textures: u16,
    /// Bytes declared, and bytes actually written.
    pass_bytes: (usize, usize),
}

impl RecordingListener {
    fn new(seen: Arc<Mutex<Seen>>) -> Self {
        Self {
            seen,
            extra_textures: 0,
            pass_bytes: (16, 16),
        }
    }
}

impl HlmsListener for RecordingListener {
    fn get_pass_buffer_size(
        &self,
        _scene: &PassScene,
        _caster: bool,
        _dual_paraboloid: bool,
    ) -> usize {
        self.pass_bytes.0
    }

    fn prepare_pass_buffer(
        &self,
        _scene: &PassScene,
        _caster: bool,
        _dual_paraboloid: bool,
        writer: &mut BufferWriter,
    ) {
        for value in MARKER.iter().cycle().take(self.pass_bytes.1 / 4) {
            writer.write_f32(*value);
        }
    }

    fn get_num_extra_pass_textures(&self, _properties: &PropertyStore, _caster: bool) -> u16 {
        self.extra_textures
    }

    fn hlms_type_changed(
        &mut self,
        _caster: bool,
        _commands: &mut CommandBuffer,
        _datablock: &Datablock,
        tex_unit: u16,
    ) {
        self.seen.lock().type_changes.push(tex_unit);
    }

    fn object_data_filled(
        &mut self,
        _render_system: &dyn RenderSystem,
        object: ObjectDataContext,
        _queued: &QueuedRenderable<'_>,
        _commands: &mut CommandBuffer,
    ) -> Result<()> {
        self.seen.lock().filled.push(object);
        Ok(())
    }

    fn frame_ended(&mut self) {
        self.seen.lock().frames_ended += 1;
    }
}

fn frame_with(listener: Box<dyn HlmsListener>) -> (Frame, Renderable) {
    let mut frame = Frame::with_config(MaterialKind::Pbs, HlmsConfig::default(), Some(listener));
    let id = frame.datablock(Datablock::new("rock", MaterialData::Pbs(PbsMaterial::default())));
    let mut renderable = Renderable::new(id, mesh_layout());
    frame.hash(&mut renderable);
    (frame, renderable)
}

#[test]
fn test_hooks_follow_the_frame() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let (mut frame, renderable) = frame_with(Box::new(RecordingListener::new(seen.clone())));
    let movable = movable_at(0.0, 0.0, 0.0);

    frame.render(&lit_scene(), false, &[(&renderable, &movable), (&renderable, &movable)]).unwrap();
    frame.end_frame();

    let seen = seen.lock();
    assert_eq!(seen.type_changes.len(), 1);
    assert_eq!(seen.filled.iter().map(|o| o.instance_idx).collect::<Vec<_>>(), vec![0, 1]);
    assert!(seen.filled.iter().all(|o| !o.caster && o.const_buffer_idx == 0));
    assert_eq!(seen.frames_ended, 1);
}

#[test]
fn test_pass_buffer_carries_listener_bytes() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let (mut frame, renderable) = frame_with(Box::new(RecordingListener::new(seen)));
    let movable = movable_at(0.0, 0.0, 0.0);
    frame.render(&lit_scene(), false, &[(&renderable, &movable)]).unwrap();

    let pass = frame.hlms.pass_buffer().unwrap();
    let floats: Vec<f32> = (0..pass.size() / 4).map(|i| pass.read_f32(i)).collect();
    assert!(floats.windows(4).any(|w| w == MARKER));
}

#[test]
fn test_pass_buffer_size_mismatch() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let mut listener = RecordingListener::new(seen);
    listener.pass_bytes = (32, 16);
    let (mut frame, _) = frame_with(Box::new(listener));

    let err = frame.hlms.prepare_pass_hash(&lit_scene(), false, false).unwrap_err();
    assert_eq!(err.kind, StructuralErrorKind::SizeMismatch);
}

#[test]
fn test_extra_pass_textures_shift_material_units() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let (mut plain, renderable) = frame_with(Box::new(RecordingListener::new(seen.clone())));
    let movable = movable_at(0.0, 0.0, 0.0);
    plain.render(&lit_scene(), false, &[(&renderable, &movable)]).unwrap();
    let base_start = plain.hlms.tex_unit_slot_start().unwrap();

    let mut listener = RecordingListener::new(seen.clone());
    listener.extra_textures = 2;
    let (mut frame, renderable) = frame_with(Box::new(listener));
    frame.render(&lit_scene(), false, &[(&renderable, &movable)]).unwrap();

    assert_eq!(frame.hlms.tex_unit_slot_start().unwrap(), base_start + 2);
    // Both frames reported where the listener's units start.
    let seen = seen.lock();
    assert_eq!(seen.type_changes.len(), 2);
    assert_eq!(seen.type_changes[0], seen.type_changes[1]);
}

#[test]
fn test_per_object_colour() {
    let (mut frame, renderable) = frame_with(Box::new(PerObjectColourListener::default()));
    let tinted = {
        let mut tinted = renderable.clone().with_custom_colour(Vec4::new(1.0, 0.0, 0.5, 1.0));
        frame.hash(&mut tinted);
        tinted
    };
    assert_ne!(tinted.hlms_hash, renderable.hlms_hash);

    let movable = movable_at(0.0, 0.0, 0.0);
    let out = frame
        .render(&lit_scene(), false, &[(&renderable, &movable), (&tinted, &movable)])
        .unwrap();

    let tinted_entry = &out[1].0;
    assert!(tinted_entry.properties.is_set(USE_ARBITRARY_COLOUR));
    let range = tinted_entry.root_layout.range(0, DescBindingKind::ConstBuffer);
    assert!(range.end > PER_OBJECT_DATA_SLOT);

    let colour_binds = frame
        .commands
        .iter()
        .filter(|cmd| {
            matches!(cmd, Command::ShaderBuffer { slot, .. } if *slot == PER_OBJECT_DATA_SLOT)
        })
        .count();
    assert!(colour_binds >= 1);
}
