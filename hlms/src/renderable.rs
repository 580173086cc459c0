//! What a draw looks like to the HLMS: vertex layout, animation state and
//! the datablock it is rendered with.

use redlilium_hlms_core::math::{Mat4, Vec4};

use crate::backend::GpuBuffer;
use crate::datablock::DatablockId;
use crate::terra::TerrainCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    Tangent,
    Binormal,
    Diffuse,
    TexCoord,
    BlendWeights,
    BlendIndices,
}

/// One attribute of the vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub semantic: VertexSemantic,
    /// Number of components (e.g. 2 for a `vec2` UV set).
    pub components: u8,
    /// Index among elements of the same semantic (UV set number).
    pub index: u8,
}

impl VertexElement {
    pub fn new(semantic: VertexSemantic, components: u8) -> Self {
        Self {
            semantic,
            components,
            index: 0,
        }
    }

    pub fn tex_coord(index: u8, components: u8) -> Self {
        Self {
            semantic: VertexSemantic::TexCoord,
            components,
            index,
        }
    }
}

/// Pose (morph target) animation bound to a renderable.
#[derive(Debug, Clone)]
pub struct PoseAnimation {
    pub weights: Vec<f32>,
    pub half_precision: bool,
    pub normals: bool,
    /// Tex buffer holding the pose offsets.
    pub buffer: GpuBuffer,
    pub base_vertex: u32,
    pub num_vertices: u32,
}

impl PoseAnimation {
    pub fn num_poses(&self) -> usize {
        self.weights.len()
    }

    /// Weights rounded up to whole vec4s.
    pub fn weights_num_floats(&self) -> usize {
        self.weights.len().div_ceil(4) * 4
    }
}

/// A drawable piece of geometry.
#[derive(Debug, Clone)]
pub struct Renderable {
    pub datablock: DatablockId,
    pub vertex_elements: Vec<VertexElement>,
    pub input_layout_id: u16,
    /// Layout used in shadow caster passes, when it differs.
    pub shadow_input_layout_id: Option<u16>,
    /// World-space bone matrices. Non-empty means skeletal animation.
    pub bone_matrices: Vec<Mat4>,
    pub pose: Option<PoseAnimation>,
    pub use_identity_world: bool,
    pub use_identity_projection: bool,
    /// Bit 7 flags a planar reflection actor, bits 0..6 its index.
    pub custom_parameter: u8,
    pub terrain: Option<TerrainCell>,
    /// Per-object colour consumed by
    /// [`PerObjectColourListener`](crate::listener::PerObjectColourListener).
    pub custom_colour: Option<Vec4>,
    pub hlms_hash: u32,
    pub hlms_caster_hash: u32,
}

impl Renderable {
    pub fn new(datablock: DatablockId, vertex_elements: Vec<VertexElement>) -> Self {
        Self {
            datablock,
            vertex_elements,
            input_layout_id: 0,
            shadow_input_layout_id: None,
            bone_matrices: Vec::new(),
            pose: None,
            use_identity_world: false,
            use_identity_projection: false,
            custom_parameter: 0,
            terrain: None,
            custom_colour: None,
            hlms_hash: 0,
            hlms_caster_hash: 0,
        }
    }

    pub fn with_bones(mut self, bone_matrices: Vec<Mat4>) -> Self {
        self.bone_matrices = bone_matrices;
        self
    }

    pub fn with_pose(mut self, pose: PoseAnimation) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn with_terrain(mut self, cell: TerrainCell) -> Self {
        self.terrain = Some(cell);
        self
    }

    pub fn with_custom_colour(mut self, colour: Vec4) -> Self {
        self.custom_colour = Some(colour);
        self
    }

    /// Flag this renderable as drawn by planar reflection actor `actor`.
    pub fn with_planar_reflection_actor(mut self, actor: u8) -> Self {
        self.custom_parameter = 0x80 | (actor & 0x7F);
        self
    }

    pub fn with_input_layout(mut self, id: u16, shadow_id: Option<u16>) -> Self {
        self.input_layout_id = id;
        self.shadow_input_layout_id = shadow_id;
        self
    }

    pub fn has_skeleton_animation(&self) -> bool {
        !self.bone_matrices.is_empty()
    }

    pub fn num_poses(&self) -> usize {
        self.pose.as_ref().map_or(0, PoseAnimation::num_poses)
    }

    /// Store the hashes returned by `calculate_hash_for`.
    pub fn set_hashes(&mut self, (hash, caster_hash): (u32, u32)) {
        self.hlms_hash = hash;
        self.hlms_caster_hash = caster_hash;
    }
}

/// Scene-node data of the object that owns the renderable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovableData {
    pub world: Mat4,
    pub light_mask: u32,
}

impl Default for MovableData {
    fn default() -> Self {
        Self {
            world: Mat4::identity(),
            light_mask: u32::MAX,
        }
    }
}

impl MovableData {
    pub fn new(world: Mat4) -> Self {
        Self {
            world,
            ..Default::default()
        }
    }
}

/// A renderable queued for drawing this pass.
#[derive(Debug, Clone, Copy)]
pub struct QueuedRenderable<'a> {
    pub renderable: &'a Renderable,
    pub movable: &'a MovableData,
}

impl<'a> QueuedRenderable<'a> {
    pub fn new(renderable: &'a Renderable, movable: &'a MovableData) -> Self {
        Self {
            renderable,
            movable,
        }
    }
}
