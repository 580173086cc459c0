//! Per-pass scene state handed to `prepare_pass_hash`.
//!
//! [`PassScene`] stands in for the scene manager and compositor: camera,
//! render target, ambient state, the global light list, the shadow node and
//! every optional lighting subsystem. Subsystems that own their own GPU
//! layout (forward+, cubemap probes, VCT, irradiance fields, planar
//! reflections) plug in through [`PassDataProvider`].

use std::fmt;
use std::sync::Arc;

use redlilium_hlms_core::math::{Mat4, Quat, Vec2, Vec3, Vec4};
use redlilium_hlms_core::{BufferWriter, PropertyStore};

use crate::backend::GpuBuffer;
use crate::types::{SamplerId, TextureGpu};

/// Light mask texture index meaning "no mask".
pub const NO_LIGHT_MASK_TEXTURE: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Point,
    Spotlight,
    /// Area light approximated with a filtered texture lookup.
    AreaApprox,
    /// Area light evaluated with linearly transformed cosines.
    AreaLtc,
}

impl LightType {
    pub fn is_area(self) -> bool {
        matches!(self, Self::AreaApprox | Self::AreaLtc)
    }
}

/// A scene light, already in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub light_type: LightType,
    pub position: Vec3,
    pub direction: Vec3,
    pub orientation: Quat,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub power_scale: f32,
    pub attenuation_range: f32,
    pub attenuation_linear: f32,
    pub attenuation_quadratic: f32,
    /// Radians.
    pub spot_inner: f32,
    /// Radians.
    pub spot_outer: f32,
    pub spot_falloff: f32,
    pub rect_size: Vec2,
    pub double_sided: bool,
    pub light_mask: u32,
    /// Slice of the area light mask texture, [`NO_LIGHT_MASK_TEXTURE`] when unmasked.
    pub texture_light_mask_idx: u16,
    /// First diffuse mip of the mask, normalized to `u16::MAX`.
    pub diffuse_mip_start: u16,
    /// World transform of the restraining box, if any.
    pub obb_restraint: Option<Mat4>,
    pub obb_fade_factor: Vec3,
}

impl Light {
    fn with_type(light_type: LightType) -> Self {
        Self {
            light_type,
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, 0.0, -1.0),
            orientation: Quat::identity(),
            diffuse: Vec3::new(1.0, 1.0, 1.0),
            specular: Vec3::new(1.0, 1.0, 1.0),
            power_scale: std::f32::consts::PI,
            attenuation_range: 100_000.0,
            attenuation_linear: 0.0,
            attenuation_quadratic: 0.0,
            spot_inner: 30f32.to_radians(),
            spot_outer: 40f32.to_radians(),
            spot_falloff: 1.0,
            rect_size: Vec2::new(1.0, 1.0),
            double_sided: false,
            light_mask: u32::MAX,
            texture_light_mask_idx: NO_LIGHT_MASK_TEXTURE,
            diffuse_mip_start: 0,
            obb_restraint: None,
            obb_fade_factor: Vec3::zeros(),
        }
    }

    pub fn directional(direction: Vec3) -> Self {
        Self {
            direction: direction.normalize(),
            ..Self::with_type(LightType::Directional)
        }
    }

    pub fn point(position: Vec3) -> Self {
        Self {
            position,
            ..Self::with_type(LightType::Point)
        }
    }

    pub fn spotlight(position: Vec3, direction: Vec3) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            ..Self::with_type(LightType::Spotlight)
        }
    }

    /// Area light facing along the orientation's -Z axis.
    pub fn area(light_type: LightType, position: Vec3, orientation: Quat, rect_size: Vec2) -> Self {
        Self {
            position,
            orientation,
            direction: orientation * Vec3::new(0.0, 0.0, -1.0),
            rect_size,
            ..Self::with_type(light_type)
        }
    }

    pub fn with_colour(mut self, diffuse: Vec3, specular: Vec3) -> Self {
        self.diffuse = diffuse;
        self.specular = specular;
        self
    }

    pub fn with_power_scale(mut self, power_scale: f32) -> Self {
        self.power_scale = power_scale;
        self
    }

    pub fn with_attenuation(mut self, range: f32, linear: f32, quadratic: f32) -> Self {
        self.attenuation_range = range;
        self.attenuation_linear = linear;
        self.attenuation_quadratic = quadratic;
        self
    }

    pub fn with_spot_range(mut self, inner: f32, outer: f32, falloff: f32) -> Self {
        self.spot_inner = inner;
        self.spot_outer = outer;
        self.spot_falloff = falloff;
        self
    }

    pub fn with_light_mask(mut self, mask: u32) -> Self {
        self.light_mask = mask;
        self
    }

    pub fn with_texture_light_mask(mut self, idx: u16, diffuse_mip_start: u16) -> Self {
        self.texture_light_mask_idx = idx;
        self.diffuse_mip_start = diffuse_mip_start;
        self
    }

    pub fn with_obb_restraint(mut self, transform: Mat4, fade_factor: Vec3) -> Self {
        self.obb_restraint = Some(transform);
        self.obb_fade_factor = fade_factor;
        self
    }

    pub fn double_sided(mut self) -> Self {
        self.double_sided = true;
        self
    }

    /// Position with `w = 1`, or the negated direction with `w = 0` for
    /// directional lights.
    pub fn as_4d(&self) -> Vec4 {
        match self.light_type {
            LightType::Directional => {
                Vec4::new(-self.direction.x, -self.direction.y, -self.direction.z, 0.0)
            }
            _ => Vec4::new(self.position.x, self.position.y, self.position.z, 1.0),
        }
    }

    pub fn has_texture_mask(&self) -> bool {
        self.texture_light_mask_idx != NO_LIGHT_MASK_TEXTURE
    }
}

/// Per-eye data of an instanced-stereo camera.
#[derive(Debug, Clone, PartialEq)]
pub struct VrData {
    pub eye_views: [Mat4; 2],
    pub eye_projections: [Mat4; 2],
    /// Offset from the left eye to the right eye, in view space.
    pub left_to_right: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    /// Set for cameras rendering a planar reflection (`xyz` normal, `w` distance).
    pub reflection_plane: Option<Vec4>,
    pub vr: Option<VrData>,
    /// View and projection of the camera forward+ culled with.
    pub culling_view: Mat4,
    pub culling_projection: Mat4,
    /// Multiplies every datablock's shadow constant bias.
    pub constant_bias_scale: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            view: Mat4::identity(),
            projection: Mat4::identity(),
            position: Vec3::zeros(),
            reflection_plane: None,
            vr: None,
            culling_view: Mat4::identity(),
            culling_projection: Mat4::identity(),
            constant_bias_scale: 1.0,
        }
    }
}

impl Camera {
    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self {
            view,
            projection,
            position,
            culling_view: view,
            culling_projection: projection,
            ..Default::default()
        }
    }

    pub fn with_reflection_plane(mut self, plane: Vec4) -> Self {
        self.reflection_plane = Some(plane);
        self
    }

    pub fn with_vr(mut self, vr: VrData) -> Self {
        self.vr = Some(vr);
        self
    }

    pub fn is_reflected(&self) -> bool {
        self.reflection_plane.is_some()
    }

    /// View matrix of `eye`, or the plain view without VR data.
    pub fn vr_view(&self, eye: usize) -> Mat4 {
        self.vr.as_ref().map_or(self.view, |vr| vr.eye_views[eye.min(1)])
    }

    pub fn vr_projection(&self, eye: usize) -> Mat4 {
        self.vr.as_ref().map_or(self.projection, |vr| vr.eye_projections[eye.min(1)])
    }
}

/// Negate row 1 of a projection, for render targets stored upside down.
pub fn flip_projection_y(projection: &mut Mat4) {
    for col in 0..4 {
        projection[(1, col)] = -projection[(1, col)];
    }
}

/// The render target of the pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassTarget {
    pub width: u32,
    pub height: u32,
    pub msaa: u8,
    /// Number of colour attachments. Zero for depth-only passes.
    pub num_colour_entries: u8,
    pub requires_texture_flipping: bool,
    /// First colour attachment, used to detect cubemap probe captures.
    pub colour_texture: Option<TextureGpu>,
    /// Left edge of the second viewport (right eye).
    pub right_eye_viewport_left: f32,
}

impl Default for PassTarget {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            msaa: 1,
            num_colour_entries: 1,
            requires_texture_flipping: false,
            colour_texture: None,
            right_eye_viewport_left: 0.0,
        }
    }
}

impl PassTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn depth_only(mut self) -> Self {
        self.num_colour_entries = 0;
        self
    }

    pub fn with_msaa(mut self, samples: u8) -> Self {
        self.msaa = samples;
        self
    }

    pub fn has_colour(&self) -> bool {
        self.num_colour_entries > 0
    }
}

/// Ambient lighting of the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Ambient {
    /// `rgb` upper hemisphere, `a` environment map scale.
    pub upper_hemisphere: Vec4,
    pub lower_hemisphere: Vec3,
    pub hemisphere_dir: Vec3,
    /// 9 RGB coefficients.
    pub spherical_harmonics: [f32; 27],
}

impl Default for Ambient {
    fn default() -> Self {
        Self {
            upper_hemisphere: Vec4::new(0.0, 0.0, 0.0, 1.0),
            lower_hemisphere: Vec3::zeros(),
            hemisphere_dir: Vec3::new(0.0, 1.0, 0.0),
            spherical_harmonics: [0.0; 27],
        }
    }
}

impl Ambient {
    pub fn env_map_scale(&self) -> f32 {
        self.upper_hemisphere.w
    }
}

/// One shadow map of the shadow node.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMapDef {
    /// Index into [`PassScene::lights`]; `None` marks an inactive map.
    pub light: Option<usize>,
    /// Index into [`ShadowNode::contiguous_textures`].
    pub contiguous_texture: usize,
    pub uv_offset: Vec2,
    pub uv_length: Vec2,
    pub array_idx: u32,
    pub view: Mat4,
    pub view_projection: Mat4,
    pub near: f32,
    pub far: f32,
}

impl ShadowMapDef {
    pub fn new(light: usize, contiguous_texture: usize) -> Self {
        Self {
            light: Some(light),
            contiguous_texture,
            uv_offset: Vec2::zeros(),
            uv_length: Vec2::new(1.0, 1.0),
            array_idx: 0,
            view: Mat4::identity(),
            view_projection: Mat4::identity(),
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn with_uv(mut self, offset: Vec2, length: Vec2) -> Self {
        self.uv_offset = offset;
        self.uv_length = length;
        self
    }

    pub fn with_depth_range(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn is_active(&self) -> bool {
        self.light.is_some()
    }
}

/// Shadow setup of the pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowNode {
    pub contiguous_textures: Vec<TextureGpu>,
    pub shadow_maps: Vec<ShadowMapDef>,
    /// Closest shadow-casting lights, as indices into [`PassScene::lights`].
    pub casting_lights: Vec<Option<usize>>,
    /// Split distances including the near plane (`splits + 1` entries).
    pub pssm_splits: Vec<f32>,
    pub pssm_blends: Vec<f32>,
    pub pssm_fade: f32,
}

impl ShadowNode {
    pub fn num_active_casting_lights(&self) -> usize {
        self.casting_lights.iter().flatten().count()
    }

    /// Number of PSSM splits (0 without PSSM).
    pub fn num_pssm_splits(&self) -> usize {
        self.pssm_splits.len().saturating_sub(1)
    }

    pub fn is_affected(&self, light_idx: usize) -> bool {
        self.casting_lights.contains(&Some(light_idx))
    }
}

/// Screen-space pre-pass mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrePassMode {
    #[default]
    None,
    /// This pass writes the normals g-buffer.
    Create,
    /// This pass consumes the g-buffer written earlier.
    Use,
}

/// Textures produced and consumed by the pre-pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrePass {
    pub mode: PrePassMode,
    /// Normals and shadow-roughness.
    pub textures: Vec<TextureGpu>,
    pub msaa_depth: Option<TextureGpu>,
    pub ssr: Option<TextureGpu>,
}

/// GPU data of an optional lighting subsystem.
///
/// `fill_const_buffer` must write exactly `const_buffer_size` bytes.
pub trait PassDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Properties the subsystem contributes to the pass.
    fn set_pass_properties(&self, _properties: &mut PropertyStore) {}

    fn const_buffer_size(&self) -> usize;

    fn fill_const_buffer(&self, view: &Mat4, writer: &mut BufferWriter);
}

impl fmt::Debug for dyn PassDataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PassDataProvider({})", self.name())
    }
}

/// Forward+ light grid.
#[derive(Debug, Clone)]
pub struct ForwardPlus {
    pub data: Arc<dyn PassDataProvider>,
    pub grid: GpuBuffer,
    pub light_list: GpuBuffer,
}

/// Decal textures. The emissive texture is skipped when merged into diffuse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decals {
    pub diffuse: Option<TextureGpu>,
    pub normals: Option<TextureGpu>,
    pub emissive: Option<TextureGpu>,
    pub diffuse_merged_emissive: bool,
}

/// Parallax-corrected cubemap probes.
#[derive(Debug, Clone)]
pub struct CubemapProbes {
    pub data: Arc<dyn PassDataProvider>,
    pub texture: TextureGpu,
    pub automatic: bool,
    /// Probes are stored as dual paraboloid maps in a 2D array.
    pub use_dpm: bool,
    /// The probes themselves are being captured this pass.
    pub rendering: bool,
}

/// Voxel cone tracing.
#[derive(Debug, Clone)]
pub struct VoxelConeTracing {
    pub data: Arc<dyn PassDataProvider>,
    /// 1 voxel texture, or 4 when anisotropic.
    pub textures: Vec<TextureGpu>,
    pub anisotropic: bool,
    pub num_cones: u8,
    pub specular_sdf_quality: bool,
    pub needs_ambient_hemisphere: bool,
}

/// Irradiance field (IFD).
#[derive(Debug, Clone)]
pub struct IrradianceField {
    pub data: Arc<dyn PassDataProvider>,
    pub irradiance: TextureGpu,
    pub depth_variance: TextureGpu,
}

/// Irradiance volume written by the material system itself.
#[derive(Debug, Clone, PartialEq)]
pub struct IrradianceVolume {
    pub texture: TextureGpu,
    pub origin: Vec3,
    pub cell_size: Vec3,
    pub max_power: f32,
    pub power_scale: f32,
}

/// Planar reflection actors.
#[derive(Debug, Clone)]
pub struct PlanarReflections {
    pub data: Arc<dyn PassDataProvider>,
    /// One texture per active actor.
    pub textures: Vec<TextureGpu>,
}

impl PlanarReflections {
    pub fn max_active_actors(&self) -> usize {
        self.textures.len()
    }
}

/// Samplers bound alongside pass textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassSamplers {
    pub shadow_map: SamplerId,
    pub shadow_map_compare: SamplerId,
    pub shadow_map_esm: SamplerId,
    pub decals: SamplerId,
    pub area_light_masks: SamplerId,
    pub trilinear: SamplerId,
    pub planar_reflections: SamplerId,
}

/// UV baking pass parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvBaking {
    pub uv_set: u8,
    pub lighting_only: bool,
    /// Pixel offset, in pixels.
    pub offset: Vec2,
}

/// Everything `prepare_pass_hash` reads about the pass.
#[derive(Debug, Clone, Default)]
pub struct PassScene {
    pub camera: Camera,
    pub target: PassTarget,
    pub ambient: Ambient,
    /// Global light list: directional lights first.
    pub lights: Vec<Light>,
    pub shadow_node: Option<ShadowNode>,
    /// Shadow map rendered by a caster pass.
    pub caster_shadow_map: Option<usize>,
    pub instanced_stereo: bool,
    pub uv_baking: Option<UvBaking>,
    pub gen_normals_gbuffer: bool,
    pub prepass: PrePass,
    pub depth_texture: Option<TextureGpu>,
    pub depth_texture_no_msaa: Option<TextureGpu>,
    pub refractions: Option<TextureGpu>,
    pub forward_plus: Option<ForwardPlus>,
    pub decals: Option<Decals>,
    pub cubemap_probes: Option<CubemapProbes>,
    pub vct: Option<VoxelConeTracing>,
    pub irradiance_field: Option<IrradianceField>,
    pub irradiance_volume: Option<IrradianceVolume>,
    pub planar_reflections: Option<PlanarReflections>,
    pub area_light_masks: Option<TextureGpu>,
    pub ltc_matrix: Option<TextureGpu>,
    pub samplers: PassSamplers,
}

impl PassScene {
    pub fn new(camera: Camera, target: PassTarget) -> Self {
        Self {
            camera,
            target,
            ..Default::default()
        }
    }

    pub fn with_lights(mut self, lights: Vec<Light>) -> Self {
        self.lights = lights;
        self
    }

    pub fn with_shadow_node(mut self, node: ShadowNode) -> Self {
        self.shadow_node = Some(node);
        self
    }

    pub fn with_ambient(mut self, ambient: Ambient) -> Self {
        self.ambient = ambient;
        self
    }

    /// Light rendered by a caster pass, resolved through its shadow map.
    pub fn caster_light(&self) -> Option<&Light> {
        let node = self.shadow_node.as_ref()?;
        let map = node.shadow_maps.get(self.caster_shadow_map?)?;
        self.lights.get(map.light?)
    }

    /// Depth range of the shadow map a caster pass renders.
    pub fn caster_depth_range(&self) -> (f32, f32) {
        self.shadow_node
            .as_ref()
            .zip(self.caster_shadow_map)
            .and_then(|(node, idx)| node.shadow_maps.get(idx))
            .map_or((0.0, 1.0), |map| (map.near, map.far))
    }

    /// Cubemap probes that contribute this pass (not being captured).
    pub fn active_cubemap_probes(&self) -> Option<&CubemapProbes> {
        self.cubemap_probes.as_ref().filter(|pcc| !pcc.rendering)
    }

    /// Decal textures sampled this pass, as `[diffuse, normals, emissive]`.
    ///
    /// Decals need forward+. A pre-pass that creates the g-buffer only needs
    /// normals, one that consumes it never needs them. An emissive merged
    /// into diffuse is not bound on its own.
    pub fn active_decal_textures(&self) -> [Option<&TextureGpu>; 3] {
        let decals = match (&self.decals, &self.forward_plus) {
            (Some(decals), Some(_)) => decals,
            _ => return [None; 3],
        };
        let mode = self.prepass.mode;
        [
            decals.diffuse.as_ref().filter(|_| mode != PrePassMode::Create),
            decals.normals.as_ref().filter(|_| mode != PrePassMode::Use),
            decals
                .emissive
                .as_ref()
                .filter(|_| mode != PrePassMode::Create && !decals.diffuse_merged_emissive),
        ]
    }
}
