//! Unlit pass buffer.
//!
//! | member | when |
//! |--------|------|
//! | `mat4 viewProj[2]` (4 with instanced stereo) | always |
//! | `vec4 clipPlane0` | reflected camera |
//! | `mat4 invViewProj` | reflected camera, or ESM / point light casters, without stereo |
//! | `vec4 viewZRow` | ESM casters |
//! | `vec4 depthRange` | casters |
//! | `vec4 cameraPosWS` | point light casters |
//! | `vec4 invWindowSize` | always |
//! | listener bytes | always |

use redlilium_hlms_core::math::{Mat4, Vec4};
use redlilium_hlms_core::{BufferWriter, PropertyStore, Result, StructuralError};

use super::properties::*;
use crate::backend::{Capabilities, UnmapOptions};
use crate::config::ShadowFilter;
use crate::hlms::{Hlms, PreparedPass};
use crate::pass::LightCounts;
use crate::properties::base;
use crate::scene::{flip_projection_y, LightType, PassScene};

/// Members present in an Unlit pass buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UnlitPassLayout {
    stereo: bool,
    reflected: bool,
    caster: bool,
    esm: bool,
    point_caster: bool,
}

impl UnlitPassLayout {
    fn inverse_view_proj(&self) -> bool {
        (self.reflected || (self.caster && (self.esm || self.point_caster))) && !self.stereo
    }

    fn bytes(&self) -> usize {
        let mut bytes = (16 + 16 + 4) * 4;
        if self.stereo {
            bytes += (16 + 16) * 4;
        }
        if self.inverse_view_proj() {
            bytes += 16 * 4;
        }
        if self.caster {
            if self.esm {
                bytes += 4 * 4;
            }
            bytes += 4 * 4;
            if self.point_caster {
                bytes += 4 * 4;
            }
        }
        if self.reflected {
            bytes += 4 * 4;
        }
        bytes
    }
}

/// The view-projections a draw picks from: `[0]` camera, `[1]` identity
/// projection. With instanced stereo `[0]` and `[2]` are the eyes, `[1]` and
/// `[3]` identity, and draws read `[4]` because the eyes live in the pass.
fn view_proj_matrices(scene: &PassScene, stereo: bool) -> [Mat4; 5] {
    let flip = scene.target.requires_texture_flipping;
    let mut identity_proj = Mat4::identity();
    if flip {
        flip_projection_y(&mut identity_proj);
    }

    let camera = &scene.camera;
    let mut matrices = [Mat4::identity(); 5];
    if !stereo {
        let mut projection = camera.projection;
        if flip {
            flip_projection_y(&mut projection);
        }
        matrices[0] = projection * camera.view;
        matrices[1] = identity_proj;
    } else {
        matrices[1] = identity_proj;
        matrices[3] = identity_proj;
        for eye in 0..2 {
            let mut projection = camera.vr_projection(eye);
            if flip {
                flip_projection_y(&mut projection);
            }
            matrices[eye * 2] = projection * camera.vr_view(eye);
        }
    }
    matrices
}

fn set_unlit_pass_properties(
    props: &mut PropertyStore,
    scene: &PassScene,
    caster: bool,
    dual_paraboloid: bool,
    esm_k: Option<u16>,
    capabilities: Capabilities,
) {
    if caster {
        props.set(base::SHADOW_CASTER, 1);
        if let Some(k) = esm_k {
            props.set(EXPONENTIAL_SHADOW_MAPS, i32::from(k));
        }
        match scene.caster_light().map(|light| light.light_type) {
            Some(LightType::Directional) => props.set(base::SHADOW_CASTER_DIRECTIONAL, 1),
            Some(LightType::Point) => props.set(base::SHADOW_CASTER_POINT, 1),
            _ => {}
        }
        props.set_bool(base::DUAL_PARABOLOID_MAPPING, dual_paraboloid);
    }
    if scene.instanced_stereo {
        props.set(base::INSTANCED_STEREO, 1);
    }

    let depth_only = !scene.target.has_colour();
    props.set_bool(base::SHADOW_USES_DEPTH_TEXTURE, depth_only);
    props.set_bool(base::RENDER_DEPTH_ONLY, depth_only);

    if scene.camera.is_reflected() {
        let clip_distances = props.get(base::PSO_CLIP_DISTANCES).max(1);
        props.set(base::PSO_CLIP_DISTANCES, clip_distances);
        props.set(base::GLOBAL_CLIP_PLANES, 1);
        if !capabilities.contains(Capabilities::USER_CLIP_PLANES) {
            props.set(base::EMULATE_CLIP_DISTANCES, 1);
        }
    }
    props.set_bool(HW_GAMMA_READ, capabilities.contains(Capabilities::HW_GAMMA));
}

impl Hlms {
    pub(crate) fn prepare_unlit_pass(
        &mut self,
        scene: &PassScene,
        caster: bool,
        dual_paraboloid: bool,
    ) -> Result<PreparedPass> {
        let render_system = self.render_system.clone();
        let esm = self.config.shadow_filter == ShadowFilter::ExponentialShadowMaps;

        let mut props = PropertyStore::new();
        set_unlit_pass_properties(
            &mut props,
            scene,
            caster,
            dual_paraboloid,
            esm.then_some(self.config.esm_k),
            render_system.capabilities(),
        );
        if self.config.lower_gpu_overhead {
            props.set(LOWER_GPU_OVERHEAD, 1);
        }
        let extra_textures = self.listener.get_num_extra_pass_textures(&props, caster);
        let sampler_state_start = self.reserved_tex_slots + extra_textures;
        props.set(base::SAMPLER_STATE_START, i32::from(sampler_state_start));

        self.listener.prepare_pass_hash(scene, caster, dual_paraboloid, &mut props);
        let hash = self.caches.add_pass(&props)?;

        let layout = UnlitPassLayout {
            stereo: scene.instanced_stereo,
            reflected: scene.camera.is_reflected(),
            caster,
            esm,
            point_caster: caster && props.is_set(base::SHADOW_CASTER_POINT),
        };
        let listener_bytes = self.listener.get_pass_buffer_size(scene, caster, dual_paraboloid);
        let map_size = layout.bytes() + listener_bytes;
        let ceiling = self.kind.pass_buffer_ceiling();
        if map_size > ceiling {
            return Err(StructuralError::ceiling_exceeded(format!(
                "unlit pass buffer needs {map_size} bytes, the ceiling is {ceiling}"
            )));
        }

        let view_proj = view_proj_matrices(scene, layout.stereo);
        let view = scene.camera.view;
        log::trace!("unlit pass {hash:#x}: {map_size} bytes");

        let pass_buffer = self.pass_ring.next_buffer(render_system.as_ref())?;
        {
            let mut mapped = pass_buffer.map(0, map_size)?;
            let mut writer = BufferWriter::new(&mut mapped);

            writer.write_mat4(&view_proj[0]);
            writer.write_mat4(&view_proj[1]);
            if layout.stereo {
                writer.write_mat4(&view_proj[2]);
                writer.write_mat4(&view_proj[3]);
            }
            if let Some(plane) = &scene.camera.reflection_plane {
                writer.write_vec4(plane);
            }
            if layout.inverse_view_proj() {
                // The identity projection has no use for an inverse.
                writer.write_mat4(&view_proj[0].try_inverse().unwrap_or_else(Mat4::identity));
            }
            if caster {
                if esm {
                    writer.write_f32s(&[view[(2, 0)], view[(2, 1)], view[(2, 2)], view[(2, 3)]]);
                }
                let (near, far) = scene.caster_depth_range();
                writer.write_f32s(&[near, 1.0 / (far - near), 0.0, 0.0]);
                if layout.point_caster {
                    writer.write_vec3_w(&scene.camera.position, 1.0);
                }
            }

            let target = &scene.target;
            writer.write_vec4(&Vec4::new(
                1.0 / target.width as f32,
                1.0 / target.height as f32,
                1.0,
                1.0,
            ));

            self.listener.prepare_pass_buffer(scene, caster, dual_paraboloid, &mut writer);
            writer.finish(map_size, "unlit pass buffer")?;
        }
        pass_buffer.unmap(UnmapOptions::KeepPersistent);

        Ok(PreparedPass {
            hash,
            caster,
            scene: scene.clone(),
            properties: props,
            pass_buffer,
            pass_buffer_bytes: map_size,
            light_buffers: [None, None, None],
            view,
            view_proj,
            tex_unit_slot_start: sampler_state_start,
            shadow_sampler: scene.samplers.shadow_map,
            light_counts: LightCounts::default(),
        })
    }
}
