//! Terrain cells: strips of the height map drawn without vertex buffers.
//!
//! The vertex shader rebuilds positions from the cell record and the height
//! map, so all a cell carries is its placement in the grid and the shape of
//! its triangle strip.

use std::sync::Arc;

use redlilium_hlms_core::math::{Vec2, Vec3};

use crate::types::DescriptorSetTexture;

/// State shared by every cell of one terrain.
#[derive(Debug, Clone)]
pub struct TerrainInfo {
    /// Height map width, in texels.
    pub width: u32,
    /// Height map depth, in texels.
    pub depth: u32,
    pub origin: Vec3,
    /// World size of one texel along x and z.
    pub xz_relative_size: Vec2,
    pub height_unorm_scaled: f32,
    pub skirt_size: f32,
    /// Height map, normal map and shadow map.
    pub textures: Arc<DescriptorSetTexture>,
}

impl TerrainInfo {
    pub fn new(width: u32, depth: u32, textures: Arc<DescriptorSetTexture>) -> Self {
        Self {
            width,
            depth,
            origin: Vec3::zeros(),
            xz_relative_size: Vec2::new(1.0, 1.0),
            height_unorm_scaled: 1.0,
            skirt_size: 10.0,
            textures,
        }
    }
}

/// One terrain cell, drawn with the Terra material kind.
#[derive(Debug, Clone)]
pub struct TerrainCell {
    pub terrain: Arc<TerrainInfo>,
    pub grid_x: i32,
    pub grid_z: i32,
    pub lod_level: u32,
    /// Texels covered, before LOD reduction.
    pub size_x: u32,
    pub size_z: u32,
    pub vertices_per_line: u32,
    /// Vertex count of the whole strip.
    pub primitive_count: u32,
    pub use_skirts: bool,
}

impl TerrainCell {
    pub fn new(terrain: Arc<TerrainInfo>, use_skirts: bool) -> Self {
        Self {
            terrain,
            grid_x: 0,
            grid_z: 0,
            lod_level: 0,
            size_x: 0,
            size_z: 0,
            vertices_per_line: 0,
            primitive_count: 0,
            use_skirts,
        }
    }

    /// Place the cell at `(grid_x, grid_z)` covering up to `width` x `depth`
    /// texels (clamped to the terrain) at `lod_level`.
    pub fn set_origin(&mut self, grid_x: i32, grid_z: i32, width: u32, depth: u32, lod_level: u32) {
        self.grid_x = grid_x;
        self.grid_z = grid_z;
        self.lod_level = lod_level;
        self.size_x = width.min(self.terrain.width.saturating_sub(grid_x.max(0) as u32));
        self.size_z = depth.min(self.terrain.depth.saturating_sub(grid_z.max(0) as u32));

        let step = 1u32 << lod_level;
        // One extra vertex closes the gap to the next cell.
        let mut columns = ((self.size_x + step - 1) >> lod_level) + 1;
        let mut rows = ((self.size_z + step - 1) >> lod_level) + 1;
        columns = columns.max(2);
        rows = rows.max(2);
        if self.use_skirts {
            columns += 2;
            rows += 2;
        }

        self.vertices_per_line = columns * 2 + 2;
        self.primitive_count = self.vertices_per_line * (rows - 1);
    }

    /// Absorb an adjacent cell of the same LOD sharing a full edge.
    /// Returns false (and changes nothing) when the cells can't be merged.
    pub fn merge(&mut self, next: &TerrainCell) -> bool {
        if self.lod_level != next.lod_level {
            return false;
        }
        let (this_x, next_x) = (self.grid_x as u32, next.grid_x as u32);
        let (this_z, next_z) = (self.grid_z as u32, next.grid_z as u32);

        let horizontal = (this_x + self.size_x == next_x || next_x + next.size_x == this_x)
            && self.grid_z == next.grid_z
            && self.size_z == next.size_z;
        let vertical = (this_z + self.size_z == next_z || next_z + next.size_z == this_z)
            && self.grid_x == next.grid_x
            && self.size_x == next.size_x;

        if horizontal {
            self.set_origin(
                self.grid_x.min(next.grid_x),
                self.grid_z,
                self.size_x + next.size_x,
                self.size_z,
                self.lod_level,
            );
            true
        } else if vertical {
            self.set_origin(
                self.grid_x,
                self.grid_z.min(next.grid_z),
                self.size_x,
                self.size_z + next.size_z,
                self.lod_level,
            );
            true
        } else {
            false
        }
    }

    /// The 16 words the vertex shader reads per cell:
    /// `uvec4 numVertsPerLine`, `ivec4 xzTexPosBounds`, then the terrain
    /// origin with `1 / width` and the texel size, height scale and `1 / depth`.
    pub fn gpu_record(&self) -> [u32; 16] {
        let terrain = &self.terrain;
        let rows = (self.primitive_count / self.vertices_per_line.max(1)).saturating_sub(2);
        [
            self.vertices_per_line,
            self.lod_level,
            rows,
            terrain.skirt_size.to_bits(),
            self.grid_x as u32,
            self.grid_z as u32,
            terrain.width.saturating_sub(1),
            terrain.depth.saturating_sub(1),
            terrain.origin.x.to_bits(),
            terrain.origin.y.to_bits(),
            terrain.origin.z.to_bits(),
            (1.0 / terrain.width as f32).to_bits(),
            terrain.xz_relative_size.x.to_bits(),
            terrain.height_unorm_scaled.to_bits(),
            terrain.xz_relative_size.y.to_bits(),
            (1.0 / terrain.depth as f32).to_bits(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextureGpu, TextureId};
    use rstest::rstest;

    fn terrain(width: u32, depth: u32) -> Arc<TerrainInfo> {
        let textures = Arc::new(DescriptorSetTexture::new(vec![TextureGpu::new(
            TextureId(1),
            "heightmap",
            width,
            depth,
        )]));
        Arc::new(TerrainInfo::new(width, depth, textures))
    }

    #[rstest]
    #[case::full_detail(false, 0, 132, 62)]
    #[case::half_detail(false, 1, 68, 30)]
    #[case::skirts(true, 0, 136, 64)]
    fn test_strip_shape(
        #[case] skirts: bool,
        #[case] lod: u32,
        #[case] vertices_per_line: u32,
        #[case] rows: u32,
    ) {
        let mut cell = TerrainCell::new(terrain(256, 256), skirts);
        cell.set_origin(0, 0, 64, 64, lod);
        assert_eq!(cell.vertices_per_line, vertices_per_line);
        assert_eq!(cell.gpu_record()[2], rows);
    }

    #[test]
    fn test_origin_clamps_to_terrain() {
        let mut cell = TerrainCell::new(terrain(100, 100), false);
        cell.set_origin(64, 80, 64, 64, 0);
        assert_eq!((cell.size_x, cell.size_z), (36, 20));
    }

    #[test]
    fn test_tiny_cell_keeps_two_vertices_per_side() {
        let mut cell = TerrainCell::new(terrain(256, 256), false);
        cell.set_origin(0, 0, 1, 1, 3);
        assert_eq!(cell.vertices_per_line, 2 * 2 + 2);
        assert_eq!(cell.primitive_count, cell.vertices_per_line);
    }

    #[test]
    fn test_merge_neighbours() {
        let terrain = terrain(256, 256);
        let mut a = TerrainCell::new(terrain.clone(), false);
        let mut b = TerrainCell::new(terrain.clone(), false);
        a.set_origin(32, 0, 32, 32, 0);
        b.set_origin(0, 0, 32, 32, 0);
        assert!(a.merge(&b));
        assert_eq!((a.grid_x, a.size_x, a.size_z), (0, 64, 32));

        let mut below = TerrainCell::new(terrain.clone(), false);
        below.set_origin(0, 32, 64, 32, 0);
        assert!(a.merge(&below));
        assert_eq!((a.grid_z, a.size_z), (0, 64));

        let mut other_lod = TerrainCell::new(terrain, false);
        other_lod.set_origin(64, 0, 32, 64, 1);
        assert!(!a.merge(&other_lod));
    }

    #[test]
    fn test_record_words() {
        let mut info = (*terrain(512, 256)).clone();
        info.origin = Vec3::new(-10.0, 5.0, 20.0);
        info.skirt_size = 3.0;
        let mut cell = TerrainCell::new(Arc::new(info), false);
        cell.set_origin(-4, 8, 16, 16, 0);

        let record = cell.gpu_record();
        assert_eq!(f32::from_bits(record[3]), 3.0);
        assert_eq!(record[4] as i32, -4);
        assert_eq!(record[5], 8);
        assert_eq!((record[6], record[7]), (511, 255));
        assert_eq!(f32::from_bits(record[8]), -10.0);
        assert_eq!(f32::from_bits(record[11]), 1.0 / 512.0);
        assert_eq!(f32::from_bits(record[15]), 1.0 / 256.0);
    }
}
