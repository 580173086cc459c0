//! Property keys only Terra sets. Everything else comes from the PBS set.

use redlilium_hlms_core::IdString;

use crate::properties::id_strings;

id_strings! {
    USE_SKIRTS = "use_skirts";
}

/// Property prefixes of the per-detail texture types, suffixed with the
/// detail index (`detail_map0`, `roughness_map2`, ...).
pub const DETAIL_MAP_PREFIX: &str = "detail_map";
pub const DETAIL_MAP_NM_PREFIX: &str = "detail_map_nm";
pub const ROUGHNESS_MAP_PREFIX: &str = "roughness_map";
pub const METALNESS_MAP_PREFIX: &str = "metalness_map";
