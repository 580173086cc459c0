//! Descriptor binding ranges shared by every shader stage of a permutation.
//!
//! A [`RootLayout`] declares, for each of up to [`MAX_BOUND_DESCRIPTOR_SETS`]
//! descriptor sets, which contiguous slot range every [`DescBindingKind`]
//! occupies. The rules checked by [`RootLayout::validate`] keep a layout
//! expressible on Vulkan, D3D12 and Metal at the same time.
//!
//! # JSON schema
//!
//! ```text
//! {
//!     "0" : {
//!         "has_params" : ["vs", "ps"],
//!         "const_buffers" : [0, 3],
//!         "tex_buffers" : [0, 1],
//!         "textures" : [1, 8],
//!         "samplers" : [1, 8]
//!     },
//!     "1" : { "baked" : true, "textures" : [8, 12] },
//!     "arrays" : { "textures" : [[2, 4]] }
//! }
//! ```

use serde_json::{json, Map, Value};

use crate::error::{Result, StructuralError};

/// Maximum number of descriptor sets a layout can describe.
pub const MAX_BOUND_DESCRIPTOR_SETS: usize = 4;

/// Number of graphics shader stages (`vs`, `ps`, `gs`, `hs`, `ds`).
pub const NUM_GRAPHICS_STAGES: u32 = 5;

/// Bit of the compute stage in a params-buffer stage mask.
pub const COMPUTE_STAGE: u32 = 5;

const ALL_GRAPHICS_STAGES_MASK: u8 = (1 << NUM_GRAPHICS_STAGES) - 1;
const STAGE_ACRONYMS: [&str; 6] = ["vs", "ps", "gs", "hs", "ds", "cs"];

/// The eight kinds of descriptor a binding range can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescBindingKind {
    ParamBuffer = 0,
    ConstBuffer = 1,
    ReadOnlyBuffer = 2,
    TexBuffer = 3,
    Texture = 4,
    Sampler = 5,
    UavBuffer = 6,
    UavTexture = 7,
}

impl DescBindingKind {
    pub const COUNT: usize = 8;

    pub const ALL: [DescBindingKind; Self::COUNT] = [
        Self::ParamBuffer,
        Self::ConstBuffer,
        Self::ReadOnlyBuffer,
        Self::TexBuffer,
        Self::Texture,
        Self::Sampler,
        Self::UavBuffer,
        Self::UavTexture,
    ];

    /// Key used for this kind in the JSON schema.
    pub fn json_name(self) -> &'static str {
        match self {
            Self::ParamBuffer => "has_params",
            Self::ConstBuffer => "const_buffers",
            Self::ReadOnlyBuffer => "readonly_buffers",
            Self::TexBuffer => "tex_buffers",
            Self::Texture => "textures",
            Self::Sampler => "samplers",
            Self::UavBuffer => "uav_buffers",
            Self::UavTexture => "uav_textures",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Half-open slot range `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DescBindingRange {
    pub start: u16,
    pub end: u16,
}

impl DescBindingRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    pub fn is_in_use(&self) -> bool {
        self.start < self.end
    }

    pub fn num_used_slots(&self) -> usize {
        usize::from(self.end.saturating_sub(self.start))
    }

    pub fn overlaps(&self, other: &DescBindingRange) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    pub fn contains_slot(&self, slot: u16) -> bool {
        self.start <= slot && slot < self.end
    }
}

/// An array-of-descriptors binding starting at `binding_idx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayBinding {
    pub binding_idx: u16,
    pub array_size: u16,
}

impl ArrayBinding {
    pub fn new(binding_idx: u16, array_size: u16) -> Self {
        Self {
            binding_idx,
            array_size,
        }
    }

    /// One past the last slot used by the array.
    pub fn end(&self) -> u32 {
        u32::from(self.binding_idx) + u32::from(self.array_size)
    }
}

/// Cross-API descriptor binding declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RootLayout {
    /// True for compute layouts.
    pub compute: bool,
    /// Bitmask of stages with a params buffer (bit `k` = stage `k`).
    pub params_buff_stages: u8,
    /// Baked (bindless / immutable) sets.
    pub baked: [bool; MAX_BOUND_DESCRIPTOR_SETS],
    pub ranges: [[DescBindingRange; DescBindingKind::COUNT]; MAX_BOUND_DESCRIPTOR_SETS],
    arrays: [Vec<ArrayBinding>; DescBindingKind::COUNT],
}

impl RootLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(&self, set: usize, kind: DescBindingKind) -> DescBindingRange {
        self.ranges[set][kind.index()]
    }

    pub fn range_mut(&mut self, set: usize, kind: DescBindingKind) -> &mut DescBindingRange {
        &mut self.ranges[set][kind.index()]
    }

    /// Raw setter. No validation happens until [`RootLayout::validate`].
    pub fn set_range(&mut self, set: usize, kind: DescBindingKind, start: u16, end: u16) {
        self.ranges[set][kind.index()] = DescBindingRange::new(start, end);
    }

    pub fn array_bindings(&self, kind: DescBindingKind) -> &[ArrayBinding] {
        &self.arrays[kind.index()]
    }

    /// Register an array binding for `kind`.
    ///
    /// Entries must be added in ascending order and must not overlap the
    /// previously added entry.
    pub fn add_array_binding(&mut self, kind: DescBindingKind, desc: ArrayBinding) -> Result<()> {
        let list = &mut self.arrays[kind.index()];
        if let Some(last) = list.last() {
            if u32::from(desc.binding_idx) < last.end() {
                return Err(StructuralError::invalid_root_layout(format!(
                    "Array binding for {} at slot {} (size {}) overlaps or precedes the \
                     previous array binding at slot {} (size {})",
                    kind.json_name(),
                    desc.binding_idx,
                    desc.array_size,
                    last.binding_idx,
                    last.array_size
                )));
            }
        }
        list.push(desc);
        Ok(())
    }

    /// Check every compatibility rule. `filename` only decorates messages.
    pub fn validate(&self, filename: &str) -> Result<()> {
        let fail = |msg: String| {
            Err(StructuralError::invalid_root_layout(format!(
                "Error at file {filename}:\n{msg}"
            )))
        };

        let mut baked_seen_tex = false;
        let mut baked_seen_samplers = false;
        let mut baked_seen_uavs = false;

        for i in 0..MAX_BOUND_DESCRIPTOR_SETS {
            for kind in DescBindingKind::ALL {
                let range = self.range(i, kind);
                if !range.is_valid() {
                    return fail(format!(
                        "Invalid descriptor start <= end must be true. Set {i} specifies {} in \
                         range [{}, {})",
                        kind.json_name(),
                        range.start,
                        range.end
                    ));
                }
            }

            if !self.baked[i]
                && (self.range(i, DescBindingKind::UavBuffer).is_in_use()
                    || self.range(i, DescBindingKind::UavTexture).is_in_use())
            {
                return fail(format!("UAVs can only be used in baked sets (set {i})"));
            }

            let incompatible = [
                (DescBindingKind::TexBuffer, DescBindingKind::Texture),
                (DescBindingKind::ReadOnlyBuffer, DescBindingKind::TexBuffer),
                (DescBindingKind::ReadOnlyBuffer, DescBindingKind::Texture),
                (DescBindingKind::UavBuffer, DescBindingKind::UavTexture),
            ];
            for (kind, other_kind) in incompatible {
                let range = self.range(i, kind);
                if !range.is_in_use() {
                    continue;
                }
                for j in i..MAX_BOUND_DESCRIPTOR_SETS {
                    let other = self.range(j, other_kind);
                    if other.is_in_use() && range.overlaps(&other) {
                        return fail(format!(
                            "{} and {} slots cannot overlap for compatibility with other APIs. \
                             Set {i} uses [{}, {}) and set {j} uses [{}, {})",
                            kind.json_name(),
                            other_kind.json_name(),
                            range.start,
                            range.end,
                            other.start,
                            other.end
                        ));
                    }
                }
            }

            if self.baked[i] {
                for kind in [DescBindingKind::ParamBuffer, DescBindingKind::ConstBuffer] {
                    if self.range(i, kind).is_in_use() {
                        return fail(format!(
                            "ParamBuffer and ConstBuffer can't be in a baked set (set {i})"
                        ));
                    }
                }

                if self.range(i, DescBindingKind::TexBuffer).is_in_use()
                    || self.range(i, DescBindingKind::Texture).is_in_use()
                {
                    if baked_seen_tex {
                        return fail(
                            "All baked Textures and TexBuffers must be together in the same \
                             baked set and in only one of them"
                                .to_string(),
                        );
                    }
                    baked_seen_tex = true;
                }

                if self.range(i, DescBindingKind::Sampler).is_in_use() {
                    if baked_seen_samplers {
                        return fail("All baked Samplers be together in one baked set".to_string());
                    }
                    baked_seen_samplers = true;
                }

                if self.range(i, DescBindingKind::UavBuffer).is_in_use()
                    || self.range(i, DescBindingKind::UavTexture).is_in_use()
                {
                    if baked_seen_uavs {
                        return fail(
                            "All baked UavTextures and UavBuffers must be together in the same \
                             baked set and in only one of them"
                                .to_string(),
                        );
                    }
                    baked_seen_uavs = true;
                }
            }
        }

        for kind in DescBindingKind::ALL {
            for j in 0..MAX_BOUND_DESCRIPTOR_SETS - 1 {
                let current = self.range(j, kind);
                let next = self.range(j + 1, kind);
                if next.is_in_use() && current.end > next.start {
                    return fail(format!(
                        "Descriptors cannot overlap across sets. However set {j} specifies {} in \
                         range [{}, {}) but set {} is in range [{}, {})",
                        kind.json_name(),
                        current.start,
                        current.end,
                        j + 1,
                        next.start,
                        next.end
                    ));
                }
            }
        }

        for kind in DescBindingKind::ALL {
            for array in self.array_bindings(kind) {
                let owner = (0..MAX_BOUND_DESCRIPTOR_SETS)
                    .map(|set| self.range(set, kind))
                    .find(|range| range.contains_slot(array.binding_idx));
                let contained = owner.is_some_and(|range| array.end() <= u32::from(range.end));
                if !contained {
                    return fail(format!(
                        "Array binding for {} at slot {} with size {} is not fully contained \
                         in any declared range",
                        kind.json_name(),
                        array.binding_idx,
                        array.array_size
                    ));
                }
            }
        }

        Ok(())
    }

    /// Parse the JSON schema described in the module docs and validate it.
    ///
    /// On validation failure the offending layout is logged at error level.
    pub fn parse(json: &str, compute: bool, filename: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(json).map_err(|err| {
            StructuralError::invalid_params(format!(
                "Invalid JSON string in file {filename} at line {} Reason: {err}",
                err.line()
            ))
        })?;

        let mut layout = RootLayout {
            compute,
            ..Default::default()
        };

        for set in 0..MAX_BOUND_DESCRIPTOR_SETS {
            if let Some(obj) = doc.get(set.to_string()).filter(|v| v.is_object()) {
                layout.parse_set(obj, set, filename)?;
            }
        }

        if let Some(arrays) = doc.get("arrays").and_then(Value::as_object) {
            for kind in DescBindingKind::ALL {
                let Some(entries) = arrays.get(kind.json_name()).and_then(Value::as_array) else {
                    continue;
                };
                for entry in entries {
                    let (binding_idx, array_size) = parse_u16_pair(entry, filename)?;
                    layout.add_array_binding(kind, ArrayBinding::new(binding_idx, array_size))?;
                }
            }
        }

        if let Err(err) = layout.validate(filename) {
            log::error!(
                "Error in {} with its Root Layout:\n{}",
                filename,
                layout.dump()
            );
            return Err(err);
        }

        Ok(layout)
    }

    fn parse_set(&mut self, value: &Value, set: usize, filename: &str) -> Result<()> {
        if let Some(baked) = value.get("baked").and_then(Value::as_bool) {
            self.baked[set] = baked;
        }

        for kind in DescBindingKind::ALL {
            let Some(entry) = value.get(kind.json_name()) else {
                continue;
            };

            if kind == DescBindingKind::ParamBuffer {
                let Some(stages) = entry.as_array() else {
                    continue;
                };
                if self.params_buff_stages != 0 {
                    return Err(StructuralError::invalid_root_layout(format!(
                        "Error at file {filename}:\nAll 'has_params' declarations must live in \
                         the same set"
                    )));
                }
                for stage in stages.iter().filter_map(Value::as_str) {
                    self.parse_params_stage(stage, set);
                }
                continue;
            }

            if entry.as_array().is_some_and(|arr| arr.len() == 2) {
                let (start, end) = parse_u16_pair(entry, filename)?;
                if start > end {
                    return Err(StructuralError::invalid_root_layout(format!(
                        "Error at file {filename}:\nRoot Layout descriptors must satisfy \
                         start < end"
                    )));
                }
                self.set_range(set, kind, start, end);
            }
        }

        Ok(())
    }

    fn parse_params_stage(&mut self, stage: &str, set: usize) {
        let range = &mut self.ranges[set][DescBindingKind::ParamBuffer.index()];
        if self.compute {
            if stage.starts_with("cs") || stage.starts_with("all") {
                self.params_buff_stages = 1 << COMPUTE_STAGE;
                range.end = 1;
            }
            return;
        }

        if stage.starts_with("all") {
            self.params_buff_stages = ALL_GRAPHICS_STAGES_MASK;
            range.end = NUM_GRAPHICS_STAGES as u16;
            return;
        }

        if let Some(k) = STAGE_ACRONYMS[..NUM_GRAPHICS_STAGES as usize]
            .iter()
            .position(|acronym| stage.starts_with(acronym))
        {
            self.params_buff_stages |= 1 << k;
            range.end += 1;
        }
    }

    /// Serialize to the JSON schema. Unused sets are omitted.
    pub fn dump(&self) -> String {
        let mut doc = Map::new();

        for set in 0..MAX_BOUND_DESCRIPTOR_SETS {
            if !self.ranges[set].iter().any(DescBindingRange::is_in_use) {
                continue;
            }

            let mut entries = Map::new();
            if self.range(set, DescBindingKind::ParamBuffer).is_in_use() {
                let stages: Vec<&str> = STAGE_ACRONYMS
                    .iter()
                    .enumerate()
                    .filter(|(k, _)| self.params_buff_stages & (1 << k) != 0)
                    .map(|(_, acronym)| *acronym)
                    .collect();
                entries.insert(
                    DescBindingKind::ParamBuffer.json_name().to_string(),
                    json!(stages),
                );
            }
            if self.baked[set] {
                entries.insert("baked".to_string(), Value::Bool(true));
            }
            for kind in &DescBindingKind::ALL[1..] {
                let range = self.range(set, *kind);
                if range.is_in_use() {
                    entries.insert(
                        kind.json_name().to_string(),
                        json!([range.start, range.end]),
                    );
                }
            }
            doc.insert(set.to_string(), Value::Object(entries));
        }

        let arrays: Map<String, Value> = DescBindingKind::ALL
            .iter()
            .filter(|kind| !self.array_bindings(**kind).is_empty())
            .map(|kind| {
                let entries = self
                    .array_bindings(*kind)
                    .iter()
                    .map(|a| json!([a.binding_idx, a.array_size]))
                    .collect();
                (kind.json_name().to_string(), Value::Array(entries))
            })
            .collect();
        if !arrays.is_empty() {
            doc.insert("arrays".to_string(), Value::Object(arrays));
        }

        // A `Value` tree always serializes.
        serde_json::to_string_pretty(&Value::Object(doc)).unwrap_or_default()
    }

    /// Number of sets up to and including the last one in use.
    pub fn calculate_num_used_sets(&self) -> usize {
        (0..MAX_BOUND_DESCRIPTOR_SETS)
            .rev()
            .find(|&set| self.ranges[set].iter().any(DescBindingRange::is_in_use))
            .map_or(0, |set| set + 1)
    }

    /// Total slots used by `set` across all kinds.
    pub fn calculate_num_bindings(&self, set: usize) -> usize {
        self.ranges[set]
            .iter()
            .map(DescBindingRange::num_used_slots)
            .sum()
    }

    /// Locate the params buffer of `stage` as `(set, binding)`.
    pub fn find_params_buffer(&self, stage: u32) -> Option<(usize, usize)> {
        if self.params_buff_stages & (1 << stage) == 0 {
            return None;
        }

        let prev_stages_with_params = if self.compute {
            0
        } else {
            (0..stage)
                .filter(|k| self.params_buff_stages & (1 << k) != 0)
                .count()
        };

        (0..MAX_BOUND_DESCRIPTOR_SETS)
            .find(|&set| self.range(set, DescBindingKind::ParamBuffer).is_in_use())
            .map(|set| (set, prev_stages_with_params))
    }
}

fn parse_u16_pair(value: &Value, filename: &str) -> Result<(u16, u16)> {
    let pair = value
        .as_array()
        .filter(|arr| arr.len() == 2)
        .and_then(|arr| Some((arr[0].as_u64()?, arr[1].as_u64()?)));
    match pair {
        Some((a, b)) if a <= 65535 && b <= 65535 => Ok((a as u16, b as u16)),
        Some(_) => Err(StructuralError::invalid_root_layout(format!(
            "Error at file {filename}:\nRoot Layout descriptors must be in range [0; 65535]"
        ))),
        None => Err(StructuralError::invalid_params(format!(
            "Error at file {filename}:\nExpected a pair of unsigned integers, got {value}"
        ))),
    }
}
