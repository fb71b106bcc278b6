//! Scanned shader information.
//!
//! [`ShaderInfo`] is produced by the front-end lowering pipeline when an API
//! program object is created. It is read-only to the variant compiler: key
//! construction, part-key derivation and wave-size selection all consult it,
//! but nothing here ever writes back into it.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::stage::{ShaderStage, TessPrimitiveMode};

bitflags! {
    /// Per-shader feature flags discovered by the scan.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ShaderFeatures: u32 {
        const WRITES_POSITION    = 1 << 0;
        const WRITES_Z           = 1 << 1;
        const WRITES_STENCIL     = 1 << 2;
        const WRITES_SAMPLEMASK  = 1 << 3;
        const USES_DISCARD       = 1 << 4;
        const HAS_DIVERGENT_LOOP = 1 << 5;
        const NEEDS_QUAD_HELPERS = 1 << 6;
        /// Vertex fetch needs fixups that only a prolog can perform.
        const VS_NEEDS_PROLOG    = 1 << 7;
        const USES_PRIM_ID       = 1 << 8;
        /// Compiler profile: this shader is known to run better in wave32.
        const PREFER_WAVE32      = 1 << 9;
        /// Compiler profile: prefer wave64 on GFX10 / GFX10.3.
        const PREFER_GFX10_WAVE64 = 1 << 10;
    }
}

/// Interpolation qualifier of a fragment input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InterpMode {
    #[default]
    Smooth,
    Flat,
    NoPerspective,
    /// Legacy color input: smooth unless flat shading is enabled by state.
    Color,
}

/// Interpolation location of a fragment input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InterpLocation {
    #[default]
    Center,
    Centroid,
    Sample,
}

/// Output color type of a fragment color export, 2 bits per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ColorType {
    #[default]
    Float32 = 0,
    Float16 = 1,
    Int16 = 2,
    Uint16 = 3,
}

/// Read-only scan results for one shader program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShaderInfo {
    /// Required: selectors reject an info without a stage.
    pub stage: Option<ShaderStage>,
    /// Stage that follows this one in the program, if known at link time.
    pub next_stage: Option<ShaderStage>,
    pub name: String,

    /// Number of vertex attributes (vertex) or generic inputs.
    pub num_inputs: u8,
    /// Fragment only: interpolated inputs excluding colors.
    pub num_ps_inputs: u8,
    pub inputs_read: u64,
    pub outputs_written: u64,
    pub num_outputs: u8,

    /// Fragment only: 4 bits per color input (COL0 = bits 0..4, COL1 = bits 4..8).
    pub colors_read: u8,
    /// Fragment only: one bit per color render target written.
    pub colors_written: u8,
    pub color_interpolate: [InterpMode; 2],
    pub color_interpolate_loc: [InterpLocation; 2],
    pub color_attr_index: [u8; 2],
    /// Fragment only: 2 bits per color target, see [`ColorType`].
    pub output_color_types: u16,
    /// Fragment only: `gl_FragCoord` components read.
    pub num_fragcoord_components: u8,

    /// Tessellation control only: output patch size.
    pub tcs_vertices_out: u8,
    /// Tessellation evaluation only: whether tess factors are read.
    pub tes_reads_tess_factors: bool,
    /// Tessellation evaluation only: primitive mode.
    pub tess_prim_mode: TessPrimitiveMode,
    pub enabled_streamout_buffer_mask: u8,

    pub features: ShaderFeatures,
}

impl ShaderInfo {
    #[must_use]
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage: Some(stage),
            ..Default::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn has(&self, feature: ShaderFeatures) -> bool {
        self.features.contains(feature)
    }

    /// Mask of vertex inputs actually declared (`num_inputs` consecutive bits).
    #[inline]
    #[must_use]
    pub fn input_mask(&self) -> u16 {
        if self.num_inputs >= 16 {
            u16::MAX
        } else {
            (1u16 << self.num_inputs) - 1
        }
    }

    /// Number of color inputs read (COL0, COL1).
    #[inline]
    #[must_use]
    pub fn num_colors_read(&self) -> u8 {
        u8::from(self.colors_read & 0x0f != 0) + u8::from(self.colors_read & 0xf0 != 0)
    }

    /// Whether any streamout buffer is written.
    #[inline]
    #[must_use]
    pub fn uses_streamout(&self) -> bool {
        self.enabled_streamout_buffer_mask != 0
    }
}
