//! Prolog and epilog part keys.
//!
//! A [`ShaderPartKey`] describes only what one small fragment must do. It is
//! derived from a subset of the [`ShaderKey`](crate::key::ShaderKey) plus
//! hints from the main part it is linked against (wave width, input register
//! counts), so many full-shader variants resolve to the same cached part.

use std::fmt;

use crate::key::{PsEpilogBits, PsPrologBits, TcsEpilogBits, VsPrologBits};

/// The four append-only part caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartCategory {
    VsProlog,
    TcsEpilog,
    PsProlog,
    PsEpilog,
}

impl PartCategory {
    pub const ALL: [Self; 4] = [Self::VsProlog, Self::TcsEpilog, Self::PsProlog, Self::PsEpilog];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::VsProlog => "vertex prolog",
            Self::TcsEpilog => "tessellation control epilog",
            Self::PsProlog => "fragment prolog",
            Self::PsEpilog => "fragment epilog",
        }
    }

    /// Prologs precede the main part, epilogs follow it.
    #[inline]
    #[must_use]
    pub fn is_prolog(self) -> bool {
        matches!(self, Self::VsProlog | Self::PsProlog)
    }
}

impl fmt::Display for PartCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Vertex prolog: instance-divisor fetch and LS VGPR fixups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VsPrologKey {
    pub states: VsPrologBits,
    pub wave32: bool,
    /// Input SGPRs of the vertex main part the prolog hands off to.
    pub num_input_sgprs: u8,
    pub num_inputs: u8,
    /// VGPRs of the merged next stage that sit in front of the vertex inputs.
    pub num_merged_next_stage_vgprs: u8,
    pub as_ls: bool,
    pub as_es: bool,
    pub as_ngg: bool,
}

/// Tessellation control epilog: tess factor writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TcsEpilogKey {
    pub states: TcsEpilogBits,
    pub wave32: bool,
    /// Every wave holds whole patches, so the barrier is a no-op.
    pub noop_s_barrier: bool,
}

/// Fragment prolog: color selection, forced interpolation, stippling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PsPrologKey {
    pub states: PsPrologBits,
    pub wave32: bool,
    pub num_input_sgprs: u8,
    pub colors_read: u8,
    /// Interpolated non-color inputs; back colors follow them.
    pub num_interp_inputs: u8,
    pub color_attr_index: [u8; 2],
    /// Barycentric VGPR pair per color input, -1 for flat.
    pub color_interp_vgpr_index: [i8; 2],
    pub face_vgpr_index: i8,
    pub wqm: bool,
}

impl PsPrologKey {
    /// Whether the prolog has any work to do.
    #[must_use]
    pub fn is_needed(&self) -> bool {
        self.colors_read != 0
            || self.states.forces_interpolation()
            || self.states.poly_stipple
            || self.states.samplemask_log_ps_iter != 0
    }
}

/// Fragment epilog: color export conversion, alpha test, depth exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PsEpilogKey {
    pub states: PsEpilogBits,
    pub wave32: bool,
    pub colors_written: u8,
    pub color_types: u16,
    pub writes_z: bool,
    pub writes_stencil: bool,
    pub writes_samplemask: bool,
    pub uses_discard: bool,
}

/// Key of one cached prolog or epilog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderPartKey {
    VsProlog(VsPrologKey),
    TcsEpilog(TcsEpilogKey),
    PsProlog(PsPrologKey),
    PsEpilog(PsEpilogKey),
}

impl ShaderPartKey {
    #[inline]
    #[must_use]
    pub fn category(&self) -> PartCategory {
        match self {
            Self::VsProlog(_) => PartCategory::VsProlog,
            Self::TcsEpilog(_) => PartCategory::TcsEpilog,
            Self::PsProlog(_) => PartCategory::PsProlog,
            Self::PsEpilog(_) => PartCategory::PsEpilog,
        }
    }

    #[inline]
    #[must_use]
    pub fn wave32(&self) -> bool {
        match self {
            Self::VsProlog(k) => k.wave32,
            Self::TcsEpilog(k) => k.wave32,
            Self::PsProlog(k) => k.wave32,
            Self::PsEpilog(k) => k.wave32,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.category().name()
    }
}
