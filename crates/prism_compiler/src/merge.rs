//! Stage Merge Resolver
//!
//! Decides, per GPU generation, which adjacent pipeline stages execute inside
//! one hardware invocation and what that implies for the main part:
//!
//! | Generation | Vertex → TessCtrl | Vertex/TessEval → Geometry | Last geometry stage |
//! |------------|-------------------|----------------------------|---------------------|
//! | GFX6–GFX8  | LS, HS separate   | ES, GS separate            | VS                  |
//! | GFX9       | merged LS+HS      | merged ES+GS               | VS                  |
//! | GFX10+     | merged LS+HS      | merged ES+GS (or NGG)      | VS or NGG           |
//!
//! The resolver is a pure function. Its [`MergeDecision`] drives:
//!
//! 1. the [`ArgumentLayout`] a main part must expose (merged halves reserve
//!    leading system SGPRs and leading VGPRs for their counterpart),
//! 2. whether the variant builder must obtain a previous-stage main part,
//! 3. whether the two halves need a synthetic two-phase wrapper because they
//!    run with different active-thread counts ([`needs_phase_split`]).

use prism_core::args::{ES_GS_COUNTERPART_VGPRS, LS_HS_COUNTERPART_VGPRS};
use prism_core::{ArgumentLayout, GfxLevel, PrimitiveShading, ShaderKey, ShaderStage, WaveSize};

/// Hardware stage a program runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwStage {
    Ls,
    Hs,
    Es,
    Gs,
    Vs,
    Ngg,
    Ps,
    Cs,
}

/// Adjacent stages sharing one hardware invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergedPair {
    LsHs,
    EsGs,
}

/// Main-part slot of a selector, one per merge configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MainPartSlot {
    Plain,
    /// Vertex stage feeding tessellation (LS).
    PreTessellation,
    /// Vertex or tess-eval stage feeding a legacy geometry stage (ES).
    PreGeometry,
    /// Last geometry stage running on the NGG pipeline.
    Ngg,
    /// Vertex or tess-eval stage feeding an NGG geometry stage.
    NggPreGeometry,
}

impl MainPartSlot {
    pub const COUNT: usize = 5;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Plain,
        Self::PreTessellation,
        Self::PreGeometry,
        Self::Ngg,
        Self::NggPreGeometry,
    ];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Slot implied by the merge-role bits of a key.
    #[must_use]
    pub fn for_key(key: &ShaderKey) -> Self {
        match key.as_ge() {
            Some(ge) if ge.as_ls => Self::PreTessellation,
            Some(ge) if ge.as_es && ge.as_ngg => Self::NggPreGeometry,
            Some(ge) if ge.as_es => Self::PreGeometry,
            Some(ge) if ge.as_ngg => Self::Ngg,
            _ => Self::Plain,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::PreTessellation => "pre-tessellation",
            Self::PreGeometry => "pre-geometry",
            Self::Ngg => "ngg",
            Self::NggPreGeometry => "ngg pre-geometry",
        }
    }
}

/// What the active threads of one phase iterate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadDomain {
    Vertices,
    PatchControlPoints,
    Primitives,
}

/// Active-lane mask of one phase: the thread count is read from byte
/// `wave_info_byte` of the merged wave info SGPR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseMask {
    pub wave_info_byte: u8,
    pub domain: ThreadDomain,
}

/// Two-phase masked execution of a merged invocation.
///
/// Phase 1 runs the previous-stage half under the sub-mask from the low
/// byte, all lanes meet at a handoff barrier, then phase 2 runs the main
/// half under the mask from the second byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrapperPlan {
    pub first: PhaseMask,
    pub second: PhaseMask,
}

/// Two halves need separate phases when their thread counts can differ.
#[must_use]
pub fn needs_phase_split(first: ThreadDomain, second: ThreadDomain) -> Option<WrapperPlan> {
    (first != second).then_some(WrapperPlan {
        first: PhaseMask {
            wave_info_byte: 0,
            domain: first,
        },
        second: PhaseMask {
            wave_info_byte: 1,
            domain: second,
        },
    })
}

/// Input to [`StageMergeResolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeQuery {
    pub gfx: GfxLevel,
    pub stage: ShaderStage,
    /// Following geometry stage (`TessCtrl` or `Geometry`), if any.
    pub next_stage: Option<ShaderStage>,
    pub shading: PrimitiveShading,
}

impl MergeQuery {
    /// Rebuild the query a key was constructed from.
    #[must_use]
    pub fn for_key(gfx: GfxLevel, stage: ShaderStage, key: &ShaderKey) -> Self {
        let (next_stage, ngg) = match key.as_ge() {
            Some(ge) if ge.as_ls => (Some(ShaderStage::TessCtrl), false),
            Some(ge) if ge.as_es => (Some(ShaderStage::Geometry), ge.as_ngg),
            Some(ge) => (None, ge.as_ngg),
            None => (None, false),
        };
        Self {
            gfx,
            stage,
            next_stage,
            shading: if ngg {
                PrimitiveShading::Ngg
            } else {
                PrimitiveShading::Legacy
            },
        }
    }

    /// The query whose decision selects `slot` for a `stage` program.
    #[must_use]
    pub fn for_slot(gfx: GfxLevel, stage: ShaderStage, slot: MainPartSlot) -> Self {
        let (next_stage, shading) = match slot {
            MainPartSlot::Plain => (None, PrimitiveShading::Legacy),
            MainPartSlot::PreTessellation => (Some(ShaderStage::TessCtrl), PrimitiveShading::Legacy),
            MainPartSlot::PreGeometry => (Some(ShaderStage::Geometry), PrimitiveShading::Legacy),
            MainPartSlot::Ngg => (None, PrimitiveShading::Ngg),
            MainPartSlot::NggPreGeometry => (Some(ShaderStage::Geometry), PrimitiveShading::Ngg),
        };
        Self {
            gfx,
            stage,
            next_stage,
            shading,
        }
    }
}

/// Output of [`StageMergeResolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeDecision {
    pub hw_stage: HwStage,
    pub merged: Option<MergedPair>,
    pub slot: MainPartSlot,
    /// Slot of the previous-stage selector merged in front of this stage.
    pub previous_slot: Option<MainPartSlot>,
    pub reserved_sgprs: u8,
    pub counterpart_vgprs: u8,
    pub wrapper: Option<WrapperPlan>,
}

impl MergeDecision {
    fn standalone(hw_stage: HwStage, slot: MainPartSlot) -> Self {
        Self {
            hw_stage,
            merged: None,
            slot,
            previous_slot: None,
            reserved_sgprs: 0,
            counterpart_vgprs: 0,
            wrapper: None,
        }
    }

    fn merged(hw_stage: HwStage, pair: Option<MergedPair>, slot: MainPartSlot, counterpart_vgprs: u8) -> Self {
        Self {
            hw_stage,
            merged: pair,
            slot,
            previous_slot: None,
            reserved_sgprs: prism_core::args::MERGED_RESERVED_SGPRS,
            counterpart_vgprs,
            wrapper: None,
        }
    }

    fn with_previous(mut self, slot: MainPartSlot, wrapper: Option<WrapperPlan>) -> Self {
        self.previous_slot = Some(slot);
        self.wrapper = wrapper;
        self
    }

    /// Whether the builder must link a previous-stage main part.
    #[inline]
    #[must_use]
    pub fn needs_previous_stage(&self) -> bool {
        self.previous_slot.is_some()
    }

    #[must_use]
    pub fn layout(&self, wave_size: WaveSize) -> ArgumentLayout {
        ArgumentLayout {
            reserved_sgprs: self.reserved_sgprs,
            counterpart_vgprs: self.counterpart_vgprs,
            wave_size,
        }
    }
}

/// Pure merge decisions per generation.
pub struct StageMergeResolver;

impl StageMergeResolver {
    #[must_use]
    pub fn resolve(query: &MergeQuery) -> MergeDecision {
        let merges = query.gfx.has_merged_stages();
        let ngg = query.shading == PrimitiveShading::Ngg && query.gfx.supports_ngg();

        match query.stage {
            ShaderStage::Vertex | ShaderStage::TessEval => {
                match query.next_stage {
                    Some(ShaderStage::TessCtrl) if query.stage == ShaderStage::Vertex => {
                        if merges {
                            MergeDecision::merged(
                                HwStage::Ls,
                                Some(MergedPair::LsHs),
                                MainPartSlot::PreTessellation,
                                LS_HS_COUNTERPART_VGPRS,
                            )
                        } else {
                            MergeDecision::standalone(HwStage::Ls, MainPartSlot::PreTessellation)
                        }
                    }
                    Some(ShaderStage::Geometry) => {
                        if ngg {
                            MergeDecision::merged(
                                HwStage::Es,
                                Some(MergedPair::EsGs),
                                MainPartSlot::NggPreGeometry,
                                ES_GS_COUNTERPART_VGPRS,
                            )
                        } else if merges {
                            MergeDecision::merged(
                                HwStage::Es,
                                Some(MergedPair::EsGs),
                                MainPartSlot::PreGeometry,
                                ES_GS_COUNTERPART_VGPRS,
                            )
                        } else {
                            MergeDecision::standalone(HwStage::Es, MainPartSlot::PreGeometry)
                        }
                    }
                    // An NGG vertex stage runs its own primitive assembly in the same
                    // invocation, laid out like an ES+GS pair without a previous stage.
                    _ if ngg => MergeDecision::merged(
                        HwStage::Ngg,
                        None,
                        MainPartSlot::Ngg,
                        ES_GS_COUNTERPART_VGPRS,
                    ),
                    _ => MergeDecision::standalone(HwStage::Vs, MainPartSlot::Plain),
                }
            }
            ShaderStage::TessCtrl => {
                if merges {
                    MergeDecision::merged(HwStage::Hs, Some(MergedPair::LsHs), MainPartSlot::Plain, 0)
                        .with_previous(
                            MainPartSlot::PreTessellation,
                            needs_phase_split(ThreadDomain::Vertices, ThreadDomain::PatchControlPoints),
                        )
                } else {
                    MergeDecision::standalone(HwStage::Hs, MainPartSlot::Plain)
                }
            }
            ShaderStage::Geometry => {
                let split = needs_phase_split(ThreadDomain::Vertices, ThreadDomain::Primitives);
                if ngg {
                    MergeDecision::merged(HwStage::Ngg, Some(MergedPair::EsGs), MainPartSlot::Ngg, 0)
                        .with_previous(MainPartSlot::NggPreGeometry, split)
                } else if merges {
                    MergeDecision::merged(HwStage::Gs, Some(MergedPair::EsGs), MainPartSlot::Plain, 0)
                        .with_previous(MainPartSlot::PreGeometry, split)
                } else {
                    MergeDecision::standalone(HwStage::Gs, MainPartSlot::Plain)
                }
            }
            ShaderStage::Fragment => MergeDecision::standalone(HwStage::Ps, MainPartSlot::Plain),
            ShaderStage::Compute => MergeDecision::standalone(HwStage::Cs, MainPartSlot::Plain),
        }
    }

    /// Shorthand for resolving the decision behind an existing key.
    #[must_use]
    pub fn resolve_key(gfx: GfxLevel, stage: ShaderStage, key: &ShaderKey) -> MergeDecision {
        Self::resolve(&MergeQuery::for_key(gfx, stage, key))
    }
}
