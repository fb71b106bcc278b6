//! Shader variants and their linked binaries.

use std::sync::Arc;

use smallvec::SmallVec;

use prism_core::{ArgumentLayout, RegisterUsage, Result, SelectorId, ShaderKey, ShaderStage, WaveSize};

use crate::fence::Fence;
use crate::link::{Segment, SegmentKind};
use crate::merge::WrapperPlan;
use crate::part_cache::ShaderPart;
use crate::selector::{GsCopyShader, MainPart, ShaderSelector};
use crate::upload::GpuAllocation;

/// Parts a split-compiled variant was linked from.
#[derive(Debug, Clone, Default)]
pub struct LinkedParts {
    pub prolog: Option<Arc<ShaderPart>>,
    pub previous_stage: Option<Arc<MainPart>>,
    pub main: Option<Arc<MainPart>>,
    pub epilog: Option<Arc<ShaderPart>>,
}

/// A linked, uploaded binary for one key.
#[derive(Debug)]
pub struct LinkedShader {
    pub stage: ShaderStage,
    pub name: String,
    pub code: Vec<u8>,
    pub segments: SmallVec<[Segment; 4]>,
    pub wrapper: Option<WrapperPlan>,
    /// Pointwise maximum over every linked part.
    pub usage: RegisterUsage,
    pub layout: ArgumentLayout,
    pub wave_size: WaveSize,
    pub monolithic: bool,
    pub parts: LinkedParts,
    pub gs_copy: Option<Arc<GsCopyShader>>,
    pub allocation: GpuAllocation,
    pub max_simd_waves: u32,
}

impl LinkedShader {
    /// Segment kinds in binary order.
    pub fn order(&self) -> impl Iterator<Item = SegmentKind> + '_ {
        self.segments.iter().map(|s| s.kind)
    }

    #[must_use]
    pub fn segment_bytes(&self, kind: SegmentKind) -> Option<&[u8]> {
        self.segments
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| &self.code[s.offset..s.offset + s.len])
    }
}

/// Result published through a variant's completion fence.
pub type VariantResult = Result<Arc<LinkedShader>>;

/// One entry of a selector's variant list.
///
/// The variant references its selector by id; the previous-stage selector of
/// a merged variant is held strongly so it outlives the build.
pub struct ShaderVariant {
    selector: SelectorId,
    stage: ShaderStage,
    key: ShaderKey,
    monolithic: bool,
    previous: Option<Arc<ShaderSelector>>,
    fence: Fence<VariantResult>,
}

impl std::fmt::Debug for ShaderVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderVariant")
            .field("selector", &self.selector)
            .field("stage", &self.stage)
            .field("monolithic", &self.monolithic)
            .field("ready", &self.fence.is_signaled())
            .finish_non_exhaustive()
    }
}

impl ShaderVariant {
    pub(crate) fn new(
        selector: SelectorId,
        stage: ShaderStage,
        key: ShaderKey,
        monolithic: bool,
        previous: Option<Arc<ShaderSelector>>,
    ) -> Self {
        Self {
            selector,
            stage,
            key,
            monolithic,
            previous,
            fence: Fence::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn selector_id(&self) -> SelectorId {
        self.selector
    }

    #[inline]
    #[must_use]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> &ShaderKey {
        &self.key
    }

    #[inline]
    #[must_use]
    pub fn is_monolithic(&self) -> bool {
        self.monolithic
    }

    /// Built with optimisation opt-ins; compiled on the low-priority queue.
    #[inline]
    #[must_use]
    pub fn is_optimized(&self) -> bool {
        self.key.has_opt()
    }

    #[must_use]
    pub fn previous_stage(&self) -> Option<&Arc<ShaderSelector>> {
        self.previous.as_ref()
    }

    /// Block until the build has finished.
    pub fn wait(&self) -> VariantResult {
        self.fence.wait()
    }

    /// The outcome, if the build has finished.
    #[must_use]
    pub fn try_result(&self) -> Option<VariantResult> {
        self.fence.try_get()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.fence.is_signaled()
    }

    pub(crate) fn complete(&self, result: VariantResult) {
        self.fence.signal(result);
    }
}
