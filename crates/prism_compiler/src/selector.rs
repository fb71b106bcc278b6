//! Shader Selector
//!
//! One [`ShaderSelector`] exists per API program object. It owns:
//!
//! - the IR handle and the read-only [`ShaderInfo`],
//! - one main-part slot per merge configuration ([`MainPartSlot`]),
//! - the list of variants built from it, guarded by its own lock,
//! - a completion fence for the initial compile started at creation.
//!
//! # Main-Part Slots
//!
//! Each slot is a small task cell: `Empty`, `Building` (with a fence other
//! jobs wait on) or `Ready`. Whichever job first needs a slot builds it on
//! its own thread; no selector lock is held while compiling, so a merged
//! variant can build its previous stage's slot inline without blocking the
//! previous selector's own variants. A failed or panicking build resets the
//! slot to `Empty` and wakes the waiters with the error; the next request
//! compiles again.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use prism_core::{
    ArgumentLayout, PrismError, RegisterUsage, Result, SelectorId, ShaderInfo, ShaderKey, ShaderStage, WaveSize,
};

use crate::fence::Fence;
use crate::ir::IrHandle;
use crate::merge::MainPartSlot;
use crate::upload::GpuAllocation;
use crate::variant::ShaderVariant;

// ─── Main Parts ──────────────────────────────────────────────────────────────

/// Copy shader of a legacy geometry stage.
///
/// Built once per geometry selector, on first use by either its plain main
/// part or a monolithic variant, and shared by every variant of that
/// selector through `Arc` clones; never mutated after construction.
#[derive(Debug)]
pub struct GsCopyShader {
    pub code: Vec<u8>,
    pub usage: RegisterUsage,
    pub wave_size: WaveSize,
    pub allocation: GpuAllocation,
}

/// Compiled shader body for one merge configuration.
#[derive(Debug)]
pub struct MainPart {
    pub slot: MainPartSlot,
    pub wave_size: WaveSize,
    pub layout: ArgumentLayout,
    pub code: Vec<u8>,
    pub usage: RegisterUsage,
    pub num_input_sgprs: u8,
    pub num_input_vgprs: u8,
    pub gs_copy: Option<Arc<GsCopyShader>>,
}

type MainFence = Fence<Result<Arc<MainPart>>>;

enum SlotState {
    Empty,
    Building(Arc<MainFence>),
    Ready(Arc<MainPart>),
}

enum Claim {
    Ready(Arc<MainPart>),
    Wait(Arc<MainFence>),
    Build(Arc<MainFence>),
}

// ─── ShaderSelector ──────────────────────────────────────────────────────────

/// All compiled state of one API shader program.
pub struct ShaderSelector {
    id: SelectorId,
    stage: ShaderStage,
    ir: IrHandle,
    info: ShaderInfo,
    slots: [Mutex<SlotState>; MainPartSlot::COUNT],
    variants: Mutex<Vec<Arc<ShaderVariant>>>,
    gs_copy: Mutex<Option<Arc<GsCopyShader>>>,
    ready: Fence<Result<()>>,
}

impl std::fmt::Debug for ShaderSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderSelector")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .field("name", &self.info.name)
            .finish_non_exhaustive()
    }
}

impl ShaderSelector {
    /// Fails when `info` does not name a stage.
    pub(crate) fn new(id: SelectorId, ir: IrHandle, info: ShaderInfo) -> Result<Self> {
        let stage = info
            .stage
            .ok_or_else(|| PrismError::Config(format!("shader info of '{}' has no stage", info.name)))?;
        Ok(Self {
            id,
            stage,
            ir,
            info,
            slots: std::array::from_fn(|_| Mutex::new(SlotState::Empty)),
            variants: Mutex::new(Vec::new()),
            gs_copy: Mutex::new(None),
            ready: Fence::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> SelectorId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    #[inline]
    #[must_use]
    pub fn ir(&self) -> &IrHandle {
        &self.ir
    }

    #[inline]
    #[must_use]
    pub fn info(&self) -> &ShaderInfo {
        &self.info
    }

    // ── Initial Compile ──────────────────────────────────────────────────────

    /// Block until the compile started at creation has finished.
    pub fn wait_ready(&self) -> Result<()> {
        self.ready.wait()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.is_signaled()
    }

    pub(crate) fn signal_ready(&self, result: Result<()>) {
        self.ready.signal(result);
    }

    // ── Main-Part Slots ──────────────────────────────────────────────────────

    /// The finished main part of `slot`, if any.
    #[must_use]
    pub fn main_part(&self, slot: MainPartSlot) -> Option<Arc<MainPart>> {
        match &*self.slots[slot.index()].lock() {
            SlotState::Ready(part) => Some(Arc::clone(part)),
            _ => None,
        }
    }

    /// Slots holding a finished main part.
    #[must_use]
    pub fn populated_slots(&self) -> Vec<MainPartSlot> {
        MainPartSlot::ALL
            .into_iter()
            .filter(|slot| self.main_part(*slot).is_some())
            .collect()
    }

    /// Return the main part of `slot`, building it with `build` if the slot
    /// is empty, or waiting for the job that is already building it.
    pub fn get_or_build_main<F>(&self, slot: MainPartSlot, build: F) -> Result<Arc<MainPart>>
    where
        F: FnOnce() -> Result<Arc<MainPart>>,
    {
        let claim = {
            let mut state = self.slots[slot.index()].lock();
            let claim = match &*state {
                SlotState::Ready(part) => Claim::Ready(Arc::clone(part)),
                SlotState::Building(fence) => Claim::Wait(Arc::clone(fence)),
                SlotState::Empty => Claim::Build(Arc::new(Fence::new())),
            };
            if let Claim::Build(fence) = &claim {
                *state = SlotState::Building(Arc::clone(fence));
            }
            claim
        };

        let fence = match claim {
            Claim::Ready(part) => return Ok(part),
            Claim::Wait(fence) => {
                log::trace!("{}: waiting for {} main part", self.info.name, slot.name());
                return fence.wait();
            }
            Claim::Build(fence) => fence,
        };

        let result = panic::catch_unwind(AssertUnwindSafe(build)).unwrap_or_else(|payload| {
            log::error!("{}: {} main part build panicked", self.info.name, slot.name());
            Err(PrismError::from_panic("main", payload.as_ref()))
        });
        *self.slots[slot.index()].lock() = match &result {
            Ok(part) => SlotState::Ready(Arc::clone(part)),
            Err(_) => SlotState::Empty,
        };
        fence.signal(result.clone());
        result
    }

    /// The shared copy shader, built with `build` on first use. The lock is
    /// held while building so concurrent variants compile it once.
    pub fn get_or_build_gs_copy<F>(&self, build: F) -> Result<Arc<GsCopyShader>>
    where
        F: FnOnce() -> Result<Arc<GsCopyShader>>,
    {
        let mut slot = self.gs_copy.lock();
        if let Some(copy) = &*slot {
            return Ok(Arc::clone(copy));
        }
        let copy = build()?;
        *slot = Some(Arc::clone(&copy));
        Ok(copy)
    }

    // ── Variants ─────────────────────────────────────────────────────────────

    /// Find the variant for `key`, or insert the one produced by `create`.
    ///
    /// When `key` inlines uniforms and `max_inline_variants` variants already
    /// differ from it only in inlined values, inlining is dropped from the key
    /// before the lookup. Returns the variant and whether it was created.
    pub fn find_or_insert_variant<F>(
        &self,
        key: ShaderKey,
        max_inline_variants: usize,
        create: F,
    ) -> (Arc<ShaderVariant>, bool)
    where
        F: FnOnce(ShaderKey) -> Arc<ShaderVariant>,
    {
        let mut variants = self.variants.lock();
        if let Some(v) = variants.iter().find(|v| *v.key() == key) {
            return (Arc::clone(v), false);
        }

        let mut key = key;
        if key.inline_uniforms() {
            let base = key.canonical_bytes_without_uniforms();
            let siblings = variants
                .iter()
                .filter(|v| v.key().canonical_bytes_without_uniforms() == base)
                .count();
            if siblings >= max_inline_variants {
                log::debug!(
                    "{}: {siblings} inlined-uniform variants, disabling inlining",
                    self.info.name
                );
                key = key.without_inlined_uniforms();
                if let Some(v) = variants.iter().find(|v| *v.key() == key) {
                    return (Arc::clone(v), false);
                }
            }
        }

        let variant = create(key);
        variants.push(Arc::clone(&variant));
        (variant, true)
    }

    /// Existing variant for `key`.
    #[must_use]
    pub fn find_variant(&self, key: &ShaderKey) -> Option<Arc<ShaderVariant>> {
        self.variants
            .lock()
            .iter()
            .find(|v| v.key() == key)
            .map(Arc::clone)
    }

    /// Drop a failed variant so the next request retries.
    pub(crate) fn remove_variant(&self, variant: &Arc<ShaderVariant>) {
        self.variants.lock().retain(|v| !Arc::ptr_eq(v, variant));
    }

    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.variants.lock().len()
    }

    /// Snapshot of the current variant list.
    #[must_use]
    pub fn variants(&self) -> Vec<Arc<ShaderVariant>> {
        self.variants.lock().clone()
    }
}
