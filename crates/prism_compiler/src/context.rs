//! Compiler Context
//!
//! Device-wide state shared by every compile job:
//!
//! | Member        | Purpose                                               |
//! |---------------|-------------------------------------------------------|
//! | `settings`    | [`CompilerSettings`], fixed at device creation        |
//! | `backend`     | the active [`CodegenBackend`]                         |
//! | `parts`       | prolog/epilog [`PartCache`]                           |
//! | `mains`       | main parts memoised by IR content, slot and wave size |
//! | `uploader`    | [`GpuUploader`] for linked binaries                   |
//! | `sink`        | default [`DiagnosticSink`]                            |
//!
//! The context also executes [`CompileJob`]s; the pipeline only decides on
//! which thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use prism_core::{
    PartCategory, PrismError, Result, ShaderFeatures, ShaderPartKey, ShaderStage, WaveSize,
};

use crate::backend::{CodegenBackend, CodegenOptions, CompileRequest, CompileTarget, CompiledCode};
use crate::builder::VariantBuilder;
use crate::diagnostics::DiagnosticSink;
use crate::merge::{HwStage, MainPartSlot, MergeQuery, StageMergeResolver};
use crate::part_cache::{PartCache, ShaderPart};
use crate::queue::CompileJob;
use crate::selector::{GsCopyShader, MainPart, ShaderSelector};
use crate::settings::CompilerSettings;
use crate::upload::GpuUploader;
use crate::wave::{WaveRole, determine_wave_size};

/// IR content hash, stage, slot and wave size.
type MainCacheKey = (u128, ShaderStage, MainPartSlot, WaveSize);

pub struct CompilerContext {
    settings: CompilerSettings,
    backend: Arc<dyn CodegenBackend>,
    parts: PartCache,
    mains: Mutex<FxHashMap<MainCacheKey, Arc<MainPart>>>,
    uploader: Arc<dyn GpuUploader>,
    sink: Arc<dyn DiagnosticSink>,
}

impl CompilerContext {
    #[must_use]
    pub fn new(
        settings: CompilerSettings,
        backend: Arc<dyn CodegenBackend>,
        uploader: Arc<dyn GpuUploader>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        log::info!(
            "Compiler context: {:?}, backend '{}', NGG {}",
            settings.gfx_level,
            backend.label(),
            if settings.ngg_enabled() { "on" } else { "off" }
        );
        Self {
            settings,
            backend,
            parts: PartCache::new(),
            mains: Mutex::new(FxHashMap::default()),
            uploader,
            sink,
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn part_cache(&self) -> &PartCache {
        &self.parts
    }

    #[inline]
    #[must_use]
    pub fn uploader(&self) -> &dyn GpuUploader {
        self.uploader.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    /// Main parts memoised by IR content.
    #[must_use]
    pub fn main_cache_len(&self) -> usize {
        self.mains.lock().len()
    }

    // ─── Backend ─────────────────────────────────────────────────────────────

    /// Run one backend request, naming the failing part on error.
    pub fn compile(&self, request: &CompileRequest<'_>) -> Result<CompiledCode> {
        log::trace!(
            "{}: compiling {} ({:?}, wave{})",
            request.name,
            request.target.part_name(),
            request.stage,
            request.options.wave_size.lanes()
        );
        self.backend
            .compile(request)
            .map_err(|message| PrismError::compile(request.target.part_name(), message))
    }

    // ─── Parts ───────────────────────────────────────────────────────────────

    /// Cached prolog or epilog for `key`.
    pub fn shader_part(&self, key: &ShaderPartKey) -> Result<Arc<ShaderPart>> {
        self.parts.get_or_build(key, |key| {
            let stage = match key.category() {
                PartCategory::VsProlog => ShaderStage::Vertex,
                PartCategory::TcsEpilog => ShaderStage::TessCtrl,
                PartCategory::PsProlog | PartCategory::PsEpilog => ShaderStage::Fragment,
            };
            let wave_size = if key.wave32() {
                WaveSize::Wave32
            } else {
                WaveSize::Wave64
            };
            self.compile(&CompileRequest {
                target: CompileTarget::Part(*key),
                stage,
                name: key.name(),
                ir: None,
                previous_ir: None,
                layout: prism_core::ArgumentLayout::standalone(wave_size),
                options: CodegenOptions {
                    gfx: self.settings.gfx_level,
                    wave_size,
                    key_bytes: Default::default(),
                },
            })
        })
    }

    // ─── Main Parts ──────────────────────────────────────────────────────────

    /// Main part of `selector` for `slot`, built through the selector's task
    /// cell on first use.
    pub fn main_part(&self, selector: &ShaderSelector, slot: MainPartSlot) -> Result<Arc<MainPart>> {
        selector.get_or_build_main(slot, || self.build_main(selector, slot))
    }

    fn build_main(&self, selector: &ShaderSelector, slot: MainPartSlot) -> Result<Arc<MainPart>> {
        let stage = selector.stage();
        let gfx = self.settings.gfx_level;
        let wave_size = determine_wave_size(&self.settings, stage, WaveRole::for_slot(slot), selector.info());
        let cache_key = (selector.ir().content_hash(), stage, slot, wave_size);

        if let Some(part) = self.mains.lock().get(&cache_key) {
            log::debug!("{}: {} main part found by IR content", selector.name(), slot.name());
            return Ok(Arc::clone(part));
        }

        let decision = StageMergeResolver::resolve(&MergeQuery::for_slot(gfx, stage, slot));
        let layout = decision.layout(wave_size);
        let compiled = self.compile(&CompileRequest {
            target: CompileTarget::Main(slot),
            stage,
            name: selector.name(),
            ir: Some(selector.ir()),
            previous_ir: None,
            layout,
            options: CodegenOptions {
                gfx,
                wave_size,
                key_bytes: Default::default(),
            },
        })?;

        let gs_copy = if decision.hw_stage == HwStage::Gs {
            Some(self.gs_copy(selector)?)
        } else {
            None
        };

        let part = Arc::new(MainPart {
            slot,
            wave_size,
            layout,
            code: compiled.code,
            usage: compiled.usage,
            num_input_sgprs: compiled.num_input_sgprs,
            num_input_vgprs: compiled.num_input_vgprs,
            gs_copy,
        });
        log::debug!(
            "{}: {} main part compiled ({} bytes, wave{})",
            selector.name(),
            slot.name(),
            part.code.len(),
            wave_size.lanes()
        );
        Ok(Arc::clone(
            self.mains.lock().entry(cache_key).or_insert(part),
        ))
    }

    /// Copy shader of a legacy geometry stage, shared through the selector.
    pub(crate) fn gs_copy(&self, selector: &ShaderSelector) -> Result<Arc<GsCopyShader>> {
        selector.get_or_build_gs_copy(|| self.build_gs_copy(selector))
    }

    /// Legacy geometry is wave64.
    fn build_gs_copy(&self, selector: &ShaderSelector) -> Result<Arc<GsCopyShader>> {
        let wave_size = WaveSize::Wave64;
        let compiled = self.compile(&CompileRequest {
            target: CompileTarget::GsCopy,
            stage: ShaderStage::Geometry,
            name: selector.name(),
            ir: Some(selector.ir()),
            previous_ir: None,
            layout: prism_core::ArgumentLayout::standalone(wave_size),
            options: CodegenOptions {
                gfx: self.settings.gfx_level,
                wave_size,
                key_bytes: Default::default(),
            },
        })?;
        let label = format!("{} (gs copy)", selector.name());
        let allocation = self.uploader.upload(&compiled.code, &label)?;
        Ok(Arc::new(GsCopyShader {
            code: compiled.code,
            usage: compiled.usage,
            wave_size,
            allocation,
        }))
    }

    /// Slot the creation-time compile guesses for `selector` from its
    /// next-stage property.
    #[must_use]
    pub fn initial_slot(&self, selector: &ShaderSelector) -> MainPartSlot {
        let info = selector.info();
        let ngg = self.settings.ngg_enabled();
        let pre_geometry = if ngg {
            MainPartSlot::NggPreGeometry
        } else {
            MainPartSlot::PreGeometry
        };
        let last = if ngg { MainPartSlot::Ngg } else { MainPartSlot::Plain };
        let writes_position = info.has(ShaderFeatures::WRITES_POSITION);

        match selector.stage() {
            ShaderStage::Vertex => match info.next_stage {
                Some(ShaderStage::Geometry) => pre_geometry,
                Some(ShaderStage::TessCtrl) => MainPartSlot::PreTessellation,
                _ if !writes_position && !info.uses_streamout() => MainPartSlot::PreTessellation,
                _ => last,
            },
            ShaderStage::TessEval => match info.next_stage {
                Some(ShaderStage::Geometry) => pre_geometry,
                _ if !writes_position => pre_geometry,
                _ => last,
            },
            ShaderStage::Geometry => last,
            _ => MainPartSlot::Plain,
        }
    }

    // ─── Jobs ────────────────────────────────────────────────────────────────

    /// Run one job to completion and publish its outcome. A panic inside the
    /// backend is published as a [`PrismError::Compile`].
    pub fn execute(&self, job: CompileJob) {
        match job {
            CompileJob::InitialCompile { selector } => {
                let slot = self.initial_slot(&selector);
                let result = self.main_part(&selector, slot).map(|_| ());
                if let Err(e) = &result {
                    log::warn!("{}: initial {} compile failed: {e}", selector.name(), slot.name());
                }
                selector.signal_ready(result);
            }
            CompileJob::BuildVariant {
                variant,
                selector,
                previous,
                sink,
            } => {
                let sink = sink.unwrap_or_else(|| Arc::clone(&self.sink));
                let mut builder =
                    VariantBuilder::new(self, &selector, previous.as_deref(), *variant.key(), sink.as_ref());
                let result = panic::catch_unwind(AssertUnwindSafe(|| builder.run()))
                    .unwrap_or_else(|payload| Err(PrismError::from_panic("variant", payload.as_ref())))
                    .map(Arc::new);
                if let Err(e) = &result {
                    let level = if e.is_fatal() {
                        log::Level::Error
                    } else {
                        log::Level::Warn
                    };
                    sink.message(level, &format!("{}: variant build failed: {e}", selector.name()));
                    selector.remove_variant(&variant);
                }
                variant.complete(result);
            }
        }
    }
}

impl std::fmt::Debug for CompilerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerContext")
            .field("settings", &self.settings)
            .field("backend", &self.backend.label())
            .finish_non_exhaustive()
    }
}
