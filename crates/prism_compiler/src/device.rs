//! Compiler Device
//!
//! The entry point: owns the [`CompilerContext`] and the
//! [`AsyncCompilePipeline`], creates selectors and hands out variants.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let device = Device::new(CompilerSettings::default(), backend)?;
//! let ps = device.create_selector(ir, info)?;
//!
//! let mut state = PipelineState::default();
//! state.bind(Arc::clone(&ps));
//!
//! let variant = device.request_variant(&ps, &state)?;
//! let shader = variant.wait()?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use prism_core::{PrismError, Result, SelectorId, ShaderInfo, ShaderKey};

use crate::backend::CodegenBackend;
use crate::builder::VariantBuilder;
use crate::context::CompilerContext;
use crate::diagnostics::{DiagnosticSink, LogSink};
use crate::ir::IrHandle;
use crate::part_cache::PartCache;
use crate::queue::{AsyncCompilePipeline, CompileJob, Priority};
use crate::selector::ShaderSelector;
use crate::settings::CompilerSettings;
use crate::state::{KeyBuilder, PipelineState};
use crate::upload::{GpuUploader, HostUploader};
use crate::variant::{ShaderVariant, VariantResult};

pub struct Device {
    ctx: Arc<CompilerContext>,
    pipeline: AsyncCompilePipeline,
    next_id: AtomicU64,
}

impl Device {
    /// Device with a [`HostUploader`] and a [`LogSink`].
    pub fn new(settings: CompilerSettings, backend: Arc<dyn CodegenBackend>) -> Result<Self> {
        let uploader = Arc::new(HostUploader::new(settings.upload_capacity));
        Self::with_parts(settings, backend, uploader, Arc::new(LogSink))
    }

    /// Fails when `settings.backend_label` names a different backend.
    pub fn with_parts(
        settings: CompilerSettings,
        backend: Arc<dyn CodegenBackend>,
        uploader: Arc<dyn GpuUploader>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        if let Some(label) = &settings.backend_label
            && label != backend.label()
        {
            return Err(PrismError::Config(format!(
                "backend '{}' does not match the configured '{label}'",
                backend.label()
            )));
        }
        let ctx = Arc::new(CompilerContext::new(settings, backend, uploader, sink));
        let pipeline = AsyncCompilePipeline::new(Arc::clone(&ctx))?;
        Ok(Self {
            ctx,
            pipeline,
            next_id: AtomicU64::new(1),
        })
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &CompilerSettings {
        self.ctx.settings()
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &Arc<CompilerContext> {
        &self.ctx
    }

    #[inline]
    #[must_use]
    pub fn part_cache(&self) -> &PartCache {
        self.ctx.part_cache()
    }

    // ─── Selectors ───────────────────────────────────────────────────────────

    /// Create a selector and queue the compile of its guessed main part.
    pub fn create_selector(&self, ir: IrHandle, info: ShaderInfo) -> Result<Arc<ShaderSelector>> {
        let id = SelectorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let selector = Arc::new(ShaderSelector::new(id, ir, info)?);
        log::debug!(
            "Created {} selector '{}' ({id:?})",
            selector.stage().name(),
            selector.name()
        );
        self.pipeline.submit(
            CompileJob::InitialCompile {
                selector: Arc::clone(&selector),
            },
            Priority::Normal,
        )?;
        Ok(selector)
    }

    // ─── Variants ────────────────────────────────────────────────────────────

    /// Variant of `selector` for the bound `state`, queued if new.
    pub fn request_variant(&self, selector: &Arc<ShaderSelector>, state: &PipelineState) -> Result<Arc<ShaderVariant>> {
        let settings = self.settings();
        let key = KeyBuilder::build(selector, state, settings);
        let previous = KeyBuilder::previous_stage(selector, state, settings);
        self.request_variant_with_key(selector, key, previous, None)
    }

    /// Variant of `selector` for an explicit key.
    ///
    /// `previous` is the merged previous-stage selector, `sink` an optional
    /// per-request diagnostic sink.
    pub fn request_variant_with_key(
        &self,
        selector: &Arc<ShaderSelector>,
        key: ShaderKey,
        previous: Option<Arc<ShaderSelector>>,
        sink: Option<Arc<dyn DiagnosticSink>>,
    ) -> Result<Arc<ShaderVariant>> {
        let settings = self.settings();
        let key = if settings.disable_opt_variants {
            key.without_opt()
        } else {
            key
        };

        let stage = selector.stage();
        let (variant, created) =
            selector.find_or_insert_variant(key, settings.max_inline_uniform_variants, |key| {
                Arc::new(ShaderVariant::new(
                    selector.id(),
                    stage,
                    key,
                    VariantBuilder::is_monolithic(settings, &key),
                    previous.clone(),
                ))
            });
        if !created {
            return Ok(variant);
        }

        let priority = if variant.is_optimized() {
            Priority::Low
        } else {
            Priority::Normal
        };
        log::debug!(
            "{}: new {} variant ({} total, key hash {:#018x})",
            selector.name(),
            if variant.is_optimized() { "optimized" } else { "unoptimized" },
            selector.variant_count(),
            variant.key().fast_hash()
        );
        let job = CompileJob::BuildVariant {
            variant: Arc::clone(&variant),
            selector: Arc::clone(selector),
            previous,
            sink,
        };
        if let Err(e) = self.pipeline.submit(job, priority) {
            selector.remove_variant(&variant);
            return Err(e);
        }
        Ok(variant)
    }

    /// Variant usable for drawing with `state` right now.
    ///
    /// An optimised variant that is still compiling (or failed) is replaced
    /// by the unoptimised variant of the same key, which is waited for.
    pub fn select_variant(&self, selector: &Arc<ShaderSelector>, state: &PipelineState) -> VariantResult {
        let settings = self.settings();
        let key = KeyBuilder::build(selector, state, settings);
        let previous = KeyBuilder::previous_stage(selector, state, settings);
        self.select_variant_with_key(selector, key, previous)
    }

    pub fn select_variant_with_key(
        &self,
        selector: &Arc<ShaderSelector>,
        key: ShaderKey,
        previous: Option<Arc<ShaderSelector>>,
    ) -> VariantResult {
        let variant = self.request_variant_with_key(selector, key, previous.clone(), None)?;
        if !variant.is_optimized() {
            return variant.wait();
        }
        if let Some(Ok(shader)) = variant.try_result() {
            return Ok(shader);
        }
        log::trace!("{}: optimized variant pending, using fallback", selector.name());
        self.request_variant_with_key(selector, variant.key().without_opt(), previous, None)?
            .wait()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.pipeline.is_shut_down()
    }

    /// Stop accepting jobs and wait until every queued job has run.
    pub fn shutdown(&self) {
        self.pipeline.shutdown();
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}
