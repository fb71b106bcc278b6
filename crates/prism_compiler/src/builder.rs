//! Variant Builder
//!
//! Turns one [`ShaderKey`] into a linked, uploaded [`LinkedShader`].
//!
//! # Split Compilation
//!
//! ```text
//! NeedMain ─▶ NeedPrologIfAny ─▶ NeedPreviousStageIfMerged ─▶ NeedEpilogIfAny ─▶ Linked
//!     │              │                      │                        │
//!     └──────────────┴──────────────────────┴────────────────────────┴─▶ Failed
//! ```
//!
//! Main parts come from the selector's task cells, prologs and epilogs from
//! the [`PartCache`](crate::part_cache::PartCache). The previous stage of a
//! merged pair is built inline through the previous selector's task cell;
//! nothing here waits on a queued job.
//!
//! # Monolithic Compilation
//!
//! Keys with `mono` or `opt` bits (or a device that asks for it) compile
//! one combined binary from the IR and the canonical key bytes.

use std::sync::Arc;

use prism_core::{
    HardwareLimits, PrismError, RegisterUsage, Result, ShaderKey, ShaderPartKey, ShaderStage,
    TcsEpilogBits, VsPrologBits, WaveSize,
};

use crate::backend::{CodegenOptions, CompileRequest, CompileTarget};
use crate::context::CompilerContext;
use crate::diagnostics::{DiagnosticSink, dump_key, dump_stats};
use crate::link::{LinkOutput, Linker, SegmentKind};
use crate::merge::{HwStage, MergeDecision, StageMergeResolver};
use crate::part_cache::ShaderPart;
use crate::parts::{ps_epilog_key, ps_prolog_key, tcs_epilog_key, vs_needs_prolog, vs_prolog_key};
use crate::selector::{GsCopyShader, MainPart, ShaderSelector};
use crate::settings::CompilerSettings;
use crate::variant::{LinkedParts, LinkedShader};
use crate::wave::{WaveRole, determine_wave_size};

/// Progress of a split build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    NeedMain,
    NeedPrologIfAny,
    NeedPreviousStageIfMerged,
    NeedEpilogIfAny,
    Linked,
    Failed,
}

/// Builds one variant on the calling thread.
pub struct VariantBuilder<'a> {
    ctx: &'a CompilerContext,
    selector: &'a ShaderSelector,
    previous: Option<&'a ShaderSelector>,
    key: ShaderKey,
    sink: &'a dyn DiagnosticSink,
    decision: MergeDecision,
    state: BuildState,

    // === Collected parts ===
    main: Option<Arc<MainPart>>,
    prolog: Option<Arc<ShaderPart>>,
    previous_main: Option<Arc<MainPart>>,
    epilog: Option<Arc<ShaderPart>>,
}

impl<'a> VariantBuilder<'a> {
    #[must_use]
    pub fn new(
        ctx: &'a CompilerContext,
        selector: &'a ShaderSelector,
        previous: Option<&'a ShaderSelector>,
        key: ShaderKey,
        sink: &'a dyn DiagnosticSink,
    ) -> Self {
        let decision = StageMergeResolver::resolve_key(ctx.settings().gfx_level, selector.stage(), &key);
        Self {
            ctx,
            selector,
            previous,
            key,
            sink,
            decision,
            state: BuildState::NeedMain,
            main: None,
            prolog: None,
            previous_main: None,
            epilog: None,
        }
    }

    /// Whether `key` is compiled as one combined binary.
    #[must_use]
    pub fn is_monolithic(settings: &CompilerSettings, key: &ShaderKey) -> bool {
        settings.use_monolithic_shaders || key.has_mono() || key.has_opt()
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> BuildState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn decision(&self) -> &MergeDecision {
        &self.decision
    }

    /// Build the variant. On error the builder ends in [`BuildState::Failed`].
    pub fn run(&mut self) -> Result<LinkedShader> {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{}", dump_key(self.selector.stage(), &self.key));
        }
        let result = if Self::is_monolithic(self.ctx.settings(), &self.key) {
            self.build_monolithic()
        } else {
            self.build_split()
        };
        self.state = if result.is_ok() {
            BuildState::Linked
        } else {
            BuildState::Failed
        };
        result
    }

    fn build_split(&mut self) -> Result<LinkedShader> {
        loop {
            self.state = match self.state {
                BuildState::NeedMain => self.fetch_main()?,
                BuildState::NeedPrologIfAny => self.fetch_prolog()?,
                BuildState::NeedPreviousStageIfMerged => self.fetch_previous_stage()?,
                BuildState::NeedEpilogIfAny => self.fetch_epilog()?,
                BuildState::Linked | BuildState::Failed => break,
            };
        }
        self.link()
    }

    // ─── Steps ───────────────────────────────────────────────────────────────

    fn main(&self) -> Result<Arc<MainPart>> {
        self.main
            .clone()
            .ok_or_else(|| PrismError::Link("no main part".into()))
    }

    fn fetch_main(&mut self) -> Result<BuildState> {
        self.main = Some(self.ctx.main_part(self.selector, self.decision.slot)?);
        Ok(BuildState::NeedPrologIfAny)
    }

    fn fetch_prolog(&mut self) -> Result<BuildState> {
        let main = self.main()?;
        let stage = self.selector.stage();
        let key = self.key;

        let part_key = match (stage, &key) {
            (ShaderStage::Vertex, ShaderKey::Ge(ge)) => {
                let bits = ge.part.vs_prolog().copied().unwrap_or_default();
                let info = self.selector.info();
                vs_needs_prolog(info, &bits).then(|| {
                    ShaderPartKey::VsProlog(vs_prolog_key(
                        info,
                        &bits,
                        main.num_input_sgprs,
                        main.wave_size,
                        ShaderStage::Vertex,
                        ge,
                    ))
                })
            }
            // The prolog of a merged pair belongs to its vertex half.
            (ShaderStage::TessCtrl | ShaderStage::Geometry, ShaderKey::Ge(ge))
                if self.decision.needs_previous_stage() =>
            {
                let previous = self.previous_selector()?;
                if previous.stage() == ShaderStage::Vertex {
                    let bits = match ge.part {
                        prism_core::GePartKey::Tcs { ls_prolog, .. } => ls_prolog,
                        prism_core::GePartKey::Gs { vs_prolog, .. } => vs_prolog,
                        _ => VsPrologBits::default(),
                    };
                    let previous_main = self.fetch_previous_main()?;
                    vs_needs_prolog(previous.info(), &bits).then(|| {
                        ShaderPartKey::VsProlog(vs_prolog_key(
                            previous.info(),
                            &bits,
                            previous_main.num_input_sgprs,
                            previous_main.wave_size,
                            stage,
                            ge,
                        ))
                    })
                } else {
                    None
                }
            }
            (ShaderStage::Fragment, ShaderKey::Ps(ps)) => {
                let key = ps_prolog_key(
                    self.selector.info(),
                    &ps.part.prolog,
                    main.num_input_sgprs,
                    main.wave_size,
                );
                key.is_needed().then_some(ShaderPartKey::PsProlog(key))
            }
            _ => None,
        };

        if let Some(key) = part_key {
            self.prolog = Some(self.ctx.shader_part(&key)?);
        }
        Ok(BuildState::NeedPreviousStageIfMerged)
    }

    fn fetch_previous_stage(&mut self) -> Result<BuildState> {
        if !self.decision.needs_previous_stage() {
            return Ok(BuildState::NeedEpilogIfAny);
        }
        let previous_main = self.fetch_previous_main()?;
        let main = self.main()?;
        if !previous_main.layout.compatible_with(&main.layout) {
            return Err(PrismError::Link(format!(
                "merged halves disagree: previous stage is wave{} with {} system SGPRs, \
                 {} is wave{} with {}",
                previous_main.wave_size.lanes(),
                previous_main.layout.reserved_sgprs,
                self.selector.stage().name(),
                main.wave_size.lanes(),
                main.layout.reserved_sgprs,
            )));
        }
        Ok(BuildState::NeedEpilogIfAny)
    }

    fn fetch_epilog(&mut self) -> Result<BuildState> {
        let main = self.main()?;
        let info = self.selector.info();
        let part_key = match &self.key {
            ShaderKey::Ge(ge) if self.selector.stage() == ShaderStage::TessCtrl => {
                let bits = match ge.part {
                    prism_core::GePartKey::Tcs { epilog, .. } => epilog,
                    _ => TcsEpilogBits::default(),
                };
                Some(ShaderPartKey::TcsEpilog(tcs_epilog_key(info, &bits, main.wave_size)))
            }
            ShaderKey::Ps(ps) => Some(ShaderPartKey::PsEpilog(ps_epilog_key(
                info,
                &ps.part.epilog,
                main.wave_size,
            ))),
            ShaderKey::Ge(_) => None,
        };
        if let Some(key) = part_key {
            self.epilog = Some(self.ctx.shader_part(&key)?);
        }
        Ok(BuildState::Linked)
    }

    // ─── Previous Stage ──────────────────────────────────────────────────────

    /// The merged previous-stage selector, checked against the key.
    fn previous_selector(&self) -> Result<&'a ShaderSelector> {
        let previous = self.previous.ok_or_else(|| {
            PrismError::Link(format!(
                "{} '{}' is merged but no previous stage is bound",
                self.selector.stage().name(),
                self.selector.name()
            ))
        })?;
        if let Some(id) = self.key.previous_stage()
            && id != previous.id()
        {
            return Err(PrismError::Link(format!(
                "previous stage {:?} does not match key ({id:?})",
                previous.id()
            )));
        }
        Ok(previous)
    }

    fn fetch_previous_main(&mut self) -> Result<Arc<MainPart>> {
        if let Some(part) = &self.previous_main {
            return Ok(Arc::clone(part));
        }
        let previous = self.previous_selector()?;
        let slot = self
            .decision
            .previous_slot
            .ok_or_else(|| PrismError::Link("stage is not merged".into()))?;
        log::debug!(
            "{}: building previous stage '{}' ({})",
            self.selector.name(),
            previous.name(),
            slot.name()
        );
        let part = self.ctx.main_part(previous, slot)?;
        self.previous_main = Some(Arc::clone(&part));
        Ok(part)
    }

    // ─── Link ────────────────────────────────────────────────────────────────

    fn link(&mut self) -> Result<LinkedShader> {
        let main = self.main()?;
        let wrapper = self.previous_main.as_ref().and(self.decision.wrapper);

        let mut linker = Linker::new(wrapper);
        if let Some(prolog) = &self.prolog {
            linker.push(SegmentKind::Prolog, prolog.code(), prolog.usage())?;
        }
        if let Some(previous) = &self.previous_main {
            linker.push(SegmentKind::PreviousStage, &previous.code, &previous.usage)?;
        }
        linker.push(SegmentKind::Main, &main.code, &main.usage)?;
        if let Some(epilog) = &self.epilog {
            linker.push(SegmentKind::Epilog, epilog.code(), epilog.usage())?;
        }
        let output = linker.finish()?;

        let parts = LinkedParts {
            prolog: self.prolog.clone(),
            previous_stage: self.previous_main.clone(),
            main: Some(Arc::clone(&main)),
            epilog: self.epilog.clone(),
        };
        self.finalize(
            output,
            main.layout,
            main.wave_size,
            (main.num_input_sgprs, main.num_input_vgprs),
            parts,
            main.gs_copy.clone(),
            false,
        )
    }

    fn build_monolithic(&mut self) -> Result<LinkedShader> {
        let settings = self.ctx.settings();
        let stage = self.selector.stage();
        let wave_size = determine_wave_size(settings, stage, WaveRole::for_key(&self.key), self.selector.info());
        let layout = self.decision.layout(wave_size);
        let previous_ir = if self.decision.needs_previous_stage() {
            Some(self.previous_selector()?.ir())
        } else {
            None
        };

        let compiled = self.ctx.compile(&CompileRequest {
            target: CompileTarget::Monolithic,
            stage,
            name: self.selector.name(),
            ir: Some(self.selector.ir()),
            previous_ir,
            layout,
            options: CodegenOptions {
                gfx: settings.gfx_level,
                wave_size,
                key_bytes: self.key.canonical_bytes(),
            },
        })?;

        let gs_copy = if self.decision.hw_stage == HwStage::Gs {
            Some(self.ctx.gs_copy(self.selector)?)
        } else {
            None
        };

        let mut linker = Linker::new(None);
        linker.push(SegmentKind::Main, &compiled.code, &compiled.usage)?;
        let output = linker.finish()?;
        self.finalize(
            output,
            layout,
            wave_size,
            (compiled.num_input_sgprs, compiled.num_input_vgprs),
            LinkedParts::default(),
            gs_copy,
            true,
        )
    }

    /// Fix up usage, enforce limits and upload.
    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        output: LinkOutput,
        layout: prism_core::ArgumentLayout,
        wave_size: WaveSize,
        (num_input_sgprs, num_input_vgprs): (u8, u8),
        parts: LinkedParts,
        gs_copy: Option<Arc<GsCopyShader>>,
        monolithic: bool,
    ) -> Result<LinkedShader> {
        let stage = self.selector.stage();
        let mut usage: RegisterUsage = output.usage;
        // Two extra SGPRs carry the scratch wave offset and VCC.
        usage.num_sgprs = usage.num_sgprs.max(u32::from(num_input_sgprs) + 2);
        if stage == ShaderStage::Fragment {
            usage.num_vgprs = usage.num_vgprs.max(u32::from(num_input_vgprs));
        }

        let limits = HardwareLimits::new(self.ctx.settings().gfx_level, wave_size);
        limits.check(stage, &usage)?;

        let allocation = self.ctx.uploader().upload(&output.code, self.selector.name())?;
        let shader = LinkedShader {
            stage,
            name: self.selector.name().to_owned(),
            code: output.code,
            segments: output.segments,
            wrapper: output.wrapper,
            usage,
            layout,
            wave_size,
            monolithic,
            parts,
            gs_copy,
            allocation,
            max_simd_waves: limits.max_simd_waves(&usage),
        };
        self.sink.message(log::Level::Debug, &dump_stats(&shader));
        Ok(shader)
    }
}
