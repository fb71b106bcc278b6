//! Pipeline state and key construction.
//!
//! [`KeyBuilder::build`] is a pure function of the currently bound state: the
//! bound selectors of every stage plus the fixed-function state below. It
//! encodes exactly what can change generated code for one selector.

use std::sync::Arc;

use prism_core::key::{MAX_VERTEX_ATTRIBS, ngg_culling};
use prism_core::{
    AlphaFunc, ColorExportFormat, GeKey, GfxLevel, GePartKey, InterpMode, MAX_INLINABLE_UNIFORMS, PsKey,
    ShaderFeatures, ShaderKey, ShaderStage, TcsEpilogBits, VsPrologBits,
};

use crate::selector::ShaderSelector;
use crate::settings::CompilerSettings;

/// Maximum number of color render targets.
pub const MAX_COLOR_TARGETS: usize = prism_core::key::MAX_COLOR_BUFFERS;

// ─── Fixed-Function State ────────────────────────────────────────────────────

/// Bound vertex elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexElementState {
    pub instance_divisor_is_one: u16,
    pub instance_divisor_is_fetched: u16,
    /// Per-attribute fetch fixup opcode (0 = none).
    pub fix_fetch: [u8; MAX_VERTEX_ATTRIBS],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterizerState {
    pub two_side: bool,
    pub flatshade: bool,
    pub poly_stipple_enable: bool,
    pub line_smooth: bool,
    pub poly_smooth: bool,
    pub point_smooth: bool,
    pub clamp_fragment_color: bool,
    pub cull_front: bool,
    pub cull_back: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramebufferState {
    pub color_formats: [ColorExportFormat; MAX_COLOR_TARGETS],
    pub color_is_int8: u8,
    pub color_is_int10: u8,
    pub nr_cbufs: u8,
    pub nr_samples: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub alpha_to_one: bool,
    pub alpha_to_coverage: bool,
    pub dual_src_blend: bool,
    /// 4 bits per target: channels written to the render target.
    pub cb_target_mask: u32,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            alpha_to_one: false,
            alpha_to_coverage: false,
            dual_src_blend: false,
            cb_target_mask: u32::MAX,
        }
    }
}

/// Everything bound at draw time that key construction may read.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub vs: Option<Arc<ShaderSelector>>,
    pub tcs: Option<Arc<ShaderSelector>>,
    pub tes: Option<Arc<ShaderSelector>>,
    pub gs: Option<Arc<ShaderSelector>>,
    pub ps: Option<Arc<ShaderSelector>>,

    pub vertex_elements: VertexElementState,
    pub rasterizer: RasterizerState,
    pub framebuffer: FramebufferState,
    pub blend: BlendState,
    pub alpha_func: AlphaFunc,
    /// Minimum samples for per-sample shading (0 or 1 = off).
    pub min_samples: u8,
    /// Uniform values to inline, per stage.
    pub inlinable_uniforms: [Option<[u32; MAX_INLINABLE_UNIFORMS]>; 6],
}

impl PipelineState {
    #[must_use]
    pub fn bound(&self, stage: ShaderStage) -> Option<&Arc<ShaderSelector>> {
        match stage {
            ShaderStage::Vertex => self.vs.as_ref(),
            ShaderStage::TessCtrl => self.tcs.as_ref(),
            ShaderStage::TessEval => self.tes.as_ref(),
            ShaderStage::Geometry => self.gs.as_ref(),
            ShaderStage::Fragment => self.ps.as_ref(),
            ShaderStage::Compute => None,
        }
    }

    /// Bind `selector` to its own stage.
    pub fn bind(&mut self, selector: Arc<ShaderSelector>) {
        let slot = match selector.stage() {
            ShaderStage::Vertex => &mut self.vs,
            ShaderStage::TessCtrl => &mut self.tcs,
            ShaderStage::TessEval => &mut self.tes,
            ShaderStage::Geometry => &mut self.gs,
            ShaderStage::Fragment => &mut self.ps,
            ShaderStage::Compute => return,
        };
        *slot = Some(selector);
    }

    fn has_tess(&self) -> bool {
        self.tes.is_some()
    }

    /// Culling mode the NGG pipeline can compile in.
    fn ngg_culling(&self) -> u8 {
        let mut bits = 0;
        if self.rasterizer.cull_front {
            bits |= ngg_culling::FRONT_FACE;
        }
        if self.rasterizer.cull_back {
            bits |= ngg_culling::BACK_FACE;
        }
        bits
    }
}

// ─── KeyBuilder ──────────────────────────────────────────────────────────────

/// Builds [`ShaderKey`]s from bound state.
pub struct KeyBuilder;

impl KeyBuilder {
    /// Key for `selector` under `state`.
    #[must_use]
    pub fn build(selector: &ShaderSelector, state: &PipelineState, settings: &CompilerSettings) -> ShaderKey {
        let stage = selector.stage();
        let mut key = ShaderKey::for_stage(stage);
        match &mut key {
            ShaderKey::Ge(ge) => Self::build_ge(ge, selector, state, settings),
            ShaderKey::Ps(ps) => Self::build_ps(ps, selector, state, settings),
        }
        key
    }

    /// Selector merged in front of `selector` on this generation, if any.
    #[must_use]
    pub fn previous_stage(
        selector: &ShaderSelector,
        state: &PipelineState,
        settings: &CompilerSettings,
    ) -> Option<Arc<ShaderSelector>> {
        if !settings.gfx_level.has_merged_stages() {
            return None;
        }
        match selector.stage() {
            ShaderStage::TessCtrl => state.vs.clone(),
            ShaderStage::Geometry => state.tes.clone().or_else(|| state.vs.clone()),
            _ => None,
        }
    }

    fn vs_prolog_bits(state: &PipelineState, vs: &ShaderSelector) -> VsPrologBits {
        let mask = vs.info().input_mask();
        VsPrologBits {
            instance_divisor_is_one: state.vertex_elements.instance_divisor_is_one & mask,
            instance_divisor_is_fetched: state.vertex_elements.instance_divisor_is_fetched & mask,
            ls_vgpr_fix: false,
        }
    }

    fn build_ge(ge: &mut GeKey, selector: &ShaderSelector, state: &PipelineState, settings: &CompilerSettings) {
        let ngg = settings.ngg_enabled();
        let merges = settings.gfx_level.has_merged_stages();
        let info = selector.info();
        let mut last_stage = false;

        match selector.stage() {
            ShaderStage::Vertex => {
                ge.as_ls = state.tcs.is_some() || state.has_tess();
                ge.as_es = !ge.as_ls && state.gs.is_some();
                last_stage = !ge.as_ls && !ge.as_es;
                ge.as_ngg = ngg && !ge.as_ls;
                ge.part = GePartKey::Vs {
                    prolog: Self::vs_prolog_bits(state, selector),
                };
                let mask = usize::from(info.num_inputs).min(MAX_VERTEX_ATTRIBS);
                ge.mono.vs_fix_fetch[..mask].copy_from_slice(&state.vertex_elements.fix_fetch[..mask]);
                ge.mono.vs_export_prim_id = last_stage
                    && !ngg
                    && state
                        .ps
                        .as_ref()
                        .is_some_and(|ps| ps.info().has(ShaderFeatures::USES_PRIM_ID));
            }
            ShaderStage::TessCtrl => {
                let epilog = TcsEpilogBits {
                    prim_mode: state
                        .tes
                        .as_ref()
                        .map(|tes| tes.info().tess_prim_mode)
                        .unwrap_or_default(),
                    tes_reads_tess_factors: state
                        .tes
                        .as_ref()
                        .is_some_and(|tes| tes.info().tes_reads_tess_factors),
                };
                let (ls, ls_prolog) = match (&state.vs, merges) {
                    (Some(vs), true) => (Some(vs.id()), Self::vs_prolog_bits(state, vs)),
                    _ => (None, VsPrologBits::default()),
                };
                ge.part = GePartKey::Tcs {
                    ls,
                    ls_prolog,
                    epilog,
                };
            }
            ShaderStage::TessEval => {
                ge.as_es = state.gs.is_some();
                last_stage = !ge.as_es;
                ge.as_ngg = ngg;
            }
            ShaderStage::Geometry => {
                last_stage = true;
                ge.as_ngg = ngg;
                if merges {
                    let (es, vs_prolog) = match (&state.tes, &state.vs) {
                        (Some(tes), _) => (Some(tes.id()), VsPrologBits::default()),
                        (None, Some(vs)) => (Some(vs.id()), Self::vs_prolog_bits(state, vs)),
                        (None, None) => (None, VsPrologBits::default()),
                    };
                    ge.part = GePartKey::Gs { es, vs_prolog };
                }
            }
            ShaderStage::Fragment | ShaderStage::Compute => {}
        }

        if last_stage {
            if let Some(ps) = &state.ps {
                ge.opt.kill_outputs = info.outputs_written & !ps.info().inputs_read;
            }
            if ge.as_ngg && !info.uses_streamout() {
                ge.opt.ngg_culling = state.ngg_culling();
            }
        }
        Self::inline_uniforms(selector.stage(), state, &mut ge.opt.inline_uniforms, &mut ge.opt.inlined_uniform_values);
    }

    fn build_ps(ps: &mut PsKey, selector: &ShaderSelector, state: &PipelineState, settings: &CompilerSettings) {
        let info = selector.info();
        let rs = &state.rasterizer;
        let fb = &state.framebuffer;
        let reads_colors = info.colors_read != 0;

        // Prolog
        let prolog = &mut ps.part.prolog;
        prolog.color_two_side = rs.two_side && reads_colors;
        prolog.flatshade_colors = rs.flatshade
            && reads_colors
            && info.color_interpolate.contains(&InterpMode::Color);
        prolog.poly_stipple = rs.poly_stipple_enable;
        if state.min_samples > 1 {
            prolog.force_persp_sample_interp = true;
            prolog.force_linear_sample_interp = true;
            prolog.samplemask_log_ps_iter = state.min_samples.ilog2() as u8;
        }

        // Epilog
        let epilog = &mut ps.part.epilog;
        let written = u32::from(info.colors_written);
        for (i, format) in fb.color_formats.iter().enumerate().take(usize::from(fb.nr_cbufs)) {
            if written & (1 << i) != 0 {
                epilog.set_color_format(i, *format);
            }
        }
        epilog.color_is_int8 = fb.color_is_int8 & info.colors_written;
        epilog.color_is_int10 = fb.color_is_int10 & info.colors_written;
        epilog.last_cbuf = fb.nr_cbufs.saturating_sub(1);
        if info.colors_written & 1 != 0 {
            epilog.alpha_func = state.alpha_func;
        }
        epilog.alpha_to_one = state.blend.alpha_to_one && fb.nr_samples > 1;
        epilog.clamp_color = rs.clamp_fragment_color;
        epilog.dual_src_blend_swizzle =
            state.blend.dual_src_blend && settings.gfx_level >= GfxLevel::Gfx11;
        epilog.alpha_to_coverage_via_mrtz = state.blend.alpha_to_coverage
            && settings.gfx_level >= GfxLevel::Gfx11
            && (info.has(ShaderFeatures::WRITES_Z)
                || info.has(ShaderFeatures::WRITES_STENCIL)
                || info.has(ShaderFeatures::WRITES_SAMPLEMASK));
        epilog.kill_samplemask = fb.nr_samples <= 1 && info.has(ShaderFeatures::WRITES_SAMPLEMASK);

        // Mono
        let single_sample = fb.nr_samples <= 1;
        ps.mono.poly_line_smoothing = (rs.line_smooth || rs.poly_smooth) && single_sample;
        ps.mono.point_smoothing = rs.point_smooth && single_sample;

        // Opt: channels written by the shader that no target keeps.
        let mut written_channels = 0u32;
        for i in 0..MAX_COLOR_TARGETS {
            if written & (1 << i) != 0 {
                written_channels |= 0xf << (i * 4);
            }
        }
        ps.opt.kill_outputs = written_channels & !state.blend.cb_target_mask;
        Self::inline_uniforms(
            ShaderStage::Fragment,
            state,
            &mut ps.opt.inline_uniforms,
            &mut ps.opt.inlined_uniform_values,
        );
    }

    fn inline_uniforms(
        stage: ShaderStage,
        state: &PipelineState,
        enabled: &mut bool,
        values: &mut [u32; MAX_INLINABLE_UNIFORMS],
    ) {
        if let Some(snapshot) = state.inlinable_uniforms[stage as usize] {
            *enabled = true;
            *values = snapshot;
        }
    }
}
