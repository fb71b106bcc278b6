//! Diagnostic sinks and on-demand dumps.
//!
//! Compiler messages go to a [`DiagnosticSink`]. The device owns one (by
//! default a [`LogSink`]) and a request may attach its own. The `dump_*`
//! helpers are pure formatting.

use std::fmt::Write as _;

use serde::Serialize;

use prism_core::{GePartKey, RegisterUsage, ShaderKey, ShaderStage};

use crate::variant::LinkedShader;

/// Receiver of compiler messages.
pub trait DiagnosticSink: Send + Sync {
    fn message(&self, level: log::Level, text: &str);
}

/// Forwards messages to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn message(&self, level: log::Level, text: &str) {
        log::log!(target: "prism::compiler", level, "{text}");
    }
}

/// Human-readable key contents, one field per line.
#[must_use]
pub fn dump_key(stage: ShaderStage, key: &ShaderKey) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "SHADER KEY ({})", stage.name());
    match key {
        ShaderKey::Ge(ge) => {
            let _ = writeln!(
                out,
                "  as_ls = {}, as_es = {}, as_ngg = {}",
                ge.as_ls, ge.as_es, ge.as_ngg
            );
            match &ge.part {
                GePartKey::None => {}
                GePartKey::Vs { prolog } => {
                    let _ = writeln!(out, "  part.vs.prolog = {prolog:?}");
                }
                GePartKey::Tcs { ls, ls_prolog, epilog } => {
                    let _ = writeln!(out, "  part.tcs.ls = {ls:?}");
                    let _ = writeln!(out, "  part.tcs.ls_prolog = {ls_prolog:?}");
                    let _ = writeln!(out, "  part.tcs.epilog = {epilog:?}");
                }
                GePartKey::Gs { es, vs_prolog } => {
                    let _ = writeln!(out, "  part.gs.es = {es:?}");
                    let _ = writeln!(out, "  part.gs.vs_prolog = {vs_prolog:?}");
                }
            }
            let _ = writeln!(out, "  mono.vs_fix_fetch = {:?}", ge.mono.vs_fix_fetch);
            let _ = writeln!(out, "  mono.vs_export_prim_id = {}", ge.mono.vs_export_prim_id);
            let _ = writeln!(out, "  opt.kill_outputs = {:#018x}", ge.opt.kill_outputs);
            let _ = writeln!(out, "  opt.ngg_culling = {:#04x}", ge.opt.ngg_culling);
            let _ = writeln!(out, "  opt.remove_streamout = {}", ge.opt.remove_streamout);
            let _ = writeln!(
                out,
                "  opt.inline_uniforms = {} {:?}",
                ge.opt.inline_uniforms, ge.opt.inlined_uniform_values
            );
        }
        ShaderKey::Ps(ps) => {
            let _ = writeln!(out, "  part.ps.prolog = {:?}", ps.part.prolog);
            let _ = writeln!(out, "  part.ps.epilog = {:?}", ps.part.epilog);
            let _ = writeln!(out, "  mono = {:?}", ps.mono);
            let _ = writeln!(out, "  opt.kill_outputs = {:#010x}", ps.opt.kill_outputs);
            let _ = writeln!(out, "  opt.prefer_mono = {}", ps.opt.prefer_mono);
            let _ = writeln!(
                out,
                "  opt.inline_uniforms = {} {:?}",
                ps.opt.inline_uniforms, ps.opt.inlined_uniform_values
            );
        }
    }
    out
}

/// Machine-readable statistics of a linked shader.
#[derive(Debug, Clone, Serialize)]
pub struct ShaderStats<'a> {
    pub name: &'a str,
    pub stage: ShaderStage,
    pub wave_size: u32,
    pub monolithic: bool,
    pub code_size: usize,
    pub segments: Vec<&'static str>,
    pub two_phase: bool,
    pub usage: RegisterUsage,
    pub max_simd_waves: u32,
}

impl<'a> ShaderStats<'a> {
    #[must_use]
    pub fn new(shader: &'a LinkedShader) -> Self {
        Self {
            name: &shader.name,
            stage: shader.stage,
            wave_size: shader.wave_size.lanes(),
            monolithic: shader.monolithic,
            code_size: shader.code.len(),
            segments: shader.order().map(|k| k.name()).collect(),
            two_phase: shader.wrapper.is_some(),
            usage: shader.usage,
            max_simd_waves: shader.max_simd_waves,
        }
    }
}

/// One-line statistics summary.
#[must_use]
pub fn dump_stats(shader: &LinkedShader) -> String {
    let u = &shader.usage;
    format!(
        "{} ({}): {} SGPRs, {} VGPRs, spilled {}/{}, scratch {} B/wave, LDS {} B, \
         code {} B, wave{}, max waves/SIMD {}{}",
        shader.name,
        shader.stage.name(),
        u.num_sgprs,
        u.num_vgprs,
        u.spilled_sgprs,
        u.spilled_vgprs,
        u.scratch_bytes_per_wave,
        u.lds_size,
        shader.code.len(),
        shader.wave_size.lanes(),
        shader.max_simd_waves,
        if shader.monolithic { ", monolithic" } else { "" },
    )
}

/// Statistics as JSON.
#[must_use]
pub fn stats_json(shader: &LinkedShader) -> serde_json::Value {
    serde_json::to_value(ShaderStats::new(shader)).unwrap_or(serde_json::Value::Null)
}
