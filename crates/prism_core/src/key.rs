//! Shader Variant Keys
//!
//! A [`ShaderKey`] encodes exactly the pipeline state that can change the
//! code generated for one shader program, and nothing else. Two variants
//! built from equal keys are byte-identical; every cache in the compiler is
//! built on that guarantee.
//!
//! # Layout
//!
//! The key is a tagged variant with one payload per stage category:
//!
//! | Variant | Stages | Payload |
//! |---------|--------|---------|
//! | [`ShaderKey::Ge`] | vertex, tess ctrl, tess eval, geometry | [`GeKey`] |
//! | [`ShaderKey::Ps`] | fragment | [`PsKey`] |
//!
//! Each payload is split into three records:
//!
//! - `part`: bits that only select prologs/epilogs (cheap to vary).
//! - `mono`: bits that can only be honoured by a monolithic compile.
//! - `opt`: optimisation opt-ins, including the inlined-constant snapshot.
//!
//! # Equality
//!
//! Equality and hashing are defined over [`ShaderKey::canonical_bytes`], the
//! little-endian serialisation of the *active* variant only. The inlined
//! uniform values are always serialised last so that
//! [`ShaderKey::canonical_bytes_without_uniforms`] is a strict prefix.

use std::hash::{Hash, Hasher};

use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_64;

use crate::stage::{ShaderStage, TessPrimitiveMode};

/// Maximum number of uniform dwords that can be inlined into a variant.
pub const MAX_INLINABLE_UNIFORMS: usize = 4;

/// Maximum number of vertex attributes tracked by per-attribute key bits.
pub const MAX_VERTEX_ATTRIBS: usize = 16;

/// Color render targets packed into the 32-bit export format word.
pub const MAX_COLOR_BUFFERS: usize = 8;

/// Identity of a [`ShaderSelector`](../../prism_compiler/selector/index.html).
///
/// Keys of merged stages reference their previous-stage selector by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SelectorId(pub u64);

// ─── Canonical Encoding ──────────────────────────────────────────────────────

/// Canonical byte buffer of a key. 128 bytes cover every key inline.
pub type KeyBytes = SmallVec<[u8; 128]>;

/// Append-only little-endian writer used for canonical key serialisation.
#[derive(Debug, Default)]
pub struct KeyWriter {
    bytes: KeyBytes,
}

impl KeyWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes.push(v);
        self
    }

    #[inline]
    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    #[inline]
    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn raw(&mut self, v: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(v);
        self
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn finish(self) -> KeyBytes {
        self.bytes
    }
}

/// Serialises a key record into its canonical byte form.
pub trait CanonicalEncode {
    fn encode(&self, w: &mut KeyWriter);
}

// ─── Prolog / Epilog Bits ────────────────────────────────────────────────────

/// Vertex prolog selection bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VsPrologBits {
    /// Per attribute: instance divisor is exactly one.
    pub instance_divisor_is_one: u16,
    /// Per attribute: instance divisor must be fetched from a buffer.
    pub instance_divisor_is_fetched: u16,
    /// Hardware bug workaround: LS input VGPRs arrive shifted.
    pub ls_vgpr_fix: bool,
}

impl VsPrologBits {
    #[inline]
    #[must_use]
    pub fn uses_instance_divisors(&self, input_mask: u16) -> bool {
        (self.instance_divisor_is_one | self.instance_divisor_is_fetched) & input_mask != 0
    }
}

impl CanonicalEncode for VsPrologBits {
    fn encode(&self, w: &mut KeyWriter) {
        w.u16(self.instance_divisor_is_one)
            .u16(self.instance_divisor_is_fetched)
            .bool(self.ls_vgpr_fix);
    }
}

/// Tessellation control epilog bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TcsEpilogBits {
    pub prim_mode: TessPrimitiveMode,
    pub tes_reads_tess_factors: bool,
}

impl CanonicalEncode for TcsEpilogBits {
    fn encode(&self, w: &mut KeyWriter) {
        w.u8(self.prim_mode as u8).bool(self.tes_reads_tess_factors);
    }
}

/// Fragment prolog selection bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PsPrologBits {
    pub color_two_side: bool,
    pub flatshade_colors: bool,
    pub poly_stipple: bool,
    pub force_persp_sample_interp: bool,
    pub force_linear_sample_interp: bool,
    pub force_persp_center_interp: bool,
    pub force_linear_center_interp: bool,
    pub bc_optimize_for_persp: bool,
    pub bc_optimize_for_linear: bool,
    /// log2 of the sample count for per-sample shading (0 = off).
    pub samplemask_log_ps_iter: u8,
}

impl PsPrologBits {
    /// Any forced interpolation or barycentric optimisation.
    #[must_use]
    pub fn forces_interpolation(&self) -> bool {
        self.force_persp_sample_interp
            || self.force_linear_sample_interp
            || self.force_persp_center_interp
            || self.force_linear_center_interp
            || self.bc_optimize_for_persp
            || self.bc_optimize_for_linear
    }
}

impl CanonicalEncode for PsPrologBits {
    fn encode(&self, w: &mut KeyWriter) {
        let flags = u16::from(self.color_two_side)
            | u16::from(self.flatshade_colors) << 1
            | u16::from(self.poly_stipple) << 2
            | u16::from(self.force_persp_sample_interp) << 3
            | u16::from(self.force_linear_sample_interp) << 4
            | u16::from(self.force_persp_center_interp) << 5
            | u16::from(self.force_linear_center_interp) << 6
            | u16::from(self.bc_optimize_for_persp) << 7
            | u16::from(self.bc_optimize_for_linear) << 8;
        w.u16(flags).u8(self.samplemask_log_ps_iter);
    }
}

/// Alpha test function applied by the fragment epilog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlphaFunc {
    Never = 0,
    Less = 1,
    Equal = 2,
    LessEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterEqual = 6,
    /// Alpha test disabled.
    #[default]
    Always = 7,
}

/// Export format of one color render target, 4 bits per target in
/// [`PsEpilogBits::spi_shader_col_format`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColorExportFormat {
    #[default]
    Zero = 0,
    R32 = 1,
    Gr32 = 2,
    Ar32 = 3,
    Fp16Abgr = 4,
    Unorm16Abgr = 5,
    Snorm16Abgr = 6,
    Uint16Abgr = 7,
    Sint16Abgr = 8,
    Abgr32 = 9,
}

/// Fragment epilog selection bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PsEpilogBits {
    pub spi_shader_col_format: u32,
    pub color_is_int8: u8,
    pub color_is_int10: u8,
    pub last_cbuf: u8,
    pub alpha_func: AlphaFunc,
    pub alpha_to_one: bool,
    pub alpha_to_coverage_via_mrtz: bool,
    pub clamp_color: bool,
    pub dual_src_blend_swizzle: bool,
    pub kill_samplemask: bool,
}

impl PsEpilogBits {
    /// Set the export format of color target `index`. Targets past
    /// [`MAX_COLOR_BUFFERS`] are ignored.
    pub fn set_color_format(&mut self, index: usize, format: ColorExportFormat) {
        if index >= MAX_COLOR_BUFFERS {
            return;
        }
        let shift = index * 4;
        self.spi_shader_col_format &= !(0xf << shift);
        self.spi_shader_col_format |= (format as u32) << shift;
    }

    /// Raw 4-bit export format of color target `index`.
    #[must_use]
    pub fn color_format_bits(&self, index: usize) -> u32 {
        if index >= MAX_COLOR_BUFFERS {
            return 0;
        }
        (self.spi_shader_col_format >> (index * 4)) & 0xf
    }
}

impl CanonicalEncode for PsEpilogBits {
    fn encode(&self, w: &mut KeyWriter) {
        let flags = u8::from(self.alpha_to_one)
            | u8::from(self.alpha_to_coverage_via_mrtz) << 1
            | u8::from(self.clamp_color) << 2
            | u8::from(self.dual_src_blend_swizzle) << 3
            | u8::from(self.kill_samplemask) << 4;
        w.u32(self.spi_shader_col_format)
            .u8(self.color_is_int8)
            .u8(self.color_is_int10)
            .u8(self.last_cbuf)
            .u8(self.alpha_func as u8)
            .u8(flags);
    }
}

// ─── Geometry-Engine Key ─────────────────────────────────────────────────────

/// Stage-specific part bits of a geometry-engine key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GePartKey {
    #[default]
    None,
    Vs {
        prolog: VsPrologBits,
    },
    Tcs {
        /// Vertex selector merged in front of this TCS (GFX9+).
        ls: Option<SelectorId>,
        ls_prolog: VsPrologBits,
        epilog: TcsEpilogBits,
    },
    Gs {
        /// Vertex or tess-eval selector merged in front of this GS (GFX9+).
        es: Option<SelectorId>,
        vs_prolog: VsPrologBits,
    },
}

impl GePartKey {
    /// The vertex prolog bits that apply to this stage, if any.
    #[must_use]
    pub fn vs_prolog(&self) -> Option<&VsPrologBits> {
        match self {
            Self::None => None,
            Self::Vs { prolog } => Some(prolog),
            Self::Tcs { ls_prolog, .. } => Some(ls_prolog),
            Self::Gs { vs_prolog, .. } => Some(vs_prolog),
        }
    }

    #[must_use]
    pub fn previous_stage(&self) -> Option<SelectorId> {
        match self {
            Self::Tcs { ls, .. } => *ls,
            Self::Gs { es, .. } => *es,
            _ => None,
        }
    }
}

impl CanonicalEncode for GePartKey {
    fn encode(&self, w: &mut KeyWriter) {
        match self {
            Self::None => {
                w.u8(0);
            }
            Self::Vs { prolog } => {
                w.u8(1);
                prolog.encode(w);
            }
            Self::Tcs {
                ls,
                ls_prolog,
                epilog,
            } => {
                w.u8(2).u64(ls.map_or(0, |id| id.0 + 1));
                ls_prolog.encode(w);
                epilog.encode(w);
            }
            Self::Gs { es, vs_prolog } => {
                w.u8(3).u64(es.map_or(0, |id| id.0 + 1));
                vs_prolog.encode(w);
            }
        }
    }
}

/// Geometry-engine bits that force a monolithic compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GeMonoKey {
    /// Per-attribute vertex fetch fixup opcode (0 = none).
    pub vs_fix_fetch: [u8; MAX_VERTEX_ATTRIBS],
    pub vs_export_prim_id: bool,
    /// Fixed-function TCS: inputs to pass through.
    pub ff_tcs_inputs_to_copy: u64,
}

impl CanonicalEncode for GeMonoKey {
    fn encode(&self, w: &mut KeyWriter) {
        w.raw(&self.vs_fix_fetch)
            .bool(self.vs_export_prim_id)
            .u64(self.ff_tcs_inputs_to_copy);
    }
}

/// NGG culling mode bits carried in [`GeOptKey::ngg_culling`].
pub mod ngg_culling {
    pub const FRONT_FACE: u8 = 1 << 0;
    pub const BACK_FACE: u8 = 1 << 1;
    pub const SMALL_PRIMITIVES: u8 = 1 << 2;
    pub const LINES: u8 = 1 << 3;
}

/// Geometry-engine optimisation opt-ins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GeOptKey {
    /// Outputs not read by the next stage.
    pub kill_outputs: u64,
    pub kill_pointsize: bool,
    pub kill_layer: bool,
    pub kill_clip_distances: u8,
    pub remove_streamout: bool,
    pub ngg_culling: u8,
    pub inline_uniforms: bool,
    /// Must stay the last field: excluded by the no-uniform comparison.
    pub inlined_uniform_values: [u32; MAX_INLINABLE_UNIFORMS],
}

impl GeOptKey {
    fn encode_without_uniforms(&self, w: &mut KeyWriter) {
        let flags = u8::from(self.kill_pointsize)
            | u8::from(self.kill_layer) << 1
            | u8::from(self.remove_streamout) << 2
            | u8::from(self.inline_uniforms) << 3;
        w.u64(self.kill_outputs)
            .u8(self.kill_clip_distances)
            .u8(self.ngg_culling)
            .u8(flags);
    }
}

/// Key of a vertex, tessellation or geometry shader variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GeKey {
    /// Runs as the first half of a merged LS+HS invocation.
    pub as_ls: bool,
    /// Runs as the first half of a merged ES+GS invocation.
    pub as_es: bool,
    /// Runs on the next-generation geometry pipeline.
    pub as_ngg: bool,
    pub part: GePartKey,
    pub mono: GeMonoKey,
    pub opt: GeOptKey,
}

// ─── Fragment Key ────────────────────────────────────────────────────────────

/// Fragment prolog and epilog selection bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PsPartKey {
    pub prolog: PsPrologBits,
    pub epilog: PsEpilogBits,
}

/// Fragment bits that force a monolithic compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PsMonoKey {
    pub poly_line_smoothing: bool,
    pub point_smoothing: bool,
    pub interpolate_at_sample_force_center: bool,
    pub fbfetch_msaa: bool,
    pub fbfetch_is_1d: bool,
    pub fbfetch_layered: bool,
}

impl CanonicalEncode for PsMonoKey {
    fn encode(&self, w: &mut KeyWriter) {
        let flags = u8::from(self.poly_line_smoothing)
            | u8::from(self.point_smoothing) << 1
            | u8::from(self.interpolate_at_sample_force_center) << 2
            | u8::from(self.fbfetch_msaa) << 3
            | u8::from(self.fbfetch_is_1d) << 4
            | u8::from(self.fbfetch_layered) << 5;
        w.u8(flags);
    }
}

/// Fragment optimisation opt-ins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PsOptKey {
    /// Per color target: channels that are never read by blending.
    pub kill_outputs: u32,
    /// Cross-part optimisation outweighs part reuse for this shader.
    pub prefer_mono: bool,
    pub inline_uniforms: bool,
    /// Must stay the last field: excluded by the no-uniform comparison.
    pub inlined_uniform_values: [u32; MAX_INLINABLE_UNIFORMS],
}

impl PsOptKey {
    fn encode_without_uniforms(&self, w: &mut KeyWriter) {
        let flags = u8::from(self.prefer_mono) | u8::from(self.inline_uniforms) << 1;
        w.u32(self.kill_outputs).u8(flags);
    }
}

/// Key of a fragment shader variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PsKey {
    pub part: PsPartKey,
    pub mono: PsMonoKey,
    pub opt: PsOptKey,
}

// ─── ShaderKey ───────────────────────────────────────────────────────────────

/// State-to-variant key.
#[derive(Debug, Clone, Copy)]
pub enum ShaderKey {
    Ge(GeKey),
    Ps(PsKey),
}

impl ShaderKey {
    /// The all-zero key for `stage`.
    ///
    /// Compute programs have no variants; they share the geometry-engine
    /// layout with every field zero.
    #[must_use]
    pub fn for_stage(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Fragment => Self::Ps(PsKey::default()),
            _ => Self::Ge(GeKey::default()),
        }
    }

    #[inline]
    #[must_use]
    pub fn as_ge(&self) -> Option<&GeKey> {
        match self {
            Self::Ge(k) => Some(k),
            Self::Ps(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_ps(&self) -> Option<&PsKey> {
        match self {
            Self::Ps(k) => Some(k),
            Self::Ge(_) => None,
        }
    }

    #[inline]
    pub fn ge_mut(&mut self) -> Option<&mut GeKey> {
        match self {
            Self::Ge(k) => Some(k),
            Self::Ps(_) => None,
        }
    }

    #[inline]
    pub fn ps_mut(&mut self) -> Option<&mut PsKey> {
        match self {
            Self::Ps(k) => Some(k),
            Self::Ge(_) => None,
        }
    }

    /// Any bit that can only be honoured by a monolithic compile.
    #[must_use]
    pub fn has_mono(&self) -> bool {
        match self {
            Self::Ge(k) => k.mono != GeMonoKey::default(),
            Self::Ps(k) => k.mono != PsMonoKey::default(),
        }
    }

    /// Any optimisation opt-in, including inlined constants.
    #[must_use]
    pub fn has_opt(&self) -> bool {
        match self {
            Self::Ge(k) => k.opt != GeOptKey::default(),
            Self::Ps(k) => k.opt != PsOptKey::default(),
        }
    }

    /// Copy of this key with every optimisation opt-in cleared.
    #[must_use]
    pub fn without_opt(&self) -> Self {
        let mut key = *self;
        match &mut key {
            Self::Ge(k) => k.opt = GeOptKey::default(),
            Self::Ps(k) => k.opt = PsOptKey::default(),
        }
        key
    }

    #[must_use]
    pub fn inline_uniforms(&self) -> bool {
        match self {
            Self::Ge(k) => k.opt.inline_uniforms,
            Self::Ps(k) => k.opt.inline_uniforms,
        }
    }

    #[must_use]
    pub fn inlined_uniform_values(&self) -> &[u32; MAX_INLINABLE_UNIFORMS] {
        match self {
            Self::Ge(k) => &k.opt.inlined_uniform_values,
            Self::Ps(k) => &k.opt.inlined_uniform_values,
        }
    }

    /// Copy of this key with uniform inlining disabled.
    #[must_use]
    pub fn without_inlined_uniforms(&self) -> Self {
        let mut key = *self;
        match &mut key {
            Self::Ge(k) => {
                k.opt.inline_uniforms = false;
                k.opt.inlined_uniform_values = [0; MAX_INLINABLE_UNIFORMS];
            }
            Self::Ps(k) => {
                k.opt.inline_uniforms = false;
                k.opt.inlined_uniform_values = [0; MAX_INLINABLE_UNIFORMS];
            }
        }
        key
    }

    /// Selector of the merged previous stage, for TCS and GS keys.
    #[must_use]
    pub fn previous_stage(&self) -> Option<SelectorId> {
        self.as_ge().and_then(|k| k.part.previous_stage())
    }

    fn encode_without_uniforms(&self, w: &mut KeyWriter) {
        match self {
            Self::Ge(k) => {
                let roles = u8::from(k.as_ls) | u8::from(k.as_es) << 1 | u8::from(k.as_ngg) << 2;
                w.u8(0).u8(roles);
                k.part.encode(w);
                k.mono.encode(w);
                k.opt.encode_without_uniforms(w);
            }
            Self::Ps(k) => {
                w.u8(1);
                k.part.prolog.encode(w);
                k.part.epilog.encode(w);
                k.mono.encode(w);
                k.opt.encode_without_uniforms(w);
            }
        }
    }

    /// Canonical byte layout of the active variant.
    #[must_use]
    pub fn canonical_bytes(&self) -> KeyBytes {
        let mut w = KeyWriter::new();
        self.encode_without_uniforms(&mut w);
        for value in self.inlined_uniform_values() {
            w.u32(*value);
        }
        w.finish()
    }

    /// Canonical bytes excluding the inlined uniform values.
    #[must_use]
    pub fn canonical_bytes_without_uniforms(&self) -> KeyBytes {
        let mut w = KeyWriter::new();
        self.encode_without_uniforms(&mut w);
        w.finish()
    }

    /// 64-bit xxh3 of the canonical bytes.
    #[inline]
    #[must_use]
    pub fn fast_hash(&self) -> u64 {
        xxh3_64(&self.canonical_bytes())
    }
}

impl PartialEq for ShaderKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bytes() == other.canonical_bytes()
    }
}

impl Eq for ShaderKey {}

impl Hash for ShaderKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bytes().hash(state);
    }
}
