//! Code-generation backend contract.
//!
//! Instruction selection and register allocation live outside this crate.
//! A [`CodegenBackend`] turns one [`CompileRequest`] into a binary plus its
//! register usage. The backend is a device-wide choice made at
//! [`Device`](crate::device::Device) creation, checked against
//! [`CompilerSettings::backend_label`](crate::settings::CompilerSettings) when
//! that is set; it is never part of a variant key.

use prism_core::key::KeyBytes;
use prism_core::{ArgumentLayout, GfxLevel, RegisterUsage, ShaderPartKey, ShaderStage, WaveSize};

use crate::ir::IrHandle;
use crate::merge::MainPartSlot;

/// What a request asks the backend to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileTarget {
    /// The shader body for one merge configuration.
    Main(MainPartSlot),
    /// Prolog, main (and previous stage) and epilog in one binary.
    Monolithic,
    /// A cached prolog or epilog.
    Part(ShaderPartKey),
    /// The vertex-stage copy shader of a legacy geometry stage.
    GsCopy,
}

impl CompileTarget {
    /// Human-readable part name used in error messages.
    #[must_use]
    pub fn part_name(&self) -> &'static str {
        match self {
            Self::Main(_) => "main",
            Self::Monolithic => "monolithic",
            Self::Part(key) => key.name(),
            Self::GsCopy => "gs copy",
        }
    }
}

/// Options derived from device settings and the variant being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    pub gfx: GfxLevel,
    pub wave_size: WaveSize,
    /// Canonical key bytes for monolithic requests, empty otherwise.
    pub key_bytes: KeyBytes,
}

/// One unit of work for the backend.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub target: CompileTarget,
    pub stage: ShaderStage,
    /// Selector name, for diagnostics only.
    pub name: &'a str,
    /// Shader IR; `None` for prologs and epilogs.
    pub ir: Option<&'a IrHandle>,
    /// IR of the merged previous stage for monolithic merged builds.
    pub previous_ir: Option<&'a IrHandle>,
    pub layout: ArgumentLayout,
    pub options: CodegenOptions,
}

/// Backend output for one request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledCode {
    pub code: Vec<u8>,
    pub usage: RegisterUsage,
    /// Input SGPRs the code expects at entry; prologs hand these over.
    pub num_input_sgprs: u8,
    pub num_input_vgprs: u8,
}

/// Native code generator.
///
/// Implementations must be pure: equal requests produce byte-identical
/// output. Errors are plain messages; the compiler wraps them into
/// [`PrismError::Compile`](prism_core::PrismError) naming the failing part.
pub trait CodegenBackend: Send + Sync {
    fn label(&self) -> &str;

    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompiledCode, String>;
}
