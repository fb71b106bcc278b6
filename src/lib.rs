//! Prism
//!
//! State-keyed shader variant compilation and caching.
//!
//! A [`ShaderSelector`] is created per program. At draw time the bound
//! [`PipelineState`] is reduced to a [`ShaderKey`]; the [`Device`] returns the
//! variant for that key, building it in the background from a cached main
//! part, cached prolog/epilog parts and (on merging hardware) the previous
//! stage's main part.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prism::{CompilerSettings, Device, IrHandle, PipelineState};
//!
//! let device = Device::new(CompilerSettings::from_env(), backend)?;
//! let ps = device.create_selector(IrHandle::new(ir_bytes), info)?;
//!
//! let mut state = PipelineState::default();
//! state.bind(Arc::clone(&ps));
//! let shader = device.select_variant(&ps, &state)?;
//! ```
//!
//! The crates behind this facade:
//!
//! - [`prism_core`]: keys, part keys, stages, statistics, errors
//! - [`prism_compiler`]: selectors, caches, builder, pipeline, device

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub use prism_compiler;
pub use prism_core;

pub use prism_core::{
    ArgumentLayout, GfxLevel, HardwareLimits, PartCategory, PrismError, RegisterUsage, Result,
    SelectorId, ShaderFeatures, ShaderInfo, ShaderKey, ShaderPartKey, ShaderStage, WaveSize,
};

pub use prism_compiler::{
    AsyncCompilePipeline, CodegenBackend, CompileRequest, CompileTarget, CompiledCode,
    CompilerSettings, DebugFlags, Device, DiagnosticSink, GpuAllocation, GpuUploader, HostUploader,
    IrHandle, KeyBuilder, LinkedShader, LogSink, MainPartSlot, PartCache, PipelineState,
    SegmentKind, ShaderSelector, ShaderVariant, StageMergeResolver, VariantBuilder,
};
