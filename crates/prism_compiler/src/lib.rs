//! Prism Compiler
//!
//! Shader selectors, variant building, part caches and the asynchronous
//! compile pipeline.
//!
//! # Overview
//!
//! | Module        | Contents                                             |
//! |---------------|------------------------------------------------------|
//! | [`device`]    | [`Device`]: selector creation and variant requests   |
//! | [`state`]     | [`PipelineState`] and [`KeyBuilder`]                 |
//! | [`selector`]  | [`ShaderSelector`] with its main-part slots          |
//! | [`variant`]   | [`ShaderVariant`] and the linked [`LinkedShader`]    |
//! | [`builder`]   | [`VariantBuilder`] state machine                     |
//! | [`part_cache`]| [`PartCache`] of prologs and epilogs                 |
//! | [`merge`]     | [`StageMergeResolver`] and two-phase wrapper plans   |
//! | [`link`]      | ordered part concatenation                           |
//! | [`queue`]     | [`AsyncCompilePipeline`] worker pools                |
//! | [`backend`]   | the [`CodegenBackend`] contract                      |
//! | [`upload`]    | the [`GpuUploader`] contract and [`HostUploader`]    |
//! | [`settings`]  | [`CompilerSettings`] and debug flags                 |

pub mod backend;
pub mod builder;
pub mod context;
pub mod device;
pub mod diagnostics;
pub mod fence;
pub mod ir;
pub mod link;
pub mod merge;
pub mod part_cache;
pub mod parts;
pub mod queue;
pub mod selector;
pub mod settings;
pub mod state;
pub mod upload;
pub mod variant;
pub mod wave;

pub use backend::{CodegenBackend, CodegenOptions, CompileRequest, CompileTarget, CompiledCode};
pub use builder::{BuildState, VariantBuilder};
pub use context::CompilerContext;
pub use device::Device;
pub use diagnostics::{DiagnosticSink, LogSink, ShaderStats, dump_key, dump_stats, stats_json};
pub use fence::Fence;
pub use ir::IrHandle;
pub use link::{LinkOutput, Linker, Segment, SegmentKind, WrapperHeader};
pub use merge::{
    HwStage, MainPartSlot, MergeDecision, MergeQuery, MergedPair, PhaseMask, StageMergeResolver,
    ThreadDomain, WrapperPlan, needs_phase_split,
};
pub use part_cache::{PartCache, PartCacheStats, ShaderPart};
pub use queue::{AsyncCompilePipeline, CompileJob, Priority};
pub use selector::{GsCopyShader, MainPart, ShaderSelector};
pub use settings::{CompilerSettings, DEBUG_ENV_VAR, DebugFlags};
pub use state::{
    BlendState, FramebufferState, KeyBuilder, PipelineState, RasterizerState, VertexElementState,
};
pub use upload::{GpuAllocation, GpuUploader, HostUploader};
pub use variant::{LinkedParts, LinkedShader, ShaderVariant, VariantResult};
pub use wave::{WaveRole, determine_wave_size};
