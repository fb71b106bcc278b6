//! Prism Core
//!
//! Leaf data model shared by every Prism crate:
//!
//! - [`stage`]: pipeline stages, GPU generations, wave sizes
//! - [`info`]: read-only scan results of a shader program
//! - [`key`]: the state-to-variant [`ShaderKey`]
//! - [`part_key`]: prolog/epilog [`ShaderPartKey`]s
//! - [`stats`]: register usage and hardware limits
//! - [`args`]: main-part argument layouts
//! - [`errors`]: the [`PrismError`] taxonomy
//!
//! Nothing in this crate spawns threads or takes locks.

pub mod args;
pub mod errors;
pub mod info;
pub mod key;
pub mod part_key;
pub mod stage;
pub mod stats;

pub use args::ArgumentLayout;
pub use errors::{PrismError, Result};
pub use info::{ColorType, InterpLocation, InterpMode, ShaderFeatures, ShaderInfo};
pub use key::{
    AlphaFunc, ColorExportFormat, GeKey, GeMonoKey, GeOptKey, GePartKey, MAX_COLOR_BUFFERS, MAX_INLINABLE_UNIFORMS,
    PsEpilogBits, PsKey, PsMonoKey, PsOptKey, PsPartKey, PsPrologBits, SelectorId, ShaderKey,
    TcsEpilogBits, VsPrologBits,
};
pub use part_key::{
    PartCategory, PsEpilogKey, PsPrologKey, ShaderPartKey, TcsEpilogKey, VsPrologKey,
};
pub use stage::{GfxLevel, PrimitiveShading, ShaderStage, TessPrimitiveMode, WaveSize};
pub use stats::{HardwareLimits, RegisterUsage};
