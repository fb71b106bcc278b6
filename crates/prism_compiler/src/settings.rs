//! Compiler Settings
//!
//! Process-wide configuration of a [`Device`](crate::device::Device). None of
//! these values are part of a [`ShaderKey`](prism_core::ShaderKey): they are
//! fixed for the lifetime of the device and apply to every variant it builds.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use prism_compiler::settings::{CompilerSettings, DebugFlags};
//! use prism_core::GfxLevel;
//!
//! // Defaults: GFX10, NGG on, two compiler threads.
//! let settings = CompilerSettings::default();
//!
//! // Older hardware, everything compiled on the submitting thread.
//! let settings = CompilerSettings {
//!     gfx_level: GfxLevel::Gfx8,
//!     sync_compile: true,
//!     ..Default::default()
//! };
//!
//! // Layer `PRISM_DEBUG=mono,w32ps` on top of the defaults.
//! let settings = CompilerSettings::from_env();
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use prism_core::{GfxLevel, ShaderStage};

/// Environment variable parsed by [`CompilerSettings::from_env`].
pub const DEBUG_ENV_VAR: &str = "PRISM_DEBUG";

// ---------------------------------------------------------------------------
// DebugFlags
// ---------------------------------------------------------------------------

bitflags! {
    /// Debug overrides, usually set through [`DEBUG_ENV_VAR`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DebugFlags: u32 {
        /// Compile every variant as one monolithic binary.
        const MONOLITHIC     = 1 << 0;
        /// Never build optimised variants.
        const NO_OPT_VARIANT = 1 << 1;
        /// Wait for every compile job on the submitting thread.
        const SYNC_COMPILE   = 1 << 2;
        const W32_GE         = 1 << 3;
        const W32_PS         = 1 << 4;
        const W32_CS         = 1 << 5;
        const W64_GE         = 1 << 6;
        const W64_PS         = 1 << 7;
        const W64_CS         = 1 << 8;
    }
}

const DEBUG_FLAG_NAMES: &[(&str, DebugFlags)] = &[
    ("mono", DebugFlags::MONOLITHIC),
    ("nooptvariant", DebugFlags::NO_OPT_VARIANT),
    ("sync", DebugFlags::SYNC_COMPILE),
    ("w32ge", DebugFlags::W32_GE),
    ("w32ps", DebugFlags::W32_PS),
    ("w32cs", DebugFlags::W32_CS),
    ("w64ge", DebugFlags::W64_GE),
    ("w64ps", DebugFlags::W64_PS),
    ("w64cs", DebugFlags::W64_CS),
];

impl DebugFlags {
    /// Parse a comma separated flag list such as `"mono,w32ps"`.
    ///
    /// Unknown names are logged and ignored.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        let mut flags = Self::empty();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match DEBUG_FLAG_NAMES
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
            {
                Some((_, flag)) => flags |= *flag,
                None => log::warn!("Unknown {DEBUG_ENV_VAR} flag '{name}', ignoring"),
            }
        }
        flags
    }

    /// Forced wave32 for `stage`.
    #[must_use]
    pub fn forces_wave32(self, stage: ShaderStage) -> bool {
        self.contains(match stage {
            ShaderStage::Compute => Self::W32_CS,
            ShaderStage::Fragment => Self::W32_PS,
            _ => Self::W32_GE,
        })
    }

    /// Forced wave64 for `stage`.
    #[must_use]
    pub fn forces_wave64(self, stage: ShaderStage) -> bool {
        self.contains(match stage {
            ShaderStage::Compute => Self::W64_CS,
            ShaderStage::Fragment => Self::W64_PS,
            _ => Self::W64_GE,
        })
    }
}

// ---------------------------------------------------------------------------
// CompilerSettings
// ---------------------------------------------------------------------------

/// Device-wide compiler configuration.
///
/// | Field                         | Default   |
/// |-------------------------------|-----------|
/// | `gfx_level`                   | `Gfx10`   |
/// | `use_ngg`                     | `true`    |
/// | `use_monolithic_shaders`      | `false`   |
/// | `sync_compile`                | `false`   |
/// | `disable_opt_variants`        | `false`   |
/// | `num_compiler_threads`        | `2`       |
/// | `num_low_priority_threads`    | `1`       |
/// | `queue_capacity`              | `256`     |
/// | `max_inline_uniform_variants` | `5`       |
/// | `upload_capacity`             | unbounded |
/// | `backend_label`               | any       |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    // === Target ===
    pub gfx_level: GfxLevel,
    /// Use next-generation geometry for the last geometry stage where supported.
    pub use_ngg: bool,

    // === Variant Policy ===
    pub use_monolithic_shaders: bool,
    pub disable_opt_variants: bool,
    /// Variants of one key that may differ only in inlined uniform values.
    pub max_inline_uniform_variants: usize,

    // === Scheduling ===
    pub sync_compile: bool,
    pub num_compiler_threads: usize,
    pub num_low_priority_threads: usize,
    /// Bound of each job queue; submit blocks when full.
    pub queue_capacity: usize,

    // === Resources ===
    /// Upload arena size in bytes; `None` grows without bound.
    pub upload_capacity: Option<usize>,

    /// Wave-size overrides and other debug switches.
    pub debug_flags: DebugFlags,
    /// Label the device's backend must report; `None` accepts any backend.
    /// Never part of a key.
    pub backend_label: Option<String>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            gfx_level: GfxLevel::default(),
            use_ngg: true,
            use_monolithic_shaders: false,
            disable_opt_variants: false,
            max_inline_uniform_variants: 5,
            sync_compile: false,
            num_compiler_threads: 2,
            num_low_priority_threads: 1,
            queue_capacity: 256,
            upload_capacity: None,
            debug_flags: DebugFlags::empty(),
            backend_label: None,
        }
    }
}

impl CompilerSettings {
    /// Defaults with [`DEBUG_ENV_VAR`] applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(list) = std::env::var(DEBUG_ENV_VAR) {
            settings = settings.with_debug_flags(DebugFlags::parse(&list));
        }
        settings
    }

    /// Fold `flags` into the settings they override.
    #[must_use]
    pub fn with_debug_flags(mut self, flags: DebugFlags) -> Self {
        self.debug_flags |= flags;
        self.use_monolithic_shaders |= flags.contains(DebugFlags::MONOLITHIC);
        self.disable_opt_variants |= flags.contains(DebugFlags::NO_OPT_VARIANT);
        self.sync_compile |= flags.contains(DebugFlags::SYNC_COMPILE);
        self
    }

    /// NGG is requested and the hardware has it.
    #[inline]
    #[must_use]
    pub fn ngg_enabled(&self) -> bool {
        self.use_ngg && self.gfx_level.supports_ngg()
    }
}
