//! Wave-size selection.

use prism_core::{GfxLevel, ShaderFeatures, ShaderInfo, ShaderKey, ShaderStage, WaveSize};

use crate::merge::MainPartSlot;
use crate::settings::CompilerSettings;

/// Merge role of the code whose wave size is being chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveRole {
    pub as_ls: bool,
    pub as_es: bool,
    pub as_ngg: bool,
    /// NGG culling is compiled in (optimised variants only).
    pub ngg_culling: bool,
}

impl WaveRole {
    /// Role of a main part built for `slot`.
    #[must_use]
    pub fn for_slot(slot: MainPartSlot) -> Self {
        Self {
            as_ls: slot == MainPartSlot::PreTessellation,
            as_es: matches!(slot, MainPartSlot::PreGeometry | MainPartSlot::NggPreGeometry),
            as_ngg: matches!(slot, MainPartSlot::Ngg | MainPartSlot::NggPreGeometry),
            ngg_culling: false,
        }
    }

    /// Role encoded in a variant key.
    #[must_use]
    pub fn for_key(key: &ShaderKey) -> Self {
        key.as_ge().map_or_else(Self::default, |ge| Self {
            as_ls: ge.as_ls,
            as_es: ge.as_es,
            as_ngg: ge.as_ngg,
            ngg_culling: ge.opt.ngg_culling != 0,
        })
    }
}

/// Pick the wave size for one main part or monolithic variant.
///
/// Rules, first match wins:
/// 1. Pre-GFX10 hardware only runs wave64.
/// 2. Legacy geometry (GS and its ES half) only supports wave64.
/// 3. Debug overrides, then shader profiles.
/// 4. GFX10/10.3 fragment shaders without interpolated inputs and all
///    geometry-engine stages (except GFX10 with NGG culling) prefer wave32.
/// 5. Non-merged shaders with divergent loops prefer wave32.
#[must_use]
pub fn determine_wave_size(
    settings: &CompilerSettings,
    stage: ShaderStage,
    role: WaveRole,
    info: &ShaderInfo,
) -> WaveSize {
    let gfx = settings.gfx_level;
    if !gfx.supports_wave32() {
        return WaveSize::Wave64;
    }

    let legacy_gs = match stage {
        ShaderStage::Vertex | ShaderStage::TessEval => role.as_es && !role.as_ngg,
        ShaderStage::Geometry => !role.as_ngg,
        _ => false,
    };
    if legacy_gs {
        return WaveSize::Wave64;
    }

    let flags = settings.debug_flags;
    if flags.forces_wave32(stage) {
        return WaveSize::Wave32;
    }
    if flags.forces_wave64(stage) {
        return WaveSize::Wave64;
    }

    if info.has(ShaderFeatures::PREFER_WAVE32) {
        return WaveSize::Wave32;
    }
    let gfx10_family = matches!(gfx, GfxLevel::Gfx10 | GfxLevel::Gfx10_3);
    if info.has(ShaderFeatures::PREFER_GFX10_WAVE64) && gfx10_family {
        return WaveSize::Wave64;
    }

    if gfx < GfxLevel::Gfx11 && stage == ShaderStage::Fragment && info.num_inputs == 0 {
        return WaveSize::Wave32;
    }

    if stage.is_geometry_engine()
        && gfx10_family
        && !(gfx == GfxLevel::Gfx10 && role.ngg_culling)
    {
        return WaveSize::Wave32;
    }

    let merged = stage.is_geometry_engine()
        && (role.as_ls
            || role.as_es
            || matches!(stage, ShaderStage::TessCtrl | ShaderStage::Geometry));
    if !merged && info.has(ShaderFeatures::HAS_DIVERGENT_LOOP) {
        return WaveSize::Wave32;
    }

    WaveSize::Wave64
}
