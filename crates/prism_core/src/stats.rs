//! Register usage statistics and hardware limits.
//!
//! Every compiled fragment reports a [`RegisterUsage`]. A linked variant runs
//! its parts one after another in the same invocation, so the register file
//! only ever has to hold the largest of them: statistics merge by pointwise
//! maximum, never by sum.

use serde::{Deserialize, Serialize};

use crate::errors::{PrismError, Result};
use crate::stage::{GfxLevel, ShaderStage, WaveSize};

/// Register and memory usage of one compiled fragment or linked variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegisterUsage {
    pub num_sgprs: u32,
    pub num_vgprs: u32,
    pub spilled_sgprs: u32,
    pub spilled_vgprs: u32,
    pub scratch_bytes_per_wave: u32,
    pub lds_size: u32,
    pub private_mem_vgprs: u32,
}

impl RegisterUsage {
    /// Raise every counter to at least `other`'s value.
    pub fn merge_max(&mut self, other: &Self) {
        self.num_sgprs = self.num_sgprs.max(other.num_sgprs);
        self.num_vgprs = self.num_vgprs.max(other.num_vgprs);
        self.spilled_sgprs = self.spilled_sgprs.max(other.spilled_sgprs);
        self.spilled_vgprs = self.spilled_vgprs.max(other.spilled_vgprs);
        self.scratch_bytes_per_wave = self.scratch_bytes_per_wave.max(other.scratch_bytes_per_wave);
        self.lds_size = self.lds_size.max(other.lds_size);
        self.private_mem_vgprs = self.private_mem_vgprs.max(other.private_mem_vgprs);
    }

    /// Pointwise maximum over `parts`.
    #[must_use]
    pub fn merged<'a>(parts: impl IntoIterator<Item = &'a RegisterUsage>) -> Self {
        parts.into_iter().fold(Self::default(), |mut acc, u| {
            acc.merge_max(u);
            acc
        })
    }
}

/// Per-invocation budget of one GPU generation at one wave size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareLimits {
    pub max_sgprs: u32,
    pub max_vgprs: u32,
    pub max_scratch_bytes_per_wave: u32,
    /// Physical VGPRs per SIMD, in units of the current wave size.
    pub simd_vgprs: u32,
    /// Physical SGPRs per SIMD; 0 when SGPRs do not limit occupancy.
    pub simd_sgprs: u32,
    pub max_waves_per_simd: u32,
    pub vgpr_granule: u32,
}

impl HardwareLimits {
    #[must_use]
    pub fn new(gfx: GfxLevel, wave: WaveSize) -> Self {
        let max_sgprs = match gfx {
            GfxLevel::Gfx6 | GfxLevel::Gfx7 => 104,
            GfxLevel::Gfx8 | GfxLevel::Gfx9 => 102,
            _ => 106,
        };
        let wave64_vgprs = if gfx >= GfxLevel::Gfx10_3 { 1024 } else { 512 };
        let (simd_vgprs, vgpr_granule) = match wave {
            WaveSize::Wave32 => (wave64_vgprs * 2, 8),
            WaveSize::Wave64 => (wave64_vgprs / 2, 4),
        };
        Self {
            max_sgprs,
            max_vgprs: 256,
            max_scratch_bytes_per_wave: 8 * 1024 * 1024,
            simd_vgprs,
            simd_sgprs: if gfx >= GfxLevel::Gfx10 { 0 } else { 800 },
            max_waves_per_simd: match gfx {
                GfxLevel::Gfx11 => 16,
                g if g >= GfxLevel::Gfx10 => 20,
                _ => 10,
            },
            vgpr_granule,
        }
    }

    /// Reject usage the hardware cannot launch.
    pub fn check(&self, stage: ShaderStage, usage: &RegisterUsage) -> Result<()> {
        let checks = [
            ("SGPRs", usage.num_sgprs, self.max_sgprs),
            ("VGPRs", usage.num_vgprs, self.max_vgprs),
            (
                "scratch bytes per wave",
                usage.scratch_bytes_per_wave,
                self.max_scratch_bytes_per_wave,
            ),
        ];
        for (resource, used, limit) in checks {
            if used > limit {
                return Err(PrismError::ResourceLimit {
                    stage,
                    resource,
                    used,
                    limit,
                });
            }
        }
        Ok(())
    }

    /// Occupancy estimate: waves of this shader one SIMD can hold.
    #[must_use]
    pub fn max_simd_waves(&self, usage: &RegisterUsage) -> u32 {
        let mut waves = self.max_waves_per_simd;
        if usage.num_vgprs > 0 {
            let granule = self.vgpr_granule;
            let vgprs = usage.num_vgprs.div_ceil(granule) * granule;
            waves = waves.min(self.simd_vgprs / vgprs);
        }
        if self.simd_sgprs > 0 && usage.num_sgprs > 0 {
            let sgprs = usage.num_sgprs.div_ceil(16) * 16;
            waves = waves.min(self.simd_sgprs / sgprs);
        }
        waves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(sgprs: u32, vgprs: u32, scratch: u32) -> RegisterUsage {
        RegisterUsage {
            num_sgprs: sgprs,
            num_vgprs: vgprs,
            scratch_bytes_per_wave: scratch,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_is_pointwise_max() {
        let merged = RegisterUsage::merged(&[usage(10, 40, 0), usage(30, 8, 256), usage(4, 4, 64)]);
        assert_eq!(merged, usage(30, 40, 256));
    }

    #[test]
    fn test_check_reports_offending_resource() {
        let limits = HardwareLimits::new(GfxLevel::Gfx10, WaveSize::Wave64);
        assert!(limits.check(ShaderStage::Vertex, &usage(100, 256, 0)).is_ok());

        let err = limits
            .check(ShaderStage::Vertex, &usage(10, 300, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            PrismError::ResourceLimit { resource: "VGPRs", used: 300, limit: 256, .. }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_max_simd_waves() {
        let limits = HardwareLimits::new(GfxLevel::Gfx10, WaveSize::Wave64);
        assert_eq!(limits.max_simd_waves(&usage(0, 0, 0)), 20);
        // 256 wave64 VGPRs per SIMD on GFX10: 64 VGPRs -> 4 waves.
        assert_eq!(limits.max_simd_waves(&usage(16, 64, 0)), 4);

        let gfx9 = HardwareLimits::new(GfxLevel::Gfx9, WaveSize::Wave64);
        // 800 SGPRs / 96 -> 8 waves.
        assert_eq!(gfx9.max_simd_waves(&usage(90, 8, 0)), 8);
    }
}
