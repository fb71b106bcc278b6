//! Input argument layout of a compiled main part.

use serde::{Deserialize, Serialize};

use crate::stage::WaveSize;

/// System SGPRs at the front of every merged or NGG invocation
/// (merged wave info, offsets, ring descriptors).
pub const MERGED_RESERVED_SGPRS: u8 = 8;

/// Leading VGPRs a merged LS half leaves for the HS half.
pub const LS_HS_COUNTERPART_VGPRS: u8 = 2;

/// Leading VGPRs a merged ES half leaves for the GS (or NGG) half.
pub const ES_GS_COUNTERPART_VGPRS: u8 = 5;

/// The input registers a main part expects at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ArgumentLayout {
    /// Leading SGPRs reserved for the merged invocation.
    pub reserved_sgprs: u8,
    /// Leading VGPRs reserved for the merged counterpart.
    pub counterpart_vgprs: u8,
    pub wave_size: WaveSize,
}

impl ArgumentLayout {
    /// A stage running alone in its hardware invocation.
    #[must_use]
    pub fn standalone(wave_size: WaveSize) -> Self {
        Self {
            reserved_sgprs: 0,
            counterpart_vgprs: 0,
            wave_size,
        }
    }

    /// One half of a merged (or NGG) invocation.
    #[must_use]
    pub fn merged(counterpart_vgprs: u8, wave_size: WaveSize) -> Self {
        Self {
            reserved_sgprs: MERGED_RESERVED_SGPRS,
            counterpart_vgprs,
            wave_size,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.reserved_sgprs != 0
    }

    /// Two halves can share one invocation only with the same system
    /// arguments and wave size.
    #[inline]
    #[must_use]
    pub fn compatible_with(&self, other: &Self) -> bool {
        self.reserved_sgprs == other.reserved_sgprs && self.wave_size == other.wave_size
    }
}
