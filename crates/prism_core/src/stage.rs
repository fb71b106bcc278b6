//! Pipeline stages, GPU generations and wave sizes.

use serde::{Deserialize, Serialize};

/// API-level pipeline stage of a shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShaderStage {
    Vertex = 0,
    TessCtrl = 1,
    TessEval = 2,
    Geometry = 3,
    Fragment = 4,
    Compute = 5,
}

impl ShaderStage {
    /// Stages processed by the geometry engine (everything before rasterization).
    #[inline]
    #[must_use]
    pub fn is_geometry_engine(self) -> bool {
        self <= Self::Geometry
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::TessCtrl => "tessellation control",
            Self::TessEval => "tessellation evaluation",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        }
    }
}

/// GPU hardware generation.
///
/// Ordering follows release order, so `level >= GfxLevel::Gfx9` reads as
/// "GFX9 or newer".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum GfxLevel {
    Gfx6,
    Gfx7,
    Gfx8,
    Gfx9,
    #[default]
    Gfx10,
    Gfx10_3,
    Gfx11,
}

impl GfxLevel {
    /// LS+HS and ES+GS run as one hardware invocation.
    #[inline]
    #[must_use]
    pub fn has_merged_stages(self) -> bool {
        self >= Self::Gfx9
    }

    /// Next-generation geometry (primitive shader) pipeline is available.
    #[inline]
    #[must_use]
    pub fn supports_ngg(self) -> bool {
        self >= Self::Gfx10
    }

    #[inline]
    #[must_use]
    pub fn supports_wave32(self) -> bool {
        self >= Self::Gfx10
    }
}

/// Number of lanes in one hardware wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WaveSize {
    Wave32,
    #[default]
    Wave64,
}

impl WaveSize {
    #[inline]
    #[must_use]
    pub fn lanes(self) -> u32 {
        match self {
            Self::Wave32 => 32,
            Self::Wave64 => 64,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_wave32(self) -> bool {
        matches!(self, Self::Wave32)
    }
}

/// Tessellation primitive mode, as consumed by the TCS epilog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TessPrimitiveMode {
    #[default]
    Triangles = 0,
    Quads = 1,
    Isolines = 2,
}

/// Primitive shading mode of the geometry pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimitiveShading {
    /// Fixed-function primitive assembly (VS / GS + copy shader).
    #[default]
    Legacy,
    /// Next-generation geometry: the last geometry stage also runs primitive assembly.
    Ngg,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_ordering() {
        assert!(GfxLevel::Gfx8 < GfxLevel::Gfx9);
        assert!(!GfxLevel::Gfx8.has_merged_stages());
        assert!(GfxLevel::Gfx9.has_merged_stages());
        assert!(!GfxLevel::Gfx9.supports_ngg());
        assert!(GfxLevel::Gfx10_3.supports_ngg());
        assert!(GfxLevel::Gfx11 > GfxLevel::Gfx10_3);
    }

    #[test]
    fn test_geometry_engine_stages() {
        assert!(ShaderStage::Vertex.is_geometry_engine());
        assert!(ShaderStage::Geometry.is_geometry_engine());
        assert!(!ShaderStage::Fragment.is_geometry_engine());
        assert!(!ShaderStage::Compute.is_geometry_engine());
    }
}
