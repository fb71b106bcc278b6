//! Shader info fixtures.

use prism_compiler::IrHandle;
use prism_core::{InterpLocation, InterpMode, ShaderFeatures, ShaderInfo, ShaderStage};

/// IR whose content is just `name`; equal names share IR-keyed caches.
#[must_use]
pub fn ir(name: &str) -> IrHandle {
    IrHandle::new(name.as_bytes().to_vec())
}

fn named(stage: ShaderStage, name: &str) -> ShaderInfo {
    let mut info = ShaderInfo::new(stage);
    info.name = name.to_owned();
    info
}

/// Vertex program reading `num_inputs` attributes and writing a position.
#[must_use]
pub fn vertex(name: &str, num_inputs: u8) -> ShaderInfo {
    let mut info = named(ShaderStage::Vertex, name);
    info.num_inputs = num_inputs;
    info.inputs_read = (1u64 << num_inputs) - 1;
    info.outputs_written = 0b111;
    info.num_outputs = 3;
    info.features |= ShaderFeatures::WRITES_POSITION;
    info
}

#[must_use]
pub fn tess_ctrl(name: &str, vertices_out: u8) -> ShaderInfo {
    let mut info = named(ShaderStage::TessCtrl, name);
    info.tcs_vertices_out = vertices_out;
    info.outputs_written = 0b11;
    info
}

#[must_use]
pub fn tess_eval(name: &str) -> ShaderInfo {
    let mut info = named(ShaderStage::TessEval, name);
    info.tes_reads_tess_factors = true;
    info.outputs_written = 0b111;
    info.features |= ShaderFeatures::WRITES_POSITION;
    info
}

#[must_use]
pub fn geometry(name: &str) -> ShaderInfo {
    let mut info = named(ShaderStage::Geometry, name);
    info.outputs_written = 0b111;
    info.features |= ShaderFeatures::WRITES_POSITION;
    info
}

/// Fragment program that reads both colors and writes one render target.
#[must_use]
pub fn fragment_with_colors(name: &str) -> ShaderInfo {
    let mut info = named(ShaderStage::Fragment, name);
    info.num_inputs = 3;
    info.num_ps_inputs = 1;
    info.inputs_read = 0b111;
    info.colors_read = 0xff;
    info.colors_written = 0b1;
    info.color_interpolate = [InterpMode::Color, InterpMode::Color];
    info.color_interpolate_loc = [InterpLocation::Center, InterpLocation::Center];
    info.color_attr_index = [1, 2];
    info
}

/// Fragment program writing one render target without reading colors.
#[must_use]
pub fn fragment(name: &str) -> ShaderInfo {
    let mut info = named(ShaderStage::Fragment, name);
    info.num_inputs = 1;
    info.num_ps_inputs = 1;
    info.inputs_read = 0b1;
    info.colors_written = 0b1;
    info
}
