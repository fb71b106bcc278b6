//! Prolog/epilog requirement predicates and part-key derivation.
//!
//! Each function here is pure: it reads the scanned info of the shader that
//! owns the part, the relevant key bits and hints from the main part the
//! fragment is linked against, and nothing else.

use prism_core::{
    GeKey, InterpLocation, InterpMode, PsEpilogBits, PsEpilogKey, PsPrologBits, PsPrologKey,
    ShaderFeatures, ShaderInfo, ShaderStage, TcsEpilogBits, TcsEpilogKey, VsPrologBits,
    VsPrologKey, WaveSize,
};
use prism_core::args::{ES_GS_COUNTERPART_VGPRS, LS_HS_COUNTERPART_VGPRS};

// ─── Vertex Prolog ───────────────────────────────────────────────────────────

/// A vertex prolog is required when fetch needs fixups, an instance divisor
/// applies to a used input, or the LS VGPR workaround is active.
#[must_use]
pub fn vs_needs_prolog(info: &ShaderInfo, bits: &VsPrologBits) -> bool {
    info.has(ShaderFeatures::VS_NEEDS_PROLOG)
        || bits.uses_instance_divisors(info.input_mask())
        || bits.ls_vgpr_fix
}

/// Vertex prolog key for a vertex program linked into `out_stage`.
///
/// `out_stage` is the stage of the shader the prolog is finally part of:
/// `Vertex` when the vertex program runs alone, `TessCtrl` or `Geometry` when
/// it is the merged first half. `out_key` supplies the role bits.
#[must_use]
pub fn vs_prolog_key(
    info: &ShaderInfo,
    bits: &VsPrologBits,
    num_input_sgprs: u8,
    wave_size: WaveSize,
    out_stage: ShaderStage,
    out_key: &GeKey,
) -> VsPrologKey {
    let mut key = VsPrologKey {
        states: *bits,
        wave32: wave_size.is_wave32(),
        num_input_sgprs,
        num_inputs: info.num_inputs,
        ..Default::default()
    };
    let input_mask = info.input_mask();
    key.states.instance_divisor_is_one &= input_mask;
    key.states.instance_divisor_is_fetched &= input_mask;

    match out_stage {
        ShaderStage::TessCtrl => {
            key.as_ls = true;
            key.num_merged_next_stage_vgprs = LS_HS_COUNTERPART_VGPRS;
        }
        ShaderStage::Geometry => {
            key.as_es = true;
            key.as_ngg = out_key.as_ngg;
            key.num_merged_next_stage_vgprs = ES_GS_COUNTERPART_VGPRS;
        }
        _ => {
            key.as_ls = out_key.as_ls;
            key.as_es = out_key.as_es;
            key.as_ngg = out_key.as_ngg;
            if out_key.as_ngg {
                key.num_merged_next_stage_vgprs = ES_GS_COUNTERPART_VGPRS;
            }
        }
    }
    key
}

// ─── Tessellation Control Epilog ─────────────────────────────────────────────

#[must_use]
pub fn tcs_epilog_key(info: &ShaderInfo, bits: &TcsEpilogBits, wave_size: WaveSize) -> TcsEpilogKey {
    let vertices_out = u32::from(info.tcs_vertices_out);
    TcsEpilogKey {
        states: *bits,
        wave32: wave_size.is_wave32(),
        // Patches never straddle a wave, so the barrier has nothing to wait for.
        noop_s_barrier: vertices_out != 0 && wave_size.lanes() % vertices_out == 0,
    }
}

// ─── Fragment Prolog ─────────────────────────────────────────────────────────

/// Barycentric VGPR pair used to interpolate color `index`, or -1 for flat.
///
/// Perspective pairs are sample/center/centroid = 0/2/4, linear pairs
/// 6/8/10.
#[must_use]
pub fn color_interp_vgpr_index(info: &ShaderInfo, states: &PsPrologBits, index: usize) -> i8 {
    let mode = match info.color_interpolate[index] {
        InterpMode::Color if states.flatshade_colors => InterpMode::Flat,
        InterpMode::Color => InterpMode::Smooth,
        mode => mode,
    };
    let location = info.color_interpolate_loc[index];

    let (base, forced_sample, forced_center) = match mode {
        InterpMode::Flat => return -1,
        InterpMode::NoPerspective => (
            6,
            states.force_linear_sample_interp,
            states.force_linear_center_interp,
        ),
        _ => (
            0,
            states.force_persp_sample_interp,
            states.force_persp_center_interp,
        ),
    };
    let location = if forced_sample {
        InterpLocation::Sample
    } else if forced_center {
        InterpLocation::Center
    } else {
        location
    };
    base + match location {
        InterpLocation::Sample => 0,
        InterpLocation::Center => 2,
        InterpLocation::Centroid => 4,
    }
}

/// Face VGPR index used by two-sided color selection.
pub const PS_FACE_VGPR_INDEX: i8 = 12;

#[must_use]
pub fn ps_prolog_key(
    info: &ShaderInfo,
    bits: &PsPrologBits,
    num_input_sgprs: u8,
    wave_size: WaveSize,
) -> PsPrologKey {
    let mut key = PsPrologKey {
        states: *bits,
        wave32: wave_size.is_wave32(),
        num_input_sgprs,
        colors_read: info.colors_read,
        color_attr_index: info.color_attr_index,
        color_interp_vgpr_index: [-1, -1],
        face_vgpr_index: -1,
        wqm: info.has(ShaderFeatures::NEEDS_QUAD_HELPERS),
        ..Default::default()
    };

    if info.colors_read != 0 {
        for i in 0..2 {
            if info.colors_read & (0x0f << (i * 4)) != 0 {
                key.color_interp_vgpr_index[i] = color_interp_vgpr_index(info, bits, i);
            }
        }
        if bits.color_two_side {
            key.num_interp_inputs = info.num_ps_inputs;
            key.face_vgpr_index = PS_FACE_VGPR_INDEX;
        }
    } else {
        key.states.color_two_side = false;
        key.states.flatshade_colors = false;
    }
    key
}

// ─── Fragment Epilog ─────────────────────────────────────────────────────────

#[must_use]
pub fn ps_epilog_key(info: &ShaderInfo, bits: &PsEpilogBits, wave_size: WaveSize) -> PsEpilogKey {
    PsEpilogKey {
        states: *bits,
        wave32: wave_size.is_wave32(),
        colors_written: info.colors_written,
        color_types: info.output_color_types,
        writes_z: info.has(ShaderFeatures::WRITES_Z),
        writes_stencil: info.has(ShaderFeatures::WRITES_STENCIL),
        writes_samplemask: info.has(ShaderFeatures::WRITES_SAMPLEMASK),
        uses_discard: info.has(ShaderFeatures::USES_DISCARD),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment_with_colors() -> ShaderInfo {
        let mut info = ShaderInfo::new(ShaderStage::Fragment);
        info.colors_read = 0xff;
        info.num_ps_inputs = 3;
        info.color_interpolate = [InterpMode::Color, InterpMode::NoPerspective];
        info.color_interpolate_loc = [InterpLocation::Centroid, InterpLocation::Sample];
        info
    }

    #[test]
    fn test_vs_prolog_only_for_used_divisors() {
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.num_inputs = 2;
        let mut bits = VsPrologBits::default();
        assert!(!vs_needs_prolog(&info, &bits));
        bits.instance_divisor_is_one = 0b100;
        assert!(!vs_needs_prolog(&info, &bits));
        bits.instance_divisor_is_one = 0b010;
        assert!(vs_needs_prolog(&info, &bits));
        info.features |= ShaderFeatures::VS_NEEDS_PROLOG;
        assert!(vs_needs_prolog(&info, &VsPrologBits::default()));
    }

    #[test]
    fn test_merged_vgpr_counts() {
        let info = ShaderInfo::new(ShaderStage::Vertex);
        let bits = VsPrologBits::default();
        let ge = GeKey::default();
        let tcs = vs_prolog_key(&info, &bits, 8, WaveSize::Wave64, ShaderStage::TessCtrl, &ge);
        assert_eq!(tcs.num_merged_next_stage_vgprs, 2);
        assert!(tcs.as_ls);

        let gs = vs_prolog_key(&info, &bits, 8, WaveSize::Wave64, ShaderStage::Geometry, &ge);
        assert_eq!(gs.num_merged_next_stage_vgprs, 5);
        assert!(gs.as_es);

        let ngg = GeKey {
            as_ngg: true,
            ..Default::default()
        };
        let vs = vs_prolog_key(&info, &bits, 8, WaveSize::Wave32, ShaderStage::Vertex, &ngg);
        assert_eq!(vs.num_merged_next_stage_vgprs, 5);
        assert!(vs.wave32);

        let plain = vs_prolog_key(&info, &bits, 8, WaveSize::Wave64, ShaderStage::Vertex, &ge);
        assert_eq!(plain.num_merged_next_stage_vgprs, 0);
    }

    #[test]
    fn test_prolog_key_masks_unused_divisors() {
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.num_inputs = 1;
        let bits = VsPrologBits {
            instance_divisor_is_one: 0b11,
            ..Default::default()
        };
        let key = vs_prolog_key(&info, &bits, 4, WaveSize::Wave64, ShaderStage::Vertex, &GeKey::default());
        assert_eq!(key.states.instance_divisor_is_one, 0b01);
    }

    #[test]
    fn test_noop_barrier_when_patches_fit_waves() {
        let mut info = ShaderInfo::new(ShaderStage::TessCtrl);
        info.tcs_vertices_out = 4;
        let bits = TcsEpilogBits::default();
        assert!(tcs_epilog_key(&info, &bits, WaveSize::Wave64).noop_s_barrier);
        info.tcs_vertices_out = 3;
        assert!(!tcs_epilog_key(&info, &bits, WaveSize::Wave64).noop_s_barrier);
        info.tcs_vertices_out = 0;
        assert!(!tcs_epilog_key(&info, &bits, WaveSize::Wave32).noop_s_barrier);
    }

    #[test]
    fn test_color_interp_indices() {
        let info = fragment_with_colors();
        let mut bits = PsPrologBits::default();
        assert_eq!(color_interp_vgpr_index(&info, &bits, 0), 4);
        assert_eq!(color_interp_vgpr_index(&info, &bits, 1), 6);

        bits.force_persp_center_interp = true;
        bits.force_linear_center_interp = true;
        assert_eq!(color_interp_vgpr_index(&info, &bits, 0), 2);
        assert_eq!(color_interp_vgpr_index(&info, &bits, 1), 8);

        bits.flatshade_colors = true;
        assert_eq!(color_interp_vgpr_index(&info, &bits, 0), -1);
    }

    #[test]
    fn test_two_side_records_interp_inputs() {
        let info = fragment_with_colors();
        let bits = PsPrologBits {
            color_two_side: true,
            ..Default::default()
        };
        let key = ps_prolog_key(&info, &bits, 6, WaveSize::Wave64);
        assert!(key.is_needed());
        assert_eq!(key.num_interp_inputs, 3);
        assert_eq!(key.face_vgpr_index, PS_FACE_VGPR_INDEX);

        let no_colors = ShaderInfo::new(ShaderStage::Fragment);
        let key = ps_prolog_key(&no_colors, &bits, 6, WaveSize::Wave64);
        assert!(!key.is_needed());
        assert!(!key.states.color_two_side);
    }

    #[test]
    fn test_epilog_reads_output_info() {
        let mut info = ShaderInfo::new(ShaderStage::Fragment);
        info.colors_written = 0b0001;
        let key = ps_epilog_key(&info, &PsEpilogBits::default(), WaveSize::Wave64);
        assert_eq!(key.colors_written, 1);
        assert!(!key.writes_z);
    }
}
