//! Variant Build Tests
//!
//! Tests for:
//! - Split builds: prolog + main + epilog for a two-sided-color fragment program
//! - Main-part reuse and per-configuration main-part slots
//! - Idempotence and determinism of repeated requests
//! - Monolithic builds
//! - Failures: compile errors, retry after failure, resource limits

use std::sync::Arc;

use prism::prism_compiler::LinkedShader;
use prism::prism_core::{AlphaFunc, ShaderPartKey};
use prism::{
    CompilerSettings, Device, GfxLevel, HostUploader, KeyBuilder, LogSink, MainPartSlot, PartCategory,
    PipelineState, PrismError, RegisterUsage, SegmentKind,
};
use prism_dev_utils::{MockBackend, MockTarget, RecordingSink, fixtures, init_logger};

fn sync_settings(gfx: GfxLevel) -> CompilerSettings {
    CompilerSettings {
        gfx_level: gfx,
        sync_compile: true,
        ..Default::default()
    }
}

fn device(settings: CompilerSettings) -> (Device, Arc<MockBackend>) {
    init_logger();
    let backend = Arc::new(MockBackend::new());
    let device = Device::new(settings, backend.clone()).expect("device");
    (device, backend)
}

fn usage(sgprs: u32, vgprs: u32) -> RegisterUsage {
    RegisterUsage {
        num_sgprs: sgprs,
        num_vgprs: vgprs,
        ..Default::default()
    }
}

fn order(shader: &LinkedShader) -> Vec<SegmentKind> {
    shader.order().collect()
}

// ============================================================================
// Fragment: prolog + main + epilog
// ============================================================================

#[test]
fn two_sided_color_links_prolog_main_epilog() {
    let (device, backend) = device(sync_settings(GfxLevel::Gfx10));
    backend.set_usage(MockTarget::Part(PartCategory::PsProlog), usage(10, 40));
    backend.set_usage(MockTarget::Main(MainPartSlot::Plain), usage(20, 32));
    backend.set_usage(MockTarget::Part(PartCategory::PsEpilog), usage(12, 48));

    let ps = device
        .create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("ps"))
        .unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));
    state.rasterizer.two_side = true;

    let key = KeyBuilder::build(&ps, &state, device.settings());
    assert!(key.as_ps().unwrap().part.prolog.color_two_side);
    assert!(!key.has_opt() && !key.has_mono());

    let shader = device.request_variant(&ps, &state).unwrap().wait().unwrap();
    assert!(!shader.monolithic);
    assert_eq!(order(&shader), vec![SegmentKind::Prolog, SegmentKind::Main, SegmentKind::Epilog]);

    let prolog = shader.parts.prolog.as_ref().unwrap();
    let main = shader.parts.main.as_ref().unwrap();
    let epilog = shader.parts.epilog.as_ref().unwrap();
    assert_eq!(shader.code, [prolog.code(), &main.code[..], epilog.code()].concat());
    assert_eq!(shader.usage.num_sgprs, 20);
    assert_eq!(shader.usage.num_vgprs, 48);

    match epilog.key() {
        ShaderPartKey::PsEpilog(k) => {
            assert_eq!(k.colors_written, 0b0001);
            assert!(!k.writes_z);
        }
        other => panic!("unexpected epilog key {other:?}"),
    }
    match prolog.key() {
        ShaderPartKey::PsProlog(k) => {
            assert!(k.states.color_two_side);
            assert_eq!(k.num_interp_inputs, 1);
        }
        other => panic!("unexpected prolog key {other:?}"),
    }

    // A different epilog state reuses the main part unchanged.
    state.alpha_func = AlphaFunc::Greater;
    let second = device.request_variant(&ps, &state).unwrap().wait().unwrap();
    assert!(Arc::ptr_eq(second.parts.main.as_ref().unwrap(), main));
    assert!(Arc::ptr_eq(second.parts.prolog.as_ref().unwrap(), prolog));
    assert!(!Arc::ptr_eq(second.parts.epilog.as_ref().unwrap(), epilog));
    assert_eq!(backend.calls(MockTarget::Main(MainPartSlot::Plain)), 1);
    assert_eq!(ps.variant_count(), 2);
}

#[test]
fn fragment_without_color_reads_has_no_prolog() {
    let (device, _backend) = device(sync_settings(GfxLevel::Gfx10));
    let ps = device
        .create_selector(fixtures::ir("plain-ps"), fixtures::fragment("plain-ps"))
        .unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));
    state.rasterizer.two_side = true;

    let shader = device.request_variant(&ps, &state).unwrap().wait().unwrap();
    assert_eq!(order(&shader), vec![SegmentKind::Main, SegmentKind::Epilog]);
    assert!(shader.parts.prolog.is_none());
}

// ============================================================================
// Main-Part Slots
// ============================================================================

#[test]
fn pre_tessellation_and_pre_geometry_use_distinct_slots() {
    let (device, backend) = device(sync_settings(GfxLevel::Gfx9));
    let vs = device.create_selector(fixtures::ir("vs"), fixtures::vertex("vs", 2)).unwrap();
    let tcs = device.create_selector(fixtures::ir("tcs"), fixtures::tess_ctrl("tcs", 4)).unwrap();
    let tes = device.create_selector(fixtures::ir("tes"), fixtures::tess_eval("tes")).unwrap();
    let gs = device.create_selector(fixtures::ir("gs"), fixtures::geometry("gs")).unwrap();

    // Vertex merged into tessellation control.
    let mut tess = PipelineState::default();
    tess.bind(Arc::clone(&vs));
    tess.bind(Arc::clone(&tcs));
    tess.bind(Arc::clone(&tes));
    let hs = device.request_variant(&tcs, &tess).unwrap().wait().unwrap();
    let ls_part = vs.main_part(MainPartSlot::PreTessellation).expect("LS main part");
    assert!(Arc::ptr_eq(hs.parts.previous_stage.as_ref().unwrap(), &ls_part));
    assert!(vs.main_part(MainPartSlot::PreGeometry).is_none());

    // Vertex merged into geometry.
    let mut geom = PipelineState::default();
    geom.bind(Arc::clone(&vs));
    geom.bind(Arc::clone(&gs));
    let merged_gs = device.request_variant(&gs, &geom).unwrap().wait().unwrap();
    let es_part = vs.main_part(MainPartSlot::PreGeometry).expect("ES main part");
    assert!(Arc::ptr_eq(merged_gs.parts.previous_stage.as_ref().unwrap(), &es_part));

    assert!(!Arc::ptr_eq(&ls_part, &es_part));
    assert_eq!(ls_part.layout.counterpart_vgprs, 2);
    assert_eq!(es_part.layout.counterpart_vgprs, 5);
    assert_eq!(backend.calls(MockTarget::Main(MainPartSlot::PreTessellation)), 1);
    assert_eq!(backend.calls(MockTarget::Main(MainPartSlot::PreGeometry)), 1);

    let slots = vs.populated_slots();
    assert!(slots.contains(&MainPartSlot::PreTessellation));
    assert!(slots.contains(&MainPartSlot::PreGeometry));

    // Building the tessellation variant again touches neither slot.
    let again = device.request_variant(&tcs, &tess).unwrap().wait().unwrap();
    assert!(Arc::ptr_eq(&again, &hs));
    assert_eq!(backend.calls(MockTarget::Main(MainPartSlot::PreTessellation)), 1);
}

#[test]
fn equal_ir_shares_main_parts_across_selectors() {
    let (device, backend) = device(sync_settings(GfxLevel::Gfx10));
    let a = device.create_selector(fixtures::ir("same"), fixtures::fragment("a")).unwrap();
    let b = device.create_selector(fixtures::ir("same"), fixtures::fragment("b")).unwrap();
    let pa = a.main_part(MainPartSlot::Plain).unwrap();
    let pb = b.main_part(MainPartSlot::Plain).unwrap();
    assert!(Arc::ptr_eq(&pa, &pb));
    assert_eq!(backend.calls(MockTarget::Main(MainPartSlot::Plain)), 1);
    assert_eq!(device.context().main_cache_len(), 1);
}

// ============================================================================
// Idempotence & Determinism
// ============================================================================

#[test]
fn repeated_requests_return_the_same_variant() {
    let (device, backend) = device(sync_settings(GfxLevel::Gfx10));
    let ps = device
        .create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("ps"))
        .unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    let first = device.request_variant(&ps, &state).unwrap();
    let calls = backend.total_calls();
    let second = device.request_variant(&ps, &state).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.wait().unwrap(), &second.wait().unwrap()));
    assert_eq!(backend.total_calls(), calls);
    assert_eq!(backend.max_duplicate_compiles(), 1);
    assert_eq!(ps.variant_count(), 1);
}

#[test]
fn equal_keys_produce_identical_binaries_on_separate_devices() {
    let build = || {
        let (device, _backend) = device(sync_settings(GfxLevel::Gfx10_3));
        let ps = device
            .create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("ps"))
            .unwrap();
        let mut state = PipelineState::default();
        state.bind(Arc::clone(&ps));
        state.rasterizer.flatshade = true;
        state.min_samples = 4;
        let shader = device.request_variant(&ps, &state).unwrap().wait().unwrap();
        (KeyBuilder::build(&ps, &state, device.settings()), shader.code.clone())
    };
    let (key_a, code_a) = build();
    let (key_b, code_b) = build();
    assert_eq!(key_a, key_b);
    assert_eq!(code_a, code_b);
}

// ============================================================================
// Monolithic
// ============================================================================

#[test]
fn monolithic_setting_compiles_one_binary() {
    let settings = CompilerSettings {
        use_monolithic_shaders: true,
        ..sync_settings(GfxLevel::Gfx10)
    };
    let (device, backend) = device(settings);
    let ps = device
        .create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("ps"))
        .unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));
    state.rasterizer.two_side = true;

    let variant = device.request_variant(&ps, &state).unwrap();
    assert!(variant.is_monolithic());
    let shader = variant.wait().unwrap();
    assert!(shader.monolithic);
    assert_eq!(order(&shader), vec![SegmentKind::Main]);
    assert!(shader.parts.main.is_none());
    assert_eq!(backend.calls(MockTarget::Monolithic), 1);
    assert_eq!(backend.calls(MockTarget::Part(PartCategory::PsProlog)), 0);
}

#[test]
fn mono_key_bits_force_monolithic() {
    let (device, backend) = device(sync_settings(GfxLevel::Gfx10));
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));
    state.rasterizer.line_smooth = true;

    let shader = device.request_variant(&ps, &state).unwrap().wait().unwrap();
    assert!(shader.monolithic);
    assert_eq!(backend.calls(MockTarget::Monolithic), 1);
}

#[test]
fn monolithic_legacy_geometry_gets_a_copy_shader() {
    let settings = CompilerSettings {
        use_monolithic_shaders: true,
        ..sync_settings(GfxLevel::Gfx9)
    };
    let (device, backend) = device(settings);
    let vs = device.create_selector(fixtures::ir("vs"), fixtures::vertex("vs", 1)).unwrap();
    let gs = device.create_selector(fixtures::ir("gs"), fixtures::geometry("gs")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&vs));
    state.bind(Arc::clone(&gs));

    let shader = device.request_variant(&gs, &state).unwrap().wait().unwrap();
    assert!(shader.monolithic);
    let copy = shader.gs_copy.as_ref().expect("copy shader");

    // A second monolithic variant reuses the selector's copy shader.
    state.vertex_elements.instance_divisor_is_one = 0b1;
    let other = device.request_variant(&gs, &state).unwrap().wait().unwrap();
    assert_eq!(gs.variant_count(), 2);
    assert!(Arc::ptr_eq(copy, other.gs_copy.as_ref().unwrap()));
    assert_eq!(backend.calls(MockTarget::GsCopy), 1);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn failed_part_is_reported_and_retried() {
    let (device, backend) = device(sync_settings(GfxLevel::Gfx10));
    let ps = device
        .create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("ps"))
        .unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    backend.fail_next(MockTarget::Part(PartCategory::PsEpilog), 1);
    let err = device.request_variant(&ps, &state).unwrap().wait().unwrap_err();
    match &err {
        PrismError::Compile { part, .. } => assert_eq!(part, "fragment epilog"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(ps.variant_count(), 0);
    assert_eq!(device.part_cache().len(PartCategory::PsEpilog), 0);

    let shader = device.request_variant(&ps, &state).unwrap().wait().unwrap();
    assert!(shader.parts.epilog.is_some());
    assert_eq!(backend.calls(MockTarget::Part(PartCategory::PsEpilog)), 2);
    assert_eq!(ps.variant_count(), 1);
}

#[test]
fn failed_initial_compile_leaves_slot_empty() {
    let (device, backend) = device(sync_settings(GfxLevel::Gfx10));
    backend.fail_next(MockTarget::Main(MainPartSlot::Plain), 1);
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();

    assert!(matches!(ps.wait_ready(), Err(PrismError::Compile { .. })));
    assert!(ps.main_part(MainPartSlot::Plain).is_none());

    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));
    assert!(device.request_variant(&ps, &state).unwrap().wait().is_ok());
    assert!(ps.main_part(MainPartSlot::Plain).is_some());
}

#[test]
fn register_overflow_is_a_fatal_resource_limit() {
    init_logger();
    let backend = Arc::new(MockBackend::new());
    backend.set_usage(MockTarget::Part(PartCategory::PsEpilog), usage(300, 8));
    let sink = Arc::new(RecordingSink::new());
    let device = Device::with_parts(
        sync_settings(GfxLevel::Gfx10),
        backend,
        Arc::new(HostUploader::new(None)),
        sink.clone(),
    )
    .unwrap();

    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    let err = device.request_variant(&ps, &state).unwrap().wait().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, PrismError::ResourceLimit { resource: "SGPRs", used: 300, .. }));
    assert!(sink.contains(log::Level::Error, "variant build failed"));
}

#[test]
fn upload_exhaustion_is_an_allocation_error() {
    init_logger();
    let settings = CompilerSettings {
        upload_capacity: Some(8),
        ..sync_settings(GfxLevel::Gfx10)
    };
    let device = Device::with_parts(
        settings.clone(),
        Arc::new(MockBackend::new()),
        Arc::new(HostUploader::new(settings.upload_capacity)),
        Arc::new(LogSink),
    )
    .unwrap();
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    let err = device.request_variant(&ps, &state).unwrap().wait().unwrap_err();
    assert!(matches!(err, PrismError::Allocation { .. }));
    assert!(!err.is_fatal());
}
