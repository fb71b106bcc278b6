//! Compile Pipeline Tests
//!
//! Tests for:
//! - Concurrent requests: one variant, one compile per identical part
//! - Part caches shared between selectors
//! - Optimised variants and their unoptimised fallback
//! - Inlined-uniform variant limit
//! - Shutdown draining and post-shutdown submission
//! - Backend panics reported as compile errors
//! - Debug flags applied through settings

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use prism::{
    CompilerSettings, DebugFlags, Device, GfxLevel, MainPartSlot, PartCategory, PipelineState, PrismError,
    ShaderStage, WaveSize,
};
use prism_dev_utils::{MockBackend, MockTarget, fixtures, init_logger};

fn async_device(backend: MockBackend, threads: usize) -> (Device, Arc<MockBackend>) {
    init_logger();
    let backend = Arc::new(backend);
    let settings = CompilerSettings {
        num_compiler_threads: threads,
        num_low_priority_threads: 1,
        ..Default::default()
    };
    let device = Device::new(settings, backend.clone()).expect("device");
    (device, backend)
}

fn sync_device(settings: CompilerSettings) -> (Device, Arc<MockBackend>) {
    init_logger();
    let backend = Arc::new(MockBackend::new());
    let settings = CompilerSettings {
        sync_compile: true,
        ..settings
    };
    let device = Device::new(settings, backend.clone()).expect("device");
    (device, backend)
}

fn with_uniforms(state: &PipelineState, first: u32) -> PipelineState {
    let mut state = state.clone();
    state.inlinable_uniforms[ShaderStage::Fragment as usize] = Some([first, 0, 0, 0]);
    state
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_requests_share_one_variant() {
    let (device, backend) = async_device(MockBackend::new().with_delay(Duration::from_millis(5)), 4);
    let ps = device
        .create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("ps"))
        .unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    let variants: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| device.request_variant(&ps, &state).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let first = &variants[0];
    assert!(variants.iter().all(|v| Arc::ptr_eq(v, first)));
    let shader = first.wait().unwrap();
    for v in &variants {
        assert!(Arc::ptr_eq(&v.wait().unwrap(), &shader));
    }
    assert_eq!(ps.variant_count(), 1);
    assert_eq!(backend.calls(MockTarget::Main(MainPartSlot::Plain)), 1);
    assert_eq!(backend.max_duplicate_compiles(), 1);
}

#[test]
fn selectors_share_prologs_and_epilogs() {
    let (device, backend) = async_device(MockBackend::new().with_delay(Duration::from_millis(2)), 4);
    let selectors: Vec<_> = (0..8)
        .map(|i| {
            device
                .create_selector(fixtures::ir(&format!("ps{i}")), fixtures::fragment_with_colors("ps"))
                .unwrap()
        })
        .collect();

    let variants: Vec<_> = selectors
        .iter()
        .map(|ps| {
            let mut state = PipelineState::default();
            state.bind(Arc::clone(ps));
            state.rasterizer.two_side = true;
            device.request_variant(ps, &state).unwrap()
        })
        .collect();
    let shaders: Vec<_> = variants.iter().map(|v| v.wait().unwrap()).collect();

    let epilog = shaders[0].parts.epilog.as_ref().unwrap();
    for shader in &shaders {
        assert!(Arc::ptr_eq(shader.parts.epilog.as_ref().unwrap(), epilog));
    }
    assert_eq!(backend.calls(MockTarget::Part(PartCategory::PsProlog)), 1);
    assert_eq!(backend.calls(MockTarget::Part(PartCategory::PsEpilog)), 1);
    assert_eq!(backend.calls(MockTarget::Main(MainPartSlot::Plain)), 8);
    assert_eq!(backend.max_duplicate_compiles(), 1);

    let stats = device.part_cache().stats(PartCategory::PsEpilog);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.lookups, 8);
}

#[test]
fn workers_compile_in_parallel() {
    let (device, backend) = async_device(MockBackend::new().with_delay(Duration::from_millis(20)), 4);
    let selectors: Vec<_> = (0..8)
        .map(|i| {
            device
                .create_selector(fixtures::ir(&format!("ps{i}")), fixtures::fragment("ps"))
                .unwrap()
        })
        .collect();
    for ps in &selectors {
        ps.wait_ready().unwrap();
    }
    assert!(backend.max_in_flight() > 1);
    assert!(backend.max_in_flight() <= 4);
}

// ============================================================================
// Optimised Variants
// ============================================================================

#[test]
fn inlined_uniforms_make_an_optimized_monolithic_variant() {
    let (device, backend) = sync_device(CompilerSettings::default());
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    let variant = device.request_variant(&ps, &with_uniforms(&state, 7)).unwrap();
    assert!(variant.is_optimized());
    assert!(variant.is_monolithic());
    assert_eq!(variant.key().inlined_uniform_values()[0], 7);
    assert!(variant.wait().unwrap().monolithic);
    assert_eq!(backend.calls(MockTarget::Monolithic), 1);
}

#[test]
fn failed_optimized_variant_falls_back() {
    let (device, backend) = sync_device(CompilerSettings::default());
    let ps = device
        .create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("ps"))
        .unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    backend.fail_next(MockTarget::Monolithic, 1);
    let shader = device.select_variant(&ps, &with_uniforms(&state, 3)).unwrap();
    assert!(!shader.monolithic);
    assert!(shader.parts.prolog.is_some());

    // The fallback is the variant an unoptimised request would get.
    let plain = device.request_variant(&ps, &state).unwrap().wait().unwrap();
    assert!(Arc::ptr_eq(&shader, &plain));
}

#[test]
fn pending_optimized_variant_falls_back_then_takes_over() {
    let (device, _backend) = async_device(MockBackend::new().with_delay(Duration::from_millis(50)), 2);
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    ps.wait_ready().unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));
    let optimized_state = with_uniforms(&state, 1);

    let first = device.select_variant(&ps, &optimized_state).unwrap();
    assert!(!first.monolithic);

    let optimized = device.request_variant(&ps, &optimized_state).unwrap().wait().unwrap();
    assert!(optimized.monolithic);
    let later = device.select_variant(&ps, &optimized_state).unwrap();
    assert!(Arc::ptr_eq(&later, &optimized));
}

#[test]
fn disabled_optimizations_strip_opt_bits() {
    let settings = CompilerSettings::default().with_debug_flags(DebugFlags::NO_OPT_VARIANT);
    let (device, backend) = sync_device(settings);
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    let variant = device.request_variant(&ps, &with_uniforms(&state, 9)).unwrap();
    assert!(!variant.is_optimized());
    assert!(!variant.is_monolithic());
    variant.wait().unwrap();
    assert_eq!(backend.calls(MockTarget::Monolithic), 0);
}

#[test]
fn inlined_uniform_variants_are_capped() {
    let settings = CompilerSettings {
        max_inline_uniform_variants: 2,
        ..Default::default()
    };
    let (device, _backend) = sync_device(settings);
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    let a = device.request_variant(&ps, &with_uniforms(&state, 1)).unwrap();
    let b = device.request_variant(&ps, &with_uniforms(&state, 2)).unwrap();
    let c = device.request_variant(&ps, &with_uniforms(&state, 3)).unwrap();
    let d = device.request_variant(&ps, &with_uniforms(&state, 4)).unwrap();

    assert!(a.key().inline_uniforms());
    assert!(b.key().inline_uniforms());
    assert!(!c.key().inline_uniforms());
    assert!(Arc::ptr_eq(&c, &d));
    assert_eq!(ps.variant_count(), 3);

    // Values already inlined keep their variant.
    let again = device.request_variant(&ps, &with_uniforms(&state, 1)).unwrap();
    assert!(Arc::ptr_eq(&again, &a));
}

// ============================================================================
// Backend Panics
// ============================================================================

#[test]
fn backend_panics_fail_the_request_and_keep_workers_alive() {
    let backend = MockBackend::new();
    backend.panic_next(MockTarget::Main(MainPartSlot::Plain), 1);
    backend.panic_next(MockTarget::Part(PartCategory::PsEpilog), 1);
    backend.panic_next(MockTarget::Monolithic, 1);
    let (device, backend) = async_device(backend, 1);

    let ps = device
        .create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("ps"))
        .unwrap();
    let err = ps.wait_ready().unwrap_err();
    assert!(matches!(err, PrismError::Compile { ref part, .. } if part == "main"));

    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    // The main part is rebuilt, then the epilog panics.
    let err = device.request_variant(&ps, &state).unwrap().wait().unwrap_err();
    assert!(matches!(
        err,
        PrismError::Compile { ref part, ref message } if part == "fragment epilog" && message.contains("injected panic")
    ));
    assert_eq!(ps.variant_count(), 0);

    let shader = device.request_variant(&ps, &state).unwrap().wait().unwrap();
    assert!(!shader.monolithic);
    assert_eq!(backend.calls(MockTarget::Main(MainPartSlot::Plain)), 2);

    // Monolithic compiles run on the low-priority worker.
    let optimized = with_uniforms(&state, 7);
    let err = device.request_variant(&ps, &optimized).unwrap().wait().unwrap_err();
    assert!(matches!(err, PrismError::Compile { .. }));
    assert!(device.request_variant(&ps, &optimized).unwrap().wait().unwrap().monolithic);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn shutdown_drains_queued_jobs() {
    let (device, _backend) = async_device(MockBackend::new().with_delay(Duration::from_millis(10)), 1);
    let ps = device
        .create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("ps"))
        .unwrap();

    let variants: Vec<_> = (0..6u8)
        .map(|i| {
            let mut state = PipelineState::default();
            state.bind(Arc::clone(&ps));
            state.framebuffer.nr_cbufs = i + 1;
            device.request_variant(&ps, &state).unwrap()
        })
        .collect();

    device.shutdown();
    assert!(device.is_shut_down());
    assert!(ps.is_ready());
    for variant in &variants {
        assert!(variant.is_ready());
        assert!(variant.try_result().unwrap().is_ok());
    }
}

#[test]
fn submissions_after_shutdown_are_rejected() {
    let (device, _backend) = async_device(MockBackend::new(), 1);
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    device.shutdown();

    let err = device
        .create_selector(fixtures::ir("late"), fixtures::fragment("late"))
        .unwrap_err();
    assert_eq!(err, PrismError::Shutdown);

    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));
    state.alpha_func = prism::prism_core::AlphaFunc::Less;
    assert_eq!(device.request_variant(&ps, &state).unwrap_err(), PrismError::Shutdown);
    assert_eq!(ps.variant_count(), 0);
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn wave_debug_flags_override_the_default() {
    let flags = DebugFlags::parse("w32ps");
    let (device, _backend) = sync_device(CompilerSettings::default().with_debug_flags(flags));
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    let shader = device.request_variant(&ps, &state).unwrap().wait().unwrap();
    assert_eq!(shader.wave_size, WaveSize::Wave32);
    assert!(matches!(
        shader.parts.epilog.as_ref().unwrap().key(),
        prism::ShaderPartKey::PsEpilog(k) if k.wave32
    ));

    let (device, _backend) = sync_device(CompilerSettings::default());
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));
    let shader = device.request_variant(&ps, &state).unwrap().wait().unwrap();
    assert_eq!(shader.wave_size, WaveSize::Wave64);
}

#[test]
fn settings_load_from_json() {
    let settings: CompilerSettings = serde_json::from_str(
        r#"{ "gfx_level": "Gfx8", "sync_compile": true, "debug_flags": "MONOLITHIC" }"#,
    )
    .unwrap();
    assert_eq!(settings.gfx_level, GfxLevel::Gfx8);
    assert!(settings.debug_flags.contains(DebugFlags::MONOLITHIC));

    let settings = settings.clone().with_debug_flags(settings.debug_flags);
    let (device, backend) = sync_device(settings);
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));
    assert!(device.request_variant(&ps, &state).unwrap().wait().unwrap().monolithic);
    assert_eq!(backend.calls(MockTarget::Monolithic), 1);
}

#[test]
fn backend_label_must_match_the_backend() {
    init_logger();
    let settings = CompilerSettings {
        sync_compile: true,
        backend_label: Some("llvm".to_owned()),
        ..Default::default()
    };
    let err = Device::new(settings.clone(), Arc::new(MockBackend::new())).unwrap_err();
    assert!(matches!(err, PrismError::Config(ref m) if m.contains("'mock'") && m.contains("'llvm'")));

    let device = Device::new(settings, Arc::new(MockBackend::new().with_label("llvm"))).unwrap();
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment("ps")).unwrap();
    ps.wait_ready().unwrap();
}
