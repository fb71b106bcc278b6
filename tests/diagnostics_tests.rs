//! Diagnostics Tests
//!
//! Tests for:
//! - Per-request diagnostic sinks
//! - Statistics dumps (text and JSON)
//! - Key dumps

use std::sync::Arc;

use anyhow::Result;
use log::Level;

use prism::prism_compiler::{dump_key, dump_stats, stats_json};
use prism::{CompilerSettings, Device, DiagnosticSink, GfxLevel, KeyBuilder, PipelineState, ShaderStage};
use prism_dev_utils::{MockBackend, RecordingSink, fixtures, init_logger};

fn sync_device(gfx: GfxLevel) -> Result<Device> {
    init_logger();
    let settings = CompilerSettings {
        gfx_level: gfx,
        sync_compile: true,
        ..Default::default()
    };
    Ok(Device::new(settings, Arc::new(MockBackend::new()))?)
}

#[test]
fn request_sink_receives_build_statistics() -> Result<()> {
    let device = sync_device(GfxLevel::Gfx10)?;
    let ps = device.create_selector(fixtures::ir("ps"), fixtures::fragment_with_colors("lit"))?;
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&ps));

    let sink = Arc::new(RecordingSink::new());
    let key = KeyBuilder::build(&ps, &state, device.settings());
    let variant = device.request_variant_with_key(&ps, key, None, Some(sink.clone() as Arc<dyn DiagnosticSink>))?;
    variant.wait()?;

    assert!(sink.contains(Level::Debug, "lit (fragment)"));
    assert!(sink.contains(Level::Debug, "SGPRs"));
    assert!(sink.messages().iter().all(|(level, _)| *level != Level::Error));
    Ok(())
}

#[test]
fn statistics_describe_the_linked_binary() -> Result<()> {
    let device = sync_device(GfxLevel::Gfx9)?;
    let vs = device.create_selector(fixtures::ir("vs"), fixtures::vertex("vs", 2))?;
    let gs = device.create_selector(fixtures::ir("gs"), fixtures::geometry("gs"))?;
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&vs));
    state.bind(Arc::clone(&gs));

    let shader = device.request_variant(&gs, &state)?.wait()?;

    let text = dump_stats(&shader);
    assert!(text.starts_with("gs (geometry)"));
    assert!(text.contains(&format!("{} SGPRs", shader.usage.num_sgprs)));
    assert!(text.contains("wave64"));

    let json = stats_json(&shader);
    assert_eq!(json["name"], "gs");
    assert_eq!(json["wave_size"], 64);
    assert_eq!(json["two_phase"], true);
    assert_eq!(json["monolithic"], false);
    assert_eq!(json["segments"], serde_json::json!(["previous stage", "main"]));
    assert_eq!(json["usage"]["num_vgprs"], shader.usage.num_vgprs);
    Ok(())
}

#[test]
fn key_dump_shows_merge_roles() -> Result<()> {
    let device = sync_device(GfxLevel::Gfx9)?;
    let vs = device.create_selector(fixtures::ir("vs"), fixtures::vertex("vs", 2))?;
    let tcs = device.create_selector(fixtures::ir("tcs"), fixtures::tess_ctrl("tcs", 3))?;
    let mut state = PipelineState::default();
    state.bind(Arc::clone(&vs));
    state.bind(Arc::clone(&tcs));

    let key = KeyBuilder::build(&vs, &state, device.settings());
    let text = dump_key(ShaderStage::Vertex, &key);
    assert!(text.contains("as_ls = true"));
    assert!(text.contains("part.vs.prolog"));

    let key = KeyBuilder::build(&tcs, &state, device.settings());
    let text = dump_key(ShaderStage::TessCtrl, &key);
    assert!(text.contains(&format!("part.tcs.ls = Some({:?})", vs.id())));
    Ok(())
}
