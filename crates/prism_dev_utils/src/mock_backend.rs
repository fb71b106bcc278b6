//! Instrumented, deterministic code generator.
//!
//! Every request compiles to a short binary derived from an xxh3 hash of the
//! whole request, so equal requests give byte-identical code. The backend
//! counts invocations per target and per request identity, and can be told
//! to fail, to panic, to report a given register usage or to take a while.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_64;

use prism_compiler::{CodegenBackend, CompileRequest, CompileTarget, CompiledCode, MainPartSlot};
use prism_core::{PartCategory, RegisterUsage};

/// Coarse target identity used for counters and injected behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockTarget {
    Main(MainPartSlot),
    Monolithic,
    Part(PartCategory),
    GsCopy,
}

impl MockTarget {
    #[must_use]
    pub fn of(target: &CompileTarget) -> Self {
        match target {
            CompileTarget::Main(slot) => Self::Main(*slot),
            CompileTarget::Monolithic => Self::Monolithic,
            CompileTarget::Part(key) => Self::Part(key.category()),
            CompileTarget::GsCopy => Self::GsCopy,
        }
    }

    /// First byte of every binary produced for this target.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Main(slot) => 0x10 + slot.index() as u8,
            Self::Monolithic => 0x20,
            Self::Part(category) => 0x30 + category.index() as u8,
            Self::GsCopy => 0x40,
        }
    }
}

#[derive(Default)]
struct Counters {
    by_target: FxHashMap<MockTarget, usize>,
    by_request: FxHashMap<u64, usize>,
    fail_next: FxHashMap<MockTarget, usize>,
    panic_next: FxHashMap<MockTarget, usize>,
    usage: FxHashMap<MockTarget, RegisterUsage>,
}

pub struct MockBackend {
    label: String,
    delay: Option<Duration>,
    counters: Mutex<Counters>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            label: "mock".to_owned(),
            delay: None,
            counters: Mutex::new(Counters::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sleep for `delay` inside every compile.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: &str) -> Self {
        label.clone_into(&mut self.label);
        self
    }

    // === Injection ===

    /// Make the next `count` compiles of `target` fail.
    pub fn fail_next(&self, target: MockTarget, count: usize) {
        self.counters.lock().fail_next.insert(target, count);
    }

    /// Make the next `count` compiles of `target` panic.
    pub fn panic_next(&self, target: MockTarget, count: usize) {
        self.counters.lock().panic_next.insert(target, count);
    }

    /// Report `usage` for every compile of `target`.
    pub fn set_usage(&self, target: MockTarget, usage: RegisterUsage) {
        self.counters.lock().usage.insert(target, usage);
    }

    // === Counters ===

    /// Compiles of `target`, failed ones included.
    #[must_use]
    pub fn calls(&self, target: MockTarget) -> usize {
        self.counters.lock().by_target.get(&target).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.counters.lock().by_target.values().sum()
    }

    /// Highest number of times one identical request was compiled.
    #[must_use]
    pub fn max_duplicate_compiles(&self) -> usize {
        self.counters.lock().by_request.values().copied().max().unwrap_or(0)
    }

    /// Highest number of compiles that ran at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    // === Code generation ===

    /// Hash identifying everything the request asks for.
    #[must_use]
    pub fn request_hash(request: &CompileRequest<'_>) -> u64 {
        let mut bytes = Vec::with_capacity(128);
        bytes.push(MockTarget::of(&request.target).tag());
        bytes.push(request.stage as u8);
        bytes.push(request.options.gfx as u8);
        bytes.extend_from_slice(&request.options.wave_size.lanes().to_le_bytes());
        bytes.push(request.layout.reserved_sgprs);
        bytes.push(request.layout.counterpart_vgprs);
        if let Some(ir) = request.ir {
            bytes.extend_from_slice(&ir.content_hash().to_le_bytes());
        }
        if let Some(ir) = request.previous_ir {
            bytes.extend_from_slice(&ir.content_hash().to_le_bytes());
        }
        if let CompileTarget::Part(key) = &request.target {
            bytes.extend_from_slice(format!("{key:?}").as_bytes());
        }
        bytes.extend_from_slice(&request.options.key_bytes);
        xxh3_64(&bytes)
    }

    fn generate(target: MockTarget, request: &CompileRequest<'_>, hash: u64) -> CompiledCode {
        let mut code = Vec::with_capacity(10);
        code.push(target.tag());
        code.push(request.stage as u8);
        code.extend_from_slice(&hash.to_le_bytes());

        let usage = RegisterUsage {
            num_sgprs: 8 + (hash % 16) as u32,
            num_vgprs: 4 + ((hash >> 8) % 32) as u32,
            ..Default::default()
        };
        CompiledCode {
            code,
            usage,
            num_input_sgprs: request.layout.reserved_sgprs + 4,
            num_input_vgprs: request.layout.counterpart_vgprs + 2,
        }
    }
}

impl CodegenBackend for MockBackend {
    fn label(&self) -> &str {
        &self.label
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompiledCode, String> {
        let target = MockTarget::of(&request.target);
        let hash = Self::request_hash(request);

        let (fail, panics, usage) = {
            let mut counters = self.counters.lock();
            *counters.by_target.entry(target).or_insert(0) += 1;
            *counters.by_request.entry(hash).or_insert(0) += 1;
            let fail = take_one(&mut counters.fail_next, target);
            let panics = take_one(&mut counters.panic_next, target);
            (fail, panics, counters.usage.get(&target).copied())
        };
        if panics {
            panic!("mock backend: injected panic for {target:?}");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if fail {
            log::debug!("mock backend: injected failure for {target:?}");
            return Err(format!("injected failure ({target:?})"));
        }
        let mut compiled = Self::generate(target, request, hash);
        if let Some(usage) = usage {
            compiled.usage = usage;
        }
        Ok(compiled)
    }
}

/// Consume one pending injection for `target`.
fn take_one(pending: &mut FxHashMap<MockTarget, usize>, target: MockTarget) -> bool {
    match pending.get_mut(&target) {
        Some(n) if *n > 0 => {
            *n -= 1;
            true
        }
        _ => false,
    }
}
