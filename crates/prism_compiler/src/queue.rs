//! Async Compile Pipeline
//!
//! Two bounded worker pools fed by `flume` channels:
//!
//! | Queue    | Jobs                                         | Threads                    |
//! |----------|----------------------------------------------|----------------------------|
//! | normal   | initial compiles, unoptimised variants       | `num_compiler_threads`     |
//! | low      | optimised variants                           | `num_low_priority_threads` |
//!
//! A worker runs each job to completion on its own thread and publishes the
//! outcome through the job's fence. [`AsyncCompilePipeline::submit`] only
//! blocks while a queue is full. With `sync_compile` the submitting thread
//! runs the job itself.
//!
//! There is no cancellation. [`AsyncCompilePipeline::shutdown`] closes the
//! channels; workers finish every job already queued, then exit.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use prism_core::{PrismError, Result};

use crate::context::CompilerContext;
use crate::diagnostics::DiagnosticSink;
use crate::selector::ShaderSelector;
use crate::variant::ShaderVariant;

/// One unit of asynchronous work.
pub enum CompileJob {
    /// Compile the guessed main part of a new selector.
    InitialCompile { selector: Arc<ShaderSelector> },
    /// Build and link one variant.
    BuildVariant {
        variant: Arc<ShaderVariant>,
        selector: Arc<ShaderSelector>,
        previous: Option<Arc<ShaderSelector>>,
        /// Per-request sink; the device sink when `None`.
        sink: Option<Arc<dyn DiagnosticSink>>,
    },
}

impl CompileJob {
    fn describe(&self) -> String {
        match self {
            Self::InitialCompile { selector } => format!("initial compile of '{}'", selector.name()),
            Self::BuildVariant { selector, .. } => format!("variant of '{}'", selector.name()),
        }
    }
}

impl std::fmt::Debug for CompileJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Normal,
    Low,
}

struct Queues {
    normal: flume::Sender<CompileJob>,
    low: flume::Sender<CompileJob>,
}

pub struct AsyncCompilePipeline {
    ctx: Arc<CompilerContext>,
    queues: Mutex<Option<Queues>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    sync: bool,
}

impl AsyncCompilePipeline {
    /// Start the worker pools described by the context's settings.
    pub fn new(ctx: Arc<CompilerContext>) -> Result<Self> {
        let settings = ctx.settings();
        let sync = settings.sync_compile;
        let capacity = settings.queue_capacity.max(1);
        let (normal_tx, normal_rx) = flume::bounded(capacity);
        let (low_tx, low_rx) = flume::bounded(capacity);

        let mut workers = Vec::new();
        if !sync {
            let pools = [
                ("prism-compile", settings.num_compiler_threads.max(1), normal_rx),
                ("prism-compile-low", settings.num_low_priority_threads.max(1), low_rx),
            ];
            for (prefix, count, rx) in pools {
                for i in 0..count {
                    let rx = rx.clone();
                    let ctx = Arc::clone(&ctx);
                    let handle = std::thread::Builder::new()
                        .name(format!("{prefix}-{i}"))
                        .spawn(move || worker_loop(&ctx, &rx))
                        .map_err(|e| PrismError::allocation(format!("compiler thread: {e}"), 0))?;
                    workers.push(handle);
                }
            }
            log::debug!("Compile pipeline started with {} workers", workers.len());
        }

        Ok(Self {
            ctx,
            queues: Mutex::new(Some(Queues {
                normal: normal_tx,
                low: low_tx,
            })),
            workers: Mutex::new(workers),
            sync,
        })
    }

    #[inline]
    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.sync
    }

    /// Queue `job`, or run it inline in sync mode.
    pub fn submit(&self, job: CompileJob, priority: Priority) -> Result<()> {
        let sender = {
            let queues = self.queues.lock();
            let queues = queues.as_ref().ok_or(PrismError::Shutdown)?;
            match priority {
                Priority::Normal => queues.normal.clone(),
                Priority::Low => queues.low.clone(),
            }
        };
        if self.sync {
            self.ctx.execute(job);
            return Ok(());
        }
        log::trace!("Queueing {} ({priority:?})", job.describe());
        sender.send(job).map_err(|_| PrismError::Shutdown)
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.queues.lock().is_none()
    }

    /// Close both queues and join the workers after they drain.
    pub fn shutdown(&self) {
        if self.queues.lock().take().is_none() {
            return;
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        let count = workers.len();
        for handle in workers {
            if handle.join().is_err() {
                log::error!("Compiler thread panicked");
            }
        }
        log::debug!("Compile pipeline shut down ({count} workers joined)");
    }
}

impl Drop for AsyncCompilePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(ctx: &CompilerContext, rx: &flume::Receiver<CompileJob>) {
    // `recv` keeps returning queued jobs after every sender is gone.
    while let Ok(job) = rx.recv() {
        let what = job.describe();
        if panic::catch_unwind(AssertUnwindSafe(|| ctx.execute(job))).is_err() {
            log::error!("Compiler thread recovered from a panic in {what}");
        }
    }
}
