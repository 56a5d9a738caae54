//! Worker pool and frame synchronization
//!
//! Workers park on a condition variable between batches and run the
//! vertex, raster, and shading phases when dispatched. The in-batch phase
//! transition is a spin barrier (see `RenderCore::vertex_barrier`); blocking
//! synchronization is used only for the idle edge.

use crate::internal::RenderCore;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

pub(crate) const STATE_VERTEX: u32 = 0;
pub(crate) const STATE_RASTER: u32 = 1;

pub(crate) struct FrameSync {
    /// Current batch phase; workers idle while it reads RASTER.
    pub state: AtomicU32,
    /// Threads still working in the current phase pass.
    pub working: AtomicU32,
    pub shutdown: AtomicBool,

    /// Raster-phase job cursor.
    pub jobs_rt: AtomicU32,
    /// Shading-phase job cursor, independent of the raster cursor.
    pub jobs_ft: AtomicU32,
    /// Number of jobs enqueued this batch.
    pub jobs_end: AtomicU32,

    wake_lock: Mutex<()>,
    pub wake_cond: Condvar,
}

impl FrameSync {
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(STATE_RASTER),
            working: AtomicU32::new(0),
            shutdown: AtomicBool::new(false),
            jobs_rt: AtomicU32::new(0),
            jobs_ft: AtomicU32::new(0),
            jobs_end: AtomicU32::new(0),
            wake_lock: Mutex::new(()),
            wake_cond: Condvar::new(),
        }
    }

    #[inline]
    pub fn wake_guard(&self) -> MutexGuard<'_, ()> {
        self.wake_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block the calling thread until every worker has finished the current
    /// batch. This is the quiescence gate in front of every state mutation.
    pub fn wait_idle(&self) {
        while self.working.load(Ordering::Acquire) != 0 {
            thread::yield_now();
        }
    }

    pub fn reset_jobs(&self) {
        self.jobs_rt.store(0, Ordering::Release);
        self.jobs_ft.store(0, Ordering::Release);
        self.jobs_end.store(0, Ordering::Release);
    }
}

/// Spawn the persistent workers (ids 1..n; the main thread is worker 0).
pub(crate) fn spawn_workers(core: &Arc<RenderCore>) -> Vec<JoinHandle<()>> {
    (1..core.num_threads)
        .map(|tid| {
            let core = Arc::clone(core);
            thread::Builder::new()
                .name(format!("raster-{tid}"))
                .spawn(move || worker_main(core, tid))
                .expect("failed to spawn raster worker")
        })
        .collect()
}

fn worker_main(core: Arc<RenderCore>, tid: usize) {
    let sync = &core.sync;
    loop {
        // Idle edge: sleep until a dispatch flips the state to VERTEX. The
        // predicate is re-checked under the lock, so a dispatch between the
        // counter decrement and this wait cannot be missed.
        {
            let mut guard = sync.wake_guard();
            while sync.state.load(Ordering::Acquire) == STATE_RASTER
                && !sync.shutdown.load(Ordering::Acquire)
            {
                guard = sync
                    .wake_cond
                    .wait(guard)
                    .unwrap_or_else(|e| e.into_inner());
            }
        }
        if sync.shutdown.load(Ordering::Acquire) {
            return;
        }

        // Safety: this worker owns arena `tid`.
        unsafe { core.arena(tid).reset() };
        core.process_vertices(tid);
        core.vertex_barrier();
        core.process_tiles(tid);
        core.process_fragments(tid);

        sync.working.fetch_sub(1, Ordering::AcqRel);
    }
}
