//! Fixed worker pool for row-stripe kernels.
//!
//! The pool exposes one primitive, [`ThreadPool::parallel_for`], which
//! splits `[start, end)` into one contiguous chunk per worker (the last
//! chunk absorbs the remainder) and blocks until every chunk has run.
//!
//! Synchronization is a generation counter: the caller publishes the task
//! under the state mutex, bumps the generation, and broadcasts. Workers
//! sleep until the generation moves past the one they last ran, execute
//! their chunk, and decrement a pending counter; the last one signals the
//! caller. No allocation happens per call and no task queue ever grows.
//!
//! With a single thread the pool spawns no workers at all and
//! `parallel_for` runs inline on the caller.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type TaskFn = dyn Fn(usize, usize) + Sync;

/// A published task: a lifetime-erased closure pointer plus its range.
/// The pointer stays valid for the whole dispatch because `parallel_for`
/// does not return until `pending` reaches zero.
#[derive(Clone, Copy)]
struct Task {
    func: *const TaskFn,
    start: usize,
    end: usize,
}

unsafe impl Send for Task {}

struct PoolState {
    task: Option<Task>,
    generation: u64,
    pending: usize,
    stop: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    work: Condvar,
    done: Condvar,
}

/// Fixed-size worker pool. Dropping it stops and joins every worker.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    threads: usize,
}

/// Contiguous chunk of `[start, end)` owned by worker `id`.
#[inline]
fn chunk_range(start: usize, end: usize, threads: usize, id: usize) -> (usize, usize) {
    let n = end - start;
    let base = n / threads;
    let chunk_start = start + id * base;
    let chunk_end = if id + 1 == threads {
        end
    } else {
        chunk_start + base
    };
    (chunk_start, chunk_end)
}

fn worker_loop(shared: Arc<PoolShared>, id: usize, threads: usize) {
    let mut seen = 0u64;
    loop {
        let task = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.stop {
                    return;
                }
                if state.generation != seen {
                    seen = state.generation;
                    break state.task.expect("generation advanced without a task");
                }
                state = shared.work.wait(state).unwrap();
            }
        };

        let (chunk_start, chunk_end) = chunk_range(task.start, task.end, threads, id);
        if chunk_end > chunk_start {
            // Safety: the closure outlives this call; `parallel_for` blocks
            // until every worker has decremented `pending`.
            unsafe { (&*task.func)(chunk_start, chunk_end) };
        }

        let mut state = shared.state.lock().unwrap();
        state.pending -= 1;
        if state.pending == 0 {
            shared.done.notify_one();
        }
    }
}

impl ThreadPool {
    /// Build a pool of `threads` workers. Values below 2 produce an inline
    /// pool with no OS threads.
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                task: None,
                generation: 0,
                pending: 0,
                stop: false,
            }),
            work: Condvar::new(),
            done: Condvar::new(),
        });

        let mut workers = Vec::new();
        if threads > 1 {
            for id in 0..threads {
                let shared = Arc::clone(&shared);
                let handle = std::thread::Builder::new()
                    .name(format!("sim2d-worker-{id}"))
                    .spawn(move || worker_loop(shared, id, threads))
                    .expect("failed to spawn worker thread");
                workers.push(handle);
            }
            log::info!("spawned {} simulation worker threads", threads);
        }

        Self {
            shared,
            workers,
            threads,
        }
    }

    /// Number of chunks a range is split into.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `f(chunk_start, chunk_end)` over `[start, end)` split into one
    /// chunk per worker, returning once every chunk has completed.
    pub fn parallel_for<F>(&self, start: usize, end: usize, f: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        if end <= start {
            return;
        }
        if self.threads <= 1 {
            f(start, end);
            return;
        }

        // Erase the borrow lifetime of the closure. Sound: this function
        // holds `f` alive and does not return until `pending == 0`, i.e.
        // until no worker can touch the pointer again.
        let task_ref: &(dyn Fn(usize, usize) + Sync) = &f;
        let func: *const TaskFn = unsafe { std::mem::transmute(task_ref) };

        let mut state = self.shared.state.lock().unwrap();
        state.task = Some(Task { func, start, end });
        state.pending = self.threads;
        state.generation = state.generation.wrapping_add(1);
        self.shared.work.notify_all();
        while state.pending > 0 {
            state = self.shared.done.wait(state).unwrap();
        }
        state.task = None;
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.stop = true;
            self.shared.work.notify_all();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Shared mutable pointer into a field buffer, handed to stripe kernels.
///
/// Streaming is scatter-push: a stripe may write into rows owned by the
/// neighboring stripe, but each destination slot is written by exactly one
/// source cell per pass, so plain stores need no synchronization. The
/// wrapper exists to make those stores explicit and to carry `Send + Sync`
/// across the pool boundary.
#[derive(Clone, Copy)]
pub(crate) struct SharedPtr<T>(*mut T);

unsafe impl<T: Send> Send for SharedPtr<T> {}
unsafe impl<T: Send> Sync for SharedPtr<T> {}

impl<T: Copy> SharedPtr<T> {
    #[inline]
    pub fn new(ptr: *mut T) -> Self {
        Self(ptr)
    }

    /// Store `value` at `index`.
    ///
    /// Safety: `index` is in bounds and no other stripe writes the same
    /// slot during the pass.
    #[inline]
    pub unsafe fn write(self, index: usize, value: T) {
        *self.0.add(index) = value;
    }
}
