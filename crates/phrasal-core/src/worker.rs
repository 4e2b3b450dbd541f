use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread;

use tracing::{debug, info};

/// Restores submission order for results that complete out of order.
pub(crate) struct ReorderBuffer<R> {
    next: usize,
    pending: BTreeMap<usize, R>,
}

impl<R> ReorderBuffer<R> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Accept result `index` and emit every result that is now in order.
    pub fn push(&mut self, index: usize, item: R, mut emit: impl FnMut(usize, R)) {
        self.pending.insert(index, item);
        while let Some(item) = self.pending.remove(&self.next) {
            emit(self.next, item);
            self.next += 1;
        }
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Run `work` over `jobs` on `threads` scoped worker threads and hand the
/// results to `sink` in submission order.
///
/// Jobs are pulled from a bounded shared queue; each worker passes its own
/// index to `work` so per-worker state can be selected without locking
/// contention. Once `cancelled` is set no further job is dispatched, but
/// jobs already queued run to completion. `work` must not panic.
///
/// Returns the number of jobs dispatched.
pub(crate) fn run_ordered<T, R, W, S>(
    threads: usize,
    jobs: impl IntoIterator<Item = T>,
    cancelled: &AtomicBool,
    work: W,
    mut sink: S,
) -> io::Result<usize>
where
    T: Send,
    R: Send,
    W: Fn(usize, usize, T) -> R + Sync,
    S: FnMut(usize, R),
{
    let threads = threads.max(1);
    let (job_tx, job_rx) = mpsc::sync_channel::<(usize, T)>(threads * 2);
    let job_rx = Mutex::new(job_rx);
    let (result_tx, result_rx) = mpsc::channel::<(usize, R)>();
    let mut reorder = ReorderBuffer::new();

    let submitted = thread::scope(|scope| -> io::Result<usize> {
        for worker in 0..threads {
            let job_rx = &job_rx;
            let result_tx = result_tx.clone();
            let work = &work;
            thread::Builder::new()
                .name(format!("phrasal-worker-{worker}"))
                .spawn_scoped(scope, move || loop {
                    let next = match job_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    let Ok((index, job)) = next else {
                        break;
                    };
                    let out = work(worker, index, job);
                    if result_tx.send((index, out)).is_err() {
                        break;
                    }
                })?;
        }
        drop(result_tx);
        info!(threads, "worker pool started");

        let mut submitted = 0;
        for job in jobs {
            if cancelled.load(Ordering::SeqCst) {
                info!(submitted, "dispatch cancelled");
                break;
            }
            if job_tx.send((submitted, job)).is_err() {
                break;
            }
            submitted += 1;
            while let Ok((index, out)) = result_rx.try_recv() {
                reorder.push(index, out, &mut sink);
            }
        }
        drop(job_tx);

        for (index, out) in result_rx.iter() {
            reorder.push(index, out, &mut sink);
        }
        Ok(submitted)
    })?;

    debug!(submitted, drained = reorder.is_drained(), "worker pool finished");
    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reorder_buffer_emits_in_sequence() {
        let mut buf = ReorderBuffer::new();
        let mut out = Vec::new();
        buf.push(2, 'c', |i, c| out.push((i, c)));
        buf.push(0, 'a', |i, c| out.push((i, c)));
        assert_eq!(out, vec![(0, 'a')]);
        buf.push(1, 'b', |i, c| out.push((i, c)));
        assert_eq!(out, vec![(0, 'a'), (1, 'b'), (2, 'c')]);
        assert!(buf.is_drained());
    }

    #[test]
    fn results_arrive_in_submission_order() {
        let cancelled = AtomicBool::new(false);
        let mut seen = Vec::new();
        let n = run_ordered(
            4,
            0..40u64,
            &cancelled,
            |_, _, x| {
                // Later jobs finish first.
                thread::sleep(Duration::from_micros((40 - x) * 50));
                x * 2
            },
            |i, r| seen.push((i, r)),
        )
        .unwrap();
        assert_eq!(n, 40);
        let expected: Vec<(usize, u64)> = (0..40).map(|i| (i as usize, i * 2)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn each_job_sees_a_worker_index() {
        let cancelled = AtomicBool::new(false);
        let mut workers = Vec::new();
        run_ordered(3, 0..10, &cancelled, |w, _, _: i32| w, |_, w| workers.push(w)).unwrap();
        assert_eq!(workers.len(), 10);
        assert!(workers.iter().all(|&w| w < 3));
    }

    #[test]
    fn cancelled_pool_dispatches_nothing() {
        let cancelled = AtomicBool::new(true);
        let mut seen = 0;
        let n = run_ordered(2, 0..10, &cancelled, |_, _, x: i32| x, |_, _| seen += 1).unwrap();
        assert_eq!(n, 0);
        assert_eq!(seen, 0);
    }
}
