//! Bounded worker pool with per-job timeouts
//!
//! Jobs are fed to a fixed number of worker threads over a crossbeam channel.
//! Each job runs on its own thread so its worker can report a timeout as soon
//! as the deadline passes. The worker then waits for the timed-out
//! computation to end before taking the next job, so no more than `workers`
//! computations ever run at once; the late result is dropped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

/// How a single job ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<R> {
    Finished(R),
    TimedOut,
    Panicked,
}

/// A job computing on its own thread
struct RunningJob<R> {
    handle: Option<JoinHandle<()>>,
    result_rx: Receiver<R>,
}

impl<R: Send + 'static> RunningJob<R> {
    fn spawn<J, F>(job: J, work: Arc<F>) -> Self
    where
        J: Send + 'static,
        F: Fn(J) -> R + Send + Sync + 'static,
    {
        let (tx, result_rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .spawn(move || {
                let result = work(job);
                let _ = tx.send(result);
            })
            .ok();
        Self { handle, result_rx }
    }

    /// Wait at most `timeout` for the result
    fn wait(&self, timeout: Duration) -> JobOutcome<R> {
        if self.handle.is_none() {
            return JobOutcome::Panicked;
        }
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => JobOutcome::Finished(result),
            Err(RecvTimeoutError::Timeout) => JobOutcome::TimedOut,
            // The sender was dropped without a result, so `work` unwound
            Err(RecvTimeoutError::Disconnected) => JobOutcome::Panicked,
        }
    }

    /// Block until the job's thread has ended
    fn join(self) {
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

/// Run `work` on its own thread and wait at most `timeout` for its result
///
/// Returns only once the job's thread has ended, so a timed-out job keeps
/// the caller busy until its computation finishes.
pub fn run_with_timeout<J, R, F>(job: J, timeout: Duration, work: Arc<F>) -> JobOutcome<R>
where
    J: Send + 'static,
    R: Send + 'static,
    F: Fn(J) -> R + Send + Sync + 'static,
{
    let running = RunningJob::spawn(job, work);
    let outcome = running.wait(timeout);
    running.join();
    outcome
}

/// Run labelled jobs on `workers` threads
///
/// Outcomes are returned in completion order, each with its job's label.
pub fn run_parallel<J, R, F>(
    jobs: Vec<(String, J)>,
    workers: usize,
    timeout: Duration,
    work: F,
) -> Vec<(String, JobOutcome<R>)>
where
    J: Send + 'static,
    R: Send + 'static,
    F: Fn(J) -> R + Send + Sync + 'static,
{
    let total = jobs.len();
    let workers = workers.clamp(1, total.max(1));
    let work = Arc::new(work);

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(String, J)>();
    let (out_tx, out_rx) = crossbeam_channel::unbounded::<(String, JobOutcome<R>)>();

    for job in jobs {
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let job_rx = job_rx.clone();
        let out_tx = out_tx.clone();
        let work = work.clone();
        handles.push(thread::spawn(move || {
            while let Ok((label, job)) = job_rx.recv() {
                let running = RunningJob::spawn(job, work.clone());
                let outcome = running.wait(timeout);
                let sent = out_tx.send((label, outcome));
                // The slot stays taken until the computation is over
                running.join();
                if sent.is_err() {
                    break;
                }
            }
            tracing::trace!(worker_id, "worker finished");
        }));
    }
    drop(out_tx);

    let outcomes: Vec<(String, JobOutcome<R>)> = out_rx.iter().collect();
    for handle in handles {
        let _ = handle.join();
    }

    debug_assert_eq!(outcomes.len(), total);
    outcomes
}

/// Run labelled jobs one at a time in submission order
///
/// `after_each` is called once each job's computation has ended, whatever its
/// outcome, and before the next job starts.
pub fn run_sequential<J, R, F, A>(
    jobs: Vec<(String, J)>,
    timeout: Duration,
    work: F,
    mut after_each: A,
) -> Vec<(String, JobOutcome<R>)>
where
    J: Send + 'static,
    R: Send + 'static,
    F: Fn(J) -> R + Send + Sync + 'static,
    A: FnMut(),
{
    let work = Arc::new(work);
    jobs.into_iter()
        .map(|(label, job)| {
            let outcome = run_with_timeout(job, timeout, work.clone());
            after_each();
            (label, outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn labelled(values: &[u64]) -> Vec<(String, u64)> {
        values.iter().map(|v| (format!("job-{}", v), *v)).collect()
    }

    #[test]
    fn test_parallel_runs_every_job() {
        let outcomes =
            run_parallel(labelled(&[1, 2, 3, 4, 5]), 3, Duration::from_secs(10), |v| v * 10);

        assert_eq!(outcomes.len(), 5);
        let mut results: Vec<u64> = outcomes
            .into_iter()
            .map(|(_, outcome)| match outcome {
                JobOutcome::Finished(r) => r,
                other => panic!("unexpected outcome {:?}", other),
            })
            .collect();
        results.sort_unstable();
        assert_eq!(results, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_parallel_empty() {
        let outcomes: Vec<(String, JobOutcome<u64>)> =
            run_parallel(Vec::new(), 4, Duration::from_secs(1), |v: u64| v);
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_slow_job_times_out() {
        let outcomes = run_parallel(labelled(&[1, 500]), 2, Duration::from_millis(100), |v| {
            thread::sleep(Duration::from_millis(v * 4));
            v
        });

        for (label, outcome) in outcomes {
            match label.as_str() {
                "job-1" => assert_eq!(outcome, JobOutcome::Finished(1)),
                "job-500" => assert_eq!(outcome, JobOutcome::TimedOut),
                other => panic!("unknown job {}", other),
            }
        }
    }

    #[test]
    fn test_panic_is_contained() {
        let outcomes = run_parallel(labelled(&[1, 2]), 2, Duration::from_secs(10), |v| {
            if v == 2 {
                panic!("boom");
            }
            v
        });

        let panicked = outcomes
            .iter()
            .filter(|(_, o)| *o == JobOutcome::Panicked)
            .count();
        assert_eq!(panicked, 1);
        assert_eq!(outcomes.len(), 2);
    }

    #[test]
    fn test_sequential_keeps_order() {
        let released = AtomicUsize::new(0);
        let outcomes = run_sequential(
            labelled(&[3, 1, 2]),
            Duration::from_secs(10),
            |v| v + 1,
            || {
                released.fetch_add(1, Ordering::SeqCst);
            },
        );

        let labels: Vec<&str> = outcomes.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["job-3", "job-1", "job-2"]);
        assert_eq!(outcomes[0].1, JobOutcome::Finished(4));
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }

    /// Tracks how many jobs are computing at once
    #[derive(Default)]
    struct Occupancy {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Occupancy {
        fn busy(&self, duration: Duration) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(duration);
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_timed_out_jobs_keep_their_slot() {
        let occupancy = Arc::new(Occupancy::default());
        let tracked = occupancy.clone();
        let outcomes = run_parallel(
            labelled(&[1, 2, 3, 4, 5, 6, 7, 8]),
            2,
            Duration::from_millis(20),
            move |v| {
                tracked.busy(Duration::from_millis(150));
                v
            },
        );

        assert_eq!(outcomes.len(), 8);
        assert!(outcomes.iter().all(|(_, o)| *o == JobOutcome::TimedOut));
        assert!(occupancy.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(occupancy.running.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sequential_waits_for_timed_out_job() {
        let occupancy = Arc::new(Occupancy::default());
        let tracked = occupancy.clone();
        let running_at_release = AtomicUsize::new(0);

        let outcomes = run_sequential(
            labelled(&[1, 2, 3]),
            Duration::from_millis(20),
            move |v| {
                tracked.busy(Duration::from_millis(100));
                v
            },
            || {
                let running = occupancy.running.load(Ordering::SeqCst);
                running_at_release.fetch_add(running, Ordering::SeqCst);
            },
        );

        assert!(outcomes.iter().all(|(_, o)| *o == JobOutcome::TimedOut));
        assert_eq!(occupancy.peak.load(Ordering::SeqCst), 1);
        assert_eq!(running_at_release.load(Ordering::SeqCst), 0);
    }
}
