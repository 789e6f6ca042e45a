//! Task scheduler for the client's recurring and one-shot jobs.
//!
//! Each job runs on its own tokio task and is torn down through a
//! [`CancellationToken`]. Interval jobs await their closure before the next
//! tick, so a slow firing never overlaps itself; missed ticks are skipped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle to a scheduled job; removing it stops the job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: Uuid,
    token: CancellationToken,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Owns all scheduled jobs of one client.
pub struct Scheduler {
    jobs: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
    root: CancellationToken,
    allow_jitter: bool,
}

impl Scheduler {
    pub fn new(allow_jitter: bool) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            root: CancellationToken::new(),
            allow_jitter,
        }
    }

    /// Schedule a recurring job. The first firing happens one `period`
    /// from now (plus a random jitter offset when enabled, so a fleet of
    /// clients does not thunder at the VTN in lockstep).
    pub fn add_interval_job<F, Fut>(&self, period: Duration, f: F) -> JobHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.register();
        let token = handle.token.clone();
        let jobs = Arc::clone(&self.jobs);
        let id = handle.id;

        let jitter = if self.allow_jitter {
            let cap_ms = period.min(Duration::from_secs(30)).as_millis() as u64;
            if cap_ms == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(rand::thread_rng().gen_range(0..cap_ms))
            }
        } else {
            Duration::ZERO
        };

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period + jitter, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => f().await,
                    _ = token.cancelled() => break,
                }
            }
            jobs.lock().unwrap().remove(&id);
        });
        handle
    }

    /// Schedule a job that runs once after `delay` and then unregisters
    /// itself.
    pub fn add_one_shot_job<F, Fut>(&self, delay: Duration, f: F) -> JobHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.register();
        let token = handle.token.clone();
        let jobs = Arc::clone(&self.jobs);
        let id = handle.id;

        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(delay) => f().await,
                _ = token.cancelled() => {}
            }
            jobs.lock().unwrap().remove(&id);
        });
        handle
    }

    /// Stop a single job.
    pub fn remove(&self, handle: &JobHandle) {
        handle.token.cancel();
        self.jobs.lock().unwrap().remove(&handle.id);
    }

    /// Stop every job.
    pub fn remove_all_jobs(&self) {
        let mut jobs = self.jobs.lock().unwrap();
        for token in jobs.values() {
            token.cancel();
        }
        jobs.clear();
    }

    /// Stop everything; the scheduler accepts no further work after this.
    pub fn shutdown(&self) {
        self.remove_all_jobs();
        self.root.cancel();
    }

    /// Number of jobs currently registered.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    fn register(&self) -> JobHandle {
        let id = Uuid::new_v4();
        let token = self.root.child_token();
        self.jobs.lock().unwrap().insert(id, token.clone());
        JobHandle { id, token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn interval_job_fires_repeatedly() {
        let scheduler = Scheduler::new(false);
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_job = Arc::clone(&count);

        let handle = scheduler.add_interval_job(Duration::from_millis(10), move || {
            let count = Arc::clone(&count_for_job);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_millis(80)).await;
        scheduler.remove(&handle);
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 2, "expected at least 2 firings, got {fired}");
    }

    #[tokio::test]
    async fn interval_job_does_not_fire_immediately() {
        let scheduler = Scheduler::new(false);
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_job = Arc::clone(&count);

        scheduler.add_interval_job(Duration::from_millis(200), move || {
            let count = Arc::clone(&count_for_job);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn removed_job_stops_firing() {
        let scheduler = Scheduler::new(false);
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_job = Arc::clone(&count);

        let handle = scheduler.add_interval_job(Duration::from_millis(10), move || {
            let count = Arc::clone(&count_for_job);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_millis(40)).await;
        scheduler.remove(&handle);
        let at_removal = count.load(Ordering::SeqCst);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), at_removal);
    }

    #[tokio::test]
    async fn one_shot_job_runs_once_and_unregisters() {
        let scheduler = Scheduler::new(false);
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_job = Arc::clone(&count);

        scheduler.add_one_shot_job(Duration::from_millis(5), move || async move {
            count_for_job.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(scheduler.job_count(), 1);

        sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.job_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_one_shot_never_runs() {
        let scheduler = Scheduler::new(false);
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_job = Arc::clone(&count);

        let handle = scheduler.add_one_shot_job(Duration::from_millis(50), move || async move {
            count_for_job.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.remove(&handle);

        sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remove_all_jobs_clears_the_registry() {
        let scheduler = Scheduler::new(false);
        for _ in 0..3 {
            scheduler.add_interval_job(Duration::from_secs(60), || async {});
        }
        assert_eq!(scheduler.job_count(), 3);
        scheduler.remove_all_jobs();
        assert_eq!(scheduler.job_count(), 0);
    }

    #[tokio::test]
    async fn slow_job_does_not_overlap_itself() {
        let scheduler = Scheduler::new(false);
        let running = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicUsize::new(0));
        let running_for_job = Arc::clone(&running);
        let overlapped_for_job = Arc::clone(&overlapped);

        scheduler.add_interval_job(Duration::from_millis(5), move || {
            let running = Arc::clone(&running_for_job);
            let overlapped = Arc::clone(&overlapped_for_job);
            async move {
                if running.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlapped.fetch_add(1, Ordering::SeqCst);
                }
                sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_millis(100)).await;
        scheduler.shutdown();
        assert_eq!(overlapped.load(Ordering::SeqCst), 0);
    }
}
