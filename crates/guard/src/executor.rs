//! Bounded task pool with per-tab ordering.

use common::TabId;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::debug;

type Job = BoxFuture<'static, ()>;

/// Tickets are handed out in acceptance order.
#[derive(Default)]
struct Tickets {
    next: u64,
    open: BTreeSet<u64>,
}

/// Jobs accepted but not yet finished.
#[derive(Default)]
struct InFlight {
    tickets: Mutex<Tickets>,
    settled: Notify,
}

/// Held by a job for its whole life, queued time included.
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    ticket: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.tickets.lock().open.remove(&self.ticket);
        self.in_flight.settled.notify_waiters();
    }
}

/// Task pool.
///
/// Jobs for one tab go through that tab's lane and run strictly one after
/// another in submission order. Lanes of different tabs, and unlaned jobs,
/// run concurrently, at most `max_concurrent` at a time.
pub struct TaskPool {
    permits: Arc<Semaphore>,
    lanes: Mutex<HashMap<TabId, mpsc::UnboundedSender<Job>>>,
    in_flight: Arc<InFlight>,
}

impl TaskPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            lanes: Mutex::new(HashMap::new()),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    fn track(&self) -> InFlightGuard {
        let mut tickets = self.in_flight.tickets.lock();
        let ticket = tickets.next;
        tickets.next += 1;
        tickets.open.insert(ticket);
        InFlightGuard {
            in_flight: self.in_flight.clone(),
            ticket,
        }
    }

    /// Run a job with no ordering constraint.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.track();
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        });
    }

    /// Queue a job behind every job already queued for the tab.
    pub fn enqueue<F>(&self, tab_id: TabId, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.track();
        let job: Job = Box::pin(async move {
            let _guard = guard;
            job.await;
        });

        let mut lanes = self.lanes.lock();
        let job = match lanes.get(&tab_id) {
            Some(lane) => match lane.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let lane = self.open_lane(tab_id);
        if lane.send(job).is_ok() {
            lanes.insert(tab_id, lane);
        }
    }

    /// Stop accepting jobs on a tab's lane. Jobs already queued still run.
    pub fn retire_lane(&self, tab_id: TabId) {
        self.lanes.lock().remove(&tab_id);
    }

    fn open_lane(&self, tab_id: TabId) -> mpsc::UnboundedSender<Job> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(_permit) = permits.acquire().await else {
                    break;
                };
                job.await;
            }
            debug!("Lane for tab {} drained", tab_id);
        });

        tx
    }

    /// Jobs accepted and not yet finished.
    pub fn pending(&self) -> usize {
        self.in_flight.tickets.lock().open.len()
    }

    /// Everything accepted so far sits below the returned mark.
    pub fn mark(&self) -> u64 {
        self.in_flight.tickets.lock().next
    }

    fn settled_before(&self, mark: u64) -> bool {
        self.in_flight
            .tickets
            .lock()
            .open
            .first()
            .map_or(true, |oldest| *oldest >= mark)
    }

    /// Number of open lanes.
    pub fn lanes(&self) -> usize {
        self.lanes.lock().len()
    }

    /// Wait until every job accepted before `mark` was taken has finished.
    /// Jobs accepted later are not waited for.
    pub async fn wait_for(&self, mark: u64) {
        loop {
            let notified = self.in_flight.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.settled_before(mark) {
                return;
            }
            notified.await;
        }
    }

    /// Wait until no job is in flight.
    pub async fn wait_idle(&self) {
        self.wait_for(u64::MAX).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_lane_runs_in_order() {
        let pool = TaskPool::new(4);
        let log = Arc::new(Mutex::new(Vec::new()));

        for (i, delay) in [30u64, 1, 10, 0].into_iter().enumerate() {
            let log = log.clone();
            pool.enqueue(7, async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().push(i);
            });
        }
        pool.wait_idle().await;

        assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_lanes_interleave() {
        let pool = TaskPool::new(4);
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow = log.clone();
        pool.enqueue(1, async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            slow.lock().push("slow");
        });
        let fast = log.clone();
        pool.enqueue(2, async move {
            fast.lock().push("fast");
        });
        pool.wait_idle().await;

        assert_eq!(*log.lock(), vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = TaskPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        pool.wait_idle().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_retired_lane_still_drains() {
        let pool = TaskPool::new(1);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = done.clone();
            pool.enqueue(3, async move {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.retire_lane(3);
        assert_eq!(pool.lanes(), 0);

        pool.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_mark_ignores_later_jobs() {
        let pool = TaskPool::new(4);
        let done = Arc::new(AtomicUsize::new(0));

        let early = done.clone();
        pool.enqueue(1, async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            early.fetch_add(1, Ordering::SeqCst);
        });
        let mark = pool.mark();

        let (release, gate) = oneshot::channel::<()>();
        pool.spawn(async move {
            let _ = gate.await;
        });

        tokio::time::timeout(Duration::from_secs(1), pool.wait_for(mark))
            .await
            .unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(pool.pending(), 1);

        release.send(()).unwrap();
        pool.wait_idle().await;
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_idle_pool_returns_immediately() {
        TaskPool::new(1).wait_idle().await;
    }
}
