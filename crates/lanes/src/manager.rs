use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use {tokio_util::sync::CancellationToken, tracing::debug};

use crate::lane::{Lane, Task};

/// Lane lifecycle: lazy creation, idle reaping, global shutdown.
pub struct LaneManager {
    lanes: Mutex<HashMap<String, Lane>>,
    buffer_size: usize,
    idle_timeout: Duration,
    shutdown: CancellationToken,
}

impl LaneManager {
    pub fn new(shutdown: CancellationToken, buffer_size: usize, idle_timeout: Duration) -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            buffer_size,
            idle_timeout,
            shutdown,
        }
    }

    /// Enqueue a task on its session's lane, creating the lane if absent.
    /// Returns false when the lane's buffer is full. Never blocks.
    pub fn enqueue(&self, task: Task) -> bool {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap();
            lanes
                .entry(task.session_id.clone())
                .or_insert_with(|| {
                    debug!(session = %task.session_id, "lane created");
                    Lane::new(task.session_id.clone(), self.buffer_size, &self.shutdown)
                })
                .clone()
        };
        lane.enqueue(task)
    }

    /// Spawn the periodic reaper that removes idle lanes.
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration) {
        let mgr = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => mgr.cleanup(),
                }
            }
        });
    }

    fn cleanup(&self) {
        let cutoff = Instant::now() - self.idle_timeout;
        let mut lanes = self.lanes.lock().unwrap();
        lanes.retain(|session, lane| {
            let live = lane.idle_since() >= cutoff;
            if !live {
                lane.stop();
                debug!(session = %session, "lane removed (idle)");
            }
            live
        });
    }

    /// Stop every lane; queued tasks are dropped.
    pub fn stop_all(&self) {
        let mut lanes = self.lanes.lock().unwrap();
        for (_, lane) in lanes.drain() {
            lane.stop();
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(buffer: usize) -> Arc<LaneManager> {
        Arc::new(LaneManager::new(
            CancellationToken::new(),
            buffer,
            Duration::from_secs(60),
        ))
    }

    fn task(session: &str, run: impl FnOnce() + Send + 'static) -> Task {
        Task {
            session_id: session.to_string(),
            run: Box::new(move |_cancel| {
                Box::pin(async move {
                    run();
                    Ok(())
                })
            }),
        }
    }

    #[tokio::test]
    async fn tasks_within_a_session_run_fifo() {
        let mgr = manager(64);
        let order = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(tokio::sync::Notify::new());

        for i in 0..5usize {
            let order = Arc::clone(&order);
            let done = Arc::clone(&done);
            let admitted = mgr.enqueue(Task {
                session_id: "test-session".into(),
                run: Box::new(move |_| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        order.lock().unwrap().push(i);
                        if i == 4 {
                            done.notify_one();
                        }
                        Ok(())
                    })
                }),
            });
            assert!(admitted);
        }

        tokio::time::timeout(Duration::from_secs(2), done.notified())
            .await
            .expect("tasks did not finish");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn different_sessions_run_in_parallel() {
        let mgr = manager(64);
        let remaining = Arc::new(AtomicUsize::new(3));
        let done = Arc::new(tokio::sync::Notify::new());
        let start = Instant::now();

        for session in ["A", "B", "C"] {
            let remaining = Arc::clone(&remaining);
            let done = Arc::clone(&done);
            mgr.enqueue(Task {
                session_id: session.into(),
                run: Box::new(move |_| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                            done.notify_one();
                        }
                        Ok(())
                    })
                }),
            });
        }

        tokio::time::timeout(Duration::from_secs(2), done.notified())
            .await
            .expect("tasks did not finish");
        // Three 50ms tasks in parallel finish well under 3x50ms.
        assert!(start.elapsed() < Duration::from_millis(120));
    }

    #[tokio::test]
    async fn full_buffer_rejects_admission() {
        let mgr = manager(1);
        let (block_tx, block_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupy the worker so the buffer can fill.
        mgr.enqueue(Task {
            session_id: "s".into(),
            run: Box::new(move |_| {
                Box::pin(async move {
                    let _ = block_rx.await;
                    Ok(())
                })
            }),
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Buffer of 1: one queued task fits, the next is rejected.
        assert!(mgr.enqueue(task("s", || {})));
        assert!(!mgr.enqueue(task("s", || {})));

        let _ = block_tx.send(());
    }

    #[tokio::test]
    async fn task_errors_do_not_stop_the_lane() {
        let mgr = manager(64);
        let done = Arc::new(tokio::sync::Notify::new());

        mgr.enqueue(Task {
            session_id: "s".into(),
            run: Box::new(|_| Box::pin(async { anyhow::bail!("boom") })),
        });
        let done2 = Arc::clone(&done);
        mgr.enqueue(task("s", move || done2.notify_one()));

        tokio::time::timeout(Duration::from_secs(2), done.notified())
            .await
            .expect("lane stopped after a task error");
    }

    #[tokio::test]
    async fn idle_lanes_are_reaped() {
        let mgr = Arc::new(LaneManager::new(
            CancellationToken::new(),
            64,
            Duration::from_millis(10),
        ));
        mgr.enqueue(task("idle", || {}));
        assert_eq!(mgr.lane_count(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        mgr.cleanup();
        assert_eq!(mgr.lane_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_drops_queued_tasks() {
        let shutdown = CancellationToken::new();
        let mgr = Arc::new(LaneManager::new(
            shutdown.clone(),
            64,
            Duration::from_secs(60),
        ));
        let ran = Arc::new(AtomicUsize::new(0));
        let (block_tx, block_rx) = tokio::sync::oneshot::channel::<()>();

        mgr.enqueue(Task {
            session_id: "s".into(),
            run: Box::new(move |_| {
                Box::pin(async move {
                    let _ = block_rx.await;
                    Ok(())
                })
            }),
        });
        let ran2 = Arc::clone(&ran);
        mgr.enqueue(task("s", move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));

        mgr.stop_all();
        drop(block_tx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(mgr.lane_count(), 0);
    }
}
