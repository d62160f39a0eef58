use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use {
    futures::future::BoxFuture,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{error, warn},
};

/// The work a task performs. Receives the lane's cancellation token so long
/// operations can observe shutdown.
pub type TaskFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// A unit of work bound to a session.
pub struct Task {
    pub session_id: String,
    pub run: TaskFn,
}

/// A per-session serial queue: bounded buffer, one worker.
#[derive(Clone)]
pub(crate) struct Lane {
    tx: mpsc::Sender<Task>,
    last_used: Arc<Mutex<Instant>>,
    cancel: CancellationToken,
}

impl Lane {
    pub(crate) fn new(session_id: String, buffer_size: usize, parent: &CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let last_used = Arc::new(Mutex::new(Instant::now()));
        let cancel = parent.child_token();
        let lane = Self {
            tx,
            last_used: Arc::clone(&last_used),
            cancel: cancel.clone(),
        };
        tokio::spawn(run_worker(session_id, rx, last_used, cancel));
        lane
    }

    /// Non-blocking admission. Returns false when the buffer is full.
    pub(crate) fn enqueue(&self, task: Task) -> bool {
        self.touch();
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(e) => {
                let session = match &e {
                    mpsc::error::TrySendError::Full(t)
                    | mpsc::error::TrySendError::Closed(t) => t.session_id.clone(),
                };
                warn!(session = %session, "lane queue full");
                false
            },
        }
    }

    /// Signal the worker to exit; queued tasks are dropped.
    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn idle_since(&self) -> Instant {
        *self.last_used.lock().unwrap()
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap() = Instant::now();
    }
}

/// Worker loop: drain the buffer serially until cancelled or the channel
/// closes. A worker that returns is never restarted.
async fn run_worker(
    session_id: String,
    mut rx: mpsc::Receiver<Task>,
    last_used: Arc<Mutex<Instant>>,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            task = rx.recv() => match task {
                Some(t) => t,
                None => return,
            },
        };
        // Touch before and after so a task running longer than the idle
        // timeout does not get its lane reclaimed out from under it.
        *last_used.lock().unwrap() = Instant::now();
        if let Err(e) = (task.run)(cancel.clone()).await {
            error!(session = %session_id, err = %e, "lane task error");
        }
        *last_used.lock().unwrap() = Instant::now();
    }
}
