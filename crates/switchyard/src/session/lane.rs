//! Per-id ordering of connection work.
//!
//! Each key owns a lane: a queue drained by one task. Work submitted for the
//! same key runs in submission order; lanes for different keys run
//! independently. A lane's task exits, and its entry is removed, once the
//! queue is empty.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

type Job = BoxFuture<'static, ()>;
type Table = HashMap<String, mpsc::UnboundedSender<Job>>;
type Queues = Arc<Mutex<Table>>;

/// Resolves once a piece of submitted work has finished.
#[derive(Debug)]
pub struct Applied(oneshot::Receiver<()>);

impl Applied {
    /// Already finished.
    pub(crate) fn ready() -> Self {
        let (_, applied) = oneshot::channel();
        Self(applied)
    }

    /// Runs `work` on its own task.
    pub(crate) fn spawn(work: impl Future<Output = ()> + Send + 'static) -> Self {
        let (job, applied) = tracked(work);
        tokio::spawn(job);
        applied
    }

    /// Waits for the work to finish, or to be abandoned.
    pub async fn wait(self) {
        self.0.await.ok();
    }
}

fn tracked(work: impl Future<Output = ()> + Send + 'static) -> (Job, Applied) {
    let (done, applied) = oneshot::channel();
    let job = async move {
        work.await;
        done.send(()).ok();
    };
    (job.boxed(), Applied(applied))
}

fn lock(queues: &Mutex<Table>) -> MutexGuard<'_, Table> {
    queues.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serialises work per key.
#[derive(Default)]
pub(crate) struct Lanes {
    queues: Queues,
}

impl std::fmt::Debug for Lanes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lanes")
            .field("active", &lock(&self.queues).len())
            .finish()
    }
}

impl Lanes {
    /// Queues `work` behind everything already submitted for `key`.
    pub(crate) fn submit(
        &self,
        key: &str,
        work: impl Future<Output = ()> + Send + 'static,
    ) -> Applied {
        let (job, applied) = tracked(work);
        let mut queues = lock(&self.queues);
        let job = match queues.get(key) {
            Some(queue) => match queue.send(job) {
                Ok(()) => return applied,
                // The lane's task died with a panicking job; start a new one.
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };
        let (queue, jobs) = mpsc::unbounded_channel();
        queues.insert(key.to_owned(), queue);
        tokio::spawn(drain(Arc::clone(&self.queues), key.to_owned(), job, jobs));
        applied
    }
}

async fn drain(
    queues: Queues,
    key: String,
    first: Job,
    mut jobs: mpsc::UnboundedReceiver<Job>,
) {
    first.await;
    while let Some(job) = next_job(&queues, &key, &mut jobs) {
        job.await;
    }
}

/// Next queued job, or `None` after removing the drained lane.
///
/// Senders only enqueue while holding the table lock, so an empty queue
/// observed under that lock stays empty.
fn next_job(
    queues: &Queues,
    key: &str,
    jobs: &mut mpsc::UnboundedReceiver<Job>,
) -> Option<Job> {
    if let Ok(job) = jobs.try_recv() {
        return Some(job);
    }
    let mut table = lock(queues);
    match jobs.try_recv() {
        Ok(job) => Some(job),
        Err(_) => {
            table.remove(key);
            None
        }
    }
}
