use super::*;
use tokio::task::AbortHandle;

struct ActiveSweep {
    origin: ChatId,
    handle: AbortHandle,
}

/// Registry of running sweeps; each one is its own tokio task.
pub(super) struct Sweeps {
    delivery: Arc<Delivery>,
    active: Arc<Mutex<HashMap<String, ActiveSweep>>>,
}

impl Sweeps {
    pub(super) fn new(delivery: Arc<Delivery>) -> Self {
        Sweeps {
            delivery,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts `job` in the background and returns its id immediately.
    pub(super) async fn spawn(&self, job: SweepJob) -> String {
        let id = short_id();
        let delivery = self.delivery.clone();
        let active = self.active.clone();
        let task_id = id.clone();

        // Held across spawn so the task cannot deregister before it is registered.
        let mut registry = self.active.lock().await;
        let origin = job.origin;
        let task = tokio::spawn(async move {
            info!(
                "sweep {} started: {} links to {:?}",
                task_id, job.upper_bound, job.target
            );
            let report = delivery.deliver_sweep(&job).await;
            info!(
                "sweep {} finished: {} delivered, {} failed",
                task_id, report.delivered, report.failed
            );
            active.lock().await.remove(&task_id);
            report
        });
        registry.insert(
            id.clone(),
            ActiveSweep {
                origin,
                handle: task.abort_handle(),
            },
        );
        id
    }

    /// Aborts every sweep started from `origin`; returns how many were stopped.
    pub(super) async fn cancel_for(&self, origin: ChatId) -> usize {
        let mut registry = self.active.lock().await;
        let ids: Vec<String> = registry
            .iter()
            .filter(|(_, sweep)| sweep.origin == origin)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            if let Some(sweep) = registry.remove(id) {
                sweep.handle.abort();
                info!("sweep {} aborted", id);
            }
        }
        ids.len()
    }

    #[cfg(test)]
    pub(super) async fn active_for(&self, origin: ChatId) -> usize {
        self.active
            .lock()
            .await
            .values()
            .filter(|sweep| sweep.origin == origin)
            .count()
    }
}
