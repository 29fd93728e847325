//! Debounced, timer-driven scaling.
//!
//! Every request to scale an environment (re)starts a grace-period timer for
//! that environment; the scaling pass runs once the timer fires, so a burst
//! of service changes results in one pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{ScaleScheduler, Scaler};
use crate::provider::EntityProvider;

struct Scheduled {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    scaler: Arc<dyn Scaler>,
    environments: Arc<dyn EntityProvider>,
    grace_period: Duration,
    runtime: Handle,
    schedule: Mutex<HashMap<String, Scheduled>>,
    generation: AtomicU64,
}

impl Inner {
    /// Drops the entry for `environment_id` unless a newer request replaced it.
    fn release(&self, environment_id: &str, generation: u64) {
        if let Ok(mut schedule) = self.schedule.lock()
            && schedule
                .get(environment_id)
                .is_some_and(|s| s.generation == generation)
        {
            schedule.remove(environment_id);
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("grace_period", &self.inner.grace_period)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// `runtime` is where timers and scaling passes run; requests may come
    /// from any thread.
    pub fn new(
        runtime: Handle,
        scaler: Arc<dyn Scaler>,
        environments: Arc<dyn EntityProvider>,
        grace_period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                scaler,
                environments,
                grace_period,
                runtime,
                schedule: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Number of environments with a timer still pending.
    pub fn pending(&self) -> usize {
        self.inner.schedule.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Schedules every environment.
    pub fn run_all(&self) {
        debug!("Scaling all environments");
        match self.inner.environments.list_ids() {
            Ok(ids) => {
                for environment_id in ids {
                    self.schedule_run(&environment_id);
                }
            }
            Err(err) => error!(error = %err, "Failed to list environments"),
        }
    }

    /// Calls [`Dispatcher::run_all`] on the blocking pool every `period`,
    /// starting one period from now.
    pub fn run_every(&self, period: Duration) -> JoinHandle<()> {
        let dispatcher = self.clone();
        self.inner.runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let sweep = dispatcher.clone();
                if let Err(err) = tokio::task::spawn_blocking(move || sweep.run_all()).await {
                    error!(error = %err, "Scaling sweep panicked");
                }
            }
        })
    }
}

impl ScaleScheduler for Dispatcher {
    fn schedule_run(&self, environment_id: &str) {
        let inner = Arc::clone(&self.inner);
        let Ok(mut schedule) = inner.schedule.lock() else {
            error!(environment_id, "Scaler schedule lock poisoned");
            return;
        };

        if let Some(previous) = schedule.remove(environment_id) {
            debug!(environment_id, "Pushing back scheduled scaling run");
            previous.handle.abort();
        }

        let generation = inner.generation.fetch_add(1, Ordering::Relaxed);
        debug!(environment_id, grace_period = ?inner.grace_period, "Scheduling scaling run");

        let task_inner = Arc::clone(&inner);
        let id = environment_id.to_string();
        let handle = inner.runtime.spawn(async move {
            tokio::time::sleep(task_inner.grace_period).await;

            task_inner.release(&id, generation);

            let scaler = Arc::clone(&task_inner.scaler);
            let environment_id = id.clone();
            let result =
                tokio::task::spawn_blocking(move || scaler.scale(&environment_id)).await;
            match result {
                Ok(Ok(report)) => debug!(
                    environment_id = %id,
                    desired_scale = ?report.desired_scale,
                    terminated = report.terminated.len(),
                    "Finished scaling environment"
                ),
                Ok(Err(err)) => error!(environment_id = %id, error = %err, "Failed to scale environment"),
                Err(err) => error!(environment_id = %id, error = %err, "Scaling run panicked"),
            }
        });

        schedule.insert(environment_id.to_string(), Scheduled { generation, handle });
    }
}
