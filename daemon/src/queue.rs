use crate::ledger::{self, EventLedger};
use crate::registry::SharedRegistry;
use crossbuild_common::api::{self, BuildEvent, Status};
use crossbuild_common::errors::*;
use crossbuild_worker::pipeline::Pipeline;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};

/// Producer side of the bounded build queue. Cloning is cheap, every clone
/// feeds the same single worker.
#[derive(Clone)]
pub struct BuildQueue {
    tx: mpsc::Sender<BuildEvent>,
    ledger: Arc<dyn EventLedger>,
}

impl BuildQueue {
    /// Spawn the worker and return the handle used to feed it.
    pub fn start(
        capacity: usize,
        ledger: Arc<dyn EventLedger>,
        pipeline: Arc<Pipeline>,
        registry: SharedRegistry,
    ) -> (BuildQueue, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let worker = Worker {
            ledger: ledger.clone(),
            pipeline,
            registry,
        };
        let handle = tokio::spawn(worker.run(rx));
        (BuildQueue { tx, ledger }, handle)
    }

    /// Validate the reference, record it as a pending event and append it
    /// to the queue. Waits for a free slot while the queue is full, the event
    /// is only created once a slot is reserved.
    pub async fn enqueue(&self, input: &str) -> Result<BuildEvent, BuildError> {
        let git_ref = api::normalize_ref(input)?;
        let permit = self.tx.reserve().await.map_err(|_| BuildError::QueueClosed)?;

        let event = self
            .ledger
            .insert(&git_ref)
            .map_err(|err| BuildError::Persistence(format!("{:#}", err)))?;
        debug!("Queueing build event #{} for {:?}", event.id, event.git_ref);
        permit.send(event.clone());
        Ok(event)
    }
}

struct Worker {
    ledger: Arc<dyn EventLedger>,
    pipeline: Arc<Pipeline>,
    registry: SharedRegistry,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "build panicked".to_string()
    }
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<BuildEvent>) {
        info!("Build worker is ready");
        while let Some(event) = rx.recv().await {
            self.process(event).await;
        }
        info!("Build queue closed, worker is shutting down");
    }

    async fn process(&self, mut event: BuildEvent) {
        if let Err(err) = event.start() {
            error!("Skipping build event: {:#}", err);
            return;
        }
        info!("Starting build event #{} for {:?}", event.id, event.git_ref);
        ledger::record(self.ledger.as_ref(), &event);

        let pipeline = self.pipeline.clone();
        let git_ref = event.git_ref.clone();
        // runs on its own task so a panic is contained to this event
        let res = match task::spawn(async move { pipeline.run(&git_ref).await }).await {
            Ok(res) => res,
            Err(err) if err.is_panic() => Err(BuildError::Panicked(panic_message(err.into_panic()))),
            Err(err) => Err(BuildError::Panicked(err.to_string())),
        };

        let res = match res {
            Ok(archives) => {
                info!(
                    "Build event #{} succeeded, {} archives written",
                    event.id,
                    archives.len()
                );
                event.succeed()
            }
            Err(err) => {
                warn!("Build event #{} failed: {}", event.id, err);
                event.fail(err.to_string())
            }
        };
        if let Err(err) = res {
            error!("Invalid state for build event #{}: {:#}", event.id, err);
            return;
        }

        // targets are updated before the event turns terminal in the ledger
        if event.status == Status::Succeeded {
            match self.registry.write() {
                Ok(mut registry) => {
                    let n = registry.record_success(
                        &event.git_ref,
                        self.pipeline.targets(),
                        event.updated_at,
                    );
                    debug!("Updated last build time of {} targets", n);
                }
                Err(_) => error!("Target registry lock is poisoned"),
            }
        }
        ledger::record(self.ledger.as_ref(), &event);
    }
}
