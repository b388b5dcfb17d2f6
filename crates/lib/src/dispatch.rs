//! Per-user sequential dispatch.
//!
//! Each active user gets one queue and one worker task, so a user's events reach the router in
//! the order they were submitted while different users are handled in parallel. A worker that
//! stays idle for `idle_timeout` removes its own queue; removal happens under the map lock, which
//! is also held by `submit`, so no event can land in a queue nobody drains.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::channels::InboundEvent;
use crate::router::{MessageRouter, Outcome};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

type Queues = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<InboundEvent>>>>;

/// Observer for finished events (tests and metrics hooks).
pub type OutcomeHook = Arc<dyn Fn(&str, Outcome) + Send + Sync>;

#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<MessageRouter>,
    queues: Queues,
    idle_timeout: Duration,
    on_outcome: Option<OutcomeHook>,
}

impl Dispatcher {
    pub fn new(router: Arc<MessageRouter>) -> Self {
        Self {
            router,
            queues: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            on_outcome: None,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Called with (correlation id, outcome) after each event finishes.
    pub fn with_outcome_hook(mut self, hook: OutcomeHook) -> Self {
        self.on_outcome = Some(hook);
        self
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Number of users with a live worker.
    pub async fn active_workers(&self) -> usize {
        self.queues.lock().await.len()
    }

    /// Queue the event behind any earlier events of the same user. Returns without waiting for processing.
    pub async fn submit(&self, event: InboundEvent) {
        let mut queues = self.queues.lock().await;
        let user_id = event.user_id.clone();
        let event = match queues.get(&user_id) {
            Some(tx) => match tx.send(event) {
                Ok(()) => return,
                // Worker is gone but its entry was not removed yet (panicked); start a new one.
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(event);
        queues.insert(user_id.clone(), tx);
        log::debug!("dispatch: starting worker for {}", user_id);
        self.spawn_worker(user_id, rx);
    }

    fn spawn_worker(&self, user_id: String, rx: mpsc::UnboundedReceiver<InboundEvent>) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_worker(user_id, rx).await;
        });
    }

    async fn run_worker(self, user_id: String, mut rx: mpsc::UnboundedReceiver<InboundEvent>) {
        loop {
            let event = match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => return,
                Err(_) => {
                    let mut queues = self.queues.lock().await;
                    match rx.try_recv() {
                        Ok(event) => {
                            drop(queues);
                            event
                        }
                        Err(_) => {
                            queues.remove(&user_id);
                            log::debug!("dispatch: worker for {} idle, stopping", user_id);
                            return;
                        }
                    }
                }
            };
            let correlation_id = event.correlation_id.clone();
            let outcome = self.router.handle(event).await;
            if let Some(ref hook) = self.on_outcome {
                hook(&correlation_id, outcome);
            }
        }
    }
}
