//! Per-thread turn handling: load, seed, run, save

use super::orchestrator::{EventSender, OrchestrationError, Orchestrator, RunEvent};
use super::traits::{CheckpointStore, LlmClient, ToolExecutor};
use crate::state_machine::ConversationState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Runs turns against persisted threads.
///
/// Turns on the same thread are serialised; turns on different threads run
/// concurrently and share nothing mutable.
pub struct ThreadManager<L, T, S> {
    orchestrator: Orchestrator<L, T>,
    store: S,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<L, T, S> ThreadManager<L, T, S>
where
    L: LlmClient,
    T: ToolExecutor,
    S: CheckpointStore,
{
    pub fn new(orchestrator: Orchestrator<L, T>, store: S) -> Self {
        Self {
            orchestrator,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        // Drop locks nobody is holding or waiting on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(thread_id.to_string()).or_default().clone()
    }

    /// Handle one human turn.
    ///
    /// Exactly one terminal event (`Completed` or `Failed`) is sent after any
    /// fragments. A failed or cancelled run saves nothing.
    pub async fn submit(
        &self,
        thread_id: &str,
        text: &str,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<ConversationState, OrchestrationError> {
        match self.run_turn(thread_id, text, events, cancel).await {
            Ok((state, appended_from)) => {
                let appended = state.messages[appended_from..].to_vec();
                tracing::info!(thread_id, appended = appended.len(), "Turn completed");
                let _ = events.send(RunEvent::Completed { appended });
                Ok(state)
            }
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "Turn failed");
                let _ = events.send(RunEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_turn(
        &self,
        thread_id: &str,
        text: &str,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<(ConversationState, usize), OrchestrationError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let prior = self
            .store
            .load(thread_id)
            .await
            .map_err(OrchestrationError::Checkpoint)?;
        tracing::debug!(thread_id, prior = prior.len(), "Loaded thread");

        let state = ConversationState::seeded(prior, text);
        let seeded_len = state.messages.len();

        let state = self
            .orchestrator
            .run(thread_id, state, events, cancel)
            .await?;

        self.store
            .save(thread_id, &state)
            .await
            .map_err(OrchestrationError::Checkpoint)?;

        Ok((state, seeded_len))
    }
}
