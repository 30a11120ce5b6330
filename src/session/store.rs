//! Per-user flow state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::channels::{ChatId, UserId};
use crate::session::QueryKind;

/// Where a flow is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitAddress,
    AwaitStartTime,
    AwaitEndTime,
    /// A collaborator call (lookup or query) is in flight; text is ignored.
    Running,
}

/// Inputs collected so far by one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub flow_id: u64,
    pub kind: QueryKind,
    pub chat_id: ChatId,
    pub stage: Stage,
    pub address: Option<String>,
    pub token_name: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Contexts keyed by user. A user has at most one live flow.
///
/// The lock is only held for map access, never across a collaborator
/// call; steps that awaited something commit through
/// [`SessionStore::update_if_current`] so a newer flow is never clobbered.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, SessionContext>>,
    next_flow_id: AtomicU64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new flow for `user`, replacing any existing one.
    pub async fn begin(&self, user: UserId, chat_id: ChatId, kind: QueryKind) -> u64 {
        let flow_id = self.next_flow_id.fetch_add(1, Ordering::Relaxed) + 1;
        let context = SessionContext {
            flow_id,
            kind,
            chat_id,
            stage: Stage::AwaitAddress,
            address: None,
            token_name: None,
            start_time: None,
            end_time: None,
        };
        if let Some(previous) = self.sessions.lock().await.insert(user, context) {
            tracing::debug!(user, replaced = previous.flow_id, flow_id, "Flow replaced");
        }
        flow_id
    }

    pub async fn get(&self, user: UserId) -> Option<SessionContext> {
        self.sessions.lock().await.get(&user).cloned()
    }

    /// Apply `update` if `flow_id` is still the user's live flow and it
    /// is still waiting at `expected`. Of two steps racing from the same
    /// stage, only the first one commits.
    pub async fn update_if_current<F>(
        &self,
        user: UserId,
        flow_id: u64,
        expected: Stage,
        update: F,
    ) -> bool
    where
        F: FnOnce(&mut SessionContext),
    {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&user) {
            Some(context) if context.flow_id == flow_id && context.stage == expected => {
                update(context);
                true
            }
            _ => false,
        }
    }

    /// End `flow_id` if it is still the user's live flow.
    pub async fn finish(&self, user: UserId, flow_id: u64) -> bool {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(&user).is_some_and(|c| c.flow_id == flow_id) {
            sessions.remove(&user);
            true
        } else {
            false
        }
    }

    /// End whatever flow the user has.
    pub async fn remove(&self, user: UserId) -> Option<SessionContext> {
        self.sessions.lock().await.remove(&user)
    }
}
