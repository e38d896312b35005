//! Replica snapshot for chat state and its persisted projection.

use super::model::Session;
use crate::sync::reconcile::reconcile_chat;
use crate::sync::replicated::Replicated;
use serde::{Deserialize, Serialize};

/// Screen position of the session context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MenuPosition {
    pub top: i32,
    pub left: i32,
}

/// Context menu state. Replica-local, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MenuState {
    pub is_open: bool,
    pub position: MenuPosition,
    pub session_id: Option<String>,
}

/// One replica's full in-memory chat state.
///
/// Only `sessions` ever leaves the replica, through [`PersistedChat`].
/// `current_session_index`, `last_input`, `menu` and `hydrated` are ephemeral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSnapshot {
    pub sessions: Vec<Session>,
    pub current_session_index: usize,
    /// Draft text in the input box.
    pub last_input: String,
    pub menu: MenuState,
    pub hydrated: bool,
}

impl ChatSnapshot {
    /// State a replica boots with: a single placeholder session, not hydrated.
    pub fn fresh(now_millis: i64) -> Self {
        Self {
            sessions: vec![Session::new(now_millis)],
            current_session_index: 0,
            last_input: String::new(),
            menu: MenuState::default(),
            hydrated: false,
        }
    }

    /// Id of the selected session, if the index is in range.
    pub fn current_session_id(&self) -> Option<&str> {
        self.sessions
            .get(self.current_session_index)
            .map(|s| s.id.as_str())
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn session_index(&self, session_id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == session_id)
    }

    /// True when the only session is the untouched boot placeholder.
    pub fn has_only_placeholder(&self) -> bool {
        self.sessions.len() == 1 && self.sessions[0].is_placeholder()
    }

    /// Reorders sessions and keeps the selection on the same session id.
    pub fn resort(&mut self) {
        let current = self.current_session_id().map(str::to_string);
        let sessions = std::mem::take(&mut self.sessions);
        let (sorted, index) = sort_sessions(sessions, current.as_deref());
        self.sessions = sorted;
        self.current_session_index = index;
    }
}

/// The part of [`ChatSnapshot`] that is stored and compared.
///
/// Messages still streaming are dropped; a half-written reply never reaches
/// the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PersistedChat {
    pub sessions: Vec<Session>,
}

impl PersistedChat {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self { sessions }
    }
}

impl From<&ChatSnapshot> for PersistedChat {
    fn from(snapshot: &ChatSnapshot) -> Self {
        let sessions = snapshot
            .sessions
            .iter()
            .map(|session| {
                let mut session = session.clone();
                session.messages.retain(|m| !m.streaming);
                session
            })
            .collect();
        Self { sessions }
    }
}

/// Orders sessions pinned-first and returns the new index of `current_id`.
///
/// Pinned sessions sort by `pinned_at` descending, the rest by `last_update`
/// descending. Both sorts are stable. A missing or unknown id resolves to 0.
pub fn sort_sessions(sessions: Vec<Session>, current_id: Option<&str>) -> (Vec<Session>, usize) {
    let (mut pinned, mut unpinned): (Vec<Session>, Vec<Session>) =
        sessions.into_iter().partition(|s| s.pinned);

    pinned.sort_by(|a, b| b.pin_time().cmp(&a.pin_time()));
    unpinned.sort_by(|a, b| b.last_update.cmp(&a.last_update));

    pinned.extend(unpinned);
    let index = current_id
        .and_then(|id| pinned.iter().position(|s| s.id == id))
        .unwrap_or(0);
    (pinned, index)
}

/// Drops the boot placeholder when persisted data is about to replace it.
///
/// Without this a freshly opened replica would add an empty "New
/// Conversation" to the shared list every time it hydrates.
pub fn strip_only_placeholder(local: &mut ChatSnapshot, persisted: &PersistedChat) {
    if !persisted.sessions.is_empty() && local.has_only_placeholder() {
        local.sessions.clear();
        local.current_session_index = 0;
    }
}

impl Replicated for ChatSnapshot {
    type Persisted = PersistedChat;

    fn persisted(&self) -> PersistedChat {
        PersistedChat::from(self)
    }

    fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    fn mark_hydrated(&mut self) {
        self.hydrated = true;
    }

    fn hydrate(&mut self, persisted: PersistedChat) {
        strip_only_placeholder(self, &persisted);
        *self = self.reconcile(persisted);
        if self.sessions.is_empty() {
            self.sessions.push(Session::new(0));
            self.current_session_index = 0;
        }
    }

    fn reconcile(&self, remote: PersistedChat) -> Self {
        reconcile_chat(self, remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::message::{ChatMessage, MessageRole};

    fn session(topic: &str, last_update: i64) -> Session {
        Session::with_topic(topic, last_update)
    }

    #[test]
    fn test_sort_pinned_first_then_recent() {
        let a = session("a", 10);
        let mut b = session("b", 5);
        b.pin(100);
        let mut c = session("c", 1);
        c.pin(200);
        let d = session("d", 20);

        let (sorted, index) = sort_sessions(vec![a.clone(), b, c, d], Some(&a.id));
        let topics: Vec<_> = sorted.iter().map(|s| s.topic.as_str()).collect();
        assert_eq!(topics, vec!["c", "b", "d", "a"]);
        assert_eq!(index, 3);
    }

    #[test]
    fn test_sort_unknown_selection_defaults_to_zero() {
        let (_, index) = sort_sessions(vec![session("a", 1), session("b", 2)], Some("missing"));
        assert_eq!(index, 0);
    }

    #[test]
    fn test_projection_drops_streaming_messages() {
        let mut snapshot = ChatSnapshot::fresh(0);
        snapshot.sessions[0]
            .messages
            .push(ChatMessage::new(MessageRole::User, "hi", 1));
        snapshot.sessions[0]
            .messages
            .push(ChatMessage::streaming_reply(None, 2));
        snapshot.last_input = "draft".to_string();

        let persisted = snapshot.persisted();
        assert_eq!(persisted.sessions[0].messages.len(), 1);
        assert!(!persisted.sessions[0].messages[0].streaming);
    }

    #[test]
    fn test_ephemeral_fields_do_not_change_projection() {
        let snapshot = ChatSnapshot::fresh(0);
        let mut other = snapshot.clone();
        other.last_input = "typing".to_string();
        other.menu.is_open = true;
        other.current_session_index = 3;
        assert_eq!(snapshot.persisted(), other.persisted());
    }

    #[test]
    fn test_strip_placeholder_only_when_persisted_has_sessions() {
        let mut local = ChatSnapshot::fresh(0);
        strip_only_placeholder(&mut local, &PersistedChat::default());
        assert_eq!(local.sessions.len(), 1);

        strip_only_placeholder(&mut local, &PersistedChat::new(vec![session("remote", 5)]));
        assert!(local.sessions.is_empty());
    }

    #[test]
    fn test_hydrate_replaces_placeholder() {
        let mut local = ChatSnapshot::fresh(0);
        let remote = session("remote", 5);
        local.hydrate(PersistedChat::new(vec![remote.clone()]));

        assert_eq!(local.sessions.len(), 1);
        assert_eq!(local.sessions[0].id, remote.id);
    }

    #[test]
    fn test_hydrate_keeps_touched_local_session() {
        let mut local = ChatSnapshot::fresh(0);
        local.sessions[0].topic = "mine".to_string();
        local.hydrate(PersistedChat::new(vec![session("remote", 5)]));
        assert_eq!(local.sessions.len(), 2);
    }
}
