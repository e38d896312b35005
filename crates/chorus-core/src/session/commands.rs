//! Local mutations on a [`ChatSnapshot`].
//!
//! Every command is a plain function of the draft and the current time. The
//! replica runs them inside its container so they are atomic and serialized.
//! Out-of-range indices are ignored rather than reported.

use super::message::{ChatMessage, MessageRole, ToolCall, format_date};
use super::model::Session;
use super::snapshot::ChatSnapshot;
use uuid::Uuid;

/// Everything needed to undo a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedSession {
    pub session_id: String,
    sessions: Vec<Session>,
    current_session_index: usize,
}

/// Ids of the two messages created for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeIds {
    pub session_id: String,
    pub user_message_id: String,
    pub reply_message_id: String,
}

impl ChatSnapshot {
    /// Prepends a new session and selects it.
    pub fn new_session(&mut self, topic: Option<&str>, now: i64) -> String {
        let session = match topic {
            Some(topic) => Session::with_topic(topic, now),
            None => Session::new(now),
        };
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.current_session_index = 0;
        id
    }

    /// Copies the current session with fresh message ids and selects the copy.
    pub fn fork_session(&mut self, now: i64) -> Option<String> {
        let source = self.current_session()?.clone();
        let mut fork = Session::with_topic(source.topic, now);
        fork.messages = source
            .messages
            .into_iter()
            .map(|m| ChatMessage {
                id: Uuid::new_v4().to_string(),
                ..m
            })
            .collect();
        let id = fork.id.clone();
        self.sessions.insert(0, fork);
        self.current_session_index = 0;
        Some(id)
    }

    /// Drops every session and starts over with one empty session.
    pub fn clear_sessions(&mut self, now: i64) {
        self.sessions = vec![Session::new(now)];
        self.current_session_index = 0;
    }

    pub fn select_session(&mut self, index: usize) {
        self.current_session_index = index;
    }

    /// Moves selection by `delta`, wrapping at both ends.
    pub fn next_session(&mut self, delta: isize) {
        let n = self.sessions.len() as isize;
        if n == 0 {
            return;
        }
        let i = self.current_session_index as isize;
        self.current_session_index = (i + delta).rem_euclid(n) as usize;
    }

    /// Moves a session in the list and keeps the same session selected.
    pub fn move_session(&mut self, from: usize, to: usize) {
        if from >= self.sessions.len() || to >= self.sessions.len() {
            return;
        }
        let session = self.sessions.remove(from);
        self.sessions.insert(to, session);

        let old = self.current_session_index;
        self.current_session_index = if old == from {
            to
        } else if old > from && old <= to {
            old - 1
        } else if old < from && old >= to {
            old + 1
        } else {
            old
        };
    }

    /// Removes a session. Deleting the last one leaves a fresh empty session.
    pub fn delete_session(&mut self, index: usize, now: i64) -> Option<DeletedSession> {
        let deleted_id = self.sessions.get(index)?.id.clone();
        let undo = DeletedSession {
            session_id: deleted_id,
            sessions: self.sessions.clone(),
            current_session_index: self.current_session_index,
        };

        self.sessions.remove(index);
        if self.sessions.is_empty() {
            self.sessions.push(Session::new(now));
            self.current_session_index = 0;
        } else {
            let current = self.current_session_index;
            let shifted = current - usize::from(index < current);
            self.current_session_index = shifted.min(self.sessions.len() - 1);
        }
        Some(undo)
    }

    /// Puts back the list captured by [`ChatSnapshot::delete_session`].
    pub fn restore(&mut self, undo: DeletedSession) {
        self.sessions = undo.sessions;
        self.current_session_index = undo.current_session_index;
    }

    /// Selected session, clamping an out-of-range index first.
    pub fn current_session(&mut self) -> Option<&Session> {
        if self.sessions.is_empty() {
            return None;
        }
        if self.current_session_index >= self.sessions.len() {
            self.current_session_index = self.sessions.len() - 1;
        }
        self.sessions.get(self.current_session_index)
    }

    pub fn pin_session(&mut self, index: usize, now: i64) {
        let Some(session) = self.sessions.get_mut(index) else {
            return;
        };
        session.pin(now);
        self.resort();
    }

    pub fn unpin_session(&mut self, index: usize) {
        let Some(session) = self.sessions.get_mut(index) else {
            return;
        };
        session.unpin();
        self.resort();
    }

    pub fn rename_session(&mut self, index: usize, topic: impl Into<String>, now: i64) {
        if let Some(session) = self.sessions.get_mut(index) {
            session.topic = topic.into();
            session.last_update = now;
        }
    }

    /// Empties the messages and memory of a session, keeping its identity.
    /// The summarize and clear-context markers only ever move forward, so
    /// they are left alone.
    pub fn reset_session(&mut self, session_id: &str, now: i64) {
        if let Some(session) = self.session_mut(session_id) {
            session.messages.clear();
            session.memory_prompt.clear();
            session.last_update = now;
        }
    }

    /// Appends a finished message and records it in the session stats.
    pub fn append_message(&mut self, session_id: &str, message: ChatMessage, now: i64) -> bool {
        let Some(session) = self.session_mut(session_id) else {
            return false;
        };
        session.stat.char_count += message.content.chars().count() as u64;
        session.messages.push(message);
        session.last_update = now;
        self.resort();
        true
    }

    /// Runs `updater` on one message, found by id.
    pub fn update_message<F>(&mut self, session_id: &str, message_id: &str, updater: F) -> bool
    where
        F: FnOnce(&mut ChatMessage),
    {
        let Some(message) = self
            .session_mut(session_id)
            .and_then(|s| s.messages.iter_mut().find(|m| m.id == message_id))
        else {
            return false;
        };
        let finished = !message.streaming;
        updater(message);
        // a finished message never streams again
        if finished {
            message.streaming = false;
        }
        true
    }

    /// Appends a user message and an in-progress assistant reply.
    pub fn begin_exchange(
        &mut self,
        session_id: &str,
        content: impl Into<String>,
        model: Option<String>,
        now: i64,
    ) -> Option<ExchangeIds> {
        let session = self.session_mut(session_id)?;
        let user = ChatMessage::new(MessageRole::User, content, now);
        let reply = ChatMessage::streaming_reply(model, now);
        let ids = ExchangeIds {
            session_id: session.id.clone(),
            user_message_id: user.id.clone(),
            reply_message_id: reply.id.clone(),
        };
        session.stat.char_count += user.content.chars().count() as u64;
        session.messages.push(user);
        session.messages.push(reply);
        Some(ids)
    }

    /// Replaces the streaming reply's content so far. A reply that already
    /// finished is left untouched.
    pub fn stream_update(&mut self, ids: &ExchangeIds, content: &str) -> bool {
        let Some(reply) = self
            .session_mut(&ids.session_id)
            .and_then(|s| s.messages.iter_mut().find(|m| m.id == ids.reply_message_id))
        else {
            return false;
        };
        if !reply.streaming {
            return false;
        }
        reply.content = content.to_string();
        true
    }

    pub fn record_tool_start(&mut self, ids: &ExchangeIds, tool: ToolCall) -> bool {
        self.update_message(&ids.session_id, &ids.reply_message_id, |m| {
            m.tools.push(tool);
        })
    }

    /// Replaces the tool record with the same id.
    pub fn record_tool_result(&mut self, ids: &ExchangeIds, tool: ToolCall) -> bool {
        self.update_message(&ids.session_id, &ids.reply_message_id, |m| {
            if let Some(slot) = m.tools.iter_mut().find(|t| t.id == tool.id) {
                *slot = tool;
            }
        })
    }

    /// Completes the reply. The session moves to the top of its group.
    pub fn finish_exchange(&mut self, ids: &ExchangeIds, content: Option<&str>, now: i64) -> bool {
        let finished = self.update_message(&ids.session_id, &ids.reply_message_id, |m| {
            m.streaming = false;
            if let Some(content) = content {
                m.content = content.to_string();
                m.date = format_date(now);
            }
        });
        if !finished {
            return false;
        }
        if let Some(session) = self.session_mut(&ids.session_id) {
            let added = content.map(|c| c.chars().count() as u64).unwrap_or(0);
            session.stat.char_count += added;
            session.last_update = now;
        }
        self.resort();
        true
    }

    /// Marks the exchange failed and appends the error text to the reply.
    pub fn fail_exchange(&mut self, ids: &ExchangeIds, error: &str, aborted: bool) -> bool {
        let failed = self.update_message(&ids.session_id, &ids.reply_message_id, |m| {
            m.streaming = false;
            m.content.push_str("\n\n");
            m.content.push_str(error);
            m.is_error = !aborted;
        });
        self.update_message(&ids.session_id, &ids.user_message_id, |m| {
            m.is_error = !aborted;
        });
        failed
    }

    /// Stores a new summary covering messages up to `summarized_through`.
    pub fn set_memory_prompt(
        &mut self,
        session_id: &str,
        memory_prompt: impl Into<String>,
        summarized_through: usize,
        now: i64,
    ) {
        if let Some(session) = self.session_mut(session_id) {
            session.memory_prompt = memory_prompt.into();
            session.last_summarize_index = session.last_summarize_index.max(summarized_through);
            session.last_update = now;
        }
    }

    /// Excludes the current messages from the model context.
    pub fn clear_context(&mut self, session_id: &str, now: i64) {
        if let Some(session) = self.session_mut(session_id) {
            let len = session.messages.len();
            let marker = session.clear_context_index.unwrap_or(0).max(len);
            session.clear_context_index = Some(marker);
            session.last_update = now;
        }
    }

    pub fn set_last_input(&mut self, text: impl Into<String>) {
        self.last_input = text.into();
    }

    pub fn open_menu(&mut self, session_id: impl Into<String>, top: i32, left: i32) {
        self.menu.is_open = true;
        self.menu.position.top = top;
        self.menu.position.left = left;
        self.menu.session_id = Some(session_id.into());
    }

    pub fn close_menu(&mut self) {
        self.menu.is_open = false;
        self.menu.session_id = None;
    }

    fn session_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::DEFAULT_TOPIC;

    fn snapshot_with(topics: &[&str]) -> ChatSnapshot {
        let mut snapshot = ChatSnapshot::fresh(0);
        snapshot.sessions = topics
            .iter()
            .enumerate()
            .map(|(i, t)| Session::with_topic(*t, 100 - i as i64))
            .collect();
        snapshot
    }

    fn topics(snapshot: &ChatSnapshot) -> Vec<&str> {
        snapshot.sessions.iter().map(|s| s.topic.as_str()).collect()
    }

    #[test]
    fn test_new_session_is_selected_first() {
        let mut snapshot = snapshot_with(&["a", "b"]);
        snapshot.select_session(1);
        snapshot.new_session(None, 5);
        assert_eq!(snapshot.sessions[0].topic, DEFAULT_TOPIC);
        assert_eq!(snapshot.current_session_index, 0);
    }

    #[test]
    fn test_fork_assigns_new_message_ids() {
        let mut snapshot = snapshot_with(&["a"]);
        let id = snapshot.sessions[0].id.clone();
        snapshot.append_message(&id, ChatMessage::new(MessageRole::User, "hi", 1), 1);

        snapshot.fork_session(2).unwrap();
        assert_eq!(snapshot.sessions.len(), 2);
        assert_eq!(snapshot.sessions[0].topic, "a");
        assert_ne!(
            snapshot.sessions[0].messages[0].id,
            snapshot.sessions[1].messages[0].id
        );
    }

    #[test]
    fn test_next_session_wraps() {
        let mut snapshot = snapshot_with(&["a", "b", "c"]);
        snapshot.next_session(-1);
        assert_eq!(snapshot.current_session_index, 2);
        snapshot.next_session(1);
        assert_eq!(snapshot.current_session_index, 0);
    }

    #[test]
    fn test_move_tracks_selection() {
        let mut snapshot = snapshot_with(&["a", "b", "c", "d"]);
        snapshot.select_session(2);
        snapshot.move_session(0, 3);
        assert_eq!(topics(&snapshot), vec!["b", "c", "d", "a"]);
        assert_eq!(snapshot.sessions[snapshot.current_session_index].topic, "c");

        snapshot.move_session(3, 0);
        assert_eq!(snapshot.sessions[snapshot.current_session_index].topic, "c");
    }

    #[test]
    fn test_delete_and_restore() {
        let mut snapshot = snapshot_with(&["a", "b", "c"]);
        snapshot.select_session(2);

        let undo = snapshot.delete_session(0, 10).unwrap();
        assert_eq!(topics(&snapshot), vec!["b", "c"]);
        assert_eq!(snapshot.current_session_index, 1);

        snapshot.restore(undo);
        assert_eq!(topics(&snapshot), vec!["a", "b", "c"]);
        assert_eq!(snapshot.current_session_index, 2);
    }

    #[test]
    fn test_delete_last_session_leaves_placeholder() {
        let mut snapshot = snapshot_with(&["only"]);
        snapshot.delete_session(0, 10).unwrap();
        assert_eq!(snapshot.sessions.len(), 1);
        assert!(snapshot.sessions[0].is_placeholder());
        assert!(snapshot.delete_session(5, 10).is_none());
    }

    #[test]
    fn test_current_session_clamps_index() {
        let mut snapshot = snapshot_with(&["a", "b"]);
        snapshot.select_session(9);
        assert_eq!(snapshot.current_session().unwrap().topic, "b");
        assert_eq!(snapshot.current_session_index, 1);
    }

    #[test]
    fn test_pin_moves_to_front_and_keeps_selection() {
        let mut snapshot = snapshot_with(&["a", "b", "c"]);
        snapshot.select_session(0);
        snapshot.pin_session(2, 50);
        assert_eq!(topics(&snapshot), vec!["c", "a", "b"]);
        assert_eq!(snapshot.sessions[snapshot.current_session_index].topic, "a");

        snapshot.unpin_session(0);
        assert_eq!(topics(&snapshot), vec!["a", "b", "c"]);
        assert!(snapshot.sessions.iter().all(|s| s.pinned_at.is_none()));
    }

    #[test]
    fn test_exchange_lifecycle() {
        let mut snapshot = snapshot_with(&["a", "b"]);
        let target = snapshot.sessions[1].id.clone();

        let ids = snapshot
            .begin_exchange(&target, "hello", Some("m".to_string()), 200)
            .unwrap();
        assert!(snapshot.stream_update(&ids, "partial"));
        assert!(snapshot.record_tool_start(
            &ids,
            ToolCall {
                id: "t1".to_string(),
                ..Default::default()
            }
        ));
        assert!(snapshot.record_tool_result(
            &ids,
            ToolCall {
                id: "t1".to_string(),
                content: Some("done".to_string()),
                ..Default::default()
            }
        ));
        assert!(snapshot.finish_exchange(&ids, Some("final"), 300));

        // finishing bumped the session to the top
        let session = &snapshot.sessions[0];
        assert_eq!(session.id, target);
        assert_eq!(session.last_update, 300);
        let reply = &session.messages[1];
        assert!(!reply.streaming);
        assert_eq!(reply.content, "final");
        assert_eq!(reply.tools[0].content.as_deref(), Some("done"));
        assert_eq!(session.stat.char_count, 5 + 5);
    }

    #[test]
    fn test_fail_exchange_marks_both_messages() {
        let mut snapshot = snapshot_with(&["a"]);
        let id = snapshot.sessions[0].id.clone();
        let ids = snapshot.begin_exchange(&id, "q", None, 1).unwrap();

        assert!(snapshot.fail_exchange(&ids, "boom", false));
        let messages = &snapshot.sessions[0].messages;
        assert!(messages.iter().all(|m| m.is_error && !m.streaming));
        assert!(messages[1].content.ends_with("boom"));
    }

    #[test]
    fn test_markers_never_move_backwards() {
        let mut snapshot = snapshot_with(&["a"]);
        let id = snapshot.sessions[0].id.clone();
        snapshot.set_memory_prompt(&id, "summary", 4, 10);
        snapshot.set_memory_prompt(&id, "older", 2, 20);
        assert_eq!(snapshot.sessions[0].last_summarize_index, 4);
        assert_eq!(snapshot.sessions[0].memory_prompt, "older");
        assert_eq!(snapshot.sessions[0].last_update, 20);

        snapshot.clear_context(&id, 30);
        snapshot.reset_session(&id, 40);
        let session = &snapshot.sessions[0];
        assert_eq!(session.last_summarize_index, 4);
        assert_eq!(session.clear_context_index, Some(0));
        assert!(session.memory_prompt.is_empty());
        assert_eq!(session.last_update, 40);
    }

    #[test]
    fn test_finished_reply_never_streams_again() {
        let mut snapshot = snapshot_with(&["a"]);
        let id = snapshot.sessions[0].id.clone();
        let ids = snapshot.begin_exchange(&id, "q", None, 1).unwrap();
        assert!(snapshot.finish_exchange(&ids, Some("done"), 2));

        assert!(!snapshot.stream_update(&ids, "late chunk"));
        assert!(snapshot.update_message(&id, &ids.reply_message_id, |m| {
            m.streaming = true;
            m.content.push('!');
        }));

        let reply = snapshot.session(&id).unwrap().messages[1].clone();
        assert!(!reply.streaming);
        assert_eq!(reply.content, "done!");
    }

    #[test]
    fn test_menu_state() {
        let mut snapshot = snapshot_with(&["a"]);
        snapshot.open_menu("s1", 10, 20);
        assert!(snapshot.menu.is_open);
        assert_eq!(snapshot.menu.session_id.as_deref(), Some("s1"));
        snapshot.close_menu();
        assert!(!snapshot.menu.is_open);
        assert!(snapshot.menu.session_id.is_none());
    }
}
