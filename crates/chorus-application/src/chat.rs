//! Chat replica: the command surface presentation code talks to.

use crate::bootstrap::ReplicaBuilder;
use crate::replica::Replica;
use chorus_core::error::Result;
use chorus_core::session::{
    ChatMessage, ChatSnapshot, DeletedSession, ExchangeIds, MessageRole, Session, ToolCall,
};
use chorus_core::sync::{SyncMessage, SyncPhase, WriteOutcome};
use chorus_infrastructure::ChatCodec;
use std::sync::Arc;
use tokio::sync::watch;

/// Storage key of the chat state.
pub const CHAT_KEY: &str = "chat";

/// Handle to a replicated chat state. Clones share one replica.
#[derive(Clone)]
pub struct ChatReplica {
    replica: Replica<ChatSnapshot>,
}

impl ChatReplica {
    pub async fn open(builder: ReplicaBuilder) -> Result<Self> {
        let initial = ChatSnapshot::fresh(builder.now_millis());
        let replica = builder.open(Arc::new(ChatCodec::new()), initial).await?;
        Ok(Self { replica })
    }

    pub fn replica(&self) -> &Replica<ChatSnapshot> {
        &self.replica
    }

    pub fn replica_id(&self) -> &str {
        self.replica.replica_id()
    }

    pub fn snapshot(&self) -> Arc<ChatSnapshot> {
        self.replica.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ChatSnapshot>> {
        self.replica.subscribe()
    }

    pub fn phase(&self) -> SyncPhase {
        self.replica.phase()
    }

    pub fn applied_revision(&self) -> u64 {
        self.replica.applied_revision()
    }

    fn now(&self) -> i64 {
        self.replica.now_millis()
    }

    pub fn new_session(&self, topic: Option<&str>) -> String {
        let now = self.now();
        self.replica.apply(|s| s.new_session(topic, now))
    }

    pub fn fork_session(&self) -> Option<String> {
        let now = self.now();
        self.replica.apply(|s| s.fork_session(now))
    }

    pub fn clear_sessions(&self) {
        let now = self.now();
        self.replica.apply(|s| s.clear_sessions(now));
    }

    pub fn select_session(&self, index: usize) {
        self.replica.apply(|s| s.select_session(index));
    }

    pub fn next_session(&self, delta: isize) {
        self.replica.apply(|s| s.next_session(delta));
    }

    pub fn move_session(&self, from: usize, to: usize) {
        self.replica.apply(|s| s.move_session(from, to));
    }

    /// Deletes the session at `index`. Pass the token to [`ChatReplica::restore`]
    /// to undo.
    pub fn delete_session(&self, index: usize) -> Option<DeletedSession> {
        let now = self.now();
        let undo = self.replica.apply(|s| s.delete_session(index, now));
        if let Some(undo) = &undo {
            tracing::info!("[Chat] Deleted session {}", undo.session_id);
        }
        undo
    }

    pub fn restore(&self, undo: DeletedSession) {
        tracing::info!("[Chat] Restoring session {}", undo.session_id);
        self.replica.apply(|s| s.restore(undo));
    }

    /// Selected session. An out-of-range selection is clamped first; a
    /// valid one is read without touching the replica.
    pub fn current_session(&self) -> Option<Session> {
        let snapshot = self.replica.snapshot();
        if snapshot.sessions.is_empty() {
            return None;
        }
        if let Some(session) = snapshot.sessions.get(snapshot.current_session_index) {
            return Some(session.clone());
        }
        self.replica.apply(|s| s.current_session().cloned())
    }

    pub fn pin_session(&self, index: usize) {
        let now = self.now();
        self.replica.apply(|s| s.pin_session(index, now));
    }

    pub fn unpin_session(&self, index: usize) {
        self.replica.apply(|s| s.unpin_session(index));
    }

    pub fn rename_session(&self, index: usize, topic: impl Into<String>) {
        let now = self.now();
        let topic = topic.into();
        self.replica.apply(|s| s.rename_session(index, topic, now));
    }

    pub fn reset_session(&self, session_id: &str) {
        let now = self.now();
        self.replica.apply(|s| s.reset_session(session_id, now));
    }

    /// Appends a finished message. Returns its id, or `None` for an unknown
    /// session.
    pub fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Option<String> {
        let now = self.now();
        let message = ChatMessage::new(role, content, now);
        let id = message.id.clone();
        self.replica
            .apply(|s| s.append_message(session_id, message, now))
            .then_some(id)
    }

    pub fn update_message<F>(&self, session_id: &str, message_id: &str, updater: F) -> bool
    where
        F: FnOnce(&mut ChatMessage),
    {
        self.replica
            .apply(|s| s.update_message(session_id, message_id, updater))
    }

    pub fn set_memory_prompt(
        &self,
        session_id: &str,
        memory_prompt: impl Into<String>,
        summarized_through: usize,
    ) {
        let now = self.now();
        let prompt = memory_prompt.into();
        self.replica
            .apply(|s| s.set_memory_prompt(session_id, prompt, summarized_through, now));
    }

    pub fn clear_context(&self, session_id: &str) {
        let now = self.now();
        self.replica.apply(|s| s.clear_context(session_id, now));
    }

    pub fn set_last_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.replica.apply(|s| s.set_last_input(text));
    }

    pub fn open_menu(&self, session_id: impl Into<String>, top: i32, left: i32) {
        let session_id = session_id.into();
        self.replica.apply(|s| s.open_menu(session_id, top, left));
    }

    pub fn close_menu(&self) {
        self.replica.apply(|s| s.close_menu());
    }

    /// Starts a response in the selected session.
    ///
    /// Appends the user message and an in-progress reply, then holds off
    /// remote reconciles until the returned stream finishes or fails.
    pub fn begin_response(
        &self,
        content: impl Into<String>,
        model: Option<String>,
    ) -> Option<ResponseStream> {
        let now = self.now();
        let content = content.into();
        let ids = self.replica.apply(|s| {
            let session_id = s.current_session()?.id.clone();
            s.begin_exchange(&session_id, content, model, now)
        })?;
        self.replica.begin_in_flight();
        tracing::debug!(
            "[Chat] Response started in {} ({})",
            ids.session_id,
            ids.reply_message_id
        );
        Some(ResponseStream {
            replica: self.replica.clone(),
            ids,
            done: false,
        })
    }

    pub async fn handle_notice(&self, message: &SyncMessage) -> Result<bool> {
        self.replica.handle_notice(message).await
    }

    pub async fn reconcile_now(&self) -> Result<bool> {
        self.replica.reconcile_now().await
    }

    pub async fn flush(&self) -> Result<Option<WriteOutcome>> {
        self.replica.flush().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.replica.shutdown().await
    }
}

/// Producer side of one assistant reply.
///
/// Dropping an unfinished stream marks the reply aborted.
pub struct ResponseStream {
    replica: Replica<ChatSnapshot>,
    ids: ExchangeIds,
    done: bool,
}

impl ResponseStream {
    pub fn ids(&self) -> &ExchangeIds {
        &self.ids
    }

    /// Replaces the partial content of the reply.
    pub fn update(&self, content: &str) -> bool {
        self.replica.apply(|s| s.stream_update(&self.ids, content))
    }

    pub fn before_tool(&self, tool: ToolCall) -> bool {
        self.replica.apply(|s| s.record_tool_start(&self.ids, tool))
    }

    pub fn after_tool(&self, tool: ToolCall) -> bool {
        self.replica.apply(|s| s.record_tool_result(&self.ids, tool))
    }

    /// Completes the reply, optionally with its final content.
    pub async fn finish(mut self, content: Option<&str>) -> bool {
        self.done = true;
        let now = self.replica.now_millis();
        let finished = self
            .replica
            .apply(|s| s.finish_exchange(&self.ids, content, now));
        self.replica.end_in_flight().await;
        finished
    }

    /// Ends the reply with an error. `aborted` marks a user cancellation,
    /// which is not flagged as an error.
    pub async fn fail(mut self, error: &str, aborted: bool) -> bool {
        self.done = true;
        let failed = self
            .replica
            .apply(|s| s.fail_exchange(&self.ids, error, aborted));
        self.replica.end_in_flight().await;
        failed
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        tracing::warn!("[Chat] Response {} dropped unfinished", self.ids.reply_message_id);
        self.replica
            .apply(|s| s.fail_exchange(&self.ids, "aborted", true));
        self.replica.end_in_flight_detached();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::SyncContext;
    use chorus_core::sync::{ManualClock, Replicated};
    use std::time::Duration;

    async fn open_chat() -> (ChatReplica, ManualClock) {
        let clock = ManualClock::new(1_000);
        let context = SyncContext::in_memory(Arc::new(clock.clone()), Duration::from_millis(10));
        (context.open_chat().await.unwrap(), clock)
    }

    #[tokio::test]
    async fn test_fresh_replica_has_one_placeholder() {
        let (chat, _) = open_chat().await;
        let snapshot = chat.snapshot();
        assert!(snapshot.is_hydrated());
        assert_eq!(snapshot.sessions.len(), 1);
        assert!(snapshot.sessions[0].is_placeholder());
    }

    #[tokio::test]
    async fn test_response_stream_finishes_reply() {
        let (chat, clock) = open_chat().await;
        let stream = chat.begin_response("hello", Some("model-x".into())).unwrap();
        assert!(stream.update("Hi"));
        assert!(chat.snapshot().persisted().sessions[0].messages.len() == 1);

        clock.advance(500);
        assert!(stream.finish(Some("Hi there")).await);

        let session = chat.current_session().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert!(!session.messages[1].streaming);
        assert_eq!(session.messages[1].content, "Hi there");
        assert_eq!(session.last_update, 1_500);
    }

    #[tokio::test]
    async fn test_tool_records_follow_reply() {
        let (chat, _) = open_chat().await;
        let stream = chat.begin_response("run it", None).unwrap();
        let tool = ToolCall {
            id: "call-1".into(),
            ..Default::default()
        };
        assert!(stream.before_tool(tool.clone()));
        assert!(stream.after_tool(ToolCall {
            content: Some("done".into()),
            ..tool
        }));
        assert!(stream.fail("network down", false).await);

        let session = chat.current_session().unwrap();
        let reply = &session.messages[1];
        assert!(reply.is_error);
        assert!(session.messages[0].is_error);
        assert_eq!(reply.tools[0].content.as_deref(), Some("done"));
        assert!(reply.content.ends_with("network down"));
    }

    #[tokio::test]
    async fn test_dropped_stream_is_aborted() {
        let (chat, _) = open_chat().await;
        let stream = chat.begin_response("question", None).unwrap();
        drop(stream);

        let session = chat.current_session().unwrap();
        assert!(!session.messages[1].streaming);
        assert!(!session.messages[1].is_error);
    }

    #[tokio::test]
    async fn test_delete_and_restore() {
        let (chat, _) = open_chat().await;
        let id = chat.new_session(Some("keep me"));
        let undo = chat.delete_session(0).unwrap();
        assert!(chat.snapshot().session(&id).is_none());

        chat.restore(undo);
        assert_eq!(chat.current_session().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_reading_current_session_publishes_nothing() {
        let (chat, _) = open_chat().await;
        let id = chat.new_session(Some("quiet"));
        chat.flush().await.unwrap();
        let mut rx = chat.subscribe();
        rx.borrow_and_update();

        assert_eq!(chat.current_session().unwrap().id, id);
        assert!(!rx.has_changed().unwrap());
        assert!(chat.flush().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_is_rejected() {
        let (chat, _) = open_chat().await;
        assert!(chat.append_message("missing", MessageRole::User, "x").is_none());
    }
}
