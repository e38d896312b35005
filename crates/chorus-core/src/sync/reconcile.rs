//! Entity-level merge of a local chat snapshot with a remote projection.
//!
//! The merge is total and never deletes: a session or message present on
//! only one side survives. Winners are picked by the timestamps embedded in
//! the data, never by arrival order, so two replicas that exchange snapshots
//! converge on the same scalar values.

use crate::session::message::ChatMessage;
use crate::session::model::Session;
use crate::session::snapshot::{ChatSnapshot, PersistedChat, sort_sessions};
use std::collections::HashMap;

/// Picks between two copies of the same message.
///
/// A finished copy always beats a streaming one. Otherwise the later date
/// wins and ties keep the local copy.
fn pick_message<'a>(local: &'a ChatMessage, remote: &'a ChatMessage) -> &'a ChatMessage {
    match (local.streaming, remote.streaming) {
        (true, false) => remote,
        (false, true) => local,
        _ if remote.timestamp_millis() > local.timestamp_millis() => remote,
        _ => local,
    }
}

/// Union of two message lists by id, sorted ascending by date.
pub fn merge_messages(local: &[ChatMessage], remote: &[ChatMessage]) -> Vec<ChatMessage> {
    let remote_by_id: HashMap<&str, &ChatMessage> =
        remote.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut merged: Vec<ChatMessage> = local
        .iter()
        .map(|l| match remote_by_id.get(l.id.as_str()) {
            Some(r) => pick_message(l, r).clone(),
            None => l.clone(),
        })
        .collect();

    let local_ids: std::collections::HashSet<&str> = local.iter().map(|m| m.id.as_str()).collect();
    merged.extend(
        remote
            .iter()
            .filter(|r| !local_ids.contains(r.id.as_str()))
            .cloned(),
    );

    merged.sort_by_key(|m| m.timestamp_millis());
    merged
}

/// Merges two copies of the same session.
pub fn merge_session(local: &Session, remote: &Session) -> Session {
    let scalars = if remote.last_update > local.last_update {
        remote
    } else {
        local
    };
    let pins = if remote.pin_time() > local.pin_time() {
        remote
    } else {
        local
    };

    Session {
        id: local.id.clone(),
        topic: scalars.topic.clone(),
        memory_prompt: scalars.memory_prompt.clone(),
        messages: merge_messages(&local.messages, &remote.messages),
        stat: scalars.stat,
        last_update: local.last_update.max(remote.last_update),
        last_summarize_index: local.last_summarize_index.max(remote.last_summarize_index),
        clear_context_index: local.clear_context_index.max(remote.clear_context_index),
        pinned: pins.pinned,
        pinned_at: pins.pinned_at,
    }
}

/// Union of two session lists by id. Local order first, then remote-only
/// sessions in remote order; callers re-sort afterwards.
pub fn merge_sessions(local: &[Session], remote: &[Session]) -> Vec<Session> {
    let remote_by_id: HashMap<&str, &Session> =
        remote.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut merged: Vec<Session> = local
        .iter()
        .map(|l| match remote_by_id.get(l.id.as_str()) {
            Some(r) => merge_session(l, r),
            None => l.clone(),
        })
        .collect();

    let local_ids: std::collections::HashSet<&str> = local.iter().map(|s| s.id.as_str()).collect();
    merged.extend(
        remote
            .iter()
            .filter(|r| !local_ids.contains(r.id.as_str()))
            .cloned(),
    );
    merged
}

/// Merges a remote projection into a local snapshot.
///
/// Sessions are re-sorted and the selection follows the previously selected
/// session id. Ephemeral fields come from `local` untouched.
pub fn reconcile_chat(local: &ChatSnapshot, remote: PersistedChat) -> ChatSnapshot {
    let merged = merge_sessions(&local.sessions, &remote.sessions);
    let (sessions, current_session_index) = sort_sessions(merged, local.current_session_id());

    ChatSnapshot {
        sessions,
        current_session_index,
        last_input: local.last_input.clone(),
        menu: local.menu.clone(),
        hydrated: local.hydrated,
    }
}
