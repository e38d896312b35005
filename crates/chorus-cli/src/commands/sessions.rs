use super::utils::{open_context, session_line};
use anyhow::{Result, bail};
use chorus_application::ChatReplica;
use chorus_core::session::MessageRole;
use std::path::Path;

async fn open_chat(path: Option<&Path>) -> Result<ChatReplica> {
    let context = open_context(path).await?;
    Ok(context.open_chat().await?)
}

fn check_index(chat: &ChatReplica, index: usize) -> Result<()> {
    let len = chat.snapshot().sessions.len();
    if index >= len {
        bail!("No session at index {} ({} sessions)", index, len);
    }
    Ok(())
}

pub async fn list(path: Option<&Path>) -> Result<()> {
    let chat = open_chat(path).await?;
    let snapshot = chat.snapshot();
    for (index, session) in snapshot.sessions.iter().enumerate() {
        let selected = index == snapshot.current_session_index;
        println!("{}", session_line(index, session, selected));
    }
    Ok(())
}

pub async fn create(path: Option<&Path>, topic: Option<&str>) -> Result<()> {
    let chat = open_chat(path).await?;
    let id = chat.new_session(topic);
    chat.shutdown().await?;
    println!("✅ Created session {}", id);
    Ok(())
}

pub async fn rename(path: Option<&Path>, index: usize, topic: &str) -> Result<()> {
    let chat = open_chat(path).await?;
    check_index(&chat, index)?;
    chat.rename_session(index, topic);
    chat.shutdown().await?;
    println!("✅ Renamed session {} to {:?}", index, topic);
    Ok(())
}

pub async fn pin(path: Option<&Path>, index: usize, pinned: bool) -> Result<()> {
    let chat = open_chat(path).await?;
    check_index(&chat, index)?;
    if pinned {
        chat.pin_session(index);
    } else {
        chat.unpin_session(index);
    }
    chat.shutdown().await?;
    println!("✅ {} session {}", if pinned { "Pinned" } else { "Unpinned" }, index);
    Ok(())
}

/// Adds a user message to the selected session, optionally followed by a
/// finished assistant reply.
pub async fn send(
    path: Option<&Path>,
    message: &str,
    reply: Option<&str>,
    model: Option<String>,
) -> Result<()> {
    let chat = open_chat(path).await?;
    match reply {
        Some(reply) => {
            let Some(stream) = chat.begin_response(message, model) else {
                bail!("No session selected");
            };
            stream.finish(Some(reply)).await;
        }
        None => {
            let Some(session) = chat.current_session() else {
                bail!("No session selected");
            };
            chat.append_message(&session.id, MessageRole::User, message);
        }
    }
    chat.shutdown().await?;
    println!("✅ Sent");
    Ok(())
}

pub async fn delete(path: Option<&Path>, index: usize) -> Result<()> {
    let chat = open_chat(path).await?;
    check_index(&chat, index)?;
    let topic = chat.snapshot().sessions[index].topic.clone();
    chat.delete_session(index);
    chat.shutdown().await?;
    println!("🗑️  Deleted {:?}", topic);
    Ok(())
}
