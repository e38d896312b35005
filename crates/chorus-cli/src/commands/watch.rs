use super::utils::{load_config, session_line};
use anyhow::Result;
use chorus_application::SyncContext;
use chorus_core::config::NotifierStrategy;
use std::path::Path;

/// Keeps a replica open and prints the session list on every change.
pub async fn run(path: Option<&Path>) -> Result<()> {
    let config = load_config(path).await?;
    if config.storage.notifier == NotifierStrategy::Broadcast {
        tracing::warn!(
            "[Watch] notifier = \"broadcast\" only reaches this process; use \"ping\" to see other processes"
        );
    }
    let context = SyncContext::from_config(&config)?;
    let chat = context.open_chat().await?;
    let mut rx = chat.subscribe();
    println!("👀 Watching as {} (Ctrl-C to stop)", chat.replica_id());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                println!("--- revision {} ---", chat.applied_revision());
                for (index, session) in snapshot.sessions.iter().enumerate() {
                    let selected = index == snapshot.current_session_index;
                    println!("{}", session_line(index, session, selected));
                }
            }
        }
    }

    chat.shutdown().await?;
    Ok(())
}
