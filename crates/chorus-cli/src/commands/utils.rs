use anyhow::{Context, Result};
use chorus_application::SyncContext;
use chorus_core::config::ChorusConfig;
use chorus_core::session::Session;
use chorus_infrastructure::ConfigService;
use std::path::Path;

pub fn config_service(path: Option<&Path>) -> Result<ConfigService> {
    match path {
        Some(path) => Ok(ConfigService::new(path)),
        None => ConfigService::default_location().context("Failed to locate config directory"),
    }
}

pub async fn load_config(path: Option<&Path>) -> Result<ChorusConfig> {
    let service = config_service(path)?;
    service
        .load()
        .await
        .with_context(|| format!("Failed to load {}", service.path().display()))
}

pub async fn open_context(path: Option<&Path>) -> Result<SyncContext> {
    let config = load_config(path).await?;
    SyncContext::from_config(&config).context("Failed to set up storage")
}

/// One display line per session.
pub fn session_line(index: usize, session: &Session, selected: bool) -> String {
    let marker = if selected { '>' } else { ' ' };
    let pin = if session.pinned { "📌 " } else { "" };
    format!(
        "{} {:>3}  {}{}  ({} messages)",
        marker,
        index,
        pin,
        session.topic,
        session.messages.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_line_marks_selection_and_pin() {
        let mut session = Session::with_topic("Plans", 0);
        session.pin(10);
        let line = session_line(2, &session, true);
        assert!(line.starts_with(">   2"));
        assert!(line.contains("📌 Plans"));
        assert!(line.ends_with("(0 messages)"));

        session.unpin();
        assert!(!session_line(0, &session, false).contains('📌'));
    }
}
