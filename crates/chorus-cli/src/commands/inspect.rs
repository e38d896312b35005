use super::utils::open_context;
use anyhow::{Context, Result};
use chorus_core::session::message::format_date;
use chorus_core::sync::Envelope;
use std::path::Path;

/// Prints the envelope stored under `key` without opening a replica.
pub async fn run(path: Option<&Path>, key: &str, json: bool) -> Result<()> {
    let context = open_context(path).await?;
    let Some(raw) = context.store().get(key).await? else {
        println!("Nothing stored under {:?}", key);
        return Ok(());
    };
    let envelope: Envelope = serde_json::from_str(&raw)
        .with_context(|| format!("Stored value for {:?} is not an envelope", key))?;

    println!("key:       {}", key);
    println!("revision:  {}", envelope.revision);
    println!("schema:    {}", envelope.schema_version);
    println!("writer:    {}", envelope.writer);
    println!("updated:   {}", format_date(envelope.updated_at));
    if let Some(sessions) = envelope.snapshot.get("sessions").and_then(|s| s.as_array()) {
        println!("sessions:  {}", sessions.len());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&envelope.snapshot)?);
    }
    Ok(())
}
