use crate::core::audit::NewAuditEvent;
use crate::discord::embeds;
use poise::serenity_prelude::{self as serenity, CreateEmbed, CreateEmbedFooter};

/// One passive audit entry: what gets stored, plus the line shown to staff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub event: NewAuditEvent,
    pub headline: String,
}

impl LogEntry {
    pub fn new(event: NewAuditEvent, headline: impl Into<String>) -> Self {
        Self {
            event,
            headline: headline.into(),
        }
    }
}

/// Neutral "Audit Log" embed mirrored to the mod channel.
pub fn format_log_entry(entry: &LogEntry) -> CreateEmbed {
    CreateEmbed::default()
        .title("Audit Log")
        .description(embeds::truncate(&entry.headline, 4000))
        .color(embeds::NEUTRAL)
        .footer(CreateEmbedFooter::new(format!(
            "{} • User ID: {}",
            entry.event.kind, entry.event.subject.id
        )))
        .timestamp(serenity::Timestamp::now())
}
