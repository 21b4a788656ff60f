// Shared embed builders and colours for bot responses.

use crate::core::audit::ParticipantRef;
use poise::serenity_prelude as serenity;

pub const SUCCESS: u32 = 0x2ECC71;
pub const WARNING: u32 = 0xF39C12;
pub const DANGER: u32 = 0xE74C3C;
pub const INFO: u32 = 0x3498DB;
pub const NEUTRAL: u32 = 0x95A5A6;
pub const VERIFY: u32 = 0x9B59B6;

/// Discord caps embed field values at 1024 characters.
pub const FIELD_LIMIT: usize = 1024;

pub fn success(title: &str, description: impl Into<String>) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(format!("✅ {}", title))
        .description(description)
        .color(SUCCESS)
        .timestamp(serenity::Timestamp::now())
}

pub fn error(description: impl Into<String>) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("❌ Error")
        .description(description)
        .color(DANGER)
}

pub fn info(title: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title)
        .color(INFO)
        .timestamp(serenity::Timestamp::now())
}

/// `<@id>` when we only have an id.
pub fn mention(id: u64) -> String {
    format!("<@{}>", id)
}

/// Mention plus the stored name, if any.
pub fn describe(participant: &ParticipantRef) -> String {
    match &participant.name {
        Some(name) => format!("{} ({})", mention(participant.id), name),
        None => mention(participant.id),
    }
}

/// Truncate on a char boundary, marking the cut with an ellipsis.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Field value that is never empty.
pub fn field_value(text: &str) -> String {
    if text.trim().is_empty() {
        "*No content*".to_string()
    } else {
        truncate(text, FIELD_LIMIT)
    }
}
