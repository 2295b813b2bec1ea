use poise::serenity_prelude::{ChannelId, GuildId, UserId};

pub mod lifecycle;
pub mod repository;

/// A configured "join this to spawn a channel" entry.
///
/// At most one exists per (guild, channel) pair; the database primary key
/// enforces this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerChannel {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    /// Category the spawned channels are placed under.
    pub category_id: Option<ChannelId>,
    /// User limit applied to spawned channels. `None` means unlimited.
    pub user_limit: Option<u32>,
    /// Custom name for spawned channels. `None` falls back to the owner's
    /// display name plus the configured suffix.
    pub name: Option<String>,
}

/// A spawned temporary voice channel and its current owner.
///
/// This record is the single source of truth correlating a Discord voice
/// channel with its creator; ownership is never inferred from channel naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedChannel {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub owner_id: UserId,
}

/// A single raw voice-presence change for one member, as delivered by the
/// gateway. Either side may be `None` (joined from nowhere, left to nowhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTransition {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}
