use anyhow::Result;
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};

pub mod discord;

/// What the lifecycle manager asks of a new temporary channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVoiceChannel {
    pub name: String,
    pub category_id: Option<ChannelId>,
    /// `None` means unlimited.
    pub user_limit: Option<u32>,
}

/// Voice-channel operations the lifecycle manager needs from Discord.
///
/// The seam exists so the manager can be exercised against an in-memory
/// provider; the production impl wraps the serenity context.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        channel: &NewVoiceChannel,
    ) -> Result<ChannelId>;

    /// Fails if the channel is already gone.
    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()>;

    /// Fails if the provider rejects the new name.
    async fn rename_channel(&self, channel_id: ChannelId, name: &str) -> Result<()>;

    /// Best-effort; callers treat failure as non-fatal.
    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<()>;

    /// Current membership snapshot, eventually consistent. Returns `None`
    /// when the channel no longer exists. The order is deterministic.
    async fn channel_members(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Option<Vec<UserId>>>;

    async fn member_display_name(&self, guild_id: GuildId, user_id: UserId) -> Result<String>;
}
