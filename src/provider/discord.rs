use anyhow::{Context as _, Result};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{
    ChannelId, ChannelType, CreateChannel, EditChannel, EditMember, GuildId, UserId,
};

use crate::provider::{ChannelProvider, NewVoiceChannel};

/// Production provider backed by the serenity context (HTTP + gateway cache).
pub struct SerenityChannelProvider {
    ctx: serenity::Context,
}

impl SerenityChannelProvider {
    pub fn new(ctx: serenity::Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ChannelProvider for SerenityChannelProvider {
    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        channel: &NewVoiceChannel,
    ) -> Result<ChannelId> {
        let mut builder = CreateChannel::new(channel.name.clone()).kind(ChannelType::Voice);
        if let Some(category_id) = channel.category_id {
            builder = builder.category(category_id);
        }
        if let Some(user_limit) = channel.user_limit {
            builder = builder.user_limit(user_limit);
        }

        let created = guild_id
            .create_channel(&self.ctx.http, builder)
            .await
            .context("failed to create voice channel")?;
        Ok(created.id)
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        channel_id
            .delete(&self.ctx.http)
            .await
            .context("failed to delete channel")?;
        Ok(())
    }

    async fn rename_channel(&self, channel_id: ChannelId, name: &str) -> Result<()> {
        channel_id
            .edit(&self.ctx.http, EditChannel::new().name(name))
            .await
            .context("failed to rename channel")?;
        Ok(())
    }

    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<()> {
        guild_id
            .edit_member(
                &self.ctx.http,
                user_id,
                EditMember::new().voice_channel(channel_id),
            )
            .await
            .context("failed to move member")?;
        Ok(())
    }

    async fn channel_members(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Option<Vec<UserId>>> {
        let Some(guild) = self.ctx.cache.guild(guild_id) else {
            return Ok(None);
        };
        if !guild.channels.contains_key(&channel_id) {
            return Ok(None);
        }

        let mut members: Vec<UserId> = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id))
            .map(|state| state.user_id)
            .collect();
        // Cache iteration order is unstable; sort so the successor choice on
        // ownership transfer is reproducible.
        members.sort_unstable();
        Ok(Some(members))
    }

    async fn member_display_name(&self, guild_id: GuildId, user_id: UserId) -> Result<String> {
        if let Some(guild) = self.ctx.cache.guild(guild_id) {
            if let Some(member) = guild.members.get(&user_id) {
                return Ok(member.display_name().to_string());
            }
        }

        let member = guild_id
            .member(&self.ctx.http, user_id)
            .await
            .context("failed to fetch member")?;
        Ok(member.display_name().to_string())
    }
}
