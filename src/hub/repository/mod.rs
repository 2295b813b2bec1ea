use anyhow::{Context, Result};
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};

use crate::hub::{OwnedChannel, TriggerChannel};

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Narrow persistence interface for trigger configuration and channel
/// ownership. The store is the only authority for "is this a temp channel
/// and who owns it".
#[async_trait]
pub trait HubRepository: Send + Sync {
    async fn find_trigger(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Option<TriggerChannel>>;
    async fn list_triggers(&self, guild_id: GuildId) -> Result<Vec<TriggerChannel>>;
    async fn insert_trigger(&self, trigger: &TriggerChannel) -> Result<()>;
    /// Returns false when no matching trigger existed.
    async fn delete_trigger(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<bool>;
    /// Returns the number of triggers removed.
    async fn delete_all_triggers(&self, guild_id: GuildId) -> Result<u64>;

    async fn find_owned_by_member(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
    ) -> Result<Option<OwnedChannel>>;
    async fn insert_owned(&self, owned: &OwnedChannel) -> Result<()>;
    /// Atomically delete and return the ownership record for a channel.
    ///
    /// This is the claim step of departure handling: whichever caller gets the
    /// record back is the one responsible for the settle recheck, so duplicate
    /// deliveries of the same departure collapse into one no-op.
    async fn take_owned_by_channel(&self, channel_id: ChannelId) -> Result<Option<OwnedChannel>>;
}

/// Snowflakes are stored as TEXT; Discord ids do not fit SQLite's signed
/// integer affinity comfortably and zero is not a valid id.
pub(crate) fn parse_id(value: &str) -> Result<u64> {
    let id: u64 = value
        .parse()
        .with_context(|| format!("invalid snowflake in database: {value:?}"))?;
    if id == 0 {
        anyhow::bail!("zero snowflake in database");
    }
    Ok(id)
}

pub(crate) fn trigger_from_row(
    row: (String, String, Option<String>, Option<i64>, Option<String>),
) -> Result<TriggerChannel> {
    let (guild_id, channel_id, category_id, user_limit, name) = row;
    Ok(TriggerChannel {
        guild_id: GuildId::new(parse_id(&guild_id)?),
        channel_id: ChannelId::new(parse_id(&channel_id)?),
        category_id: category_id
            .as_deref()
            .map(parse_id)
            .transpose()?
            .map(ChannelId::new),
        user_limit: user_limit
            .map(u32::try_from)
            .transpose()
            .context("negative user limit in database")?,
        name,
    })
}

pub(crate) fn owned_from_row(row: (String, String, String)) -> Result<OwnedChannel> {
    let (channel_id, guild_id, owner_id) = row;
    Ok(OwnedChannel {
        guild_id: GuildId::new(parse_id(&guild_id)?),
        channel_id: ChannelId::new(parse_id(&channel_id)?),
        owner_id: UserId::new(parse_id(&owner_id)?),
    })
}
