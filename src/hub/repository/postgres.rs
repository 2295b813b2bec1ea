use anyhow::Result;
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use sqlx::PgPool;

use crate::hub::repository::{owned_from_row, trigger_from_row, HubRepository};
use crate::hub::{OwnedChannel, TriggerChannel};

pub struct PostgresHubRepository {
    pool: PgPool,
}

impl PostgresHubRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HubRepository for PostgresHubRepository {
    async fn find_trigger(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Option<TriggerChannel>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, Option<i32>, Option<String>)>(
            "SELECT guild_id, channel_id, category_id, user_limit, name \
             FROM trigger_channels WHERE guild_id = $1 AND channel_id = $2",
        )
        .bind(guild_id.to_string())
        .bind(channel_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(widen_limit).map(trigger_from_row).transpose()
    }

    async fn list_triggers(&self, guild_id: GuildId) -> Result<Vec<TriggerChannel>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<i32>, Option<String>)>(
            "SELECT guild_id, channel_id, category_id, user_limit, name \
             FROM trigger_channels WHERE guild_id = $1 ORDER BY channel_id",
        )
        .bind(guild_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(widen_limit)
            .map(trigger_from_row)
            .collect()
    }

    async fn insert_trigger(&self, trigger: &TriggerChannel) -> Result<()> {
        sqlx::query(
            "INSERT INTO trigger_channels (guild_id, channel_id, category_id, user_limit, name) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(trigger.guild_id.to_string())
        .bind(trigger.channel_id.to_string())
        .bind(trigger.category_id.map(|id| id.to_string()))
        .bind(trigger.user_limit.map(|limit| limit as i32))
        .bind(&trigger.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_trigger(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM trigger_channels WHERE guild_id = $1 AND channel_id = $2",
        )
        .bind(guild_id.to_string())
        .bind(channel_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_triggers(&self, guild_id: GuildId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM trigger_channels WHERE guild_id = $1")
            .bind(guild_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_owned_by_member(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
    ) -> Result<Option<OwnedChannel>> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT channel_id, guild_id, owner_id \
             FROM owned_channels WHERE guild_id = $1 AND owner_id = $2",
        )
        .bind(guild_id.to_string())
        .bind(owner_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(owned_from_row).transpose()
    }

    async fn insert_owned(&self, owned: &OwnedChannel) -> Result<()> {
        sqlx::query(
            "INSERT INTO owned_channels (channel_id, guild_id, owner_id) VALUES ($1, $2, $3) \
             ON CONFLICT (channel_id) DO UPDATE SET owner_id = EXCLUDED.owner_id",
        )
        .bind(owned.channel_id.to_string())
        .bind(owned.guild_id.to_string())
        .bind(owned.owner_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_owned_by_channel(&self, channel_id: ChannelId) -> Result<Option<OwnedChannel>> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "DELETE FROM owned_channels WHERE channel_id = $1 \
             RETURNING channel_id, guild_id, owner_id",
        )
        .bind(channel_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(owned_from_row).transpose()
    }
}

fn widen_limit(
    row: (String, String, Option<String>, Option<i32>, Option<String>),
) -> (String, String, Option<String>, Option<i64>, Option<String>) {
    let (guild_id, channel_id, category_id, user_limit, name) = row;
    (guild_id, channel_id, category_id, user_limit.map(i64::from), name)
}
