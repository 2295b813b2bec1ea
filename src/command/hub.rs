use anyhow::anyhow;
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{Colour, CreateEmbed, CreateEmbedFooter, Mentionable};
use poise::CreateReply;
use tracing::warn;

use crate::command::{Context, Result};
use crate::hub::lifecycle::RenameOutcome;
use crate::hub::TriggerChannel;
use crate::provider::discord::SerenityChannelProvider;

/// Manage the temporary voice-channel hub.
#[poise::command(
    slash_command,
    guild_only,
    subcommands("setup", "remove", "list", "disable", "rename"),
    subcommand_required
)]
pub async fn hub(_: Context<'_>) -> Result<()> {
    Ok(())
}

async fn reply_embed(ctx: &Context<'_>, message: impl Into<String>) -> Result<()> {
    ctx.send(
        CreateReply::default()
            .ephemeral(true)
            .embed(CreateEmbed::new().colour(Colour::BLURPLE).description(message)),
    )
    .await?;
    Ok(())
}

/// Set up a trigger channel that spawns temporary voice channels.
#[poise::command(slash_command, required_permissions = "ADMINISTRATOR")]
pub async fn setup(
    ctx: Context<'_>,
    #[description = "Voice channel that spawns temporary channels when joined"]
    #[channel_types("Voice")]
    channel: serenity::GuildChannel,
    #[description = "User limit for spawned channels"]
    #[min = 1]
    #[max = 99]
    limit: Option<u16>,
    #[description = "Custom name for spawned channels"] name: Option<String>,
) -> Result<()> {
    let guild_id = ctx.guild_id().ok_or_else(|| anyhow!("guild only"))?;
    let repository = ctx.data().repository.clone();

    if repository.find_trigger(guild_id, channel.id).await?.is_some() {
        return reply_embed(
            &ctx,
            format!(
                "⚠️ {} is already set up as a trigger channel.",
                channel.id.mention()
            ),
        )
        .await;
    }

    repository
        .insert_trigger(&TriggerChannel {
            guild_id,
            channel_id: channel.id,
            category_id: channel.parent_id,
            user_limit: limit.map(u32::from),
            name: name.clone(),
        })
        .await?;

    let limit_str = limit.map_or_else(|| String::from("unlimited"), |l| l.to_string());
    let name_str = name.map_or_else(String::new, |n| format!(" and name `{n}`"));
    reply_embed(
        &ctx,
        format!(
            "🌍 Voice channel creation has been set up in {} with limit `{limit_str}`{name_str}.",
            channel.id.mention()
        ),
    )
    .await
}

/// Remove a single trigger channel.
#[poise::command(slash_command, required_permissions = "ADMINISTRATOR")]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "The trigger channel to remove"]
    #[channel_types("Voice")]
    channel: serenity::GuildChannel,
) -> Result<()> {
    let guild_id = ctx.guild_id().ok_or_else(|| anyhow!("guild only"))?;

    if ctx
        .data()
        .repository
        .delete_trigger(guild_id, channel.id)
        .await?
    {
        reply_embed(
            &ctx,
            format!("🗑️ Trigger channel {} has been removed.", channel.id.mention()),
        )
        .await
    } else {
        reply_embed(
            &ctx,
            format!(
                "⚠️ {} is not set up as a trigger channel.",
                channel.id.mention()
            ),
        )
        .await
    }
}

/// List all trigger channels in this server.
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<()> {
    let guild_id = ctx.guild_id().ok_or_else(|| anyhow!("guild only"))?;
    let triggers = ctx.data().repository.list_triggers(guild_id).await?;

    if triggers.is_empty() {
        return reply_embed(&ctx, "⚠️ No trigger channels are set up in this server.").await;
    }

    let lines: Vec<String> = triggers
        .iter()
        .enumerate()
        .map(|(index, trigger)| {
            let limit = trigger
                .user_limit
                .map_or_else(|| String::from("unlimited"), |l| l.to_string());
            let name = trigger.name.as_deref().unwrap_or("N/A");
            format!(
                "{}. {} - Limit: `{limit}` - Name: `{name}`",
                index + 1,
                trigger.channel_id.mention()
            )
        })
        .collect();

    ctx.send(
        CreateReply::default().ephemeral(true).embed(
            CreateEmbed::new()
                .colour(Colour::BLURPLE)
                .title("🌍 Trigger Channels")
                .description(lines.join("\n"))
                .footer(CreateEmbedFooter::new(format!(
                    "Total: {} trigger channel(s)",
                    triggers.len()
                ))),
        ),
    )
    .await?;
    Ok(())
}

/// Disable the hub by removing every trigger channel in this server.
#[poise::command(slash_command, required_permissions = "ADMINISTRATOR")]
pub async fn disable(ctx: Context<'_>) -> Result<()> {
    let guild_id = ctx.guild_id().ok_or_else(|| anyhow!("guild only"))?;
    let removed = ctx.data().repository.delete_all_triggers(guild_id).await?;

    if removed == 0 {
        reply_embed(&ctx, "⚠️ No voice channel creation systems are set up.").await
    } else {
        reply_embed(
            &ctx,
            format!("🌍 All voice channel creation systems ({removed}) have been disabled."),
        )
        .await
    }
}

/// Rename the temporary voice channel you own.
#[poise::command(slash_command)]
pub async fn rename(
    ctx: Context<'_>,
    #[description = "The new name of the voice channel"] name: String,
) -> Result<()> {
    let guild_id = ctx.guild_id().ok_or_else(|| anyhow!("guild only"))?;
    let provider = SerenityChannelProvider::new(ctx.serenity_context().clone());

    match ctx
        .data()
        .lifecycle
        .rename_owned(&provider, guild_id, ctx.author().id, &name)
        .await
    {
        Ok(RenameOutcome::Renamed) => {
            reply_embed(&ctx, format!("✅ The voice channel has been renamed to `{name}`.")).await
        }
        Ok(RenameOutcome::NotOwner) => {
            reply_embed(&ctx, "⚠️ You don't own a voice channel.").await
        }
        Err(err) => {
            warn!(user_id = %ctx.author().id, "rename rejected: {err}");
            reply_embed(&ctx, "⚠️ An error occurred while renaming the voice channel.").await
        }
    }
}
