use std::time::Duration;

use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::{Colour, CreateEmbed};
use poise::{ChoiceParameter as _, CreateReply};
use songbird::{Event, EventContext, EventHandler, TrackEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::command::{Context, Result};

/// Hard cap on how long the bot stays in the channel, even if the track end
/// event never fires.
const SAFETY_TIMEOUT: Duration = Duration::from_secs(15);
const STEALTH_DELAY: Duration = Duration::from_secs(5);

#[derive(poise::ChoiceParameter)]
pub enum PrankSound {
    #[name = "👻 Scream"]
    Scream,
    #[name = "😱 Horror Ambient"]
    Horror,
    #[name = "🔪 Jumpscare"]
    Jumpscare,
    #[name = "👹 Evil Laugh"]
    Laugh,
    #[name = "🚪 Door Creak"]
    Door,
}

impl PrankSound {
    fn file_name(&self) -> &'static str {
        match self {
            PrankSound::Scream => "scream.mp3",
            PrankSound::Horror => "horror.mp3",
            PrankSound::Jumpscare => "jumpscare.mp3",
            PrankSound::Laugh => "laugh.mp3",
            PrankSound::Door => "door.mp3",
        }
    }
}

struct PlaybackEndNotifier {
    tx: mpsc::Sender<()>,
}

#[async_trait]
impl EventHandler for PlaybackEndNotifier {
    async fn act(&self, _: &EventContext<'_>) -> Option<Event> {
        let _ = self.tx.send(()).await;
        None
    }
}

/// Play a scary sound in a voice channel.
#[poise::command(slash_command, guild_only, required_permissions = "MUTE_MEMBERS")]
pub async fn prank(
    ctx: Context<'_>,
    #[description = "The voice channel to prank"]
    #[channel_types("Voice")]
    channel: serenity::GuildChannel,
    #[description = "Choose a scary sound"] sound: PrankSound,
    #[description = "Volume level (1-100, default: 100)"]
    #[min = 1]
    #[max = 100]
    volume: Option<u8>,
    #[description = "Wait a few seconds before playing (more sneaky)"] stealth: Option<bool>,
    #[description = "Disguise the bot as this user (changes nickname temporarily)"]
    disguise: Option<serenity::User>,
) -> Result<()> {
    let guild_id = ctx.guild_id().ok_or_else(|| anyhow!("guild only"))?;

    let sound_path = ctx.data().sounds_dir.join(sound.file_name());
    if !sound_path.is_file() {
        return reply(
            &ctx,
            format!(
                "⚠️ Sound file `{}` not found in the sounds folder.",
                sound.file_name()
            ),
        )
        .await;
    }

    let occupants = channel.members(&ctx.serenity_context().cache)?;
    if occupants.is_empty() {
        return reply(&ctx, "⚠️ No one is in that voice channel!").await;
    }

    ctx.defer_ephemeral().await?;

    // Remember the bot's current nickname so the disguise can be undone.
    let mut original_nick = None;
    if let Some(user) = &disguise {
        let bot_id = ctx.serenity_context().cache.current_user().id;
        let bot_member = guild_id.member(ctx.http(), bot_id).await?;
        original_nick = bot_member.nick.clone();

        let target = guild_id.member(ctx.http(), user.id).await?;
        let disguise_name = target.display_name().to_string();
        guild_id
            .edit_nickname(ctx.http(), Some(&disguise_name))
            .await
            .context("failed to apply disguise nickname")?;
    }

    let outcome = play_and_leave(&ctx, guild_id, channel.id, &sound_path, volume, stealth).await;

    if disguise.is_some() {
        if let Err(err) = guild_id
            .edit_nickname(ctx.http(), original_nick.as_deref())
            .await
        {
            warn!("failed to restore nickname after prank: {err}");
        }
    }

    outcome?;
    reply(
        &ctx,
        format!("✅ Prank completed! 😈 Played **{}** in `{}`.", sound.name(), channel.name),
    )
    .await
}

async fn play_and_leave(
    ctx: &Context<'_>,
    guild_id: serenity::GuildId,
    channel_id: serenity::ChannelId,
    sound_path: &std::path::Path,
    volume: Option<u8>,
    stealth: Option<bool>,
) -> Result<()> {
    let manager = songbird::get(ctx.serenity_context())
        .await
        .ok_or_else(|| anyhow!("Songbird voice client not initialized"))?
        .clone();

    let call = manager
        .join(guild_id, channel_id)
        .await
        .context("failed to join voice channel")?;

    if stealth.unwrap_or(false) {
        tokio::time::sleep(STEALTH_DELAY).await;
    }

    let (tx, mut rx) = mpsc::channel(1);
    {
        let mut call = call.lock().await;
        call.add_global_event(Event::Track(TrackEvent::End), PlaybackEndNotifier { tx });

        let input = songbird::input::File::new(sound_path.to_path_buf());
        let track = call.play_input(input.into());
        let _ = track.set_volume(f32::from(volume.unwrap_or(100)) / 100.0);
    }

    // Leave as soon as playback ends, or after the safety timeout.
    let _ = tokio::time::timeout(SAFETY_TIMEOUT, rx.recv()).await;
    if let Err(err) = manager.remove(guild_id).await {
        debug!("failed to leave voice channel after prank: {err}");
    }
    Ok(())
}

async fn reply(ctx: &Context<'_>, message: impl Into<String>) -> Result<()> {
    ctx.send(
        CreateReply::default()
            .ephemeral(true)
            .embed(CreateEmbed::new().colour(Colour::BLURPLE).description(message)),
    )
    .await?;
    Ok(())
}
