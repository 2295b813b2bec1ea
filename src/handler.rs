use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use poise::serenity_prelude as serenity;
use tracing::info;

use crate::hub::lifecycle::LifecycleManager;
use crate::hub::repository::HubRepository;
use crate::hub::VoiceTransition;
use crate::provider::discord::SerenityChannelProvider;
use crate::provider::ChannelProvider;

pub struct Data {
    pub repository: Arc<dyn HubRepository>,
    pub lifecycle: Arc<LifecycleManager>,
    pub sounds_dir: PathBuf,
    /// Set on Ready; read by the health endpoint.
    pub bot_name: Arc<OnceLock<String>>,
}

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, anyhow::Error>,
    data: &Data,
) -> Result<(), anyhow::Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!("Ready: {}", data_about_bot.user.name);
            let _ = data.bot_name.set(data_about_bot.user.name.clone());
        }

        serenity::FullEvent::VoiceStateUpdate { old, new } => {
            if new.user_id == ctx.cache.current_user().id {
                return Ok(());
            }
            let Some(guild_id) = new.guild_id else {
                return Ok(());
            };

            let transition = VoiceTransition {
                guild_id,
                user_id: new.user_id,
                old_channel: old.as_ref().and_then(|state| state.channel_id),
                new_channel: new.channel_id,
            };

            let provider: Arc<dyn ChannelProvider> =
                Arc::new(SerenityChannelProvider::new(ctx.clone()));
            // Lifecycle failures are logged inside; nothing propagates to the
            // dispatcher.
            data.lifecycle.handle_transition(provider, transition).await;
        }

        _ => {}
    }
    Ok(())
}
