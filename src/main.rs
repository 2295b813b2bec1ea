use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::GatewayIntents;
use songbird::SerenityInit;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vc_hub_rs::cli::{Cli, Commands, MigrateCommand};
use vc_hub_rs::command;
use vc_hub_rs::config::{load_config, AppConfig};
use vc_hub_rs::database::WrappedPool;
use vc_hub_rs::handler::{event_handler, Data};
use vc_hub_rs::health::{self, HealthState};
use vc_hub_rs::hub::lifecycle::LifecycleManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = load_config("config.toml").context("Failed to load config.toml")?;

    config.verify()?;

    info!("Loaded config");

    let pool = WrappedPool::connect(&config.database).await?;

    match cli.command {
        Commands::Run { auto_migrate } => {
            if auto_migrate {
                pool.migrate_up().await?;
            }
            run(config, pool).await
        }
        Commands::Migrate { command } => match command {
            MigrateCommand::Up => {
                pool.migrate_up().await?;
                info!("Migrations applied");
                Ok(())
            }
            MigrateCommand::Status => {
                for (migration, applied) in pool.migrate_status().await? {
                    let marker = if applied { "applied" } else { "pending" };
                    println!("{:>14} {} {}", migration.version, marker, migration.description);
                }
                Ok(())
            }
        },
    }
}

async fn run(config: AppConfig, pool: WrappedPool) -> anyhow::Result<()> {
    let repository = pool.hub_repository();

    let lifecycle = Arc::new(LifecycleManager::new(
        repository.clone(),
        Duration::from_secs(config.hub.settle_delay_secs),
        config.hub.channel_suffix.clone(),
    ));

    let bot_name = Arc::new(OnceLock::new());

    let health_state = HealthState {
        started_at: Instant::now(),
        bot_name: bot_name.clone(),
    };
    let health_port = config.health.port;
    tokio::spawn(async move {
        if let Err(err) = health::serve(health_state, health_port).await {
            tracing::error!("Health endpoint failed: {err:#}");
        }
    });

    let sounds_dir = PathBuf::from(&config.prank.sounds_dir);
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: command::commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |_ctx, _ready, _framework| {
            Box::pin(async move {
                Ok(Data {
                    repository,
                    lifecycle,
                    sounds_dir,
                    bot_name,
                })
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;
    let mut client = serenity::ClientBuilder::new(&config.bot.token, intents)
        .register_songbird()
        .framework(framework)
        .await?;

    client.start().await?;

    Ok(())
}
