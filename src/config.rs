use anyhow::anyhow;
use config::Config;
use serde::Deserialize;

pub fn load_config(path: &str) -> anyhow::Result<AppConfig> {
    let config = Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("HUBBOT").separator("_"))
        .build()?;

    config.try_deserialize().map_err(|e| anyhow!(e))
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub prank: PrankConfig,
}

impl AppConfig {
    pub fn verify(&self) -> anyhow::Result<()> {
        if self.bot.token.is_empty() {
            return Err(anyhow!("bot token is empty"));
        }

        if self.hub.settle_delay_secs == 0 {
            return Err(anyhow!(
                "hub.settle_delay_secs must be at least 1; the recheck needs time for the \
                 provider's membership view to catch up"
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub enum DatabaseKind {
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "sqlite")]
    SQLite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub kind: DatabaseKind,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Seconds to wait after a departure before rechecking occupancy.
    pub settle_delay_secs: u64,
    /// Appended to the owner's display name when a trigger has no custom name.
    pub channel_suffix: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 3,
            channel_suffix: String::from("'s Channel"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrankConfig {
    pub sounds_dir: String,
}

impl Default for PrankConfig {
    fn default() -> Self {
        Self {
            sounds_dir: String::from("sounds"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            bot: BotConfig {
                token: String::from("token"),
            },
            database: DatabaseConfig {
                kind: DatabaseKind::SQLite,
                url: String::from("sqlite::memory:"),
            },
            hub: HubConfig::default(),
            health: HealthConfig::default(),
            prank: PrankConfig::default(),
        }
    }

    #[test]
    fn default_config_verifies() {
        assert!(base_config().verify().is_ok());
    }

    #[test]
    fn empty_token_is_rejected() {
        let mut config = base_config();
        config.bot.token.clear();
        assert!(config.verify().is_err());
    }

    #[test]
    fn zero_settle_delay_is_rejected() {
        let mut config = base_config();
        config.hub.settle_delay_secs = 0;
        assert!(config.verify().is_err());
    }
}
