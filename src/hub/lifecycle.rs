use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use tokio::task::JoinHandle;

use crate::hub::repository::HubRepository;
use crate::hub::{OwnedChannel, VoiceTransition};
use crate::provider::{ChannelProvider, NewVoiceChannel};

/// What became of a member-initiated rename request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    /// The caller owns no temporary channel in this guild.
    NotOwner,
}

/// Drives the per-channel state machine
/// `NONEXISTENT -> CREATED(owner) -> [OWNED | TRANSFERRED(new)]* -> DESTROYED`
/// from raw voice-presence transitions.
///
/// The persisted store is the serialization point: departure handling claims
/// the ownership record atomically before anything else happens, so duplicate
/// or racing deliveries of the same transition collapse into no-ops.
pub struct LifecycleManager {
    repository: Arc<dyn HubRepository>,
    settle_delay: Duration,
    channel_suffix: String,
    /// Pending settle rechecks keyed by channel id. Scheduling a new recheck
    /// for a channel aborts the one already in flight.
    pending: DashMap<ChannelId, JoinHandle<()>>,
}

impl LifecycleManager {
    pub fn new(
        repository: Arc<dyn HubRepository>,
        settle_delay: Duration,
        channel_suffix: String,
    ) -> Self {
        Self {
            repository,
            settle_delay,
            channel_suffix,
            pending: DashMap::new(),
        }
    }

    /// Process one raw presence change. Departure and arrival are independent,
    /// idempotent decisions; departure runs first so that a move from one
    /// trigger channel to another releases the old channel before the arrival
    /// check asks "does this member already own one". A failure in either leg
    /// is logged and does not abort the other.
    pub async fn handle_transition(
        self: &Arc<Self>,
        provider: Arc<dyn ChannelProvider>,
        transition: VoiceTransition,
    ) {
        if transition.old_channel == transition.new_channel {
            return;
        }

        if let Err(err) = self.handle_departure(&provider, &transition).await {
            tracing::error!(
                user_id = %transition.user_id,
                "departure handling failed: {err:#}"
            );
        }
        if let Err(err) = self.handle_arrival(provider.as_ref(), &transition).await {
            tracing::error!(
                user_id = %transition.user_id,
                "arrival handling failed: {err:#}"
            );
        }
    }

    /// The member left `old_channel` (to nowhere or to another channel). If it
    /// was a temp channel, claim its ownership record eagerly and schedule the
    /// delayed occupancy recheck. The eager claim frees the member to trigger
    /// a new channel before cleanup of the old one completes.
    pub async fn handle_departure(
        self: &Arc<Self>,
        provider: &Arc<dyn ChannelProvider>,
        transition: &VoiceTransition,
    ) -> Result<()> {
        let Some(old_channel) = transition.old_channel else {
            return Ok(());
        };
        if transition.new_channel == Some(old_channel) {
            return Ok(());
        }

        // Absent means not a temp channel, or a duplicate delivery already
        // claimed it.
        let Some(owned) = self.repository.take_owned_by_channel(old_channel).await? else {
            return Ok(());
        };

        tracing::debug!(
            channel_id = %owned.channel_id,
            owner_id = %owned.owner_id,
            "owner departed, scheduling settle recheck"
        );
        self.schedule_settle_check(Arc::clone(provider), owned);
        Ok(())
    }

    /// The member entered `new_channel`. If it is a trigger channel and the
    /// member does not already own a temp channel in this guild, spawn one and
    /// move them in.
    pub async fn handle_arrival(
        &self,
        provider: &dyn ChannelProvider,
        transition: &VoiceTransition,
    ) -> Result<()> {
        let Some(new_channel) = transition.new_channel else {
            return Ok(());
        };
        if transition.old_channel == Some(new_channel) {
            return Ok(());
        }

        let Some(trigger) = self
            .repository
            .find_trigger(transition.guild_id, new_channel)
            .await?
        else {
            return Ok(());
        };

        if self
            .repository
            .find_owned_by_member(transition.guild_id, transition.user_id)
            .await?
            .is_some()
        {
            tracing::debug!(
                user_id = %transition.user_id,
                "member already owns a channel, ignoring trigger join"
            );
            return Ok(());
        }

        let name = match &trigger.name {
            Some(name) => name.clone(),
            None => {
                let display_name = provider
                    .member_display_name(transition.guild_id, transition.user_id)
                    .await?;
                format!("{display_name}{}", self.channel_suffix)
            }
        };

        let channel_id = provider
            .create_voice_channel(
                transition.guild_id,
                &NewVoiceChannel {
                    name,
                    category_id: trigger.category_id,
                    user_limit: trigger.user_limit,
                },
            )
            .await?;

        self.repository
            .insert_owned(&OwnedChannel {
                guild_id: transition.guild_id,
                channel_id,
                owner_id: transition.user_id,
            })
            .await?;

        // Best-effort: the channel and its ownership record persist even if
        // the member cannot be moved in.
        if let Err(err) = provider
            .move_member(transition.guild_id, transition.user_id, channel_id)
            .await
        {
            tracing::warn!(
                channel_id = %channel_id,
                user_id = %transition.user_id,
                "failed to move member into new channel: {err:#}"
            );
        }

        tracing::info!(
            channel_id = %channel_id,
            owner_id = %transition.user_id,
            "created temporary channel"
        );
        Ok(())
    }

    /// Rename the channel the member owns in this guild. A provider rejection
    /// (invalid name, channel gone) propagates as the error so callers can
    /// surface it to the user.
    pub async fn rename_owned(
        &self,
        provider: &dyn ChannelProvider,
        guild_id: GuildId,
        user_id: UserId,
        name: &str,
    ) -> Result<RenameOutcome> {
        let Some(owned) = self
            .repository
            .find_owned_by_member(guild_id, user_id)
            .await?
        else {
            return Ok(RenameOutcome::NotOwner);
        };

        provider.rename_channel(owned.channel_id, name).await?;
        tracing::info!(
            channel_id = %owned.channel_id,
            owner_id = %user_id,
            "renamed temporary channel"
        );
        Ok(RenameOutcome::Renamed)
    }

    /// Wait out the settle delay, then either destroy the now-empty channel or
    /// transfer ownership to the first remaining member. Keyed per channel so
    /// a newer departure replaces an in-flight recheck instead of racing it.
    fn schedule_settle_check(
        self: &Arc<Self>,
        provider: Arc<dyn ChannelProvider>,
        owned: OwnedChannel,
    ) {
        let manager = Arc::clone(self);
        let channel_id = owned.channel_id;
        let task = tokio::spawn(async move {
            tokio::time::sleep(manager.settle_delay).await;
            // Only an un-aborted task reaches this point, so the entry it
            // removes is its own.
            manager.pending.remove(&channel_id);
            if let Err(err) = manager.settle_check(provider.as_ref(), &owned).await {
                tracing::warn!(
                    channel_id = %channel_id,
                    "settle recheck failed: {err:#}"
                );
            }
        });
        if let Some(previous) = self.pending.insert(channel_id, task) {
            previous.abort();
        }
    }

    async fn settle_check(
        &self,
        provider: &dyn ChannelProvider,
        owned: &OwnedChannel,
    ) -> Result<()> {
        let members = match provider
            .channel_members(owned.guild_id, owned.channel_id)
            .await?
        {
            // Deleted concurrently by another path; nothing left to do.
            None => return Ok(()),
            Some(members) => members,
        };

        let Some(&successor) = members.first() else {
            if let Err(err) = provider.delete_channel(owned.channel_id).await {
                tracing::debug!(
                    channel_id = %owned.channel_id,
                    "could not delete empty channel (already gone?): {err:#}"
                );
            } else {
                tracing::info!(channel_id = %owned.channel_id, "destroyed empty temporary channel");
            }
            return Ok(());
        };

        // Ownership transfer, not a new channel: re-point the record at the
        // first remaining occupant and rename to match.
        self.repository
            .insert_owned(&OwnedChannel {
                owner_id: successor,
                ..owned.clone()
            })
            .await?;

        match provider
            .member_display_name(owned.guild_id, successor)
            .await
            .map(|name| format!("{name}{}", self.channel_suffix))
        {
            Ok(name) => {
                // A failed rename does not undo the transfer record.
                if let Err(err) = provider.rename_channel(owned.channel_id, &name).await {
                    tracing::warn!(
                        channel_id = %owned.channel_id,
                        "failed to rename transferred channel: {err:#}"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    channel_id = %owned.channel_id,
                    "could not resolve successor display name: {err:#}"
                );
            }
        }

        tracing::info!(
            channel_id = %owned.channel_id,
            new_owner_id = %successor,
            "transferred channel ownership"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::hub::test_utils::MockHubRepository;
    use crate::hub::TriggerChannel;

    const SETTLE: Duration = Duration::from_secs(2);

    struct MockChannel {
        name: String,
        category_id: Option<ChannelId>,
        user_limit: Option<u32>,
        members: Vec<UserId>,
    }

    struct MockChannelProvider {
        channels: Mutex<HashMap<ChannelId, MockChannel>>,
        deleted: Mutex<Vec<ChannelId>>,
        moves: Mutex<Vec<(UserId, ChannelId)>>,
        display_names: Mutex<HashMap<UserId, String>>,
        next_id: AtomicU64,
        fail_moves: AtomicBool,
        fail_renames: AtomicBool,
    }

    impl MockChannelProvider {
        fn new() -> Self {
            Self {
                channels: Mutex::new(HashMap::new()),
                deleted: Mutex::new(Vec::new()),
                moves: Mutex::new(Vec::new()),
                display_names: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(9000),
                fail_moves: AtomicBool::new(false),
                fail_renames: AtomicBool::new(false),
            }
        }

        async fn add_channel(&self, channel_id: ChannelId, members: Vec<UserId>) {
            self.channels.lock().await.insert(
                channel_id,
                MockChannel {
                    name: String::from("existing"),
                    category_id: None,
                    user_limit: None,
                    members,
                },
            );
        }

        async fn set_members(&self, channel_id: ChannelId, members: Vec<UserId>) {
            self.channels
                .lock()
                .await
                .get_mut(&channel_id)
                .unwrap()
                .members = members;
        }

        async fn channel_name(&self, channel_id: ChannelId) -> String {
            self.channels.lock().await[&channel_id].name.clone()
        }

        async fn has_channel(&self, channel_id: ChannelId) -> bool {
            self.channels.lock().await.contains_key(&channel_id)
        }

        async fn deleted_channels(&self) -> Vec<ChannelId> {
            self.deleted.lock().await.clone()
        }
    }

    #[async_trait]
    impl ChannelProvider for MockChannelProvider {
        async fn create_voice_channel(
            &self,
            _guild_id: GuildId,
            channel: &NewVoiceChannel,
        ) -> anyhow::Result<ChannelId> {
            let channel_id = ChannelId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.channels.lock().await.insert(
                channel_id,
                MockChannel {
                    name: channel.name.clone(),
                    category_id: channel.category_id,
                    user_limit: channel.user_limit,
                    members: Vec::new(),
                },
            );
            Ok(channel_id)
        }

        async fn delete_channel(&self, channel_id: ChannelId) -> anyhow::Result<()> {
            if self.channels.lock().await.remove(&channel_id).is_none() {
                return Err(anyhow!("channel {channel_id} does not exist"));
            }
            self.deleted.lock().await.push(channel_id);
            Ok(())
        }

        async fn rename_channel(&self, channel_id: ChannelId, name: &str) -> anyhow::Result<()> {
            if self.fail_renames.load(Ordering::SeqCst) {
                return Err(anyhow!("rename rejected"));
            }
            let mut channels = self.channels.lock().await;
            let channel = channels
                .get_mut(&channel_id)
                .ok_or_else(|| anyhow!("channel {channel_id} does not exist"))?;
            channel.name = name.to_string();
            Ok(())
        }

        async fn move_member(
            &self,
            _guild_id: GuildId,
            user_id: UserId,
            channel_id: ChannelId,
        ) -> anyhow::Result<()> {
            if self.fail_moves.load(Ordering::SeqCst) {
                return Err(anyhow!("move rejected"));
            }
            let mut channels = self.channels.lock().await;
            for channel in channels.values_mut() {
                channel.members.retain(|id| *id != user_id);
            }
            channels
                .get_mut(&channel_id)
                .ok_or_else(|| anyhow!("channel {channel_id} does not exist"))?
                .members
                .push(user_id);
            self.moves.lock().await.push((user_id, channel_id));
            Ok(())
        }

        async fn channel_members(
            &self,
            _guild_id: GuildId,
            channel_id: ChannelId,
        ) -> anyhow::Result<Option<Vec<UserId>>> {
            Ok(self.channels.lock().await.get(&channel_id).map(|channel| {
                let mut members = channel.members.clone();
                members.sort_unstable();
                members
            }))
        }

        async fn member_display_name(
            &self,
            _guild_id: GuildId,
            user_id: UserId,
        ) -> anyhow::Result<String> {
            Ok(self
                .display_names
                .lock()
                .await
                .get(&user_id)
                .cloned()
                .unwrap_or_else(|| format!("member-{user_id}")))
        }
    }

    const GUILD: GuildId = GuildId::new(1);
    const TRIGGER: ChannelId = ChannelId::new(10);
    const CATEGORY: ChannelId = ChannelId::new(20);

    struct TestContext {
        repository: Arc<MockHubRepository>,
        provider: Arc<MockChannelProvider>,
        manager: Arc<LifecycleManager>,
    }

    impl TestContext {
        fn new() -> Self {
            let repository = Arc::new(MockHubRepository::new());
            let provider = Arc::new(MockChannelProvider::new());
            let manager = Arc::new(LifecycleManager::new(
                repository.clone(),
                SETTLE,
                "'s Channel".to_string(),
            ));
            Self {
                repository,
                provider,
                manager,
            }
        }

        async fn with_trigger(self, user_limit: Option<u32>, name: Option<&str>) -> Self {
            self.repository
                .insert_trigger(&TriggerChannel {
                    guild_id: GUILD,
                    channel_id: TRIGGER,
                    category_id: Some(CATEGORY),
                    user_limit,
                    name: name.map(str::to_string),
                })
                .await
                .unwrap();
            self
        }

        async fn with_owned(self, channel: u64, owner: u64, members: &[u64]) -> Self {
            let channel_id = ChannelId::new(channel);
            self.repository
                .insert_owned(&OwnedChannel {
                    guild_id: GUILD,
                    channel_id,
                    owner_id: UserId::new(owner),
                })
                .await
                .unwrap();
            self.provider
                .add_channel(channel_id, members.iter().copied().map(UserId::new).collect())
                .await;
            self
        }

        async fn with_display_name(self, user: u64, name: &str) -> Self {
            self.provider
                .display_names
                .lock()
                .await
                .insert(UserId::new(user), name.to_string());
            self
        }

        async fn transition(&self, user: u64, old: Option<u64>, new: Option<u64>) {
            let provider: Arc<dyn ChannelProvider> = self.provider.clone();
            self.manager
                .handle_transition(
                    provider,
                    VoiceTransition {
                        guild_id: GUILD,
                        user_id: UserId::new(user),
                        old_channel: old.map(ChannelId::new),
                        new_channel: new.map(ChannelId::new),
                    },
                )
                .await;
        }

        /// Advance paused time past the settle delay so scheduled rechecks run.
        async fn settle(&self) {
            tokio::time::sleep(SETTLE + Duration::from_millis(50)).await;
        }

        async fn owned_by(&self, user: u64) -> Option<OwnedChannel> {
            self.repository
                .find_owned_by_member(GUILD, UserId::new(user))
                .await
                .unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn joining_trigger_spawns_owned_channel() {
        let ctx = TestContext::new()
            .with_trigger(Some(5), None)
            .await
            .with_display_name(1, "A")
            .await;

        ctx.transition(1, None, Some(TRIGGER.get())).await;

        let owned = ctx.owned_by(1).await.expect("ownership record created");
        let channels = ctx.provider.channels.lock().await;
        let channel = &channels[&owned.channel_id];
        assert_eq!(channel.name, "A's Channel");
        assert_eq!(channel.category_id, Some(CATEGORY));
        assert_eq!(channel.user_limit, Some(5));
        assert_eq!(channel.members, vec![UserId::new(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_custom_name_overrides_display_name() {
        let ctx = TestContext::new().with_trigger(None, Some("Hangout")).await;

        ctx.transition(1, None, Some(TRIGGER.get())).await;

        let owned = ctx.owned_by(1).await.unwrap();
        assert_eq!(ctx.provider.channel_name(owned.channel_id).await, "Hangout");
    }

    #[tokio::test(start_paused = true)]
    async fn owner_rejoining_trigger_gets_no_second_channel() {
        let ctx = TestContext::new()
            .with_trigger(None, None)
            .await
            .with_owned(100, 1, &[1])
            .await;

        ctx.transition(1, None, Some(TRIGGER.get())).await;

        let owned = ctx.owned_by(1).await.unwrap();
        assert_eq!(owned.channel_id, ChannelId::new(100));
        assert_eq!(ctx.provider.channels.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn joining_ordinary_channel_is_ignored() {
        let ctx = TestContext::new().with_trigger(None, None).await;

        ctx.transition(1, None, Some(555)).await;

        assert!(ctx.owned_by(1).await.is_none());
        assert!(ctx.provider.channels.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_channel_is_destroyed_after_settle_delay() {
        let ctx = TestContext::new().with_owned(100, 1, &[]).await;

        ctx.transition(1, Some(100), None).await;

        // Record visibility goes first: the claim happens eagerly, before the
        // delayed occupancy check, while the channel still exists.
        assert!(ctx.owned_by(1).await.is_none());
        assert!(ctx.provider.has_channel(ChannelId::new(100)).await);

        ctx.settle().await;
        assert_eq!(ctx.provider.deleted_channels().await, vec![ChannelId::new(100)]);
    }

    #[tokio::test(start_paused = true)]
    async fn occupied_channel_transfers_to_first_remaining_member() {
        let ctx = TestContext::new()
            .with_owned(100, 1, &[1, 2])
            .await
            .with_display_name(2, "B")
            .await;

        ctx.transition(1, Some(100), None).await;
        ctx.provider
            .set_members(ChannelId::new(100), vec![UserId::new(2)])
            .await;
        ctx.settle().await;

        assert!(ctx.owned_by(1).await.is_none());
        let owned = ctx.owned_by(2).await.expect("ownership transferred");
        assert_eq!(owned.channel_id, ChannelId::new(100));
        assert_eq!(ctx.provider.channel_name(ChannelId::new(100)).await, "B's Channel");
        assert!(ctx.provider.deleted_channels().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_departure_delivery_is_a_noop() {
        let ctx = TestContext::new().with_owned(100, 1, &[]).await;

        ctx.transition(1, Some(100), None).await;
        ctx.transition(1, Some(100), None).await;
        ctx.settle().await;

        assert_eq!(ctx.provider.deleted_channels().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn departed_channel_vanishing_before_recheck_is_a_noop() {
        let ctx = TestContext::new().with_owned(100, 1, &[]).await;

        ctx.transition(1, Some(100), None).await;
        ctx.provider.channels.lock().await.remove(&ChannelId::new(100));
        ctx.settle().await;

        assert!(ctx.provider.deleted_channels().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn move_between_triggers_releases_old_channel_first() {
        let second_trigger = ChannelId::new(11);
        let ctx = TestContext::new().with_trigger(None, None).await;
        ctx.repository
            .insert_trigger(&TriggerChannel {
                guild_id: GUILD,
                channel_id: second_trigger,
                category_id: None,
                user_limit: None,
                name: None,
            })
            .await
            .unwrap();

        ctx.transition(1, None, Some(TRIGGER.get())).await;
        let first = ctx.owned_by(1).await.unwrap();

        // Owner moves straight from their temp channel into the other trigger.
        ctx.provider.set_members(first.channel_id, vec![]).await;
        ctx.transition(1, Some(first.channel_id.get()), Some(second_trigger.get()))
            .await;

        let second = ctx.owned_by(1).await.expect("new channel spawned");
        assert_ne!(second.channel_id, first.channel_id);

        ctx.settle().await;
        assert_eq!(ctx.provider.deleted_channels().await, vec![first.channel_id]);
    }

    #[tokio::test]
    async fn owner_can_rename_their_channel() {
        let ctx = TestContext::new().with_owned(100, 1, &[1]).await;

        let outcome = ctx
            .manager
            .rename_owned(ctx.provider.as_ref(), GUILD, UserId::new(1), "War Room")
            .await
            .unwrap();

        assert_eq!(outcome, RenameOutcome::Renamed);
        assert_eq!(ctx.provider.channel_name(ChannelId::new(100)).await, "War Room");
    }

    #[tokio::test]
    async fn rename_without_owned_channel_is_refused() {
        let ctx = TestContext::new().with_owned(100, 1, &[1]).await;

        let outcome = ctx
            .manager
            .rename_owned(ctx.provider.as_ref(), GUILD, UserId::new(2), "War Room")
            .await
            .unwrap();

        assert_eq!(outcome, RenameOutcome::NotOwner);
        assert_eq!(ctx.provider.channel_name(ChannelId::new(100)).await, "existing");
    }

    #[tokio::test]
    async fn rejected_rename_surfaces_error() {
        let ctx = TestContext::new().with_owned(100, 1, &[1]).await;
        ctx.provider.fail_renames.store(true, Ordering::SeqCst);

        let result = ctx
            .manager
            .rename_owned(ctx.provider.as_ref(), GUILD, UserId::new(1), "War Room")
            .await;

        assert!(result.is_err());
        assert_eq!(ctx.provider.channel_name(ChannelId::new(100)).await, "existing");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_move_keeps_channel_and_record() {
        let ctx = TestContext::new().with_trigger(None, None).await;
        ctx.provider.fail_moves.store(true, Ordering::SeqCst);

        ctx.transition(1, None, Some(TRIGGER.get())).await;

        let owned = ctx.owned_by(1).await.expect("record persists");
        assert!(ctx.provider.has_channel(owned.channel_id).await);
        assert!(ctx.provider.moves.lock().await.is_empty());
    }
}
