use crate::database::models::User;
use crate::notify::Notifier;
use anyhow::{Context, Result};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Delivers notifications as direct messages.
pub struct DiscordNotifier {
    http: Arc<serenity::Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, user: &User, message: &str) -> Result<()> {
        let discord_id: u64 = user
            .discord_id
            .parse()
            .with_context(|| format!("invalid discord id {:?}", user.discord_id))?;

        let channel = serenity::UserId::new(discord_id)
            .create_dm_channel(&self.http)
            .await
            .context("failed to open DM channel")?;

        channel
            .send_message(&self.http, serenity::CreateMessage::new().content(message))
            .await
            .context("failed to send DM")?;

        tracing::debug!(user_id = user.id, "Notification delivered");
        Ok(())
    }
}
