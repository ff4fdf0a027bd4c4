pub mod commands;
pub mod handlers;
pub mod interactions;
pub mod notifier;

use crate::config::Config;
use crate::database::models::User;
use crate::database::store::UserStore;
use crate::dialog::{Command, DialogOrchestrator, Reply};
use crate::scheduler::reminders::ReminderPlanner;
use anyhow::Result;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

#[derive(Clone)]
pub struct Data {
    pub dialog: Arc<DialogOrchestrator>,
    pub planner: ReminderPlanner,
    pub users: Arc<dyn UserStore>,
    pub config: Config,
}

impl Data {
    /// Maps a Discord account to its attendance user, creating it on first contact.
    pub async fn resolve_user(&self, author: &serenity::User) -> Result<User> {
        self.users
            .create_or_get_user(
                &author.id.to_string(),
                &author.name,
                self.config.default_work_hours,
            )
            .await
    }
}

/// Runs a dialog command for the invoking user and answers ephemerally.
pub async fn run_command(ctx: Context<'_>, command: Command) -> Result<(), Error> {
    let user = ctx.data().resolve_user(ctx.author()).await?;
    let reply = ctx.data().dialog.on_command(user.id, command).await;
    send_reply(ctx, reply).await
}

pub async fn send_reply(ctx: Context<'_>, reply: Reply) -> Result<(), Error> {
    let builder = poise::CreateReply::default()
        .content(reply.text)
        .components(interactions::dialog_buttons::action_rows(&reply.buttons))
        .ephemeral(true);

    ctx.send(builder).await?;
    Ok(())
}

pub async fn create_bot(config: Config, data: Data) -> Result<serenity::Client> {
    let intents = serenity::GatewayIntents::non_privileged();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::account::start_register(),
                commands::account::workhours(),
                commands::account::cancel(),
                commands::attendance::checkin(),
                commands::attendance::checkout(),
                commands::attendance::absent(),
                commands::status::status(),
                commands::reports::event(),
                commands::reports::export(),
                commands::admin::set_role(),
                commands::admin::set_active(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(data)
            })
        })
        .build();

    let client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;

    Ok(client)
}
