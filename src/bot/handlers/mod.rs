use crate::bot::interactions::dialog_buttons;
use crate::bot::{Data, Error};
use poise::serenity_prelude as serenity;

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!("Bot logged in as {}", data_about_bot.user.name);
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component_interaction),
        } => {
            if let Err(e) = dialog_buttons::handle_component(ctx, component_interaction, data).await {
                tracing::error!("Error handling component interaction: {:?}", e);
            }
        }
        serenity::FullEvent::Message { new_message }
            if new_message.guild_id.is_none() && !new_message.author.bot =>
        {
            if let Err(e) = dialog_buttons::handle_direct_message(ctx, new_message, data).await {
                tracing::error!("Error handling direct message: {:?}", e);
            }
        }
        _ => {}
    }
    Ok(())
}
