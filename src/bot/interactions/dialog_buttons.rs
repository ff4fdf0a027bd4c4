use crate::bot::{Data, Error};
use crate::dialog::{Button, CANCEL_TOKEN, CONFIRM_CHECKOUT_TOKEN, Inbound};
use crate::utils::format::format_error_message;
use poise::serenity_prelude as serenity;

/// Discord allows at most five buttons per row.
const BUTTONS_PER_ROW: usize = 5;

pub fn action_rows(buttons: &[Button]) -> Vec<serenity::CreateActionRow> {
    buttons
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            serenity::CreateActionRow::Buttons(
                row.iter()
                    .map(|b| {
                        serenity::CreateButton::new(&b.token)
                            .label(&b.label)
                            .style(button_style(&b.token))
                    })
                    .collect(),
            )
        })
        .collect()
}

fn button_style(token: &str) -> serenity::ButtonStyle {
    match token {
        CANCEL_TOKEN => serenity::ButtonStyle::Secondary,
        CONFIRM_CHECKOUT_TOKEN => serenity::ButtonStyle::Danger,
        _ => serenity::ButtonStyle::Primary,
    }
}

/// Button presses become callback tokens for the dialog.
pub async fn handle_component(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let reply = match data.resolve_user(&interaction.user).await {
        Ok(user) => {
            let token = interaction.data.custom_id.clone();
            data.dialog
                .on_conversation_event(user.id, Inbound::Callback(token))
                .await
        }
        Err(e) => {
            tracing::error!("Failed to resolve user for interaction: {:#}", e);
            crate::dialog::Reply::text(format_error_message("ユーザー情報の取得に失敗しました"))
        }
    };

    interaction
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(reply.text)
                    .components(action_rows(&reply.buttons))
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

/// Free text sent to the bot in a DM answers the current dialog step.
pub async fn handle_direct_message(
    ctx: &serenity::Context,
    message: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    let user = data.resolve_user(&message.author).await?;
    let reply = data
        .dialog
        .on_conversation_event(user.id, Inbound::Text(message.content.clone()))
        .await;

    message
        .channel_id
        .send_message(
            &ctx.http,
            serenity::CreateMessage::new()
                .content(reply.text)
                .components(action_rows(&reply.buttons)),
        )
        .await?;

    Ok(())
}
