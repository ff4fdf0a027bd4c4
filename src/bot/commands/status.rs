use crate::bot::{Context, Error};
use crate::dialog::Command;
use poise::serenity_prelude as serenity;

/// 今日の勤務状況を確認します
#[poise::command(slash_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let user = ctx.data().resolve_user(ctx.author()).await?;
    let reply = ctx.data().dialog.on_command(user.id, Command::Status).await;

    let embed = serenity::CreateEmbed::new()
        .title(format!("📊 {} の勤務状況", user.display_name()))
        .description(reply.text)
        .color(0x00ff00);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
