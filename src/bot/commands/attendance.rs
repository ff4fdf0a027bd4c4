use crate::bot::{Context, Error, run_command, send_reply};
use crate::dialog::Command;

/// 出勤を記録します（位置情報を指定するとすぐに記録します）
#[poise::command(slash_command)]
pub async fn checkin(
    ctx: Context<'_>,
    #[description = "現在地の緯度"] latitude: Option<f64>,
    #[description = "現在地の経度"] longitude: Option<f64>,
) -> Result<(), Error> {
    let data = ctx.data();
    let user = data.resolve_user(ctx.author()).await?;

    let reply = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => data.dialog.check_in_at(user.id, latitude, longitude).await,
        _ => data.dialog.on_command(user.id, Command::CheckIn).await,
    };

    send_reply(ctx, reply).await
}

/// 退勤を記録します
#[poise::command(slash_command)]
pub async fn checkout(ctx: Context<'_>) -> Result<(), Error> {
    run_command(ctx, Command::CheckOut).await
}

/// 欠勤・遅刻を連絡します
#[poise::command(slash_command)]
pub async fn absent(ctx: Context<'_>) -> Result<(), Error> {
    run_command(ctx, Command::Absent).await
}
