use crate::bot::{Context, Error, run_command};
use crate::dialog::Command;

/// 氏名を登録します
#[poise::command(slash_command)]
pub async fn start_register(ctx: Context<'_>) -> Result<(), Error> {
    run_command(ctx, Command::Register).await
}

/// 勤務時間を変更します
#[poise::command(slash_command)]
pub async fn workhours(ctx: Context<'_>) -> Result<(), Error> {
    run_command(ctx, Command::WorkHours).await
}

/// 進行中の操作を中止します
#[poise::command(slash_command)]
pub async fn cancel(ctx: Context<'_>) -> Result<(), Error> {
    run_command(ctx, Command::Cancel).await
}
