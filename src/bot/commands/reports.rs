use crate::bot::{Context, Error, run_command};
use crate::dialog::Command;

/// イベントを登録して参加者にリマインダーを送ります（マネージャー用）
#[poise::command(slash_command)]
pub async fn event(ctx: Context<'_>) -> Result<(), Error> {
    run_command(ctx, Command::Event).await
}

/// 期間を指定して勤務記録を出力します（マネージャー用）
#[poise::command(slash_command)]
pub async fn export(ctx: Context<'_>) -> Result<(), Error> {
    run_command(ctx, Command::Export).await
}
