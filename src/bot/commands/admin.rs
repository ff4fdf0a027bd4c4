use crate::bot::{Context, Error};
use crate::database::models::Role;
use crate::utils::format::{format_error_message, format_success_message};
use poise::serenity_prelude as serenity;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum RoleChoice {
    #[name = "employee"]
    Employee,
    #[name = "manager"]
    Manager,
}

impl From<RoleChoice> for Role {
    fn from(choice: RoleChoice) -> Self {
        match choice {
            RoleChoice::Employee => Role::Employee,
            RoleChoice::Manager => Role::Manager,
        }
    }
}

/// Holders of ADMIN_ROLE_ID may manage users. Without that setting, managers may.
async fn is_admin(ctx: Context<'_>) -> Result<bool, Error> {
    if let Some(role_id) = &ctx.data().config.admin_role_id {
        let role_id = serenity::RoleId::new(role_id.parse()?);
        let Some(member) = ctx.author_member().await else {
            return Ok(false);
        };
        return Ok(member.roles.contains(&role_id));
    }

    let user = ctx.data().resolve_user(ctx.author()).await?;
    Ok(user.role == Role::Manager)
}

async fn deny(ctx: Context<'_>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(format_error_message("この操作を行う権限がありません"))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// ユーザーの役割を変更します（管理者用）
#[poise::command(slash_command)]
pub async fn set_role(
    ctx: Context<'_>,
    #[description = "対象ユーザー"] member: serenity::User,
    #[description = "役割"] role: RoleChoice,
) -> Result<(), Error> {
    if !is_admin(ctx).await? {
        return deny(ctx).await;
    }

    let target = ctx.data().resolve_user(&member).await?;
    let updated = ctx.data().planner.set_role(target.id, role.into()).await?;
    tracing::info!(user_id = updated.id, role = updated.role.as_str(), "Role changed");

    ctx.send(
        poise::CreateReply::default()
            .content(format_success_message(&format!(
                "{} さんの役割を {} に変更しました",
                updated.display_name(),
                updated.role.as_str()
            )))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// ユーザーを有効化・無効化します（管理者用）
#[poise::command(slash_command)]
pub async fn set_active(
    ctx: Context<'_>,
    #[description = "対象ユーザー"] member: serenity::User,
    #[description = "有効にするか"] active: bool,
) -> Result<(), Error> {
    if !is_admin(ctx).await? {
        return deny(ctx).await;
    }

    let target = ctx.data().resolve_user(&member).await?;
    let updated = ctx.data().planner.set_active(target.id, active).await?;
    tracing::info!(user_id = updated.id, active, "Activity changed");

    let state = if updated.is_active { "有効" } else { "無効" };
    ctx.send(
        poise::CreateReply::default()
            .content(format_success_message(&format!(
                "{} さんを{}にしました",
                updated.display_name(),
                state
            )))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
