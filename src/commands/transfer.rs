use super::vibe::{failure_text, identity, with_notices};
use crate::db::Identity;
use crate::render;
use crate::services::vibe::{validate_change_amount, VibeService};
use crate::session::PendingStep;
use crate::{Context, Data, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Execute a transfer and render the outcome.
pub(crate) async fn run_transfer(data: &Data, sender: Identity, recipient: Identity, amount: i64) -> String {
    let service = VibeService::new(data.db.clone());
    let (from, to) = (sender.user_id, recipient.user_id);
    match service.transfer(sender, recipient, amount).await {
        Ok(outcome) => {
            info!("User {} transferred {} vibe to user {}", from, amount, to);
            with_notices(render::transfer_reply(&outcome), &outcome.granted)
        }
        Err(e) => failure_text("Transfer", &e),
    }
}

/// Give some of your vibe to another user
#[poise::command(slash_command, guild_only)]
pub async fn transfer(
    ctx: Context<'_>,
    #[description = "How much vibe to give"] amount: Option<i64>,
    #[description = "Who receives it"] target: Option<serenity::User>,
) -> Result<(), Error> {
    let who = identity(&ctx);
    let key = (who.user_id, who.chat_id);
    let channel_id = ctx.channel_id().get();
    let sessions = &ctx.data().sessions;

    let Some(amount) = amount else {
        sessions.begin(key, channel_id, PendingStep::AwaitingTransferAmount);
        ctx.say(render::transfer_amount_prompt()).await?;
        return Ok(());
    };

    let service = VibeService::new(ctx.data().db.clone());
    let checked = match validate_change_amount(amount, i64::MAX) {
        Ok(amount) => service.ensure_balance(&who, amount).await.map(|_| amount),
        Err(e) => Err(e),
    };
    let amount = match checked {
        Ok(amount) => amount,
        Err(e) => {
            ctx.say(failure_text("Transfer", &e)).await?;
            return Ok(());
        }
    };

    match target.filter(|user| !user.bot) {
        Some(user) => {
            sessions.cancel(key);
            let recipient = Identity::new(user.id.get(), who.chat_id, user.name.clone());
            let text = run_transfer(ctx.data(), who, recipient, amount).await;
            ctx.say(text).await?;
        }
        None => {
            sessions.begin(key, channel_id, PendingStep::AwaitingTransferTarget { amount });
            ctx.say(render::transfer_target_prompt()).await?;
        }
    }
    Ok(())
}

/// Cancel a pending note or transfer
#[poise::command(slash_command)]
pub async fn cancel(ctx: Context<'_>) -> Result<(), Error> {
    let who = identity(&ctx);
    let text = match ctx.data().sessions.cancel((who.user_id, who.chat_id)) {
        Some(_) => "❌ Действие отменено.",
        None => "Нечего отменять.",
    };
    ctx.say(text).await?;
    Ok(())
}
