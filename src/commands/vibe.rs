use crate::db::Identity;
use crate::error::VibeError;
use crate::render;
use crate::services::vibe::{validate_change_amount, DailyOutcome, GrantNotice, VibeService};
use crate::session::PendingStep;
use crate::{chat_id_of, Context, Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

const NO_NOTE_ID: &str = "vibe_no_note";
const ADD_NOTE_ID: &str = "vibe_add_note";

pub(crate) fn identity(ctx: &Context<'_>) -> Identity {
    Identity::new(
        ctx.author().id.get(),
        chat_id_of(ctx.guild_id(), ctx.channel_id()),
        ctx.author().name.clone(),
    )
}

/// Reply text for a failed operation. Store failures are logged, never shown.
pub(crate) fn failure_text(operation: &str, err: &VibeError) -> String {
    if !err.is_rejection() {
        error!("{} failed: {}", operation, err);
    }
    render::error_reply(err)
}

pub(crate) fn with_notices(mut text: String, granted: &[GrantNotice]) -> String {
    for notice in granted {
        text.push_str("\n\n");
        text.push_str(&render::grant_notice(notice));
    }
    text
}

/// Apply a manual change and render the outcome.
pub(crate) async fn run_change(data: &Data, who: Identity, delta: i64, note: Option<String>) -> String {
    let service = VibeService::new(data.db.clone());
    let (user_id, chat_id) = (who.user_id, who.chat_id);
    match service.change_vibe(who, delta, note).await {
        Ok(outcome) => {
            info!(
                "Vibe of user {} in chat {} changed by {} to {}",
                user_id, chat_id, delta, outcome.score
            );
            with_notices(render::change_reply(&outcome), &outcome.granted)
        }
        Err(e) => failure_text("Vibe change", &e),
    }
}

/// Show the command list
#[poise::command(slash_command)]
pub async fn start(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(render::help_text()).await?;
    Ok(())
}

/// Add vibe (optionally with a note)
#[poise::command(slash_command)]
pub async fn plusvibe(
    ctx: Context<'_>,
    #[description = "How much vibe to add (default 1)"] amount: Option<i64>,
    #[description = "Optional note for the change"] note: Option<String>,
) -> Result<(), Error> {
    change(ctx, amount, note, 1).await
}

/// Take vibe away (optionally with a note)
#[poise::command(slash_command)]
pub async fn minusvibe(
    ctx: Context<'_>,
    #[description = "How much vibe to remove (default 1)"] amount: Option<i64>,
    #[description = "Optional note for the change"] note: Option<String>,
) -> Result<(), Error> {
    change(ctx, amount, note, -1).await
}

async fn change(ctx: Context<'_>, amount: Option<i64>, note: Option<String>, sign: i64) -> Result<(), Error> {
    let max = ctx.data().config.max_change_amount;
    let amount = match validate_change_amount(amount.unwrap_or(1), max) {
        Ok(amount) => amount,
        Err(e) => {
            ctx.say(render::error_reply(&e)).await?;
            return Ok(());
        }
    };
    let delta = sign * amount;
    let who = identity(&ctx);

    if note.is_some() {
        let text = run_change(ctx.data(), who, delta, note).await;
        ctx.say(text).await?;
        return Ok(());
    }

    let reply = ctx
        .send(
            poise::CreateReply::default()
                .content(render::note_prompt(delta))
                .components(vec![serenity::CreateActionRow::Buttons(vec![
                    serenity::CreateButton::new(NO_NOTE_ID)
                        .label("Без заметки")
                        .style(serenity::ButtonStyle::Secondary),
                    serenity::CreateButton::new(ADD_NOTE_ID)
                        .label("Добавить заметку")
                        .style(serenity::ButtonStyle::Primary),
                ])]),
        )
        .await?;

    let interaction = reply
        .message()
        .await?
        .await_component_interaction(ctx.serenity_context())
        .author_id(ctx.author().id)
        .timeout(ctx.data().config.flow_timeout())
        .await;

    let Some(interaction) = interaction else {
        reply
            .edit(
                ctx,
                poise::CreateReply::default()
                    .content(render::flow_expired())
                    .components(vec![]),
            )
            .await?;
        return Ok(());
    };

    let content = if interaction.data.custom_id == ADD_NOTE_ID {
        ctx.data()
            .sessions
            .begin(
                (who.user_id, who.chat_id),
                ctx.channel_id().get(),
                PendingStep::AwaitingNote { delta },
            );
        "Пожалуйста, напишите заметку к изменению вайба:".to_string()
    } else {
        run_change(ctx.data(), who, delta, None).await
    };

    interaction
        .create_response(
            ctx.serenity_context(),
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content(content)
                    .components(vec![]),
            ),
        )
        .await?;
    Ok(())
}

/// Check your current vibe
#[poise::command(slash_command)]
pub async fn myvibe(ctx: Context<'_>) -> Result<(), Error> {
    let who = identity(&ctx);
    let service = VibeService::new(ctx.data().db.clone());
    let text = match service.standing(who.user_id, who.chat_id).await {
        Ok(standing) => render::standing_reply(standing.as_ref()),
        Err(e) => failure_text("Vibe lookup", &e),
    };
    ctx.say(text).await?;
    Ok(())
}

/// Show the top 10 users of this chat
#[poise::command(slash_command)]
pub async fn topvibe(ctx: Context<'_>) -> Result<(), Error> {
    let chat_id = chat_id_of(ctx.guild_id(), ctx.channel_id());
    let service = VibeService::new(ctx.data().db.clone());
    let text = match service.top(chat_id).await {
        Ok(entries) => render::top_reply(&entries),
        Err(e) => failure_text("Leaderboard", &e),
    };
    ctx.say(text).await?;
    Ok(())
}

/// Show your last 10 vibe changes
#[poise::command(slash_command)]
pub async fn history(ctx: Context<'_>) -> Result<(), Error> {
    let who = identity(&ctx);
    let service = VibeService::new(ctx.data().db.clone());
    let text = match service.history(who.user_id, who.chat_id).await {
        Ok(records) => render::history_reply(&records),
        Err(e) => failure_text("History", &e),
    };
    ctx.say(text).await?;
    Ok(())
}

/// Show the vibe levels
#[poise::command(slash_command)]
pub async fn levels(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(render::levels_reply()).await?;
    Ok(())
}

/// Show your achievements
#[poise::command(slash_command)]
pub async fn achievements(ctx: Context<'_>) -> Result<(), Error> {
    let who = identity(&ctx);
    let service = VibeService::new(ctx.data().db.clone());
    let text = match service.achievements(who.user_id, who.chat_id).await {
        Ok(statuses) => render::achievements_reply(&statuses),
        Err(e) => failure_text("Achievements", &e),
    };
    ctx.say(text).await?;
    Ok(())
}

/// Claim your daily bonus
#[poise::command(slash_command)]
pub async fn daily(ctx: Context<'_>) -> Result<(), Error> {
    let who = identity(&ctx);
    let service = VibeService::new(ctx.data().db.clone());
    let text = match service.claim_daily(who).await {
        Ok(outcome) => {
            let granted: &[GrantNotice] = match &outcome {
                DailyOutcome::Granted { granted, .. } => granted,
                DailyOutcome::TooEarly { .. } => &[],
            };
            with_notices(render::daily_reply(&outcome), granted)
        }
        Err(e) => failure_text("Daily bonus", &e),
    };
    ctx.say(text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::AchievementId;

    #[test]
    fn test_with_notices_appends_each_grant() {
        let granted = vec![
            GrantNotice {
                user_id: 7,
                achievement: AchievementId::FirstVibe.achievement(),
            },
            GrantNotice {
                user_id: 7,
                achievement: AchievementId::VibeMaster.achievement(),
            },
        ];
        let text = with_notices("base".to_string(), &granted);
        assert!(text.starts_with("base\n\n<@7>"));
        assert!(text.contains("Первый вайб"));
        assert!(text.contains("Мастер вайба"));
    }

    #[test]
    fn test_failure_text_hides_store_details() {
        let err = VibeError::Store(anyhow::anyhow!("database is locked"));
        assert!(!failure_text("Test", &err).contains("locked"));
        assert_eq!(
            failure_text("Test", &VibeError::SelfTransfer),
            render::error_reply(&VibeError::SelfTransfer)
        );
    }
}
