//! User-facing reply text. Everything here is pure formatting.

use crate::achievements::Achievement;
use crate::db::{parse_timestamp, HistoryRecord, LeaderboardEntry};
use crate::error::VibeError;
use crate::progression::{Level, LevelInfo, LEVELS};
use crate::services::vibe::{AchievementStatus, ChangeOutcome, DailyOutcome, GrantNotice, Standing, TransferOutcome};
use std::fmt::Write as _;

pub fn help_text() -> String {
    [
        "👋 Привет! Я бот для отслеживания вайба.",
        "",
        "Команды:",
        "/plusvibe - добавить вайб (можно с заметкой)",
        "/minusvibe - уменьшить вайб (можно с заметкой)",
        "/myvibe - проверить свой текущий вайб",
        "/topvibe - показать топ пользователей по вайбу",
        "/history - показать историю изменений вайба",
        "/levels - информация об уровнях вайба",
        "/transfer - передать вайб другому пользователю",
        "/achievements - посмотреть свои достижения",
        "/daily - получить ежедневный бонус",
        "/cancel - отменить текущее действие",
    ]
    .join("\n")
}

fn level_line(level: &Level) -> String {
    format!("{} {}", level.emoji, level.name)
}

pub fn note_prompt(delta: i64) -> String {
    format!("Хотите добавить заметку к изменению вайба ({:+})?", delta)
}

pub fn change_reply(outcome: &ChangeOutcome) -> String {
    let mut message = if outcome.delta > 0 {
        "✨ Вайб повышен!\n".to_string()
    } else {
        "😔 Вайб понижен!\n".to_string()
    };
    let _ = writeln!(message, "Текущий вайб: {}", outcome.score);
    let _ = write!(message, "Уровень: {}", level_line(outcome.level.current));
    if outcome.level.next.is_some() {
        let _ = write!(message, "\nПрогресс до следующего уровня: {:.1}%", outcome.level.progress);
    }
    if let Some(note) = &outcome.note {
        let _ = write!(message, "\nЗаметка: {}", note);
    }
    message
}

fn progress_line(level: &LevelInfo) -> Option<String> {
    level.next.map(|next| {
        format!(
            "До следующего уровня ({}): {:.1}%",
            level_line(next),
            level.progress
        )
    })
}

pub fn standing_reply(standing: Option<&Standing>) -> String {
    let Some(standing) = standing else {
        return "У вас пока нет вайба. Используйте /plusvibe или /minusvibe!".to_string();
    };

    let mut message = format!(
        "🌟 Ваш текущий вайб: {}\nУровень: {}",
        standing.score,
        level_line(standing.level.current)
    );
    if let Some(line) = progress_line(&standing.level) {
        message.push('\n');
        message.push_str(&line);
    }
    message
}

pub fn top_reply(entries: &[(LeaderboardEntry, &'static Level)]) -> String {
    if entries.is_empty() {
        return "Пока никто не набрал вайб в этом чате!".to_string();
    }

    let mut message = "🏆 Топ пользователей по вайбу:\n\n".to_string();
    for (i, (entry, level)) in entries.iter().enumerate() {
        let _ = writeln!(message, "{}. {} {}: {}", i + 1, level.emoji, entry.username, entry.vibe_score);
    }
    message
}

pub fn history_reply(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "У вас пока нет истории изменений вайба!".to_string();
    }

    let mut message = "📝 Последние изменения вайба:\n\n".to_string();
    for record in records {
        let when = parse_timestamp(&record.timestamp)
            .map(|ts| ts.format("%d.%m %H:%M").to_string())
            .unwrap_or_else(|| record.timestamp.clone());
        let emoji = if record.change_amount > 0 { "✨" } else { "😔" };
        let _ = write!(message, "{} {} {:+}", when, emoji, record.change_amount);
        if let Some(note) = record.note.as_deref().filter(|n| !n.is_empty()) {
            let _ = write!(message, " - {}", note);
        }
        message.push('\n');
    }
    message
}

pub fn levels_reply() -> String {
    let mut message = "📊 Уровни вайба:\n\n".to_string();
    for level in LEVELS {
        let _ = writeln!(message, "{}: от {} вайба", level_line(level), level.required);
    }
    message
}

pub fn achievements_reply(statuses: &[AchievementStatus]) -> String {
    let mut message = "🏆 Ваши достижения:\n\n".to_string();
    for status in statuses {
        let achievement = status.achievement;
        match &status.achieved_at {
            Some(at) => {
                let date = parse_timestamp(at)
                    .map(|ts| ts.format("%d.%m.%Y").to_string())
                    .unwrap_or_else(|| at.clone());
                let _ = writeln!(message, "{} {} - ✅ {}", achievement.emoji, achievement.name, date);
            }
            None => {
                let _ = writeln!(message, "❌ {}", achievement.name);
            }
        }
        let _ = writeln!(message, "└ {}\n", achievement.description);
    }
    message
}

pub fn achievement_notice(achievement: &Achievement) -> String {
    format!(
        "🎉 Получено достижение!\n\n{} {}\n📝 {}\n🎁 Награда: +{} вайба",
        achievement.emoji, achievement.name, achievement.description, achievement.reward
    )
}

pub fn grant_notice(notice: &GrantNotice) -> String {
    format!("<@{}>\n{}", notice.user_id, achievement_notice(notice.achievement))
}

pub fn daily_reply(outcome: &DailyOutcome) -> String {
    match outcome {
        DailyOutcome::TooEarly { hours, minutes } => {
            format!("⏳ Следующий бонус будет доступен через {} ч. {} мин.", hours, minutes)
        }
        DailyOutcome::Granted { bonus, streak, score, .. } => format!(
            "🎁 Получен ежедневный бонус: +{} вайба!\n🔥 Текущий стрик: {} дней\n💫 Новый баланс: {} вайба",
            bonus, streak, score
        ),
    }
}

pub fn transfer_reply(outcome: &TransferOutcome) -> String {
    format!(
        "✨ Успешно передано {} вайба пользователю {}!",
        outcome.receipt.amount, outcome.recipient.username
    )
}

pub fn transfer_amount_prompt() -> &'static str {
    "Сколько вайба вы хотите передать? (введите число)"
}

pub fn transfer_target_prompt() -> &'static str {
    "Отлично! Теперь упомяните пользователя, которому хотите передать вайб, \
ответьте на его сообщение или отправьте его @username"
}

pub fn flow_expired() -> &'static str {
    "⌛ Время ожидания истекло. Попробуйте снова."
}

pub fn error_reply(err: &VibeError) -> String {
    match err {
        VibeError::InvalidAmount { max } if *max == i64::MAX => {
            "Пожалуйста, введите положительное число.".to_string()
        }
        VibeError::InvalidAmount { max } => {
            format!("Пожалуйста, укажите число от 1 до {}.", max)
        }
        VibeError::BoundExceeded { attempted, .. } if *attempted > 0 => {
            "Достигнут максимальный уровень вайба (1,000,000)".to_string()
        }
        VibeError::BoundExceeded { .. } => "Достигнут минимальный уровень вайба (-1,000,000)".to_string(),
        VibeError::InsufficientBalance { .. } => "У вас недостаточно вайба для передачи!".to_string(),
        VibeError::SelfTransfer => "Вы не можете передать вайб самому себе!".to_string(),
        VibeError::RecipientNotFound => "Не удалось найти пользователя. Упомяните пользователя, \
ответьте на его сообщение или укажите правильный @username"
            .to_string(),
        VibeError::Store(_) => "Произошла ошибка. Попробуйте позже.".to_string(),
    }
}
