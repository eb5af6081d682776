use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::warn;

use crate::communication_channel::{ChatId, CommunicationChannel, OutboundMessage};
use crate::report::{strip_markup, DATE_FORMAT};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━";

/// Which dialogue step or workflow produced a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportCategory {
    Start,
    AnalysisStarted,
    LikersRequested,
    Help,
    Cancelled,
    GroupError,
    GroupAccepted,
    UserError,
    ActivityScanStarted,
    PostLinkError,
    LikersScanStarted,
    UnknownCommand,
    NoLikes,
    LikesHidden,
    VkApiError,
    LikersFailed,
    LikersResult(usize),
    NoPosts,
    ActivityResult,
    ActivityFailed,
    VkUnavailable,
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReportCategory::Start => "Команда /start",
            ReportCategory::AnalysisStarted => "Начало анализа",
            ReportCategory::LikersRequested => "Запрос лайкнувших пост",
            ReportCategory::Help => "Запрос помощи",
            ReportCategory::Cancelled => "Отмена",
            ReportCategory::GroupError => "Ошибка группы",
            ReportCategory::GroupAccepted => "Группа принята",
            ReportCategory::UserError => "Ошибка пользователя",
            ReportCategory::ActivityScanStarted => "Начало анализа активности",
            ReportCategory::PostLinkError => "Ошибка ссылки на пост",
            ReportCategory::LikersScanStarted => "Начало сбора лайков",
            ReportCategory::UnknownCommand => "Неизвестная команда",
            ReportCategory::NoLikes => "Результат: нет лайков",
            ReportCategory::LikesHidden => "Ошибка: лайки скрыты",
            ReportCategory::VkApiError => "Ошибка ВК API",
            ReportCategory::LikersFailed => "Ошибка получения лайков",
            ReportCategory::LikersResult(count) => {
                return write!(f, "Результат лайков поста ({} человек)", count);
            }
            ReportCategory::NoPosts => "Ошибка: нет постов",
            ReportCategory::ActivityResult => "Результат анализа активности",
            ReportCategory::ActivityFailed => "Ошибка анализа",
            ReportCategory::VkUnavailable => "Ошибка: ВК недоступен",
        };
        f.write_str(label)
    }
}

/// Mirrors responses into a fixed operator channel.
pub struct OperatorRelay {
    channel: Arc<dyn CommunicationChannel>,
    operator_chat: Option<ChatId>,
    timezone: Tz,
}

impl OperatorRelay {
    pub fn new(channel: Arc<dyn CommunicationChannel>, operator_chat: Option<ChatId>, timezone: Tz) -> Self {
        Self {
            channel,
            operator_chat,
            timezone,
        }
    }

    /// Never fails; delivery problems are only logged.
    pub async fn relay(&self, origin: ChatId, username: Option<&str>, category: &ReportCategory, body: &str) {
        let Some(operator_chat) = self.operator_chat else {
            return;
        };

        let timestamp = Utc::now().with_timezone(&self.timezone).format(DATE_FORMAT).to_string();
        let report = render_relay_report(origin, username, category, &timestamp, body);

        if let Err(e) = self.channel.send_message(operator_chat, OutboundMessage::text(report)).await {
            warn!(error = %e, origin = %origin, category = %category, "Failed to relay report to operator");
        }
    }
}

pub fn render_relay_report(
    origin: ChatId,
    username: Option<&str>,
    category: &ReportCategory,
    timestamp: &str,
    body: &str,
) -> String {
    let handle = username.filter(|u| !u.is_empty()).unwrap_or("не указан");
    format!(
        "📊 ОТЧЕТ ОТ БОТА\n\
         {rule}\n\
         👤 Пользователь: @{handle}\n\
         🆔 Chat ID: {origin}\n\
         📊 Тип отчета: {category}\n\
         🕒 Время: {timestamp}\n\
         {rule}\n\
         \n\
         {body}\n\
         {rule}\n\
         ✅ Отчет сгенерирован автоматически",
        rule = RULE,
        handle = handle,
        origin = origin,
        category = category,
        timestamp = timestamp,
        body = strip_markup(body),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::RecordingChannel;

    #[test]
    fn relay_report_template() {
        let report = render_relay_report(
            ChatId(42),
            Some("alice"),
            &ReportCategory::LikersResult(3),
            "01.02.2024 10:30",
            "**📊 Лайкнули пост: 3 человек**",
        );
        let expected = "📊 ОТЧЕТ ОТ БОТА\n\
            ━━━━━━━━━━━━━━━━━━━━\n\
            👤 Пользователь: @alice\n\
            🆔 Chat ID: 42\n\
            📊 Тип отчета: Результат лайков поста (3 человек)\n\
            🕒 Время: 01.02.2024 10:30\n\
            ━━━━━━━━━━━━━━━━━━━━\n\
            \n\
            📊 Лайкнули пост: 3 человек\n\
            ━━━━━━━━━━━━━━━━━━━━\n\
            ✅ Отчет сгенерирован автоматически";
        assert_eq!(report, expected);
    }

    #[test]
    fn missing_handle_is_marked() {
        let report = render_relay_report(ChatId(1), None, &ReportCategory::Help, "t", "x");
        assert!(report.contains("👤 Пользователь: @не указан"));
        let report = render_relay_report(ChatId(1), Some(""), &ReportCategory::Help, "t", "x");
        assert!(report.contains("👤 Пользователь: @не указан"));
    }

    #[tokio::test]
    async fn relays_only_when_operator_configured() {
        let channel = Arc::new(RecordingChannel::default());

        let silent = OperatorRelay::new(channel.clone(), None, chrono_tz::UTC);
        silent.relay(ChatId(5), Some("bob"), &ReportCategory::Help, "help").await;
        assert!(channel.sent().is_empty());

        let relay = OperatorRelay::new(channel.clone(), Some(ChatId(999)), chrono_tz::UTC);
        relay.relay(ChatId(5), Some("bob"), &ReportCategory::Help, "help").await;
        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChatId(999));
        assert!(sent[0].1.text.contains("📊 Тип отчета: Запрос помощи"));
    }

    #[tokio::test]
    async fn relay_failures_are_swallowed() {
        let channel = Arc::new(RecordingChannel::failing_for(ChatId(999)));
        let relay = OperatorRelay::new(channel.clone(), Some(ChatId(999)), chrono_tz::UTC);
        relay.relay(ChatId(5), None, &ReportCategory::Cancelled, "bye").await;
        assert!(channel.sent().is_empty());
    }
}
