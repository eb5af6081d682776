use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono_tz::Tz;
use tokio::sync::Mutex as TurnLock;
use tracing::{debug, error, info, warn};

use crate::communication_channel::{ChatId, CommunicationChannel, IncomingText, Keyboard, MenuAction, OutboundMessage};
use crate::docx::DocumentWriter;
use crate::error::{ResolveError, VkError};
use crate::link_parser::{extract_screen_name, parse_post_link, PostRef};
use crate::relay::{OperatorRelay, ReportCategory};
use crate::report::{render_activity_message, render_likers_message, PostInfo};
use crate::resolver::{resolve_group, resolve_user};
use crate::session::{ConversationStep, SessionStore};
use crate::vk_api::SocialApi;
use crate::workflow::{fetch_likers, scan_activity, POSTS_TO_SCAN};

pub const START_COMMAND: &str = "/start";

const GREETING: &str = "**Привет!**\n\n\
    Я умею:\n\
    • Проверять, лайкал ли человек посты в группе\n\
    • Показывать, кто лайкнул любой пост ВК\n\n\
    Результаты присылаются:\n\
    • Подробным сообщением\n\
    • Файлом DOCX\n\n\
    Выбери функцию:";

const HELP: &str = "Доступные команды:\n\
    • Начать анализ — проверка активности в группе\n\
    • Кто лайкнул пост — список лайкнувших\n\n\
    Результаты присылаются:\n\
    • Подробным сообщением\n\
    • Файлом DOCX";

const GROUP_PROMPT: &str = "**Отправь ссылку на группу ВК**";
const POST_PROMPT: &str = "Отправь ссылку на любой пост ВК\nПример: https://vk.com/wall-123456789_987654";
const USER_PROMPT: &str = "**Группа принята!**\n\nТеперь отправь ссылку на профиль человека";
const MENU_PROMPT: &str = "Выбери действие:";
const CANCELLED: &str = "Отменено!";
const CANCELLED_RELAY: &str = "Пользователь отменил операцию";
const DONE: &str = "✅ Готово! Все данные отправлены.";

const BAD_GROUP_LINK: &str = "Не понял ссылку на группу.";
const NOT_A_GROUP: &str = "Это не группа ВК.";
const BAD_USER_LINK: &str = "Не понял ссылку на человека.";
const NOT_A_USER: &str = "Это не личный профиль.";
const BAD_POST_LINK: &str = "Не могу распознать ссылку на пост.\nПопробуй скопировать ссылку прямо из приложения ВК.";
const VK_UNAVAILABLE: &str = "Не удалось связаться с ВК. Попробуй отправить ссылку ещё раз.";

const LIKES_HIDDEN: &str = "❌ Лайки скрыты у этого поста";
const LIKES_FAILED: &str = "❌ Произошла ошибка при получении лайков";
const NO_LIKES: &str = "Никто не лайкнул этот пост";
const NO_POSTS: &str = "❌ Нет постов или доступ закрыт.";
const ANALYSIS_FAILED: &str = "❌ Ошибка при анализе.";
const DOCUMENT_FAILED: &str = "⚠️ Не удалось сформировать документ.";

/// Drives the per-chat dialogue and dispatches the two analysis workflows.
///
/// Events from the same chat are handled strictly one after another, so a
/// cancel never interleaves with a pending lookup. Different chats proceed
/// independently.
pub struct ConversationManager {
    channel: Arc<dyn CommunicationChannel>,
    api: Arc<dyn SocialApi>,
    sessions: Arc<dyn SessionStore>,
    documents: Arc<dyn DocumentWriter>,
    operator_relay: OperatorRelay,
    timezone: Tz,
    turns: Mutex<HashMap<ChatId, Arc<TurnLock<()>>>>,
}

impl ConversationManager {
    pub fn new(
        channel: Arc<dyn CommunicationChannel>,
        api: Arc<dyn SocialApi>,
        sessions: Arc<dyn SessionStore>,
        documents: Arc<dyn DocumentWriter>,
        relay: OperatorRelay,
        timezone: Tz,
    ) -> Self {
        Self {
            channel,
            api,
            sessions,
            documents,
            operator_relay: relay,
            timezone,
            turns: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle_start(&self, msg: &IncomingText) {
        self.in_turn(msg.chat, async {
            self.respond(msg, OutboundMessage::text(GREETING).with_keyboard(Keyboard::MainMenu), ReportCategory::Start)
                .await;
        })
        .await;
    }

    pub async fn handle_text(&self, msg: &IncomingText) {
        self.in_turn(msg.chat, self.process_text(msg)).await;
    }

    /// Runs `handling` once every earlier event of `chat` has finished.
    async fn in_turn<F>(&self, chat: ChatId, handling: F)
    where
        F: Future<Output = ()>,
    {
        let turn = self.turn_lock(chat);
        let guard = turn.lock().await;
        handling.await;
        drop(guard);
        drop(turn);
        self.forget_idle_turn(chat);
    }

    fn turn_lock(&self, chat: ChatId) -> Arc<TurnLock<()>> {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        turns.entry(chat).or_default().clone()
    }

    // Only the map holds the lock once nobody is handling or waiting on the chat.
    fn forget_idle_turn(&self, chat: ChatId) {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        if turns.get(&chat).map_or(false, |turn| Arc::strong_count(turn) == 1) {
            turns.remove(&chat);
        }
    }

    async fn process_text(&self, msg: &IncomingText) {
        let text = msg.text.trim();

        // Menu labels win over whatever step the chat is in.
        match MenuAction::from_label(text) {
            Some(MenuAction::StartAnalysis) => {
                self.sessions.set(msg.chat, ConversationStep::AwaitingGroup);
                self.respond(
                    msg,
                    OutboundMessage::text(GROUP_PROMPT).with_keyboard(Keyboard::CancelOnly),
                    ReportCategory::AnalysisStarted,
                )
                .await;
            }
            Some(MenuAction::PostLikers) => {
                self.sessions.set(msg.chat, ConversationStep::AwaitingPostLink);
                self.respond(
                    msg,
                    OutboundMessage::text(POST_PROMPT).with_keyboard(Keyboard::CancelOnly),
                    ReportCategory::LikersRequested,
                )
                .await;
            }
            Some(MenuAction::Help) => {
                self.respond(msg, OutboundMessage::text(HELP).with_keyboard(Keyboard::MainMenu), ReportCategory::Help)
                    .await;
            }
            Some(MenuAction::Cancel) => {
                self.sessions.clear(msg.chat);
                self.reply(msg.chat, OutboundMessage::text(CANCELLED).with_keyboard(Keyboard::MainMenu))
                    .await;
                self.relay(msg, &ReportCategory::Cancelled, CANCELLED_RELAY).await;
            }
            None => match self.sessions.get(msg.chat) {
                Some(ConversationStep::AwaitingGroup) => self.accept_group(msg, text).await,
                Some(ConversationStep::AwaitingUser { group_id }) => self.accept_user(msg, text, group_id).await,
                Some(ConversationStep::AwaitingPostLink) => self.accept_post_link(msg, text).await,
                None => {
                    self.respond(
                        msg,
                        OutboundMessage::text(MENU_PROMPT).with_keyboard(Keyboard::MainMenu),
                        ReportCategory::UnknownCommand,
                    )
                    .await;
                }
            },
        }
    }

    async fn accept_group(&self, msg: &IncomingText, text: &str) {
        let Some(screen_name) = extract_screen_name(text) else {
            self.respond(msg, OutboundMessage::text(BAD_GROUP_LINK), ReportCategory::GroupError)
                .await;
            return;
        };

        match resolve_group(self.api.as_ref(), screen_name).await {
            Ok(group_id) => {
                self.sessions.set(msg.chat, ConversationStep::AwaitingUser { group_id });
                self.respond(
                    msg,
                    OutboundMessage::text(USER_PROMPT).with_keyboard(Keyboard::CancelOnly),
                    ReportCategory::GroupAccepted,
                )
                .await;
            }
            Err(ResolveError::Upstream(e)) => {
                warn!(error = %e, screen_name, "Group resolution failed upstream");
                self.respond(msg, OutboundMessage::text(VK_UNAVAILABLE), ReportCategory::VkUnavailable)
                    .await;
            }
            Err(e) => {
                debug!(error = %e, screen_name, "Rejected group link");
                self.respond(msg, OutboundMessage::text(NOT_A_GROUP), ReportCategory::GroupError)
                    .await;
            }
        }
    }

    async fn accept_user(&self, msg: &IncomingText, text: &str, group_id: i64) {
        let Some(screen_name) = extract_screen_name(text) else {
            self.respond(msg, OutboundMessage::text(BAD_USER_LINK), ReportCategory::UserError)
                .await;
            return;
        };

        let user_id = match resolve_user(self.api.as_ref(), screen_name).await {
            Ok(user_id) => user_id,
            Err(ResolveError::Upstream(e)) => {
                warn!(error = %e, screen_name, "User resolution failed upstream");
                self.respond(msg, OutboundMessage::text(VK_UNAVAILABLE), ReportCategory::VkUnavailable)
                    .await;
                return;
            }
            Err(e) => {
                debug!(error = %e, screen_name, "Rejected user link");
                self.respond(msg, OutboundMessage::text(NOT_A_USER), ReportCategory::UserError)
                    .await;
                return;
            }
        };

        // The flow is finished from here on, whatever the analysis outcome.
        self.sessions.clear(msg.chat);
        let notice = format!("Анализирую {} последних постов...\nОжидай 15–30 секунд", POSTS_TO_SCAN);
        self.respond(
            msg,
            OutboundMessage::text(notice).with_keyboard(Keyboard::Remove),
            ReportCategory::ActivityScanStarted,
        )
        .await;
        self.run_activity_analysis(msg, group_id, user_id).await;
    }

    async fn accept_post_link(&self, msg: &IncomingText, text: &str) {
        let Some(post) = parse_post_link(text) else {
            self.respond(msg, OutboundMessage::text(BAD_POST_LINK), ReportCategory::PostLinkError)
                .await;
            return;
        };

        self.sessions.clear(msg.chat);
        self.respond(
            msg,
            OutboundMessage::text("Собираю лайки... (до 1000 человек)").with_keyboard(Keyboard::Remove),
            ReportCategory::LikersScanStarted,
        )
        .await;
        self.run_like_lookup(msg, post).await;
    }

    async fn run_like_lookup(&self, msg: &IncomingText, post: PostRef) {
        info!(chat = %msg.chat, owner_id = post.owner_id, post_id = post.post_id, "Collecting post likers");

        let likers = match fetch_likers(self.api.as_ref(), post).await {
            Ok(likers) => likers,
            Err(VkError::PermissionDenied { .. }) => {
                self.respond_with_menu(msg, LIKES_HIDDEN, ReportCategory::LikesHidden).await;
                return;
            }
            Err(e @ VkError::Api { .. }) => {
                warn!(error = %e, "VK rejected likes.getList");
                self.respond_with_menu(msg, &format!("❌ Ошибка ВК: {}", e), ReportCategory::VkApiError)
                    .await;
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch post likers");
                self.respond_with_menu(msg, LIKES_FAILED, ReportCategory::LikersFailed).await;
                return;
            }
        };

        if likers.is_empty() {
            self.respond_with_menu(msg, NO_LIKES, ReportCategory::NoLikes).await;
            return;
        }

        let count = likers.len();
        let report = render_likers_message(&post, &likers);
        self.reply(msg.chat, OutboundMessage::text(report.as_str())).await;

        let info = PostInfo { link: post.url() };
        match self.documents.write_likers(&info, &likers) {
            Ok(path) => {
                self.send_document(msg.chat, path, format!("📎 Список лайкнувших ({} чел.)", count))
                    .await
            }
            Err(e) => {
                error!(error = %e, "Failed to build likers document");
                self.reply(msg.chat, OutboundMessage::text(DOCUMENT_FAILED)).await;
            }
        }

        self.reply(msg.chat, OutboundMessage::text(DONE).with_keyboard(Keyboard::MainMenu))
            .await;
        self.relay(msg, &ReportCategory::LikersResult(count), &report).await;
    }

    async fn run_activity_analysis(&self, msg: &IncomingText, group_id: i64, user_id: i64) {
        info!(chat = %msg.chat, group_id, user_id, "Analyzing user activity");

        let scan = match scan_activity(self.api.as_ref(), group_id, user_id, self.timezone).await {
            Ok(Some(scan)) => scan,
            Ok(None) => {
                self.respond_with_menu(msg, NO_POSTS, ReportCategory::NoPosts).await;
                return;
            }
            Err(e) => {
                error!(error = %e, group_id, user_id, "Activity analysis failed");
                self.respond_with_menu(msg, ANALYSIS_FAILED, ReportCategory::ActivityFailed)
                    .await;
                return;
            }
        };

        let report = render_activity_message(&scan.records);
        self.reply(msg.chat, OutboundMessage::text(report.as_str())).await;

        match self.documents.write_activity(&scan.user, &scan.records) {
            Ok(path) => {
                self.send_document(msg.chat, path, "📎 Подробный отчёт в формате DOCX".to_string())
                    .await
            }
            Err(e) => {
                error!(error = %e, "Failed to build activity document");
                self.reply(msg.chat, OutboundMessage::text(DOCUMENT_FAILED)).await;
            }
        }

        self.reply(msg.chat, OutboundMessage::text(DONE).with_keyboard(Keyboard::MainMenu))
            .await;
        self.relay(msg, &ReportCategory::ActivityResult, &report).await;
    }

    async fn respond_with_menu(&self, msg: &IncomingText, text: &str, category: ReportCategory) {
        self.respond(msg, OutboundMessage::text(text).with_keyboard(Keyboard::MainMenu), category)
            .await;
    }

    /// Sends `message` to the requesting chat and mirrors it to the operator.
    async fn respond(&self, msg: &IncomingText, message: OutboundMessage, category: ReportCategory) {
        let body = message.text.clone();
        self.reply(msg.chat, message).await;
        self.relay(msg, &category, &body).await;
    }

    async fn reply(&self, chat: ChatId, message: OutboundMessage) {
        if let Err(e) = self.channel.send_message(chat, message).await {
            error!(error = %e, chat = %chat, "Failed to send message");
        }
    }

    async fn relay(&self, msg: &IncomingText, category: &ReportCategory, body: &str) {
        self.operator_relay.relay(msg.chat, msg.username.as_deref(), category, body).await;
    }

    // The document is a temporary file: it is removed whether or not the upload worked.
    async fn send_document(&self, chat: ChatId, path: PathBuf, caption: String) {
        self.reply(chat, OutboundMessage::document(path.clone(), caption)).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(error = %e, path = %path.display(), "Failed to remove report document");
        }
    }
}
