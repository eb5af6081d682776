use std::fmt;
use std::path::PathBuf;

use serenity::async_trait;

use crate::error::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub u64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed menu entries. Pressing a button and typing its label are equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    StartAnalysis,
    PostLikers,
    Help,
    Cancel,
}

impl MenuAction {
    pub const ALL: [MenuAction; 4] = [
        MenuAction::StartAnalysis,
        MenuAction::PostLikers,
        MenuAction::Help,
        MenuAction::Cancel,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::StartAnalysis => "Начать анализ",
            MenuAction::PostLikers => "Кто лайкнул пост",
            MenuAction::Help => "Помощь",
            MenuAction::Cancel => "Отмена",
        }
    }

    pub fn custom_id(&self) -> &'static str {
        match self {
            MenuAction::StartAnalysis => "menu:start_analysis",
            MenuAction::PostLikers => "menu:post_likers",
            MenuAction::Help => "menu:help",
            MenuAction::Cancel => "menu:cancel",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.label() == text)
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.custom_id() == id)
    }
}

/// Which buttons accompany an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyboard {
    Keep,
    MainMenu,
    CancelOnly,
    Remove,
}

impl Keyboard {
    /// Button rows, in display order.
    pub fn rows(&self) -> Vec<Vec<MenuAction>> {
        match self {
            Keyboard::MainMenu => vec![
                vec![MenuAction::StartAnalysis, MenuAction::PostLikers],
                vec![MenuAction::Help],
            ],
            Keyboard::CancelOnly => vec![vec![MenuAction::Cancel]],
            Keyboard::Keep | Keyboard::Remove => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Keyboard,
    pub attachment: Option<PathBuf>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::Keep,
            attachment: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn document(path: PathBuf, caption: impl Into<String>) -> Self {
        Self {
            text: caption.into(),
            keyboard: Keyboard::Keep,
            attachment: Some(path),
        }
    }
}

/// An inbound text event from a chat.
#[derive(Debug, Clone)]
pub struct IncomingText {
    pub chat: ChatId,
    pub username: Option<String>,
    pub text: String,
}

#[async_trait]
pub trait CommunicationChannel: Send + Sync {
    async fn send_message(&self, chat: ChatId, message: OutboundMessage) -> Result<(), ChannelError>;
}
