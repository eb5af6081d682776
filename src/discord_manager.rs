use std::sync::Arc;

use serenity::async_trait;
use serenity::builder::CreateComponents;
use serenity::http::Http;
use serenity::model::application::component::ButtonStyle;
use serenity::model::application::interaction::{Interaction, InteractionResponseType};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use tracing::{debug, info, warn};

use crate::communication_channel::{ChatId, CommunicationChannel, IncomingText, MenuAction, OutboundMessage};
use crate::conversation_manager::{ConversationManager, START_COMMAND};
use crate::error::ChannelError;

/// Discord rejects message content longer than this many characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// Sends bot output to Discord channels over the REST API.
pub struct DiscordChannel {
    http: Arc<Http>,
}

impl DiscordChannel {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CommunicationChannel for DiscordChannel {
    async fn send_message(&self, chat: ChatId, message: OutboundMessage) -> Result<(), ChannelError> {
        let channel = ChannelId(chat.0);

        // Buttons and the attachment go on the last chunk.
        let mut chunks = split_message(&message.text, MESSAGE_LIMIT);
        let last = chunks.pop().unwrap_or_default();
        for chunk in chunks {
            channel.say(&self.http, chunk).await?;
        }

        let rows = message.keyboard.rows();
        if last.is_empty() && message.attachment.is_none() && rows.is_empty() {
            return Ok(());
        }
        channel
            .send_message(&self.http, |m| {
                if !last.is_empty() {
                    m.content(&last);
                }
                if let Some(path) = message.attachment.as_deref() {
                    m.add_file(path);
                }
                if !rows.is_empty() {
                    m.components(|c| build_keyboard(c, &rows));
                }
                m
            })
            .await?;

        Ok(())
    }
}

fn build_keyboard<'c>(components: &'c mut CreateComponents, rows: &[Vec<MenuAction>]) -> &'c mut CreateComponents {
    for row in rows {
        components.create_action_row(|action_row| {
            for action in row {
                let style = match action {
                    MenuAction::Cancel => ButtonStyle::Danger,
                    _ => ButtonStyle::Primary,
                };
                action_row.create_button(|button| {
                    button
                        .custom_id(action.custom_id())
                        .label(action.label())
                        .style(style)
                });
            }
            action_row
        });
    }
    components
}

/// Splits `text` into pieces of at most `limit` characters, breaking at line
/// ends where possible. Whitespace-only pieces are dropped since Discord
/// rejects empty messages.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut started = false;

    for line in text.split('\n') {
        for piece in hard_wrap(line, limit) {
            let piece_len = piece.chars().count();
            if started && current_len + 1 + piece_len > limit {
                push_chunk(&mut chunks, std::mem::take(&mut current));
                current_len = 0;
                started = false;
            }
            if started {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(&piece);
            current_len += piece_len;
            started = true;
        }
    }

    push_chunk(&mut chunks, current);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: String) {
    if !chunk.trim().is_empty() {
        chunks.push(chunk);
    }
}

fn hard_wrap(line: &str, limit: usize) -> Vec<String> {
    if line.chars().count() <= limit {
        return vec![line.to_string()];
    }
    let chars: Vec<char> = line.chars().collect();
    chars.chunks(limit).map(|piece| piece.iter().collect()).collect()
}

/// Gateway event handler: feeds direct messages and menu button presses into
/// the conversation manager.
pub struct Handler {
    manager: Arc<ConversationManager>,
}

impl Handler {
    pub fn new(manager: Arc<ConversationManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _context: Context, msg: Message) {
        // Ignore bot messages, including our own relay output
        if msg.author.bot {
            return;
        }

        // The bot only talks in direct messages
        if msg.guild_id.is_some() {
            return;
        }

        debug!(chat = msg.channel_id.0, author = %msg.author.name, "Message received");

        let incoming = IncomingText {
            chat: ChatId(msg.channel_id.0),
            username: Some(msg.author.name.clone()),
            text: msg.content.clone(),
        };

        if incoming.text.trim() == START_COMMAND {
            self.manager.handle_start(&incoming).await;
        } else {
            self.manager.handle_text(&incoming).await;
        }
    }

    async fn interaction_create(&self, context: Context, interaction: Interaction) {
        let Interaction::MessageComponent(component) = interaction else {
            return;
        };

        if let Err(why) = component
            .create_interaction_response(&context.http, |r| r.kind(InteractionResponseType::DeferredUpdateMessage))
            .await
        {
            warn!(error = ?why, "Failed to acknowledge button press");
        }

        let Some(action) = MenuAction::from_custom_id(&component.data.custom_id) else {
            debug!(custom_id = %component.data.custom_id, "Unknown button");
            return;
        };

        let incoming = IncomingText {
            chat: ChatId(component.channel_id.0),
            username: Some(component.user.name.clone()),
            text: action.label().to_string(),
        };
        self.manager.handle_text(&incoming).await;
    }

    async fn ready(&self, _: Context, ready: Ready) {
        info!(user = %ready.user.name, "Connected to Discord");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello\nworld", MESSAGE_LIMIT), vec!["hello\nworld".to_string()]);
        assert!(split_message("", MESSAGE_LIMIT).is_empty());
    }

    #[test]
    fn long_text_breaks_at_line_ends() {
        let line = "ж".repeat(40);
        let text = vec![line.as_str(); 60].join("\n");

        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].lines().count(), 48);
        assert!(chunks.iter().all(|c| c.chars().count() <= MESSAGE_LIMIT));
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn blank_lines_survive_splitting() {
        let text = "a\n\nb";
        assert_eq!(split_message(text, 3), vec!["a\n".to_string(), "b".to_string()]);
    }

    #[test]
    fn blank_prefix_before_long_line_is_dropped() {
        let long = "x".repeat(MESSAGE_LIMIT);
        let text = format!("\n{}", long);
        assert_eq!(split_message(&text, MESSAGE_LIMIT), vec![long.clone()]);

        let text = format!("  \n\n{}\nend", long);
        assert_eq!(split_message(&text, MESSAGE_LIMIT), vec![long, "end".to_string()]);
    }

    #[test]
    fn overlong_line_is_cut() {
        let text = "x".repeat(4500);
        let chunks = split_message(&text, MESSAGE_LIMIT);
        let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![2000, 2000, 500]);
    }
}
