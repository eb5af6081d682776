
mod communication_channel;
mod config;
mod conversation_manager;
mod discord_manager;
mod docx;
mod error;
mod link_parser;
mod relay;
mod report;
mod resolver;
mod session;
mod vk_api;
mod workflow;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use dotenvy::dotenv;
use serenity::http::Http;
use serenity::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::communication_channel::ChatId;
use crate::config::BotConfig;
use crate::conversation_manager::ConversationManager;
use crate::discord_manager::{DiscordChannel, Handler};
use crate::docx::DocxWriter;
use crate::relay::OperatorRelay;
use crate::session::{InMemorySessionStore, SessionStore};
use crate::vk_api::VkClient;

const SESSION_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vk_activity_bot=info".parse()?))
        .init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    config.log_redacted();

    let http = Arc::new(Http::new(&config.discord_token));
    let channel = Arc::new(DiscordChannel::new(http));
    let api = Arc::new(VkClient::with_base_url(config.vk_token.clone(), config.vk_api_url.clone()));
    let sessions = Arc::new(InMemorySessionStore::new(config.session_ttl));
    let documents = Arc::new(DocxWriter::new(config.report_dir.clone(), config.timezone));
    let relay = OperatorRelay::new(channel.clone(), config.operator_channel_id.map(ChatId), config.timezone);

    let manager = Arc::new(ConversationManager::new(
        channel,
        api,
        sessions.clone(),
        documents,
        relay,
        config.timezone,
    ));

    // Abandoned dialogues expire on their own.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                info!(purged, remaining = sessions.len(), "Expired idle sessions");
            }
        }
    });

    let intents = GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler::new(manager))
        .await?;

    info!("Starting Discord client");
    if let Err(why) = client.start().await {
        error!(error = ?why, "An error occurred while running the client");
    }

    Ok(())
}
