use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use hushchat::{
    UserId,
    config::{Config, WebhookConfig},
    event::OutboundAction,
    relay::Gateway,
    session::Bot,
    store::Store,
    telegram::{self, TelegramClient, Update},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    let config = Config::from_env()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await
        .context("opening the database")?;
    let store = Store::new(pool);
    store.init().await?;

    let client = TelegramClient::new(&config.bot_token);
    let bot = Bot::new(store, client.clone(), config.operator).await?;
    info!(members = bot.registry().len(), "registry hydrated");

    spawn_heartbeat(client.clone(), config.operator, config.heartbeat_secs);

    match &config.webhook {
        Some(webhook) => run_webhook(&bot, &client, webhook).await,
        None => run_longpoll(&bot, &client).await,
    }
}

async fn run_longpoll(bot: &Bot<TelegramClient>, client: &TelegramClient) -> anyhow::Result<()> {
    // A stale webhook registration would starve getUpdates.
    client.delete_webhook().await.ok();
    info!("long-polling for updates");

    let mut offset = 0;
    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(err) => {
                warn!(%err, "getUpdates failed, backing off");
                tokio::time::sleep(Duration::from_secs(3)).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            handle_update(bot, update).await;
        }
    }
}

async fn run_webhook(
    bot: &Bot<TelegramClient>,
    client: &TelegramClient,
    webhook: &WebhookConfig,
) -> anyhow::Result<()> {
    client
        .set_webhook(&webhook.url)
        .await
        .context("registering the webhook")?;

    let (tx, mut rx) = mpsc::channel::<Update>(64);
    let app = telegram::webhook_router(tx);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", webhook.port))
        .await
        .context("binding the webhook port")?;
    info!(port = webhook.port, "webhook server up");

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(%err, "webhook server exited");
        }
    });

    while let Some(update) = rx.recv().await {
        handle_update(bot, update).await;
    }
    Ok(())
}

async fn handle_update(bot: &Bot<TelegramClient>, update: Update) {
    let Some(event) = telegram::normalize(update) else {
        return;
    };
    let sender = event.sender;
    if let Err(err) = bot.handle_event(event).await {
        // One bad update must never take the loop down for everyone else.
        error!(sender, %err, "event handler failed");
    }
}

fn spawn_heartbeat(client: TelegramClient, operator: UserId, period_secs: u64) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(period_secs));
        tick.tick().await; // the first tick fires immediately
        loop {
            tick.tick().await;
            if client
                .send(OutboundAction::text(operator, "hushchat is alive"))
                .await
                .is_err()
            {
                warn!("heartbeat notify failed");
            }
        }
    });
}
