use crate::{
    UserId,
    error::{Error, Result},
};

const DEFAULT_HEARTBEAT_SECS: u64 = 6 * 60 * 60;

pub struct Config {
    pub bot_token: String,
    /// The single privileged account: receives eviction notices and
    /// heartbeats, holds pin authority.
    pub operator: UserId,
    pub database_url: String,
    pub webhook: Option<WebhookConfig>,
    pub heartbeat_secs: u64,
}

pub struct WebhookConfig {
    pub url: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let bot_token = required("BOT_TOKEN")?;
        let operator = required("OPERATOR_ID")?
            .parse()
            .map_err(|_| Error::Config("OPERATOR_ID must be a numeric user id".into()))?;

        let database_url = dotenv::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:hushchat.db?mode=rwc".to_owned());

        let webhook = match dotenv::var("WEBHOOK_URL") {
            Ok(url) => Some(WebhookConfig {
                url,
                port: match dotenv::var("WEBHOOK_PORT") {
                    Ok(port) => port
                        .parse()
                        .map_err(|_| Error::Config("WEBHOOK_PORT must be a port number".into()))?,
                    Err(_) => 8080,
                },
            }),
            Err(_) => None,
        };

        let heartbeat_secs = match dotenv::var("HEARTBEAT_SECS") {
            Ok(secs) => secs
                .parse()
                .map_err(|_| Error::Config("HEARTBEAT_SECS must be a number of seconds".into()))?,
            Err(_) => DEFAULT_HEARTBEAT_SECS,
        };

        Ok(Config {
            bot_token,
            operator,
            database_url,
            webhook,
            heartbeat_secs,
        })
    }
}

fn required(name: &str) -> Result<String> {
    dotenv::var(name).map_err(|_| Error::Config(format!("{name} is not set")))
}
