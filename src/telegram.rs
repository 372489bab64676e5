use async_trait::async_trait;
use axum::{Json, Router, debug_handler, extract::State, http::StatusCode, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::{
    UserId,
    error::DeliveryError,
    event::{Content, EventKind, InboundEvent, OutboundAction, ReplySnapshot},
    relay::Gateway,
};

/// Thin Telegram Bot API client. Implements [`Gateway`] so the core can
/// stay ignorant of HTTP.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
    pub video: Option<Media>,
    pub audio: Option<Media>,
    pub voice: Option<Media>,
    pub document: Option<Media>,
    pub reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct Media {
    pub file_id: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("https://api.telegram.org/bot{token}"),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, DeliveryError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base))
            .json(&params)
            .send()
            .await
            .map_err(|err| DeliveryError(err.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|err| DeliveryError(err.to_string()))?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(DeliveryError(reason.to_owned()));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, DeliveryError> {
        let result = self
            .call(
                "getUpdates",
                json!({ "offset": offset, "timeout": 50, "allowed_updates": ["message"] }),
            )
            .await?;
        serde_json::from_value(result).map_err(|err| DeliveryError(err.to_string()))
    }

    pub async fn set_webhook(&self, url: &str) -> Result<(), DeliveryError> {
        self.call("setWebhook", json!({ "url": url })).await.map(|_| ())
    }

    pub async fn delete_webhook(&self) -> Result<(), DeliveryError> {
        self.call("deleteWebhook", json!({})).await.map(|_| ())
    }
}

#[async_trait]
impl Gateway for TelegramClient {
    async fn send(&self, action: OutboundAction) -> Result<(), DeliveryError> {
        let mut params = json!({ "chat_id": action.target });
        let method = match &action.content {
            Content::Text { body } => {
                params["text"] = json!(body);
                "sendMessage"
            }
            Content::Photo { file_id, caption } => {
                params["photo"] = json!(file_id);
                if let Some(caption) = caption {
                    params["caption"] = json!(caption);
                }
                "sendPhoto"
            }
            Content::Video { file_id, caption } => {
                params["video"] = json!(file_id);
                if let Some(caption) = caption {
                    params["caption"] = json!(caption);
                }
                "sendVideo"
            }
            Content::Audio { file_id, caption } => {
                params["audio"] = json!(file_id);
                if let Some(caption) = caption {
                    params["caption"] = json!(caption);
                }
                "sendAudio"
            }
            Content::Voice { file_id, caption } => {
                params["voice"] = json!(file_id);
                if let Some(caption) = caption {
                    params["caption"] = json!(caption);
                }
                "sendVoice"
            }
            Content::Document { file_id, caption } => {
                params["document"] = json!(file_id);
                if let Some(caption) = caption {
                    params["caption"] = json!(caption);
                }
                "sendDocument"
            }
        };
        if let Some(reply) = action.reply_target {
            params["reply_to_message_id"] = json!(reply);
            // The target id is from the sender's chat, so it may not resolve
            // in the recipient's; deliver anyway.
            params["allow_sending_without_reply"] = json!(true);
        }
        self.call(method, params).await.map(|_| ())
    }

    async fn probe(&self, user: UserId) -> Result<(), DeliveryError> {
        self.call("sendChatAction", json!({ "chat_id": user, "action": "typing" }))
            .await
            .map(|_| ())
    }
}

/// Maps a raw update onto the core's event shape. Returns `None` for
/// anything the bot does not handle (stickers, edits, joins, ...), which
/// the caller treats as a no-op.
pub fn normalize(update: Update) -> Option<InboundEvent> {
    let message = update.message?;
    let sender = message.from.as_ref()?.id;

    let kind = match message.text.as_deref().map(str::trim) {
        Some("/start") => EventKind::Start,
        Some("/name") => EventKind::ChangeNick,
        Some("/members") => EventKind::Members,
        Some("/pinned") => EventKind::ListPinned,
        Some("/pin") => EventKind::Pin {
            target: message.reply_to_message.as_deref().and_then(snapshot),
        },
        _ => EventKind::Content {
            reply_target: message.reply_to_message.as_ref().map(|m| m.message_id),
            content: content_of(&message)?,
        },
    };

    Some(InboundEvent { sender, kind })
}

fn snapshot(message: &Message) -> Option<ReplySnapshot> {
    Some(ReplySnapshot {
        message_id: message.message_id,
        sender: message.from.as_ref()?.id,
        content: content_of(message)?,
    })
}

fn content_of(message: &Message) -> Option<Content> {
    let caption = message.caption.clone();
    if let Some(text) = &message.text {
        return Some(Content::Text { body: text.clone() });
    }
    if let Some(photo) = &message.photo {
        // One entry per resolution; the last is the largest.
        let file_id = photo.last()?.file_id.clone();
        return Some(Content::Photo { file_id, caption });
    }
    if let Some(video) = &message.video {
        return Some(Content::Video { file_id: video.file_id.clone(), caption });
    }
    if let Some(audio) = &message.audio {
        return Some(Content::Audio { file_id: audio.file_id.clone(), caption });
    }
    if let Some(voice) = &message.voice {
        return Some(Content::Voice { file_id: voice.file_id.clone(), caption });
    }
    if let Some(document) = &message.document {
        return Some(Content::Document { file_id: document.file_id.clone(), caption });
    }
    None
}

/// Webhook-mode ingress: Telegram POSTs updates here, we queue them for the
/// single-consumer event loop.
pub fn webhook_router(tx: mpsc::Sender<Update>) -> Router {
    Router::new().route("/webhook", post(webhook)).with_state(tx)
}

#[debug_handler]
async fn webhook(State(tx): State<mpsc::Sender<Update>>, Json(update): Json<Update>) -> StatusCode {
    let _ = tx.send(update).await;
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(message: Value) -> Update {
        serde_json::from_value(json!({ "update_id": 1, "message": message })).unwrap()
    }

    #[test]
    fn slash_commands_map_to_their_events() {
        let event = normalize(update(json!({
            "message_id": 5,
            "from": { "id": 42 },
            "text": "/start"
        })))
        .unwrap();
        assert_eq!(event.sender, 42);
        assert!(matches!(event.kind, EventKind::Start));

        let event = normalize(update(json!({
            "message_id": 6,
            "from": { "id": 42 },
            "text": "  /name  "
        })))
        .unwrap();
        assert!(matches!(event.kind, EventKind::ChangeNick));
    }

    #[test]
    fn plain_text_becomes_content_with_reply_target() {
        let event = normalize(update(json!({
            "message_id": 7,
            "from": { "id": 42 },
            "text": "hello",
            "reply_to_message": { "message_id": 3, "text": "earlier" }
        })))
        .unwrap();
        let EventKind::Content { content, reply_target } = event.kind else {
            panic!("expected content");
        };
        assert_eq!(content, Content::Text { body: "hello".into() });
        assert_eq!(reply_target, Some(3));
    }

    #[test]
    fn largest_photo_size_wins() {
        let event = normalize(update(json!({
            "message_id": 8,
            "from": { "id": 42 },
            "caption": "look",
            "photo": [ { "file_id": "small" }, { "file_id": "big" } ]
        })))
        .unwrap();
        let EventKind::Content { content, .. } = event.kind else {
            panic!("expected content");
        };
        assert_eq!(
            content,
            Content::Photo { file_id: "big".into(), caption: Some("look".into()) }
        );
    }

    #[test]
    fn pin_without_reply_has_no_target() {
        let event = normalize(update(json!({
            "message_id": 9,
            "from": { "id": 42 },
            "text": "/pin"
        })))
        .unwrap();
        let EventKind::Pin { target } = event.kind else {
            panic!("expected pin");
        };
        assert!(target.is_none());
    }

    #[test]
    fn pin_reply_carries_the_target_snapshot() {
        let event = normalize(update(json!({
            "message_id": 10,
            "from": { "id": 42 },
            "text": "/pin",
            "reply_to_message": { "message_id": 4, "from": { "id": 7 }, "text": "rules" }
        })))
        .unwrap();
        let EventKind::Pin { target: Some(target) } = event.kind else {
            panic!("expected pin with target");
        };
        assert_eq!(target.message_id, 4);
        assert_eq!(target.sender, 7);
        assert_eq!(target.content, Content::Text { body: "rules".into() });
    }

    #[test]
    fn unsupported_updates_are_a_no_op() {
        // A sticker carries none of the six kinds.
        assert!(normalize(update(json!({
            "message_id": 11,
            "from": { "id": 42 }
        })))
        .is_none());
        // No message at all.
        assert!(normalize(serde_json::from_value(json!({ "update_id": 2 })).unwrap()).is_none());
    }
}
