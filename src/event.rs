use serde::{Deserialize, Serialize};

use crate::UserId;

/// One relayable payload, one variant per supported platform kind. Anything
/// the adapter cannot map onto these six never becomes an event at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Text { body: String },
    Photo { file_id: String, caption: Option<String> },
    Video { file_id: String, caption: Option<String> },
    Audio { file_id: String, caption: Option<String> },
    Voice { file_id: String, caption: Option<String> },
    Document { file_id: String, caption: Option<String> },
}

impl Content {
    pub fn kind(&self) -> &'static str {
        match self {
            Content::Text { .. } => "text",
            Content::Photo { .. } => "photo",
            Content::Video { .. } => "video",
            Content::Audio { .. } => "audio",
            Content::Voice { .. } => "voice",
            Content::Document { .. } => "document",
        }
    }

    /// What gets logged: the text body, or the opaque media handle.
    pub fn payload(&self) -> &str {
        match self {
            Content::Text { body } => body,
            Content::Photo { file_id, .. }
            | Content::Video { file_id, .. }
            | Content::Audio { file_id, .. }
            | Content::Voice { file_id, .. }
            | Content::Document { file_id, .. } => file_id,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Content::Text { body } => Some(body),
            Content::Photo { caption, .. }
            | Content::Video { caption, .. }
            | Content::Audio { caption, .. }
            | Content::Voice { caption, .. }
            | Content::Document { caption, .. } => caption.as_deref(),
        }
    }

    /// A copy of this content tagged with the sender's nickname, the only
    /// identity recipients ever see. Text goes into the body, media into
    /// the caption.
    pub fn tagged(&self, nickname: &str) -> Content {
        fn tag(nickname: &str, caption: &Option<String>) -> Option<String> {
            Some(match caption {
                Some(caption) => format!("{nickname}: {caption}"),
                None => nickname.to_owned(),
            })
        }

        match self {
            Content::Text { body } => Content::Text {
                body: format!("{nickname}: {body}"),
            },
            Content::Photo { file_id, caption } => Content::Photo {
                file_id: file_id.clone(),
                caption: tag(nickname, caption),
            },
            Content::Video { file_id, caption } => Content::Video {
                file_id: file_id.clone(),
                caption: tag(nickname, caption),
            },
            Content::Audio { file_id, caption } => Content::Audio {
                file_id: file_id.clone(),
                caption: tag(nickname, caption),
            },
            Content::Voice { file_id, caption } => Content::Voice {
                file_id: file_id.clone(),
                caption: tag(nickname, caption),
            },
            Content::Document { file_id, caption } => Content::Document {
                file_id: file_id.clone(),
                caption: tag(nickname, caption),
            },
        }
    }
}

/// A normalized inbound platform message.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub sender: UserId,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    Start,
    ChangeNick,
    Members,
    ListPinned,
    /// Operator pin request. `target` is the replied-to message, if the
    /// request was a reply at all.
    Pin { target: Option<ReplySnapshot> },
    Content {
        content: Content,
        reply_target: Option<i64>,
    },
}

/// Snapshot of a replied-to message, captured by the adapter since the core
/// never talks to the platform itself.
#[derive(Debug, Clone)]
pub struct ReplySnapshot {
    pub message_id: i64,
    pub sender: UserId,
    pub content: Content,
}

/// One physical send for the adapter to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundAction {
    pub target: UserId,
    pub content: Content,
    pub reply_target: Option<i64>,
}

impl OutboundAction {
    pub fn text(target: UserId, body: impl Into<String>) -> Self {
        Self {
            target,
            content: Content::Text { body: body.into() },
            reply_target: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_tagged_in_the_body() {
        let tagged = Content::Text { body: "hello".into() }.tagged("Ann");
        assert_eq!(tagged, Content::Text { body: "Ann: hello".into() });
    }

    #[test]
    fn media_is_tagged_in_the_caption() {
        let photo = Content::Photo {
            file_id: "abc".into(),
            caption: None,
        };
        assert_eq!(
            photo.tagged("Ann"),
            Content::Photo {
                file_id: "abc".into(),
                caption: Some("Ann".into()),
            }
        );

        let doc = Content::Document {
            file_id: "xyz".into(),
            caption: Some("the rules".into()),
        };
        assert_eq!(doc.tagged("Bo").text(), Some("Bo: the rules"));
    }
}
