use std::collections::HashSet;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::{
    UserId,
    error::Result,
    event::{Content, EventKind, InboundEvent, OutboundAction, ReplySnapshot},
    registry::Registry,
    relay::{self, Gateway},
    store::Store,
};

/// The bot core: per-user session state machine plus command dispatch.
///
/// A user is in one of two states. `AwaitingNick` (never seen, or freshly
/// prompted by /start or /name): their next text becomes their nickname.
/// `Active` (present in the registry): everything they send is relayed.
/// There is no terminal state; members stay active until evicted.
pub struct Bot<G> {
    store: Store,
    registry: Registry,
    gateway: G,
    operator: UserId,
    /// Users with a pending nickname prompt. Overlays the registry, so an
    /// active member can be renaming without losing membership.
    awaiting: Mutex<HashSet<UserId>>,
}

impl<G: Gateway> Bot<G> {
    pub async fn new(store: Store, gateway: G, operator: UserId) -> Result<Self> {
        let registry = Registry::hydrate(store.load_members().await?);
        Ok(Self {
            store,
            registry,
            gateway,
            operator,
            awaiting: Mutex::new(HashSet::new()),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        match event.kind {
            EventKind::Start => {
                self.prompt_for_nick(
                    event.sender,
                    "Hi! 👋 Pick a nickname for the anonymous chat:",
                )
                .await
            }
            EventKind::ChangeNick => {
                self.prompt_for_nick(event.sender, "Send your new nickname:")
                    .await
            }
            EventKind::Members => self.list_members(event.sender).await,
            EventKind::ListPinned => self.list_pinned(event.sender).await,
            EventKind::Pin { target } => self.pin(event.sender, target).await,
            EventKind::Content {
                content,
                reply_target,
            } => self.inbound_content(event.sender, content, reply_target).await,
        }
    }

    /// Re-entrant: /start and /name both land here, whatever the prior state.
    async fn prompt_for_nick(&self, user: UserId, prompt: &str) -> Result<()> {
        self.awaiting.lock().unwrap().insert(user);
        self.reply(user, prompt).await;
        Ok(())
    }

    async fn inbound_content(
        &self,
        sender: UserId,
        content: Content,
        reply_target: Option<i64>,
    ) -> Result<()> {
        if self.awaiting_nick(sender) {
            return self.capture_nick(sender, content).await;
        }

        let report = relay::relay(
            &self.store,
            &self.registry,
            &self.gateway,
            self.operator,
            sender,
            content,
            reply_target,
        )
        .await;
        info!(
            sender,
            attempted = report.attempted(),
            delivered = report.delivered(),
            evicted = report.evicted.len(),
            "relayed"
        );
        Ok(())
    }

    fn awaiting_nick(&self, user: UserId) -> bool {
        self.awaiting.lock().unwrap().contains(&user) || !self.registry.contains(user)
    }

    async fn capture_nick(&self, user: UserId, content: Content) -> Result<()> {
        let Content::Text { body } = content else {
            self.reply(user, "Send your nickname as plain text.").await;
            return Ok(());
        };
        let nickname = body.trim();
        if nickname.is_empty() {
            self.reply(user, "A nickname can't be empty. Try again:").await;
            return Ok(());
        }

        // Registration must be durable before the member goes live; on a
        // store failure the user stays in AwaitingNick and can just resend.
        if let Err(err) = self.store.upsert_member(user, nickname).await {
            warn!(user, %err, "nickname write failed");
            self.reply(user, "Couldn't save that right now, please resend your nickname.")
                .await;
            return Ok(());
        }

        self.registry.insert(user, nickname.to_owned());
        self.awaiting.lock().unwrap().remove(&user);
        self.reply(
            user,
            format!("✅ Nickname set: {nickname}\nYou can write to the chat now!"),
        )
        .await;
        self.welcome_digest(user).await;
        Ok(())
    }

    async fn pin(&self, actor: UserId, target: Option<ReplySnapshot>) -> Result<()> {
        if actor != self.operator {
            self.reply(actor, "Only the operator can pin messages.").await;
            return Ok(());
        }
        let Some(snapshot) = target else {
            self.reply(actor, "Reply to the message you want to pin.").await;
            return Ok(());
        };

        if let Err(err) = self
            .store
            .append_pinned(
                snapshot.message_id,
                snapshot.sender,
                snapshot.content.kind(),
                snapshot.content.text().unwrap_or_default(),
            )
            .await
        {
            warn!(actor, %err, "pin write failed");
            self.reply(actor, "Couldn't pin that right now, try again.").await;
            return Ok(());
        }
        self.reply(actor, "📌 Pinned.").await;
        Ok(())
    }

    async fn list_pinned(&self, requester: UserId) -> Result<()> {
        let lines = self.pinned_lines(false).await?;
        if lines.is_empty() {
            self.reply(requester, "Nothing pinned yet.").await;
        } else {
            self.reply(requester, format!("Pinned messages:\n{}", lines.join("\n")))
                .await;
        }
        Ok(())
    }

    /// Replays text pins to a freshly registered member. Best-effort: a
    /// store hiccup here must not undo a registration that already stuck.
    async fn welcome_digest(&self, user: UserId) {
        match self.pinned_lines(true).await {
            Ok(lines) if !lines.is_empty() => {
                self.reply(user, format!("Pinned so far:\n{}", lines.join("\n")))
                    .await;
            }
            Ok(_) => {}
            Err(err) => warn!(user, %err, "could not build the welcome digest"),
        }
    }

    async fn pinned_lines(&self, text_only: bool) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for entry in self.store.list_pinned().await? {
            if text_only && entry.kind != "text" {
                continue;
            }
            // The store keeps nicknames past eviction, so attribution works
            // even for members who are long gone.
            let nickname = self
                .store
                .get_nickname(entry.sender)
                .await?
                .unwrap_or_else(|| "anonymous".to_owned());
            lines.push(format!("{nickname} · {}: {}", entry.kind, entry.text));
        }
        Ok(lines)
    }

    async fn list_members(&self, requester: UserId) -> Result<()> {
        // Probe first so the roster only names members who are reachable
        // right now. A probe eviction is silent: no message was lost, so
        // nothing is logged and the operator is not told.
        for (member, _) in self.registry.snapshot() {
            if self.gateway.probe(member).await.is_err() {
                self.registry.remove(member);
            }
        }

        let mut nicknames: Vec<String> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|(_, nickname)| nickname)
            .collect();
        nicknames.sort();

        if self.registry.is_empty() {
            self.reply(requester, "Nobody is in the chat yet.").await;
        } else {
            self.reply(
                requester,
                format!("In the chat ({}):\n{}", nicknames.len(), nicknames.join("\n")),
            )
            .await;
        }
        Ok(())
    }

    /// Direct reply to the originating user. Best-effort: a failed reply is
    /// logged, never escalated, and never evicts.
    async fn reply(&self, target: UserId, text: impl Into<String>) {
        if let Err(err) = self.gateway.send(OutboundAction::text(target, text)).await {
            warn!(target, %err, "reply failed");
        }
    }
}
