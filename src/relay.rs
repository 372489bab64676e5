use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::warn;

use crate::{
    UserId,
    error::DeliveryError,
    event::{Content, OutboundAction},
    registry::Registry,
    store::Store,
};

/// Cap on in-flight deliveries within one fan-out pass.
const FANOUT_CONCURRENCY: usize = 8;

/// The adapter seam. The core decides who gets what; the gateway does the
/// actual network I/O.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send(&self, action: OutboundAction) -> Result<(), DeliveryError>;

    /// Lightweight liveness check with no user-visible side effect.
    async fn probe(&self, user: UserId) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

/// What one relay call did: the logged record, every per-recipient outcome,
/// and who got evicted for it.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub record_id: Option<i64>,
    pub outcomes: Vec<(UserId, DeliveryOutcome)>,
    pub evicted: Vec<(UserId, String)>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == DeliveryOutcome::Delivered)
            .count()
    }
}

/// Broadcasts `content` from `sender` to every other active member.
///
/// The Message Record is written before any delivery is attempted, so the
/// inbound message survives even a total delivery failure; a failed write is
/// logged and the relay proceeds best-effort. Deliveries are independent:
/// one refusal never aborts the rest. Recipients that fail are evicted from
/// the registry after the full pass, once per failure, no retries, and the
/// operator is told about each eviction on a best-effort basis.
pub async fn relay<G: Gateway>(
    store: &Store,
    registry: &Registry,
    gateway: &G,
    operator: UserId,
    sender: UserId,
    content: Content,
    reply_target: Option<i64>,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    let Some(nickname) = registry.nickname(sender) else {
        // Active sender missing from the registry should not happen; drop
        // rather than relay something we cannot attribute.
        warn!(sender, "sender not in registry, dropping message");
        return report;
    };

    match store
        .append_message(sender, content.kind(), content.payload(), reply_target)
        .await
    {
        Ok(id) => report.record_id = Some(id),
        Err(err) => warn!(%err, "message log write failed, relaying anyway"),
    }

    let tagged = content.tagged(&nickname);
    let recipients: Vec<UserId> = registry
        .snapshot()
        .into_iter()
        .map(|(id, _)| id)
        .filter(|id| *id != sender)
        .collect();

    let results: Vec<(UserId, Result<(), DeliveryError>)> = stream::iter(recipients)
        .map(|target| {
            let action = OutboundAction {
                target,
                content: tagged.clone(),
                reply_target,
            };
            async move { (target, gateway.send(action).await) }
        })
        .buffer_unordered(FANOUT_CONCURRENCY)
        .collect()
        .await;

    for (target, result) in results {
        match result {
            Ok(()) => report.outcomes.push((target, DeliveryOutcome::Delivered)),
            Err(err) => {
                report.evicted.push((target, err.0.clone()));
                report.outcomes.push((target, DeliveryOutcome::Failed(err.0)));
            }
        }
    }

    for (target, reason) in &report.evicted {
        let nickname = registry.remove(*target).unwrap_or_default();
        let notice = format!("evicted {nickname} ({target}): {reason}");
        if gateway
            .send(OutboundAction::text(operator, notice))
            .await
            .is_err()
        {
            warn!(target, "could not notify operator about eviction");
        }
    }

    report
}
