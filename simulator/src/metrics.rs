use crate::event::Kind;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Event {
    pub kind: String,
}

impl Event {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind: kind.as_str().to_string(),
        }
    }
}

/// Counters updated by the dispatcher.
#[derive(Debug, Default)]
pub struct Metrics {
    pub events: Family<Event, Counter>,
    pub events_skipped: Counter,
    pub transactions_generated: Counter,
    pub transactions_received: Counter,
    pub transactions_duplicate: Counter,
    pub transactions_skipped: Counter,
    pub blocks_mined: Counter,
    pub blocks_stale: Counter,
    pub blocks_received: Counter,
    pub blocks_duplicate: Counter,
    pub blocks_orphaned: Counter,
    pub blocks_invalid: Counter,
    pub tip_changes: Counter,
}

impl Metrics {
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "events_processed",
            "Number of events dispatched by kind",
            metrics.events.clone(),
        );
        registry.register(
            "events_skipped",
            "Number of events addressed to unknown peers",
            metrics.events_skipped.clone(),
        );
        registry.register(
            "transactions_generated",
            "Number of transactions created",
            metrics.transactions_generated.clone(),
        );
        registry.register(
            "transactions_received",
            "Number of transactions added to a mempool from a neighbor",
            metrics.transactions_received.clone(),
        );
        registry.register(
            "transactions_duplicate",
            "Number of transaction deliveries ignored as already seen",
            metrics.transactions_duplicate.clone(),
        );
        registry.register(
            "transactions_skipped",
            "Number of transaction attempts skipped because the peer had no balance",
            metrics.transactions_skipped.clone(),
        );
        registry.register(
            "blocks_mined",
            "Number of blocks created",
            metrics.blocks_mined.clone(),
        );
        registry.register(
            "blocks_stale",
            "Number of mining attempts discarded because the tip moved",
            metrics.blocks_stale.clone(),
        );
        registry.register(
            "blocks_received",
            "Number of blocks added to a view from a neighbor",
            metrics.blocks_received.clone(),
        );
        registry.register(
            "blocks_duplicate",
            "Number of block deliveries ignored as already known",
            metrics.blocks_duplicate.clone(),
        );
        registry.register(
            "blocks_orphaned",
            "Number of blocks received before their parent",
            metrics.blocks_orphaned.clone(),
        );
        registry.register(
            "blocks_invalid",
            "Number of received blocks rejected by validation",
            metrics.blocks_invalid.clone(),
        );
        registry.register(
            "tip_changes",
            "Number of times a peer adopted a received block as its tip",
            metrics.tip_changes.clone(),
        );
        metrics
    }
}
