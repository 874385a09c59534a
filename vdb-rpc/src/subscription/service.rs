//! The live subscription engine: one mutex-guarded bucket map, a single
//! intake task draining the indexer channel, per-subscription backfill
//! tasks, and non-blocking fan-out everywhere. The mutex is never held
//! across a blocking send.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use alloy_primitives::B256;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    backfill::BackfillSource,
    params::SubscriptionParams,
    payload::{ConvertedPayload, SubscriptionPayload},
};

/// Buffer between the indexer and the engine's intake task. When the engine
/// falls behind, the indexer blocks on this channel rather than losing
/// payloads.
pub const PAYLOAD_CHAN_BUFFER_SIZE: usize = 2000;

/// The indexer→engine channel at its standard depth.
pub fn payload_channel() -> (
    flume::Sender<ConvertedPayload>,
    flume::Receiver<ConvertedPayload>,
) {
    flume::bounded(PAYLOAD_CHAN_BUFFER_SIZE)
}

/// One live subscriber: delivery channel plus the quit signal used at
/// teardown. Sends on both are always non-blocking.
#[derive(Clone)]
pub struct Subscription {
    pub id: String,
    payload_tx: flume::Sender<SubscriptionPayload>,
    quit_tx: flume::Sender<()>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        payload_tx: flume::Sender<SubscriptionPayload>,
        quit_tx: flume::Sender<()>,
    ) -> Self {
        Self {
            id: id.into(),
            payload_tx,
            quit_tx,
        }
    }

    /// Non-blocking delivery. `Ok(false)` means the buffer was full and the
    /// payload was dropped; `Err` means the subscriber is gone.
    fn send(&self, payload: SubscriptionPayload) -> Result<bool, ()> {
        match self.payload_tx.try_send(payload) {
            Ok(()) => Ok(true),
            Err(flume::TrySendError::Full(_)) => {
                info!(id = %self.id, "subscription buffer full; payload dropped");
                Ok(false)
            }
            Err(flume::TrySendError::Disconnected(_)) => Err(()),
        }
    }

    fn send_quit(&self) {
        let _ = self.quit_tx.try_send(());
    }
}

#[derive(Default)]
struct EngineState {
    /// type hash → subscription id → subscription
    subscriptions: HashMap<B256, HashMap<String, Subscription>>,
    /// type hash → the shared filter params of that bucket
    params: HashMap<B256, SubscriptionParams>,
}

impl EngineState {
    fn close_type(&mut self, ty: B256) {
        if let Some(bucket) = self.subscriptions.remove(&ty) {
            for subscription in bucket.values() {
                subscription.send_quit();
            }
        }
        self.params.remove(&ty);
    }
}

/// The engine. A process singleton shared behind `Arc`; all structural
/// changes and fan-out iteration happen under the one internal mutex.
pub struct SubscriptionService<B> {
    state: Mutex<EngineState>,
    source: Arc<B>,
    quit: AtomicBool,
}

impl<B: BackfillSource> SubscriptionService<B> {
    pub fn new(source: Arc<B>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState::default()),
            source,
            quit: AtomicBool::new(false),
        })
    }

    /// Spawns the single intake task draining the indexer→engine channel.
    /// The task never blocks on subscribers; backpressure falls on the
    /// channel itself.
    pub fn serve(self: &Arc<Self>, payloads: flume::Receiver<ConvertedPayload>) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            info!("subscription engine intake loop started");
            while let Ok(payload) = payloads.recv_async().await {
                if service.quit.load(Ordering::Relaxed) {
                    break;
                }
                service.filter_and_serve(&payload);
            }
            info!("subscription engine intake loop stopped");
        });
    }

    /// Registers a subscription and, when requested, launches its backfill
    /// task. A `backfill_only` subscription never joins the live buckets.
    pub fn subscribe(
        self: &Arc<Self>,
        id: impl Into<String>,
        payload_tx: flume::Sender<SubscriptionPayload>,
        quit_tx: flume::Sender<()>,
        params: SubscriptionParams,
    ) {
        let subscription = Subscription::new(id, payload_tx, quit_tx);
        info!(id = %subscription.id, "new subscription");
        let ty = params.type_hash();

        if !params.backfill_only {
            let mut state = self.state.lock();
            state
                .subscriptions
                .entry(ty)
                .or_default()
                .insert(subscription.id.clone(), subscription.clone());
            state.params.entry(ty).or_insert_with(|| params.clone());
        }

        if params.backfill || params.backfill_only {
            let service = Arc::clone(self);
            tokio::task::spawn_blocking(move || service.run_backfill(subscription, params));
        }
    }

    /// Removes the subscription from every bucket; a bucket emptied by the
    /// removal is dropped outright.
    pub fn unsubscribe(&self, id: &str) {
        info!(id, "unsubscribing");
        let mut state = self.state.lock();
        let mut emptied = Vec::new();
        for (ty, bucket) in state.subscriptions.iter_mut() {
            bucket.remove(id);
            if bucket.is_empty() {
                emptied.push(*ty);
            }
        }
        for ty in emptied {
            state.subscriptions.remove(&ty);
            state.params.remove(&ty);
        }
    }

    /// Stops the engine: quits every subscriber and clears all state.
    /// Idempotent, and never blocks on a slow subscriber.
    pub fn stop(&self) {
        info!("stopping subscription engine");
        self.quit.store(true, Ordering::Relaxed);
        let mut state = self.state.lock();
        for bucket in state.subscriptions.values() {
            for subscription in bucket.values() {
                subscription.send_quit();
            }
        }
        state.subscriptions.clear();
        state.params.clear();
    }

    /// One live payload: filter once per bucket under the mutex, then
    /// try-send to every member. Buckets whose end height has passed are
    /// closed; disconnected subscribers are dropped.
    pub fn filter_and_serve(&self, payload: &ConvertedPayload) {
        debug!(block = payload.block_number, "serving payload");
        let mut state = self.state.lock();

        let types: Vec<B256> = state.subscriptions.keys().copied().collect();
        for ty in types {
            let Some(params) = state.params.get(&ty).cloned() else {
                error!(?ty, "subscription bucket without params; closing");
                state.close_type(ty);
                continue;
            };
            if params.end > 0 && params.end < payload.block_number {
                state.close_type(ty);
                continue;
            }

            let response = params.filter(payload);
            let message = SubscriptionPayload::from_response(&response);

            let Some(bucket) = state.subscriptions.get_mut(&ty) else {
                continue;
            };
            let mut dead = Vec::new();
            for (id, subscription) in bucket.iter() {
                if subscription.send(message.clone()).is_err() {
                    dead.push(id.clone());
                }
            }
            for id in dead {
                warn!(id, "subscriber channel closed; dropping subscription");
                bucket.remove(&id);
            }
            if bucket.is_empty() {
                state.subscriptions.remove(&ty);
                state.params.remove(&ty);
            }
        }
    }

    /// The backfill loop: ascending block order over the intersection of the
    /// requested and indexed ranges, quit checked between blocks, per-block
    /// errors logged and skipped, completion signalled by sentinel.
    fn run_backfill(&self, subscription: Subscription, params: SubscriptionParams) {
        let (first, last) = match (
            self.source.first_block_number(),
            self.source.last_block_number(),
        ) {
            (Ok(first), Ok(last)) => (first as u64, last as u64),
            (Err(e), _) | (_, Err(e)) => {
                let _ = subscription.send(SubscriptionPayload::error(format!(
                    "backfill range lookup failed: {e}"
                )));
                subscription.send_quit();
                return;
            }
        };

        let start = params.start.max(first);
        let mut end = last;
        if params.end > 0 && params.end < end && params.end > start {
            end = params.end;
        }
        debug!(id = %subscription.id, start, end, "starting backfill");

        for number in start..=end {
            if self.quit.load(Ordering::Relaxed) {
                info!(id = %subscription.id, "backfill interrupted by shutdown");
                return;
            }
            let responses = match self.source.backfill_block(&params, number) {
                Ok(responses) => responses,
                Err(e) => {
                    warn!(block = number, "backfill retrieval error: {e}");
                    let _ = subscription.send(SubscriptionPayload::error(format!(
                        "retrieval error at block {number}: {e}"
                    )));
                    continue;
                }
            };
            for response in responses {
                if response.is_empty() {
                    continue;
                }
                if subscription
                    .send(SubscriptionPayload::from_response(&response))
                    .is_err()
                {
                    return;
                }
            }
        }

        let _ = subscription.send(SubscriptionPayload::backfill_complete());
    }
}

#[cfg(test)]
mod tests {
    use vdb_state::{Error, Result};

    use super::*;
    use crate::subscription::payload::{IpldsResponse, BACK_FILL_COMPLETE_FLAG};

    struct MockBackfill {
        first: i64,
        last: i64,
    }

    impl BackfillSource for MockBackfill {
        fn first_block_number(&self) -> Result<i64> {
            Ok(self.first)
        }

        fn last_block_number(&self) -> Result<i64> {
            Ok(self.last)
        }

        fn backfill_block(
            &self,
            _params: &SubscriptionParams,
            number: u64,
        ) -> Result<Vec<IpldsResponse>> {
            if number == 3 {
                // a bad block must not terminate the backfill
                return Err(Error::internal("corrupt block"));
            }
            Ok(vec![IpldsResponse {
                block_number: number,
                headers: vec![vec![number as u8]],
                ..Default::default()
            }])
        }
    }

    fn service(first: i64, last: i64) -> Arc<SubscriptionService<MockBackfill>> {
        SubscriptionService::new(Arc::new(MockBackfill { first, last }))
    }

    fn live_payload(number: u64) -> ConvertedPayload {
        ConvertedPayload {
            block_number: number,
            block_hash: format!("0x{number:x}"),
            total_difficulty: "1".into(),
            header_rlp: vec![0xc0, number as u8],
            uncles: vec![],
            transactions: vec![],
            receipts: vec![],
            state_nodes: vec![],
            storage_nodes: vec![],
        }
    }

    #[tokio::test]
    async fn identical_subscribers_receive_identical_bytes() {
        let service = service(1, 10);
        let (tx_a, rx_a) = flume::bounded(8);
        let (tx_b, rx_b) = flume::bounded(8);
        let (quit_a, _qa) = flume::bounded(1);
        let (quit_b, _qb) = flume::bounded(1);

        let params = SubscriptionParams::default();
        service.subscribe("a", tx_a, quit_a, params.clone());
        service.subscribe("b", tx_b, quit_b, params);

        service.filter_and_serve(&live_payload(5));

        let got_a = rx_a.recv().unwrap();
        let got_b = rx_b.recv().unwrap();
        assert_eq!(got_a.data, got_b.data);
        assert_eq!(got_a.height, 5);
    }

    #[tokio::test]
    async fn end_of_range_closes_the_bucket() {
        let service = service(1, 10);
        let (tx, rx) = flume::bounded(8);
        let (quit_tx, quit_rx) = flume::bounded(1);

        service.subscribe(
            "ranged",
            tx,
            quit_tx,
            SubscriptionParams {
                end: 5,
                ..Default::default()
            },
        );

        service.filter_and_serve(&live_payload(6));
        assert!(rx.try_recv().is_err());
        assert!(quit_rx.try_recv().is_ok());

        // the bucket is gone; later payloads do not resurrect it
        service.filter_and_serve(&live_payload(4));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_buffer_drops_payload_but_keeps_subscription() {
        let service = service(1, 10);
        let (tx, rx) = flume::bounded(1);
        let (quit_tx, _quit_rx) = flume::bounded(1);
        service.subscribe("slow", tx, quit_tx, SubscriptionParams::default());

        service.filter_and_serve(&live_payload(1));
        service.filter_and_serve(&live_payload(2)); // dropped: buffer full

        assert_eq!(rx.recv().unwrap().height, 1);
        assert!(rx.try_recv().is_err());

        service.filter_and_serve(&live_payload(3));
        assert_eq!(rx.recv().unwrap().height, 3);
    }

    #[tokio::test]
    async fn unsubscribe_and_stop_are_idempotent() {
        let service = service(1, 10);
        let (tx, _rx) = flume::bounded(8);
        let (quit_tx, _quit_rx) = flume::bounded(1);
        service.subscribe("once", tx, quit_tx, SubscriptionParams::default());

        service.unsubscribe("once");
        service.unsubscribe("once");
        service.stop();
        service.stop();
    }

    #[tokio::test]
    async fn backfill_delivers_ascending_then_sentinel() {
        let service = service(1, 5);
        let (tx, rx) = flume::unbounded();
        let (quit_tx, _quit_rx) = flume::bounded(1);

        service.subscribe(
            "historical",
            tx,
            quit_tx,
            SubscriptionParams {
                backfill_only: true,
                start: 2,
                end: 4,
                ..Default::default()
            },
        );

        let mut heights = Vec::new();
        loop {
            let payload = rx.recv_async().await.unwrap();
            if payload.flag == BACK_FILL_COMPLETE_FLAG {
                break;
            }
            if payload.err.is_empty() {
                heights.push(payload.height);
            }
        }
        // block 3 errored and was skipped; order stays ascending
        assert_eq!(heights, vec![2, 4]);
    }

    #[tokio::test]
    async fn backfill_only_subscription_gets_no_live_payloads() {
        let service = service(1, 2);
        let (tx, rx) = flume::unbounded();
        let (quit_tx, _quit_rx) = flume::bounded(1);
        service.subscribe(
            "historical",
            tx,
            quit_tx,
            SubscriptionParams {
                backfill_only: true,
                ..Default::default()
            },
        );

        // drain the backfill output first
        loop {
            let payload = rx.recv_async().await.unwrap();
            if payload.flag == BACK_FILL_COMPLETE_FLAG {
                break;
            }
        }

        service.filter_and_serve(&live_payload(9));
        assert!(rx.try_recv().is_err());
    }
}
