//! # WebSocket Ledger Subscriber
//!
//! Live logs via `eth_subscribe("logs", ...)`, block watermarks via
//! `eth_subscribe("newHeads")` and historical backfill via `eth_getLogs` over
//! the retrying HTTP transport.
//!
//! ## Gap-free handover
//!
//! 1. Open the socket and register the `newHeads` and `logs` subscriptions.
//! 2. Spawn the session task. It keeps reading the socket (answering pings,
//!    buffering live logs, noting new heads) while the backfill of
//!    `[since_block, H]` runs, `H` being the head read when backfill starts.
//! 3. When backfill finishes the session emits the backfilled logs, `Synced(H)`,
//!    then the buffered live logs above `H`, then goes live.
//!
//! A new head `n` means every log up to `n - 1` has been pushed. Reorged logs
//! (`removed: true`) are skipped. A socket error, a close frame or a failed
//! backfill ends the subscription with `LedgerNotification::Dropped`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U64;
use alloy_rpc_types_eth::{Filter, Log};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{Address, BlockHeight, Event, EventDecodeError, EventKind, LogPosition};
use so_01_resilient_transport::{LedgerRpc, RetryingRpc, TransportError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::domain::SubscribeError;
use crate::ports::{LedgerNotification, LedgerSubscriber, LiveSubscription, SubscriptionId};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;
type Backfill = BoxFuture<'static, Result<(BlockHeight, Vec<Event>), TransportError>>;

/// Blocks per `eth_getLogs` request.
const BACKFILL_CHUNK: u64 = 2_000;

/// How long to wait for the node to confirm `eth_subscribe`.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct WsRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct WsMessage {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<WsError>,
    method: Option<String>,
    params: Option<SubscriptionParams>,
}

#[derive(Debug, Deserialize)]
struct WsError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionParams {
    subscription: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
struct HeadNotice {
    number: U64,
}

/// Convert an RPC log into an [`Event`], resolving the kind from topic 0.
pub fn log_to_event(log: &Log) -> Result<Event, EventDecodeError> {
    let block_height = log
        .block_number
        .ok_or(EventDecodeError::Unmined("blockNumber"))?;
    let log_index = log.log_index.ok_or(EventDecodeError::Unmined("logIndex"))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or(EventDecodeError::Unmined("transactionHash"))?;
    Event::new(
        LogPosition {
            block_height,
            log_index,
        },
        transaction_hash,
        log.inner.data.clone(),
    )
}

// =============================================================================
// SUBSCRIBER
// =============================================================================

/// `LedgerSubscriber` backed by a node's WebSocket and HTTP endpoints.
pub struct WsLedgerSubscriber<R> {
    ws_url: String,
    contract: Address,
    rpc: Arc<RetryingRpc<R>>,
    request_id: AtomicU64,
    next_subscription: AtomicU64,
    stops: Mutex<HashMap<SubscriptionId, oneshot::Sender<()>>>,
}

impl<R: LedgerRpc + 'static> WsLedgerSubscriber<R> {
    /// Subscriber for logs emitted by `contract`.
    pub fn new(ws_url: impl Into<String>, contract: Address, rpc: Arc<RetryingRpc<R>>) -> Self {
        Self {
            ws_url: ws_url.into(),
            contract,
            rpc,
            request_id: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            stops: Mutex::new(HashMap::new()),
        }
    }

    fn connect_err(&self, reason: impl ToString) -> SubscribeError {
        SubscribeError::Connect {
            url: self.ws_url.clone(),
            reason: reason.to_string(),
        }
    }

    async fn register(
        &self,
        write: &mut WsWrite,
        read: &mut WsRead,
        kind: EventKind,
        params: Value,
    ) -> Result<String, SubscribeError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = WsRequest {
            jsonrpc: "2.0",
            method: "eth_subscribe",
            params,
            id,
        };
        let text = serde_json::to_string(&request).map_err(|e| self.connect_err(e))?;
        write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| self.connect_err(e))?;

        let confirmation = async {
            while let Some(msg) = read.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(_) => continue,
                    Err(e) => return Err(self.connect_err(e)),
                };
                let Ok(reply) = serde_json::from_str::<WsMessage>(text.as_str()) else {
                    continue;
                };
                if reply.id != Some(id) {
                    continue;
                }
                if let Some(error) = reply.error {
                    return Err(SubscribeError::Rejected {
                        kind,
                        reason: error.message,
                    });
                }
                return match reply.result {
                    Some(Value::String(remote_id)) => Ok(remote_id),
                    other => Err(SubscribeError::Rejected {
                        kind,
                        reason: format!("unexpected subscription result {other:?}"),
                    }),
                };
            }
            Err(self.connect_err("socket closed before subscription was confirmed"))
        };

        tokio::time::timeout(SUBSCRIBE_TIMEOUT, confirmation)
            .await
            .map_err(|_| self.connect_err("timed out waiting for subscription confirmation"))?
    }
}

/// Every log of `kind` in `[since_block, head]`, plus `head`.
async fn backfill<R: LedgerRpc>(
    rpc: Arc<RetryingRpc<R>>,
    contract: Address,
    kind: EventKind,
    since_block: BlockHeight,
) -> Result<(BlockHeight, Vec<Event>), TransportError> {
    let head: u64 = rpc
        .call_as::<U64>("eth_blockNumber", json!([]))
        .await?
        .to();

    let mut events = Vec::new();
    let mut from = since_block;
    while from <= head {
        let to = from.saturating_add(BACKFILL_CHUNK - 1).min(head);
        let filter = Filter::new()
            .address(contract)
            .event_signature(kind.topic())
            .from_block(from)
            .to_block(to);
        let logs: Vec<Log> = rpc.call_as("eth_getLogs", json!([filter])).await?;

        for log in logs.iter().filter(|l| !l.removed) {
            match log_to_event(log) {
                Ok(event) => events.push(event),
                Err(e) => warn!(%kind, error = %e, "[so-02] Skipping undecodable backfill log"),
            }
        }
        from = match to.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    info!(%kind, since_block, head, delivered = events.len(), "[so-02] Backfill complete");
    Ok((head, events))
}

#[async_trait]
impl<R: LedgerRpc + 'static> LedgerSubscriber for WsLedgerSubscriber<R> {
    async fn subscribe(
        &self,
        kind: EventKind,
        since_block: BlockHeight,
    ) -> Result<LiveSubscription, SubscribeError> {
        let (stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| self.connect_err(e))?;
        let (mut write, mut read) = stream.split();

        let heads_id = self
            .register(&mut write, &mut read, kind, json!(["newHeads"]))
            .await?;
        let logs_id = self
            .register(
                &mut write,
                &mut read,
                kind,
                json!(["logs", { "address": self.contract, "topics": [kind.topic()] }]),
            )
            .await?;

        let (sender, notifications) = mpsc::unbounded_channel();
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stops.lock().insert(id, stop_tx);

        let session = Session {
            kind,
            logs_id,
            heads_id,
            write,
            read,
            sender,
            phase: Phase::Backfilling {
                buffered: Vec::new(),
                newest_head: None,
            },
            unsubscribe_id: self.request_id.fetch_add(2, Ordering::SeqCst),
        };
        let backfill = backfill(self.rpc.clone(), self.contract, kind, since_block).boxed();
        tokio::spawn(session.run(backfill, stop_rx));

        debug!(%kind, subscription = %id, since_block, "[so-02] Live subscription registered");
        Ok(LiveSubscription {
            id,
            kind,
            notifications,
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        match self.stops.lock().remove(&id) {
            Some(stop) => {
                let _ = stop.send(());
            }
            None => debug!(subscription = %id, "[so-02] Unsubscribe for unknown subscription"),
        }
    }
}

// =============================================================================
// SESSION TASK
// =============================================================================

enum Phase {
    Backfilling {
        buffered: Vec<Event>,
        newest_head: Option<BlockHeight>,
    },
    Live {
        floor: BlockHeight,
    },
}

struct Session {
    kind: EventKind,
    logs_id: String,
    heads_id: String,
    write: WsWrite,
    read: WsRead,
    sender: mpsc::UnboundedSender<LedgerNotification>,
    phase: Phase,
    unsubscribe_id: u64,
}

impl Session {
    async fn run(mut self, mut backfill: Backfill, mut stop: oneshot::Receiver<()>) {
        loop {
            let backfilling = matches!(self.phase, Phase::Backfilling { .. });
            tokio::select! {
                biased;
                _ = &mut stop => {
                    self.shutdown().await;
                    return;
                }
                result = &mut backfill, if backfilling => match result {
                    Ok((head, events)) => self.go_live(head, events),
                    Err(e) => {
                        self.drop_with(format!("backfill failed: {e}"));
                        self.shutdown().await;
                        return;
                    }
                },
                msg = self.read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = self.write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        self.drop_with(format!("socket closed by node: {frame:?}"));
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.drop_with(e.to_string());
                        return;
                    }
                    None => {
                        self.drop_with("socket stream ended".to_string());
                        return;
                    }
                },
            }
        }
    }

    fn go_live(&mut self, head: BlockHeight, events: Vec<Event>) {
        let previous = std::mem::replace(&mut self.phase, Phase::Live { floor: head });
        for event in events {
            self.emit(LedgerNotification::Log(event));
        }
        self.emit(LedgerNotification::Synced(head));

        if let Phase::Backfilling {
            buffered,
            newest_head,
        } = previous
        {
            for event in buffered.into_iter().filter(|e| e.block_height > head) {
                self.emit(LedgerNotification::Log(event));
            }
            if let Some(complete) = newest_head.and_then(|h| h.checked_sub(1)) {
                if complete > head {
                    self.emit(LedgerNotification::Synced(complete));
                }
            }
        }
        debug!(kind = %self.kind, head, "[so-02] Backfill handed over to live logs");
    }

    fn handle_text(&mut self, text: &str) {
        let Ok(message) = serde_json::from_str::<WsMessage>(text) else {
            return;
        };
        if message.method.as_deref() != Some("eth_subscription") {
            return;
        }
        let Some(params) = message.params else {
            return;
        };

        if params.subscription == self.heads_id {
            match serde_json::from_value::<HeadNotice>(params.result) {
                Ok(head) => self.on_head(head.number.to()),
                Err(e) => warn!(kind = %self.kind, error = %e, "[so-02] Skipping malformed head"),
            }
        } else if params.subscription == self.logs_id {
            let log: Log = match serde_json::from_value(params.result) {
                Ok(log) => log,
                Err(e) => {
                    warn!(kind = %self.kind, error = %e, "[so-02] Skipping malformed live log");
                    return;
                }
            };
            if log.removed {
                debug!(kind = %self.kind, block = ?log.block_number, "[so-02] Skipping reorged log");
                return;
            }
            match log_to_event(&log) {
                Ok(event) => self.on_log(event),
                Err(e) => {
                    warn!(kind = %self.kind, error = %e, "[so-02] Skipping undecodable live log")
                }
            }
        }
    }

    fn on_log(&mut self, event: Event) {
        let floor = match &mut self.phase {
            Phase::Backfilling { buffered, .. } => {
                buffered.push(event);
                return;
            }
            Phase::Live { floor } => *floor,
        };
        if event.block_height > floor {
            self.emit(LedgerNotification::Log(event));
        }
    }

    fn on_head(&mut self, number: BlockHeight) {
        if let Phase::Backfilling { newest_head, .. } = &mut self.phase {
            *newest_head = Some(newest_head.map_or(number, |h| h.max(number)));
            return;
        }
        if let Some(complete) = number.checked_sub(1) {
            self.emit(LedgerNotification::Synced(complete));
        }
    }

    fn emit(&self, notification: LedgerNotification) {
        let _ = self.sender.send(notification);
    }

    fn drop_with(&self, reason: String) {
        warn!(kind = %self.kind, %reason, "[so-02] Live subscription dropped");
        self.emit(LedgerNotification::Dropped(reason));
    }

    async fn shutdown(&mut self) {
        let remote_ids = [self.logs_id.clone(), self.heads_id.clone()];
        for (offset, remote_id) in (0u64..).zip(remote_ids) {
            let request = WsRequest {
                jsonrpc: "2.0",
                method: "eth_unsubscribe",
                params: json!([remote_id]),
                id: self.unsubscribe_id + offset,
            };
            if let Ok(text) = serde_json::to_string(&request) {
                let _ = self.write.send(Message::Text(text.into())).await;
            }
        }
        let _ = self.write.close().await;
        debug!(kind = %self.kind, "[so-02] Live subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{B256, U256};
    use so_01_resilient_transport::{AttemptError, MockLedgerRpc, ResilientTransport, RetryPolicy};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn contract() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn rpc_log(kind: EventKind, block: u64, amount: u64, removed: bool) -> Log {
        Log {
            inner: alloy_primitives::Log {
                address: contract(),
                data: kind.amount_log(U256::from(amount)).unwrap(),
            },
            block_hash: None,
            block_number: Some(block),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(block as u8)),
            transaction_index: None,
            log_index: Some(0),
            removed,
        }
    }

    fn log_json(kind: EventKind, block: u64, amount: u64, removed: bool) -> Value {
        serde_json::to_value(rpc_log(kind, block, amount, removed)).unwrap()
    }

    fn head_json(number: u64) -> Value {
        json!({ "number": format!("{number:#x}"), "hash": B256::repeat_byte(number as u8) })
    }

    fn rpc(mock: MockLedgerRpc, policy: RetryPolicy) -> Arc<RetryingRpc<MockLedgerRpc>> {
        Arc::new(RetryingRpc::new(mock, ResilientTransport::new(policy)))
    }

    fn rpc_with_head(head: u64, backfill: Vec<Value>) -> Arc<RetryingRpc<MockLedgerRpc>> {
        let mock = MockLedgerRpc::new();
        mock.respond("eth_blockNumber", json!(format!("{head:#x}")));
        mock.respond("eth_getLogs", Value::Array(backfill));
        rpc(mock, RetryPolicy::no_retry())
    }

    fn notification(subscription: &str, result: Value) -> Message {
        let note = json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {"subscription": subscription, "result": result},
        });
        Message::Text(note.to_string().into())
    }

    async fn confirm(ws: &mut WebSocketStream<TcpStream>, remote_id: &str) -> Value {
        let request = ws.next().await.unwrap().unwrap();
        let request: Value = serde_json::from_str(request.to_text().unwrap()).unwrap();
        assert_eq!(request["method"], "eth_subscribe");
        let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": remote_id});
        ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        request
    }

    /// Node that confirms both subscriptions, sends the `live` log and `heads`
    /// notifications, then reports the next client frame on `seen`.
    async fn spawn_node(
        live: Vec<Value>,
        heads: Vec<u64>,
        close_after: bool,
    ) -> (String, oneshot::Receiver<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let heads_request = confirm(&mut ws, "0xheads").await;
            assert_eq!(heads_request["params"][0], "newHeads");
            let logs_request = confirm(&mut ws, "0xsub1").await;
            assert_eq!(logs_request["params"][0], "logs");

            for log in live {
                ws.send(notification("0xsub1", log)).await.unwrap();
            }
            for number in heads {
                ws.send(notification("0xheads", head_json(number))).await.unwrap();
            }

            if close_after {
                let _ = ws.close(None).await;
                return;
            }
            while let Some(Ok(msg)) = ws.next().await {
                if let Ok(text) = msg.to_text() {
                    if let Ok(value) = serde_json::from_str::<Value>(text) {
                        let _ = seen_tx.send(value);
                        return;
                    }
                }
            }
        });

        (format!("ws://{addr}"), seen_rx)
    }

    #[test]
    fn test_log_decodes_into_event() {
        let log: Log =
            serde_json::from_value(log_json(EventKind::RewardsSwept, 0x1f, 5, false)).unwrap();
        let event = log_to_event(&log).unwrap();
        assert_eq!(event.kind, EventKind::RewardsSwept);
        assert_eq!(event.block_height, 31);
        assert_eq!(event.transaction_hash, B256::repeat_byte(0x1f));
        assert_eq!(event.amount().unwrap(), U256::from(5));
    }

    #[test]
    fn test_pending_log_is_rejected() {
        let mut log = rpc_log(EventKind::RewardsSwept, 4, 1, false);
        log.block_number = None;
        assert_eq!(
            log_to_event(&log).unwrap_err(),
            EventDecodeError::Unmined("blockNumber")
        );
    }

    #[tokio::test]
    async fn test_backfill_then_live_without_gap_or_overlap() {
        let (url, _seen) = spawn_node(
            vec![
                // At or below the backfilled head: already delivered.
                log_json(EventKind::RewardsSwept, 5, 50, false),
                log_json(EventKind::RewardsSwept, 6, 60, true),
                log_json(EventKind::RewardsSwept, 7, 70, false),
            ],
            vec![9],
            true,
        )
        .await;
        let rpc = rpc_with_head(5, vec![log_json(EventKind::RewardsSwept, 3, 30, false)]);
        let subscriber = WsLedgerSubscriber::new(url, contract(), rpc.clone());

        let mut live = subscriber.subscribe(EventKind::RewardsSwept, 2).await.unwrap();

        let mut seen = Vec::new();
        let reason = loop {
            match live.notifications.recv().await.unwrap() {
                LedgerNotification::Log(event) => seen.push(format!("log {}", event.block_height)),
                LedgerNotification::Synced(block) => seen.push(format!("synced {block}")),
                LedgerNotification::Dropped(reason) => break reason,
            }
        };
        assert_eq!(seen, vec!["log 3", "synced 5", "log 7", "synced 8"]);
        assert!(reason.contains("closed"));

        let get_logs = rpc
            .inner()
            .calls()
            .into_iter()
            .find(|(m, _)| m == "eth_getLogs")
            .unwrap()
            .1;
        assert_eq!(get_logs[0]["fromBlock"], "0x2");
        assert_eq!(get_logs[0]["toBlock"], "0x5");
    }

    #[tokio::test]
    async fn test_socket_is_served_while_backfill_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (pong_tx, pong_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            confirm(&mut ws, "0xheads").await;
            confirm(&mut ws, "0xsub1").await;

            ws.send(Message::Ping(vec![7u8].into())).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if matches!(msg, Message::Pong(_)) {
                    let _ = pong_tx.send(());
                    break;
                }
            }
            // Hold the socket open until the client leaves.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mock = MockLedgerRpc::new();
        mock.respond("eth_blockNumber", json!("0x5"));
        mock.fail_next("eth_getLogs", 2, AttemptError::Failure("node busy".into()));
        mock.respond(
            "eth_getLogs",
            json!([log_json(EventKind::StakeDeposited, 3, 1, false)]),
        );
        let rpc = rpc(mock, RetryPolicy::new(3, Duration::from_millis(300)));
        let subscriber = WsLedgerSubscriber::new(format!("ws://{addr}"), contract(), rpc.clone());

        let mut live = subscriber.subscribe(EventKind::StakeDeposited, 0).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), pong_rx)
            .await
            .unwrap()
            .unwrap();
        // The ping was answered before backfill produced anything.
        assert!(live.notifications.try_recv().is_err());

        match live.notifications.recv().await.unwrap() {
            LedgerNotification::Log(event) => assert_eq!(event.block_height, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(live.notifications.recv().await, Some(LedgerNotification::Synced(5)));
        assert_eq!(rpc.inner().call_count("eth_getLogs"), 3);
        subscriber.unsubscribe(live.id);
    }

    #[tokio::test]
    async fn test_failed_backfill_drops_subscription() {
        let (url, _seen) = spawn_node(vec![], vec![], false).await;
        let mock = MockLedgerRpc::new();
        mock.fail_always("eth_blockNumber", AttemptError::Failure("down".into()));
        let subscriber = WsLedgerSubscriber::new(url, contract(), rpc(mock, RetryPolicy::no_retry()));

        let mut live = subscriber.subscribe(EventKind::RewardsSwept, 0).await.unwrap();
        match live.notifications.recv().await.unwrap() {
            LedgerNotification::Dropped(reason) => assert!(reason.starts_with("backfill failed")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_sends_eth_unsubscribe() {
        let (url, seen) = spawn_node(vec![], vec![], false).await;
        let subscriber = WsLedgerSubscriber::new(url, contract(), rpc_with_head(0, vec![]));

        let mut live = subscriber.subscribe(EventKind::StakeDeposited, 1).await.unwrap();
        subscriber.unsubscribe(live.id);

        let frame = seen.await.unwrap();
        assert_eq!(frame["method"], "eth_unsubscribe");
        assert_eq!(frame["params"][0], "0xsub1");
        // Normal completion: channel closes without a Dropped notification.
        while let Some(note) = live.notifications.recv().await {
            assert!(!matches!(note, LedgerNotification::Dropped(_)));
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let subscriber =
            WsLedgerSubscriber::new(format!("ws://{addr}"), contract(), rpc_with_head(0, vec![]));
        let err = subscriber.subscribe(EventKind::StakeDeposited, 0).await.unwrap_err();
        assert!(matches!(err, SubscribeError::Connect { .. }));
    }
}
