use domain::protocol::ResponseEnvelope;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::codec;
use crate::error::TransportError;
use crate::traits::{CommandHandler, Consumer, Publisher, RawMessage};

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub group: String,
    pub list_topic: String,
    pub add_topic: String,
    pub response_topic: String,
    pub poll_interval: Duration,
    pub backoff: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            group: "comments".to_string(),
            list_topic: "comments_input".to_string(),
            add_topic: "add_comments".to_string(),
            response_topic: "comments".to_string(),
            poll_interval: Duration::from_millis(500),
            backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub published: u64,
    pub committed: u64,
    pub malformed: u64,
    pub publish_failures: u64,
    pub fetch_errors: u64,
}

/// Fetch → decode → dispatch → publish → commit, one message at a time.
/// The offset is committed only after the response is published, so a
/// failed publish leads to redelivery.
pub struct RelayLoop {
    name: String,
    consumer: Box<dyn Consumer>,
    publisher: Arc<dyn Publisher>,
    handler: Arc<dyn CommandHandler>,
    response_topic: String,
    poll_interval: Duration,
    backoff: Duration,
    state: LoopState,
    stats: RelayStats,
}

impl RelayLoop {
    pub fn new(
        name: impl Into<String>,
        consumer: Box<dyn Consumer>,
        publisher: Arc<dyn Publisher>,
        handler: Arc<dyn CommandHandler>,
        settings: &RelaySettings,
    ) -> Self {
        Self {
            name: name.into(),
            consumer,
            publisher,
            handler,
            response_topic: settings.response_topic.clone(),
            poll_interval: settings.poll_interval,
            backoff: settings.backoff,
            state: LoopState::Running,
            stats: RelayStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(mut self, cancel: CancellationToken) -> RelayStats {
        info!(relay = %self.name, "Relay loop started");

        while self.state == LoopState::Running {
            if cancel.is_cancelled() {
                self.transition(LoopState::Draining);
                break;
            }

            match self.consumer.fetch_next(self.poll_interval).await {
                Ok(Some(msg)) => {
                    if !self.process(msg).await {
                        pause(self.backoff, &cancel).await;
                    }
                }
                Ok(None) => {}
                Err(TransportError::Closed) => {
                    warn!(relay = %self.name, "Transport closed, stopping relay");
                    self.transition(LoopState::Draining);
                }
                Err(e) => {
                    if cancel.is_cancelled() {
                        self.transition(LoopState::Draining);
                        break;
                    }
                    self.stats.fetch_errors += 1;
                    error!(relay = %self.name, "Failed to read message: {}. Retrying...", e);
                    pause(self.backoff, &cancel).await;
                }
            }
        }

        self.consumer.close().await;
        self.transition(LoopState::Stopped);
        info!(relay = %self.name, stats = ?self.stats, "Relay loop stopped");
        self.stats
    }

    /// Returns false when the response could not be published.
    async fn process(&mut self, msg: RawMessage) -> bool {
        self.stats.received += 1;

        let envelope = match codec::decode(&msg.payload) {
            Ok(e) => e,
            Err(e) => {
                // 无法解析的消息重试也没用，直接提交丢弃
                self.stats.malformed += 1;
                warn!(relay = %self.name, offset = msg.offset, "Dropping message: {}", e);
                self.commit(&msg).await;
                return true;
            }
        };

        let reply = self.handler.handle(&envelope).await;
        let response = reply.into_response(&envelope.request_id);
        let payload = match self.encode(response) {
            Some(p) => p,
            None => {
                self.commit(&msg).await;
                return true;
            }
        };

        match self
            .publisher
            .publish(&self.response_topic, msg.key.as_deref(), &payload)
            .await
        {
            Ok(()) => {
                self.stats.published += 1;
                debug!(relay = %self.name, request_id = %envelope.request_id, "Response published");
                self.commit(&msg).await;
                true
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                error!(
                    relay = %self.name,
                    request_id = %envelope.request_id,
                    offset = msg.offset,
                    "Failed to send response, leaving message uncommitted: {}",
                    e
                );
                false
            }
        }
    }

    fn encode(&self, response: ResponseEnvelope) -> Option<Vec<u8>> {
        match codec::encode(&response) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(relay = %self.name, request_id = %response.request_id, "Failed to encode response: {}", e);
                let fallback = ResponseEnvelope::failure(response.request_id, 500, "internal error");
                match codec::encode(&fallback) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        error!(relay = %self.name, "Failed to encode fallback response: {}", e);
                        None
                    }
                }
            }
        }
    }

    async fn commit(&mut self, msg: &RawMessage) {
        match self.consumer.commit(msg).await {
            Ok(()) => self.stats.committed += 1,
            Err(e) => error!(relay = %self.name, offset = msg.offset, "Commit error: {}", e),
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!(relay = %self.name, from = ?self.state, to = ?next, "Relay state change");
        self.state = next;
    }
}

// 固定退避，关闭信号到来时立即返回
async fn pause(backoff: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(backoff) => {}
        _ = cancel.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::dispatcher_with;
    use crate::drivers::memory::MemoryBus;
    use crate::traits::Bus;
    use async_trait::async_trait;
    use domain::protocol::CommandEnvelope;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings() -> RelaySettings {
        RelaySettings {
            poll_interval: Duration::from_millis(20),
            backoff: Duration::from_millis(10),
            ..RelaySettings::default()
        }
    }

    fn command_bytes(request_id: &str, path: &str, method: &str, body: serde_json::Value) -> Vec<u8> {
        codec::encode_command(&CommandEnvelope {
            request_id: request_id.into(),
            path: path.into(),
            method: method.into(),
            body,
        })
        .unwrap()
    }

    async fn wait_for_responses(bus: &MemoryBus, topic: &str, n: usize) -> Vec<ResponseEnvelope> {
        for _ in 0..250 {
            let msgs = bus.read(topic, 0, 100);
            if msgs.len() >= n {
                return msgs
                    .iter()
                    .map(|m| codec::decode_response(&m.payload).unwrap())
                    .collect();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {} responses on {}", n, topic);
    }

    /// Fails the first `failures` publishes, then forwards to the bus.
    struct FlakyPublisher {
        bus: MemoryBus,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl Publisher for FlakyPublisher {
        async fn publish(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransportError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(TransportError::Publish("broker unavailable".into()));
            }
            self.bus.append(topic, key, payload).map(|_| ())
        }

        async fn close(&self) {}
    }

    /// Wraps a bus consumer; the first `fetch_failures` fetches and the
    /// first `commit_failures` commits fail.
    struct FlakyConsumer {
        inner: Box<dyn Consumer>,
        fetch_failures: usize,
        commit_failures: usize,
    }

    #[async_trait]
    impl Consumer for FlakyConsumer {
        async fn fetch_next(&mut self, wait: Duration) -> Result<Option<RawMessage>, TransportError> {
            if self.fetch_failures > 0 {
                self.fetch_failures -= 1;
                return Err(TransportError::Fetch("broker unreachable".into()));
            }
            self.inner.fetch_next(wait).await
        }

        async fn commit(&mut self, msg: &RawMessage) -> Result<(), TransportError> {
            if self.commit_failures > 0 {
                self.commit_failures -= 1;
                return Err(TransportError::Commit("rebalance in progress".into()));
            }
            self.inner.commit(msg).await
        }

        async fn close(&mut self) {
            self.inner.close().await;
        }
    }

    async fn wait_for_commit(bus: &MemoryBus, group: &str, topic: &str, offset: u64) {
        for _ in 0..250 {
            if bus.committed_offset(group, topic) >= offset {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("offset {} never committed on {}", offset, topic);
    }

    #[tokio::test]
    async fn relays_command_and_commits_after_publish() {
        let bus = MemoryBus::new();
        let s = settings();
        let (dispatcher, _db, _) = dispatcher_with(&[42]).await;
        bus.append(
            &s.add_topic,
            Some(b"k1"),
            &command_bytes("r1", "/comments", "POST", json!({ "text": "hi", "post_id": 42 })),
        )
        .unwrap();

        let relay = RelayLoop::new("add", bus.consumer(&s.group, &s.add_topic), bus.publisher(), Arc::new(dispatcher), &s);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relay.run(cancel.clone()));

        let responses = wait_for_responses(&bus, &s.response_topic, 1).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(responses[0].request_id, "r1");
        assert_eq!(responses[0].status, 201);
        assert_eq!(responses[0].data.as_ref().unwrap()["content"], "hi");
        assert_eq!(bus.read(&s.response_topic, 0, 10)[0].key.as_deref(), Some(&b"k1"[..]));
        assert_eq!(bus.committed_offset(&s.group, &s.add_topic), 1);
        assert_eq!(stats.published, 1);
        assert_eq!(stats.committed, 1);
    }

    #[tokio::test]
    async fn malformed_message_is_committed_without_response() {
        let bus = MemoryBus::new();
        let s = settings();
        let (dispatcher, _db, _) = dispatcher_with(&[1]).await;
        bus.append(&s.list_topic, None, b"{broken").unwrap();
        bus.append(&s.list_topic, None, &command_bytes("r2", "/comments", "GET", json!({ "news_id": "1" })))
            .unwrap();

        let relay = RelayLoop::new("list", bus.consumer(&s.group, &s.list_topic), bus.publisher(), Arc::new(dispatcher), &s);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relay.run(cancel.clone()));

        let responses = wait_for_responses(&bus, &s.response_topic, 1).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].request_id, "r2");
        assert_eq!(responses[0].status, 200);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.committed, 2);
        assert_eq!(bus.committed_offset(&s.group, &s.list_topic), 2);
    }

    #[tokio::test]
    async fn failed_publish_leaves_message_for_redelivery() {
        let bus = MemoryBus::new();
        let s = settings();
        let (dispatcher, _db, checker) = dispatcher_with(&[3]).await;
        bus.append(&s.list_topic, None, &command_bytes("r3", "/comments", "GET", json!({ "news_id": 3 })))
            .unwrap();

        let publisher = Arc::new(FlakyPublisher {
            bus: bus.clone(),
            failures: AtomicUsize::new(2),
        });
        let relay = RelayLoop::new("list", bus.consumer(&s.group, &s.list_topic), publisher, Arc::new(dispatcher), &s);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relay.run(cancel.clone()));

        let responses = wait_for_responses(&bus, &s.response_topic, 1).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].request_id, "r3");
        assert_eq!(stats.publish_failures, 2);
        assert_eq!(stats.received, 3);
        assert_eq!(stats.committed, 1);
        assert_eq!(checker.calls.load(Ordering::SeqCst), 3);
        assert_eq!(bus.committed_offset(&s.group, &s.list_topic), 1);
    }

    #[tokio::test]
    async fn fetch_errors_back_off_and_retry() {
        let bus = MemoryBus::new();
        let s = settings();
        let (dispatcher, _db, _) = dispatcher_with(&[5]).await;
        bus.append(&s.list_topic, None, &command_bytes("r5", "/comments", "GET", json!({ "news_id": 5 })))
            .unwrap();

        let consumer = FlakyConsumer {
            inner: bus.consumer(&s.group, &s.list_topic),
            fetch_failures: 3,
            commit_failures: 0,
        };
        let relay = RelayLoop::new("list", Box::new(consumer), bus.publisher(), Arc::new(dispatcher), &s);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relay.run(cancel.clone()));

        let responses = wait_for_responses(&bus, &s.response_topic, 1).await;
        wait_for_commit(&bus, &s.group, &s.list_topic, 1).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(responses[0].request_id, "r5");
        assert_eq!(responses[0].status, 200);
        assert_eq!(stats.fetch_errors, 3);
        assert_eq!(stats.published, 1);
        assert_eq!(stats.committed, 1);
    }

    #[tokio::test]
    async fn failed_commit_leads_to_redelivery() {
        let bus = MemoryBus::new();
        let s = settings();
        let (dispatcher, _db, checker) = dispatcher_with(&[6]).await;
        bus.append(&s.list_topic, None, &command_bytes("r6", "/comments", "GET", json!({ "news_id": 6 })))
            .unwrap();

        let consumer = FlakyConsumer {
            inner: bus.consumer(&s.group, &s.list_topic),
            fetch_failures: 0,
            commit_failures: 1,
        };
        let relay = RelayLoop::new("list", Box::new(consumer), bus.publisher(), Arc::new(dispatcher), &s);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relay.run(cancel.clone()));

        wait_for_commit(&bus, &s.group, &s.list_topic, 1).await;
        let responses = wait_for_responses(&bus, &s.response_topic, 2).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        // 至少一次：同一请求的响应发布了两次
        assert!(responses.iter().all(|r| r.request_id == "r6" && r.status == 200));
        assert_eq!(stats.received, 2);
        assert_eq!(stats.published, 2);
        assert_eq!(stats.committed, 1);
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_loop_does_not_fetch() {
        let bus = MemoryBus::new();
        let s = settings();
        let (dispatcher, _db, _) = dispatcher_with(&[1]).await;
        bus.append(&s.list_topic, None, &command_bytes("r4", "/comments", "GET", json!({ "news_id": 1 })))
            .unwrap();

        let relay = RelayLoop::new("list", bus.consumer(&s.group, &s.list_topic), bus.publisher(), Arc::new(dispatcher), &s);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = relay.run(cancel).await;

        assert_eq!(stats, RelayStats::default());
        assert!(bus.read(&s.response_topic, 0, 10).is_empty());
    }

    #[tokio::test]
    async fn closed_transport_stops_loop() {
        let bus = MemoryBus::new();
        let s = settings();
        let (dispatcher, _db, _) = dispatcher_with(&[]).await;
        let relay = RelayLoop::new("list", bus.consumer(&s.group, &s.list_topic), bus.publisher(), Arc::new(dispatcher), &s);

        bus.close();
        let stats = tokio::time::timeout(Duration::from_secs(1), relay.run(CancellationToken::new()))
            .await
            .unwrap();
        assert_eq!(stats.fetch_errors, 0);
    }
}
