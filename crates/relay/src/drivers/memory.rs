use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::error::TransportError;
use crate::traits::{Bus, Consumer, Publisher, RawMessage};

pub const DEFAULT_RETENTION: usize = 1000;

/// In-process bus with per-topic append-only logs and per-group committed
/// offsets. A message that was fetched but not committed is handed out
/// again on the consumer's next fetch.
///
/// Topics with consumer groups keep only what some group has not committed
/// yet. Topics nobody consumes (the response topic) keep the newest
/// `retention` messages.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

struct Inner {
    topics: Mutex<HashMap<String, TopicLog>>,
    // (group, topic) -> 下一个未提交的 offset
    committed: Mutex<HashMap<(String, String), u64>>,
    notify: Notify,
    closed: AtomicBool,
    retention: usize,
}

#[derive(Default)]
struct TopicLog {
    // 队首消息的 offset
    base: u64,
    messages: VecDeque<RawMessage>,
}

impl TopicLog {
    fn next_offset(&self) -> u64 {
        self.base + self.messages.len() as u64
    }

    fn drop_before(&mut self, offset: u64) {
        while self.base < offset && self.messages.pop_front().is_some() {
            self.base += 1;
        }
    }

    fn first_from(&self, offset: u64) -> Option<&RawMessage> {
        let skip = offset.saturating_sub(self.base) as usize;
        self.messages.get(skip)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                committed: Mutex::new(HashMap::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                retention: retention.max(1),
            }),
        }
    }

    pub fn append(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<u64, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let consumed = self.has_groups(topic);
        let offset = {
            let mut topics = lock(&self.inner.topics);
            let log = topics.entry(topic.to_string()).or_default();
            let offset = log.next_offset();
            log.messages.push_back(RawMessage {
                topic: topic.to_string(),
                offset,
                key: key.map(<[u8]>::to_vec),
                payload: payload.to_vec(),
            });
            if !consumed && log.messages.len() > self.inner.retention {
                let keep_from = log.next_offset() - self.inner.retention as u64;
                log.drop_before(keep_from);
            }
            offset
        };
        self.inner.notify.notify_waiters();
        Ok(offset)
    }

    /// Up to `limit` retained messages of `topic` starting at `from`, in
    /// offset order. Offsets already dropped are skipped.
    pub fn read(&self, topic: &str, from: u64, limit: usize) -> Vec<RawMessage> {
        lock(&self.inner.topics)
            .get(topic)
            .map(|log| {
                let skip = from.saturating_sub(log.base) as usize;
                log.messages.iter().skip(skip).take(limit).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn committed_offset(&self, group: &str, topic: &str) -> u64 {
        lock(&self.inner.committed)
            .get(&(group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn memory_consumer(&self, group: &str, topic: &str) -> MemoryConsumer {
        let position = *lock(&self.inner.committed)
            .entry((group.to_string(), topic.to_string()))
            .or_insert(0);
        MemoryConsumer {
            position,
            bus: self.clone(),
            group: group.to_string(),
            topic: topic.to_string(),
            in_flight: None,
        }
    }

    fn has_groups(&self, topic: &str) -> bool {
        lock(&self.inner.committed).keys().any(|(_, t)| t == topic)
    }

    fn next_from(&self, topic: &str, offset: u64) -> Option<RawMessage> {
        lock(&self.inner.topics)
            .get(topic)
            .and_then(|log| log.first_from(offset).cloned())
    }

    fn commit_offset(&self, group: &str, topic: &str, next: u64) {
        let low_water = {
            let mut committed = lock(&self.inner.committed);
            let entry = committed
                .entry((group.to_string(), topic.to_string()))
                .or_insert(0);
            *entry = (*entry).max(next);
            committed
                .iter()
                .filter(|((_, t), _)| t == topic)
                .map(|(_, offset)| *offset)
                .min()
                .unwrap_or(next)
        };
        // 所有 group 都已提交的前缀不再需要
        if let Some(log) = lock(&self.inner.topics).get_mut(topic) {
            log.drop_before(low_water);
        }
    }
}

impl Bus for MemoryBus {
    fn consumer(&self, group: &str, topic: &str) -> Box<dyn Consumer> {
        Box::new(self.memory_consumer(group, topic))
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Publisher for MemoryBus {
    async fn publish(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransportError> {
        self.append(topic, key, payload).map(|_| ())
    }

    async fn close(&self) {
        MemoryBus::close(self);
    }
}

pub struct MemoryConsumer {
    bus: MemoryBus,
    group: String,
    topic: String,
    position: u64,
    in_flight: Option<u64>,
}

impl MemoryConsumer {
    fn try_next(&mut self) -> Option<RawMessage> {
        // 未提交的消息优先重投
        if let Some(offset) = self.in_flight {
            if offset < self.position {
                debug!(topic = %self.topic, offset, "Redelivering uncommitted message");
                self.position = offset;
            }
        }
        let msg = self.bus.next_from(&self.topic, self.position)?;
        self.in_flight = Some(msg.offset);
        self.position = msg.offset + 1;
        Some(msg)
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn fetch_next(&mut self, wait: Duration) -> Result<Option<RawMessage>, TransportError> {
        let deadline = Instant::now() + wait;
        let bus = self.bus.clone();
        loop {
            let notified = bus.inner.notify.notified();
            if bus.is_closed() {
                return Err(TransportError::Closed);
            }
            if let Some(msg) = self.try_next() {
                return Ok(Some(msg));
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn commit(&mut self, msg: &RawMessage) -> Result<(), TransportError> {
        if msg.topic != self.topic {
            return Err(TransportError::Commit(format!(
                "message from {} committed on consumer for {}",
                msg.topic, self.topic
            )));
        }
        self.bus.commit_offset(&self.group, &self.topic, msg.offset + 1);
        if self.in_flight == Some(msg.offset) {
            self.in_flight = None;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.in_flight = None;
    }
}
