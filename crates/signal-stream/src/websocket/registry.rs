//! 연결 레지스트리.
//!
//! 연결 ID에서 연결 상태로의 권위 있는 맵입니다.
//! - 연결별 구독 토픽 집합
//! - 생존 확인 메타데이터 (alive, lastPingAt, lastActivityAt)
//! - 연결별 제한된 송신 큐의 송신 측
//!
//! 맵은 `DashMap`으로 샤드 단위 잠금을 사용하며, 디스패처는 스냅샷(`Arc` 복제본 목록)을
//! 순회하므로 팬아웃 동안 맵 잠금을 잡지 않습니다.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeZone, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use super::messages::Outbound;
use super::topics::{TopicSet, MAX_SUBSCRIPTIONS_PER_CONNECTION, WILDCARD};
use crate::error::{StreamError, StreamResult};
use crate::metrics::{decrement_active_connections, increment_active_connections};

/// 연결 고유 ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// 새 고유 ID를 생성합니다.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 연결 상태 머신: `Connecting → Open → Closing → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionPhase {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

/// 하나의 구독자 연결.
///
/// 구독 집합은 해당 연결의 메시지로만 변경됩니다.
/// 송신 큐의 수신 측은 연결 핸들러가 소유하며, 디스패처는 큐에 넣기만 합니다.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    connected_at: DateTime<Utc>,
    subscriptions: RwLock<HashSet<String>>,
    alive: AtomicBool,
    last_ping_at: AtomicI64,
    last_activity_at: AtomicI64,
    sender: mpsc::Sender<Outbound>,
    phase: AtomicU8,
    close: CancellationToken,
    dropped: AtomicU64,
}

impl Connection {
    /// 새 연결을 만듭니다. `close`는 강제 종료 신호로 사용됩니다.
    pub fn new(id: ConnectionId, sender: mpsc::Sender<Outbound>, close: CancellationToken) -> Self {
        let now = Utc::now();
        Self {
            id,
            connected_at: now,
            subscriptions: RwLock::new(HashSet::new()),
            alive: AtomicBool::new(true),
            last_ping_at: AtomicI64::new(0),
            last_activity_at: AtomicI64::new(now.timestamp_millis()),
            sender,
            phase: AtomicU8::new(ConnectionPhase::Connecting as u8),
            close,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    // ==================== 상태 전이 ====================

    pub fn phase(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.phase() == ConnectionPhase::Open
    }

    /// `Connecting → Open`.
    pub fn mark_open(&self) -> bool {
        self.transition(ConnectionPhase::Connecting, ConnectionPhase::Open)
    }

    /// `Open`(또는 `Connecting`) `→ Closing`. 한 번만 성공합니다.
    pub fn begin_close(&self) -> bool {
        self.transition(ConnectionPhase::Open, ConnectionPhase::Closing)
            || self.transition(ConnectionPhase::Connecting, ConnectionPhase::Closing)
    }

    /// `→ Closed` (종료 상태).
    pub fn mark_closed(&self) {
        self.phase.store(ConnectionPhase::Closed as u8, Ordering::Release);
    }

    fn transition(&self, from: ConnectionPhase, to: ConnectionPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 연결 강제 종료 토큰.
    pub fn close_token(&self) -> &CancellationToken {
        &self.close
    }

    /// 핸들러에 강제 종료를 요청합니다 (생존 확인 퇴출, 서버 종료).
    pub fn force_close(&self) {
        self.close.cancel();
    }

    // ==================== 구독 ====================

    fn read_subscriptions(&self) -> RwLockReadGuard<'_, HashSet<String>> {
        match self.subscriptions.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!(id = %self.id, "Subscription lock poisoned (read), recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_subscriptions(&self) -> RwLockWriteGuard<'_, HashSet<String>> {
        match self.subscriptions.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!(id = %self.id, "Subscription lock poisoned (write), recovering");
                poisoned.into_inner()
            }
        }
    }

    /// 상한 안에서 구독을 추가합니다. 이미 구독 중인 토픽은 상한에 걸리지 않습니다.
    pub(crate) fn add_subscription(&self, topic: &str, limit: usize) -> StreamResult<bool> {
        let mut subscriptions = self.write_subscriptions();
        if subscriptions.contains(topic) {
            return Ok(false);
        }
        if subscriptions.len() >= limit {
            return Err(StreamError::SubscriptionLimit { id: self.id, limit });
        }
        Ok(subscriptions.insert(topic.to_string()))
    }

    pub(crate) fn remove_subscription(&self, topic: &str) -> bool {
        self.write_subscriptions().remove(topic)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.read_subscriptions().contains(topic)
    }

    /// 와일드카드이거나 토픽 중 하나라도 구독 중이면 `true`.
    pub fn matches(&self, topics: &TopicSet) -> bool {
        let subscriptions = self.read_subscriptions();
        subscriptions.contains(WILDCARD) || topics.iter().any(|t| subscriptions.contains(t))
    }

    /// 구독 중인 토픽 (정렬됨).
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.read_subscriptions().iter().cloned().collect();
        topics.sort();
        topics
    }

    // ==================== 생존 확인 ====================

    /// pong 수신: 살아 있음으로 표시.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
        self.touch();
    }

    /// 마지막 활동 시각을 갱신합니다.
    pub fn touch(&self) {
        self.last_activity_at.store(now_millis(), Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// alive 값을 `false`로 바꾸고 이전 값을 반환합니다.
    pub(crate) fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// 보내지 못한 ping 주기를 되돌립니다. 활동 시각은 바꾸지 않습니다.
    pub(crate) fn restore_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    pub(crate) fn record_ping(&self) {
        self.last_ping_at.store(now_millis(), Ordering::Release);
    }

    pub fn last_ping_at(&self) -> Option<DateTime<Utc>> {
        from_millis(self.last_ping_at.load(Ordering::Acquire))
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        from_millis(self.last_activity_at.load(Ordering::Acquire))
    }

    // ==================== 송신 ====================

    /// 송신 큐에 논블로킹으로 넣습니다. 가득 차면 이 연결에 대해서만 폐기합니다.
    pub fn try_enqueue(&self, message: Outbound) -> StreamResult<()> {
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(StreamError::QueueFull(self.id))
            }
            Err(TrySendError::Closed(_)) => Err(StreamError::QueueClosed(self.id)),
        }
    }

    /// 큐가 가득 차 폐기된 메시지 수.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// 활성 연결 레지스트리.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 빈 구독 집합을 가진 연결을 등록합니다. 중복 ID는 거부합니다.
    pub fn register(&self, connection: Arc<Connection>) -> StreamResult<ConnectionId> {
        let id = connection.id();
        match self.connections.entry(id) {
            Entry::Occupied(_) => return Err(StreamError::DuplicateConnection(id)),
            Entry::Vacant(slot) => {
                slot.insert(connection);
            }
        }
        increment_active_connections();
        Ok(id)
    }

    /// 연결을 제거합니다. ID가 없으면 아무 일도 하지 않습니다.
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(&id).map(|(_, conn)| conn);
        match removed {
            Some(_) => decrement_active_connections(),
            None => debug!(%id, "Unregister ignored, connection already removed"),
        }
        removed
    }

    /// 등록된 연결을 조회합니다.
    pub fn get(&self, id: ConnectionId) -> StreamResult<Arc<Connection>> {
        self.connections
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StreamError::ConnectionNotFound(id))
    }

    /// 토픽을 구독합니다. 새로 추가되면 `Ok(true)`.
    ///
    /// 동시에 종료된 연결이면 debug 로그만 남기고 `Ok(false)`를 반환합니다.
    /// 구독 수가 `MAX_SUBSCRIPTIONS_PER_CONNECTION`에 도달하면 `SubscriptionLimit` 에러.
    pub fn subscribe(&self, id: ConnectionId, topic: &str) -> StreamResult<bool> {
        match self.get(id) {
            Ok(conn) => conn.add_subscription(topic, MAX_SUBSCRIPTIONS_PER_CONNECTION),
            Err(e) => {
                debug!(error = %e, topic, "Subscribe ignored");
                Ok(false)
            }
        }
    }

    /// 토픽 구독을 해제합니다. 구독 중이 아니었으면 `false`.
    pub fn unsubscribe(&self, id: ConnectionId, topic: &str) -> bool {
        match self.get(id) {
            Ok(conn) => conn.remove_subscription(topic),
            Err(e) => {
                debug!(error = %e, topic, "Unsubscribe ignored");
                false
            }
        }
    }

    /// 현재 연결의 스냅샷. 반환 이후 추가/제거된 연결은 반영되지 않습니다.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|entry| entry.value().clone()).collect()
    }

    /// 토픽을 직접 구독 중인 연결 (와일드카드 제외).
    pub fn connections_for_topic(&self, topic: &str) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_subscribed(topic))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn count_by_topic(&self, topic: &str) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_subscribed(topic))
            .count()
    }

    /// 토픽별 구독자 수.
    pub fn topic_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.connections.iter() {
            for topic in entry.value().subscriptions() {
                *counts.entry(topic).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn total_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
