//! 캐시
//!
//! 라우팅 테이블처럼 TTL이 있는 값을 키별로 보관합니다.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::error::{DriverError, DriverResult};

/// 캐시 키에 쓸 수 없는 문자
pub const RESERVED_KEY_CHARACTERS: &str = "{}()/\\@:";

/// 기본 최대 항목 수
pub const DEFAULT_CAPACITY: usize = 10_000;

fn validate_key(key: &str) -> DriverResult<()> {
    if key.chars().any(|c| RESERVED_KEY_CHARACTERS.contains(c)) {
        return Err(DriverError::InvalidCacheKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Cache - 캐시 트레이트
// ============================================================================

/// 키-값 캐시
pub trait Cache<V>: Send + Sync + fmt::Debug {
    /// 조회 (없거나 만료되면 `None`)
    fn get(&self, key: &str) -> DriverResult<Option<V>>;

    /// 저장 (`ttl`이 `None`이면 만료 없음)
    fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> DriverResult<()>;

    /// 삭제
    fn delete(&self, key: &str) -> DriverResult<()>;

    /// 전체 삭제
    fn clear(&self);
}

// ============================================================================
// InMemoryCache - 메모리 캐시
// ============================================================================

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
    seq: u64,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// 삽입 순서 (seq -> key)
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }
}

/// 메모리 캐시
///
/// 용량을 넘으면 가장 먼저 저장된 항목부터 밀어냅니다.
pub struct InMemoryCache<V> {
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

impl<V> InMemoryCache<V> {
    /// 기본 용량으로 생성
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// 용량 지정
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// 저장된 항목 수 (만료된 항목 포함)
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// 비어 있는지 확인
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for InMemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> Cache<V> for InMemoryCache<V> {
    fn get(&self, key: &str) -> DriverResult<Option<V>> {
        validate_key(key)?;
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry
                .expires_at
                .map_or(false, |expires_at| Instant::now() >= expires_at),
        };
        if expired {
            inner.remove(key);
            return Ok(None);
        }
        Ok(inner.entries.get(key).map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> DriverResult<()> {
        validate_key(key)?;
        let mut inner = self.inner.lock();
        inner.remove(key);

        while inner.entries.len() >= self.capacity {
            let Some((_, oldest)) = inner.order.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
            tracing::trace!(key = %oldest, "cache entry evicted");
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.to_string());
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
                seq,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> DriverResult<()> {
        validate_key(key)?;
        self.inner.lock().remove(key);
        Ok(())
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

impl<V> fmt::Debug for InMemoryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
