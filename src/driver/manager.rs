//! 풀 매니저
//!
//! 호스트별 풀, 세마포어 레지스트리, 라우팅 테이블 캐시를 한곳에서 소유합니다.
//! 같은 매니저를 쓰는 드라이버들은 이 상태를 모두 공유합니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::cache::{Cache, InMemoryCache};
use super::driver::ServerAddress;
use super::pool::{ConnectionPool, PoolKey, PoolSettings};
use super::routing::RoutingTable;
use super::semaphore::{SemaphoreRegistry, SemaphoreStrategy};

/// 풀 매니저
pub struct PoolManager {
    semaphores: SemaphoreRegistry,
    /// 세마포어 키별 풀 목록
    pools: Mutex<HashMap<String, Vec<ConnectionPool>>>,
    routing_cache: Arc<dyn Cache<RoutingTable>>,
}

impl PoolManager {
    /// 세마포어 전략을 지정해 생성
    pub fn new(strategy: SemaphoreStrategy) -> Self {
        Self::with_routing_cache(strategy, Arc::new(InMemoryCache::new()))
    }

    /// 라우팅 테이블 캐시를 지정해 생성
    pub fn with_routing_cache(
        strategy: SemaphoreStrategy,
        routing_cache: Arc<dyn Cache<RoutingTable>>,
    ) -> Self {
        Self {
            semaphores: SemaphoreRegistry::new(strategy),
            pools: Mutex::new(HashMap::new()),
            routing_cache,
        }
    }

    /// 주소의 풀을 가져오거나 생성
    ///
    /// 세션은 설정이 호환되는 풀끼리만 공유됩니다 ([`PoolSettings::is_compatible`]).
    /// 세마포어는 인증 정보와 무관하게 (사용자 에이전트, 호스트, 포트)별로 하나이며,
    /// 처음 만든 풀의 `max_size`를 한도로 씁니다. 닫힌 풀은 새 풀로 교체합니다.
    pub fn pool(&self, address: &ServerAddress, settings: &PoolSettings) -> ConnectionPool {
        let admission_key =
            PoolKey::new(settings.options.user_agent.clone(), address, None).admission_key();

        let mut pools = self.pools.lock();
        let siblings = pools.entry(admission_key.clone()).or_default();
        siblings.retain(|pool| !pool.is_closed());
        if let Some(pool) = siblings
            .iter()
            .find(|pool| pool.settings().is_compatible(settings))
        {
            return pool.clone();
        }

        let semaphore = self
            .semaphores
            .get_or_create(&admission_key, settings.config.max_size);
        let pool = ConnectionPool::new(address.clone(), settings.clone(), semaphore);
        tracing::debug!(
            %address,
            key = %admission_key,
            siblings = siblings.len(),
            "created connection pool"
        );
        siblings.push(pool.clone());
        pool
    }

    /// 풀 목록에서 제거 (풀은 닫지 않음)
    pub fn remove_pool(&self, pool: &ConnectionPool) {
        let mut pools = self.pools.lock();
        for siblings in pools.values_mut() {
            siblings.retain(|existing| !existing.same_pool(pool));
        }
        pools.retain(|_, siblings| !siblings.is_empty());
    }

    /// 등록된 풀 수
    pub fn pool_count(&self) -> usize {
        self.pools.lock().values().map(Vec::len).sum()
    }

    /// 세마포어 레지스트리
    pub fn semaphores(&self) -> &SemaphoreRegistry {
        &self.semaphores
    }

    /// 라우팅 테이블 캐시
    pub fn routing_cache(&self) -> &Arc<dyn Cache<RoutingTable>> {
        &self.routing_cache
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new(SemaphoreStrategy::default())
    }
}

impl fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("pools", &self.pool_count())
            .field("semaphores", &self.semaphores.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
