//! 클러스터 연결 풀
//!
//! 라우팅 테이블로 접근 모드에 맞는 서버를 고르고, 그 서버의 호스트별 풀에
//! 획득을 위임합니다.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::bolt::BoltMap;

use super::super::driver::ServerAddress;
use super::super::error::{DriverError, DriverResult};
use super::super::manager::PoolManager;
use super::super::pool::{ConnectionPool, ConnectionProvider, PoolKey, PoolMetrics, PoolSettings, PooledSession};
use super::super::resolver::AddressResolver;
use super::super::session::{AccessMode, SessionConfig};
use super::table::{RoutingRole, RoutingTable};

// ============================================================================
// ClusterConnectionPool - 클러스터 풀
// ============================================================================

/// 클러스터 인식 연결 풀
///
/// 테이블 조회는 잠금 없이 진행됩니다. 같은 키로 동시에 조회하면 각자 조회하고
/// 마지막 결과가 캐시에 남습니다.
pub struct ClusterConnectionPool {
    seed: ServerAddress,
    manager: Arc<PoolManager>,
    resolver: Arc<dyn AddressResolver>,
    settings: PoolSettings,
    /// 이 풀이 사용한 호스트별 풀
    pools: Mutex<Vec<ConnectionPool>>,
    /// 이 풀이 채운 캐시 키
    cache_keys: Mutex<Vec<String>>,
}

impl ClusterConnectionPool {
    /// 새 클러스터 풀 생성
    pub fn new(
        seed: ServerAddress,
        manager: Arc<PoolManager>,
        resolver: Arc<dyn AddressResolver>,
        settings: PoolSettings,
    ) -> Self {
        Self {
            seed,
            manager,
            resolver,
            settings,
            pools: Mutex::new(Vec::new()),
            cache_keys: Mutex::new(Vec::new()),
        }
    }

    /// 시드 주소
    pub fn seed(&self) -> &ServerAddress {
        &self.seed
    }

    fn cache_key(&self, config: &SessionConfig) -> String {
        PoolKey::new(
            self.settings.options.user_agent.clone(),
            &self.seed,
            config.database.as_deref(),
        )
        .cache_key()
    }

    fn pool_for(&self, address: &ServerAddress) -> ConnectionPool {
        let pool = self.manager.pool(address, &self.settings);
        let mut pools = self.pools.lock();
        pools.retain(|existing| !existing.is_closed());
        if !pools.iter().any(|existing| existing.same_pool(&pool)) {
            pools.push(pool.clone());
        }
        pool
    }

    /// 캐시된 테이블 또는 새로 조회한 테이블
    pub async fn routing_table(&self, config: &SessionConfig) -> DriverResult<RoutingTable> {
        let key = self.cache_key(config);
        let cache = self.manager.routing_cache();
        if let Some(table) = cache.get(&key)? {
            if !table.is_expired() {
                return Ok(table);
            }
        }

        let table = self.discover(config).await?;
        cache.set(&key, table.clone(), Some(table.ttl()))?;
        let mut keys = self.cache_keys.lock();
        if !keys.contains(&key) {
            keys.push(key);
        }
        Ok(table)
    }

    async fn discover(&self, config: &SessionConfig) -> DriverResult<RoutingTable> {
        let context = self
            .settings
            .options
            .routing_context
            .clone()
            .unwrap_or_else(BoltMap::new);
        let bookmarks: Vec<String> = config
            .bookmarks
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| b.value().to_string())
            .collect();

        let mut failures = Vec::new();
        let mut candidates = self.resolver.resolve(&self.seed.host);
        while let Some(candidate) = candidates.next().await {
            let address = match ServerAddress::parse(&candidate, self.seed.port) {
                Ok(address) => address,
                Err(e) => {
                    failures.push(format!("{} ({})", candidate, e));
                    continue;
                }
            };

            match self.fetch_from(&address, config, &context, &bookmarks).await {
                Ok(table) => {
                    tracing::debug!(
                        router = %address,
                        ttl = ?table.ttl(),
                        database = ?config.database,
                        "routing table fetched"
                    );
                    return Ok(table);
                }
                // 인증 실패도 다음 후보로 넘어감
                Err(e) if e.is_connection_error() || matches!(e, DriverError::Authentication(_)) => {
                    tracing::warn!(router = %address, error = %e, "routing table fetch failed");
                    failures.push(format!("{} ({})", address, e));
                }
                Err(e) => return Err(e),
            }
        }

        Err(DriverError::service_unavailable(format!(
            "Unable to retrieve routing table for {} from any of: {}",
            self.seed,
            failures.join(", ")
        )))
    }

    async fn fetch_from(
        &self,
        address: &ServerAddress,
        config: &SessionConfig,
        context: &BoltMap,
        bookmarks: &[String],
    ) -> DriverResult<RoutingTable> {
        let mut session = self.pool_for(address).acquire(config).await?;
        let table = session
            .route(
                context,
                bookmarks,
                config.database.as_deref(),
                config.impersonated_user.as_deref(),
            )
            .await;
        session.release();
        table
    }

    fn select_address(&self, table: &RoutingTable, mode: AccessMode) -> DriverResult<ServerAddress> {
        let all = table.get_with_role(None);
        let chosen = if all.len() == 1 {
            all[0].clone()
        } else {
            let role = match mode {
                AccessMode::Read => RoutingRole::Follower,
                AccessMode::Write => RoutingRole::Leader,
            };
            let candidates = table.get_with_role(Some(role));
            candidates
                .choose(&mut rand::thread_rng())
                .cloned()
                .ok_or_else(|| {
                    DriverError::service_unavailable(format!(
                        "No {} servers available in routing table for {}",
                        role.as_wire(),
                        self.seed
                    ))
                })?
        };
        ServerAddress::parse(&chosen, self.seed.port)
    }
}

#[async_trait]
impl ConnectionProvider for ClusterConnectionPool {
    async fn acquire(&self, config: &SessionConfig) -> DriverResult<PooledSession> {
        let table = self.routing_table(config).await?;
        let address = self.select_address(&table, config.access_mode)?;
        tracing::trace!(%address, mode = ?config.access_mode, "routing to server");
        self.pool_for(&address).acquire(config).await
    }

    async fn close(&self) {
        let keys: Vec<String> = std::mem::take(&mut *self.cache_keys.lock());
        let cache = self.manager.routing_cache();
        for key in keys {
            if let Err(e) = cache.delete(&key) {
                tracing::debug!(error = %e, "routing cache delete failed");
            }
        }

        let pools: Vec<ConnectionPool> = std::mem::take(&mut *self.pools.lock());
        for pool in pools {
            pool.close().await;
            self.manager.remove_pool(&pool);
        }
        tracing::debug!(seed = %self.seed, "cluster pool closed");
    }

    fn metrics(&self) -> PoolMetrics {
        self.pools
            .lock()
            .iter()
            .fold(PoolMetrics::default(), |acc, pool| acc.merge(&pool.metrics()))
    }
}

impl fmt::Debug for ClusterConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConnectionPool")
            .field("seed", &self.seed)
            .field("pools", &self.pools.lock().len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
