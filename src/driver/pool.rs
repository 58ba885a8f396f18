//! 호스트별 연결 풀
//!
//! 하나의 서버 주소에 대한 Bolt 세션들을 관리합니다. 동시에 열 수 있는 세션 수는
//! 풀이 아니라 [`AdmissionSemaphore`]가 제한하므로, 같은 호스트를 보는 여러 풀이
//! (또는 여러 프로세스가) 하나의 한도를 공유할 수 있습니다.
//!
//! - 슬롯은 빌려간 세션 수를 셉니다. 유휴 세션은 슬롯을 잡고 있지 않습니다.
//! - 슬롯을 얻은 뒤 유휴 세션을 우선 재사용하고, 없으면 새로 연결합니다.
//! - 반환된 세션이 깨져 있으면 버립니다.
//! - 풀 자체는 재시도하지 않습니다.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::bolt::{BoltClient, ClientOptions, Connector, ServerState};
use super::driver::{AuthToken, ServerAddress};
use super::error::{DriverError, DriverResult};
use super::semaphore::{AdmissionSemaphore, SemaphoreError};
use super::session::{AccessMode, SessionConfig};

// ============================================================================
// PoolKey - 풀/세마포어/캐시 키
// ============================================================================

/// 풀 키
///
/// 캐시 키에 쓸 수 없는 문자(`{}()/\@:`)와 구분자(`|`), 이스케이프 문자(`%`)는
/// 퍼센트 인코딩됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    /// 사용자 에이전트
    pub user_agent: String,
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
    /// 데이터베이스 (`None`이면 서버 기본 DB)
    pub database: Option<String>,
}

impl PoolKey {
    /// 새 키 생성
    pub fn new(user_agent: impl Into<String>, address: &ServerAddress, database: Option<&str>) -> Self {
        Self {
            user_agent: user_agent.into(),
            host: address.host.clone(),
            port: address.port,
            database: database.map(str::to_string),
        }
    }

    /// 라우팅 테이블 캐시 키
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}",
            self.admission_key(),
            escape_key_part(self.database.as_deref().unwrap_or(""))
        )
    }

    /// 세마포어 키 (데이터베이스 제외)
    pub fn admission_key(&self) -> String {
        format!(
            "{}|{}|{}",
            escape_key_part(&self.user_agent),
            escape_key_part(&self.host),
            self.port
        )
    }
}

fn escape_key_part(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '{' | '}' | '(' | ')' | '/' | '\\' | '@' | ':' | '|' | '%' => {
                escaped.push_str(&format!("%{:02X}", c as u32));
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 100 | 호스트별 최대 세션 수 |
/// | `acquisition_timeout` | 60초 | 세션 획득 대기 한도 |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// 최대 세션 수
    pub max_size: usize,
    /// 획득 타임아웃
    pub acquisition_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            acquisition_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 최대 세션 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// 획득 타임아웃 설정
    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquisition_timeout = timeout;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

/// 새 세션을 만드는 데 필요한 모든 것
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// 트랜스포트 생성기
    pub connector: Arc<dyn Connector>,
    /// 인증 정보
    pub auth: AuthToken,
    /// HELLO 옵션
    pub options: Arc<ClientOptions>,
    /// 풀 설정
    pub config: PoolConfig,
}

impl PoolSettings {
    /// 같은 풀의 세션을 서로 나눠 써도 되는 설정인지 확인
    ///
    /// 인증 정보 전체, 커넥터 인스턴스, HELLO 옵션, 풀 설정이 모두 같아야 합니다.
    pub fn is_compatible(&self, other: &PoolSettings) -> bool {
        self.auth == other.auth
            && std::ptr::addr_eq(Arc::as_ptr(&self.connector), Arc::as_ptr(&other.connector))
            && *self.options == *other.options
            && self.config == other.config
    }
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 현재 크기 (유휴 + 사용 중)
    pub size: usize,
    /// 유휴 세션 수
    pub idle: usize,
    /// 사용 중인 세션 수
    pub in_use: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 닫힌 세션 수
    pub total_closed: u64,
}

impl PoolMetrics {
    /// 두 메트릭 합산
    pub fn merge(mut self, other: &PoolMetrics) -> Self {
        self.size += other.size;
        self.idle += other.idle;
        self.in_use += other.in_use;
        self.total_acquisitions += other.total_acquisitions;
        self.total_created += other.total_created;
        self.total_closed += other.total_closed;
        self
    }
}

// ============================================================================
// ConnectionProvider - 세션 공급자
// ============================================================================

/// 세션을 빌려주는 쪽 (호스트별 풀 또는 클러스터 풀)
#[async_trait]
pub trait ConnectionProvider: Send + Sync + fmt::Debug {
    /// 세션 획득
    async fn acquire(&self, config: &SessionConfig) -> DriverResult<PooledSession>;

    /// 모든 유휴 세션을 닫고 이후 획득을 거부
    async fn close(&self);

    /// 메트릭 조회
    fn metrics(&self) -> PoolMetrics;
}

// ============================================================================
// ConnectionPool - 호스트별 풀
// ============================================================================

struct PoolShared {
    address: ServerAddress,
    settings: PoolSettings,
    semaphore: Arc<dyn AdmissionSemaphore>,
    idle: Mutex<VecDeque<BoltClient>>,
    closing: CancellationToken,
    open: RwLock<bool>,
    size: AtomicUsize,
    in_use: AtomicUsize,
    total_acquisitions: AtomicU64,
    total_created: AtomicU64,
    total_closed: AtomicU64,
}

/// 호스트별 연결 풀 (복제 가능한 핸들)
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// 새 풀 생성
    pub fn new(
        address: ServerAddress,
        settings: PoolSettings,
        semaphore: Arc<dyn AdmissionSemaphore>,
    ) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                address,
                settings,
                semaphore,
                idle: Mutex::new(VecDeque::new()),
                closing: CancellationToken::new(),
                open: RwLock::new(true),
                size: AtomicUsize::new(0),
                in_use: AtomicUsize::new(0),
                total_acquisitions: AtomicU64::new(0),
                total_created: AtomicU64::new(0),
                total_closed: AtomicU64::new(0),
            }),
        }
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.shared.address
    }

    /// 풀 설정
    pub fn settings(&self) -> &PoolSettings {
        &self.shared.settings
    }

    /// 같은 풀을 가리키는 핸들인지 확인
    pub fn same_pool(&self, other: &ConnectionPool) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// 닫힘 여부
    pub fn is_closed(&self) -> bool {
        !*self.shared.open.read()
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.is_closed() {
            Err(DriverError::pool(format!(
                "Pool for {} is closed",
                self.shared.address
            )))
        } else {
            Ok(())
        }
    }

    /// 세션 획득
    ///
    /// 먼저 입장 슬롯을 얻고, 같은 접근 모드의 유휴 세션, 다른 모드의 유휴 세션,
    /// 새 세션 순으로 시도합니다. 슬롯은 빌려간 세션이 반환될 때 돌려줍니다.
    pub async fn acquire(&self, config: &SessionConfig) -> DriverResult<PooledSession> {
        self.ensure_open()?;
        let slot = self.admit().await?;

        loop {
            self.ensure_open()?;
            let Some(client) = self.take_idle(config.access_mode) else {
                break;
            };
            if let Some(client) = self.prepare(client, config).await {
                slot.keep();
                return Ok(self.checkout(client));
            }
        }

        let settings = &self.shared.settings;
        let mut client = BoltClient::new(
            self.shared.address.clone(),
            settings.connector.clone(),
            settings.auth.clone(),
            settings.options.clone(),
        );
        if let Err(e) = client.open().await {
            tracing::debug!(address = %self.shared.address, error = %e, "failed to open session");
            return Err(e);
        }
        client.set_access_mode(config.access_mode);
        client.set_database(config.database.clone());

        self.shared.size.fetch_add(1, Ordering::Relaxed);
        self.shared.total_created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            address = %self.shared.address,
            id = client.id(),
            "pool session created"
        );

        slot.keep();
        Ok(self.checkout(client))
    }

    /// 입장 슬롯 대기 (획득 타임아웃 적용, 풀이 닫히면 취소)
    async fn admit(&self) -> DriverResult<AdmissionSlot<'_>> {
        if self.shared.semaphore.try_wait()? {
            return Ok(AdmissionSlot::new(self));
        }

        let timeout = self.shared.settings.config.acquisition_timeout;
        let address = &self.shared.address;
        let mut progress = |elapsed: Duration| {
            tracing::trace!(%address, ?elapsed, "waiting for a pool slot");
        };
        match self
            .shared
            .semaphore
            .wait(Some(timeout), &self.shared.closing, &mut progress)
            .await
        {
            Ok(_) => Ok(AdmissionSlot::new(self)),
            Err(SemaphoreError::TimedOut { .. }) => Err(self.acquisition_timeout(timeout)),
            Err(SemaphoreError::Cancelled { .. }) => {
                self.ensure_open()?;
                Err(DriverError::pool("Pool slot wait was cancelled"))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn acquisition_timeout(&self, timeout: Duration) -> DriverError {
        DriverError::timeout(format!(
            "Could not acquire a session to {} within {:?}",
            self.shared.address, timeout
        ))
    }

    /// 유휴 세션 꺼내기 (같은 접근 모드 우선)
    fn take_idle(&self, mode: AccessMode) -> Option<BoltClient> {
        let mut idle = self.shared.idle.lock();
        let position = idle
            .iter()
            .position(|client| client.access_mode() == mode)
            .unwrap_or(0);
        idle.remove(position)
    }

    /// 재사용 준비: READY가 아니면 RESET. 실패하면 버리고 `None`
    async fn prepare(&self, mut client: BoltClient, config: &SessionConfig) -> Option<BoltClient> {
        if client.is_open() && client.state() != ServerState::Ready {
            if let Err(e) = client.reset().await {
                tracing::debug!(id = client.id(), error = %e, "reset of idle session failed");
            }
        }
        if !client.is_open() {
            self.discard(client);
            return None;
        }
        client.set_access_mode(config.access_mode);
        client.set_database(config.database.clone());
        Some(client)
    }

    fn checkout(&self, client: BoltClient) -> PooledSession {
        self.shared.in_use.fetch_add(1, Ordering::Relaxed);
        self.shared
            .total_acquisitions
            .fetch_add(1, Ordering::Relaxed);
        PooledSession {
            client: Some(client),
            pool: self.clone(),
        }
    }

    /// 세션 반환
    ///
    /// 열린 세션은 유휴 목록으로, 깨졌거나 풀이 닫혔으면 버립니다.
    /// 어느 쪽이든 입장 슬롯은 돌려줍니다.
    pub fn release(&self, client: BoltClient) {
        self.shared.in_use.fetch_sub(1, Ordering::Relaxed);

        if client.is_open() && !self.is_closed() {
            self.shared.idle.lock().push_back(client);
        } else {
            self.discard(client);
        }
        self.post_slot();
    }

    fn discard(&self, client: BoltClient) {
        tracing::debug!(
            address = %self.shared.address,
            id = client.id(),
            state = %client.state(),
            "discarding pool session"
        );
        drop(client);
        self.shared.size.fetch_sub(1, Ordering::Relaxed);
        self.shared.total_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn post_slot(&self) {
        if let Err(e) = self.shared.semaphore.post() {
            tracing::error!(address = %self.shared.address, error = %e, "admission slot release failed");
        }
    }

    /// 풀 닫기
    ///
    /// 유휴 세션을 모두 닫습니다. 사용 중인 세션은 반환될 때 버려집니다.
    pub async fn close(&self) {
        {
            let mut open = self.shared.open.write();
            if !*open {
                return;
            }
            *open = false;
        }
        self.shared.closing.cancel();

        let idle: Vec<BoltClient> = self.shared.idle.lock().drain(..).collect();
        for mut client in idle {
            client.close().await;
            self.shared.size.fetch_sub(1, Ordering::Relaxed);
            self.shared.total_closed.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(address = %self.shared.address, "pool closed");
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            size: self.shared.size.load(Ordering::Relaxed),
            idle: self.shared.idle.lock().len(),
            in_use: self.shared.in_use.load(Ordering::Relaxed),
            total_acquisitions: self.shared.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.shared.total_created.load(Ordering::Relaxed),
            total_closed: self.shared.total_closed.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.shared.address)
            .field("semaphore", &self.shared.semaphore.key())
            .field("metrics", &self.metrics())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionPool {
    async fn acquire(&self, config: &SessionConfig) -> DriverResult<PooledSession> {
        ConnectionPool::acquire(self, config).await
    }

    async fn close(&self) {
        ConnectionPool::close(self).await
    }

    fn metrics(&self) -> PoolMetrics {
        ConnectionPool::metrics(self)
    }
}

// ============================================================================
// AdmissionSlot - 획득 중인 입장 슬롯
// ============================================================================

/// 획득 도중 실패하거나 취소되면 슬롯을 돌려주는 가드
struct AdmissionSlot<'a> {
    pool: &'a ConnectionPool,
    held: bool,
}

impl<'a> AdmissionSlot<'a> {
    fn new(pool: &'a ConnectionPool) -> Self {
        Self { pool, held: true }
    }

    /// 빌려준 세션에 슬롯을 넘김
    fn keep(mut self) {
        self.held = false;
    }
}

impl Drop for AdmissionSlot<'_> {
    fn drop(&mut self) {
        if self.held {
            self.pool.post_slot();
        }
    }
}

// ============================================================================
// PooledSession - 풀에서 빌린 세션
// ============================================================================

/// 풀에서 빌린 세션
///
/// [`BoltClient`]로 역참조됩니다. [`release`](Self::release)하거나 드롭하면 풀로 돌아갑니다.
pub struct PooledSession {
    client: Option<BoltClient>,
    pool: ConnectionPool,
}

impl PooledSession {
    /// 풀로 반환
    pub fn release(mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }

    /// 빌려준 풀
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl Deref for PooledSession {
    type Target = BoltClient;

    fn deref(&self) -> &BoltClient {
        self.client
            .as_ref()
            .expect("pooled session is present until released")
    }
}

impl DerefMut for PooledSession {
    fn deref_mut(&mut self) -> &mut BoltClient {
        self.client
            .as_mut()
            .expect("pooled session is present until released")
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}

impl fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("client", &self.client)
            .field("pool", &self.pool.address())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
