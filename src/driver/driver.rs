//! Driver
//!
//! 드라이버 인스턴스 및 설정.
//!
//! - `bolt://host:port` : 단일 서버 직접 연결
//! - `neo4j://host:port?key=value` : 라우팅 테이블 기반 클러스터 연결 (쿼리 문자열은 라우팅 컨텍스트)

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::bolt::{BoltMap, PackStreamValue};

use super::bolt::{ClientOptions, Connector, NotificationFilter, TcpConnector};
use super::error::{DriverError, DriverResult};
use super::manager::PoolManager;
use super::pool::{ConnectionProvider, PoolConfig, PoolMetrics, PoolSettings};
use super::resolver::{AddressResolver, DnsResolver};
use super::routing::ClusterConnectionPool;
use super::session::{Session, SessionConfig};

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

// ============================================================================
// AuthToken - 인증 토큰
// ============================================================================

/// 인증 토큰
#[derive(Clone, PartialEq)]
pub enum AuthToken {
    /// 인증 없음
    None,
    /// Basic 인증 (사용자명/비밀번호)
    Basic {
        username: String,
        password: String,
        realm: Option<String>,
    },
    /// Bearer 토큰
    Bearer { token: String },
    /// Kerberos 인증
    Kerberos { ticket: String },
    /// 커스텀 인증
    Custom {
        scheme: String,
        principal: String,
        credentials: String,
        realm: Option<String>,
        parameters: BoltMap,
    },
}

impl AuthToken {
    /// Basic 인증 토큰 생성
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: None,
        }
    }

    /// Basic 인증 토큰 생성 (realm 포함)
    pub fn basic_with_realm(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: Some(realm.into()),
        }
    }

    /// Bearer 토큰 생성
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Kerberos 토큰 생성
    pub fn kerberos(ticket: impl Into<String>) -> Self {
        Self::Kerberos {
            ticket: ticket.into(),
        }
    }

    /// 인증 없음
    pub fn none() -> Self {
        Self::None
    }

    /// 인증 스킴
    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
            Self::Kerberos { .. } => "kerberos",
            Self::Custom { scheme, .. } => scheme,
        }
    }

    /// 주체 (사용자명). 풀 식별에 사용
    pub fn principal(&self) -> Option<&str> {
        match self {
            Self::Basic { username, .. } => Some(username),
            Self::Custom { principal, .. } => Some(principal),
            Self::None | Self::Bearer { .. } | Self::Kerberos { .. } => None,
        }
    }

    /// HELLO/LOGON에 들어가는 인증 필드
    pub fn to_map(&self) -> BoltMap {
        let mut map = BoltMap::new();
        map.insert("scheme".to_string(), self.scheme().into());
        match self {
            Self::None => {}
            Self::Basic {
                username,
                password,
                realm,
            } => {
                map.insert("principal".to_string(), username.as_str().into());
                map.insert("credentials".to_string(), password.as_str().into());
                if let Some(realm) = realm {
                    map.insert("realm".to_string(), realm.as_str().into());
                }
            }
            Self::Bearer { token } => {
                map.insert("credentials".to_string(), token.as_str().into());
            }
            Self::Kerberos { ticket } => {
                map.insert("principal".to_string(), "".into());
                map.insert("credentials".to_string(), ticket.as_str().into());
            }
            Self::Custom {
                principal,
                credentials,
                realm,
                parameters,
                ..
            } => {
                map.insert("principal".to_string(), principal.as_str().into());
                map.insert("credentials".to_string(), credentials.as_str().into());
                if let Some(realm) = realm {
                    map.insert("realm".to_string(), realm.as_str().into());
                }
                if !parameters.is_empty() {
                    map.insert(
                        "parameters".to_string(),
                        PackStreamValue::Map(parameters.clone()),
                    );
                }
            }
        }
        map
    }
}

impl Default for AuthToken {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 자격 증명은 출력하지 않음
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme())
            .field("principal", &self.principal())
            .finish()
    }
}

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host`, `host:port`, `[v6]:port` 형식 파싱
    pub fn parse(s: &str, default_port: u16) -> DriverResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DriverError::configuration("Empty server address"));
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| DriverError::configuration(format!("Invalid address: {}", s)))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port)?,
                None if tail.is_empty() => default_port,
                None => {
                    return Err(DriverError::configuration(format!("Invalid address: {}", s)))
                }
            };
            return Ok(Self::new(host, port));
        }

        match s.split_once(':') {
            None => Ok(Self::new(s, default_port)),
            Some((host, port)) if !port.contains(':') => Ok(Self::new(host, parse_port(port)?)),
            // 괄호 없는 IPv6
            Some(_) => Ok(Self::new(s, default_port)),
        }
    }

    /// 소켓 주소 문자열
    pub fn to_socket_addr(&self) -> String {
        self.to_string()
    }
}

fn parse_port(port: &str) -> DriverResult<u16> {
    port.parse()
        .map_err(|_| DriverError::configuration(format!("Invalid port: {}", port)))
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 시드 서버 주소
    pub address: ServerAddress,
    /// 라우팅 사용 여부 (`neo4j://`)
    pub routing: bool,
    /// 라우팅 컨텍스트 (`address` + URI 쿼리 문자열)
    pub routing_context: BoltMap,
    /// 인증 토큰
    pub auth: AuthToken,
    /// 호스트별 최대 연결 수
    pub max_connection_pool_size: usize,
    /// 연결 획득 타임아웃
    pub connection_acquisition_timeout: Duration,
    /// 연결 (TCP + 핸드셰이크) 타임아웃
    pub connection_timeout: Duration,
    /// 응답 읽기 타임아웃 (None이면 무제한)
    pub read_timeout: Option<Duration>,
    /// 최대 트랜잭션 재시도 시간
    pub max_transaction_retry_time: Duration,
    /// User Agent
    pub user_agent: String,
    /// Fetch Size (PULL 배치 크기, -1은 전체)
    pub fetch_size: i64,
    /// 알림 필터 (Bolt 5.2+)
    pub notification_filter: NotificationFilter,
}

impl DriverConfig {
    /// URI에서 설정 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| DriverError::configuration(format!("Invalid URI: {}", uri)))?;

        let routing = match scheme {
            "bolt" => false,
            "neo4j" => true,
            "bolt+s" | "bolt+ssc" | "neo4j+s" | "neo4j+ssc" => {
                return Err(DriverError::configuration(format!(
                    "Encrypted scheme '{}' is not supported",
                    scheme
                )))
            }
            other => {
                return Err(DriverError::configuration(format!(
                    "Unsupported URI scheme '{}'",
                    other
                )))
            }
        };

        let (authority, query) = match rest.split_once('?') {
            Some((authority, query)) => (authority, Some(query)),
            None => (rest, None),
        };
        let address = ServerAddress::parse(authority.trim_end_matches('/'), DEFAULT_PORT)?;

        let mut routing_context = BoltMap::new();
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            if !routing {
                return Err(DriverError::configuration(
                    "Routing context is only allowed with the neo4j:// scheme",
                ));
            }
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    DriverError::configuration(format!("Invalid routing context entry: {}", pair))
                })?;
                if key == "address" {
                    return Err(DriverError::configuration(
                        "Routing context key 'address' is reserved",
                    ));
                }
                routing_context.insert(key.to_string(), value.into());
            }
        }
        routing_context.insert("address".to_string(), address.to_string().into());

        Ok(Self {
            address,
            routing,
            routing_context,
            auth,
            ..Self::default()
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri, auth)?;
        Ok(DriverConfigBuilder { config })
    }

    /// 세션 계층 옵션
    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::new(self.user_agent.clone())
            .with_notification_filter(self.notification_filter.clone())
            .with_fetch_size(self.fetch_size);
        if self.routing {
            options = options.with_routing_context(self.routing_context.clone());
        }
        if let Some(timeout) = self.read_timeout {
            options = options.with_read_timeout(timeout);
        }
        options
    }

    /// 풀 설정
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::builder()
            .max_size(self.max_connection_pool_size)
            .acquisition_timeout(self.connection_acquisition_timeout)
            .build()
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        let address = ServerAddress::default();
        Self {
            routing: false,
            routing_context: BoltMap::new(),
            address,
            auth: AuthToken::default(),
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
            read_timeout: None,
            max_transaction_retry_time: Duration::from_secs(30),
            user_agent: format!("graphbolt-driver/{}", env!("CARGO_PKG_VERSION")),
            fetch_size: 1000,
            notification_filter: NotificationFilter::default(),
        }
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
#[derive(Debug, Clone)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// 연결 풀 크기 설정
    pub fn with_max_connection_pool_size(mut self, size: usize) -> Self {
        self.config.max_connection_pool_size = size;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = timeout;
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 읽기 타임아웃 설정
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// 최대 트랜잭션 재시도 시간 설정
    pub fn with_max_transaction_retry_time(mut self, time: Duration) -> Self {
        self.config.max_transaction_retry_time = time;
        self
    }

    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.config.fetch_size = size;
        self
    }

    /// 알림 필터 설정
    pub fn with_notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.config.notification_filter = filter;
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// ============================================================================
// DriverBuilder - 드라이버 빌더
// ============================================================================

/// 드라이버 빌더
///
/// 커넥터, 주소 리졸버, 풀 매니저를 교체할 수 있습니다.
/// 같은 [`PoolManager`]를 넘긴 드라이버들은 호스트별 풀, 세마포어, 라우팅 캐시를 공유합니다.
pub struct DriverBuilder {
    config: DriverConfig,
    connector: Option<Arc<dyn Connector>>,
    resolver: Option<Arc<dyn AddressResolver>>,
    manager: Option<Arc<PoolManager>>,
}

impl DriverBuilder {
    /// 설정 교체 (주소, 라우팅 여부, 인증은 유지)
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = DriverConfig {
            address: self.config.address,
            routing: self.config.routing,
            routing_context: self.config.routing_context,
            auth: self.config.auth,
            ..config
        };
        self
    }

    /// 설정 일부 변경
    pub fn configure(mut self, f: impl FnOnce(DriverConfigBuilder) -> DriverConfigBuilder) -> Self {
        self.config = f(DriverConfigBuilder {
            config: self.config,
        })
        .build();
        self
    }

    /// 커넥터 교체
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 주소 리졸버 교체
    pub fn with_resolver(mut self, resolver: Arc<dyn AddressResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// 공유 풀 매니저 사용
    pub fn with_pool_manager(mut self, manager: Arc<PoolManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// 드라이버 생성
    pub fn build(self) -> Driver {
        let config = Arc::new(self.config);
        let manager = self
            .manager
            .unwrap_or_else(|| Arc::new(PoolManager::default()));
        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(TcpConnector::new(
                config.connection_timeout,
                config.read_timeout,
            ))
        });

        let settings = PoolSettings {
            connector,
            auth: config.auth.clone(),
            options: Arc::new(config.client_options()),
            config: config.pool_config(),
        };

        let provider: Arc<dyn ConnectionProvider> = if config.routing {
            let resolver = self
                .resolver
                .unwrap_or_else(|| Arc::new(DnsResolver::new()));
            Arc::new(ClusterConnectionPool::new(
                config.address.clone(),
                manager,
                resolver,
                settings,
            ))
        } else {
            Arc::new(manager.pool(&config.address, &settings))
        };

        tracing::debug!(
            address = %config.address,
            routing = config.routing,
            "driver created"
        );

        Driver {
            config,
            provider,
            open: Arc::new(RwLock::new(true)),
        }
    }
}

// ============================================================================
// Driver - 드라이버
// ============================================================================

/// 그래프 데이터베이스 드라이버
pub struct Driver {
    /// 설정
    config: Arc<DriverConfig>,
    /// 연결 공급자 (직접 풀 또는 클러스터 풀)
    provider: Arc<dyn ConnectionProvider>,
    /// 열린 상태
    open: Arc<RwLock<bool>>,
}

impl Driver {
    /// 기본 구성으로 드라이버 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        Ok(Self::builder(uri, auth)?.build())
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverBuilder> {
        Ok(DriverBuilder {
            config: DriverConfig::new(uri, auth)?,
            connector: None,
            resolver: None,
            manager: None,
        })
    }

    /// 세션 생성
    pub fn session(&self, config: SessionConfig) -> DriverResult<Session> {
        self.ensure_open()?;
        Ok(Session::new(
            self.config.clone(),
            self.provider.clone(),
            config,
        ))
    }

    /// 기본 설정으로 세션 생성
    pub fn default_session(&self) -> DriverResult<Session> {
        self.session(SessionConfig::default())
    }

    /// 드라이버 설정
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 라우팅 드라이버 여부
    pub fn is_routing(&self) -> bool {
        self.config.routing
    }

    /// 연결 테스트 (라우팅 드라이버는 라우팅 테이블 조회 포함)
    pub async fn verify_connectivity(&self) -> DriverResult<()> {
        self.ensure_open()?;
        let session = self.provider.acquire(&SessionConfig::default()).await?;
        session.release();
        Ok(())
    }

    /// 드라이버 종료
    pub async fn close(&self) -> DriverResult<()> {
        {
            let mut open = self.open.write();
            if !*open {
                return Ok(());
            }
            *open = false;
        }

        self.provider.close().await;
        tracing::debug!(address = %self.config.address, "driver closed");
        Ok(())
    }

    /// 열린 상태 확인
    fn ensure_open(&self) -> DriverResult<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(DriverError::session("Driver is closed"))
        }
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        self.provider.metrics()
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("address", &self.config.address)
            .field("routing", &self.config.routing)
            .field("open", &*self.open.read())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
