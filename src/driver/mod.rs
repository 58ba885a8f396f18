//! Driver Module
//!
//! 클라이언트 API: 드라이버, 세션, 트랜잭션과 그 아래의 연결 관리
//!
//! # 구성
//!
//! - 드라이버/세션 파사드 (Driver, Session, SessionConfig, Bookmark)
//! - 호스트별 연결 풀과 입장 세마포어 (ConnectionPool, AdmissionSemaphore)
//! - 라우팅 테이블과 클러스터 풀 (RoutingTable, ClusterConnectionPool)
//! - 트랜잭션과 재시도 (Transaction, retry)
//! - 주소 해석기와 캐시 (AddressResolver, Cache)
//!
//! # Example
//!
//! ```ignore
//! use graphbolt_driver::driver::{Driver, AuthToken, SessionConfig};
//! use graphbolt_driver::params;
//!
//! // 단일 서버 드라이버 (bolt://)
//! let driver = Driver::new("bolt://localhost:7687", AuthToken::basic("graph", "password"))?;
//! let session = driver.session(SessionConfig::default())?;
//!
//! // 자동 커밋 쿼리
//! let result = session.run("MATCH (n) RETURN n LIMIT 10", None).await?;
//! for record in result {
//!     println!("{:?}", record);
//! }
//!
//! // 트랜잭션
//! let mut tx = session.begin_transaction(None).await?;
//! tx.run("CREATE (n:Person {name: $name})", params!{"name" => "Alice"}).await?;
//! tx.commit().await?;
//!
//! session.close();
//! driver.close().await?;
//! ```

pub mod bolt;
pub mod cache;
pub mod resolver;
pub mod retry;
pub mod routing;
pub mod semaphore;
mod driver;
mod error;
mod manager;
mod pool;
mod record;
mod session;
mod transaction;

// Re-exports
pub use cache::{Cache, InMemoryCache};
pub use driver::{
    AuthToken, Driver, DriverBuilder, DriverConfig, DriverConfigBuilder, ServerAddress,
    DEFAULT_PORT,
};
pub use error::{DriverError, DriverResult};
pub use manager::PoolManager;
pub use pool::{
    ConnectionPool, ConnectionProvider, PoolConfig, PoolConfigBuilder, PoolKey, PoolMetrics,
    PoolSettings, PooledSession,
};
pub use record::{QueryResult, Record, Value};
pub use resolver::{AddressResolver, DnsResolver, StaticResolver};
pub use retry::{retry, RetryConfig, RetryableTransaction};
pub use routing::{ClusterConnectionPool, RoutingRole, RoutingTable};
pub use semaphore::{AdmissionSemaphore, LocalSemaphore, SemaphoreRegistry, SemaphoreStrategy};
pub use session::{AccessMode, Bookmark, Session, SessionConfig, SessionConfigBuilder};
pub use transaction::{Transaction, TransactionConfig, TransactionState};

/// 파라미터 맵 생성 매크로
#[macro_export]
macro_rules! params {
    () => {
        $crate::bolt::BoltMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::bolt::BoltMap::new();
        $(
            map.insert($key.into(), $crate::driver::Value::from($value));
        )+
        map
    }};
}
