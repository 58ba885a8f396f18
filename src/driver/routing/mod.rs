//! 라우팅 모듈
//!
//! `neo4j://` 스킴 드라이버는 클러스터의 라우팅 테이블을 조회해 쓰기는 리더로,
//! 읽기는 팔로워로 보냅니다.
//!
//! # 예시
//!
//! ```ignore
//! use graphbolt_driver::{AccessMode, AuthToken, Driver, SessionConfig};
//!
//! let driver = Driver::new("neo4j://core1:7687", AuthToken::basic("graph", "password"))?;
//!
//! // 읽기 세션 (팔로워로 라우팅)
//! let session = driver.session(SessionConfig::builder().with_read_access().build())?;
//! let result = session.run("MATCH (n) RETURN count(n) AS n", None).await?;
//!
//! driver.close().await?;
//! ```

mod pool;
mod table;

pub use pool::ClusterConnectionPool;
pub use table::{RoutingRole, RoutingTable, Server};
