//! 라우팅 테이블
//!
//! 클러스터 토폴로지의 불변 스냅샷. 조회할 때마다 통째로 교체됩니다.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::bolt::{BoltMap, PackStreamValue};

use super::super::error::{DriverError, DriverResult};

// ============================================================================
// RoutingRole - 서버 역할
// ============================================================================

/// 서버 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingRole {
    /// 쓰기 처리 (`WRITE`)
    Leader,
    /// 읽기 처리 (`READ`)
    Follower,
    /// 라우팅 테이블 제공 (`ROUTE`)
    Router,
}

impl RoutingRole {
    /// 프로토콜 문자열에서 파싱
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "WRITE" => Some(Self::Leader),
            "READ" => Some(Self::Follower),
            "ROUTE" => Some(Self::Router),
            _ => None,
        }
    }

    /// 프로토콜 문자열
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Leader => "WRITE",
            Self::Follower => "READ",
            Self::Router => "ROUTE",
        }
    }
}

// ============================================================================
// Server - 역할별 주소 묶음
// ============================================================================

/// 같은 역할의 서버 주소들 (서로 교체 가능)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    /// `host:port` 주소들
    pub addresses: BTreeSet<String>,
    /// 역할
    pub role: RoutingRole,
}

impl Server {
    /// 새 항목 생성
    pub fn new<I, S>(role: RoutingRole, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
            role,
        }
    }
}

// ============================================================================
// RoutingTable
// ============================================================================

/// 라우팅 테이블
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    expires_at: Instant,
    ttl: Duration,
    database: Option<String>,
    servers: Vec<Server>,
}

impl RoutingTable {
    /// 새 테이블 생성 (`expires_at = fetched_at + ttl`)
    pub fn new(
        ttl: Duration,
        database: Option<String>,
        servers: Vec<Server>,
        fetched_at: Instant,
    ) -> Self {
        Self {
            expires_at: fetched_at + ttl,
            ttl,
            database,
            servers,
        }
    }

    /// `{ttl, servers: [{addresses, role}], db}` 형식에서 파싱
    ///
    /// 알 수 없는 역할은 무시합니다.
    pub fn from_metadata(rt: &BoltMap, fetched_at: Instant) -> DriverResult<Self> {
        let ttl = rt
            .get("ttl")
            .and_then(PackStreamValue::as_int)
            .ok_or_else(|| DriverError::protocol("Routing table without integer 'ttl'"))?;
        let entries = rt
            .get("servers")
            .and_then(PackStreamValue::as_list)
            .ok_or_else(|| DriverError::protocol("Routing table without 'servers' list"))?;

        let mut servers = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry
                .as_map()
                .ok_or_else(|| DriverError::protocol("Routing table server entry is not a map"))?;
            let role = entry.get("role").and_then(PackStreamValue::as_str);
            let Some(role) = role.and_then(RoutingRole::from_wire) else {
                tracing::debug!(?role, "ignoring routing entry with unknown role");
                continue;
            };
            let addresses = entry
                .get("addresses")
                .and_then(PackStreamValue::as_string_list)
                .ok_or_else(|| DriverError::protocol("Routing table entry without addresses"))?;
            servers.push(Server::new(role, addresses));
        }

        let database = rt
            .get("db")
            .and_then(PackStreamValue::as_str)
            .map(str::to_string);

        Ok(Self::new(
            Duration::from_secs(ttl.max(0) as u64),
            database,
            servers,
            fetched_at,
        ))
    }

    /// 역할에 맞는 주소들의 중복 없는 합집합 (`None`이면 모든 역할)
    ///
    /// 순서는 테이블에 나온 순서를 따릅니다.
    pub fn get_with_role(&self, role: Option<RoutingRole>) -> Vec<String> {
        let mut seen = HashSet::new();
        self.servers
            .iter()
            .filter(|server| role.map_or(true, |r| server.role == r))
            .flat_map(|server| server.addresses.iter())
            .filter(|address| seen.insert(address.as_str()))
            .cloned()
            .collect()
    }

    /// 만료 여부
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// 주어진 시각 기준 만료 여부
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// 만료 시각
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 데이터베이스 이름 (서버가 알려준 경우)
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// 서버 목록
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(role: &str, addresses: &[&str]) -> PackStreamValue {
        let mut map = BoltMap::new();
        map.insert("role".to_string(), role.into());
        map.insert(
            "addresses".to_string(),
            addresses
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .into(),
        );
        PackStreamValue::Map(map)
    }

    fn metadata(ttl: i64) -> BoltMap {
        let mut rt = BoltMap::new();
        rt.insert("ttl".to_string(), ttl.into());
        rt.insert(
            "servers".to_string(),
            PackStreamValue::List(vec![
                entry("WRITE", &["b:7687", "c:7687"]),
                entry("READ", &["b:7687", "d:7687"]),
                entry("ROUTE", &["a:7687", "b:7687"]),
                entry("ARBITER", &["x:7687"]),
            ]),
        );
        rt.insert("db".to_string(), "movies".into());
        rt
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(RoutingRole::from_wire("WRITE"), Some(RoutingRole::Leader));
        assert_eq!(RoutingRole::from_wire("READ"), Some(RoutingRole::Follower));
        assert_eq!(RoutingRole::from_wire("ROUTE"), Some(RoutingRole::Router));
        assert_eq!(RoutingRole::from_wire("write"), None);
        assert_eq!(RoutingRole::Leader.as_wire(), "WRITE");
    }

    #[test]
    fn test_from_metadata() {
        let now = Instant::now();
        let table = RoutingTable::from_metadata(&metadata(10), now).unwrap();

        assert_eq!(table.ttl(), Duration::from_secs(10));
        assert_eq!(table.expires_at(), now + Duration::from_secs(10));
        assert_eq!(table.database(), Some("movies"));
        assert_eq!(table.servers().len(), 3);
    }

    #[test]
    fn test_from_metadata_rejects_malformed() {
        let now = Instant::now();
        let mut rt = metadata(10);
        rt.remove("ttl");
        assert!(matches!(
            RoutingTable::from_metadata(&rt, now),
            Err(DriverError::Protocol(_))
        ));

        let mut rt = metadata(10);
        rt.insert("servers".to_string(), "nope".into());
        assert!(RoutingTable::from_metadata(&rt, now).is_err());
    }

    #[test]
    fn test_get_with_role() {
        let table = RoutingTable::from_metadata(&metadata(10), Instant::now()).unwrap();

        assert_eq!(table.get_with_role(Some(RoutingRole::Leader)), vec!["b:7687", "c:7687"]);
        assert_eq!(table.get_with_role(Some(RoutingRole::Follower)), vec!["b:7687", "d:7687"]);
        assert_eq!(
            table.get_with_role(None),
            vec!["b:7687", "c:7687", "d:7687", "a:7687"]
        );
    }

    #[test]
    fn test_duplicate_role_entries_are_merged() {
        let table = RoutingTable::new(
            Duration::from_secs(1),
            None,
            vec![
                Server::new(RoutingRole::Follower, ["r1:1", "r2:1"]),
                Server::new(RoutingRole::Follower, ["r2:1", "r3:1"]),
            ],
            Instant::now(),
        );
        assert_eq!(
            table.get_with_role(Some(RoutingRole::Follower)),
            vec!["r1:1", "r2:1", "r3:1"]
        );
        assert!(table.get_with_role(Some(RoutingRole::Leader)).is_empty());
    }

    #[test]
    fn test_expiry() {
        let fetched = Instant::now();
        let table = RoutingTable::from_metadata(&metadata(10), fetched).unwrap();

        assert!(!table.is_expired_at(fetched));
        assert!(!table.is_expired_at(fetched + Duration::from_secs(9)));
        assert!(table.is_expired_at(fetched + Duration::from_secs(10)));

        let zero = RoutingTable::from_metadata(&metadata(-5), fetched).unwrap();
        assert_eq!(zero.ttl(), Duration::ZERO);
        assert!(zero.is_expired_at(fetched));
    }
}
