//! 주소 해석기
//!
//! 라우팅 테이블 조회 시 시드 호스트 대신 시도할 후보 주소들을 만듭니다.
//! 후보는 `host` 또는 `host:port` 문자열이며, 포트가 없으면 시드 포트를 씁니다.

use std::collections::{HashMap, HashSet};
use std::fmt;

use futures::stream::{self, BoxStream, StreamExt};

// ============================================================================
// AddressResolver - 해석기 트레이트
// ============================================================================

/// 호스트 이름을 후보 주소 스트림으로 바꾸는 해석기
///
/// 스트림은 지연 평가됩니다. 앞쪽 후보로 조회가 끝나면 뒤쪽은 해석되지 않습니다.
pub trait AddressResolver: Send + Sync + fmt::Debug {
    /// 후보 주소들
    fn resolve(&self, host: &str) -> BoxStream<'static, String>;
}

// ============================================================================
// DnsResolver - DNS 해석기
// ============================================================================

/// DNS 해석기
///
/// 호스트 자신, 중복 없는 A/AAAA 결과 순으로 내보냅니다. 아무것도 해석되지
/// 않으면 `{host}.in-addr.arpa`를 다시 조회합니다.
#[derive(Debug, Clone, Default)]
pub struct DnsResolver;

impl DnsResolver {
    /// 새 해석기 생성
    pub fn new() -> Self {
        Self
    }
}

async fn lookup(name: &str) -> Vec<String> {
    match tokio::net::lookup_host((name, 0)).await {
        Ok(addrs) => addrs.map(|addr| addr.ip().to_string()).collect(),
        Err(e) => {
            tracing::debug!(%name, error = %e, "address lookup failed");
            Vec::new()
        }
    }
}

async fn resolve_alternates(host: String) -> Vec<String> {
    let mut resolved = lookup(&host).await;
    if resolved.is_empty() {
        resolved = lookup(&format!("{}.in-addr.arpa", host)).await;
    }

    let mut seen = HashSet::new();
    seen.insert(host);
    resolved.retain(|address| seen.insert(address.clone()));
    resolved
}

impl AddressResolver for DnsResolver {
    fn resolve(&self, host: &str) -> BoxStream<'static, String> {
        let host = host.to_string();
        let alternates = stream::once(resolve_alternates(host.clone())).flat_map(stream::iter);
        tokio_stream::iter(vec![host]).chain(alternates).boxed()
    }
}

// ============================================================================
// StaticResolver - 고정 해석기
// ============================================================================

/// 호스트별 고정 후보 목록
///
/// 등록되지 않은 호스트는 자기 자신만 내보냅니다.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<String>>,
}

impl StaticResolver {
    /// 빈 해석기 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 호스트의 후보 목록 등록 (호스트 자신은 항상 맨 앞)
    pub fn with<I, S>(mut self, host: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            host.into(),
            candidates.into_iter().map(Into::into).collect(),
        );
        self
    }
}

impl AddressResolver for StaticResolver {
    fn resolve(&self, host: &str) -> BoxStream<'static, String> {
        let mut candidates = vec![host.to_string()];
        if let Some(alternates) = self.entries.get(host) {
            candidates.extend(alternates.iter().filter(|a| a.as_str() != host).cloned());
        }
        tokio_stream::iter(candidates).boxed()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticResolver::new().with("seed", ["seed", "alt1:7688", "alt2"]);

        let candidates: Vec<String> = resolver.resolve("seed").collect().await;
        assert_eq!(candidates, vec!["seed", "alt1:7688", "alt2"]);

        let unknown: Vec<String> = resolver.resolve("other").collect().await;
        assert_eq!(unknown, vec!["other"]);
    }

    #[tokio::test]
    async fn test_dns_resolver_yields_host_first() {
        let resolver = DnsResolver::new();
        let candidates: Vec<String> = resolver.resolve("127.0.0.1").collect().await;
        // an IP literal resolves to itself, which is de-duplicated
        assert_eq!(candidates, vec!["127.0.0.1"]);
    }

    #[tokio::test]
    async fn test_dns_resolver_is_lazy() {
        let resolver = DnsResolver::new();
        let mut stream = resolver.resolve("localhost");
        assert_eq!(stream.next().await.as_deref(), Some("localhost"));
        // the first candidate is available without waiting for DNS
        drop(stream);
    }
}
