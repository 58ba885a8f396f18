//! 세션
//!
//! 드라이버에서 빌린 논리적 작업 단위. 연결은 쿼리나 트랜잭션마다 공급자에서
//! 빌리고 끝나면 돌려줍니다. 커밋 북마크를 이어 받아 인과적 일관성을 유지합니다.

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::bolt::BoltMap;

use super::bolt::RunOptions;
use super::driver::DriverConfig;
use super::error::{DriverError, DriverResult};
use super::pool::ConnectionProvider;
use super::record::QueryResult;
use super::retry::{retry, RetryConfig};
use super::transaction::{Transaction, TransactionConfig};

// ============================================================================
// AccessMode - 접근 모드
// ============================================================================

/// 접근 모드
///
/// 라우팅 드라이버에서는 쓰기는 리더로, 읽기는 팔로워로 갑니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// 읽기
    Read,
    /// 쓰기
    #[default]
    Write,
}

// ============================================================================
// Bookmark - 북마크
// ============================================================================

/// 인과적 일관성 북마크
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bookmark {
    value: String,
}

impl Bookmark {
    /// 새 북마크 생성
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// 북마크 값
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 빈 북마크 여부
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl std::fmt::Display for Bookmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<String> for Bookmark {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Bookmark {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// SessionConfig - 세션 설정
// ============================================================================

/// 세션 설정
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 데이터베이스 이름 (`None`이면 서버 기본 DB)
    pub database: Option<String>,
    /// PULL 배치 크기 (`None`이면 드라이버 설정)
    pub fetch_size: Option<i64>,
    /// 기본 접근 모드
    pub access_mode: AccessMode,
    /// 시작 북마크
    pub bookmarks: Vec<Bookmark>,
    /// 임퍼손트 사용자
    pub impersonated_user: Option<String>,
}

impl SessionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// 접근 모드 설정
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }
}

/// 세션 설정 빌더
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 새 빌더 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.config.database = Some(database.into());
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.config.fetch_size = Some(size);
        self
    }

    /// 읽기 모드로 설정
    pub fn with_read_access(mut self) -> Self {
        self.config.access_mode = AccessMode::Read;
        self
    }

    /// 쓰기 모드로 설정
    pub fn with_write_access(mut self) -> Self {
        self.config.access_mode = AccessMode::Write;
        self
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: Vec<Bookmark>) -> Self {
        self.config.bookmarks = bookmarks;
        self
    }

    /// 북마크 추가
    pub fn with_bookmark(mut self, bookmark: Bookmark) -> Self {
        self.config.bookmarks.push(bookmark);
        self
    }

    /// 임퍼손트 사용자 설정
    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.config.impersonated_user = Some(user.into());
        self
    }

    /// 빌드
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// ============================================================================
// Session - 세션
// ============================================================================

/// 데이터베이스 세션
pub struct Session {
    /// 드라이버 설정
    driver_config: Arc<DriverConfig>,
    /// 연결 공급자
    provider: Arc<dyn ConnectionProvider>,
    /// 세션 설정
    config: SessionConfig,
    /// 다음 작업이 기다릴 북마크
    bookmarks: Arc<RwLock<Vec<Bookmark>>>,
    /// 열린 상태
    open: RwLock<bool>,
}

impl Session {
    /// 새 세션 생성
    pub fn new(
        driver_config: Arc<DriverConfig>,
        provider: Arc<dyn ConnectionProvider>,
        config: SessionConfig,
    ) -> Self {
        let bookmarks = Arc::new(RwLock::new(config.bookmarks.clone()));
        Self {
            driver_config,
            provider,
            config,
            bookmarks,
            open: RwLock::new(true),
        }
    }

    fn checkout_config(&self, mode: AccessMode) -> SessionConfig {
        let mut config = self.config.clone();
        config.access_mode = mode;
        config
    }

    fn run_options(&self, mode: AccessMode) -> RunOptions {
        let bookmarks = self
            .bookmarks
            .read()
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| b.value().to_string())
            .collect();
        RunOptions {
            bookmarks,
            mode,
            database: self.config.database.clone(),
            imp_user: self.config.impersonated_user.clone(),
            fetch_size: self.config.fetch_size,
            ..RunOptions::default()
        }
    }

    /// 쿼리 실행 (auto-commit)
    pub async fn run(&self, query: &str, parameters: Option<BoltMap>) -> DriverResult<QueryResult> {
        self.ensure_open()?;
        let mode = self.config.access_mode;
        let options = self.run_options(mode);

        let mut session = self.provider.acquire(&self.checkout_config(mode)).await?;
        let result = session
            .run_and_pull(query, parameters.unwrap_or_default(), &options)
            .await;
        session.release();

        let result = result?;
        if let Some(bookmark) = &result.bookmark {
            *self.bookmarks.write() = vec![Bookmark::new(bookmark.clone())];
        }
        Ok(result)
    }

    /// 트랜잭션 시작 (세션 기본 접근 모드)
    pub async fn begin_transaction(
        &self,
        config: Option<TransactionConfig>,
    ) -> DriverResult<Transaction> {
        self.ensure_open()?;
        self.begin_with_mode(self.config.access_mode, &config.unwrap_or_default())
            .await
    }

    async fn begin_with_mode(
        &self,
        mode: AccessMode,
        config: &TransactionConfig,
    ) -> DriverResult<Transaction> {
        let options = self.run_options(mode);
        let session = self.provider.acquire(&self.checkout_config(mode)).await?;
        let tx = Transaction::begin(session, config, options).await?;
        Ok(tx.with_bookmark_sink(self.bookmarks.clone()))
    }

    /// 읽기 트랜잭션 함수 (재시도 포함)
    pub async fn execute_read<T, H>(&self, handler: H) -> DriverResult<T>
    where
        H: for<'a> FnMut(&'a mut Transaction) -> BoxFuture<'a, DriverResult<T>>,
    {
        self.execute(AccessMode::Read, handler).await
    }

    /// 쓰기 트랜잭션 함수 (재시도 포함)
    pub async fn execute_write<T, H>(&self, handler: H) -> DriverResult<T>
    where
        H: for<'a> FnMut(&'a mut Transaction) -> BoxFuture<'a, DriverResult<T>>,
    {
        self.execute(AccessMode::Write, handler).await
    }

    async fn execute<T, H>(&self, mode: AccessMode, handler: H) -> DriverResult<T>
    where
        H: for<'a> FnMut(&'a mut Transaction) -> BoxFuture<'a, DriverResult<T>>,
    {
        self.ensure_open()?;
        let retry_config = RetryConfig::with_timeout(self.driver_config.max_transaction_retry_time);
        let tx_config = TransactionConfig::default();
        let tx_config = &tx_config;
        retry(
            move || self.begin_with_mode(mode, tx_config),
            handler,
            &retry_config,
        )
        .await
    }

    /// 다음 작업이 기다릴 북마크
    pub fn last_bookmarks(&self) -> Vec<Bookmark> {
        self.bookmarks.read().clone()
    }

    /// 세션 닫기
    pub fn close(&self) {
        *self.open.write() = false;
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(DriverError::session("Session is closed"))
        }
    }

    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.config.database)
            .field("access_mode", &self.config.access_mode)
            .field("open", &*self.open.read())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::{BoltRequest, BoltResponse, PackStreamValue};
    use crate::driver::bolt::mock::MockServer;
    use crate::driver::driver::{AuthToken, Driver};
    use crate::driver::resolver::StaticResolver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn direct_driver(server: &MockServer) -> Driver {
        Driver::builder("bolt://db1:7687", AuthToken::none())
            .unwrap()
            .with_connector(server.connector())
            .build()
    }

    fn extra_of(request: &BoltRequest) -> &BoltMap {
        match request {
            BoltRequest::Run { extra, .. } | BoltRequest::Begin { extra } => extra,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_access_mode_default_is_write() {
        assert_eq!(AccessMode::default(), AccessMode::Write);
        assert_eq!(SessionConfig::default().access_mode, AccessMode::Write);
    }

    #[test]
    fn test_bookmark() {
        let bookmark = Bookmark::new("bm:tx123");
        assert_eq!(bookmark.value(), "bm:tx123");
        assert_eq!(bookmark.to_string(), "bm:tx123");
        assert!(!bookmark.is_empty());
        assert!(Bookmark::from("").is_empty());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::builder()
            .with_database("mydb")
            .with_fetch_size(500)
            .with_read_access()
            .with_bookmark(Bookmark::new("b1"))
            .with_impersonated_user("alice")
            .build();

        assert_eq!(config.database, Some("mydb".to_string()));
        assert_eq!(config.fetch_size, Some(500));
        assert_eq!(config.access_mode, AccessMode::Read);
        assert_eq!(config.bookmarks.len(), 1);
        assert_eq!(config.impersonated_user.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_auto_commit_run_carries_session_fields() {
        let server = MockServer::new();
        let driver = direct_driver(&server);
        let session = driver
            .session(
                SessionConfig::builder()
                    .with_database("movies")
                    .with_read_access()
                    .with_bookmark(Bookmark::new("bm:0"))
                    .build(),
            )
            .unwrap();

        let result = session.run("RETURN 1 AS n", None).await.unwrap();
        assert_eq!(result.single().unwrap().get_int("n").unwrap(), 1);

        let requests = server.requests("db1:7687");
        let extra = extra_of(&requests[2]);
        assert_eq!(extra.get("db"), Some(&"movies".into()));
        assert_eq!(extra.get("mode"), Some(&"r".into()));
        assert_eq!(extra.get("bookmarks"), Some(&vec!["bm:0".to_string()].into()));
        assert_eq!(driver.metrics().idle, 1);
    }

    #[tokio::test]
    async fn test_bookmarks_chain_between_transactions() {
        let server = MockServer::new();
        let driver = direct_driver(&server);
        let session = driver.default_session().unwrap();
        assert!(session.last_bookmarks().is_empty());

        let mut tx = session.begin_transaction(None).await.unwrap();
        tx.run("CREATE (n)", BoltMap::new()).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(session.last_bookmarks(), vec![Bookmark::new("bm:1")]);

        let mut tx = session.begin_transaction(None).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(session.last_bookmarks(), vec![Bookmark::new("bm:2")]);

        let begins: Vec<_> = server
            .requests("db1:7687")
            .into_iter()
            .filter(|r| matches!(r, BoltRequest::Begin { .. }))
            .collect();
        assert!(!extra_of(&begins[0]).contains_key("bookmarks"));
        assert_eq!(
            extra_of(&begins[1]).get("bookmarks"),
            Some(&vec!["bm:1".to_string()].into())
        );
    }

    #[tokio::test]
    async fn test_execute_write_retries_transient_failure() {
        let server = MockServer::new();
        let commits = Arc::new(AtomicUsize::new(0));
        {
            let commits = commits.clone();
            server.set_handler(move |_, request| match request {
                BoltRequest::Commit if commits.fetch_add(1, Ordering::SeqCst) == 0 => {
                    Some(vec![BoltResponse::Failure {
                        code: "Neo.ClientError.Cluster.NotALeader".to_string(),
                        message: "not a leader".to_string(),
                    }])
                }
                _ => None,
            });
        }
        let driver = direct_driver(&server);
        let session = driver.default_session().unwrap();

        let rows = session
            .execute_write(|tx| {
                Box::pin(async move {
                    let result = tx.run("CREATE (n) RETURN 1 AS n", BoltMap::new()).await?;
                    Ok(result.len())
                })
            })
            .await
            .unwrap();

        assert_eq!(rows, 1);
        assert_eq!(commits.load(Ordering::SeqCst), 2);
        assert_eq!(server.count_requests("db1:7687", "BEGIN"), 2);
        assert_eq!(session.last_bookmarks().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_read_routes_to_reader() {
        let server = MockServer::new();
        server.set_routing_table(
            60,
            vec![
                ("WRITE", vec!["core1:7687"]),
                ("READ", vec!["core2:7687"]),
                ("ROUTE", vec!["core1:7687"]),
            ],
        );
        let driver = Driver::builder("neo4j://core1:7687", AuthToken::none())
            .unwrap()
            .with_connector(server.connector())
            .with_resolver(Arc::new(StaticResolver::new()))
            .build();
        let session = driver.default_session().unwrap();

        let value = session
            .execute_read(|tx| {
                Box::pin(async move {
                    let result = tx.run("MATCH (n) RETURN 1 AS n", BoltMap::new()).await?;
                    result.single()?.get_int("n")
                })
            })
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(server.count_requests("core2:7687", "BEGIN"), 1);
        assert_eq!(server.count_requests("core1:7687", "BEGIN"), 0);

        match server
            .requests("core2:7687")
            .iter()
            .find(|r| matches!(r, BoltRequest::Begin { .. }))
        {
            Some(BoltRequest::Begin { extra }) => {
                assert_eq!(extra.get("mode"), Some(&PackStreamValue::from("r")))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_session_rejects_work() {
        let server = MockServer::new();
        let driver = direct_driver(&server);
        let session = driver.default_session().unwrap();
        session.close();

        assert!(matches!(
            session.run("RETURN 1", None).await,
            Err(DriverError::Session(_))
        ));
        assert!(matches!(
            session.begin_transaction(None).await,
            Err(DriverError::Session(_))
        ));
        assert_eq!(server.connect_count(), 0);
    }
}
