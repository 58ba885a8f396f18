//! 명시적 트랜잭션
//!
//! `Open → {Committed, RolledBack}`. 종료 상태에서는 모든 작업이 트랜잭션 에러입니다.
//! 실패한 `run`/`commit`은 세션을 RESET하고 `RolledBack`으로 넘어갑니다.
//! 트랜잭션이 끝나거나 드롭되면 세션은 풀로 돌아갑니다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::bolt::BoltMap;

use super::bolt::{BeginOptions, RunOptions};
use super::error::{DriverError, DriverResult};
use super::pool::PooledSession;
use super::record::{QueryResult, Value};
use super::retry::RetryableTransaction;
use super::session::Bookmark;

// ============================================================================
// TransactionConfig - 트랜잭션 설정
// ============================================================================

/// 트랜잭션 설정
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// 서버 측 타임아웃
    pub timeout: Option<Duration>,
    /// 메타데이터
    pub metadata: BoltMap,
}

impl TransactionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 타임아웃 설정
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// TransactionState - 트랜잭션 상태
// ============================================================================

/// 트랜잭션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// 진행 중
    Open,
    /// 커밋됨
    Committed,
    /// 롤백됨
    RolledBack,
}

impl TransactionState {
    /// 종료 상태 여부
    pub fn is_terminated(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

// ============================================================================
// Transaction - 트랜잭션
// ============================================================================

/// 명시적 트랜잭션
pub struct Transaction {
    /// 빌린 세션 (종료되면 `None`)
    session: Option<PooledSession>,
    config: TransactionConfig,
    state: TransactionState,
    bookmark: Option<String>,
    /// 커밋 북마크를 받을 곳 (세션의 북마크 목록)
    bookmark_sink: Option<Arc<RwLock<Vec<Bookmark>>>>,
}

impl Transaction {
    /// BEGIN 전송
    ///
    /// `config`의 타임아웃과 메타데이터가 `options`에 덧붙습니다.
    pub async fn begin(
        mut session: PooledSession,
        config: &TransactionConfig,
        options: BeginOptions,
    ) -> DriverResult<Self> {
        let mut options = options;
        if let Some(timeout) = config.timeout {
            options = options.with_tx_timeout(timeout);
        }
        if !config.metadata.is_empty() {
            options = options.with_tx_metadata(config.metadata.clone());
        }

        if let Err(e) = session.begin(&options).await {
            if session.is_open() {
                let _ = session.reset().await;
            }
            session.release();
            return Err(e);
        }

        tracing::trace!(id = session.id(), "transaction started");
        Ok(Self {
            session: Some(session),
            config: config.clone(),
            state: TransactionState::Open,
            bookmark: None,
            bookmark_sink: None,
        })
    }

    pub(crate) fn with_bookmark_sink(mut self, sink: Arc<RwLock<Vec<Bookmark>>>) -> Self {
        self.bookmark_sink = Some(sink);
        self
    }

    fn ensure_open(&self) -> DriverResult<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            TransactionState::Committed => {
                Err(DriverError::transaction("Transaction already committed"))
            }
            TransactionState::RolledBack => {
                Err(DriverError::transaction("Transaction already rolled back"))
            }
        }
    }

    fn session_mut(&mut self) -> DriverResult<&mut PooledSession> {
        self.session
            .as_mut()
            .ok_or_else(|| DriverError::transaction("Transaction has no session"))
    }

    /// 실패 처리: RESET 후 세션 반환
    async fn abort(&mut self) {
        self.state = TransactionState::RolledBack;
        if let Some(mut session) = self.session.take() {
            if session.is_open() {
                if let Err(e) = session.reset().await {
                    tracing::debug!(error = %e, "reset after failed transaction failed");
                }
            }
            session.release();
        }
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        if let Some(session) = self.session.take() {
            session.release();
        }
    }

    /// 쿼리 실행
    pub async fn run(&mut self, query: &str, parameters: BoltMap) -> DriverResult<QueryResult> {
        self.ensure_open()?;
        let session = self.session_mut()?;
        match session
            .run_and_pull(query, parameters, &RunOptions::default())
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    /// 커밋. 서버가 북마크를 돌려주면 반환합니다.
    pub async fn commit(&mut self) -> DriverResult<Option<String>> {
        self.ensure_open()?;
        let session = self.session_mut()?;
        match session.commit().await {
            Ok(bookmark) => {
                if let (Some(bookmark), Some(sink)) = (&bookmark, &self.bookmark_sink) {
                    *sink.write() = vec![Bookmark::new(bookmark.clone())];
                }
                self.bookmark = bookmark.clone();
                self.finish(TransactionState::Committed);
                Ok(bookmark)
            }
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    /// 롤백
    pub async fn rollback(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        let session = self.session_mut()?;
        match session.rollback().await {
            Ok(()) => {
                self.finish(TransactionState::RolledBack);
                Ok(())
            }
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    /// 트랜잭션 상태
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// 커밋 북마크
    pub fn bookmark(&self) -> Option<&str> {
        self.bookmark.as_deref()
    }

    /// 설정
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }
}

#[async_trait]
impl RetryableTransaction for Transaction {
    async fn commit(&mut self) -> DriverResult<Option<String>> {
        Transaction::commit(self).await
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        Transaction::rollback(self).await
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // 열린 채로 드롭되면 세션만 반환. 다음 획득 때 RESET이 서버 트랜잭션을 정리
        if self.session.is_some() {
            tracing::debug!("open transaction dropped; returning session to the pool");
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("bookmark", &self.bookmark)
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
    use crate::driver::bolt::{ClientOptions, ServerState};
    use crate::driver::driver::{AuthToken, ServerAddress};
    use crate::driver::pool::{ConnectionPool, PoolConfig, PoolSettings};
    use crate::driver::semaphore::LocalSemaphore;
    use crate::driver::session::SessionConfig;

    const ADDRESS: &str = "db1:7687";

    fn pool(server: &MockServer) -> ConnectionPool {
        ConnectionPool::new(
            ServerAddress::parse(ADDRESS, 7687).unwrap(),
            PoolSettings {
                connector: server.connector(),
                auth: AuthToken::none(),
                options: Arc::new(ClientOptions::default()),
                config: PoolConfig::default(),
            },
            Arc::new(LocalSemaphore::new(ADDRESS, 1)),
        )
    }

    async fn begin(pool: &ConnectionPool, config: &TransactionConfig) -> Transaction {
        let session = pool.acquire(&SessionConfig::default()).await.unwrap();
        Transaction::begin(session, config, BeginOptions::default().with_database("movies"))
            .await
            .unwrap()
    }

    #[test]
    fn test_transaction_config() {
        let config = TransactionConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_metadata("app", "test");

        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.metadata.get("app"), Some(&Value::String("test".into())));
    }

    #[tokio::test]
    async fn test_commit_returns_bookmark_and_releases() {
        let server = MockServer::new();
        let pool = pool(&server);
        let config = TransactionConfig::new()
            .with_timeout(Duration::from_millis(1500))
            .with_metadata("app", "test");
        let mut tx = begin(&pool, &config).await;
        assert_eq!(pool.metrics().in_use, 1);

        let result = tx.run("CREATE (n) RETURN 1 AS n", BoltMap::new()).await.unwrap();
        assert_eq!(result.len(), 1);

        let bookmark = tx.commit().await.unwrap();
        assert_eq!(bookmark.as_deref(), Some("bm:1"));
        assert_eq!(tx.bookmark(), Some("bm:1"));
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(pool.metrics().in_use, 0);
        assert_eq!(pool.metrics().idle, 1);

        match &server.requests(ADDRESS)[2] {
            BoltRequest::Begin { extra } => {
                assert_eq!(extra.get("tx_timeout"), Some(&PackStreamValue::Integer(1500)));
                assert!(extra.contains_key("tx_metadata"));
                assert_eq!(extra.get("db"), Some(&"movies".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_operations_after_end_fail() {
        let server = MockServer::new();
        let pool = pool(&server);

        let mut tx = begin(&pool, &TransactionConfig::default()).await;
        tx.commit().await.unwrap();
        assert!(matches!(tx.commit().await, Err(DriverError::Transaction(_))));
        assert!(matches!(tx.rollback().await, Err(DriverError::Transaction(_))));
        assert!(matches!(
            tx.run("RETURN 1", BoltMap::new()).await,
            Err(DriverError::Transaction(_))
        ));

        let mut tx = begin(&pool, &TransactionConfig::default()).await;
        tx.rollback().await.unwrap();
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert!(matches!(tx.commit().await, Err(DriverError::Transaction(_))));
        assert_eq!(server.count_requests(ADDRESS, "ROLLBACK"), 1);
    }

    #[tokio::test]
    async fn test_failed_run_resets_and_rolls_back() {
        let server = MockServer::new();
        server.set_handler(|_, request| match request {
            BoltRequest::Run { query, .. } if query == "BAD" => Some(vec![BoltResponse::Failure {
                code: "Neo.ClientError.Statement.SyntaxError".to_string(),
                message: "Invalid input".to_string(),
            }]),
            _ => None,
        });
        let pool = pool(&server);

        let mut tx = begin(&pool, &TransactionConfig::default()).await;
        let err = tx.run("BAD", BoltMap::new()).await.unwrap_err();
        assert_eq!(err.code(), Some("Neo.ClientError.Statement.SyntaxError"));
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(server.count_requests(ADDRESS, "RESET"), 1);
        assert_eq!(pool.metrics().idle, 1);

        // the session came back clean
        let session = pool.acquire(&SessionConfig::default()).await.unwrap();
        assert_eq!(session.state(), ServerState::Ready);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let server = MockServer::new();
        server.set_handler(|_, request| match request {
            BoltRequest::Commit => Some(vec![BoltResponse::Failure {
                code: "Neo.TransientError.Transaction.DeadlockDetected".to_string(),
                message: "deadlock".to_string(),
            }]),
            _ => None,
        });
        let pool = pool(&server);

        let mut tx = begin(&pool, &TransactionConfig::default()).await;
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(pool.metrics().in_use, 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_returns_session() {
        let server = MockServer::new();
        let pool = pool(&server);

        let tx = begin(&pool, &TransactionConfig::default()).await;
        drop(tx);
        assert_eq!(pool.metrics().in_use, 0);

        // the server-side transaction is cleared on the next checkout
        let session = pool.acquire(&SessionConfig::default()).await.unwrap();
        assert_eq!(session.state(), ServerState::Ready);
        assert_eq!(server.count_requests(ADDRESS, "RESET"), 1);
    }

    #[tokio::test]
    async fn test_begin_failure_releases_session() {
        let server = MockServer::new();
        server.set_handler(|_, request| match request {
            BoltRequest::Begin { .. } => Some(vec![BoltResponse::Failure {
                code: "Neo.ClientError.Database.DatabaseNotFound".to_string(),
                message: "no such database".to_string(),
            }]),
            _ => None,
        });
        let pool = pool(&server);

        let session = pool.acquire(&SessionConfig::default()).await.unwrap();
        let err = Transaction::begin(session, &TransactionConfig::default(), BeginOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("Neo.ClientError.Database.DatabaseNotFound"));
        assert_eq!(pool.metrics().in_use, 0);
        assert_eq!(pool.metrics().idle, 1);
    }
}
