//! 트랜잭션 재시도
//!
//! 트랜잭션을 만들고, 핸들러를 실행하고, 커밋합니다. 재시도 가능한 에러면
//! 롤백 후 마감 시각 전까지 바로 다시 시도합니다 (백오프 없음).
//! 마감이 지나면 마지막 에러를 그대로 돌려줍니다.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::time::Instant;

use super::error::DriverResult;

/// 재시도 헬퍼가 다룰 수 있는 트랜잭션
#[async_trait]
pub trait RetryableTransaction: Send {
    /// 커밋 (북마크 반환)
    async fn commit(&mut self) -> DriverResult<Option<String>>;

    /// 롤백
    async fn rollback(&mut self) -> DriverResult<()>;
}

/// 재시도 설정
#[derive(Debug, Clone, Default)]
pub struct RetryConfig {
    /// 첫 시도부터의 재시도 한도 (`None`이면 무제한)
    pub timeout: Option<Duration>,
}

impl RetryConfig {
    /// 한도 지정
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// 재시도하며 트랜잭션 실행
pub async fn retry<Tx, T, F, Fut, H>(
    mut factory: F,
    mut handler: H,
    config: &RetryConfig,
) -> DriverResult<T>
where
    Tx: RetryableTransaction,
    F: FnMut() -> Fut,
    Fut: Future<Output = DriverResult<Tx>>,
    H: for<'a> FnMut(&'a mut Tx) -> BoxFuture<'a, DriverResult<T>>,
{
    let deadline = config.timeout.map(|timeout| Instant::now() + timeout);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let error = match factory().await {
            Err(e) => e,
            Ok(mut tx) => match handler(&mut tx).await {
                Ok(value) => match tx.commit().await {
                    Ok(_) => return Ok(value),
                    Err(e) => e,
                },
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        tracing::debug!(error = %rollback, "rollback after failed attempt failed");
                    }
                    e
                }
            },
        };

        let expired = deadline.map_or(false, |deadline| Instant::now() >= deadline);
        if !error.is_retryable() || expired {
            return Err(error);
        }
        tracing::debug!(attempt, error = %error, "retrying transaction");
    }
}

// ============================================================================
// Tests
// ============================================================================
