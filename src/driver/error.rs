//! Driver Error Types
//!
//! 드라이버 에러 정의

use std::io;

use thiserror::Error;

use crate::bolt::BoltError;

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 연결 에러 (핸드셰이크, 전송 실패, 닫힌 세션 사용)
    #[error("Connection error: {0}")]
    Connection(String),

    /// 인증 에러
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// 프로토콜 에러 (잘못된 응답, 세션 폐기 대상)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 서버가 보고한 실패
    #[error("Database error: {code} - {message}")]
    Database { code: String, message: String },

    /// 세션 에러
    #[error("Session error: {0}")]
    Session(String),

    /// 트랜잭션 에러
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// 타임아웃 에러
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 풀 에러
    #[error("Pool error: {0}")]
    Pool(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 서비스 불가 (모든 라우팅 후보 실패 등)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 대응하는 wait 없이 post 호출
    #[error("Semaphore underflow for key {key}")]
    SemaphoreUnderflow { key: String },

    /// 예약 문자가 포함된 캐시 키
    #[error("Invalid cache key: {key}")]
    InvalidCacheKey { key: String },

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// 연결 에러 생성
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// 인증 에러 생성
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 서버 실패 에러 생성
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 세션 에러 생성
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// 트랜잭션 에러 생성
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 풀 에러 생성
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 서비스 불가 에러 생성
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// 서버 에러 코드 (`Database` 에러만)
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => Some(code),
            _ => None,
        }
    }

    /// 재시도 가능 여부
    ///
    /// 일시적 서버 상태(리더 재선출, 일시적 불가)와 연결 단절만 재시도 대상입니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::ServiceUnavailable(_) => true,
            Self::Database { code, .. } => is_retryable_code(code),
            _ => false,
        }
    }

    /// 다른 주소로 넘어가야 하는 연결 계열 에러인지
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Io(_) | Self::Timeout(_) | Self::ServiceUnavailable(_)
        )
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Authentication(_) | Self::Configuration(_) => true,
            Self::Database { code, .. } => code.starts_with("Neo.ClientError"),
            _ => false,
        }
    }
}

/// 재시도 가능한 에러 코드 확인
fn is_retryable_code(code: &str) -> bool {
    match code {
        // 사용자/서버가 명시적으로 중단한 트랜잭션
        "Neo.TransientError.Transaction.Terminated"
        | "Neo.TransientError.Transaction.LockClientStopped" => false,
        "Neo.ClientError.Cluster.NotALeader"
        | "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase" => true,
        _ => code.starts_with("Neo.TransientError"),
    }
}

impl From<BoltError> for DriverError {
    fn from(err: BoltError) -> Self {
        if err.is_transport() {
            DriverError::Connection(err.to_string())
        } else {
            DriverError::Protocol(err.to_string())
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::connection("Connection refused");
        assert_eq!(err.to_string(), "Connection error: Connection refused");

        let err = DriverError::database("Neo.ClientError.Statement.SyntaxError", "Invalid syntax");
        assert_eq!(
            err.to_string(),
            "Database error: Neo.ClientError.Statement.SyntaxError - Invalid syntax"
        );
    }

    #[test]
    fn test_driver_error_retryable() {
        assert!(DriverError::database("Neo.ClientError.Cluster.NotALeader", "").is_retryable());
        assert!(DriverError::database("Neo.TransientError.General.DatabaseUnavailable", "")
            .is_retryable());
        assert!(!DriverError::database("Neo.TransientError.Transaction.Terminated", "")
            .is_retryable());
        assert!(!DriverError::database("Neo.ClientError.Statement.SyntaxError", "")
            .is_retryable());
        assert!(DriverError::connection("reset by peer").is_retryable());
        assert!(!DriverError::authentication("Invalid credentials").is_retryable());
        assert!(!DriverError::SemaphoreUnderflow { key: "k".into() }.is_retryable());
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(DriverError::connection("refused").is_connection_error());
        assert!(DriverError::timeout("connect").is_connection_error());
        assert!(!DriverError::database("Neo.ClientError.Database.DatabaseNotFound", "")
            .is_connection_error());
        assert!(!DriverError::protocol("bad").is_connection_error());
    }

    #[test]
    fn test_client_error() {
        assert!(DriverError::authentication("Invalid credentials").is_client_error());
        assert!(DriverError::database("Neo.ClientError.Statement.SyntaxError", "").is_client_error());
        assert!(!DriverError::connection("Connection refused").is_client_error());
    }

    #[test]
    fn test_from_bolt_error() {
        let err: DriverError = BoltError::ConnectionClosed.into();
        assert!(matches!(err, DriverError::Connection(_)));

        let err: DriverError = BoltError::protocol("unexpected tag").into();
        assert!(matches!(err, DriverError::Protocol(_)));

        let err: DriverError = BoltError::Timeout(std::time::Duration::from_secs(1)).into();
        assert!(matches!(err, DriverError::Connection(_)));
    }

    #[test]
    fn test_code_accessor() {
        let err = DriverError::database("Neo.ClientError.Cluster.NotALeader", "not leader");
        assert_eq!(err.code(), Some("Neo.ClientError.Cluster.NotALeader"));
        assert_eq!(DriverError::pool("closed").code(), None);
    }
}
