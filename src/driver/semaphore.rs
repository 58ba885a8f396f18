//! Admission Semaphore
//!
//! 풀 키별 동시 연결 수를 제한하는 카운팅 세마포어.
//!
//! - [`LocalSemaphore`]: 프로세스 내부 카운터 (tokio 세마포어)
//! - [`FileLockSemaphore`]: 파일 잠금 기반, 여러 프로세스가 같은 서버를 공유할 때 사용 (unix)
//!
//! 대기 중인 `wait()` future를 drop 하거나 취소 토큰을 취소하면 슬롯을 소비하지 않고 끝납니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::DriverError;

/// 대기 중 진행 상황 보고 주기
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// SemaphoreError
// ============================================================================

/// 세마포어 에러
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemaphoreError {
    /// 대응하는 wait 없이 post
    Underflow { key: String },
    /// 취소 토큰으로 대기 포기
    Cancelled { elapsed: Duration },
    /// 타임아웃까지 슬롯을 얻지 못함
    TimedOut { elapsed: Duration },
    /// 기반 자원 사용 불가 (닫힌 세마포어, 잠금 파일 I/O)
    Unavailable(String),
}

impl fmt::Display for SemaphoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemaphoreError::Underflow { key } => write!(f, "semaphore underflow for {}", key),
            SemaphoreError::Cancelled { elapsed } => write!(f, "wait cancelled after {:?}", elapsed),
            SemaphoreError::TimedOut { elapsed } => write!(f, "no slot free after {:?}", elapsed),
            SemaphoreError::Unavailable(msg) => write!(f, "semaphore unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SemaphoreError {}

impl From<SemaphoreError> for DriverError {
    fn from(err: SemaphoreError) -> Self {
        match err {
            SemaphoreError::Underflow { key } => DriverError::SemaphoreUnderflow { key },
            SemaphoreError::TimedOut { elapsed } => DriverError::timeout(format!(
                "connection acquisition timed out after {:?}",
                elapsed
            )),
            other => DriverError::pool(other.to_string()),
        }
    }
}

/// 세마포어 결과 타입
pub type SemaphoreResult<T> = Result<T, SemaphoreError>;

// ============================================================================
// AdmissionSemaphore
// ============================================================================

/// 키별 카운팅 세마포어
#[async_trait]
pub trait AdmissionSemaphore: Send + Sync + fmt::Debug {
    /// 세마포어 키
    fn key(&self) -> &str;

    /// 최대 동시 슬롯 수
    fn max(&self) -> usize;

    /// 이 인스턴스를 통해 획득된 슬롯 수
    fn outstanding(&self) -> usize;

    /// 대기하지 않고 슬롯 획득 시도
    fn try_wait(&self) -> SemaphoreResult<bool>;

    /// 슬롯이 빌 때까지 대기
    ///
    /// 대기 중 [`PROGRESS_INTERVAL`]마다 `progress(경과 시간)`을 호출하고,
    /// 성공 시 총 대기 시간을 반환합니다. `timeout`이 `None`이면 무기한 대기합니다.
    async fn wait(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(Duration) + Send),
    ) -> SemaphoreResult<Duration>;

    /// 슬롯 반환
    fn post(&self) -> SemaphoreResult<()>;
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

// ============================================================================
// LocalSemaphore - 프로세스 내부
// ============================================================================

/// 프로세스 내부 세마포어
pub struct LocalSemaphore {
    key: String,
    max: usize,
    permits: Semaphore,
    outstanding: AtomicUsize,
}

impl LocalSemaphore {
    /// 새 세마포어 생성
    pub fn new(key: impl Into<String>, max: usize) -> Self {
        Self {
            key: key.into(),
            max,
            permits: Semaphore::new(max),
            outstanding: AtomicUsize::new(0),
        }
    }

    fn record_acquired(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AdmissionSemaphore for LocalSemaphore {
    fn key(&self) -> &str {
        &self.key
    }

    fn max(&self) -> usize {
        self.max
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn try_wait(&self) -> SemaphoreResult<bool> {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.record_acquired();
                Ok(true)
            }
            Err(TryAcquireError::NoPermits) => Ok(false),
            Err(TryAcquireError::Closed) => Err(SemaphoreError::Unavailable(self.key.clone())),
        }
    }

    async fn wait(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(Duration) + Send),
    ) -> SemaphoreResult<Duration> {
        let start = Instant::now();
        let deadline = timeout.map(|t| start + t);

        let acquire = self.permits.acquire();
        tokio::pin!(acquire);
        let expiry = sleep_until_opt(deadline);
        tokio::pin!(expiry);
        let mut ticker = tokio::time::interval_at(start + PROGRESS_INTERVAL, PROGRESS_INTERVAL);

        loop {
            tokio::select! {
                biased;
                permit = &mut acquire => {
                    let permit = permit.map_err(|_| SemaphoreError::Unavailable(self.key.clone()))?;
                    permit.forget();
                    self.record_acquired();
                    return Ok(start.elapsed());
                }
                _ = cancel.cancelled() => {
                    return Err(SemaphoreError::Cancelled { elapsed: start.elapsed() });
                }
                _ = &mut expiry => {
                    return Err(SemaphoreError::TimedOut { elapsed: start.elapsed() });
                }
                _ = ticker.tick() => progress(start.elapsed()),
            }
        }
    }

    fn post(&self) -> SemaphoreResult<()> {
        self.outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| SemaphoreError::Underflow {
                key: self.key.clone(),
            })?;
        self.permits.add_permits(1);
        Ok(())
    }
}

impl fmt::Debug for LocalSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSemaphore")
            .field("key", &self.key)
            .field("max", &self.max)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

// ============================================================================
// FileLockSemaphore - 프로세스 간 (unix)
// ============================================================================

/// 키에서 안정적인 64비트 해시 (FNV-1a). 프로세스와 빌드에 관계없이 같은 값.
pub fn stable_key_hash(key: &str) -> u64 {
    key.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[cfg(unix)]
pub use file_lock::FileLockSemaphore;

#[cfg(unix)]
mod file_lock {
    use std::fs::{File, OpenOptions};
    use std::os::unix::io::AsRawFd;
    use std::path::PathBuf;

    use nix::errno::Errno;
    use nix::fcntl::{flock, FlockArg};

    use super::*;

    /// 잠금 파일 폴링 주기
    const POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// `flock(2)` 기반 세마포어
    ///
    /// 슬롯 하나가 잠금 파일 하나입니다. 같은 디렉터리와 키를 쓰는 모든 프로세스가
    /// 같은 `max`개의 파일을 두고 경쟁하므로 합계가 `max`를 넘지 않습니다.
    /// 프로세스가 죽으면 커널이 잠금을 풀어 슬롯이 자동 회수됩니다.
    pub struct FileLockSemaphore {
        key: String,
        max: usize,
        dir: PathBuf,
        hash: u64,
        held: Mutex<Vec<(usize, File)>>,
    }

    impl FileLockSemaphore {
        /// 새 세마포어 생성
        pub fn new(key: impl Into<String>, max: usize, dir: impl Into<PathBuf>) -> Self {
            let key = key.into();
            Self {
                hash: stable_key_hash(&key),
                key,
                max,
                dir: dir.into(),
                held: Mutex::new(Vec::new()),
            }
        }

        fn slot_path(&self, slot: usize) -> PathBuf {
            self.dir
                .join(format!("graphbolt-{:016x}-{}.lock", self.hash, slot))
        }

        fn open_slot(&self, slot: usize) -> SemaphoreResult<File> {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(self.slot_path(slot))
                .map_err(|e| SemaphoreError::Unavailable(e.to_string()))
        }
    }

    #[async_trait]
    impl AdmissionSemaphore for FileLockSemaphore {
        fn key(&self) -> &str {
            &self.key
        }

        fn max(&self) -> usize {
            self.max
        }

        fn outstanding(&self) -> usize {
            self.held.lock().len()
        }

        fn try_wait(&self) -> SemaphoreResult<bool> {
            let mut held = self.held.lock();
            for slot in 0..self.max {
                if held.iter().any(|(s, _)| *s == slot) {
                    continue;
                }
                let file = self.open_slot(slot)?;
                match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
                    Ok(()) => {
                        held.push((slot, file));
                        return Ok(true);
                    }
                    Err(e) if e == Errno::EWOULDBLOCK || e == Errno::EINTR => continue,
                    Err(e) => return Err(SemaphoreError::Unavailable(e.to_string())),
                }
            }
            Ok(false)
        }

        async fn wait(
            &self,
            timeout: Option<Duration>,
            cancel: &CancellationToken,
            progress: &mut (dyn FnMut(Duration) + Send),
        ) -> SemaphoreResult<Duration> {
            let start = Instant::now();
            let deadline = timeout.map(|t| start + t);
            let mut last_report = start;

            loop {
                if self.try_wait()? {
                    return Ok(start.elapsed());
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(SemaphoreError::TimedOut {
                        elapsed: start.elapsed(),
                    });
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(SemaphoreError::Cancelled { elapsed: start.elapsed() });
                    }
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }
                if last_report.elapsed() >= PROGRESS_INTERVAL {
                    last_report = Instant::now();
                    progress(start.elapsed());
                }
            }
        }

        fn post(&self) -> SemaphoreResult<()> {
            // 파일을 닫으면 잠금이 풀린다
            match self.held.lock().pop() {
                Some(_) => Ok(()),
                None => Err(SemaphoreError::Underflow {
                    key: self.key.clone(),
                }),
            }
        }
    }

    impl fmt::Debug for FileLockSemaphore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("FileLockSemaphore")
                .field("key", &self.key)
                .field("max", &self.max)
                .field("dir", &self.dir)
                .field("outstanding", &self.outstanding())
                .finish()
        }
    }
}

// ============================================================================
// SemaphoreRegistry - 키별 단일 인스턴스
// ============================================================================

/// 세마포어 구현 전략
#[derive(Debug, Clone, Default)]
pub enum SemaphoreStrategy {
    /// 프로세스 내부 카운터
    #[default]
    Local,
    /// 디렉터리의 잠금 파일로 프로세스 간 조정
    #[cfg(unix)]
    FileLock {
        /// 잠금 파일 디렉터리
        dir: std::path::PathBuf,
    },
}

/// 키별 세마포어를 한 번만 생성해 공유하는 레지스트리
#[derive(Debug, Default)]
pub struct SemaphoreRegistry {
    strategy: SemaphoreStrategy,
    semaphores: Mutex<HashMap<String, Arc<dyn AdmissionSemaphore>>>,
}

impl SemaphoreRegistry {
    /// 새 레지스트리 생성
    pub fn new(strategy: SemaphoreStrategy) -> Self {
        Self {
            strategy,
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    /// 키의 세마포어를 가져오거나 생성
    ///
    /// 이미 존재하는 키는 처음 생성할 때의 `max`를 유지합니다.
    pub fn get_or_create(&self, key: &str, max: usize) -> Arc<dyn AdmissionSemaphore> {
        let mut semaphores = self.semaphores.lock();
        if let Some(existing) = semaphores.get(key) {
            return existing.clone();
        }

        let semaphore: Arc<dyn AdmissionSemaphore> = match &self.strategy {
            SemaphoreStrategy::Local => Arc::new(LocalSemaphore::new(key, max)),
            #[cfg(unix)]
            SemaphoreStrategy::FileLock { dir } => {
                Arc::new(FileLockSemaphore::new(key, max, dir.clone()))
            }
        };
        tracing::debug!(key, max, strategy = ?self.strategy, "created admission semaphore");
        semaphores.insert(key.to_string(), semaphore.clone());
        semaphore
    }

    /// 등록된 세마포어 수
    pub fn len(&self) -> usize {
        self.semaphores.lock().len()
    }

    /// 비어 있는지
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 사용 중인 전략
    pub fn strategy(&self) -> &SemaphoreStrategy {
        &self.strategy
    }
}

// ============================================================================
// Tests
// ============================================================================
