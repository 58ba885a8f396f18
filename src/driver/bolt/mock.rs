//! In-process Bolt server for tests.
//!
//! Every address behaves like an independent server sharing one script:
//! default replies for each request kind, an optional handler that can
//! override any of them, and a routing table answered to ROUTE and to the
//! routing procedures. After a FAILURE everything but RESET is IGNORED,
//! like a real server.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::bolt::{BoltError, BoltMap, BoltRequest, BoltResponse, BoltResult, BoltVersion, PackStreamValue};

use super::super::driver::ServerAddress;
use super::connection::{BoltTransport, Connector};

type Handler = Arc<dyn Fn(&str, &BoltRequest) -> Option<Vec<BoltResponse>> + Send + Sync>;

struct MockInner {
    version: BoltVersion,
    down: Mutex<HashSet<String>>,
    log: Mutex<Vec<(String, BoltRequest)>>,
    handler: Mutex<Option<Handler>>,
    routing: Mutex<Option<BoltMap>>,
    connects: AtomicUsize,
    next_connection: AtomicU64,
    next_bookmark: AtomicU64,
}

/// Scripted server shared by every transport it hands out.
#[derive(Clone)]
pub(crate) struct MockServer {
    inner: Arc<MockInner>,
}

impl MockServer {
    pub(crate) fn new() -> Self {
        Self::with_version(BoltVersion::V5_4)
    }

    pub(crate) fn with_version(version: BoltVersion) -> Self {
        Self {
            inner: Arc::new(MockInner {
                version,
                down: Mutex::new(HashSet::new()),
                log: Mutex::new(Vec::new()),
                handler: Mutex::new(None),
                routing: Mutex::new(None),
                connects: AtomicUsize::new(0),
                next_connection: AtomicU64::new(1),
                next_bookmark: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            server: self.clone(),
        })
    }

    /// Refuse connections to `address` and break its open sockets.
    pub(crate) fn set_down(&self, address: &str, down: bool) {
        let mut set = self.inner.down.lock();
        if down {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    fn is_down(&self, address: &str) -> bool {
        self.inner.down.lock().contains(address)
    }

    /// Override replies; returning `None` falls back to the defaults.
    pub(crate) fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &BoltRequest) -> Option<Vec<BoltResponse>> + Send + Sync + 'static,
    {
        *self.inner.handler.lock() = Some(Arc::new(handler));
    }

    /// Routing table served by every address.
    pub(crate) fn set_routing_table(&self, ttl: i64, servers: Vec<(&str, Vec<&str>)>) {
        let servers = servers
            .into_iter()
            .map(|(role, addresses)| {
                let mut entry = BoltMap::new();
                entry.insert("role".to_string(), role.into());
                entry.insert(
                    "addresses".to_string(),
                    addresses
                        .into_iter()
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                        .into(),
                );
                PackStreamValue::Map(entry)
            })
            .collect::<Vec<_>>();

        let mut rt = BoltMap::new();
        rt.insert("ttl".to_string(), ttl.into());
        rt.insert("servers".to_string(), PackStreamValue::List(servers));
        *self.inner.routing.lock() = Some(rt);
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self, address: &str) -> Vec<BoltRequest> {
        self.inner
            .log
            .lock()
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub(crate) fn request_names(&self, address: &str) -> Vec<&'static str> {
        self.requests(address)
            .iter()
            .map(|r| r.kind().name())
            .collect()
    }

    pub(crate) fn count_requests(&self, address: &str, name: &str) -> usize {
        self.request_names(address)
            .into_iter()
            .filter(|n| *n == name)
            .count()
    }

    fn routing_table(&self) -> Option<BoltMap> {
        self.inner.routing.lock().clone()
    }

    fn respond(&self, address: &str, request: &BoltRequest, procedure: &mut bool) -> Vec<BoltResponse> {
        let handler = self.inner.handler.lock().clone();
        if let Some(handler) = handler {
            if let Some(responses) = handler(address, request) {
                return responses;
            }
        }

        let success = |pairs: Vec<(&str, PackStreamValue)>| {
            BoltResponse::Success(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
        };

        match request {
            BoltRequest::Hello { .. } => {
                let id = self.inner.next_connection.fetch_add(1, Ordering::SeqCst);
                vec![success(vec![
                    ("server", "Neo4j/5.13.0".into()),
                    ("connection_id", format!("bolt-{}", id).into()),
                ])]
            }
            BoltRequest::Run { query, .. } => {
                *procedure = query.starts_with("CALL dbms.");
                let fields = if *procedure {
                    vec!["ttl".to_string(), "servers".to_string()]
                } else {
                    vec!["n".to_string()]
                };
                vec![success(vec![("fields", fields.into()), ("t_first", 1i64.into())])]
            }
            BoltRequest::Pull { .. } | BoltRequest::PullAll => {
                if std::mem::take(procedure) {
                    match self.routing_table() {
                        Some(rt) => vec![
                            BoltResponse::Record(vec![
                                rt.get("ttl").cloned().unwrap_or(PackStreamValue::Null),
                                rt.get("servers").cloned().unwrap_or(PackStreamValue::Null),
                            ]),
                            success(vec![]),
                        ],
                        None => vec![not_found()],
                    }
                } else {
                    vec![
                        BoltResponse::Record(vec![PackStreamValue::Integer(1)]),
                        success(vec![("type", "r".into())]),
                    ]
                }
            }
            BoltRequest::Commit => {
                let n = self.inner.next_bookmark.fetch_add(1, Ordering::SeqCst);
                vec![success(vec![("bookmark", format!("bm:{}", n).into())])]
            }
            BoltRequest::Route { .. } => match self.routing_table() {
                Some(rt) => vec![success(vec![("rt", PackStreamValue::Map(rt))])],
                None => vec![not_found()],
            },
            BoltRequest::Goodbye => Vec::new(),
            _ => vec![success(vec![])],
        }
    }
}

fn not_found() -> BoltResponse {
    BoltResponse::Failure {
        code: "Neo.ClientError.Procedure.ProcedureNotFound".to_string(),
        message: "routing is not enabled".to_string(),
    }
}

impl fmt::Debug for MockServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockServer")
            .field("version", &self.inner.version)
            .field("connects", &self.connect_count())
            .finish()
    }
}

#[derive(Debug)]
struct MockConnector {
    server: MockServer,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &ServerAddress) -> BoltResult<Box<dyn BoltTransport>> {
        let key = address.to_string();
        if self.server.is_down(&key) {
            return Err(BoltError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        self.server.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransport {
            server: self.server.clone(),
            address: address.clone(),
            key,
            pending: Vec::new(),
            queue: VecDeque::new(),
            failed: false,
            procedure: false,
        }))
    }
}

#[derive(Debug)]
struct MockTransport {
    server: MockServer,
    address: ServerAddress,
    key: String,
    pending: Vec<BoltRequest>,
    queue: VecDeque<BoltResponse>,
    failed: bool,
    procedure: bool,
}

#[async_trait]
impl BoltTransport for MockTransport {
    fn version(&self) -> BoltVersion {
        self.server.inner.version
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn send(&mut self, request: BoltRequest) -> BoltResult<()> {
        self.pending.push(request);
        Ok(())
    }

    async fn flush(&mut self) -> BoltResult<()> {
        if self.server.is_down(&self.key) {
            self.pending.clear();
            return Err(BoltError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection reset",
            )));
        }

        for request in std::mem::take(&mut self.pending) {
            self.server
                .inner
                .log
                .lock()
                .push((self.key.clone(), request.clone()));

            if self.failed && !matches!(request, BoltRequest::Reset | BoltRequest::Goodbye) {
                self.queue.push_back(BoltResponse::Ignored);
                continue;
            }
            let responses = self.server.respond(&self.key, &request, &mut self.procedure);
            match &request {
                BoltRequest::Reset => self.failed = false,
                _ => {
                    if responses
                        .iter()
                        .any(|r| matches!(r, BoltResponse::Failure { .. }))
                    {
                        self.failed = true;
                    }
                }
            }
            self.queue.extend(responses);
        }
        Ok(())
    }

    async fn recv(&mut self) -> BoltResult<BoltResponse> {
        if self.server.is_down(&self.key) {
            return Err(BoltError::ConnectionClosed);
        }
        self.queue.pop_front().ok_or(BoltError::ConnectionClosed)
    }

    async fn shutdown(&mut self) {
        self.queue.clear();
    }
}
