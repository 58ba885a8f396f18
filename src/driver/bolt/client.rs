//! Protocol session.
//!
//! A [`BoltClient`] owns one transport, tracks the assumed server state and
//! shapes every request for the negotiated version. It is exclusively owned
//! by one caller for the duration of a pool checkout.
//!
//! Failure handling:
//! - FAILURE becomes [`DriverError::Database`] and the state moves to FAILED
//!   until [`reset`](BoltClient::reset).
//! - Transport, framing or timeout errors invalidate the session: the socket
//!   is dropped and every later call fails with a connection error.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::Instant;

use crate::bolt::{
    AuthStyle, BoltError, BoltMap, BoltRequest, BoltResponse, BoltVersion, MessageKind,
    PackStreamValue,
};

use super::super::driver::{AuthToken, ServerAddress};
use super::super::error::{DriverError, DriverResult};
use super::super::record::{QueryResult, Record, Value};
use super::super::routing::RoutingTable;
use super::super::session::AccessMode;
use super::connection::{BoltTransport, Connector};
use super::state::ServerState;
use super::{BeginOptions, ClientOptions, RouteQuery, RunOptions};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// SUCCESS of a RUN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Column names.
    pub keys: Vec<String>,
    /// Query id inside an explicit transaction (Bolt 4+).
    pub qid: Option<i64>,
    /// Full metadata.
    pub metadata: BoltMap,
}

/// Records and summary of one PULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullBatch {
    /// Raw record values.
    pub records: Vec<Vec<Value>>,
    /// Whether the server holds more records.
    pub has_more: bool,
    /// Summary metadata.
    pub metadata: BoltMap,
}

/// One protocol session.
pub struct BoltClient {
    id: u64,
    address: ServerAddress,
    connector: Arc<dyn Connector>,
    auth: AuthToken,
    options: Arc<ClientOptions>,
    transport: Option<Box<dyn BoltTransport>>,
    version: Option<BoltVersion>,
    state: ServerState,
    server_agent: Option<String>,
    connection_id: Option<String>,
    access_mode: AccessMode,
    database: Option<String>,
}

impl BoltClient {
    /// Create a closed session; call [`open`](Self::open) to connect.
    pub fn new(
        address: ServerAddress,
        connector: Arc<dyn Connector>,
        auth: AuthToken,
        options: Arc<ClientOptions>,
    ) -> Self {
        Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            address,
            connector,
            auth,
            options,
            transport: None,
            version: None,
            state: ServerState::Disconnected,
            server_agent: None,
            connection_id: None,
            access_mode: AccessMode::default(),
            database: None,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Connect, send HELLO and authenticate.
    ///
    /// Bolt 5.1+ authenticates with a separate LOGON after HELLO.
    pub async fn open(&mut self) -> DriverResult<()> {
        if self.transport.is_some() {
            return Err(DriverError::connection(format!(
                "Session {} to {} is already open",
                self.id, self.address
            )));
        }

        let transport = self
            .connector
            .connect(&self.address)
            .await
            .map_err(|e| DriverError::connection(format!("{}: {}", self.address, e)))?;
        let version = transport.version();
        self.transport = Some(transport);
        self.version = Some(version);
        self.state = ServerState::Disconnected;

        let hello = super::hello(version, &self.options, &self.auth);
        let metadata = match self.request(hello).await {
            Ok(metadata) => metadata,
            Err(e) => return Err(self.abandon_open(e).await),
        };
        self.server_agent = metadata
            .get("server")
            .and_then(PackStreamValue::as_str)
            .map(str::to_string);
        self.connection_id = metadata
            .get("connection_id")
            .and_then(PackStreamValue::as_str)
            .map(str::to_string);

        if version.auth_style() == AuthStyle::Logon {
            let logon = super::logon(version, &self.auth)?;
            if let Err(e) = self.request(logon).await {
                return Err(self.abandon_open(e).await);
            }
        }

        tracing::debug!(
            id = self.id,
            address = %self.address,
            %version,
            agent = ?self.server_agent,
            connection_id = ?self.connection_id,
            "session opened"
        );
        Ok(())
    }

    async fn abandon_open(&mut self, err: DriverError) -> DriverError {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown().await;
        }
        self.state = ServerState::Defunct;
        match err {
            DriverError::Database { code, message } if code.starts_with("Neo.ClientError.Security") => {
                DriverError::authentication(format!("{}: {}", code, message))
            }
            other => other,
        }
    }

    /// Whether the session can be used.
    pub fn is_open(&self) -> bool {
        self.transport.is_some() && self.state != ServerState::Defunct
    }

    /// Send GOODBYE and drop the socket.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if transport.send(BoltRequest::Goodbye).is_ok() {
                let _ = transport.flush().await;
            }
            transport.shutdown().await;
            tracing::debug!(id = self.id, address = %self.address, "session closed");
        }
        if let Some(version) = self.version {
            self.state = self.state.on_success(MessageKind::Goodbye, false, version);
        } else {
            self.state = ServerState::Defunct;
        }
    }

    fn invalidate(&mut self, reason: &BoltError) {
        tracing::warn!(
            id = self.id,
            address = %self.address,
            error = %reason,
            "invalidating session"
        );
        self.transport = None;
        self.state = ServerState::Defunct;
    }

    // ------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------

    fn closed_error(&self) -> DriverError {
        DriverError::connection(format!(
            "Session {} to {} is closed",
            self.id, self.address
        ))
    }

    fn negotiated(&self) -> DriverResult<BoltVersion> {
        match (&self.transport, self.version) {
            (Some(_), Some(version)) if self.state != ServerState::Defunct => Ok(version),
            _ => Err(self.closed_error()),
        }
    }

    fn transport_error(&mut self, err: BoltError) -> DriverError {
        self.invalidate(&err);
        match DriverError::from(err) {
            DriverError::Connection(msg) => {
                DriverError::connection(format!("{}: {}", self.address, msg))
            }
            other => other,
        }
    }

    fn send(&mut self, request: BoltRequest) -> DriverResult<()> {
        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => return Err(self.closed_error()),
        };
        tracing::trace!(id = self.id, request = ?request.redacted(), "C:");
        match transport.send(request) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.transport_error(e)),
        }
    }

    async fn flush(&mut self) -> DriverResult<()> {
        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => return Err(self.closed_error()),
        };
        match transport.flush().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.transport_error(e)),
        }
    }

    /// Read responses up to the summary of `kind`, collecting records.
    async fn receive(
        &mut self,
        kind: MessageKind,
        mut records: Option<&mut Vec<Vec<Value>>>,
    ) -> DriverResult<BoltMap> {
        let version = self.negotiated()?;
        loop {
            let transport = match self.transport.as_mut() {
                Some(transport) => transport,
                None => return Err(self.closed_error()),
            };
            let response = match transport.recv().await {
                Ok(response) => response,
                Err(e) => return Err(self.transport_error(e)),
            };
            tracing::trace!(id = self.id, response = response.name(), "S:");

            match response {
                BoltResponse::Record(values) => match records.as_mut() {
                    Some(records) => records.push(values),
                    None => {
                        let err = BoltError::protocol(format!("unexpected RECORD for {}", kind));
                        return Err(self.transport_error(err));
                    }
                },
                BoltResponse::Success(metadata) => {
                    let has_more = metadata
                        .get("has_more")
                        .and_then(PackStreamValue::as_bool)
                        .unwrap_or(false);
                    self.state = self.state.on_success(kind, has_more, version);
                    return Ok(metadata);
                }
                BoltResponse::Failure { code, message } => {
                    self.state = self.state.on_failure(kind);
                    tracing::debug!(id = self.id, %kind, %code, "request failed");
                    return Err(DriverError::database(code, message));
                }
                BoltResponse::Ignored => {
                    self.state = self.state.on_ignored();
                    return Err(DriverError::session(format!(
                        "{} was ignored by the server; the session needs a reset",
                        kind
                    )));
                }
            }
        }
    }

    async fn request(&mut self, request: BoltRequest) -> DriverResult<BoltMap> {
        let kind = request.kind();
        self.send(request)?;
        self.flush().await?;
        self.receive(kind, None).await
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    /// LOGON with new credentials (Bolt 5.1+, state AUTHENTICATION).
    pub async fn logon(&mut self, auth: &AuthToken) -> DriverResult<()> {
        let version = self.negotiated()?;
        let request = super::logon(version, auth)?;
        self.request(request).await?;
        self.auth = auth.clone();
        Ok(())
    }

    /// LOGOFF (Bolt 5.1+).
    pub async fn logoff(&mut self) -> DriverResult<()> {
        let version = self.negotiated()?;
        if version.auth_style() != AuthStyle::Logon {
            return Err(DriverError::protocol(format!(
                "LOGOFF is not available on Bolt {}",
                version
            )));
        }
        self.request(BoltRequest::Logoff).await.map(|_| ())
    }

    /// Swap credentials without reconnecting (Bolt 5.1+).
    pub async fn reauthenticate(&mut self, auth: AuthToken) -> DriverResult<()> {
        self.logoff().await?;
        self.logon(&auth).await
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn run_request(
        &self,
        version: BoltVersion,
        query: &str,
        parameters: BoltMap,
        options: &RunOptions,
    ) -> DriverResult<BoltRequest> {
        // inside an explicit transaction the extra fields were sent with BEGIN
        let extra = if self.state.in_transaction() {
            BoltMap::new()
        } else {
            super::transaction_extra(version, options)?
        };
        Ok(BoltRequest::Run {
            query: query.to_string(),
            parameters,
            extra,
        })
    }

    /// RUN a query; records are fetched with [`pull`](Self::pull).
    pub async fn run(
        &mut self,
        query: &str,
        parameters: BoltMap,
        options: &RunOptions,
    ) -> DriverResult<RunSummary> {
        let version = self.negotiated()?;
        let request = self.run_request(version, query, parameters, options)?;
        let metadata = self.request(request).await?;
        Ok(run_summary(metadata))
    }

    /// PULL up to `n` records (`None` or `-1`: all) of query `qid` (`None`: last).
    pub async fn pull(&mut self, n: Option<i64>, qid: Option<i64>) -> DriverResult<PullBatch> {
        let version = self.negotiated()?;
        self.send(super::pull(version, n, qid))?;
        self.flush().await?;
        self.receive_batch().await
    }

    async fn receive_batch(&mut self) -> DriverResult<PullBatch> {
        let mut records = Vec::new();
        let metadata = self.receive(MessageKind::Pull, Some(&mut records)).await?;
        let has_more = metadata
            .get("has_more")
            .and_then(PackStreamValue::as_bool)
            .unwrap_or(false);
        Ok(PullBatch {
            records,
            has_more,
            metadata,
        })
    }

    /// DISCARD remaining records.
    pub async fn discard(&mut self, n: Option<i64>, qid: Option<i64>) -> DriverResult<BoltMap> {
        let version = self.negotiated()?;
        self.send(super::discard(version, n, qid))?;
        self.flush().await?;
        self.receive(MessageKind::Discard, None).await
    }

    /// RUN and PULL in one round trip, then keep pulling while `has_more`.
    pub async fn run_and_pull(
        &mut self,
        query: &str,
        parameters: BoltMap,
        options: &RunOptions,
    ) -> DriverResult<QueryResult> {
        let version = self.negotiated()?;
        let fetch_size = Some(options.fetch_size.unwrap_or(self.options.fetch_size));
        let request = self.run_request(version, query, parameters, options)?;

        self.send(request)?;
        self.send(super::pull(version, fetch_size, None))?;
        self.flush().await?;

        let summary = match self.receive(MessageKind::Run, None).await {
            Ok(metadata) => run_summary(metadata),
            Err(e) => {
                // the pipelined PULL is answered with IGNORED
                if self.is_open() {
                    let _ = self.receive(MessageKind::Pull, None).await;
                }
                return Err(e);
            }
        };

        let mut rows = Vec::new();
        let mut batch = self.receive_batch().await?;
        loop {
            rows.append(&mut batch.records);
            if !batch.has_more {
                break;
            }
            batch = self.pull(fetch_size, summary.qid).await?;
        }

        let keys: Arc<[String]> = summary.keys.iter().cloned().collect();
        let records = rows
            .into_iter()
            .map(|values| Record::new(keys.clone(), values))
            .collect();
        let metadata = batch.metadata;

        Ok(QueryResult {
            keys: summary.keys,
            records,
            bookmark: metadata
                .get("bookmark")
                .and_then(PackStreamValue::as_str)
                .map(str::to_string),
            database: metadata
                .get("db")
                .and_then(PackStreamValue::as_str)
                .map(str::to_string),
            metadata,
        })
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// BEGIN an explicit transaction.
    pub async fn begin(&mut self, options: &BeginOptions) -> DriverResult<()> {
        let version = self.negotiated()?;
        let extra = super::transaction_extra(version, options)?;
        self.request(BoltRequest::Begin { extra }).await.map(|_| ())
    }

    /// COMMIT; returns the bookmark of the transaction if the server sent one.
    pub async fn commit(&mut self) -> DriverResult<Option<String>> {
        let metadata = self.request(BoltRequest::Commit).await?;
        Ok(metadata
            .get("bookmark")
            .and_then(PackStreamValue::as_str)
            .map(str::to_string))
    }

    /// ROLLBACK.
    pub async fn rollback(&mut self) -> DriverResult<()> {
        self.request(BoltRequest::Rollback).await.map(|_| ())
    }

    /// RESET the server state to READY without reconnecting.
    ///
    /// A failed RESET leaves nothing to recover; the session is invalidated.
    pub async fn reset(&mut self) -> DriverResult<()> {
        match self.request(BoltRequest::Reset).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if self.transport.is_some() {
                    self.invalidate(&BoltError::protocol(format!("RESET failed: {}", e)));
                }
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Fetch the routing table for `database`.
    pub async fn route(
        &mut self,
        context: &BoltMap,
        bookmarks: &[String],
        database: Option<&str>,
        imp_user: Option<&str>,
    ) -> DriverResult<RoutingTable> {
        let version = self.negotiated()?;
        match super::route(version, context, bookmarks, database, imp_user)? {
            RouteQuery::Message(request) => {
                let metadata = self.request(request).await?;
                let rt = metadata
                    .get("rt")
                    .and_then(PackStreamValue::as_map)
                    .ok_or_else(|| DriverError::protocol("ROUTE response without 'rt'"))?;
                RoutingTable::from_metadata(rt, Instant::now())
            }
            RouteQuery::Procedure(run) => {
                self.send(run)?;
                self.send(super::pull(version, Some(-1), None))?;
                self.flush().await?;

                let summary = match self.receive(MessageKind::Run, None).await {
                    Ok(metadata) => run_summary(metadata),
                    Err(e) => {
                        if self.is_open() {
                            let _ = self.receive(MessageKind::Pull, None).await;
                        }
                        return Err(e);
                    }
                };
                let batch = self.receive_batch().await?;
                let row = batch
                    .records
                    .into_iter()
                    .next()
                    .ok_or_else(|| DriverError::protocol("Routing procedure returned no record"))?;

                let mut rt: BoltMap = summary.keys.into_iter().zip(row).collect();
                if let Some(database) = database {
                    rt.entry("db".to_string())
                        .or_insert_with(|| database.into());
                }
                RoutingTable::from_metadata(&rt, Instant::now())
            }
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Process-unique session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Server address.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Negotiated version, once opened.
    pub fn version(&self) -> Option<BoltVersion> {
        self.version
    }

    /// Assumed server state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// `server` field of the HELLO response, e.g. `Neo4j/5.13.0`.
    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    /// Version part of the server agent.
    pub fn server_version(&self) -> Option<&str> {
        self.server_agent
            .as_deref()
            .and_then(|agent| agent.split_once('/'))
            .map(|(_, version)| version)
    }

    /// Server-assigned connection id.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Access mode this session was checked out for.
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Relabel the access mode.
    pub fn set_access_mode(&mut self, mode: AccessMode) {
        self.access_mode = mode;
    }

    /// Database this session was checked out for.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Relabel the database.
    pub fn set_database(&mut self, database: Option<String>) {
        self.database = database;
    }
}

fn run_summary(metadata: BoltMap) -> RunSummary {
    RunSummary {
        keys: metadata
            .get("fields")
            .and_then(PackStreamValue::as_string_list)
            .unwrap_or_default(),
        qid: metadata.get("qid").and_then(PackStreamValue::as_int),
        metadata,
    }
}

impl fmt::Debug for BoltClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoltClient")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("version", &self.version)
            .field("state", &self.state)
            .field("server_agent", &self.server_agent)
            .field("access_mode", &self.access_mode)
            .field("database", &self.database)
            .finish()
    }
}
