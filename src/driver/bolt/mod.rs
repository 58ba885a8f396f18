//! Bolt protocol session for the driver.
//!
//! ```text
//! BoltClient (protocol session, ServerState tracking)
//!   ├── Box<dyn BoltTransport>   (BoltConnection: TCP + framing)
//!   ├── Arc<dyn Connector>       (rebuilds the transport on open())
//!   └── message shaping below    (per-version request payloads)
//! ```
//!
//! Every payload builder matches exhaustively on [`BoltVersion`] capabilities
//! and leaves default-valued fields off the wire.

pub mod client;
pub mod connection;
#[cfg(test)]
pub(crate) mod mock;
pub mod state;

use std::time::Duration;

pub use client::{BoltClient, PullBatch, RunSummary};
pub use connection::{BoltConnection, BoltTransport, Connector, TcpConnector};
pub use state::ServerState;

use crate::bolt::{
    AuthStyle, BoltMap, BoltRequest, BoltVersion, PackStreamValue, PullStyle, RouteStyle,
};

use super::driver::AuthToken;
use super::error::{DriverError, DriverResult};
use super::session::AccessMode;

/// Topology procedure for Bolt 3.0.
pub const LEGACY_ROUTING_PROCEDURE: &str = "CALL dbms.cluster.routing.getRoutingTable($context)";

/// Topology procedure for Bolt 4.0 to 4.2.
pub const ROUTING_PROCEDURE: &str = "CALL dbms.routing.getRoutingTable($context, $database)";

/// Database the 4.0–4.2 routing procedure runs against.
pub const SYSTEM_DATABASE: &str = "system";

// ============================================================================
// Options
// ============================================================================

/// Notification filter sent in HELLO (Bolt 5.2+).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    /// `OFF`, `WARNING` or `INFORMATION`.
    pub minimum_severity: Option<String>,
    /// Categories the server should not report.
    pub disabled_categories: Option<Vec<String>>,
}

impl NotificationFilter {
    /// Whether nothing would be sent.
    pub fn is_empty(&self) -> bool {
        self.minimum_severity.is_none() && self.disabled_categories.is_none()
    }
}

/// Per-driver settings every protocol session shares.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// `user_agent` in HELLO.
    pub user_agent: String,
    /// Routing context; `Some` only for routed drivers.
    pub routing_context: Option<BoltMap>,
    /// Notification filter.
    pub notification_filter: NotificationFilter,
    /// Default PULL batch size, `-1` for everything.
    pub fetch_size: i64,
    /// Read timeout the transport was created with, for logs.
    pub read_timeout: Option<Duration>,
}

impl ClientOptions {
    /// Options with the given user agent.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            routing_context: None,
            notification_filter: NotificationFilter::default(),
            fetch_size: 1000,
            read_timeout: None,
        }
    }

    /// Send a routing context in HELLO.
    pub fn with_routing_context(mut self, context: BoltMap) -> Self {
        self.routing_context = Some(context);
        self
    }

    /// Set the notification filter.
    pub fn with_notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.notification_filter = filter;
        self
    }

    /// Set the PULL batch size.
    pub fn with_fetch_size(mut self, fetch_size: i64) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// Record the transport read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new(format!("graphbolt-driver/{}", env!("CARGO_PKG_VERSION")))
    }
}

/// Extra fields of an auto-commit RUN or a BEGIN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    /// Bookmarks to wait for.
    pub bookmarks: Vec<String>,
    /// Server-side transaction timeout.
    pub tx_timeout: Option<Duration>,
    /// Transaction metadata.
    pub tx_metadata: BoltMap,
    /// Access mode.
    pub mode: AccessMode,
    /// Target database.
    pub database: Option<String>,
    /// Impersonated user.
    pub imp_user: Option<String>,
    /// Records per PULL; the client default when unset. Not sent with RUN.
    pub fetch_size: Option<i64>,
}

/// BEGIN takes the same fields as an auto-commit RUN.
pub type BeginOptions = RunOptions;

impl RunOptions {
    /// Set bookmarks.
    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Set the transaction timeout.
    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = Some(timeout);
        self
    }

    /// Set transaction metadata.
    pub fn with_tx_metadata(mut self, metadata: BoltMap) -> Self {
        self.tx_metadata = metadata;
        self
    }

    /// Set the access mode.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the impersonated user.
    pub fn with_imp_user(mut self, user: impl Into<String>) -> Self {
        self.imp_user = Some(user.into());
        self
    }

    /// Set the PULL batch size.
    pub fn with_fetch_size(mut self, fetch_size: i64) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }
}

// ============================================================================
// Payloads
// ============================================================================

fn bolt_agent(user_agent: &str) -> BoltMap {
    let mut agent = BoltMap::new();
    agent.insert("product".to_string(), user_agent.into());
    agent.insert(
        "platform".to_string(),
        format!("{}; {}", std::env::consts::OS, std::env::consts::ARCH).into(),
    );
    agent.insert("language".to_string(), "Rust".into());
    agent
}

/// HELLO for the negotiated version.
pub fn hello(version: BoltVersion, options: &ClientOptions, auth: &AuthToken) -> BoltRequest {
    let mut extra = BoltMap::new();
    extra.insert("user_agent".to_string(), options.user_agent.as_str().into());

    match version.auth_style() {
        AuthStyle::InHello => extra.extend(auth.to_map()),
        AuthStyle::Logon => {}
    }

    if version.supports_utc_patch() {
        extra.insert("patch_bolt".to_string(), vec!["utc".to_string()].into());
    }

    if version.supports_hello_routing() {
        if let Some(context) = &options.routing_context {
            extra.insert("routing".to_string(), PackStreamValue::Map(context.clone()));
        }
    }

    if version.supports_notification_filters() {
        let filter = &options.notification_filter;
        if let Some(severity) = &filter.minimum_severity {
            extra.insert(
                "notifications_minimum_severity".to_string(),
                severity.as_str().into(),
            );
        }
        if let Some(categories) = &filter.disabled_categories {
            extra.insert(
                "notifications_disabled_categories".to_string(),
                categories.clone().into(),
            );
        }
    }

    if version.supports_bolt_agent() {
        extra.insert(
            "bolt_agent".to_string(),
            PackStreamValue::Map(bolt_agent(&options.user_agent)),
        );
    }

    BoltRequest::Hello { extra }
}

/// LOGON (Bolt 5.1+).
pub fn logon(version: BoltVersion, auth: &AuthToken) -> DriverResult<BoltRequest> {
    match version.auth_style() {
        AuthStyle::Logon => Ok(BoltRequest::Logon { auth: auth.to_map() }),
        AuthStyle::InHello => Err(DriverError::protocol(format!(
            "LOGON is not available on Bolt {}",
            version
        ))),
    }
}

/// Extra map of an auto-commit RUN or a BEGIN.
pub fn transaction_extra(version: BoltVersion, options: &RunOptions) -> DriverResult<BoltMap> {
    let mut extra = BoltMap::new();

    if !options.bookmarks.is_empty() {
        extra.insert("bookmarks".to_string(), options.bookmarks.clone().into());
    }
    if let Some(timeout) = options.tx_timeout {
        extra.insert(
            "tx_timeout".to_string(),
            PackStreamValue::Integer(timeout.as_millis().min(i64::MAX as u128) as i64),
        );
    }
    if !options.tx_metadata.is_empty() {
        extra.insert(
            "tx_metadata".to_string(),
            PackStreamValue::Map(options.tx_metadata.clone()),
        );
    }
    if options.mode == AccessMode::Read {
        extra.insert("mode".to_string(), "r".into());
    }

    if let Some(database) = &options.database {
        if version == BoltVersion::V3 {
            return Err(DriverError::configuration(
                "Database selection requires Bolt 4.0 or later",
            ));
        }
        extra.insert("db".to_string(), database.as_str().into());
    }
    if let Some(user) = &options.imp_user {
        if !version.supports_impersonation() {
            return Err(DriverError::configuration(format!(
                "Impersonation is not supported on Bolt {}",
                version
            )));
        }
        extra.insert("imp_user".to_string(), user.as_str().into());
    }

    Ok(extra)
}

/// `n` is always sent; `None` means the whole stream (-1).
fn stream_extra(n: Option<i64>, qid: Option<i64>) -> BoltMap {
    let mut extra = BoltMap::new();
    extra.insert("n".to_string(), n.unwrap_or(-1).into());
    if let Some(qid) = qid {
        extra.insert("qid".to_string(), qid.into());
    }
    extra
}

/// PULL for the negotiated version.
pub fn pull(version: BoltVersion, n: Option<i64>, qid: Option<i64>) -> BoltRequest {
    match version.pull_style() {
        PullStyle::All => BoltRequest::PullAll,
        PullStyle::Batched => BoltRequest::Pull {
            extra: stream_extra(n, qid),
        },
    }
}

/// DISCARD for the negotiated version.
pub fn discard(version: BoltVersion, n: Option<i64>, qid: Option<i64>) -> BoltRequest {
    match version.pull_style() {
        PullStyle::All => BoltRequest::DiscardAll,
        PullStyle::Batched => BoltRequest::Discard {
            extra: stream_extra(n, qid),
        },
    }
}

/// Topology query shaped for the negotiated version.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteQuery {
    /// ROUTE message; the table is in the SUCCESS metadata under `rt`.
    Message(BoltRequest),
    /// Routing procedure RUN; the table comes back as a `[ttl, servers]` record.
    Procedure(BoltRequest),
}

/// Build the topology query.
pub fn route(
    version: BoltVersion,
    context: &BoltMap,
    bookmarks: &[String],
    database: Option<&str>,
    imp_user: Option<&str>,
) -> DriverResult<RouteQuery> {
    let unsupported_impersonation = || {
        DriverError::configuration(format!(
            "Impersonation is not supported on Bolt {}",
            version
        ))
    };

    match version.route_style() {
        RouteStyle::RouteWithExtra => {
            let mut target = BoltMap::new();
            if let Some(database) = database {
                target.insert("db".to_string(), database.into());
            }
            if let Some(user) = imp_user {
                target.insert("imp_user".to_string(), user.into());
            }
            Ok(RouteQuery::Message(BoltRequest::Route {
                routing: context.clone(),
                bookmarks: bookmarks.to_vec(),
                target: PackStreamValue::Map(target),
            }))
        }
        RouteStyle::RouteWithDatabase => {
            if imp_user.is_some() {
                return Err(unsupported_impersonation());
            }
            Ok(RouteQuery::Message(BoltRequest::Route {
                routing: context.clone(),
                bookmarks: bookmarks.to_vec(),
                target: database.into(),
            }))
        }
        RouteStyle::DatabaseProcedure => {
            if imp_user.is_some() {
                return Err(unsupported_impersonation());
            }
            let mut parameters = BoltMap::new();
            parameters.insert("context".to_string(), PackStreamValue::Map(context.clone()));
            parameters.insert("database".to_string(), database.into());
            let options = RunOptions::default()
                .with_bookmarks(bookmarks.to_vec())
                .with_mode(AccessMode::Read)
                .with_database(SYSTEM_DATABASE);
            Ok(RouteQuery::Procedure(BoltRequest::Run {
                query: ROUTING_PROCEDURE.to_string(),
                parameters,
                extra: transaction_extra(version, &options)?,
            }))
        }
        RouteStyle::LegacyProcedure => {
            if database.is_some() {
                return Err(DriverError::configuration(
                    "Database selection requires Bolt 4.0 or later",
                ));
            }
            if imp_user.is_some() {
                return Err(unsupported_impersonation());
            }
            let mut parameters = BoltMap::new();
            parameters.insert("context".to_string(), PackStreamValue::Map(context.clone()));
            let options = RunOptions::default()
                .with_bookmarks(bookmarks.to_vec())
                .with_mode(AccessMode::Read);
            Ok(RouteQuery::Procedure(BoltRequest::Run {
                query: LEGACY_ROUTING_PROCEDURE.to_string(),
                parameters,
                extra: transaction_extra(version, &options)?,
            }))
        }
    }
}
