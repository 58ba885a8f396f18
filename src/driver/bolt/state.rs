//! Assumed server-side state.
//!
//! Older Bolt versions never report the server state, so the client tracks
//! it from the requests it sent and the summaries it got back.

use std::fmt;

use crate::bolt::{BoltVersion, MessageKind};

/// Server state as the client believes it to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// No session on the socket yet.
    Disconnected,
    /// HELLO accepted, waiting for LOGON (Bolt 5.1+).
    Authentication,
    /// Idle, accepts RUN, BEGIN and ROUTE.
    Ready,
    /// Auto-commit result open.
    Streaming,
    /// Explicit transaction open.
    TxReady,
    /// Result open inside an explicit transaction.
    TxStreaming,
    /// A request failed; everything is IGNORED until RESET.
    Failed,
    /// A request was IGNORED outside of a failure (interrupted by RESET).
    Interrupted,
    /// Unusable; the socket must be dropped.
    Defunct,
}

impl ServerState {
    /// State after a SUCCESS summary for `kind`.
    ///
    /// `has_more` is only meaningful for PULL and DISCARD.
    pub fn on_success(self, kind: MessageKind, has_more: bool, version: BoltVersion) -> Self {
        use MessageKind::*;
        use ServerState::*;

        match (self, kind) {
            (_, Goodbye) => Defunct,
            (_, Reset) => Ready,
            (Disconnected, Hello) => match version.auth_style() {
                crate::bolt::AuthStyle::InHello => Ready,
                crate::bolt::AuthStyle::Logon => Authentication,
            },
            (Authentication, Logon) => Ready,
            (Ready, Logoff) => Authentication,
            (Ready, Run) => Streaming,
            (Ready, Begin) => TxReady,
            (Ready, Route) => Ready,
            (Streaming, Pull | Discard) => {
                if has_more {
                    Streaming
                } else {
                    Ready
                }
            }
            (TxReady, Run) => TxStreaming,
            (TxReady, Commit | Rollback) => Ready,
            (TxStreaming, Pull | Discard) => {
                if has_more {
                    TxStreaming
                } else {
                    TxReady
                }
            }
            // a new query inside a transaction while an older result is still open
            (TxStreaming, Run) => TxStreaming,
            (state, _) => state,
        }
    }

    /// State after a FAILURE summary for `kind`.
    pub fn on_failure(self, kind: MessageKind) -> Self {
        match kind {
            MessageKind::Hello | MessageKind::Logon => ServerState::Defunct,
            _ => ServerState::Failed,
        }
    }

    /// State after an IGNORED summary.
    pub fn on_ignored(self) -> Self {
        match self {
            ServerState::Failed => ServerState::Failed,
            _ => ServerState::Interrupted,
        }
    }

    /// Whether RUN, BEGIN or ROUTE may be sent without a RESET first.
    pub fn is_ready(self) -> bool {
        self == ServerState::Ready
    }

    /// Whether an explicit transaction is open.
    pub fn in_transaction(self) -> bool {
        matches!(self, ServerState::TxReady | ServerState::TxStreaming)
    }

    /// State name as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            ServerState::Disconnected => "DISCONNECTED",
            ServerState::Authentication => "AUTHENTICATION",
            ServerState::Ready => "READY",
            ServerState::Streaming => "STREAMING",
            ServerState::TxReady => "TX_READY",
            ServerState::TxStreaming => "TX_STREAMING",
            ServerState::Failed => "FAILED",
            ServerState::Interrupted => "INTERRUPTED",
            ServerState::Defunct => "DEFUNCT",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
