//! Bolt request messages.

use crate::bolt::packstream::{BoltMap, PackStreamStructure, PackStreamValue};

use super::tag;
use super::MessageKind;

/// A request message as it goes on the wire.
///
/// Variants mirror wire layouts, not intents: Bolt 3 `PULL_ALL` and Bolt 4+
/// `PULL {n, qid}` are separate variants, and ROUTE carries its third field
/// already shaped for the negotiated version.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    /// `HELLO extra`
    Hello {
        /// user agent, auth (pre 5.1), routing, notification and agent metadata
        extra: BoltMap,
    },
    /// `LOGON auth`
    Logon {
        /// scheme, principal, credentials, ...
        auth: BoltMap,
    },
    /// `LOGOFF`
    Logoff,
    /// `GOODBYE`
    Goodbye,
    /// `RESET`
    Reset,
    /// `RUN query parameters extra`
    Run {
        /// Query text
        query: String,
        /// Query parameters
        parameters: BoltMap,
        /// bookmarks, tx_timeout, tx_metadata, mode, db, imp_user
        extra: BoltMap,
    },
    /// `BEGIN extra`
    Begin {
        /// bookmarks, tx_timeout, tx_metadata, mode, db, imp_user
        extra: BoltMap,
    },
    /// `COMMIT`
    Commit,
    /// `ROLLBACK`
    Rollback,
    /// `PULL {n, qid}`, Bolt 4+
    Pull {
        /// n, qid
        extra: BoltMap,
    },
    /// `PULL_ALL`, Bolt 3
    PullAll,
    /// `DISCARD {n, qid}`, Bolt 4+
    Discard {
        /// n, qid
        extra: BoltMap,
    },
    /// `DISCARD_ALL`, Bolt 3
    DiscardAll,
    /// `ROUTE routing bookmarks db|extra`
    Route {
        /// Routing context (address plus user-supplied entries)
        routing: BoltMap,
        /// Bookmarks to wait for
        bookmarks: Vec<String>,
        /// Bolt 4.3: database name or null. Bolt 4.4+: `{db, imp_user}` map.
        target: PackStreamValue,
    },
}

impl BoltRequest {
    /// Message category.
    pub fn kind(&self) -> MessageKind {
        match self {
            BoltRequest::Hello { .. } => MessageKind::Hello,
            BoltRequest::Logon { .. } => MessageKind::Logon,
            BoltRequest::Logoff => MessageKind::Logoff,
            BoltRequest::Goodbye => MessageKind::Goodbye,
            BoltRequest::Reset => MessageKind::Reset,
            BoltRequest::Run { .. } => MessageKind::Run,
            BoltRequest::Begin { .. } => MessageKind::Begin,
            BoltRequest::Commit => MessageKind::Commit,
            BoltRequest::Rollback => MessageKind::Rollback,
            BoltRequest::Pull { .. } | BoltRequest::PullAll => MessageKind::Pull,
            BoltRequest::Discard { .. } | BoltRequest::DiscardAll => MessageKind::Discard,
            BoltRequest::Route { .. } => MessageKind::Route,
        }
    }

    /// Signature byte.
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Hello { .. } => tag::HELLO,
            BoltRequest::Logon { .. } => tag::LOGON,
            BoltRequest::Logoff => tag::LOGOFF,
            BoltRequest::Goodbye => tag::GOODBYE,
            BoltRequest::Reset => tag::RESET,
            BoltRequest::Run { .. } => tag::RUN,
            BoltRequest::Begin { .. } => tag::BEGIN,
            BoltRequest::Commit => tag::COMMIT,
            BoltRequest::Rollback => tag::ROLLBACK,
            BoltRequest::Pull { .. } | BoltRequest::PullAll => tag::PULL,
            BoltRequest::Discard { .. } | BoltRequest::DiscardAll => tag::DISCARD,
            BoltRequest::Route { .. } => tag::ROUTE,
        }
    }

    /// Convert into the structure that is written to the wire.
    pub fn into_structure(self) -> PackStreamStructure {
        let tag = self.tag();
        let fields = match self {
            BoltRequest::Hello { extra } => vec![PackStreamValue::Map(extra)],
            BoltRequest::Logon { auth } => vec![PackStreamValue::Map(auth)],
            BoltRequest::Run {
                query,
                parameters,
                extra,
            } => vec![
                PackStreamValue::String(query),
                PackStreamValue::Map(parameters),
                PackStreamValue::Map(extra),
            ],
            BoltRequest::Begin { extra }
            | BoltRequest::Pull { extra }
            | BoltRequest::Discard { extra } => vec![PackStreamValue::Map(extra)],
            BoltRequest::Route {
                routing,
                bookmarks,
                target,
            } => vec![
                PackStreamValue::Map(routing),
                bookmarks.into(),
                target,
            ],
            BoltRequest::Logoff
            | BoltRequest::Goodbye
            | BoltRequest::Reset
            | BoltRequest::Commit
            | BoltRequest::Rollback
            | BoltRequest::PullAll
            | BoltRequest::DiscardAll => Vec::new(),
        };
        PackStreamStructure::new(tag, fields)
    }

    /// Copy safe for logging: credentials are masked.
    pub fn redacted(&self) -> BoltRequest {
        fn mask(map: &BoltMap) -> BoltMap {
            map.iter()
                .map(|(k, v)| {
                    let v = if k == "credentials" {
                        PackStreamValue::String("******".to_string())
                    } else {
                        v.clone()
                    };
                    (k.clone(), v)
                })
                .collect()
        }

        match self {
            BoltRequest::Hello { extra } => BoltRequest::Hello { extra: mask(extra) },
            BoltRequest::Logon { auth } => BoltRequest::Logon { auth: mask(auth) },
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_structure() {
        let request = BoltRequest::Run {
            query: "RETURN 1".to_string(),
            parameters: BoltMap::new(),
            extra: BoltMap::new(),
        };
        assert_eq!(request.kind(), MessageKind::Run);

        let s = request.into_structure();
        assert_eq!(s.tag, tag::RUN);
        assert_eq!(s.fields.len(), 3);
        assert_eq!(s.fields[0].as_str(), Some("RETURN 1"));
    }

    #[test]
    fn test_legacy_pull_has_no_fields() {
        let s = BoltRequest::PullAll.into_structure();
        assert_eq!(s.tag, tag::PULL);
        assert!(s.fields.is_empty());
        assert_eq!(BoltRequest::PullAll.kind(), MessageKind::Pull);
    }

    #[test]
    fn test_route_structure() {
        let request = BoltRequest::Route {
            routing: BoltMap::new(),
            bookmarks: vec!["bm".to_string()],
            target: PackStreamValue::String("movies".to_string()),
        };
        let s = request.into_structure();
        assert_eq!(s.tag, tag::ROUTE);
        assert_eq!(s.fields[1].as_string_list(), Some(vec!["bm".to_string()]));
        assert_eq!(s.fields[2].as_str(), Some("movies"));
    }

    #[test]
    fn test_redacted_masks_credentials() {
        let mut auth = BoltMap::new();
        auth.insert("scheme".to_string(), "basic".into());
        auth.insert("credentials".to_string(), "secret".into());

        let redacted = BoltRequest::Logon { auth }.redacted();
        let BoltRequest::Logon { auth } = redacted else {
            panic!("expected LOGON");
        };
        assert_eq!(auth["credentials"].as_str(), Some("******"));
        assert_eq!(auth["scheme"].as_str(), Some("basic"));
    }
}
