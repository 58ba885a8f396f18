//! Bolt response messages.

use crate::bolt::error::{BoltError, BoltResult};
use crate::bolt::packstream::{BoltMap, PackStreamStructure, PackStreamValue};

use super::tag;

/// A response message.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    /// `SUCCESS metadata`
    Success(BoltMap),
    /// `RECORD fields`
    Record(Vec<PackStreamValue>),
    /// `IGNORED`
    Ignored,
    /// `FAILURE {code, message}`
    Failure {
        /// Server classification, e.g. `Neo.ClientError.Cluster.NotALeader`
        code: String,
        /// Human readable message
        message: String,
    },
}

impl BoltResponse {
    /// Parse a structure received from the server.
    pub fn from_structure(structure: PackStreamStructure) -> BoltResult<Self> {
        let PackStreamStructure { tag: signature, mut fields } = structure;

        match signature {
            tag::SUCCESS => match fields.pop() {
                Some(PackStreamValue::Map(meta)) => Ok(BoltResponse::Success(meta)),
                None => Ok(BoltResponse::Success(BoltMap::new())),
                Some(other) => Err(BoltError::protocol(format!(
                    "SUCCESS metadata must be a map, got {:?}",
                    other
                ))),
            },
            tag::RECORD => match fields.pop() {
                Some(PackStreamValue::List(values)) => Ok(BoltResponse::Record(values)),
                _ => Err(BoltError::protocol("RECORD must carry a list")),
            },
            tag::IGNORED => Ok(BoltResponse::Ignored),
            tag::FAILURE => {
                let meta = match fields.pop() {
                    Some(PackStreamValue::Map(meta)) => meta,
                    _ => BoltMap::new(),
                };
                let field = |key: &str| {
                    meta.get(key)
                        .and_then(PackStreamValue::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                Ok(BoltResponse::Failure {
                    code: field("code"),
                    message: field("message"),
                })
            }
            other => Err(BoltError::protocol(format!(
                "unexpected response signature 0x{:02X}",
                other
            ))),
        }
    }

    /// Convert into a structure. Used by test servers.
    pub fn into_structure(self) -> PackStreamStructure {
        match self {
            BoltResponse::Success(meta) => {
                PackStreamStructure::new(tag::SUCCESS, vec![PackStreamValue::Map(meta)])
            }
            BoltResponse::Record(values) => {
                PackStreamStructure::new(tag::RECORD, vec![PackStreamValue::List(values)])
            }
            BoltResponse::Ignored => PackStreamStructure::new(tag::IGNORED, Vec::new()),
            BoltResponse::Failure { code, message } => {
                let mut meta = BoltMap::new();
                meta.insert("code".to_string(), code.into());
                meta.insert("message".to_string(), message.into());
                PackStreamStructure::new(tag::FAILURE, vec![PackStreamValue::Map(meta)])
            }
        }
    }

    /// Response name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Ignored => "IGNORED",
            BoltResponse::Failure { .. } => "FAILURE",
        }
    }
}
