//! # GraphBolt Driver
//!
//! A cluster-aware Rust driver for graph databases that speak the Bolt protocol
//! (versions 3.0, 4.0 - 4.4 and 5.0 - 5.4).
//!
//! ## Features
//!
//! - **Bolt 3 to 5.4** - Version-aware HELLO/LOGON, RUN/PULL, transactions and routing
//! - **Admission control** - A counting semaphore per (user agent, host, port), optionally
//!   shared across processes through lock files
//! - **Connection pooling** - Idle session reuse with RESET on checkout
//! - **Cluster routing** - `neo4j://` drivers fetch routing tables, cache them for their TTL
//!   and fail over across resolver candidates
//! - **Transaction functions** - Automatic retry of transient failures until a deadline
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use graphbolt_driver::{params, AuthToken, Driver, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Driver::new(
//!         "bolt://localhost:7687",
//!         AuthToken::basic("graph", "password"),
//!     )?;
//!
//!     let session = driver.session(
//!         SessionConfig::builder()
//!             .with_database("graph")
//!             .with_write_access()
//!             .build(),
//!     )?;
//!
//!     let result = session
//!         .run(
//!             "CREATE (n:Person {name: $name}) RETURN n",
//!             Some(params! {"name" => "Alice"}),
//!         )
//!         .await?;
//!     for record in result {
//!         println!("{:?}", record);
//!     }
//!
//!     session.close();
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Transaction Functions
//!
//! ```rust,no_run
//! # use graphbolt_driver::{AuthToken, BoltMap, Driver, SessionConfig};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let driver = Driver::new("neo4j://core1:7687", AuthToken::basic("u", "p"))?;
//! let session = driver.session(SessionConfig::default())?;
//! let count = session
//!     .execute_read(|tx| {
//!         Box::pin(async move {
//!             let result = tx.run("MATCH (n) RETURN count(n) AS n", BoltMap::new()).await?;
//!             result.single()?.get_int("n")
//!         })
//!     })
//!     .await?;
//! # let _ = count;
//! # Ok(())
//! # }
//! ```
//!
//! ## Sharing pools between drivers
//!
//! Drivers on one [`PoolManager`] share admission slots per host. Sessions are only
//! reused between drivers whose credentials, connector and client options match.
//!
//! ```rust
//! use std::sync::Arc;
//! use graphbolt_driver::{AuthToken, Driver, PoolManager};
//!
//! let manager = Arc::new(PoolManager::default());
//! let a = Driver::builder("bolt://db1:7687", AuthToken::none())
//!     .unwrap()
//!     .with_pool_manager(manager.clone())
//!     .build();
//! let b = Driver::builder("bolt://db1:7687", AuthToken::none())
//!     .unwrap()
//!     .with_pool_manager(manager)
//!     .build();
//! # let _ = (a, b);
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Driver, sessions, transactions, pools and routing
//! - [`bolt`] - Bolt wire layer: PackStream, message codec and handshake
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    AccessMode, AuthToken, Bookmark, Driver, DriverConfig, DriverConfigBuilder, DriverError,
    DriverResult, PoolManager, QueryResult, Record, ServerAddress, Session, SessionConfig,
    SessionConfigBuilder, Transaction, TransactionConfig, Value,
};

pub use bolt::{BoltError, BoltMap, BoltVersion, PackStreamValue};

/// Config alias for convenience
pub type Config = DriverConfig;
