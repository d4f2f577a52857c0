//! # Cistern connection pool
//!
//! A bounded pool of reusable backend connections for tokio services.
//! Provides an initial fill, on-demand replenishment up to a ceiling,
//! idle reaping back down to the floor, and checkout through a guard that
//! returns the connection when dropped.
//!
//! ```no_run
//! use cistern_pool::{Pool, PoolConfig, TcpConnector};
//!
//! # async fn run() -> cistern_pool::Result<()> {
//! let config = PoolConfig::load("pool.ini").await?;
//! let pool = Pool::connect(config, TcpConnector::new()).await?;
//!
//! let conn = pool.acquire().await?;
//! // use `conn`; it goes back to the pool at the end of scope
//! drop(conn);
//!
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod guard;
pub mod lazy;
pub mod pool;
pub mod stats;
pub mod tcp;
pub mod testing;

mod handle;
mod queue;
mod reaper;
mod replenish;

pub use config::{ConfigSource, Credentials, Endpoint, PoolConfig};
pub use connection::{Connection, Connector};
pub use error::{Error, Result};
pub use guard::PooledConnection;
pub use lazy::{LazyPool, LazyState};
pub use pool::{Pool, PoolState};
pub use stats::PoolStats;
pub use tcp::{TcpConnection, TcpConnector};
