//! An in-process, Redis-compatible server for tests.
//!
//! This crate emulates a Redis server inside the calling process so code that
//! talks to Redis can be tested without a real one. It supports:
//!
//! - Strings, hashes, lists, sets and sorted sets, with key expiry
//! - Multiple logical databases (SELECT, MOVE, SWAPDB)
//! - Transactions with optimistic locking (MULTI, EXEC, WATCH)
//! - Blocking list operations (BLPOP, BRPOP, BRPOPLPUSH) from threads or tasks
//! - Pub/sub on channels and glob patterns
//! - Script caching, with execution delegated to a pluggable runtime
//! - A switch that simulates the server going away
//!
//! Clients speak the Redis Serialization Protocol (RESP) to a
//! [`FakeConnection`], which behaves like a socket: raw bytes go in,
//! decoded replies come out.
//!
//! ```
//! use fakeredis::{FakeServer, RespValue};
//!
//! let server = FakeServer::new();
//! let mut connection = server.connect();
//!
//! connection.execute(["SET", "greeting", "hello"]).unwrap();
//! assert_eq!(
//!     connection.execute(["GET", "greeting"]).unwrap(),
//!     RespValue::bulk("hello")
//! );
//! ```

pub mod commands;
pub mod config;
pub mod connection;
pub mod glob;
pub mod key_value_store;
pub mod pub_sub;
pub mod resp;
pub mod server;
pub mod sorted_set;

pub use commands::scripting::{
    LogLevel, ScriptError, ScriptHost, ScriptInvocation, ScriptRuntime,
};
pub use commands::CommandError;
pub use config::{ConfigError, ServerConfig};
pub use connection::{CloseHandle, ConnectionError, FakeConnection};
pub use resp::RespValue;
pub use server::FakeServer;
