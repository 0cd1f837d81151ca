#![allow(dead_code)]

use std::sync::{Arc, Once};

use bytes::Bytes;
use fakeredis::{ConnectionError, FakeConnection, FakeServer, RespValue, ServerConfig};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Routes crate logs to the test output. Set `RUST_LOG=fakeredis=debug` to
/// see them.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Test environment containing a server and one connected client
pub struct TestEnv {
    pub server: Arc<FakeServer>,
    pub connection: FakeConnection,
}

impl TestEnv {
    /// Create a new test environment with the default configuration
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        init_tracing();
        let server = FakeServer::with_config(config);
        let connection = server.connect();
        Self { server, connection }
    }

    /// Open another client on the same server
    pub fn connect(&self) -> FakeConnection {
        self.server.connect()
    }

    /// Execute a command and return the reply
    pub fn exec(&mut self, args: &[&str]) -> Result<RespValue, ConnectionError> {
        self.connection.execute(args)
    }

    /// Execute a command and assert it replies OK
    pub fn exec_ok(&mut self, args: &[&str]) {
        assert_eq!(
            self.exec(args),
            Ok(RespValue::ok()),
            "expected OK from {:?}",
            args
        );
    }

    /// Execute a command and assert it replies with `expected`
    pub fn assert_exec(&mut self, args: &[&str], expected: RespValue) {
        assert_eq!(self.exec(args), Ok(expected), "executing {:?}", args);
    }

    /// Execute a command that must fail and return the error message
    pub fn exec_err(&mut self, args: &[&str]) -> String {
        match self.exec(args) {
            Ok(RespValue::Error(message)) => message,
            other => panic!("expected an error from {:?}, got {:?}", args, other),
        }
    }
}

/// Runs a command on an arbitrary connection, panicking on transport errors.
pub fn run(connection: &mut FakeConnection, args: &[&str]) -> RespValue {
    match connection.execute(args) {
        Ok(reply) => reply,
        Err(err) => panic!("{:?} failed at the transport level: {}", args, err),
    }
}

pub fn bulk(value: &str) -> RespValue {
    RespValue::bulk(Bytes::copy_from_slice(value.as_bytes()))
}

pub fn int(value: i64) -> RespValue {
    RespValue::Integer(value)
}

pub fn simple(value: &str) -> RespValue {
    RespValue::SimpleString(value.to_string())
}

pub fn error(message: &str) -> RespValue {
    RespValue::Error(message.to_string())
}

/// An array of bulk strings
pub fn array(values: &[&str]) -> RespValue {
    RespValue::Array(values.iter().map(|value| bulk(value)).collect())
}

/// The bulk strings of an array reply, sorted. For replies whose order is
/// unspecified, such as SMEMBERS or HKEYS.
pub fn sorted(reply: RespValue) -> Vec<String> {
    let RespValue::Array(items) = reply else {
        panic!("expected an array, got {:?}", reply);
    };
    let mut values: Vec<String> = items
        .into_iter()
        .map(|item| match item {
            RespValue::BulkString(value) => String::from_utf8_lossy(&value).into_owned(),
            other => panic!("expected a bulk string, got {:?}", other),
        })
        .collect();
    values.sort();
    values
}
