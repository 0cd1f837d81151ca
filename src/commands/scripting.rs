//! EVAL, EVALSHA and SCRIPT.
//!
//! Scripts are cached by the hex SHA1 of their source. Running one is handed
//! to an installed [`ScriptRuntime`], which gets a [`ScriptHost`] to issue
//! commands through. The host runs those commands directly against the
//! locked server state, so a script executes atomically.

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::{
    commands::{
        command_dispatcher::{execute_command, lookup, CommandContext, CommandResult},
        signature::{bytes_args, casematch, Arg},
        CommandError,
    },
    connection::Session,
    resp::RespValue,
    server::ServerState,
};

/// Failures reported by a script runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// The script raised an error or failed to compile.
    #[error("{0}")]
    Runtime(String),
    /// A command called from the script failed and the script did not
    /// handle it.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The script assigned the named global variable.
    #[error("Script attempted to set global variable {0}")]
    Globals(String),
}

/// The levels scripts may log at, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
}

/// One script execution request.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptInvocation {
    pub script: Bytes,
    /// Hex SHA1 of `script`.
    pub sha: String,
    pub keys: Vec<Bytes>,
    pub args: Vec<Bytes>,
}

/// What a running script can do to the server.
pub trait ScriptHost {
    /// Runs one command, e.g. `["SET", "k", "v"]`, and returns its reply.
    /// Command failures come back as `Err` so the runtime can decide between
    /// `call` and `pcall` semantics.
    fn call(&mut self, args: &[Bytes]) -> Result<RespValue, CommandError>;

    /// Writes a message to the server log.
    fn log(&mut self, level: LogLevel, message: &str);
}

/// An interpreter for EVAL scripts.
pub trait ScriptRuntime: Send + Sync {
    fn execute(
        &self,
        invocation: ScriptInvocation,
        host: &mut dyn ScriptHost,
    ) -> Result<RespValue, ScriptError>;
}

/// Hex SHA1 digest used as the script cache key.
pub fn script_digest(script: &[u8]) -> String {
    sha1_smol::Sha1::from(script).hexdigest()
}

struct ServerScriptHost<'a> {
    state: &'a mut ServerState,
    session: &'a mut Session,
}

impl ScriptHost for ServerScriptHost<'_> {
    fn call(&mut self, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let Some((name, args)) = args.split_first() else {
            return Err(CommandError::EmptyScriptCall);
        };
        let spec = lookup(name)?;
        spec.signature.check_arity(args)?;
        trace!(client = self.session.id, command = spec.signature.name, "script call");

        match execute_command(self.state, self.session, spec, args, true)? {
            CommandResult::Response(reply) => Ok(reply),
            CommandResult::NoResponse | CommandResult::Block(_) => Ok(RespValue::Null),
        }
    }

    fn log(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug | LogLevel::Verbose => debug!(client = self.session.id, "{}", message),
            LogLevel::Notice => info!(client = self.session.id, "{}", message),
            LogLevel::Warning => warn!(client = self.session.id, "{}", message),
        }
    }
}

fn run_script(
    ctx: &mut CommandContext<'_>,
    script: Bytes,
    numkeys: i64,
    rest: &[Arg],
) -> Result<CommandResult, CommandError> {
    if numkeys > rest.len() as i64 {
        return Err(CommandError::TooManyKeys);
    }
    let numkeys = usize::try_from(numkeys).map_err(|_| CommandError::NegativeKeyCount)?;

    let sha = script_digest(&script);
    ctx.state
        .scripts
        .insert(Bytes::from(sha.clone()), script.clone());
    let runtime = ctx
        .state
        .script_runtime
        .clone()
        .ok_or(CommandError::ScriptingUnavailable)?;

    let (keys, args) = rest.split_at(numkeys);
    let invocation = ScriptInvocation {
        script,
        sha: sha.clone(),
        keys: bytes_args(keys)?,
        args: bytes_args(args)?,
    };
    let caller_db = ctx.session.db;
    let mut host = ServerScriptHost {
        state: &mut *ctx.state,
        session: &mut *ctx.session,
    };

    debug!(sha = %sha, "running script");
    let result = runtime.execute(invocation, &mut host);
    // SELECT inside a script does not outlive it.
    ctx.session.db = caller_db;
    match result {
        Ok(reply) => Ok(reply.into()),
        Err(ScriptError::Globals(name)) => Err(CommandError::ScriptGlobals(name)),
        Err(err) => Err(CommandError::ScriptFailed {
            sha,
            message: err.to_string(),
        }),
    }
}

pub fn eval(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let script = args[0].bytes()?.clone();
    run_script(ctx, script, args[1].int()?, &args[2..])
}

pub fn evalsha(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let script = ctx
        .state
        .scripts
        .get(args[0].bytes()?)
        .cloned()
        .ok_or(CommandError::NoScript)?;
    run_script(ctx, script, args[1].int()?, &args[2..])
}

/// SCRIPT LOAD, SCRIPT EXISTS and SCRIPT FLUSH.
pub fn script(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let subcommand = args[0].bytes()?;
    let rest = &args[1..];
    let bad_subcommand = || CommandError::UnknownSubcommand("SCRIPT".to_string());

    if casematch(subcommand, "load") {
        let [script] = rest else {
            return Err(bad_subcommand());
        };
        let script = script.bytes()?.clone();
        let sha = Bytes::from(script_digest(&script));
        ctx.state.scripts.insert(sha.clone(), script);
        Ok(RespValue::BulkString(sha).into())
    } else if casematch(subcommand, "exists") {
        let mut found = Vec::with_capacity(rest.len());
        for sha in rest {
            let exists = ctx.state.scripts.contains_key(sha.bytes()?);
            found.push(RespValue::Integer(i64::from(exists)));
        }
        Ok(RespValue::Array(found).into())
    } else if casematch(subcommand, "flush") {
        match rest {
            [] => {}
            [mode] if casematch(mode.bytes()?, "sync") || casematch(mode.bytes()?, "async") => {}
            _ => return Err(bad_subcommand()),
        }
        ctx.state.scripts.clear();
        Ok(RespValue::ok().into())
    } else {
        Err(bad_subcommand())
    }
}
