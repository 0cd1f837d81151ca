use bytes::Bytes;
use tracing::debug;

use crate::{
    commands::{
        blocking::BlockingRequest,
        command_error::CommandError,
        command_item::{CommandItem, KeyItems, KeyRef},
        command_registry::{self, CommandSpec},
        signature::{null_terminate, Applied, Arg},
    },
    connection::Session,
    key_value_store::Database,
    resp::RespValue,
    server::ServerState,
};

/// Commands still accepted while a connection has active subscriptions.
const SUBSCRIBED_CONTEXT_COMMANDS: [&str; 6] = [
    "ping",
    "subscribe",
    "unsubscribe",
    "psubscribe",
    "punsubscribe",
    "quit",
];

/// Commands that run immediately even inside MULTI.
const TRANSACTION_CONTROL_COMMANDS: [&str; 4] = ["exec", "discard", "multi", "watch"];

/// What a command handler produced.
#[derive(Debug)]
pub enum CommandResult {
    /// A reply to queue for the caller.
    Response(RespValue),
    /// The handler already queued its own messages (e.g. SUBSCRIBE).
    NoResponse,
    /// The command has to wait for data. The lock must be released first.
    Block(BlockingRequest),
}

impl From<RespValue> for CommandResult {
    fn from(value: RespValue) -> Self {
        CommandResult::Response(value)
    }
}

/// Result of dispatching one frame, as seen by the connection.
#[derive(Debug)]
pub enum DispatchOutcome {
    Reply(RespValue),
    NoReply,
    Block(BlockingRequest),
}

/// A command buffered by MULTI.
#[derive(Debug)]
pub struct QueuedCommand {
    pub spec: &'static CommandSpec,
    pub args: Vec<Bytes>,
}

/// Everything a command handler may touch.
pub struct CommandContext<'a> {
    pub state: &'a mut ServerState,
    pub session: &'a mut Session,
    pub items: &'a mut KeyItems,
    /// Database the command's keys were resolved in.
    pub db_index: usize,
    pub from_script: bool,
}

impl CommandContext<'_> {
    pub fn db(&mut self) -> &mut Database {
        self.state.database(self.db_index)
    }

    /// The item behind a key argument.
    pub fn item(&mut self, arg: &Arg) -> Result<&mut CommandItem, CommandError> {
        Ok(self.items.get_mut(arg.key()?))
    }

    /// Resolves a key that only becomes known while the command runs, such
    /// as a SORT lookup or a ZUNIONSTORE source.
    pub fn resolve(&mut self, key: &Bytes) -> KeyRef {
        let db = self.state.database(self.db_index);
        self.items.resolve(db, key)
    }

    /// The virtual clock, in seconds since the Unix epoch.
    pub fn now(&self) -> f64 {
        self.state.now()
    }

    /// Checks a decoded DB index against the configured database count.
    pub fn database_index(&self, index: i64) -> Result<usize, CommandError> {
        usize::try_from(index)
            .ok()
            .filter(|index| *index < self.state.databases.len())
            .ok_or(CommandError::InvalidDbIndex)
    }
}

/// Runs one parsed frame for `session`.
///
/// Unknown commands and arity errors are reported before anything else and
/// poison an open transaction. Inside MULTI every other command is queued.
pub fn dispatch(state: &mut ServerState, session: &mut Session, fields: Vec<Bytes>) -> DispatchOutcome {
    let Some((name, args)) = fields.split_first() else {
        return DispatchOutcome::NoReply;
    };

    let result = match prepare(state, session, name, args) {
        Ok(Prepared::Queue(spec)) => {
            if let Some(transaction) = session.transaction.as_mut() {
                transaction.push(QueuedCommand {
                    spec,
                    args: args.to_vec(),
                });
            }
            Ok(CommandResult::Response(RespValue::SimpleString(
                "QUEUED".to_string(),
            )))
        }
        Ok(Prepared::Run(spec)) => execute_command(state, session, spec, args, false),
        Err(err) => Err(reject(state, session, name, err)),
    };

    match result {
        Ok(CommandResult::Response(value)) => DispatchOutcome::Reply(value),
        Ok(CommandResult::NoResponse) => DispatchOutcome::NoReply,
        Ok(CommandResult::Block(request)) => DispatchOutcome::Block(request),
        Err(err) => DispatchOutcome::Reply(err.as_resp()),
    }
}

enum Prepared {
    Run(&'static CommandSpec),
    Queue(&'static CommandSpec),
}

fn prepare(
    state: &mut ServerState,
    session: &Session,
    name: &Bytes,
    args: &[Bytes],
) -> Result<Prepared, CommandError> {
    let spec = lookup(name)?;
    state.advance_clock();
    spec.signature.check_arity(args)?;

    debug!(client = session.id, command = spec.signature.name, "dispatching command");

    if session.transaction.is_some()
        && !TRANSACTION_CONTROL_COMMANDS.contains(&spec.signature.name)
    {
        return Ok(Prepared::Queue(spec));
    }
    Ok(Prepared::Run(spec))
}

/// Applies the transaction bookkeeping for errors raised before a command
/// got to run.
fn reject(state: &mut ServerState, session: &mut Session, name: &Bytes, err: CommandError) -> CommandError {
    if session.transaction.is_some() {
        session.transaction_failed = true;
    }
    let is_exec = null_terminate(name).eq_ignore_ascii_case(b"exec");
    if is_exec && err.to_string().starts_with("ERR ") {
        session.transaction = None;
        session.transaction_failed = false;
        session.clear_watches(state);
        return err.into_exec_abort();
    }
    err
}

/// Finds a command by name, ignoring case and anything after a NUL byte.
pub fn lookup(name: &[u8]) -> Result<&'static CommandSpec, CommandError> {
    let normalized = String::from_utf8_lossy(null_terminate(name)).to_lowercase();
    command_registry::get(&normalized).ok_or_else(|| {
        let clean = String::from_utf8_lossy(name).replace(['\r', '\n'], " ");
        CommandError::UnknownCommand(clean)
    })
}

/// Validates `args` against the command's signature, runs the handler and
/// writes the touched keys back.
///
/// On error every key goes back to the database without waking watchers or
/// waiters. Handlers validate their input before mutating anything.
pub fn execute_command(
    state: &mut ServerState,
    session: &mut Session,
    spec: &'static CommandSpec,
    args: &[Bytes],
    from_script: bool,
) -> Result<CommandResult, CommandError> {
    let db_index = session.db;
    let (args, mut items) = match spec.signature.apply(args, state.database(db_index))? {
        Applied::ShortCircuit(reply) => return Ok(CommandResult::Response(reply)),
        Applied::Args(args, items) => (args, items),
    };

    let result = check_context(spec, session, from_script).and_then(|_| {
        let mut context = CommandContext {
            state: &mut *state,
            session: &mut *session,
            items: &mut items,
            db_index,
            from_script,
        };
        (spec.handler)(&mut context, &args)
    });

    match result {
        Ok(result) => {
            let invalidated = items.commit(state.database(db_index));
            state.invalidate_watches(invalidated);
            Ok(result)
        }
        Err(err) => {
            items.restore(state.database(db_index));
            Err(err)
        }
    }
}

fn check_context(spec: &CommandSpec, session: &Session, from_script: bool) -> Result<(), CommandError> {
    if from_script && spec.no_script {
        return Err(CommandError::NotAllowedFromScripts);
    }
    if session.subscriptions > 0 && !SUBSCRIBED_CONTEXT_COMMANDS.contains(&spec.signature.name) {
        return Err(CommandError::SubscribedContext);
    }
    Ok(())
}
