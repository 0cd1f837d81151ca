use tracing::debug;

use crate::{
    commands::{
        command_dispatcher::{execute_command, CommandContext, CommandResult},
        signature::Arg,
        CommandError,
    },
    resp::RespValue,
};

/// Replays the queued commands and collects one reply per command.
///
/// A transaction poisoned by a queuing error is discarded with EXECABORT.
/// When a watched key changed since WATCH, nothing runs and the reply is nil.
pub fn exec(ctx: &mut CommandContext<'_>, _: &[Arg]) -> Result<CommandResult, CommandError> {
    let Some(transaction) = ctx.session.transaction.take() else {
        return Err(CommandError::ExecWithoutMulti);
    };

    if ctx.session.transaction_failed {
        ctx.session.transaction_failed = false;
        ctx.session.clear_watches(ctx.state);
        return Err(CommandError::ExecAbort);
    }

    let watch_invalidated = ctx
        .state
        .clients
        .get(&ctx.session.id)
        .is_some_and(|record| record.watch_invalidated);
    ctx.session.clear_watches(ctx.state);
    if watch_invalidated {
        debug!(client = ctx.session.id, "watched key changed, aborting transaction");
        return Ok(RespValue::Null.into());
    }

    let mut replies = Vec::with_capacity(transaction.len());
    for command in transaction {
        ctx.session.in_exec = true;
        ctx.session.start_capture();
        let result = execute_command(ctx.state, ctx.session, command.spec, &command.args, false);
        let mut pushed = ctx.session.finish_capture();
        ctx.session.in_exec = false;

        // Subscription confirmations take the command's slot.
        replies.push(match result {
            Ok(CommandResult::Response(reply)) => reply,
            Ok(CommandResult::NoResponse) if pushed.len() > 1 => RespValue::Array(pushed),
            Ok(CommandResult::NoResponse) => pushed.pop().unwrap_or(RespValue::Null),
            Ok(CommandResult::Block(_)) => RespValue::Null,
            Err(err) => err.as_resp(),
        });
    }

    Ok(RespValue::Array(replies).into())
}
