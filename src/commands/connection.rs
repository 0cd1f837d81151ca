use tracing::info;

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        signature::Arg,
        CommandError,
    },
    resp::RespValue,
};

pub fn echo(_: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    Ok(RespValue::BulkString(args[0].bytes()?.clone()).into())
}

/// PING answers PONG, or echoes its argument. Subscribed connections get a
/// `[pong, <arg>]` array instead.
pub fn ping(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    if args.len() > 1 {
        return Err(CommandError::WrongArity("ping".to_string()));
    }
    let message = args.first().map(Arg::bytes).transpose()?.cloned();

    if ctx.session.subscriptions > 0 {
        return Ok(RespValue::Array(vec![
            RespValue::bulk("pong"),
            RespValue::BulkString(message.unwrap_or_default()),
        ])
        .into());
    }

    Ok(match message {
        Some(message) => RespValue::BulkString(message),
        None => RespValue::SimpleString("PONG".to_string()),
    }
    .into())
}

pub fn select(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    ctx.session.db = ctx.database_index(args[0].int()?)?;
    Ok(RespValue::ok().into())
}

pub fn swapdb(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let first = ctx.database_index(args[0].int()?)?;
    let second = ctx.database_index(args[1].int()?)?;
    if first != second {
        let (low, high) = (first.min(second), first.max(second));
        let (head, tail) = ctx.state.databases.split_at_mut(high);
        head[low].swap(&mut tail[0]);
        info!(first, second, "swapped databases");
    }
    Ok(RespValue::ok().into())
}
