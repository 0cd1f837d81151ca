use tracing::info;

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        signature::{casematch, Arg},
        CommandError,
    },
    resp::RespValue,
    server::unix_time,
};

/// FLUSHDB and FLUSHALL accept an optional `ASYNC`, which changes nothing
/// here.
fn check_flush_args(args: &[Arg]) -> Result<(), CommandError> {
    match args {
        [] => Ok(()),
        [mode] if casematch(mode.bytes()?, "async") => Ok(()),
        _ => Err(CommandError::Syntax),
    }
}

pub fn bgsave(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    match args {
        [] => {}
        [mode] if casematch(mode.bytes()?, "schedule") => {}
        _ => return Err(CommandError::Syntax),
    }
    ctx.state.last_save = unix_time() as i64;
    Ok(RespValue::SimpleString("Background saving started".to_string()).into())
}

pub fn dbsize(ctx: &mut CommandContext<'_>, _: &[Arg]) -> Result<CommandResult, CommandError> {
    let size = ctx.db().len();
    Ok(RespValue::Integer(size as i64).into())
}

pub fn flushdb(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    check_flush_args(args)?;
    let invalidated = ctx.db().clear();
    ctx.state.invalidate_watches(invalidated);
    info!(db = ctx.db_index, "flushed database");
    Ok(RespValue::ok().into())
}

pub fn flushall(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    check_flush_args(args)?;
    let invalidated: Vec<_> = ctx
        .state
        .databases
        .iter_mut()
        .flat_map(|database| database.clear())
        .collect();
    ctx.state.invalidate_watches(invalidated);
    info!("flushed all databases");
    Ok(RespValue::ok().into())
}

pub fn lastsave(ctx: &mut CommandContext<'_>, _: &[Arg]) -> Result<CommandResult, CommandError> {
    Ok(RespValue::Integer(ctx.state.last_save).into())
}

pub fn save(ctx: &mut CommandContext<'_>, _: &[Arg]) -> Result<CommandResult, CommandError> {
    ctx.state.last_save = unix_time() as i64;
    Ok(RespValue::ok().into())
}

/// TIME answers `[seconds, microseconds]` of the wall clock.
pub fn time(_: &mut CommandContext<'_>, _: &[Arg]) -> Result<CommandResult, CommandError> {
    let micros = (unix_time() * 1_000_000.0).round() as i64;
    Ok(RespValue::bulk_array([
        (micros / 1_000_000).to_string(),
        (micros % 1_000_000).to_string(),
    ])
    .into())
}
