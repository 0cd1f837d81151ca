use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        signature::Arg,
        CommandError,
    },
    resp::RespValue,
};

/// Registers the keys with their database so that any later write marks
/// this connection's next EXEC as aborted.
pub fn watch(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    if ctx.session.transaction.is_some() {
        return Err(CommandError::WatchInsideMulti);
    }

    for arg in args {
        let key = ctx.items.get(arg.key()?).key().clone();
        if ctx.session.watches.insert((ctx.db_index, key.clone())) {
            let client = ctx.session.id;
            ctx.db().watch(key, client);
        }
    }

    Ok(RespValue::ok().into())
}

pub fn unwatch(ctx: &mut CommandContext<'_>, _: &[Arg]) -> Result<CommandResult, CommandError> {
    ctx.session.clear_watches(ctx.state);
    Ok(RespValue::ok().into())
}
