use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        signature::Arg,
        CommandError,
    },
    resp::RespValue,
};

pub fn discard(ctx: &mut CommandContext<'_>, _: &[Arg]) -> Result<CommandResult, CommandError> {
    let Some(_) = ctx.session.transaction.take() else {
        return Err(CommandError::DiscardWithoutMulti);
    };

    ctx.session.transaction_failed = false;
    ctx.session.clear_watches(ctx.state);

    Ok(RespValue::ok().into())
}
