use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        signature::Arg,
        CommandError,
    },
    resp::RespValue,
};

pub fn multi(ctx: &mut CommandContext<'_>, _: &[Arg]) -> Result<CommandResult, CommandError> {
    if ctx.session.transaction.is_some() {
        return Err(CommandError::NestedMulti);
    }

    ctx.session.transaction = Some(Vec::new());
    ctx.session.transaction_failed = false;

    Ok(RespValue::ok().into())
}
