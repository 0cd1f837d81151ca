use tracing::trace;

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        signature::Arg,
        CommandError,
    },
    resp::RespValue,
};

/// Delivers the message to every exact and pattern subscriber and returns
/// the number of deliveries.
pub fn publish(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let channel = args[0].bytes()?;
    let message = args[1].bytes()?;

    let mut receivers = 0;
    for (client, delivery) in ctx.state.pubsub.deliveries(channel, message) {
        if ctx.state.deliver(client, delivery) {
            receivers += 1;
        }
    }

    trace!(channel = %String::from_utf8_lossy(channel), receivers, "published message");
    Ok(RespValue::Integer(receivers).into())
}
