use crate::commands::{
    command_dispatcher::{CommandContext, CommandResult},
    signature::{bytes_args, Arg},
    CommandError,
};

use super::subscribe::confirmation;

/// Without arguments every channel the connection listens to is dropped.
/// A connection with no subscriptions gets no confirmation at all.
pub fn unsubscribe(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let channels = match args {
        [] => ctx.state.pubsub.channels_of(ctx.session.id),
        _ => bytes_args(args)?,
    };

    for channel in channels {
        if ctx.state.pubsub.unsubscribe(ctx.session.id, &channel) {
            ctx.session.subscriptions -= 1;
        }
        ctx.session
            .push(confirmation("unsubscribe", channel, ctx.session.subscriptions));
    }

    Ok(CommandResult::NoResponse)
}

pub fn punsubscribe(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let patterns = match args {
        [] => ctx.state.pubsub.patterns_of(ctx.session.id),
        _ => bytes_args(args)?,
    };

    for pattern in patterns {
        if ctx.state.pubsub.punsubscribe(ctx.session.id, &pattern) {
            ctx.session.subscriptions -= 1;
        }
        ctx.session
            .push(confirmation("punsubscribe", pattern, ctx.session.subscriptions));
    }

    Ok(CommandResult::NoResponse)
}
