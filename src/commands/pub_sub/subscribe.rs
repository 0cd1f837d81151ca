use bytes::Bytes;

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        signature::Arg,
        CommandError,
    },
    resp::RespValue,
};

/// Confirmation pushed for every (un)subscribe: `[kind, channel, count]`.
pub(super) fn confirmation(kind: &'static str, channel: Bytes, count: usize) -> RespValue {
    RespValue::Array(vec![
        RespValue::bulk(kind),
        RespValue::BulkString(channel),
        RespValue::Integer(count as i64),
    ])
}

pub fn subscribe(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    for arg in args {
        let channel = arg.bytes()?.clone();
        if ctx.state.pubsub.subscribe(ctx.session.id, channel.clone()) {
            ctx.session.subscriptions += 1;
        }
        ctx.session
            .push(confirmation("subscribe", channel, ctx.session.subscriptions));
    }

    Ok(CommandResult::NoResponse)
}

pub fn psubscribe(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    for arg in args {
        let pattern = arg.bytes()?.clone();
        if ctx.state.pubsub.psubscribe(ctx.session.id, pattern.clone())? {
            ctx.session.subscriptions += 1;
        }
        ctx.session
            .push(confirmation("psubscribe", pattern, ctx.session.subscriptions));
    }

    Ok(CommandResult::NoResponse)
}
