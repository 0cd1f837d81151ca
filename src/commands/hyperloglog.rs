//! HyperLogLog commands, kept exact by storing the observed elements as a
//! plain set.

use crate::{
    commands::{
        command_dispatcher::{CommandContext, CommandResult},
        sets::{add_members, combine, combine_store, SetOperation},
        signature::Arg,
        CommandError,
    },
    resp::RespValue,
};

/// Returns 1 when the estimate changed, i.e. some element was new.
pub fn pfadd(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let added = add_members(ctx, args)?;
    Ok(RespValue::Integer(i64::from(added > 0)).into())
}

pub fn pfcount(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let union = combine(ctx, args, SetOperation::Union)?;
    Ok(RespValue::Integer(union.len() as i64).into())
}

/// Merges the sources into the destination, which keeps its own elements.
pub fn pfmerge(ctx: &mut CommandContext<'_>, args: &[Arg]) -> Result<CommandResult, CommandError> {
    let mut sources = Vec::with_capacity(args.len() + 1);
    sources.push(args[0].clone());
    sources.extend_from_slice(args);
    combine_store(ctx, &sources, SetOperation::Union)?;
    Ok(RespValue::ok().into())
}
