// This module implements the pre-order walk over the argument graph of a call that every
// other analysis is built on. The walk visits a call's return value first, then its
// positional arguments in order, descending into struct and array members, through
// pointers into the subtree they materialize, and into the active option of unions. Each
// visit receives an ArgCtx describing where the argument sits: the sequence it is a
// positional member of, the pointer that roots the current heap object and the byte
// offset from it. A visitor can set ArgCtx::stop to prune the children of the argument it
// was handed. After a group's children are walked the group size invariant is checked,
// and a violation aborts the walk with ProgError::GroupSize.

//! Argument tree traversal.

use crate::core::arg::{Arg, ArgId, ArgKind, PointerPayload};
use crate::core::error::{ProgError, ProgResult};
use crate::core::prog::{Call, Program};

/// Ordered sequence an argument is a positional member of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgParent {
    /// The positional arguments of the call being walked.
    CallArgs,
    /// The members of the given struct.
    Inner(ArgId),
}

/// Structural context handed to traversal visitors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArgCtx {
    pub parent: Option<ArgParent>,
    /// Pointer whose subtree contains the argument; `None` outside any heap object.
    pub base: Option<ArgId>,
    /// Byte offset of the argument from `base`.
    pub offset: u64,
    /// Set by the visitor to skip the argument's children.
    pub stop: bool,
}

/// Visit every argument reachable from `call`, return value first.
pub fn foreach_arg<F>(prog: &Program, call: &Call, mut f: F) -> ProgResult<()>
where
    F: FnMut(ArgId, &Arg, &mut ArgCtx),
{
    let mut ctx = ArgCtx::default();
    if let Some(ret) = call.ret {
        foreach_arg_impl(prog, ret, ctx, &mut f)?;
    }
    ctx.parent = Some(ArgParent::CallArgs);
    for &arg in &call.args {
        foreach_arg_impl(prog, arg, ctx, &mut f)?;
    }
    Ok(())
}

/// Visit `arg` and everything reachable from it.
pub fn foreach_sub_arg<F>(prog: &Program, arg: ArgId, mut f: F) -> ProgResult<()>
where
    F: FnMut(ArgId, &Arg, &mut ArgCtx),
{
    foreach_arg_impl(prog, arg, ArgCtx::default(), &mut f)
}

fn foreach_arg_impl<F>(prog: &Program, id: ArgId, mut ctx: ArgCtx, f: &mut F) -> ProgResult<()>
where
    F: FnMut(ArgId, &Arg, &mut ArgCtx),
{
    let arg = prog.arg(id);
    f(id, arg, &mut ctx);
    if ctx.stop {
        return Ok(());
    }
    match &arg.kind {
        ArgKind::Group { inner } => {
            if arg.ty.is_struct() {
                ctx.parent = Some(ArgParent::Inner(id));
            }
            let mut total_size = 0;
            for &child in inner {
                foreach_arg_impl(prog, child, ctx, f)?;
                if !prog.arg(child).ty.bitfield_middle() {
                    let size = prog.arg_size(child);
                    ctx.offset += size;
                    total_size += size;
                }
            }
            let claimed_size = prog.arg_size(id);
            let varlen = arg.ty.varlen;
            if varlen && total_size > claimed_size || !varlen && total_size != claimed_size {
                return Err(ProgError::GroupSize {
                    total: total_size,
                    claimed: claimed_size,
                    varlen,
                    ty: arg.ty.to_string(),
                });
            }
        }
        ArgKind::Pointer {
            payload: PointerPayload::Res(res),
            ..
        } => {
            ctx.base = Some(id);
            ctx.offset = 0;
            foreach_arg_impl(prog, *res, ctx, f)?;
        }
        ArgKind::Union { option } => {
            foreach_arg_impl(prog, *option, ctx, f)?;
        }
        ArgKind::Const { .. }
        | ArgKind::Result { .. }
        | ArgKind::Pointer { .. }
        | ArgKind::Data(_) => {}
    }
    Ok(())
}
