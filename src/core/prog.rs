// This module implements Program, the unit the fuzzer generates, mutates and executes. A
// Program is an ordered list of Calls plus the arena that owns every argument of those
// calls. Calls reference their positional arguments and optional return value by ArgId;
// pointers, groups, unions and results reference further arena entries the same way, so
// the whole argument graph is plain indices and a Program can be cloned or moved between
// threads without any aliasing concerns. The module also holds the argument size rules
// that traversal and squashing validate against, and a line-oriented dump of a program for
// debugging and the proginfo tool.

//! Programs: ordered calls over an argument arena.

use super::arg::{Arg, ArgId, ArgKind, DataContent, PointerPayload};
use super::error::{ProgError, ProgResult};
use super::target::Target;
use super::types::{Syscall, Type, TypeKind};
use std::fmt;
use std::sync::Arc;

/// One syscall invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub meta: Arc<Syscall>,
    pub args: Vec<ArgId>,
    pub ret: Option<ArgId>,
}

impl Call {
    pub fn new(meta: Arc<Syscall>, args: Vec<ArgId>) -> Self {
        Self {
            meta,
            args,
            ret: None,
        }
    }

    pub fn with_ret(mut self, ret: ArgId) -> Self {
        self.ret = Some(ret);
        self
    }
}

/// A sequence of calls and the arena owning their arguments.
#[derive(Debug, Clone)]
pub struct Program {
    pub target: Arc<Target>,
    calls: Vec<Call>,
    args: Vec<Arg>,
}

impl Program {
    pub fn new(target: Arc<Target>) -> Self {
        Self {
            target,
            calls: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn call(&self, idx: usize) -> ProgResult<&Call> {
        self.calls.get(idx).ok_or(ProgError::CallOutOfRange {
            idx,
            len: self.calls.len(),
        })
    }

    /// Append a call and return its index.
    pub fn push_call(&mut self, call: Call) -> usize {
        self.calls.push(call);
        self.calls.len() - 1
    }

    /// Drop every call from `len` onwards. Their arguments stay in the arena but
    /// are no longer reachable; see [`Program::compact`].
    pub fn truncate(&mut self, len: usize) {
        self.calls.truncate(len);
    }

    /// Drop arena entries no call reaches and renumber the rest in call order.
    ///
    /// Squashing and [`Program::truncate`] leave replaced subtrees behind, so the
    /// arena only grows until this is called. Every `ArgId` obtained before the call
    /// is invalidated. A result whose producer was dropped keeps its value and loses
    /// the reference. Returns the number of entries removed.
    pub fn compact(&mut self) -> usize {
        let mut remap: Vec<Option<ArgId>> = vec![None; self.args.len()];
        let mut live = Vec::new();
        let mut stack = Vec::new();
        for call in &self.calls {
            stack.extend(call.args.iter().rev().copied());
            stack.extend(call.ret);
            while let Some(id) = stack.pop() {
                if remap[id.index()].is_some() {
                    continue;
                }
                remap[id.index()] = Some(ArgId(live.len() as u32));
                live.push(id);
                match &self.args[id.index()].kind {
                    ArgKind::Pointer {
                        payload: PointerPayload::Res(res),
                        ..
                    } => stack.push(*res),
                    ArgKind::Group { inner } => stack.extend(inner.iter().rev().copied()),
                    ArgKind::Union { option } => stack.push(*option),
                    _ => {}
                }
            }
        }

        let removed = self.args.len() - live.len();
        let mut old: Vec<Option<Arg>> = std::mem::take(&mut self.args)
            .into_iter()
            .map(Some)
            .collect();
        self.args = live
            .iter()
            .filter_map(|id| old[id.index()].take())
            .collect();

        let relink = |id: &mut ArgId| {
            if let Some(new) = remap[id.index()] {
                *id = new;
            }
        };
        for arg in &mut self.args {
            match &mut arg.kind {
                ArgKind::Result { res, .. } => *res = res.and_then(|r| remap[r.index()]),
                ArgKind::Pointer {
                    payload: PointerPayload::Res(res),
                    ..
                } => relink(res),
                ArgKind::Group { inner } => inner.iter_mut().for_each(relink),
                ArgKind::Union { option } => relink(option),
                _ => {}
            }
        }
        for call in &mut self.calls {
            call.args.iter_mut().for_each(relink);
            if let Some(ret) = &mut call.ret {
                relink(ret);
            }
        }
        log::debug!("compacted arena: {} live, {} removed", self.args.len(), removed);
        removed
    }

    pub fn arg(&self, id: ArgId) -> &Arg {
        &self.args[id.index()]
    }

    pub fn arg_mut(&mut self, id: ArgId) -> &mut Arg {
        &mut self.args[id.index()]
    }

    /// Number of arena entries, reachable or not.
    pub fn arena_len(&self) -> usize {
        self.args.len()
    }

    pub fn alloc(&mut self, arg: Arg) -> ArgId {
        let id = ArgId(self.args.len() as u32);
        self.args.push(arg);
        id
    }

    pub fn make_const(&mut self, ty: Arc<Type>, val: u64) -> ArgId {
        self.alloc(Arg::new(ty, ArgKind::Const { val }))
    }

    pub fn make_result(&mut self, ty: Arc<Type>, res: Option<ArgId>, val: u64) -> ArgId {
        self.alloc(Arg::new(ty, ArgKind::Result { val, res }))
    }

    pub fn make_pointer(&mut self, ty: Arc<Type>, address: u64, res: ArgId) -> ArgId {
        self.alloc(Arg::new(
            ty,
            ArgKind::Pointer {
                address,
                payload: PointerPayload::Res(res),
            },
        ))
    }

    /// Raw mapping of `size` bytes at `address`. An empty mapping is stored as null.
    pub fn make_vma(&mut self, ty: Arc<Type>, address: u64, size: u64) -> ArgId {
        if size == 0 {
            return self.make_null(ty);
        }
        self.alloc(Arg::new(
            ty,
            ArgKind::Pointer {
                address,
                payload: PointerPayload::Vma(size),
            },
        ))
    }

    pub fn make_null(&mut self, ty: Arc<Type>) -> ArgId {
        self.alloc(Arg::new(
            ty,
            ArgKind::Pointer {
                address: 0,
                payload: PointerPayload::Null,
            },
        ))
    }

    pub fn make_data(&mut self, ty: Arc<Type>, data: impl Into<Vec<u8>>) -> ArgId {
        self.alloc(Arg::new(ty, ArgKind::Data(DataContent::Bytes(data.into()))))
    }

    pub fn make_out_data(&mut self, ty: Arc<Type>, size: u64) -> ArgId {
        self.alloc(Arg::new(ty, ArgKind::Data(DataContent::Out(size))))
    }

    pub fn make_group(&mut self, ty: Arc<Type>, inner: Vec<ArgId>) -> ArgId {
        self.alloc(Arg::new(ty, ArgKind::Group { inner }))
    }

    pub fn make_union(&mut self, ty: Arc<Type>, option: ArgId) -> ArgId {
        self.alloc(Arg::new(ty, ArgKind::Union { option }))
    }

    /// Byte size of an argument as laid out in memory.
    pub fn arg_size(&self, id: ArgId) -> u64 {
        let arg = self.arg(id);
        match &arg.kind {
            ArgKind::Const { .. } | ArgKind::Result { .. } | ArgKind::Pointer { .. } => {
                arg.ty.size
            }
            ArgKind::Data(DataContent::Bytes(data)) => data.len() as u64,
            ArgKind::Data(DataContent::Out(size)) => *size,
            ArgKind::Group { inner } => {
                if !arg.ty.varlen {
                    return arg.ty.size;
                }
                let mut size: u64 = inner
                    .iter()
                    .filter(|&&child| !self.arg(child).ty.bitfield_middle())
                    .map(|&child| self.arg_size(child))
                    .sum();
                if let TypeKind::Struct { align_attr, .. } = arg.ty.kind {
                    if align_attr != 0 && size % align_attr != 0 {
                        size += align_attr - size % align_attr;
                    }
                }
                size
            }
            ArgKind::Union { option } => {
                if !arg.ty.varlen {
                    return arg.ty.size;
                }
                self.arg_size(*option)
            }
        }
    }

    /// Render the program one argument per line.
    pub fn dump(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "Program {}/{}\n",
            self.target.os, self.target.arch
        ));
        for (idx, call) in self.calls.iter().enumerate() {
            output.push_str(&format!("Call {} {}\n", idx, call.meta.name));
            if let Some(ret) = call.ret {
                output.push_str("  Ret\n");
                self.dump_arg(ret, 2, &mut output);
            }
            for &arg in &call.args {
                self.dump_arg(arg, 1, &mut output);
            }
        }
        output
    }

    fn dump_arg(&self, id: ArgId, depth: usize, output: &mut String) {
        let arg = self.arg(id);
        let indent = "  ".repeat(depth);
        let ty = &arg.ty;
        match &arg.kind {
            ArgKind::Const { val } => {
                output.push_str(&format!("{indent}{id} {ty} = {val:#x}\n"));
            }
            ArgKind::Result { val, res } => match res {
                Some(res) => output.push_str(&format!("{indent}{id} {ty} = {res}\n")),
                None => output.push_str(&format!("{indent}{id} {ty} [{}] = {val:#x}\n", ty.dir)),
            },
            ArgKind::Pointer { address, payload } => match payload {
                PointerPayload::Null => output.push_str(&format!("{indent}{id} {ty} = nil\n")),
                PointerPayload::Vma(size) => output.push_str(&format!(
                    "{indent}{id} {ty} = &{address:#x} vma {size:#x}\n"
                )),
                PointerPayload::Res(res) => {
                    output.push_str(&format!("{indent}{id} {ty} = &{address:#x}\n"));
                    self.dump_arg(*res, depth + 1, output);
                }
            },
            ArgKind::Data(DataContent::Bytes(data)) => {
                let hex: String = data.iter().map(|b| format!("{b:02x}")).collect();
                output.push_str(&format!("{indent}{id} {ty} = \"{hex}\"\n"));
            }
            ArgKind::Data(DataContent::Out(size)) => {
                output.push_str(&format!("{indent}{id} {ty} = out {size}\n"));
            }
            ArgKind::Group { inner } => {
                output.push_str(&format!("{indent}{id} {ty} ({} bytes)\n", self.arg_size(id)));
                for &child in inner {
                    self.dump_arg(child, depth + 1, output);
                }
            }
            ArgKind::Union { option } => {
                output.push_str(&format!("{indent}{id} {ty}\n"));
                self.dump_arg(*option, depth + 1, output);
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dump())
    }
}
