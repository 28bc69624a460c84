//! Argument nodes of the program IR.
//!
//! Arguments live in the arena owned by their [`Program`](super::prog::Program)
//! and refer to each other by [`ArgId`]. A pointer's target subtree, a result's
//! referenced producer and the children of groups and unions are all ids into
//! the same arena, so replacing a subtree never invalidates references held to
//! the argument being rewritten.

use super::types::{swap_for_size, Type, TypeKind, PROC_DEFAULT_VALUE};
use std::fmt;
use std::sync::Arc;

/// Index of an argument within its program's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(pub u32);

impl ArgId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// What a pointer points at. The three states are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPayload {
    Null,
    /// Raw anonymous mapping of the given byte size.
    Vma(u64),
    /// Argument subtree materialized at the pointer's address.
    Res(ArgId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataContent {
    Bytes(Vec<u8>),
    /// Output buffers carry only their size.
    Out(u64),
}

#[derive(Debug, Clone)]
pub enum ArgKind {
    Const {
        val: u64,
    },
    Result {
        val: u64,
        /// Earlier result this one refers to.
        res: Option<ArgId>,
    },
    Pointer {
        address: u64,
        payload: PointerPayload,
    },
    Data(DataContent),
    Group {
        inner: Vec<ArgId>,
    },
    Union {
        option: ArgId,
    },
}

/// One node of the argument tree.
#[derive(Debug, Clone)]
pub struct Arg {
    pub ty: Arc<Type>,
    pub kind: ArgKind,
}

impl Arg {
    pub fn new(ty: Arc<Type>, kind: ArgKind) -> Self {
        Self { ty, kind }
    }

    pub fn is_null_pointer(&self) -> bool {
        matches!(
            self.kind,
            ArgKind::Pointer {
                payload: PointerPayload::Null,
                ..
            }
        )
    }

    /// Target subtree of a pointer, if it has one.
    pub fn pointee(&self) -> Option<ArgId> {
        match self.kind {
            ArgKind::Pointer {
                payload: PointerPayload::Res(res),
                ..
            } => Some(res),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        match &self.kind {
            ArgKind::Data(DataContent::Bytes(data)) => Some(data),
            _ => None,
        }
    }

    /// Value a constant argument takes in process `pid`, in host byte order.
    ///
    /// Returns 0 for non-constant arguments.
    pub fn value_for_proc(&self, pid: u64) -> u64 {
        let ArgKind::Const { val } = self.kind else {
            return 0;
        };
        let v = match &self.ty.kind {
            TypeKind::Proc {
                values_start,
                values_per_proc,
                ..
            } => {
                if val == PROC_DEFAULT_VALUE {
                    return 0;
                }
                values_start
                    .wrapping_add(val)
                    .wrapping_add(values_per_proc.wrapping_mul(pid))
            }
            _ => val,
        };
        match self.ty.int_common() {
            Some(int) if int.big_endian => swap_for_size(v, self.ty.size),
            _ => v,
        }
    }
}
