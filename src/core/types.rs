// This module defines the syscall type descriptors that every argument in a program points
// at. A Type carries the attributes shared by all kinds (name, field name, direction, size,
// optional and varlen flags) plus a closed TypeKind sum for the kind-specific payload:
// scalar kinds share IntCommon (endianness and bitfield placement), pointers and arrays
// hold their element type, resources hold a ResourceDesc, and structs/unions are named by a
// StructKey whose field list lives in the owning Target. Keeping field lists out of the
// type values means descriptor graphs never form reference cycles, which matters for the
// self-referential ANY vocabulary. Types are built once per target and shared as Arc<Type>.

//! Syscall type descriptors.

use std::fmt;
use std::sync::Arc;

/// Direction of data flow for an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dir {
    #[default]
    In,
    Out,
    InOut,
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dir::In => write!(f, "in"),
            Dir::Out => write!(f, "out"),
            Dir::InOut => write!(f, "inout"),
        }
    }
}

/// Identifies a struct or union description within a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructKey {
    pub name: String,
    pub dir: Dir,
}

impl StructKey {
    pub fn new(name: impl Into<String>, dir: Dir) -> Self {
        Self {
            name: name.into(),
            dir,
        }
    }
}

/// Attributes shared by all scalar kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntCommon {
    pub big_endian: bool,
    pub bitfield_off: u64,
    pub bitfield_len: u64,
    /// Set on every member of a packed bitfield run except the last one.
    pub bitfield_middle: bool,
}

impl IntCommon {
    pub fn bitfield(off: u64, len: u64, middle: bool) -> Self {
        Self {
            big_endian: false,
            bitfield_off: off,
            bitfield_len: len,
            bitfield_middle: middle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Blob,
    String,
    Filename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsumKind {
    Inet,
    Pseudo { protocol: u8 },
}

/// Value of a proc scalar that stands for 0 in every process.
pub const PROC_DEFAULT_VALUE: u64 = u64::MAX;

/// Description of a resource kind (file descriptor, socket, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDesc {
    pub name: String,
    /// Kind chain from the most generic to the most specific resource.
    pub kind: Vec<String>,
    /// Special values usable when no produced instance is available.
    pub values: Vec<u64>,
    pub size: u64,
}

impl ResourceDesc {
    /// Whether a produced `self` can be used where `dst` is expected.
    pub fn compatible_with(&self, dst: &ResourceDesc) -> bool {
        if dst.kind.len() > self.kind.len() {
            return false;
        }
        dst.kind.iter().zip(&self.kind).all(|(a, b)| a == b)
    }
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Int(IntCommon),
    Const {
        int: IntCommon,
        val: u64,
        is_pad: bool,
    },
    Flags {
        int: IntCommon,
        vals: Vec<u64>,
    },
    Len {
        int: IntCommon,
        buf: String,
    },
    Proc {
        int: IntCommon,
        values_start: u64,
        values_per_proc: u64,
    },
    Csum {
        int: IntCommon,
        kind: CsumKind,
        buf: String,
    },
    Resource(Arc<ResourceDesc>),
    Vma,
    Ptr {
        elem: Arc<Type>,
    },
    Buffer(BufferKind),
    Array {
        elem: Arc<Type>,
    },
    Struct {
        key: StructKey,
        align_attr: u64,
    },
    Union {
        key: StructKey,
    },
}

/// A syscall argument type.
#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub field_name: String,
    pub dir: Dir,
    /// Static size in bytes; meaningless for varlen types.
    pub size: u64,
    pub optional: bool,
    pub varlen: bool,
    pub kind: TypeKind,
}

impl Type {
    pub fn new(name: impl Into<String>, size: u64, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            field_name: String::new(),
            dir: Dir::In,
            size,
            optional: false,
            varlen: false,
            kind,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field_name = field.into();
        self
    }

    pub fn with_dir(mut self, dir: Dir) -> Self {
        self.dir = dir;
        self
    }

    pub fn with_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_varlen(mut self) -> Self {
        self.varlen = true;
        self
    }

    pub fn into_ref(self) -> Arc<Type> {
        Arc::new(self)
    }

    /// Scalar attributes, for the kinds that have them.
    pub fn int_common(&self) -> Option<&IntCommon> {
        match &self.kind {
            TypeKind::Int(int)
            | TypeKind::Const { int, .. }
            | TypeKind::Flags { int, .. }
            | TypeKind::Len { int, .. }
            | TypeKind::Proc { int, .. }
            | TypeKind::Csum { int, .. } => Some(int),
            _ => None,
        }
    }

    pub fn bitfield_offset(&self) -> u64 {
        self.int_common().map_or(0, |int| int.bitfield_off)
    }

    pub fn bitfield_length(&self) -> u64 {
        self.int_common().map_or(0, |int| int.bitfield_len)
    }

    pub fn bitfield_middle(&self) -> bool {
        self.int_common().is_some_and(|int| int.bitfield_middle)
    }

    pub fn is_pad(&self) -> bool {
        matches!(self.kind, TypeKind::Const { is_pad: true, .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct { .. })
    }

    pub fn resource_desc(&self) -> Option<&Arc<ResourceDesc>> {
        match &self.kind {
            TypeKind::Resource(desc) => Some(desc),
            _ => None,
        }
    }

    pub fn ptr_elem(&self) -> Option<&Arc<Type>> {
        match &self.kind {
            TypeKind::Ptr { elem } => Some(elem),
            _ => None,
        }
    }

    pub fn struct_key(&self) -> Option<&StructKey> {
        match &self.kind {
            TypeKind::Struct { key, .. } | TypeKind::Union { key } => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field_name.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.field_name, self.name)
        }
    }
}

/// Field list of a struct or the option list of a union.
#[derive(Debug, Clone)]
pub struct StructDesc {
    pub key: StructKey,
    pub fields: Vec<Arc<Type>>,
}

/// A syscall as described for one target.
#[derive(Debug, Clone)]
pub struct Syscall {
    pub id: usize,
    pub nr: u64,
    pub name: String,
    pub call_name: String,
    pub args: Vec<Arc<Type>>,
    pub ret: Option<Arc<Type>>,
}

impl Syscall {
    pub fn new(name: impl Into<String>, nr: u64, args: Vec<Arc<Type>>) -> Self {
        let name = name.into();
        let call_name = name.split('$').next().unwrap_or(&name).to_string();
        Self {
            id: 0,
            nr,
            name,
            call_name,
            args,
            ret: None,
        }
    }

    pub fn with_ret(mut self, ret: Arc<Type>) -> Self {
        self.ret = Some(ret);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstValue {
    pub name: String,
    pub value: u64,
}

/// Swap the low `size` bytes of `v`, as stored by a big-endian scalar.
pub fn swap_for_size(v: u64, size: u64) -> u64 {
    match size {
        2 => (v as u16).swap_bytes() as u64,
        4 => (v as u32).swap_bytes() as u64,
        8 => v.swap_bytes(),
        _ => v,
    }
}
