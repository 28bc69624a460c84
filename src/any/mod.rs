// This module implements the universal ("ANY") encoding used to flatten pointer-rooted
// argument subtrees that are too rich to mutate field by field. AnyTypes is the five-member
// vocabulary built once per target by Target::new: an opaque byte blob, a native-width
// optional pointer, an 8-byte optional pointer, and 4- and 8-byte kind-erased resource
// placeholders, all gathered as options of the varlen ANYUNION whose unbounded ANYARRAY is
// what the two pointers point at. A pointer is "already universal" when its element type
// is that very ANYARRAY instance (Arc identity, not structure). The Program methods here
// decide which pointers deserve squashing and whether a call or subtree contains any
// universal pointer; the squash transformation itself lives in the squash submodule.

//! Universal argument encoding.

pub mod squash;

use crate::analysis::foreach::{foreach_arg, foreach_sub_arg};
use crate::core::arg::{ArgId, ArgKind};
use crate::core::error::{ProgError, ProgResult};
use crate::core::prog::{Call, Program};
use crate::core::types::{
    BufferKind, Dir, ResourceDesc, StructDesc, StructKey, Type, TypeKind,
};
use std::sync::Arc;

/// Name of the ANY union, also used as its struct key.
pub const ANY_UNION: &str = "ANYUNION";

/// Varlen unions with more options than this are squashed.
pub const MAX_SIMPLE_UNION_OPTIONS: usize = 5;

/// The universal type vocabulary of one target.
#[derive(Debug, Clone)]
pub struct AnyTypes {
    pub union: Arc<Type>,
    pub array: Arc<Type>,
    pub blob: Arc<Type>,
    /// Native-width pointer to `array`.
    pub ptr_ptr: Arc<Type>,
    /// 8-byte pointer to `array`.
    pub ptr64: Arc<Type>,
    pub res32: Arc<Type>,
    pub res64: Arc<Type>,
}

impl AnyTypes {
    pub fn new(ptr_size: u64) -> Self {
        let key = StructKey::new(ANY_UNION, Dir::In);
        let union = Type::new(ANY_UNION, 0, TypeKind::Union { key })
            .with_field(ANY_UNION)
            .with_varlen()
            .into_ref();
        let array = Type::new(
            "ANYARRAY",
            0,
            TypeKind::Array {
                elem: union.clone(),
            },
        )
        .with_field("ANYARRAY")
        .with_varlen()
        .into_ref();
        let ptr = |name: &str, field: &str, size: u64| {
            Type::new(
                name,
                size,
                TypeKind::Ptr {
                    elem: array.clone(),
                },
            )
            .with_field(field)
            .with_optional()
            .into_ref()
        };
        let res = |name: &str, size: u64| {
            let desc = Arc::new(ResourceDesc {
                name: name.to_string(),
                kind: vec![name.to_string()],
                values: vec![u64::MAX, 0],
                size,
            });
            Type::new(name, size, TypeKind::Resource(desc))
                .with_field(name)
                .with_optional()
                .into_ref()
        };

        Self {
            ptr_ptr: ptr("ptr", "ANYPTR", ptr_size),
            ptr64: ptr("ptr64", "ANYPTR64", 8),
            blob: Type::new("ANYBLOB", 0, TypeKind::Buffer(BufferKind::Blob))
                .with_field("ANYBLOB")
                .with_varlen()
                .into_ref(),
            res32: res("ANYRES32", 4),
            res64: res("ANYRES64", 8),
            union,
            array,
        }
    }

    /// Option list of the ANY union, registered with the target's struct descriptions.
    pub fn union_desc(&self) -> StructDesc {
        StructDesc {
            key: StructKey::new(ANY_UNION, Dir::In),
            fields: vec![
                self.blob.clone(),
                self.ptr_ptr.clone(),
                self.ptr64.clone(),
                self.res32.clone(),
                self.res64.clone(),
            ],
        }
    }

    /// Whether `ty` points at the ANY array.
    pub fn is_any_ptr(&self, ty: &Type) -> bool {
        ty.ptr_elem().is_some_and(|elem| Arc::ptr_eq(elem, &self.array))
    }

    /// A universal pointer type `size` bytes wide, named `field` when given.
    pub fn make_any_ptr_type(&self, size: u64, field: Option<&str>) -> ProgResult<Arc<Type>> {
        let mut ty = if size == self.ptr_ptr.size {
            (*self.ptr_ptr).clone()
        } else if size == 8 {
            (*self.ptr64).clone()
        } else {
            return Err(ProgError::BadPointerSize { size });
        };
        if let Some(field) = field.filter(|f| !f.is_empty()) {
            ty.field_name = field.to_string();
        }
        Ok(ty.into_ref())
    }
}

impl Program {
    /// Whether pointer `id` should be squashed.
    ///
    /// Null, raw-mapping and non-input pointers never are. Universal pointers
    /// always are. Otherwise the pointee decides: a varlen struct, or a varlen
    /// union with more than [`MAX_SIMPLE_UNION_OPTIONS`] options, reachable
    /// without crossing another pointer.
    pub fn is_complex_ptr(&self, id: ArgId) -> ProgResult<bool> {
        let arg = self.arg(id);
        if !matches!(arg.kind, ArgKind::Pointer { .. }) {
            return Err(ProgError::BadPointer {
                ty: arg.ty.to_string(),
                reason: "not a pointer",
            });
        }
        let Some(res) = arg.pointee() else {
            return Ok(false);
        };
        if arg.ty.dir != Dir::In {
            return Ok(false);
        }
        if self.target.any().is_any_ptr(&arg.ty) {
            return Ok(true);
        }

        let mut complex = false;
        let mut err = None;
        foreach_sub_arg(self, res, |_, a, ctx| match &a.ty.kind {
            TypeKind::Struct { .. } if a.ty.varlen => {
                complex = true;
                ctx.stop = true;
            }
            TypeKind::Union { key } if a.ty.varlen => {
                match self.target.struct_desc(key) {
                    Some(desc) if desc.fields.len() > MAX_SIMPLE_UNION_OPTIONS => {
                        complex = true;
                        ctx.stop = true;
                    }
                    Some(_) => {}
                    None => {
                        err.get_or_insert(ProgError::UnknownStruct {
                            name: key.name.clone(),
                        });
                        ctx.stop = true;
                    }
                }
            }
            TypeKind::Ptr { .. } => ctx.stop = true,
            _ => {}
        })?;
        if let Some(err) = err {
            return Err(err);
        }
        log::trace!("pointer {} complex: {}", id, complex);
        Ok(complex)
    }

    /// Every complex pointer of the program, in traversal order. Pointers below
    /// a complex one are not reported.
    pub fn complex_ptrs(&self) -> ProgResult<Vec<ArgId>> {
        let mut ptrs = Vec::new();
        let mut err = None;
        for call in self.calls() {
            foreach_arg(self, call, |id, arg, ctx| {
                if !matches!(arg.kind, ArgKind::Pointer { .. }) || err.is_some() {
                    return;
                }
                match self.is_complex_ptr(id) {
                    Ok(true) => {
                        ptrs.push(id);
                        ctx.stop = true;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        err = Some(e);
                        ctx.stop = true;
                    }
                }
            })?;
        }
        match err {
            Some(err) => Err(err),
            None => Ok(ptrs),
        }
    }

    /// Whether any argument of `call` is a universal pointer.
    pub fn call_contains_any(&self, call: &Call) -> ProgResult<bool> {
        let any = self.target.any();
        let mut found = false;
        foreach_arg(self, call, |_, arg, ctx| {
            if any.is_any_ptr(&arg.ty) {
                found = true;
                ctx.stop = true;
            }
        })?;
        Ok(found)
    }

    /// Whether `id` or anything below it is a universal pointer.
    pub fn arg_contains_any(&self, id: ArgId) -> ProgResult<bool> {
        let any = self.target.any();
        let mut found = false;
        foreach_sub_arg(self, id, |_, arg, ctx| {
            if any.is_any_ptr(&arg.ty) {
                found = true;
                ctx.stop = true;
            }
        })?;
        Ok(found)
    }
}
