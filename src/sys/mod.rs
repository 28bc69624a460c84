//! Built-in target descriptions.
//!
//! Each target is built on first use and then shared process-wide as an
//! immutable `Arc<Target>`; later lookups return the same instance.

use crate::core::error::{ProgError, ProgResult};
use crate::core::target::Target;
use crate::core::types::{
    BufferKind, Dir, IntCommon, ResourceDesc, StructKey, Type, TypeKind,
};
use std::sync::{Arc, OnceLock};

pub mod freebsd;

static FREEBSD_AMD64: OnceLock<Arc<Target>> = OnceLock::new();
static TEST_64: OnceLock<Arc<Target>> = OnceLock::new();
static TEST_32: OnceLock<Arc<Target>> = OnceLock::new();

/// Registered (os, arch) pairs.
pub fn targets() -> &'static [(&'static str, &'static str)] {
    &[("freebsd", "amd64"), ("test", "64"), ("test", "32")]
}

/// Look up a built-in target, building it on first use.
pub fn target(os: &str, arch: &str) -> ProgResult<Arc<Target>> {
    match (os, arch) {
        ("freebsd", "amd64") => cached(&FREEBSD_AMD64, freebsd::amd64),
        ("test", "64") => cached(&TEST_64, || test::build("64", 8)),
        ("test", "32") => cached(&TEST_32, || test::build("32", 4)),
        _ => Err(ProgError::UnknownTarget {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

fn cached(
    cell: &'static OnceLock<Arc<Target>>,
    build: impl FnOnce() -> ProgResult<Target>,
) -> ProgResult<Arc<Target>> {
    if let Some(target) = cell.get() {
        return Ok(target.clone());
    }
    let target = Arc::new(build()?);
    Ok(cell.get_or_init(|| target).clone())
}

// Helpers for writing descriptor tables.

pub(crate) fn int(size: u64) -> Type {
    Type::new(format!("int{}", size * 8), size, TypeKind::Int(IntCommon::default()))
}

pub(crate) fn bitfield(size: u64, off: u64, len: u64, middle: bool) -> Type {
    Type::new(
        format!("int{}", size * 8),
        size,
        TypeKind::Int(IntCommon::bitfield(off, len, middle)),
    )
}

pub(crate) fn flags(size: u64, name: &str, vals: Vec<u64>) -> Type {
    Type::new(
        name,
        size,
        TypeKind::Flags {
            int: IntCommon::default(),
            vals,
        },
    )
}

pub(crate) fn konst(size: u64, val: u64) -> Type {
    Type::new(
        "const",
        size,
        TypeKind::Const {
            int: IntCommon::default(),
            val,
            is_pad: false,
        },
    )
}

pub(crate) fn pad(size: u64) -> Type {
    Type::new(
        "pad",
        size,
        TypeKind::Const {
            int: IntCommon::default(),
            val: 0,
            is_pad: true,
        },
    )
}

pub(crate) fn len(size: u64, buf: &str) -> Type {
    Type::new(
        "len",
        size,
        TypeKind::Len {
            int: IntCommon::default(),
            buf: buf.to_string(),
        },
    )
}

pub(crate) fn resource(desc: &Arc<ResourceDesc>) -> Type {
    Type::new(desc.name.clone(), desc.size, TypeKind::Resource(desc.clone()))
}

pub(crate) fn ptr(name: &str, size: u64, elem: Arc<Type>) -> Type {
    Type::new(name, size, TypeKind::Ptr { elem })
}

pub(crate) fn vma(size: u64) -> Type {
    Type::new("vma", size, TypeKind::Vma)
}

pub(crate) fn buffer(name: &str, kind: BufferKind) -> Type {
    Type::new(name, 0, TypeKind::Buffer(kind)).with_varlen()
}

pub(crate) fn array(size: u64, elem: Arc<Type>) -> Type {
    Type::new("array", size, TypeKind::Array { elem })
}

pub(crate) fn struct_type(name: &str, dir: Dir, size: u64, align_attr: u64) -> Type {
    Type::new(
        name,
        size,
        TypeKind::Struct {
            key: StructKey::new(name, dir),
            align_attr,
        },
    )
    .with_dir(dir)
}

pub(crate) fn union_type(name: &str, dir: Dir, size: u64) -> Type {
    Type::new(
        name,
        size,
        TypeKind::Union {
            key: StructKey::new(name, dir),
        },
    )
    .with_dir(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_are_shared() {
        let a = target("test", "64").unwrap();
        let b = target("test", "64").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_all_registered_targets_build() {
        for (os, arch) in targets() {
            let target = target(os, arch).unwrap();
            assert_eq!(target.os, *os);
            assert_eq!(target.arch, *arch);
        }
    }

    #[test]
    fn test_unknown_target() {
        let err = target("plan9", "mips").unwrap_err();
        assert!(!err.is_corrupt());
    }
}
