//! freebsd/amd64 descriptions.

use super::{flags, konst, len, ptr, resource, struct_type, vma};
use crate::core::error::ProgResult;
use crate::core::target::{Target, TargetDesc};
use crate::core::types::{ConstValue, Dir, ResourceDesc, StructDesc, StructKey, Syscall};
use std::sync::Arc;

const REVISION_AMD64: &str = "7c737d486a33a6a0817ce924247b4b67428f7a07";

const CONSTS_AMD64: &[(&str, u64)] = &[
    ("MAP_ANONYMOUS", 4096),
    ("MAP_FIXED", 16),
    ("MAP_PRIVATE", 2),
    ("PROT_READ", 1),
    ("PROT_WRITE", 2),
    ("SYS_mmap", 477),
    ("SYS_pipe", 42),
];

pub fn amd64() -> ProgResult<Target> {
    let fd = Arc::new(ResourceDesc {
        name: "fd".to_string(),
        kind: vec!["fd".to_string()],
        values: vec![u64::MAX],
        size: 4,
    });

    let pipefd = StructDesc {
        key: StructKey::new("pipefd", Dir::Out),
        fields: vec![
            resource(&fd).with_field("rfd").with_dir(Dir::Out).into_ref(),
            resource(&fd).with_field("wfd").with_dir(Dir::Out).into_ref(),
        ],
    };

    let mmap = Syscall::new(
        "mmap",
        477,
        vec![
            vma(8).with_field("addr").into_ref(),
            len(8, "addr").with_field("len").into_ref(),
            flags(8, "mmap_prot", vec![1, 2]).with_field("prot").into_ref(),
            flags(8, "mmap_flags", vec![2, 4096, 16])
                .with_field("flags")
                .into_ref(),
            konst(8, u64::MAX).with_field("fd").into_ref(),
            konst(8, 0).with_field("offset").into_ref(),
        ],
    )
    .with_ret(vma(8).with_field("ret").with_dir(Dir::Out).into_ref());

    let pipe = Syscall::new(
        "pipe",
        42,
        vec![ptr(
            "ptr",
            8,
            struct_type("pipefd", Dir::Out, 8, 0).into_ref(),
        )
        .with_field("pipefd")
        .into_ref()],
    );

    Target::new(TargetDesc {
        os: "freebsd".to_string(),
        arch: "amd64".to_string(),
        revision: REVISION_AMD64.to_string(),
        ptr_size: 8,
        syscalls: vec![mmap, pipe],
        resources: vec![fd],
        structs: vec![pipefd],
        consts: CONSTS_AMD64
            .iter()
            .map(|&(name, value)| ConstValue {
                name: name.to_string(),
                value,
            })
            .collect(),
        ..TargetDesc::default()
    })
}
