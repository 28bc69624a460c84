// This module serves as the central hub for the program IR shared by every analysis and
// transformation in the crate. It exports the syscall type descriptors (closed TypeKind sum,
// resource and struct descriptions), the per-architecture Target built once and shared
// read-only, the argument nodes and their arena ids, the Program that owns calls and
// arguments, and the error type all fallible operations return. Nothing in here walks or
// rewrites argument trees; that lives in the analysis and any modules built on top.

//! Core program IR.
//!
//! # Key Components
//!
//! ## Type descriptors (`types`)
//! - Closed `TypeKind` sum with shared scalar attributes
//! - Struct and union field lists keyed by `StructKey`
//!
//! ## Targets (`target`)
//! - Validated per-architecture configuration and lookup tables
//! - The ANY type vocabulary, built once per target
//!
//! ## Arguments and programs (`arg`, `prog`)
//! - Arena of argument nodes referenced by `ArgId`
//! - Size rules and a line-oriented dump

pub mod arg;
pub mod error;
pub mod prog;
pub mod target;
pub mod test_utils;
pub mod types;

pub use arg::{Arg, ArgId, ArgKind, DataContent, PointerPayload};

pub use error::{ProgError, ProgResult};

pub use prog::{Call, Program};

pub use target::{Target, TargetDesc};

pub use types::{
    BufferKind, ConstValue, CsumKind, Dir, IntCommon, ResourceDesc, StructDesc, StructKey,
    Syscall, Type, TypeKind,
};
