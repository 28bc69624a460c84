//! sysprog - syscall program IR for a coverage-guided kernel fuzzer.
//!
//! Programs are ordered syscall invocations over a typed argument tree. This
//! crate provides the IR and the passes the generator and mutator rely on:
//! a structural walk over arguments, a conservative analysis of what earlier
//! calls make available, a scan for optional executor features, and the
//! universal ("ANY") encoding that squashes rich pointer subtrees into a flat,
//! mutation-friendly form.
//!
//! # Primary Usage
//!
//! ```ignore
//! use sysprog::{analyze, sys, Call, Program};
//!
//! let target = sys::target("freebsd", "amd64")?;
//! let mut prog = Program::new(target.clone());
//! // ... build calls with prog.make_* and prog.push_call ...
//! let snapshot = analyze(&prog, Some(1))?;
//! for ptr in prog.complex_ptrs()? {
//!     prog.squash_ptr(ptr, true)?;
//! }
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Type descriptors, targets, arguments and programs
//! - [`analysis`] - Traversal, resource/memory analysis, feature scan
//! - [`any`] - ANY types, complexity predicate and pointer squashing
//! - [`sys`] - Built-in target descriptions

pub mod analysis;
pub mod any;
pub mod core;
pub mod sys;

pub use analysis::{
    analyze, foreach_arg, foreach_sub_arg, required_features, ArgCtx, ArgParent, MemAlloc,
    RequiredFeatures, Snapshot, VmaAlloc,
};
pub use any::AnyTypes;
pub use self::core::{
    Arg, ArgId, ArgKind, Call, DataContent, Dir, PointerPayload, ProgError, ProgResult, Program,
    Target, TargetDesc, Type, TypeKind,
};
