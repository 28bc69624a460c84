//! Executor features a program depends on.

use super::foreach::foreach_arg;
use crate::core::arg::ArgKind;
use crate::core::error::ProgResult;
use crate::core::prog::Program;
use crate::core::types::TypeKind;

/// Optional executor features used somewhere in a program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequiredFeatures {
    /// A constant is a bitfield member.
    pub bitmasks: bool,
    /// An argument is a checksum.
    pub checksums: bool,
}

/// Scan the whole program for bitfield constants and checksum arguments.
pub fn required_features(prog: &Program) -> ProgResult<RequiredFeatures> {
    let mut features = RequiredFeatures::default();
    for call in prog.calls() {
        foreach_arg(prog, call, |_, arg, _| {
            if matches!(arg.kind, ArgKind::Const { .. })
                && (arg.ty.bitfield_offset() != 0 || arg.ty.bitfield_length() != 0)
            {
                features.bitmasks = true;
            }
            if matches!(arg.ty.kind, TypeKind::Csum { .. }) {
                features.checksums = true;
            }
        })?;
    }
    Ok(features)
}
