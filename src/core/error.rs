// This module defines the error type for sysprog using the thiserror crate. ProgError covers
// the two kinds of failure the program core can report: internal-consistency violations
// (a group whose children do not add up to its size, a squash that changed the byte size,
// a resource placeholder of unsupported width, a malformed pointer payload, a target
// description that cannot be built) and plain lookup failures (an unknown target or a call
// index past the end of a program). Consistency violations mean the program or the type
// descriptions are corrupt and must never be retried; is_corrupt() lets callers tell the
// two apart. ProgResult<T> is the convenience alias used throughout the crate.

//! Error types for the program core.

use thiserror::Error;

/// Main error type for program analysis and transformation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgError {
    #[error("bad group arg size {total}, should be {} {claimed} for {ty}", size_relation(.varlen))]
    GroupSize {
        total: u64,
        claimed: u64,
        varlen: bool,
        ty: String,
    },

    #[error("squash changed size {before}->{after} for {ty}")]
    SquashSize {
        before: u64,
        after: u64,
        ty: String,
    },

    #[error("bad resource size {size} for {ty}, expected 4 or 8")]
    BadResourceSize {
        size: u64,
        ty: String,
    },

    #[error("bad pointer size {size}")]
    BadPointerSize {
        size: u64,
    },

    #[error("bad pointer arg {ty}: {reason}")]
    BadPointer {
        ty: String,
        reason: &'static str,
    },

    #[error("bitfield middle {ty} reached in squash")]
    BitfieldInSquash {
        ty: String,
    },

    #[error("no struct description for {name}")]
    UnknownStruct {
        name: String,
    },

    #[error("invalid target description: {reason}")]
    InvalidTarget {
        reason: String,
    },

    #[error("call index {idx} out of range for program with {len} calls")]
    CallOutOfRange {
        idx: usize,
        len: usize,
    },

    #[error("unknown target {os}/{arch}")]
    UnknownTarget {
        os: String,
        arch: String,
    },
}

fn size_relation(varlen: &bool) -> &'static str {
    if *varlen {
        "<="
    } else {
        "=="
    }
}

impl ProgError {
    /// Whether the error signals corrupt programs or descriptions rather than a bad lookup.
    pub fn is_corrupt(&self) -> bool {
        !matches!(
            self,
            ProgError::CallOutOfRange { .. } | ProgError::UnknownTarget { .. }
        )
    }
}

/// Result type alias for program operations.
pub type ProgResult<T> = Result<T, ProgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_size_message() {
        let err = ProgError::GroupSize {
            total: 12,
            claimed: 8,
            varlen: true,
            ty: "msghdr".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "bad group arg size 12, should be <= 8 for msghdr"
        );
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_lookup_errors_are_not_corrupt() {
        let err = ProgError::UnknownTarget {
            os: "plan9".to_string(),
            arch: "mips".to_string(),
        };
        assert!(!err.is_corrupt());
        assert!(!ProgError::CallOutOfRange { idx: 3, len: 1 }.is_corrupt());
    }
}
