///
/// Linkage Error Types
///
/// Every failure the decode/validate/bind pipeline can report. All of
/// them describe a build-time mismatch between a module's descriptor and
/// its linkage table (or between the module and the running host), so
/// none are retryable and any of them rejects the whole registration.
///
/// Error categories:
/// - MalformedEntry / MissingSentinel: the descriptor rows cannot be decoded
/// - ArityMismatch: callables supplied to the table builder do not match
/// - LinkageLengthMismatch / MisplacedGuard: the linkage table is misshapen
/// - IncompatibleModuleVersion: the module needs a newer runtime
/// - DuplicateSymbol: two exports share a name
/// - MissingConstant / ConstantTypeMismatch: the host cannot supply a constant
/// - InvalidInvocation: a guard slot was called as if it were native code
/// - ModuleAlreadyRegistered: the registry already holds this module name
///

use thiserror::Error;

use crate::value::CallError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("malformed descriptor entry at row {row}: {reason}")]
    MalformedEntry { row: usize, reason: String },

    #[error("descriptor does not end with a sentinel row")]
    MissingSentinel,

    #[error("descriptor declares {expected} function(s) but {found} callable(s) were supplied")]
    ArityMismatch { expected: usize, found: usize },

    #[error("linkage table has {found} slot(s), expected {expected}")]
    LinkageLengthMismatch { expected: usize, found: usize },

    #[error("linkage slot {slot} holds the wrong kind of entry")]
    MisplacedGuard { slot: usize },

    #[error("module requires runtime version {required} or newer, running {running}")]
    IncompatibleModuleVersion { required: u32, running: u32 },

    #[error("duplicate symbol '{name}'")]
    DuplicateSymbol { name: String },

    #[error("constant '{name}' is not provided by the runtime")]
    MissingConstant { name: String },

    #[error("constant '{name}' is declared {expected} but the runtime provides {found}")]
    ConstantTypeMismatch {
        name: String,
        expected: String,
        found: &'static str,
    },

    #[error("linkage slot {slot} is a {kind} and cannot be invoked")]
    InvalidInvocation { slot: usize, kind: &'static str },

    #[error("module '{module}' is already registered")]
    ModuleAlreadyRegistered { module: String },

    #[error(transparent)]
    Call(#[from] CallError),
}

impl LinkError {
    pub fn malformed(row: usize, reason: impl Into<String>) -> Self {
        LinkError::MalformedEntry {
            row,
            reason: reason.into(),
        }
    }

    /// Name of the symbol the error is about, if it concerns one.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            LinkError::DuplicateSymbol { name }
            | LinkError::MissingConstant { name }
            | LinkError::ConstantTypeMismatch { name, .. } => Some(name),
            _ => None,
        }
    }
}
