//! Recoverable error surface shared by the framework and execution providers.

use thiserror::Error;

/// Failure reported back to the caller that scheduled the kernel.
///
/// These cover invalid model input and registration problems. Contract
/// violations inside the process (wrong downcast type, out-of-range logical
/// index, missing output shape) panic instead; see the module docs on
/// [`crate::framework::value`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("invalid argument for {op}: {message}")]
    InvalidArgument { op: String, message: String },
    #[error("no kernel registered for {op}: {detail}")]
    MissingKernel { op: String, detail: String },
    #[error("multiple kernel registrations match {op}: {detail}")]
    AmbiguousKernel { op: String, detail: String },
    #[error("duplicate kernel registration for {op}: {detail}")]
    DuplicateKernel { op: String, detail: String },
    #[error("allocation failed: {message}")]
    Allocation { message: String },
    #[error("{what} is not supported: {detail}")]
    Unsupported { what: String, detail: String },
    #[error("kernel execution failure: {message}")]
    Execution { message: String },
}

impl ExecError {
    pub fn invalid_argument(op: impl Into<String>, message: impl Into<String>) -> Self {
        ExecError::InvalidArgument {
            op: op.into(),
            message: message.into(),
        }
    }

    pub fn missing_kernel(op: impl Into<String>, detail: impl Into<String>) -> Self {
        ExecError::MissingKernel {
            op: op.into(),
            detail: detail.into(),
        }
    }

    pub fn ambiguous_kernel(op: impl Into<String>, detail: impl Into<String>) -> Self {
        ExecError::AmbiguousKernel {
            op: op.into(),
            detail: detail.into(),
        }
    }

    pub fn duplicate_kernel(op: impl Into<String>, detail: impl Into<String>) -> Self {
        ExecError::DuplicateKernel {
            op: op.into(),
            detail: detail.into(),
        }
    }

    pub fn allocation(message: impl Into<String>) -> Self {
        ExecError::Allocation {
            message: message.into(),
        }
    }

    pub fn unsupported(what: impl Into<String>, detail: impl Into<String>) -> Self {
        ExecError::Unsupported {
            what: what.into(),
            detail: detail.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        ExecError::Execution {
            message: message.into(),
        }
    }
}

/// Convenience alias for results returned by framework and kernel routines.
pub type ExecResult<T> = Result<T, ExecError>;
