//! Host-level machine errors.
//!
//! Interpreted-world failures are thrown values and never surface here.
//! These errors cover misuse of the embedding API.

/// Errors returned by the machine's embedding surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// A `PutCFunction` operand named an unregistered host function.
    UnknownHostFunction(u32),
    /// A value passed where a callable was required.
    NotCallable(&'static str),
    /// A module was registered while the runtime was shutting down.
    RuntimeStopped,
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmError::UnknownHostFunction(index) => {
                write!(f, "unknown host function index {index}")
            }
            VmError::NotCallable(kind) => write!(f, "value of type {kind} is not callable"),
            VmError::RuntimeStopped => write!(f, "the runtime has stopped"),
        }
    }
}

impl std::error::Error for VmError {}

/// Result alias for the embedding surface.
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            VmError::UnknownHostFunction(3).to_string(),
            "unknown host function index 3"
        );
        assert_eq!(
            VmError::NotCallable("array").to_string(),
            "value of type array is not callable"
        );
    }
}
