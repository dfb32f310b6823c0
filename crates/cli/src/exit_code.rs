//! Process exit codes
//!
//! Every failure terminates with status 1; the variants only record why.

/// Outcome of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Command completed successfully
    Success,

    /// Missing or invalid argument, or unusable configuration
    UsageError,

    /// Remote or local operation failed
    GeneralError,
}

impl ExitCode {
    /// Numeric process status
    pub fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::UsageError | ExitCode::GeneralError => 1,
        }
    }

    /// Exit code for a core error; every error is a failure
    pub fn from_error(error: &ot_core::Error) -> Self {
        if error.is_fatal() {
            ExitCode::UsageError
        } else {
            ExitCode::GeneralError
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}
