use thiserror::Error;

/// Everything that can stop a compile or an optimizer run.
///
/// `Semantic` errors come from the user's program and carry the line that triggered them.
/// `Internal` errors mean the compiler produced (or was handed) a malformed instruction stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("ERROR(line {line}): {message}")]
    Semantic { line: usize, message: String },

    #[error("INTERNAL ERROR: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;

impl CompileError {
    pub fn semantic(line: usize, message: impl Into<String>) -> Self {
        CompileError::Semantic {
            line,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal(message.into())
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal(_))
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::Semantic { line, .. } => Some(*line),
            CompileError::Internal(_) => None,
        }
    }
}

/// Return early with a semantic error at `line`, formatted from the remaining arguments.
#[macro_export]
macro_rules! bail_at {
    ($line:expr, $($arg:tt)*) => {
        return Err($crate::error::CompileError::semantic($line, format!($($arg)*)))
    };
}

/// Return early with an internal compiler error.
#[macro_export]
macro_rules! ice {
    ($($arg:tt)*) => {
        return Err($crate::error::CompileError::internal(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_errors_carry_their_line() {
        let err = CompileError::semantic(12, "array indices must be of type int");
        assert_eq!(err.to_string(), "ERROR(line 12): array indices must be of type int");
        assert_eq!(err.line(), Some(12));
        assert!(!err.is_internal());
    }

    #[test]
    fn internal_errors_are_distinct() {
        let err = CompileError::internal("unknown opcode 'frob'");
        assert_eq!(err.to_string(), "INTERNAL ERROR: unknown opcode 'frob'");
        assert!(err.is_internal());
        assert_eq!(err.line(), None);
    }
}
