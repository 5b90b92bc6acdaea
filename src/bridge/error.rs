//! Error types for the engine bridge
//!
//! Failures of this layer are distinct from the parser's own diagnostics:
//! a parse that reports syntax errors still succeeds here and returns them
//! as data inside [`ParseResult`](super::result::ParseResult).

use std::fmt;

use super::decoder::DecodeError;

/// Result alias used throughout the bridge
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error type for bridge operations
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The foreign allocator could not satisfy a request
    ///
    /// Earlier allocations made during the same call have already been
    /// released when this is returned; the engine remains usable.
    OutOfForeignMemory {
        /// Number of elements requested
        count: u32,
        /// Size of each element in bytes
        size: u32,
    },

    /// A foreign entrypoint trapped or aborted
    ///
    /// The engine instance is poisoned afterwards.
    ForeignInvocationFault {
        /// Export name of the entrypoint that faulted
        entrypoint: String,
        /// Message reported by the runtime
        message: String,
    },

    /// The engine handed out an address range outside its linear memory
    MemoryAccess {
        /// Start address of the access
        address: u32,
        /// Number of bytes accessed
        length: usize,
    },

    /// The serialized result could not be decoded
    MalformedResult(DecodeError),

    /// The engine module could not be compiled, linked or instantiated
    EngineLoad {
        /// Reason reported by the runtime
        reason: String,
    },

    /// The engine faulted earlier and must be discarded
    EnginePoisoned,

    /// The engine was closed
    EngineClosed,

    /// Parser options could not be encoded or loaded
    InvalidOptions {
        /// Why the options were rejected
        reason: String,
    },
}

impl BridgeError {
    /// Create a fault for the given entrypoint
    pub fn fault(entrypoint: &str, message: impl fmt::Display) -> Self {
        BridgeError::ForeignInvocationFault {
            entrypoint: entrypoint.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a load error
    pub fn load(reason: impl fmt::Display) -> Self {
        BridgeError::EngineLoad {
            reason: reason.to_string(),
        }
    }

    /// Whether the foreign instance must be discarded after this error
    ///
    /// Traps and out-of-bounds addresses leave the foreign memory in an
    /// unknown state; every other error leaves the instance consistent.
    #[inline]
    pub fn poisons_engine(&self) -> bool {
        matches!(
            self,
            BridgeError::ForeignInvocationFault { .. } | BridgeError::MemoryAccess { .. }
        )
    }
}

impl From<DecodeError> for BridgeError {
    fn from(err: DecodeError) -> Self {
        BridgeError::MalformedResult(err)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::OutOfForeignMemory { count, size } => {
                write!(
                    f,
                    "Out of foreign memory: allocation of {} x {} bytes failed",
                    count, size
                )
            }
            BridgeError::ForeignInvocationFault {
                entrypoint,
                message,
            } => {
                write!(f, "Foreign entrypoint '{}' faulted: {}", entrypoint, message)
            }
            BridgeError::MemoryAccess { address, length } => {
                write!(
                    f,
                    "Foreign memory access out of bounds: {} bytes at 0x{:x}",
                    length, address
                )
            }
            BridgeError::MalformedResult(err) => {
                write!(f, "Malformed result: {}", err)
            }
            BridgeError::EngineLoad { reason } => {
                write!(f, "Engine load failed: {}", reason)
            }
            BridgeError::EnginePoisoned => {
                write!(f, "Engine faulted earlier and can no longer be used")
            }
            BridgeError::EngineClosed => {
                write!(f, "Engine is closed")
            }
            BridgeError::InvalidOptions { reason } => {
                write!(f, "Invalid parsing options: {}", reason)
            }
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::MalformedResult(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::decoder::DecodeErrorKind;

    #[test]
    fn test_fault_poisons() {
        assert!(BridgeError::fault("pm_serialize_parse", "unreachable").poisons_engine());
        assert!(BridgeError::MemoryAccess {
            address: 16,
            length: 4
        }
        .poisons_engine());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(!BridgeError::OutOfForeignMemory { count: 1, size: 8 }.poisons_engine());
        assert!(!BridgeError::EngineClosed.poisons_engine());
        let decode = DecodeError::new(3, DecodeErrorKind::TrailingBytes { remaining: 1 });
        assert!(!BridgeError::from(decode).poisons_engine());
    }

    #[test]
    fn test_display() {
        let err = BridgeError::OutOfForeignMemory { count: 2, size: 16 };
        assert_eq!(
            err.to_string(),
            "Out of foreign memory: allocation of 2 x 16 bytes failed"
        );

        let err = BridgeError::fault("calloc", "out of fuel");
        assert_eq!(err.to_string(), "Foreign entrypoint 'calloc' faulted: out of fuel");
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let decode = DecodeError::new(0, DecodeErrorKind::UnknownNodeKind { tag: 99 });
        let err = BridgeError::from(decode);
        assert!(err.source().is_some());
        assert!(BridgeError::EnginePoisoned.source().is_none());
    }
}
