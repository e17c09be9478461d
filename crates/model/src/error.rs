//! USB error kinds

use thiserror::Error;

/// Errors reported by enumeration, coercion and device handle operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsbError {
    /// The native transport reported a failure; the message is its own text
    #[error("{message}")]
    Transport { message: String },

    /// A caller-supplied value could not be coerced or has the wrong shape
    #[error("Invalid argument: {context}")]
    InvalidArgument { context: String },

    /// Release requested while no interface is claimed
    #[error("No interface claimed")]
    NoInterfaceClaimed,

    /// Claim requested while another interface is still claimed
    #[error("Interface {claimed} is already claimed")]
    InterfaceAlreadyClaimed { claimed: u8 },

    /// Descriptor tree construction could not fill a node
    #[error("Descriptor tree build failed: {context}")]
    BuildFailure { context: String },

    /// Operation intentionally not implemented
    #[error("Not implemented: {operation}")]
    Unsupported { operation: &'static str },

    /// A bound endpoint refers to a handle that has been closed
    #[error("Device handle {handle} is closed")]
    HandleClosed { handle: u32 },
}

impl UsbError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Self::InvalidArgument {
            context: context.into(),
        }
    }

    pub fn build_failure(context: impl Into<String>) -> Self {
        Self::BuildFailure {
            context: context.into(),
        }
    }
}

/// Type alias for USB results
pub type Result<T> = std::result::Result<T, UsbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_message_passes_through() {
        let err = UsbError::transport("could not open device: Access denied");
        assert_eq!(err.to_string(), "could not open device: Access denied");
    }

    #[test]
    fn test_error_display() {
        let err = UsbError::InterfaceAlreadyClaimed { claimed: 2 };
        assert!(err.to_string().contains("Interface 2"));

        let err = UsbError::Unsupported {
            operation: "endpoint read",
        };
        assert_eq!(err.to_string(), "Not implemented: endpoint read");
    }
}
