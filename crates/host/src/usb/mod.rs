//! USB subsystem
//!
//! This module implements the USB side of usbtree:
//! - Bus and device enumeration into the descriptor tree
//! - Device handle lifecycle (open, configuration, interface claim)
//! - Synchronous control, bulk and interrupt transfers
//! - Endpoints bound to open handles through the session registry
//!
//! Every call blocks until the native transport returns. A device handle
//! is not safe for concurrent use; the descriptor tree is.

pub mod backend;
pub mod endpoint;
pub mod enumerate;
pub mod handle;
pub mod session;

pub use backend::RusbBackend;
pub use endpoint::{Endpoint, HandleId};
pub use enumerate::enumerate;
pub use handle::{
    AltSelector, ConfigSelector, ControlRequest, DeviceHandle, EndpointSelector, HandleState,
    InterfaceSelector,
};
pub use session::Session;
