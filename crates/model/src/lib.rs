//! Descriptor model for usbtree
//!
//! This crate defines the read-only USB topology snapshot (bus, device,
//! configuration, interface, endpoint), the builder that produces it from
//! native descriptor records, the value coercion used for transfer payloads,
//! and the narrow traits through which a native USB transport is driven.
//!
//! # Example
//!
//! ```
//! use model::Value;
//!
//! let payload = Value::from("AB");
//! assert_eq!(payload.to_bytes().unwrap(), vec![0x41, 0x42]);
//!
//! let nested = Value::Seq(vec![Value::from(vec![5, 6]), Value::from(7)]);
//! assert_eq!(nested.to_byte().unwrap(), 0x05);
//! ```
//!
//! # Version strings
//!
//! ```
//! use model::bcd_version;
//!
//! assert_eq!(bcd_version(0x0200), "02.00");
//! assert_eq!(bcd_version(0x0110), "01.10");
//! ```

pub mod builder;
pub mod constants;
pub mod error;
pub mod native;
pub mod types;
pub mod value;

pub use builder::build_busses;
pub use error::{Result, UsbError};
pub use native::{
    NativeBus, NativeConfigDescriptor, NativeDevice, NativeDeviceDescriptor, NativeDeviceRecord,
    NativeEndpointDescriptor, NativeHandle, NativeInterface, NativeInterfaceDescriptor, UsbBackend,
};
pub use types::{
    Bus, Configuration, Device, Direction, EndpointDescriptor, Interface, TransferType,
    bcd_version,
};
pub use value::Value;
