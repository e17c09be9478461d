//! usbtree host library
//!
//! Enumerates USB busses into an immutable descriptor tree and manages
//! device handles (open, configure, claim, release, control transfers)
//! on top of a native transport. The production transport is libusb via
//! `rusb`; tests drive the same code through `common::test_utils`.

pub mod config;
pub mod usb;

pub use config::HostConfig;
pub use usb::{
    AltSelector, ConfigSelector, ControlRequest, DeviceHandle, Endpoint, EndpointSelector,
    HandleId, HandleState, InterfaceSelector, RusbBackend, Session, enumerate,
};
