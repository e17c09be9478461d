//! Native transport interface
//!
//! The descriptor tree and the device handle never talk to libusb directly.
//! A backend hands out raw descriptor records laid out as the USB
//! specification defines them, plus opaque device references that can be
//! opened into native handles.

use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Bus and device discovery
pub trait UsbBackend {
    /// Rescan the busses. Returns the number of busses found.
    fn find_busses(&mut self) -> Result<usize>;

    /// Rescan the devices on every bus. Returns the number of devices found.
    fn find_devices(&mut self) -> Result<usize>;

    /// Native bus list from the last rescan, in native order
    fn busses(&self) -> Result<Vec<NativeBus>>;
}

/// Opaque reference to a native device record
pub trait NativeDevice: fmt::Debug + Send + Sync {
    fn open(&self) -> Result<Box<dyn NativeHandle>>;
}

/// An open native device handle
///
/// Calls block until the transport returns. Implementations are not
/// required to be safe for concurrent use.
pub trait NativeHandle: Send {
    fn set_configuration(&mut self, value: u8) -> Result<()>;

    fn claim_interface(&mut self, interface: u8) -> Result<()>;

    fn release_interface(&mut self, interface: u8) -> Result<()>;

    fn set_alt_interface(&mut self, interface: u8, alternate: u8) -> Result<()>;

    /// Synchronous control transfer. For device-to-host requests `buf` is
    /// filled; otherwise it is sent. Returns the number of bytes transferred.
    fn control_msg(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize>;

    fn bulk_write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;

    fn bulk_read(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    fn interrupt_write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;

    fn interrupt_read(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration)
    -> Result<usize>;

    /// Close the native handle. Further calls on it fail.
    fn close(&mut self) -> Result<()>;
}

/// Native bus record
#[derive(Debug, Clone)]
pub struct NativeBus {
    pub dirname: String,
    pub location: u32,
    pub devices: Vec<NativeDeviceRecord>,
}

/// Native device record: descriptors plus the reference used to open it
#[derive(Debug, Clone)]
pub struct NativeDeviceRecord {
    pub filename: String,
    pub descriptor: NativeDeviceDescriptor,
    pub configs: Vec<NativeConfigDescriptor>,
    pub device: Arc<dyn NativeDevice>,
}

/// Raw device descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeDeviceDescriptor {
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_sub_class: u8,
    pub device_protocol: u8,
    pub max_packet_size0: u8,
    pub id_vendor: u16,
    pub id_product: u16,
    pub bcd_device: u16,
    pub i_manufacturer: u8,
    pub i_product: u8,
    pub i_serial_number: u8,
    pub num_configurations: u8,
}

/// Raw configuration descriptor with its parsed interfaces
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeConfigDescriptor {
    pub total_length: u16,
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub i_configuration: u8,
    pub attributes: u8,
    /// bMaxPower, in 2 mA units
    pub max_power: u8,
    pub interfaces: Vec<NativeInterface>,
}

/// All alternate settings of one interface number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeInterface {
    pub num_altsetting: u8,
    pub altsettings: Vec<NativeInterfaceDescriptor>,
}

/// Raw interface descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeInterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_sub_class: u8,
    pub interface_protocol: u8,
    pub i_interface: u8,
    pub endpoints: Vec<NativeEndpointDescriptor>,
}

/// Raw endpoint descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeEndpointDescriptor {
    pub endpoint_address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
    pub refresh: u8,
    pub synch_address: u8,
}
