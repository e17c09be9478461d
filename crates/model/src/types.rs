//! Descriptor tree types
//!
//! Every node is a snapshot taken at enumeration time and is never mutated
//! afterwards. Field names serialize in the camelCase form scripts see, and
//! units are the exposed ones (`maxPower` is in mA).

use crate::constants::{ENDPOINT_ADDRESS_MASK, ENDPOINT_DIR_MASK, ENDPOINT_TYPE_MASK};
use crate::native::NativeDevice;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Render a 16-bit BCD release number as `"MM.mN"`.
///
/// Each nibble becomes one character, most significant first, with a dot
/// after the second: `0x0110` renders as `"01.10"`.
pub fn bcd_version(raw: u16) -> String {
    let digit = |shift: u16| char::from(b'0' + ((raw >> shift) & 0xf) as u8);
    [digit(12), digit(8), '.', digit(4), digit(0)]
        .iter()
        .collect()
}

/// USB bus
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    pub dirname: String,
    pub location: u32,
    pub devices: Vec<Arc<Device>>,
}

/// USB device
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// USB specification release, e.g. `"02.00"`
    pub usb_version: String,
    pub device_class: u8,
    pub device_sub_class: u8,
    pub device_protocol: u8,
    /// Maximum packet size for endpoint 0
    pub max_packet_size: u8,
    #[serde(rename = "idVendor")]
    pub vendor_id: u16,
    #[serde(rename = "idProduct")]
    pub product_id: u16,
    /// Device release number, same rendering as `usb_version`
    pub device_version: String,
    #[serde(rename = "iManufacturer")]
    pub manufacturer_index: u8,
    #[serde(rename = "iProduct")]
    pub product_index: u8,
    #[serde(rename = "iSerialNumber")]
    pub serial_number_index: u8,
    pub num_configurations: u8,
    pub filename: String,
    pub configurations: Vec<Configuration>,
    #[serde(skip)]
    pub(crate) native: Arc<dyn NativeDevice>,
}

impl Device {
    /// Opaque native reference used to open the device
    pub fn native(&self) -> &Arc<dyn NativeDevice> {
        &self.native
    }

    /// Configuration whose `bConfigurationValue` equals `value`
    pub fn configuration(&self, value: u8) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.value == value)
    }

    /// Every endpoint of every configuration, in tree order
    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        self.configurations
            .iter()
            .flat_map(|c| c.interfaces.iter())
            .flat_map(|alts| alts.iter())
            .flat_map(|i| i.endpoints.iter())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:04x}:{:04x} (USB {})",
            self.filename, self.vendor_id, self.product_id, self.usb_version
        )
    }
}

/// USB configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub total_length: u16,
    /// bConfigurationValue
    pub value: u8,
    #[serde(rename = "iConfiguration")]
    pub configuration_index: u8,
    pub self_powered: bool,
    pub remote_wakeup: bool,
    /// Maximum current draw in mA
    pub max_power: u16,
    pub num_interfaces: u8,
    /// Outer index is the interface, inner index the alternate setting
    pub interfaces: Vec<Vec<Interface>>,
}

/// One alternate setting of a USB interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub interface_class: u8,
    pub interface_sub_class: u8,
    pub interface_protocol: u8,
    #[serde(rename = "iInterface")]
    pub interface_index: u8,
    pub num_endpoints: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

/// Endpoint descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub address: u8,
    /// Low two bits of bmAttributes
    #[serde(rename = "type")]
    pub transfer_type: u8,
    pub max_packet_size: u16,
    /// Polling interval
    pub interval: u8,
    pub refresh: u8,
    /// Feedback endpoint of an isochronous endpoint, 0 if none
    pub synch_address: u8,
}

impl EndpointDescriptor {
    pub fn direction(&self) -> Direction {
        if self.address & ENDPOINT_DIR_MASK != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn number(&self) -> u8 {
        self.address & ENDPOINT_ADDRESS_MASK
    }

    pub fn kind(&self) -> TransferType {
        TransferType::from_attributes(self.transfer_type)
    }
}

/// Endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    /// Decode the transfer type bits of an endpoint bmAttributes byte
    pub fn from_attributes(attributes: u8) -> Self {
        match attributes & ENDPOINT_TYPE_MASK {
            0 => Self::Control,
            1 => Self::Isochronous,
            2 => Self::Bulk,
            _ => Self::Interrupt,
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Control => "Control",
            Self::Isochronous => "Isochronous",
            Self::Bulk => "Bulk",
            Self::Interrupt => "Interrupt",
        };
        write!(f, "{}", name)
    }
}

/// Endpoint direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcd_version() {
        assert_eq!(bcd_version(0x0200), "02.00");
        assert_eq!(bcd_version(0x0110), "01.10");
        assert_eq!(bcd_version(0x1234), "12.34");
    }

    #[test]
    fn test_transfer_type_bits() {
        assert_eq!(TransferType::from_attributes(0x00), TransferType::Control);
        assert_eq!(TransferType::from_attributes(0x05), TransferType::Isochronous);
        assert_eq!(TransferType::from_attributes(0x02), TransferType::Bulk);
        assert_eq!(TransferType::from_attributes(0xff), TransferType::Interrupt);
    }

    #[test]
    fn test_endpoint_direction() {
        let ep = EndpointDescriptor {
            address: 0x81,
            transfer_type: 3,
            max_packet_size: 8,
            interval: 10,
            refresh: 0,
            synch_address: 0,
        };
        assert_eq!(ep.direction(), Direction::In);
        assert_eq!(ep.number(), 1);
        assert_eq!(ep.kind(), TransferType::Interrupt);

        let ep = EndpointDescriptor { address: 0x02, ..ep };
        assert_eq!(ep.direction(), Direction::Out);
        assert_eq!(ep.number(), 2);
    }
}
