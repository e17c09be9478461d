//! libusb transport
//!
//! Implements the native transport traits on top of `rusb`. libusb-1.0
//! decodes some descriptor fields that the descriptor tree expects raw
//! (BCD release numbers, bmAttributes, bMaxPower), so they are re-encoded
//! here before the tree builder sees them.

use model::constants::{DT_CONFIG_SIZE, DT_ENDPOINT_SIZE, DT_INTERFACE_SIZE, ENDPOINT_IN};
use model::{
    NativeBus, NativeConfigDescriptor, NativeDevice, NativeDeviceDescriptor, NativeDeviceRecord,
    NativeEndpointDescriptor, NativeHandle, NativeInterface, NativeInterfaceDescriptor, Result,
    UsbBackend, UsbError,
};
use rusb::{Context, Device, DeviceHandle, DeviceList, UsbContext};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Map rusb::Error to a transport error carrying libusb's own text
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    UsbError::transport(err.to_string())
}

/// USB backend over a libusb context
pub struct RusbBackend {
    /// USB context for device operations
    context: Context,
    /// Device list from the last rescan
    devices: Option<DeviceList<Context>>,
}

impl RusbBackend {
    pub fn new() -> Result<Self> {
        let context = Context::new().map_err(map_rusb_error)?;
        Ok(Self {
            context,
            devices: None,
        })
    }

    fn rescan(&mut self) -> Result<&DeviceList<Context>> {
        let list = self.context.devices().map_err(map_rusb_error)?;
        Ok(self.devices.insert(list))
    }
}

impl UsbBackend for RusbBackend {
    fn find_busses(&mut self) -> Result<usize> {
        let list = self.rescan()?;
        let mut busses: Vec<u8> = Vec::new();
        for device in list.iter() {
            if !busses.contains(&device.bus_number()) {
                busses.push(device.bus_number());
            }
        }
        Ok(busses.len())
    }

    fn find_devices(&mut self) -> Result<usize> {
        Ok(self.rescan()?.len())
    }

    fn busses(&self) -> Result<Vec<NativeBus>> {
        let list = self
            .devices
            .as_ref()
            .ok_or_else(|| UsbError::transport("device list has not been scanned"))?;

        let mut busses: Vec<NativeBus> = Vec::new();
        for device in list.iter() {
            let record = device_record(&device)?;
            let location = u32::from(device.bus_number());

            match busses.iter_mut().find(|b| b.location == location) {
                Some(bus) => bus.devices.push(record),
                None => busses.push(NativeBus {
                    dirname: format!("{:03}", device.bus_number()),
                    location,
                    devices: vec![record],
                }),
            }
        }

        debug!("Read descriptors for {} devices", list.len());
        Ok(busses)
    }
}

fn device_record(device: &Device<Context>) -> Result<NativeDeviceRecord> {
    let desc = device.device_descriptor().map_err(map_rusb_error)?;
    let filename = format!("{:03}", device.address());

    let mut configs = Vec::with_capacity(desc.num_configurations() as usize);
    for index in 0..desc.num_configurations() {
        match device.config_descriptor(index) {
            Ok(config) => configs.push(config_record(&config)),
            Err(e) => warn!(
                "Failed to read configuration {} of device {}:{}: {}",
                index,
                device.bus_number(),
                device.address(),
                e
            ),
        }
    }

    Ok(NativeDeviceRecord {
        filename,
        descriptor: NativeDeviceDescriptor {
            bcd_usb: version_to_bcd(desc.usb_version()),
            device_class: desc.class_code(),
            device_sub_class: desc.sub_class_code(),
            device_protocol: desc.protocol_code(),
            max_packet_size0: desc.max_packet_size(),
            id_vendor: desc.vendor_id(),
            id_product: desc.product_id(),
            bcd_device: version_to_bcd(desc.device_version()),
            i_manufacturer: desc.manufacturer_string_index().unwrap_or(0),
            i_product: desc.product_string_index().unwrap_or(0),
            i_serial_number: desc.serial_number_string_index().unwrap_or(0),
            num_configurations: desc.num_configurations(),
        },
        configs,
        device: Arc::new(RusbDevice {
            device: device.clone(),
        }),
    })
}

fn config_record(config: &rusb::ConfigDescriptor) -> NativeConfigDescriptor {
    let mut total_length = DT_CONFIG_SIZE as usize + config.extra().len();
    let mut interfaces = Vec::with_capacity(config.num_interfaces() as usize);

    for interface in config.interfaces() {
        let mut altsettings = Vec::new();
        for alt in interface.descriptors() {
            total_length += DT_INTERFACE_SIZE as usize + alt.extra().len();

            let endpoints: Vec<NativeEndpointDescriptor> = alt
                .endpoint_descriptors()
                .map(|ep| {
                    total_length +=
                        DT_ENDPOINT_SIZE as usize + ep.extra().map_or(0, |extra| extra.len());
                    NativeEndpointDescriptor {
                        endpoint_address: ep.address(),
                        attributes: endpoint_attributes(&ep),
                        max_packet_size: ep.max_packet_size(),
                        interval: ep.interval(),
                        refresh: ep.refresh(),
                        synch_address: ep.synch_address(),
                    }
                })
                .collect();

            altsettings.push(NativeInterfaceDescriptor {
                interface_number: alt.interface_number(),
                alternate_setting: alt.setting_number(),
                num_endpoints: alt.num_endpoints(),
                interface_class: alt.class_code(),
                interface_sub_class: alt.sub_class_code(),
                interface_protocol: alt.protocol_code(),
                i_interface: alt.description_string_index().unwrap_or(0),
                endpoints,
            });
        }

        interfaces.push(NativeInterface {
            num_altsetting: altsettings.len() as u8,
            altsettings,
        });
    }

    NativeConfigDescriptor {
        total_length: total_length as u16,
        num_interfaces: config.num_interfaces(),
        configuration_value: config.number(),
        i_configuration: config.description_string_index().unwrap_or(0),
        attributes: config_attributes(config.self_powered(), config.remote_wakeup()),
        max_power: (config.max_power() / 2) as u8,
        interfaces,
    }
}

/// Re-encode a decoded release number as BCD
fn version_to_bcd(version: rusb::Version) -> u16 {
    let major = u16::from(version.major());
    ((major / 10) << 12)
        | ((major % 10) << 8)
        | ((u16::from(version.minor()) & 0xf) << 4)
        | (u16::from(version.sub_minor()) & 0xf)
}

/// Configuration bmAttributes; bit 7 is reserved and always set
fn config_attributes(self_powered: bool, remote_wakeup: bool) -> u8 {
    0x80 | (u8::from(self_powered) << 6) | (u8::from(remote_wakeup) << 5)
}

/// Endpoint bmAttributes from the decoded transfer, sync and usage types
fn endpoint_attributes(ep: &rusb::EndpointDescriptor) -> u8 {
    let transfer = match ep.transfer_type() {
        rusb::TransferType::Control => 0,
        rusb::TransferType::Isochronous => 1,
        rusb::TransferType::Bulk => 2,
        rusb::TransferType::Interrupt => 3,
    };
    let sync = match ep.sync_type() {
        rusb::SyncType::NoSync => 0,
        rusb::SyncType::Asynchronous => 1,
        rusb::SyncType::Adaptive => 2,
        rusb::SyncType::Synchronous => 3,
    };
    let usage = match ep.usage_type() {
        rusb::UsageType::Data => 0,
        rusb::UsageType::Feedback => 1,
        rusb::UsageType::FeedbackData => 2,
        rusb::UsageType::Reserved => 3,
    };
    transfer | (sync << 2) | (usage << 4)
}

/// Native device reference backed by a libusb device
pub struct RusbDevice {
    device: Device<Context>,
}

impl fmt::Debug for RusbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusbDevice")
            .field("bus", &self.device.bus_number())
            .field("address", &self.device.address())
            .finish()
    }
}

impl NativeDevice for RusbDevice {
    fn open(&self) -> Result<Box<dyn NativeHandle>> {
        let handle = self.device.open().map_err(map_rusb_error)?;
        Ok(Box::new(RusbHandle {
            handle: Some(handle),
        }))
    }
}

/// Open libusb device handle
pub struct RusbHandle {
    handle: Option<DeviceHandle<Context>>,
}

impl RusbHandle {
    fn handle_mut(&mut self) -> Result<&mut DeviceHandle<Context>> {
        self.handle
            .as_mut()
            .ok_or_else(|| UsbError::transport("device handle is closed"))
    }
}

impl NativeHandle for RusbHandle {
    fn set_configuration(&mut self, value: u8) -> Result<()> {
        self.handle_mut()?
            .set_active_configuration(value)
            .map_err(map_rusb_error)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<()> {
        self.handle_mut()?
            .claim_interface(interface)
            .map_err(map_rusb_error)
    }

    fn release_interface(&mut self, interface: u8) -> Result<()> {
        self.handle_mut()?
            .release_interface(interface)
            .map_err(map_rusb_error)
    }

    fn set_alt_interface(&mut self, interface: u8, alternate: u8) -> Result<()> {
        self.handle_mut()?
            .set_alternate_setting(interface, alternate)
            .map_err(map_rusb_error)
    }

    fn control_msg(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        let handle = self.handle_mut()?;
        let result = if request_type & ENDPOINT_IN != 0 {
            handle.read_control(request_type, request, value, index, buf, timeout)
        } else {
            handle.write_control(request_type, request, value, index, buf, timeout)
        };
        result.map_err(map_rusb_error)
    }

    fn bulk_write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        self.handle_mut()?
            .write_bulk(endpoint, data, timeout)
            .map_err(map_rusb_error)
    }

    fn bulk_read(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.handle_mut()?
            .read_bulk(endpoint, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn interrupt_write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        self.handle_mut()?
            .write_interrupt(endpoint, data, timeout)
            .map_err(map_rusb_error)
    }

    fn interrupt_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        self.handle_mut()?
            .read_interrupt(endpoint, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn close(&mut self) -> Result<()> {
        // libusb closes the handle when it is dropped
        self.handle
            .take()
            .map(drop)
            .ok_or_else(|| UsbError::transport("device handle is already closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(
            map_rusb_error(rusb::Error::Access),
            UsbError::transport(rusb::Error::Access.to_string())
        );
        assert_eq!(
            map_rusb_error(rusb::Error::Timeout).to_string(),
            rusb::Error::Timeout.to_string()
        );
    }

    #[test]
    fn test_version_to_bcd() {
        assert_eq!(version_to_bcd(rusb::Version(2, 0, 0)), 0x0200);
        assert_eq!(version_to_bcd(rusb::Version(1, 1, 0)), 0x0110);
        assert_eq!(version_to_bcd(rusb::Version(12, 3, 4)), 0x1234);
        assert_eq!(version_to_bcd(rusb::Version::from_bcd(0x0321)), 0x0321);
    }

    #[test]
    fn test_config_attributes() {
        assert_eq!(config_attributes(true, true), 0b1110_0000);
        assert_eq!(config_attributes(false, false), 0b1000_0000);
        assert_eq!(config_attributes(true, false), 0b1100_0000);
    }
}
