//! Device handle lifecycle
//!
//! A [`DeviceHandle`] is an open native handle plus the number of the
//! interface currently claimed on it, if any. At most one interface is
//! claimed at a time. Dropping the handle releases the claimed interface
//! and then closes the native handle.

use model::{
    Configuration, Device, EndpointDescriptor, Interface, NativeHandle, Result, UsbError, Value,
    constants::ENDPOINT_IN,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for transfers (100 ms)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Observable state of an open handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open,
    Claimed(u8),
}

/// Configuration to activate: a raw value or a configuration descriptor
#[derive(Debug, Clone, Copy)]
pub enum ConfigSelector<'a> {
    Value(u8),
    Descriptor(&'a Configuration),
}

impl ConfigSelector<'_> {
    pub fn value(&self) -> u8 {
        match self {
            Self::Value(v) => *v,
            Self::Descriptor(c) => c.value,
        }
    }
}

impl From<u8> for ConfigSelector<'_> {
    fn from(value: u8) -> Self {
        Self::Value(value)
    }
}

impl<'a> From<&'a Configuration> for ConfigSelector<'a> {
    fn from(config: &'a Configuration) -> Self {
        Self::Descriptor(config)
    }
}

impl TryFrom<&Value> for ConfigSelector<'static> {
    type Error = UsbError;

    fn try_from(value: &Value) -> Result<Self> {
        value_to_u8(value, "configuration").map(Self::Value)
    }
}

/// Interface to claim: a raw number or an interface descriptor
#[derive(Debug, Clone, Copy)]
pub enum InterfaceSelector<'a> {
    Number(u8),
    Descriptor(&'a Interface),
}

impl InterfaceSelector<'_> {
    pub fn number(&self) -> u8 {
        match self {
            Self::Number(n) => *n,
            Self::Descriptor(i) => i.interface_number,
        }
    }
}

impl From<u8> for InterfaceSelector<'_> {
    fn from(number: u8) -> Self {
        Self::Number(number)
    }
}

impl<'a> From<&'a Interface> for InterfaceSelector<'a> {
    fn from(interface: &'a Interface) -> Self {
        Self::Descriptor(interface)
    }
}

impl TryFrom<&Value> for InterfaceSelector<'static> {
    type Error = UsbError;

    fn try_from(value: &Value) -> Result<Self> {
        value_to_u8(value, "interface").map(Self::Number)
    }
}

/// Alternate setting to select
///
/// A raw setting applies to the claimed interface; a descriptor carries its
/// own interface number.
#[derive(Debug, Clone, Copy)]
pub enum AltSelector<'a> {
    Setting(u8),
    Descriptor(&'a Interface),
}

impl From<u8> for AltSelector<'_> {
    fn from(setting: u8) -> Self {
        Self::Setting(setting)
    }
}

impl<'a> From<&'a Interface> for AltSelector<'a> {
    fn from(interface: &'a Interface) -> Self {
        Self::Descriptor(interface)
    }
}

impl TryFrom<&Value> for AltSelector<'static> {
    type Error = UsbError;

    fn try_from(value: &Value) -> Result<Self> {
        value_to_u8(value, "alternate setting").map(Self::Setting)
    }
}

/// Endpoint to bind: an address on the device or an endpoint descriptor
#[derive(Debug, Clone, Copy)]
pub enum EndpointSelector<'a> {
    Address(u8),
    Descriptor(&'a EndpointDescriptor),
}

impl From<u8> for EndpointSelector<'_> {
    fn from(address: u8) -> Self {
        Self::Address(address)
    }
}

impl<'a> From<&'a EndpointDescriptor> for EndpointSelector<'a> {
    fn from(endpoint: &'a EndpointDescriptor) -> Self {
        Self::Descriptor(endpoint)
    }
}

impl TryFrom<&Value> for EndpointSelector<'static> {
    type Error = UsbError;

    fn try_from(value: &Value) -> Result<Self> {
        value_to_u8(value, "endpoint").map(Self::Address)
    }
}

fn value_to_u8(value: &Value, what: &str) -> Result<u8> {
    match value {
        Value::Int(n) => u8::try_from(*n)
            .map_err(|_| UsbError::invalid_argument(format!("{} {} out of range", what, n))),
        other => Err(UsbError::invalid_argument(format!(
            "expected {} number or descriptor, got {}",
            what,
            other.kind()
        ))),
    }
}

/// Setup packet fields of a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub timeout: Duration,
}

impl ControlRequest {
    /// Request with `value` and `index` of 0 and the default timeout
    pub fn new(request_type: u8, request: u8) -> Self {
        Self {
            request_type,
            request,
            value: 0,
            index: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_value(mut self, value: u16) -> Self {
        self.value = value;
        self
    }

    pub fn with_index(mut self, index: u16) -> Self {
        self.index = index;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Device-to-host request (bit 7 of bmRequestType set)
    pub fn is_in(&self) -> bool {
        self.request_type & ENDPOINT_IN != 0
    }
}

/// Open handle on a USB device
pub struct DeviceHandle {
    device: Arc<Device>,
    native: Box<dyn NativeHandle>,
    claimed: Option<u8>,
}

impl DeviceHandle {
    /// Open `device` through its native reference.
    ///
    /// The native error is returned unchanged if the open fails.
    pub fn open(device: &Arc<Device>) -> Result<Self> {
        let native = device.native().open().inspect_err(|e| {
            warn!("Failed to open device {}: {}", device, e);
        })?;

        debug!("Opened device {}", device);

        Ok(Self {
            device: Arc::clone(device),
            native,
            claimed: None,
        })
    }

    /// Descriptor snapshot of the opened device
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn state(&self) -> HandleState {
        match self.claimed {
            Some(interface) => HandleState::Claimed(interface),
            None => HandleState::Open,
        }
    }

    pub fn claimed_interface(&self) -> Option<u8> {
        self.claimed
    }

    /// Set the active configuration
    pub fn set_configuration<'a>(&mut self, config: impl Into<ConfigSelector<'a>>) -> Result<()> {
        let value = config.into().value();
        self.native.set_configuration(value)?;
        debug!("Set configuration {} on device {}", value, self.device);
        Ok(())
    }

    /// Claim an interface.
    ///
    /// Fails without calling the transport if another interface is still
    /// claimed; release it first.
    pub fn claim_interface<'a>(
        &mut self,
        interface: impl Into<InterfaceSelector<'a>>,
    ) -> Result<()> {
        let number = interface.into().number();
        if let Some(claimed) = self.claimed {
            return Err(UsbError::InterfaceAlreadyClaimed { claimed });
        }

        self.native.claim_interface(number)?;
        self.claimed = Some(number);
        debug!("Claimed interface {} on device {}", number, self.device);
        Ok(())
    }

    /// Release the claimed interface.
    ///
    /// If the transport refuses, the interface stays recorded as claimed.
    pub fn release_interface(&mut self) -> Result<()> {
        let interface = self.claimed.ok_or(UsbError::NoInterfaceClaimed)?;
        self.native.release_interface(interface)?;
        self.claimed = None;
        debug!("Released interface {} on device {}", interface, self.device);
        Ok(())
    }

    /// Select an alternate setting
    pub fn set_alt_interface<'a>(&mut self, alternate: impl Into<AltSelector<'a>>) -> Result<()> {
        let (interface, setting) = match alternate.into() {
            AltSelector::Descriptor(i) => (i.interface_number, i.alternate_setting),
            AltSelector::Setting(setting) => {
                (self.claimed.ok_or(UsbError::NoInterfaceClaimed)?, setting)
            }
        };

        self.native.set_alt_interface(interface, setting)?;
        debug!(
            "Set alternate setting {} of interface {} on device {}",
            setting, interface, self.device
        );
        Ok(())
    }

    /// Issue a control transfer with `data` as its buffer.
    ///
    /// `data` is coerced to bytes before anything is sent; a coercion
    /// failure issues no transfer. Returns the number of bytes transferred.
    pub fn control_msg(&mut self, request: &ControlRequest, data: &Value) -> Result<usize> {
        let mut buffer = data.to_bytes()?;
        self.control_transfer(request, &mut buffer)
    }

    /// Issue a device-to-host control transfer of up to `length` bytes and
    /// return the bytes read
    pub fn control_read(&mut self, request: &ControlRequest, length: usize) -> Result<Vec<u8>> {
        if !request.is_in() {
            return Err(UsbError::invalid_argument(format!(
                "request type {:#04x} is not device-to-host",
                request.request_type
            )));
        }

        let mut buffer = vec![0u8; length];
        let n = self.control_transfer(request, &mut buffer)?;
        buffer.truncate(n);
        Ok(buffer)
    }

    fn control_transfer(&mut self, request: &ControlRequest, buffer: &mut [u8]) -> Result<usize> {
        debug!(
            "Control transfer: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}, len={}",
            request.request_type,
            request.request,
            request.value,
            request.index,
            buffer.len()
        );

        let n = self
            .native
            .control_msg(
                request.request_type,
                request.request,
                request.value,
                request.index,
                buffer,
                request.timeout,
            )
            .inspect_err(|e| warn!("Control transfer failed: {}", e))?;

        debug!("Control transfer succeeded: {} bytes", n);
        Ok(n)
    }

    /// Bulk OUT transfer of `data` coerced to bytes
    pub fn bulk_write(&mut self, endpoint: u8, data: &Value, timeout: Duration) -> Result<usize> {
        let buffer = data.to_bytes()?;
        debug!(
            "Bulk write: endpoint={:#x}, data_len={}, timeout={}ms",
            endpoint,
            buffer.len(),
            timeout.as_millis()
        );
        self.native.bulk_write(endpoint, &buffer, timeout)
    }

    /// Bulk IN transfer of up to `length` bytes
    pub fn bulk_read(&mut self, endpoint: u8, length: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];
        let n = self.native.bulk_read(endpoint, &mut buffer, timeout)?;
        buffer.truncate(n);
        debug!("Bulk read: endpoint={:#x}, {} bytes", endpoint, n);
        Ok(buffer)
    }

    /// Interrupt OUT transfer of `data` coerced to bytes
    pub fn interrupt_write(
        &mut self,
        endpoint: u8,
        data: &Value,
        timeout: Duration,
    ) -> Result<usize> {
        let buffer = data.to_bytes()?;
        debug!(
            "Interrupt write: endpoint={:#x}, data_len={}, timeout={}ms",
            endpoint,
            buffer.len(),
            timeout.as_millis()
        );
        self.native.interrupt_write(endpoint, &buffer, timeout)
    }

    /// Interrupt IN transfer of up to `length` bytes
    pub fn interrupt_read(
        &mut self,
        endpoint: u8,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];
        let n = self.native.interrupt_read(endpoint, &mut buffer, timeout)?;
        buffer.truncate(n);
        debug!("Interrupt read: endpoint={:#x}, {} bytes", endpoint, n);
        Ok(buffer)
    }

    /// Resolve an endpoint descriptor on this handle's device.
    ///
    /// Addresses are looked up across all configurations in tree order.
    pub fn find_endpoint<'a>(
        &self,
        endpoint: impl Into<EndpointSelector<'a>>,
    ) -> Result<EndpointDescriptor> {
        match endpoint.into() {
            EndpointSelector::Descriptor(ep) => Ok(*ep),
            EndpointSelector::Address(address) => self
                .device
                .endpoints()
                .find(|ep| ep.address == address)
                .copied()
                .ok_or_else(|| {
                    UsbError::invalid_argument(format!(
                        "device {} has no endpoint {:#04x}",
                        self.device.filename, address
                    ))
                }),
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("device", &self.device.filename)
            .field("claimed", &self.claimed)
            .finish()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Some(interface) = self.claimed.take() {
            match self.native.release_interface(interface) {
                Ok(()) => debug!(
                    "Released interface {} on device {} during teardown",
                    interface, self.device
                ),
                Err(e) => warn!(
                    "Failed to release interface {} on device {}: {}",
                    interface, self.device, e
                ),
            }
        }

        match self.native.close() {
            Ok(()) => debug!("Closed device {}", self.device),
            Err(e) => warn!("Failed to close device {}: {}", self.device, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_request_defaults() {
        let request = ControlRequest::new(0x80, 6);
        assert_eq!(request.value, 0);
        assert_eq!(request.index, 0);
        assert_eq!(request.timeout, Duration::from_millis(100));
        assert!(request.is_in());

        let request = ControlRequest::new(0x40, 1)
            .with_value(0x0100)
            .with_index(2)
            .with_timeout(Duration::from_secs(1));
        assert_eq!(request.value, 0x0100);
        assert_eq!(request.index, 2);
        assert!(!request.is_in());
    }

    #[test]
    fn test_selectors_from_values() {
        let selector = ConfigSelector::try_from(&Value::Int(1)).unwrap();
        assert_eq!(selector.value(), 1);

        let selector = InterfaceSelector::try_from(&Value::Int(3)).unwrap();
        assert_eq!(selector.number(), 3);

        assert!(matches!(
            ConfigSelector::try_from(&Value::from("1")),
            Err(UsbError::InvalidArgument { .. })
        ));
        assert!(matches!(
            InterfaceSelector::try_from(&Value::Int(256)),
            Err(UsbError::InvalidArgument { .. })
        ));
        assert!(matches!(
            AltSelector::try_from(&Value::Null),
            Err(UsbError::InvalidArgument { .. })
        ));
        assert!(EndpointSelector::try_from(&Value::Int(0x81)).is_ok());
    }

    #[test]
    fn test_selectors_from_descriptors() {
        let interface = Interface {
            interface_number: 2,
            alternate_setting: 1,
            interface_class: 3,
            interface_sub_class: 0,
            interface_protocol: 0,
            interface_index: 0,
            num_endpoints: 0,
            endpoints: Vec::new(),
        };
        assert_eq!(InterfaceSelector::from(&interface).number(), 2);

        let config = Configuration {
            total_length: 9,
            value: 4,
            configuration_index: 0,
            self_powered: false,
            remote_wakeup: false,
            max_power: 100,
            num_interfaces: 0,
            interfaces: Vec::new(),
        };
        assert_eq!(ConfigSelector::from(&config).value(), 4);
    }
}
