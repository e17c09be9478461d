//! Test utilities for usbtree
//!
//! Provides a mock USB transport that serves a scripted bus list, records
//! every native call in order, and can be told to fail any native operation.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{MockCall, single_endpoint_backend};
//! use model::UsbBackend;
//!
//! let mut backend = single_endpoint_backend(0x81);
//! assert_eq!(backend.find_busses().unwrap(), 1);
//! assert_eq!(backend.calls(), vec![MockCall::FindBusses]);
//! ```

use model::{
    NativeBus, NativeConfigDescriptor, NativeDevice, NativeDeviceDescriptor, NativeDeviceRecord,
    NativeEndpointDescriptor, NativeHandle, NativeInterface, NativeInterfaceDescriptor, Result,
    UsbBackend, UsbError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Vendor ID used by the canned mock devices
pub const MOCK_VENDOR_ID: u16 = 0x0555;

/// Product ID used by the canned mock devices
pub const MOCK_PRODUCT_ID: u16 = 0x000c;

/// A native call as seen by the mock transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    FindBusses,
    FindDevices,
    Open {
        filename: String,
    },
    SetConfiguration(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    SetAltInterface {
        interface: u8,
        alternate: u8,
    },
    ControlMsg {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
        timeout_ms: u64,
    },
    BulkWrite {
        endpoint: u8,
        data: Vec<u8>,
    },
    BulkRead {
        endpoint: u8,
        length: usize,
    },
    InterruptWrite {
        endpoint: u8,
        data: Vec<u8>,
    },
    InterruptRead {
        endpoint: u8,
        length: usize,
    },
    Close,
}

/// Native operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    FindBusses,
    FindDevices,
    Open,
    SetConfiguration,
    ClaimInterface,
    ReleaseInterface,
    SetAltInterface,
    ControlMsg,
    Bulk,
    Interrupt,
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    failures: HashMap<MockOp, String>,
    read_data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct SharedState(Arc<Mutex<MockState>>);

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log `call`, then fail if `op` has been scripted to fail
    fn record(&self, op: MockOp, call: MockCall) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.failures.get(&op) {
            Some(message) => Err(UsbError::transport(message.clone())),
            None => Ok(()),
        }
    }

    /// Copy scripted read data into `buf`, returning the count copied
    fn fill(&self, buf: &mut [u8]) -> usize {
        let state = self.lock();
        let n = state.read_data.len().min(buf.len());
        buf[..n].copy_from_slice(&state.read_data[..n]);
        n
    }
}

/// Mock USB backend
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    busses: Vec<NativeBus>,
    state: SharedState,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bus holding `devices`
    pub fn with_bus(
        mut self,
        dirname: &str,
        location: u32,
        devices: Vec<NativeDeviceRecord>,
    ) -> Self {
        self.busses.push(NativeBus {
            dirname: dirname.to_string(),
            location,
            devices,
        });
        self
    }

    /// Create a device record wired to this backend's call log.
    ///
    /// `num_configurations` is set from `configs`.
    pub fn device(
        &self,
        filename: &str,
        mut descriptor: NativeDeviceDescriptor,
        configs: Vec<NativeConfigDescriptor>,
    ) -> NativeDeviceRecord {
        descriptor.num_configurations = configs.len() as u8;
        NativeDeviceRecord {
            filename: filename.to_string(),
            descriptor,
            configs,
            device: Arc::new(MockDevice {
                filename: filename.to_string(),
                state: self.state.clone(),
            }),
        }
    }

    /// Mutable access to the scripted bus list
    pub fn busses_mut(&mut self) -> &mut Vec<NativeBus> {
        &mut self.busses
    }

    /// Every native call so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make `op` fail with `message` until cleared
    pub fn fail(&self, op: MockOp, message: &str) {
        self.state.lock().failures.insert(op, message.to_string());
    }

    pub fn clear_failure(&self, op: MockOp) {
        self.state.lock().failures.remove(&op);
    }

    /// Bytes returned by device-to-host transfers
    pub fn set_read_data(&self, data: &[u8]) {
        self.state.lock().read_data = data.to_vec();
    }
}

impl UsbBackend for MockBackend {
    fn find_busses(&mut self) -> Result<usize> {
        self.state.record(MockOp::FindBusses, MockCall::FindBusses)?;
        Ok(self.busses.len())
    }

    fn find_devices(&mut self) -> Result<usize> {
        self.state.record(MockOp::FindDevices, MockCall::FindDevices)?;
        Ok(self.busses.iter().map(|b| b.devices.len()).sum())
    }

    fn busses(&self) -> Result<Vec<NativeBus>> {
        Ok(self.busses.clone())
    }
}

/// Mock native device reference
#[derive(Debug)]
pub struct MockDevice {
    filename: String,
    state: SharedState,
}

impl NativeDevice for MockDevice {
    fn open(&self) -> Result<Box<dyn NativeHandle>> {
        self.state.record(
            MockOp::Open,
            MockCall::Open {
                filename: self.filename.clone(),
            },
        )?;
        Ok(Box::new(MockHandle {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

/// Mock native handle
#[derive(Debug)]
pub struct MockHandle {
    state: SharedState,
    closed: bool,
}

impl MockHandle {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(UsbError::transport("mock handle is closed"));
        }
        Ok(())
    }
}

impl NativeHandle for MockHandle {
    fn set_configuration(&mut self, value: u8) -> Result<()> {
        self.ensure_open()?;
        self.state
            .record(MockOp::SetConfiguration, MockCall::SetConfiguration(value))
    }

    fn claim_interface(&mut self, interface: u8) -> Result<()> {
        self.ensure_open()?;
        self.state
            .record(MockOp::ClaimInterface, MockCall::ClaimInterface(interface))
    }

    fn release_interface(&mut self, interface: u8) -> Result<()> {
        self.ensure_open()?;
        self.state
            .record(MockOp::ReleaseInterface, MockCall::ReleaseInterface(interface))
    }

    fn set_alt_interface(&mut self, interface: u8, alternate: u8) -> Result<()> {
        self.ensure_open()?;
        self.state.record(
            MockOp::SetAltInterface,
            MockCall::SetAltInterface {
                interface,
                alternate,
            },
        )
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
        self.ensure_open()?;
        self.state.record(
            MockOp::ControlMsg,
            MockCall::ControlMsg {
                request_type,
                request,
                value,
                index,
                data: buf.to_vec(),
                timeout_ms: timeout.as_millis() as u64,
            },
        )?;
        if request_type & model::constants::ENDPOINT_IN != 0 {
            Ok(self.state.fill(buf))
        } else {
            Ok(buf.len())
        }
    }

    fn bulk_write(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.ensure_open()?;
        self.state.record(
            MockOp::Bulk,
            MockCall::BulkWrite {
                endpoint,
                data: data.to_vec(),
            },
        )?;
        Ok(data.len())
    }

    fn bulk_read(&mut self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        self.ensure_open()?;
        self.state.record(
            MockOp::Bulk,
            MockCall::BulkRead {
                endpoint,
                length: buf.len(),
            },
        )?;
        Ok(self.state.fill(buf))
    }

    fn interrupt_write(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.ensure_open()?;
        self.state.record(
            MockOp::Interrupt,
            MockCall::InterruptWrite {
                endpoint,
                data: data.to_vec(),
            },
        )?;
        Ok(data.len())
    }

    fn interrupt_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize> {
        self.ensure_open()?;
        self.state.record(
            MockOp::Interrupt,
            MockCall::InterruptRead {
                endpoint,
                length: buf.len(),
            },
        )?;
        Ok(self.state.fill(buf))
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.state.record(MockOp::Close, MockCall::Close)
    }
}

/// Raw endpoint descriptor
pub fn endpoint_descriptor(
    address: u8,
    attributes: u8,
    max_packet_size: u16,
) -> NativeEndpointDescriptor {
    NativeEndpointDescriptor {
        endpoint_address: address,
        attributes,
        max_packet_size,
        interval: 10,
        refresh: 0,
        synch_address: 0,
    }
}

/// Raw interface descriptor; `num_endpoints` is set from `endpoints`
pub fn interface_descriptor(
    number: u8,
    alternate: u8,
    endpoints: Vec<NativeEndpointDescriptor>,
) -> NativeInterfaceDescriptor {
    NativeInterfaceDescriptor {
        interface_number: number,
        alternate_setting: alternate,
        num_endpoints: endpoints.len() as u8,
        interface_class: 0xff,
        interface_sub_class: 0,
        interface_protocol: 0,
        i_interface: 0,
        endpoints,
    }
}

/// Raw configuration descriptor; interface and alternate setting counts
/// are set from `interfaces`
pub fn config_descriptor(
    value: u8,
    interfaces: Vec<Vec<NativeInterfaceDescriptor>>,
) -> NativeConfigDescriptor {
    let total_length = 9 + interfaces
        .iter()
        .flatten()
        .map(|alt| 9 + 7 * alt.endpoints.len() as u16)
        .sum::<u16>();

    NativeConfigDescriptor {
        total_length,
        num_interfaces: interfaces.len() as u8,
        configuration_value: value,
        i_configuration: 0,
        attributes: 0x80,
        max_power: 50,
        interfaces: interfaces
            .into_iter()
            .map(|altsettings| NativeInterface {
                num_altsetting: altsettings.len() as u8,
                altsettings,
            })
            .collect(),
    }
}

/// Raw device descriptor for a USB 2.0 device
pub fn device_descriptor(vendor_id: u16, product_id: u16) -> NativeDeviceDescriptor {
    NativeDeviceDescriptor {
        bcd_usb: 0x0200,
        device_class: 0,
        device_sub_class: 0,
        device_protocol: 0,
        max_packet_size0: 64,
        id_vendor: vendor_id,
        id_product: product_id,
        bcd_device: 0x0100,
        i_manufacturer: 1,
        i_product: 2,
        i_serial_number: 3,
        num_configurations: 0,
    }
}

/// One bus, one device, one configuration, one interface, one bulk endpoint
pub fn single_endpoint_backend(endpoint_address: u8) -> MockBackend {
    let backend = MockBackend::new();
    let config = config_descriptor(
        1,
        vec![vec![interface_descriptor(
            0,
            0,
            vec![endpoint_descriptor(endpoint_address, 0x02, 64)],
        )]],
    );
    let device = backend.device(
        "002",
        device_descriptor(MOCK_VENDOR_ID, MOCK_PRODUCT_ID),
        vec![config],
    );
    backend.with_bus("001", 1, vec![device])
}

/// Two busses; the first holds two devices, the second one device with two
/// configurations and an interface with two alternate settings
pub fn multi_bus_backend() -> MockBackend {
    let backend = MockBackend::new();

    let simple = |ep: u8| {
        config_descriptor(
            1,
            vec![vec![interface_descriptor(0, 0, vec![endpoint_descriptor(ep, 0x03, 8)])]],
        )
    };
    let first = backend.device("002", device_descriptor(0x1111, 0x0001), vec![simple(0x81)]);
    let second = backend.device("003", device_descriptor(0x2222, 0x0002), vec![simple(0x82)]);

    let alternates = vec![
        interface_descriptor(0, 0, vec![]),
        interface_descriptor(
            0,
            1,
            vec![
                endpoint_descriptor(0x81, 0x01, 512),
                endpoint_descriptor(0x02, 0x01, 512),
            ],
        ),
    ];
    let third = backend.device(
        "005",
        device_descriptor(0x3333, 0x0003),
        vec![
            config_descriptor(1, vec![alternates]),
            config_descriptor(
                2,
                vec![
                    vec![interface_descriptor(0, 0, vec![endpoint_descriptor(0x83, 0x02, 64)])],
                    vec![interface_descriptor(1, 0, vec![])],
                ],
            ),
        ],
    );

    backend
        .with_bus("001", 1, vec![first, second])
        .with_bus("002", 2, vec![third])
}
