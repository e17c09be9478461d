//! Descriptor tree builder
//!
//! Converts the native bus list into the [`Bus`] tree. Children are laid
//! out in native order with capacity taken from the declared descriptor
//! counts; a node whose declared count disagrees with the children actually
//! read is a build failure, and a failure anywhere fails the whole build.

use crate::error::{Result, UsbError};
use crate::native::{
    NativeBus, NativeConfigDescriptor, NativeDeviceRecord, NativeEndpointDescriptor,
    NativeInterface, NativeInterfaceDescriptor,
};
use crate::types::{Bus, Configuration, Device, EndpointDescriptor, Interface, bcd_version};
use std::sync::Arc;
use tracing::debug;

/// Build the descriptor tree for every native bus, in native order
pub fn build_busses(native: &[NativeBus]) -> Result<Vec<Arc<Bus>>> {
    let mut busses = Vec::with_capacity(native.len());
    for bus in native {
        busses.push(Arc::new(build_bus(bus)?));
    }
    Ok(busses)
}

fn build_bus(bus: &NativeBus) -> Result<Bus> {
    let mut devices = Vec::with_capacity(bus.devices.len());
    for record in &bus.devices {
        let device =
            build_device(record).map_err(|e| within(e, &format!("bus {}", bus.dirname)))?;
        devices.push(Arc::new(device));
    }

    debug!(
        "Built bus {} (location {}) with {} devices",
        bus.dirname,
        bus.location,
        devices.len()
    );

    Ok(Bus {
        dirname: bus.dirname.clone(),
        location: bus.location,
        devices,
    })
}

fn build_device(record: &NativeDeviceRecord) -> Result<Device> {
    let desc = &record.descriptor;
    check_count(
        "configurations",
        desc.num_configurations as usize,
        record.configs.len(),
    )
    .map_err(|e| within(e, &format!("device {}", record.filename)))?;

    let mut configurations = Vec::with_capacity(desc.num_configurations as usize);
    for config in &record.configs {
        let configuration = build_configuration(config).map_err(|e| {
            within(
                e,
                &format!(
                    "device {} configuration {}",
                    record.filename, config.configuration_value
                ),
            )
        })?;
        configurations.push(configuration);
    }

    debug!(
        "Built device {} {:04x}:{:04x} with {} configurations",
        record.filename,
        desc.id_vendor,
        desc.id_product,
        configurations.len()
    );

    Ok(Device {
        usb_version: bcd_version(desc.bcd_usb),
        device_class: desc.device_class,
        device_sub_class: desc.device_sub_class,
        device_protocol: desc.device_protocol,
        max_packet_size: desc.max_packet_size0,
        vendor_id: desc.id_vendor,
        product_id: desc.id_product,
        device_version: bcd_version(desc.bcd_device),
        manufacturer_index: desc.i_manufacturer,
        product_index: desc.i_product,
        serial_number_index: desc.i_serial_number,
        num_configurations: desc.num_configurations,
        filename: record.filename.clone(),
        configurations,
        native: Arc::clone(&record.device),
    })
}

fn build_configuration(config: &NativeConfigDescriptor) -> Result<Configuration> {
    check_count(
        "interfaces",
        config.num_interfaces as usize,
        config.interfaces.len(),
    )?;

    let mut interfaces = Vec::with_capacity(config.num_interfaces as usize);
    for (number, interface) in config.interfaces.iter().enumerate() {
        let alternates = build_alternates(interface)
            .map_err(|e| within(e, &format!("interface {}", number)))?;
        interfaces.push(alternates);
    }

    Ok(Configuration {
        total_length: config.total_length,
        value: config.configuration_value,
        configuration_index: config.i_configuration,
        self_powered: (config.attributes >> 6) & 1 == 1,
        remote_wakeup: (config.attributes >> 5) & 1 == 1,
        max_power: (config.max_power as u16) << 2,
        num_interfaces: config.num_interfaces,
        interfaces,
    })
}

fn build_alternates(interface: &NativeInterface) -> Result<Vec<Interface>> {
    check_count(
        "alternate settings",
        interface.num_altsetting as usize,
        interface.altsettings.len(),
    )?;

    let mut alternates = Vec::with_capacity(interface.num_altsetting as usize);
    for alt in &interface.altsettings {
        let built = build_interface(alt)
            .map_err(|e| within(e, &format!("alternate setting {}", alt.alternate_setting)))?;
        alternates.push(built);
    }
    Ok(alternates)
}

fn build_interface(desc: &NativeInterfaceDescriptor) -> Result<Interface> {
    check_count(
        "endpoints",
        desc.num_endpoints as usize,
        desc.endpoints.len(),
    )?;

    Ok(Interface {
        interface_number: desc.interface_number,
        alternate_setting: desc.alternate_setting,
        interface_class: desc.interface_class,
        interface_sub_class: desc.interface_sub_class,
        interface_protocol: desc.interface_protocol,
        interface_index: desc.i_interface,
        num_endpoints: desc.num_endpoints,
        endpoints: desc.endpoints.iter().map(build_endpoint).collect(),
    })
}

fn build_endpoint(desc: &NativeEndpointDescriptor) -> EndpointDescriptor {
    EndpointDescriptor {
        address: desc.endpoint_address,
        transfer_type: desc.attributes & 3,
        max_packet_size: desc.max_packet_size,
        interval: desc.interval,
        refresh: desc.refresh,
        synch_address: desc.synch_address,
    }
}

fn check_count(what: &str, declared: usize, found: usize) -> Result<()> {
    if declared != found {
        return Err(UsbError::build_failure(format!(
            "descriptor declares {} {}, found {}",
            declared, what, found
        )));
    }
    Ok(())
}

/// Prefix a build failure with the node it occurred in
fn within(err: UsbError, node: &str) -> UsbError {
    match err {
        UsbError::BuildFailure { context } => {
            UsbError::build_failure(format!("{}: {}", node, context))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{NativeDevice, NativeDeviceDescriptor, NativeHandle};

    #[derive(Debug)]
    struct Unopenable;

    impl NativeDevice for Unopenable {
        fn open(&self) -> Result<Box<dyn NativeHandle>> {
            Err(UsbError::transport("cannot open"))
        }
    }

    fn config(attributes: u8, max_power: u8) -> NativeConfigDescriptor {
        NativeConfigDescriptor {
            total_length: 9,
            num_interfaces: 0,
            configuration_value: 1,
            i_configuration: 0,
            attributes,
            max_power,
            interfaces: Vec::new(),
        }
    }

    fn record(configs: Vec<NativeConfigDescriptor>) -> NativeDeviceRecord {
        NativeDeviceRecord {
            filename: "002".to_string(),
            descriptor: NativeDeviceDescriptor {
                bcd_usb: 0x0200,
                bcd_device: 0x0110,
                num_configurations: configs.len() as u8,
                ..Default::default()
            },
            configs,
            device: Arc::new(Unopenable),
        }
    }

    #[test]
    fn test_configuration_field_mapping() {
        let built = build_configuration(&config(0b1110_0000, 50)).unwrap();
        assert_eq!(built.max_power, 200);
        assert!(built.self_powered);
        assert!(built.remote_wakeup);

        let built = build_configuration(&config(0b1000_0000, 0)).unwrap();
        assert!(!built.self_powered);
        assert!(!built.remote_wakeup);
    }

    #[test]
    fn test_device_versions() {
        let device = build_device(&record(vec![config(0x80, 50)])).unwrap();
        assert_eq!(device.usb_version, "02.00");
        assert_eq!(device.device_version, "01.10");
        assert_eq!(device.configurations.len(), 1);
    }

    #[test]
    fn test_endpoint_type_bits() {
        let ep = build_endpoint(&NativeEndpointDescriptor {
            endpoint_address: 0x81,
            attributes: 0x0d,
            max_packet_size: 64,
            interval: 1,
            refresh: 0,
            synch_address: 0x02,
        });
        assert_eq!(ep.transfer_type, 1);
        assert_eq!(ep.address, 0x81);
        assert_eq!(ep.synch_address, 0x02);
    }

    #[test]
    fn test_count_mismatch_fails_device() {
        let mut rec = record(vec![config(0x80, 50)]);
        rec.descriptor.num_configurations = 2;
        let err = build_device(&rec).unwrap_err();
        match err {
            UsbError::BuildFailure { context } => {
                assert!(context.contains("device 002"));
                assert!(context.contains("2 configurations"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_failure_aborts_whole_build() {
        let mut bad = record(vec![config(0x80, 50)]);
        bad.configs[0].num_interfaces = 1;
        let busses = vec![
            NativeBus {
                dirname: "001".to_string(),
                location: 1,
                devices: vec![record(vec![])],
            },
            NativeBus {
                dirname: "002".to_string(),
                location: 2,
                devices: vec![bad],
            },
        ];
        assert!(matches!(
            build_busses(&busses),
            Err(UsbError::BuildFailure { .. })
        ));
    }
}
