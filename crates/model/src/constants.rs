//! USB constants
//!
//! Values from the USB 1.1/2.0 specification as exposed by libusb-0.1.
//! Each constant is also listed in [`CONSTANTS`] so a scripting host can
//! install the whole table by name.

macro_rules! usb_constants {
    ($($(#[$meta:meta])* $name:ident: $ty:ty = $value:expr;)*) => {
        $(
            $(#[$meta])*
            pub const $name: $ty = $value;
        )*

        /// Every constant, by name, in table order
        pub const CONSTANTS: &[(&str, i64)] = &[
            $((stringify!($name), $name as i64),)*
        ];
    };
}

usb_constants! {
    // Device and interface classes
    CLASS_PER_INTERFACE: u8 = 0;
    CLASS_AUDIO: u8 = 1;
    CLASS_COMM: u8 = 2;
    CLASS_HID: u8 = 3;
    CLASS_PRINTER: u8 = 7;
    CLASS_MASS_STORAGE: u8 = 8;
    CLASS_HUB: u8 = 9;
    CLASS_DATA: u8 = 10;
    CLASS_VENDOR_SPEC: u8 = 0xff;

    // Descriptor types
    DT_DEVICE: u8 = 0x01;
    DT_CONFIG: u8 = 0x02;
    DT_STRING: u8 = 0x03;
    DT_INTERFACE: u8 = 0x04;
    DT_ENDPOINT: u8 = 0x05;
    DT_HID: u8 = 0x21;
    DT_REPORT: u8 = 0x22;
    DT_PHYSICAL: u8 = 0x23;
    DT_HUB: u8 = 0x29;

    // Descriptor sizes
    DT_DEVICE_SIZE: u8 = 18;
    DT_CONFIG_SIZE: u8 = 9;
    DT_INTERFACE_SIZE: u8 = 9;
    DT_ENDPOINT_SIZE: u8 = 7;
    /// Audio extension
    DT_ENDPOINT_AUDIO_SIZE: u8 = 9;
    DT_HUB_NONVAR_SIZE: u8 = 7;

    // Endpoints
    MAXENDPOINTS: u8 = 32;
    ENDPOINT_ADDRESS_MASK: u8 = 0x0f;
    ENDPOINT_DIR_MASK: u8 = 0x80;
    ENDPOINT_TYPE_MASK: u8 = 0x03;
    ENDPOINT_TYPE_CONTROL: u8 = 0;
    ENDPOINT_TYPE_ISOCHRONOUS: u8 = 1;
    ENDPOINT_TYPE_BULK: u8 = 2;
    ENDPOINT_TYPE_INTERRUPT: u8 = 3;

    // Interfaces and configurations
    MAXINTERFACES: u8 = 32;
    MAXALTSETTING: u8 = 128;
    MAXCONFIG: u8 = 8;

    // Standard requests
    REQ_GET_STATUS: u8 = 0x00;
    REQ_CLEAR_FEATURE: u8 = 0x01;
    REQ_SET_FEATURE: u8 = 0x03;
    REQ_SET_ADDRESS: u8 = 0x05;
    REQ_GET_DESCRIPTOR: u8 = 0x06;
    REQ_SET_DESCRIPTOR: u8 = 0x07;
    REQ_GET_CONFIGURATION: u8 = 0x08;
    REQ_SET_CONFIGURATION: u8 = 0x09;
    REQ_GET_INTERFACE: u8 = 0x0a;
    REQ_SET_INTERFACE: u8 = 0x0b;
    REQ_SYNCH_FRAME: u8 = 0x0c;

    // Request type bits
    TYPE_STANDARD: u8 = 0x00 << 5;
    TYPE_CLASS: u8 = 0x01 << 5;
    TYPE_VENDOR: u8 = 0x02 << 5;
    TYPE_RESERVED: u8 = 0x03 << 5;

    RECIP_DEVICE: u8 = 0x00;
    RECIP_INTERFACE: u8 = 0x01;
    RECIP_ENDPOINT: u8 = 0x02;
    RECIP_OTHER: u8 = 0x03;

    ENDPOINT_IN: u8 = 0x80;
    ENDPOINT_OUT: u8 = 0x00;

    /// First libusb-0.1 error code
    ERROR_BEGIN: i32 = 500000;
}

/// Look up a constant by name
pub fn lookup(name: &str) -> Option<i64> {
    CONSTANTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, value)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_values() {
        assert_eq!(lookup("CLASS_HID"), Some(3));
        assert_eq!(lookup("CLASS_VENDOR_SPEC"), Some(0xff));
        assert_eq!(lookup("DT_HUB"), Some(0x29));
        assert_eq!(lookup("TYPE_VENDOR"), Some(0x40));
        assert_eq!(lookup("REQ_SYNCH_FRAME"), Some(0x0c));
        assert_eq!(lookup("ENDPOINT_IN"), Some(0x80));
        assert_eq!(lookup("ERROR_BEGIN"), Some(500000));
        assert_eq!(lookup("NOT_A_CONSTANT"), None);
    }

    #[test]
    fn test_table_names_unique() {
        for (i, (name, _)) in CONSTANTS.iter().enumerate() {
            assert!(
                CONSTANTS[i + 1..].iter().all(|(other, _)| other != name),
                "duplicate constant {}",
                name
            );
        }
        assert_eq!(CONSTANTS.len(), 57);
    }
}
