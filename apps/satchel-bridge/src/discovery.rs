use serialport::{SerialPortInfo, SerialPortType};
use tracing::warn;

/// Manufacturer substrings that mark a port as interesting.
const KNOWN_VENDORS: &[&str] = &["arduino"];

/// A serial device candidate as reported by the OS enumeration.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub address: String,
    pub manufacturer: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl DeviceDescriptor {
    fn from_port(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                address: info.port_name,
                manufacturer: usb.manufacturer,
                vendor_id: Some(usb.vid),
                product_id: Some(usb.pid),
            },
            _ => Self {
                address: info.port_name,
                manufacturer: None,
                vendor_id: None,
                product_id: None,
            },
        }
    }

    /// A descriptor qualifies when its manufacturer string contains a known
    /// vendor name (case-insensitively), or when it carries both a vendor and
    /// a product id. Best effort: a matching descriptor is not guaranteed to
    /// be the intended device.
    pub fn qualifies(&self) -> bool {
        if let Some(manufacturer) = &self.manufacturer {
            let lowered = manufacturer.to_lowercase();
            if KNOWN_VENDORS.iter().any(|vendor| lowered.contains(vendor)) {
                return true;
            }
        }
        self.vendor_id.is_some() && self.product_id.is_some()
    }
}

/// Enumerates attached serial devices and keeps the qualifying ones.
///
/// Enumeration failure is logged and yields an empty list; discovery never
/// fails the caller.
pub fn list_candidates() -> Vec<DeviceDescriptor> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(err) => {
            warn!(error = %err, "serial port enumeration failed");
            return Vec::new();
        }
    };
    ports
        .into_iter()
        .map(DeviceDescriptor::from_port)
        .filter(DeviceDescriptor::qualifies)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(
        manufacturer: Option<&str>,
        vendor_id: Option<u16>,
        product_id: Option<u16>,
    ) -> DeviceDescriptor {
        DeviceDescriptor {
            address: "/dev/ttyACM0".to_string(),
            manufacturer: manufacturer.map(str::to_string),
            vendor_id,
            product_id,
        }
    }

    #[test]
    fn manufacturer_match_is_case_insensitive() {
        assert!(descriptor(Some("Arduino LLC"), None, None).qualifies());
        assert!(descriptor(Some("ARDUINO SRL"), None, None).qualifies());
    }

    #[test]
    fn usb_ids_qualify_without_manufacturer() {
        assert!(descriptor(None, Some(0x2341), Some(0x0043)).qualifies());
    }

    #[test]
    fn bare_descriptor_does_not_qualify() {
        assert!(!descriptor(None, None, None).qualifies());
        assert!(!descriptor(Some("FTDI"), None, None).qualifies());
        assert!(!descriptor(None, Some(0x2341), None).qualifies());
    }
}
