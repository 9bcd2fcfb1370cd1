//! Native USB bulk pipe backed by `rusb`.
//!
//! Opens the first reader exposing a CCID interface without going through
//! a PC/SC daemon. On composite devices every other interface is claimed
//! as well, so no host driver touches the chip while the card is in use.

use std::fmt;
use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};

use super::descriptor::{CcidDescriptor, is_ccid_interface};
use super::pipe::BulkPipe;
use crate::error::{Error, Result};
use crate::logging::DebugLog;

/// A CCID reader visible on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderInfo {
    /// USB vendor ID.
    pub vendor_id: u16,

    /// USB product ID.
    pub product_id: u16,

    /// Bus number.
    pub bus: u8,

    /// Device address on the bus.
    pub address: u8,

    /// CCID interface number.
    pub interface: u8,
}

impl fmt::Display for ReaderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (bus {} address {}, interface {})",
            self.vendor_id, self.product_id, self.bus, self.address, self.interface
        )
    }
}

/// A located CCID interface.
struct CcidInterface {
    number: u8,
    endpoint_in: u8,
    endpoint_out: u8,
    descriptor: Option<CcidDescriptor>,
}

fn find_ccid_interface<T: UsbContext>(device: &Device<T>) -> Option<CcidInterface> {
    let config = device.active_config_descriptor().ok()?;

    for interface in config.interfaces() {
        for desc in interface.descriptors() {
            if !is_ccid_interface(desc.class_code(), desc.protocol_code()) {
                continue;
            }

            let mut endpoint_in = None;
            let mut endpoint_out = None;
            for endpoint in desc.endpoint_descriptors() {
                if endpoint.transfer_type() == TransferType::Bulk {
                    match endpoint.direction() {
                        Direction::In => endpoint_in = Some(endpoint.address()),
                        Direction::Out => endpoint_out = Some(endpoint.address()),
                    }
                }
            }

            if let (Some(endpoint_in), Some(endpoint_out)) = (endpoint_in, endpoint_out) {
                return Some(CcidInterface {
                    number: desc.interface_number(),
                    endpoint_in,
                    endpoint_out,
                    descriptor: CcidDescriptor::parse(desc.extra()),
                });
            }
        }
    }
    None
}

fn usb_error(context: &str) -> impl Fn(rusb::Error) -> Error + '_ {
    move |e| Error::ConnectionFailed(format!("{context}: {e}"))
}

/// Claims `number`, detaching a kernel driver first where the OS has one bound.
fn claim<T: UsbContext>(handle: &DeviceHandle<T>, number: u8) -> rusb::Result<()> {
    #[cfg(target_os = "linux")]
    if handle.kernel_driver_active(number).unwrap_or(false) {
        handle.detach_kernel_driver(number)?;
    }
    handle.claim_interface(number)
}

/// Bulk endpoints of a claimed CCID interface.
pub struct RusbPipe {
    handle: DeviceHandle<Context>,
    endpoint_in: u8,
    endpoint_out: u8,
    interface_number: u8,
    claimed: Vec<u8>,
    descriptor: Option<CcidDescriptor>,
}

impl fmt::Debug for RusbPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RusbPipe")
            .field("endpoint_in", &format_args!("{:#04x}", self.endpoint_in))
            .field("endpoint_out", &format_args!("{:#04x}", self.endpoint_out))
            .field("interface_number", &self.interface_number)
            .field("claimed", &self.claimed)
            .finish_non_exhaustive()
    }
}

impl RusbPipe {
    /// Lists every device exposing a CCID interface.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFailed`] if the bus cannot be enumerated.
    pub fn list_readers() -> Result<Vec<ReaderInfo>> {
        let context = Context::new().map_err(usb_error("failed to create USB context"))?;
        let devices = context
            .devices()
            .map_err(usb_error("failed to enumerate USB devices"))?;

        Ok(devices
            .iter()
            .filter_map(|device| {
                let desc = device.device_descriptor().ok()?;
                let interface = find_ccid_interface(&device)?;
                Some(ReaderInfo {
                    vendor_id: desc.vendor_id(),
                    product_id: desc.product_id(),
                    bus: device.bus_number(),
                    address: device.address(),
                    interface: interface.number,
                })
            })
            .collect())
    }

    /// Opens the first CCID reader on the bus.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] if no device exposes a CCID interface
    /// - [`Error::ConnectionFailed`] if opening or claiming fails
    pub fn open_first(log: DebugLog) -> Result<Self> {
        let context = Context::new().map_err(usb_error("failed to create USB context"))?;
        let devices = context
            .devices()
            .map_err(usb_error("failed to enumerate USB devices"))?;

        for device in devices.iter() {
            let Some(interface) = find_ccid_interface(&device) else {
                continue;
            };
            if let Ok(desc) = device.device_descriptor() {
                log.debug(format_args!(
                    "CCID reader {:04x}:{:04x}, interface {} IN={:#04x} OUT={:#04x}",
                    desc.vendor_id(),
                    desc.product_id(),
                    interface.number,
                    interface.endpoint_in,
                    interface.endpoint_out
                ));
            }
            return Self::open(&device, interface, log);
        }

        Err(Error::DeviceNotFound)
    }

    fn open(device: &Device<Context>, interface: CcidInterface, log: DebugLog) -> Result<Self> {
        let handle = device
            .open()
            .map_err(usb_error("failed to open USB device"))?;

        claim(&handle, interface.number).map_err(usb_error("failed to claim CCID interface"))?;
        let mut claimed = vec![interface.number];

        // Claim the other interfaces of composite devices; failure here is not fatal.
        if let Ok(config) = device.active_config_descriptor() {
            for other in config.interfaces() {
                let number = other.number();
                if number == interface.number {
                    continue;
                }
                match claim(&handle, number) {
                    Ok(()) => {
                        log.debug(format_args!("claimed interface {number} to isolate the reader"));
                        claimed.push(number);
                    }
                    Err(e) => log.debug(format_args!("could not claim interface {number}: {e}")),
                }
            }
        }

        if let Some(desc) = interface.descriptor {
            log.debug(format_args!(
                "dwFeatures={:#010x} ({} exchange), dwMaxCCIDMessageLength={}",
                desc.features,
                desc.exchange_level(),
                desc.max_message_length
            ));
        }

        Ok(Self {
            handle,
            endpoint_in: interface.endpoint_in,
            endpoint_out: interface.endpoint_out,
            interface_number: interface.number,
            claimed,
            descriptor: interface.descriptor,
        })
    }

    /// Returns the CCID interface number.
    #[must_use]
    pub const fn interface_number(&self) -> u8 {
        self.interface_number
    }

    /// Returns the parsed CCID class descriptor, if the device has one.
    #[must_use]
    pub const fn descriptor(&self) -> Option<&CcidDescriptor> {
        self.descriptor.as_ref()
    }
}

impl BulkPipe for RusbPipe {
    fn write_bulk(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        self.handle
            .write_bulk(self.endpoint_out, data, timeout)
            .map_err(|e| Error::Io(format!("bulk OUT failed: {e}")))
    }

    fn read_bulk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match self.handle.read_bulk(self.endpoint_in, buf, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(e) => Err(Error::Io(format!("bulk IN failed: {e}"))),
        }
    }
}

impl Drop for RusbPipe {
    fn drop(&mut self) {
        for &number in self.claimed.iter().rev() {
            let _ = self.handle.release_interface(number);
        }
    }
}
