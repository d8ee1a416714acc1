use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use btbridge::backend::{DiscoveryResult, PortCloseError, StackBackend, StackEvents, StackFailure};
use btbridge::{
    BdAddr, ConnectionHandle, DeviceClass, InquiryAccessCode, LocalVersionInfo, SecurityOptions, ServiceRecord, Stack,
    StackConfig, Uuid,
};
use parking_lot::Mutex;
use tracing::{info, metadata::LevelFilter};

/// A stack with a handful of devices in range. It answers inquiries and nothing else.
#[derive(Default)]
struct SimulatedStack {
    events: Arc<Mutex<Option<Arc<dyn StackEvents>>>>,
}

const DEVICES: [([u8; 6], u32, &str); 3] = [
    ([0x00, 0x1a, 0x7d, 0xda, 0x71, 0x13], 0x5a020c, "Phone"),
    ([0x00, 0x1b, 0xdc, 0x05, 0x6e, 0x21], 0x240404, "Headset"),
    ([0x00, 0x12, 0x6f, 0x00, 0x42, 0x77], 0x001f00, "GPS receiver"),
];

impl StackBackend for SimulatedStack {
    fn register(&self, events: Arc<dyn StackEvents>) -> Result<(), StackFailure> {
        *self.events.lock() = Some(events);
        Ok(())
    }

    fn unregister(&self) {
        self.events.lock().take();
    }

    fn extended_error(&self) -> Option<String> {
        None
    }

    fn local_version_info(&self) -> Result<LocalVersionInfo, StackFailure> {
        Ok(LocalVersionInfo {
            address: BdAddr([0x00, 0x10, 0x60, 0xaa, 0xbb, 0xcc]),
            hci_version: 3,
            hci_revision: 0,
            lmp_version: 3,
            lmp_sub_version: 0,
            manufacturer: 10,
        })
    }

    fn local_name(&self) -> Result<String, StackFailure> {
        Ok(String::from("simulated"))
    }

    fn is_device_ready(&self) -> bool {
        true
    }

    fn is_server_up(&self) -> bool {
        true
    }

    fn version(&self) -> Option<String> {
        None
    }

    fn start_inquiry(&self, _access_code: InquiryAccessCode) -> Result<(), StackFailure> {
        let events = self.events.clone();
        thread::spawn(move || {
            for (address, class, name) in DEVICES {
                thread::sleep(Duration::from_millis(300));
                if let Some(events) = &*events.lock() {
                    events.on_device_found(BdAddr(address), DeviceClass::from_bits(class), name.as_bytes());
                }
            }
            if let Some(events) = &*events.lock() {
                events.on_inquiry_complete(true, DEVICES.len() as u16);
            }
        });
        Ok(())
    }

    fn stop_inquiry(&self) {}

    fn start_discovery(&self, _address: BdAddr, _filter: Option<Uuid>) -> Result<(), StackFailure> {
        Err(StackFailure)
    }

    fn last_discovery_result(&self, _address: BdAddr) -> (DiscoveryResult, u16) {
        (DiscoveryResult::ConnectError, 0)
    }

    fn read_discovery_records(&self, _address: BdAddr, _max: usize, _filter: Option<Uuid>) -> Vec<ServiceRecord> {
        Vec::new()
    }

    fn assign_scn(&self, _service: Uuid, _channel: u8) -> Result<(), StackFailure> {
        Err(StackFailure)
    }

    fn set_security_level(&self, _service_name: &str, _security: SecurityOptions) -> Result<(), StackFailure> {
        Err(StackFailure)
    }

    fn open_client(&self, _port: ConnectionHandle, _channel: u8, _address: BdAddr) -> Result<(), StackFailure> {
        Err(StackFailure)
    }

    fn write(&self, _port: ConnectionHandle, _data: &[u8]) -> Result<usize, StackFailure> {
        Err(StackFailure)
    }

    fn close(&self, _port: ConnectionHandle) -> Result<(), PortCloseError> {
        Err(PortCloseError::NotOpened)
    }

    fn connected_address(&self, _port: ConnectionHandle) -> Option<BdAddr> {
        None
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let stack = Stack::initialize(SimulatedStack::default(), StackConfig::default())?;
    info!(address = %stack.local_address()?, name = %stack.local_name()?, "stack ready");

    info!("starting inquiry");
    let mut inquiry = stack.start_inquiry(InquiryAccessCode::General)?;
    for device in inquiry.by_ref() {
        let device = device?;
        info!(
            "{} {:?} major class {:#04x}",
            device.address,
            device.name,
            device.class.major_device_class()
        );
    }
    info!(outcome = ?inquiry.outcome(), "inquiry finished");

    stack.teardown();
    Ok(())
}
