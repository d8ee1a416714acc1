//! The seam between the bridge and a native Bluetooth stack.
//!
//! A native stack is wrapped by implementing [`StackBackend`]. At [`Stack::initialize`][crate::Stack::initialize]
//! the bridge hands the backend an [`StackEvents`] sink, and the backend reports everything the native stack
//! signals asynchronously through it. Sink methods may be called from any thread, at any time, including from
//! inside a [`StackBackend`] call and after the stack has been torn down.

use std::sync::Arc;

use uuid::Uuid;

use crate::discovery::ServiceRecord;
use crate::registry::ConnectionHandle;
use crate::types::{BdAddr, DeviceClass, InquiryAccessCode, LocalVersionInfo, SecurityOptions};

/// A failed stack call.
///
/// The bridge asks [`StackBackend::extended_error`] for the reason after receiving this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackFailure;

/// Result of closing a stack port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortCloseError {
    /// The port was never opened or is already closed
    NotOpened,
    /// Any other failure
    Failed,
}

/// Connection state changes of a stack port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortEvent {
    /// The connection is established
    Connected,
    /// The connection attempt failed, or an established connection was lost
    ConnectError,
}

/// Outcome of the last service discovery, as reported by the stack
#[non_exhaustive]
#[derive(Debug, displaydoc::Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiscoveryResult {
    /// success
    Success,
    /// could not connect to the remote device
    ConnectError,
    /// the remote device rejected the connection
    ConnectRejected,
    /// a discovery is still in progress
    Searching,
    /// bad parameter
    BadParameter,
    /// the remote device returned a malformed record
    BadRecord,
    /// insufficient resources
    InsufficientResources,
    /// unknown result code {0}
    Other(u8),
}

/// Callbacks from the native stack into the bridge.
pub trait StackEvents: Send + Sync {
    /// A device responded to the running inquiry. `name` is the raw name buffer, possibly NUL terminated.
    fn on_device_found(&self, address: BdAddr, class: DeviceClass, name: &[u8]);

    /// The running inquiry finished.
    fn on_inquiry_complete(&self, success: bool, responses: u16);

    /// The running service discovery finished.
    fn on_discovery_complete(&self);

    /// The connection state of `port` changed.
    fn on_connection_event(&self, port: ConnectionHandle, event: PortEvent);

    /// Data arrived on `port`.
    fn on_data_received(&self, port: ConnectionHandle, data: &[u8]);
}

/// Calls from the bridge into the native stack.
///
/// The bridge holds none of its state locks while calling these methods, so a backend may deliver callbacks from
/// inside a call. Calls that assign a channel ([`assign_scn`][Self::assign_scn],
/// [`set_security_level`][Self::set_security_level] and [`open_client`][Self::open_client]) are serialized by the
/// bridge.
pub trait StackBackend: Send + Sync + 'static {
    /// Install the sink that receives this stack's callbacks.
    fn register(&self, events: Arc<dyn StackEvents>) -> Result<(), StackFailure>;

    /// Drop the sink installed by [`register`][Self::register].
    fn unregister(&self);

    /// A description of the error of the last failed call, if the stack has one.
    fn extended_error(&self) -> Option<String>;

    /// Version information and address of the local adapter.
    fn local_version_info(&self) -> Result<LocalVersionInfo, StackFailure>;

    /// The friendly name of the local adapter.
    fn local_name(&self) -> Result<String, StackFailure>;

    /// Whether the local adapter is powered and ready.
    fn is_device_ready(&self) -> bool;

    /// Whether the stack's server process is running.
    fn is_server_up(&self) -> bool;

    /// The stack software version string.
    fn version(&self) -> Option<String>;

    /// Begin a device inquiry. Responses arrive through [`StackEvents::on_device_found`].
    fn start_inquiry(&self, access_code: InquiryAccessCode) -> Result<(), StackFailure>;

    /// Stop the running inquiry, if any.
    fn stop_inquiry(&self);

    /// Begin service discovery on `address`, restricted to `filter` if given. Completion arrives through
    /// [`StackEvents::on_discovery_complete`].
    fn start_discovery(&self, address: BdAddr, filter: Option<Uuid>) -> Result<(), StackFailure>;

    /// The result and number of records found by the last discovery on `address`.
    fn last_discovery_result(&self, address: BdAddr) -> (DiscoveryResult, u16);

    /// Read up to `max` records found by the last discovery on `address`.
    fn read_discovery_records(&self, address: BdAddr, max: usize, filter: Option<Uuid>) -> Vec<ServiceRecord>;

    /// Assign server channel number `channel` to `service`.
    fn assign_scn(&self, service: Uuid, channel: u8) -> Result<(), StackFailure>;

    /// Configure link security for the service registered as `service_name`.
    fn set_security_level(&self, service_name: &str, security: SecurityOptions) -> Result<(), StackFailure>;

    /// Begin connecting `port` to `channel` on `address`. Completion arrives through
    /// [`StackEvents::on_connection_event`].
    fn open_client(&self, port: ConnectionHandle, channel: u8, address: BdAddr) -> Result<(), StackFailure>;

    /// Send bytes on `port`, returning how many the stack accepted.
    fn write(&self, port: ConnectionHandle, data: &[u8]) -> Result<usize, StackFailure>;

    /// Close `port`.
    fn close(&self, port: ConnectionHandle) -> Result<(), PortCloseError>;

    /// The remote address of `port` if it is currently connected.
    fn connected_address(&self, port: ConnectionHandle) -> Option<BdAddr>;
}
