#![warn(missing_docs)]

//! Btbridge is a blocking bridge between [Rust] code and callback-driven Bluetooth classic stacks such as WIDCOMM.
//!
//! Native Bluetooth stacks report results by invoking callbacks on their own threads: devices found during an inquiry,
//! completion of a service discovery, connection state changes and received data. Btbridge collects those callbacks
//! into bounded buffers and exposes them as ordinary blocking calls that can be made from any thread.
//!
//! The native stack itself sits behind the [`StackBackend`][backend::StackBackend] trait. A backend forwards its
//! callbacks to the [`StackEvents`][backend::StackEvents] sink it is handed when the [`Stack`] is initialized.
//!
//! [Rust]: https://www.rust-lang.org/
//!
//! # Usage
//!
//! ```rust,no_run
//!# use btbridge::backend::StackBackend;
//!# use btbridge::{btuuid, InquiryAccessCode, SecurityOptions, Stack, StackConfig};
//!# use std::io::{Read, Write};
//!# fn run(backend: impl StackBackend) -> Result<(), Box<dyn std::error::Error>> {
//!let stack = Stack::initialize(backend, StackConfig::default())?;
//!
//!let mut devices = Vec::new();
//!for device in stack.start_inquiry(InquiryAccessCode::General)? {
//!    let device = device?;
//!    println!("{} {}", device.address, device.name);
//!    devices.push(device.address);
//!}
//!
//!let mut serial_port = None;
//!for address in devices {
//!    for handle in stack.discover_services(address, Some(btuuid::services::SERIAL_PORT))? {
//!        let channel = stack.service_record(handle)?.and_then(|record| record.rfcomm_channel());
//!        if let Some(channel) = channel {
//!            serial_port = Some((address, channel));
//!        }
//!    }
//!}
//!
//!let Some((address, channel)) = serial_port else { return Ok(()) };
//!let mut stream = btbridge::RfcommStream::connect(&stack, address, channel, SecurityOptions::NONE)?;
//!stream.write_all(b"AT\r")?;
//!let mut reply = [0u8; 64];
//!let len = stream.read(&mut reply)?;
//!println!("{:?}", &reply[..len]);
//!#    Ok(())
//!# }
//! ```
//!
//! # Overview
//!
//! - Device inquiry:
//!   - [Starting][Stack::start_inquiry] and [cancelling][Stack::cancel_inquiry] an inquiry
//!   - Reading responding devices from an [`Inquiry`], in arrival order
//! - Service discovery:
//!   - [Discovering][Stack::discover_services] the service records of a remote device
//!   - Reading [attributes][Stack::service_attribute] of discovered records, and decoding them as
//!     [SDP data elements][sdp::DataElement]
//! - RFCOMM connections:
//!   - [Opening][Stack::open_connection] and [closing][Stack::close_connection] client connections
//!   - Blocking [reads][Stack::read_bytes] and [writes][Stack::write_bytes], or [`RfcommStream`] for
//!     [`std::io::Read`] and [`std::io::Write`]
//! - Local adapter queries such as [`local_address`][Stack::local_address] and
//!   [`is_powered_on`][Stack::is_powered_on]
//!
//! # Bounded buffers
//!
//! Every buffer has a fixed capacity set by [`StackConfig`]:
//!
//! - Inquiry responses are kept in a ring that drops the oldest response when full. A slow reader skips responses it
//!   did not get to in time.
//! - Service records share one pool per stack. Handles from an earlier discovery are reused by later ones once the
//!   pool wraps around, see [`discovery`].
//! - Each connection's receive buffer rejects data that does not fit. The bytes already buffered can still be read,
//!   after which reads fail with [`Overflow`][error::ErrorKind::Overflow].
//!
//! # Teardown
//!
//! [`Stack::teardown`] (or dropping the last [`Stack`] clone) unregisters from the backend and wakes every thread
//! blocked in an operation. Those threads, and any later operations, fail with
//! [`StackUnavailable`][error::ErrorKind::StackUnavailable].
//!
//! # Feature flags
//!
//! The `serde` feature is available to enable serializing/deserializing device addresses and inquiry results.

pub mod backend;
mod bounded;
pub mod btuuid;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
mod guard;
pub mod inquiry;
pub mod registry;
pub mod sdp;
mod stack;
pub mod types;

pub use btuuid::BluetoothUuidExt;
pub use config::StackConfig;
pub use connection::RfcommStream;
pub use discovery::{AttributeValue, ServiceDiscovery, ServiceRecord, ServiceRecordHandle};
pub use error::Error;
pub use inquiry::{Inquiry, InquiryEvent};
pub use registry::ConnectionHandle;
pub use stack::Stack;
pub use types::{
    BdAddr, DeviceClass, DeviceRecord, InquiryAccessCode, InquiryOutcome, LocalVersionInfo, SecurityOptions,
};
pub use uuid::Uuid;

/// Convenience alias for a result with [`Error`]
pub type Result<T, E = Error> = core::result::Result<T, E>;
