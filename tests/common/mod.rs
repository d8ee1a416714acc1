#![allow(dead_code)]

//! A scriptable in-memory stack backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use btbridge::backend::{
    DiscoveryResult, PortCloseError, PortEvent, StackBackend, StackEvents, StackFailure,
};
use btbridge::{
    BdAddr, ConnectionHandle, DeviceClass, InquiryAccessCode, LocalVersionInfo, SecurityOptions, ServiceRecord, Uuid,
};
use parking_lot::{Condvar, Mutex};

pub fn init_tracing() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .from_env_lossy(),
        )
        .try_init();
}

pub fn addr(last: u8) -> BdAddr {
    BdAddr([0x00, 0x11, 0x22, 0x33, 0x44, last])
}

/// How the fake answers [`StackBackend::open_client`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehaviour {
    /// Report the connection established from inside `open_client`
    Accept,
    /// Report a connect error from inside `open_client`
    Reject,
    /// Fail the `open_client` call itself
    FailCall,
    /// Report nothing; the test drives the outcome
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartInquiry(InquiryAccessCode),
    StopInquiry,
    StartDiscovery(BdAddr, Option<Uuid>),
    ReadRecords(usize),
    AssignScn(Uuid, u8),
    SetSecurity(String, SecurityOptions),
    OpenClient(ConnectionHandle, u8, BdAddr),
    Close(ConnectionHandle),
    Unregister,
}

struct State {
    calls: Vec<Call>,
    connect: ConnectBehaviour,
    echo: bool,
    write_chunk: Option<usize>,
    disconnect_after: Option<usize>,
    fail_inquiry: bool,
    hold_stop: bool,
    stop_held: bool,
    discovery_result: DiscoveryResult,
    discovery_count: Option<u16>,
    records: Vec<ServiceRecord>,
    open: HashMap<ConnectionHandle, BdAddr>,
    written: HashMap<ConnectionHandle, Vec<u8>>,
    last_port: Option<ConnectionHandle>,
    extended_error: Option<String>,
}

struct Inner {
    state: Mutex<State>,
    changed: Condvar,
    sink: Mutex<Option<Arc<dyn StackEvents>>>,
}

#[derive(Clone)]
pub struct FakeStack {
    inner: Arc<Inner>,
}

impl Default for FakeStack {
    fn default() -> Self {
        FakeStack::new()
    }
}

impl FakeStack {
    pub fn new() -> Self {
        FakeStack {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    calls: Vec::new(),
                    connect: ConnectBehaviour::Accept,
                    echo: false,
                    write_chunk: None,
                    disconnect_after: None,
                    fail_inquiry: false,
                    hold_stop: false,
                    stop_held: false,
                    discovery_result: DiscoveryResult::Success,
                    discovery_count: None,
                    records: Vec::new(),
                    open: HashMap::new(),
                    written: HashMap::new(),
                    last_port: None,
                    extended_error: None,
                }),
                changed: Condvar::new(),
                sink: Mutex::new(None),
            }),
        }
    }

    pub fn set_connect(&self, behaviour: ConnectBehaviour) {
        self.inner.state.lock().connect = behaviour;
    }

    /// Every write is reported back as received data on the same port
    pub fn set_echo(&self, echo: bool) {
        self.inner.state.lock().echo = echo;
    }

    /// Accept at most `chunk` bytes per write call
    pub fn set_write_chunk(&self, chunk: Option<usize>) {
        self.inner.state.lock().write_chunk = chunk;
    }

    /// Drop the link once a port has been sent at least `bytes` bytes
    pub fn set_disconnect_after(&self, bytes: Option<usize>) {
        self.inner.state.lock().disconnect_after = bytes;
    }

    /// The next `stop_inquiry` call blocks until [`release_stop`][Self::release_stop]
    pub fn hold_next_stop(&self) {
        self.inner.state.lock().hold_stop = true;
    }

    pub fn release_stop(&self) {
        self.inner.state.lock().stop_held = false;
        self.inner.changed.notify_all();
    }

    pub fn set_fail_inquiry(&self, fail: bool) {
        self.inner.state.lock().fail_inquiry = fail;
    }

    pub fn set_extended_error(&self, error: Option<&str>) {
        self.inner.state.lock().extended_error = error.map(String::from);
    }

    pub fn set_discovery(&self, result: DiscoveryResult, records: Vec<ServiceRecord>) {
        let mut state = self.inner.state.lock();
        state.discovery_result = result;
        state.discovery_count = None;
        state.records = records;
    }

    /// Report `count` records found regardless of how many are available
    pub fn set_discovery_count(&self, count: u16) {
        self.inner.state.lock().discovery_count = Some(count);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.state.lock().calls.clone()
    }

    pub fn written(&self, port: ConnectionHandle) -> Vec<u8> {
        self.inner.state.lock().written.get(&port).cloned().unwrap_or_default()
    }

    pub fn is_open(&self, port: ConnectionHandle) -> bool {
        self.inner.state.lock().open.contains_key(&port)
    }

    pub fn last_port(&self) -> Option<ConnectionHandle> {
        self.inner.state.lock().last_port
    }

    /// Blocks until `open_client` has been called `count` times in total
    pub fn wait_for_open(&self, count: usize) -> ConnectionHandle {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut state = self.inner.state.lock();
        loop {
            let opened = state.calls.iter().filter(|c| matches!(c, Call::OpenClient(..))).count();
            if opened >= count {
                return state.last_port.expect("open_client recorded a port");
            }
            assert!(
                !self.inner.changed.wait_until(&mut state, deadline).timed_out(),
                "timed out waiting for open_client"
            );
        }
    }

    /// Blocks until `call` has been recorded
    pub fn wait_for_call(&self, call: &Call) {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut state = self.inner.state.lock();
        while !state.calls.contains(call) {
            assert!(
                !self.inner.changed.wait_until(&mut state, deadline).timed_out(),
                "timed out waiting for {call:?}"
            );
        }
    }

    pub fn sink(&self) -> Arc<dyn StackEvents> {
        self.inner.sink.lock().clone().expect("stack registered")
    }

    fn with_sink(&self, f: impl FnOnce(&dyn StackEvents)) {
        let sink = self.inner.sink.lock().clone();
        if let Some(sink) = sink {
            f(&*sink);
        }
    }

    fn record(&self, call: Call) {
        self.inner.state.lock().calls.push(call);
        self.inner.changed.notify_all();
    }

    pub fn fire_device(&self, address: BdAddr, name: &str) {
        self.with_sink(|s| s.on_device_found(address, DeviceClass::from_bits(0x5a020c), name.as_bytes()));
    }

    pub fn fire_inquiry_complete(&self, success: bool) {
        self.with_sink(|s| s.on_inquiry_complete(success, 0));
    }

    pub fn fire_discovery_complete(&self) {
        self.with_sink(|s| s.on_discovery_complete());
    }

    pub fn fire_connected(&self, port: ConnectionHandle) {
        self.with_sink(|s| s.on_connection_event(port, PortEvent::Connected));
    }

    pub fn fire_connect_error(&self, port: ConnectionHandle) {
        self.inner.state.lock().open.remove(&port);
        self.with_sink(|s| s.on_connection_event(port, PortEvent::ConnectError));
    }

    pub fn fire_data(&self, port: ConnectionHandle, data: &[u8]) {
        self.with_sink(|s| s.on_data_received(port, data));
    }
}

impl StackBackend for FakeStack {
    fn register(&self, events: Arc<dyn StackEvents>) -> Result<(), StackFailure> {
        *self.inner.sink.lock() = Some(events);
        Ok(())
    }

    fn unregister(&self) {
        self.inner.sink.lock().take();
        self.record(Call::Unregister);
    }

    fn extended_error(&self) -> Option<String> {
        self.inner.state.lock().extended_error.clone()
    }

    fn local_version_info(&self) -> Result<LocalVersionInfo, StackFailure> {
        Ok(LocalVersionInfo {
            address: addr(0x01),
            hci_version: 3,
            hci_revision: 0x0100,
            lmp_version: 3,
            lmp_sub_version: 0x1234,
            manufacturer: 10,
        })
    }

    fn local_name(&self) -> Result<String, StackFailure> {
        Ok(String::from("fake adapter"))
    }

    fn is_device_ready(&self) -> bool {
        true
    }

    fn is_server_up(&self) -> bool {
        true
    }

    fn version(&self) -> Option<String> {
        Some(String::from("5.1.0.1100"))
    }

    fn start_inquiry(&self, access_code: InquiryAccessCode) -> Result<(), StackFailure> {
        if self.inner.state.lock().fail_inquiry {
            return Err(StackFailure);
        }
        self.record(Call::StartInquiry(access_code));
        Ok(())
    }

    fn stop_inquiry(&self) {
        let mut state = self.inner.state.lock();
        state.calls.push(Call::StopInquiry);
        if std::mem::take(&mut state.hold_stop) {
            state.stop_held = true;
            self.inner.changed.notify_all();
            while state.stop_held {
                self.inner.changed.wait(&mut state);
            }
        } else {
            self.inner.changed.notify_all();
        }
    }

    fn start_discovery(&self, address: BdAddr, filter: Option<Uuid>) -> Result<(), StackFailure> {
        self.record(Call::StartDiscovery(address, filter));
        Ok(())
    }

    fn last_discovery_result(&self, _address: BdAddr) -> (DiscoveryResult, u16) {
        let state = self.inner.state.lock();
        let count = state.discovery_count.unwrap_or(state.records.len() as u16);
        (state.discovery_result, count)
    }

    fn read_discovery_records(&self, _address: BdAddr, max: usize, _filter: Option<Uuid>) -> Vec<ServiceRecord> {
        self.record(Call::ReadRecords(max));
        let state = self.inner.state.lock();
        state.records.iter().take(max).cloned().collect()
    }

    fn assign_scn(&self, service: Uuid, channel: u8) -> Result<(), StackFailure> {
        self.record(Call::AssignScn(service, channel));
        Ok(())
    }

    fn set_security_level(&self, service_name: &str, security: SecurityOptions) -> Result<(), StackFailure> {
        self.record(Call::SetSecurity(service_name.to_string(), security));
        Ok(())
    }

    fn open_client(&self, port: ConnectionHandle, channel: u8, address: BdAddr) -> Result<(), StackFailure> {
        let behaviour = {
            let mut state = self.inner.state.lock();
            state.calls.push(Call::OpenClient(port, channel, address));
            state.last_port = Some(port);
            if state.connect != ConnectBehaviour::FailCall {
                state.open.insert(port, address);
            }
            state.connect
        };
        self.inner.changed.notify_all();

        match behaviour {
            ConnectBehaviour::Accept => self.fire_connected(port),
            ConnectBehaviour::Reject => self.fire_connect_error(port),
            ConnectBehaviour::FailCall => return Err(StackFailure),
            ConnectBehaviour::Manual => {}
        }
        Ok(())
    }

    fn write(&self, port: ConnectionHandle, data: &[u8]) -> Result<usize, StackFailure> {
        let (accepted, echo, disconnect) = {
            let mut state = self.inner.state.lock();
            if !state.open.contains_key(&port) {
                return Err(StackFailure);
            }
            let accepted = state.write_chunk.map_or(data.len(), |chunk| chunk.min(data.len()));
            let limit = state.disconnect_after;
            let sent = state.written.entry(port).or_default();
            sent.extend_from_slice(&data[..accepted]);
            let disconnect = limit.is_some_and(|limit| sent.len() >= limit);
            (accepted, state.echo, disconnect)
        };
        if echo {
            self.fire_data(port, &data[..accepted]);
        }
        if disconnect {
            self.fire_connect_error(port);
        }
        Ok(accepted)
    }

    fn close(&self, port: ConnectionHandle) -> Result<(), PortCloseError> {
        self.record(Call::Close(port));
        match self.inner.state.lock().open.remove(&port) {
            Some(_) => Ok(()),
            None => Err(PortCloseError::NotOpened),
        }
    }

    fn connected_address(&self, port: ConnectionHandle) -> Option<BdAddr> {
        self.inner.state.lock().open.get(&port).copied()
    }
}
