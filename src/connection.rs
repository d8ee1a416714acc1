//! RFCOMM client connections.
//!
//! Each connection owns a bounded receive queue filled by the stack's data callback and drained by blocking reads.
//! Two conditions wake waiting threads: one when the connection attempt resolves and one when data arrives or the
//! connection goes away.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::backend::{PortCloseError, PortEvent};
use crate::bounded::ByteQueue;
use crate::error::ErrorKind;
use crate::registry::ConnectionHandle;
use crate::stack::StackShared;
use crate::types::{BdAddr, SecurityOptions};
use crate::{Error, Result, Stack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opening,
    Connected,
    /// The remote side dropped an established connection
    Disconnected,
    ConnectFailed,
    Closed,
}

#[derive(Debug)]
struct PortState {
    phase: Phase,
    received: ByteQueue,
    overflowed: bool,
    stack_gone: bool,
}

#[derive(Debug)]
pub(crate) struct Port {
    state: Mutex<PortState>,
    connect_ready: Condvar,
    data_ready: Condvar,
}

impl Port {
    fn new(receive_capacity: usize) -> Self {
        Port {
            state: Mutex::new(PortState {
                phase: Phase::Opening,
                received: ByteQueue::new(receive_capacity),
                overflowed: false,
                stack_gone: false,
            }),
            connect_ready: Condvar::new(),
            data_ready: Condvar::new(),
        }
    }

    fn wake_all(&self) {
        self.connect_ready.notify_all();
        self.data_ready.notify_all();
    }

    pub(crate) fn connection_event(&self, handle: ConnectionHandle, event: PortEvent) {
        let mut state = self.state.lock();
        if state.stack_gone {
            return;
        }
        match (state.phase, event) {
            (Phase::Opening, PortEvent::Connected) => {
                state.phase = Phase::Connected;
                self.connect_ready.notify_all();
            }
            (Phase::Opening, PortEvent::ConnectError) => {
                state.phase = Phase::ConnectFailed;
                self.connect_ready.notify_all();
            }
            (Phase::Connected, PortEvent::ConnectError) => {
                debug!(%handle, "connection lost");
                state.phase = Phase::Disconnected;
                drop(state);
                self.wake_all();
            }
            (phase, event) => trace!(%handle, ?phase, ?event, "ignoring connection event"),
        }
    }

    pub(crate) fn receive(&self, handle: ConnectionHandle, data: &[u8]) {
        let mut state = self.state.lock();
        if state.phase != Phase::Connected || state.stack_gone {
            trace!(%handle, len = data.len(), "dropping data received while not connected");
            return;
        }
        let accepted = state.received.push(data);
        if accepted < data.len() {
            warn!(%handle, dropped = data.len() - accepted, "receive buffer overflown");
            state.overflowed = true;
        }
        drop(state);
        self.data_ready.notify_all();
    }

    pub(crate) fn stack_gone(&self) {
        self.state.lock().stack_gone = true;
        self.wake_all();
    }

    fn close(&self) {
        self.state.lock().phase = Phase::Closed;
        self.wake_all();
    }

    fn wait_connected(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            match state.phase {
                Phase::Connected => return Ok(()),
                Phase::ConnectFailed | Phase::Disconnected => {
                    return Err(Error::with_message(ErrorKind::ConnectionFailed, "failed to connect"))
                }
                Phase::Closed => {
                    return Err(Error::with_message(
                        ErrorKind::ConnectionFailed,
                        "connection closed while connecting",
                    ))
                }
                Phase::Opening => {}
            }
            if state.stack_gone {
                return Err(ErrorKind::StackUnavailable.into());
            }
            match deadline {
                Some(deadline) => {
                    if self.connect_ready.wait_until(&mut state, deadline).timed_out()
                        && state.phase == Phase::Opening
                        && !state.stack_gone
                    {
                        return Err(Error::with_message(ErrorKind::Timeout, "timed out waiting for connection"));
                    }
                }
                None => self.connect_ready.wait(&mut state),
            }
        }
    }

    /// Blocks until at least one byte can be read. Returns `None` at end of stream.
    fn wait_readable(&self) -> Result<Option<MutexGuard<'_, PortState>>> {
        let mut state = self.state.lock();
        loop {
            if state.phase == Phase::Closed {
                return Ok(None);
            }
            if !state.received.is_empty() {
                return Ok(Some(state));
            }
            if state.overflowed {
                return Err(Error::with_message(
                    ErrorKind::Overflow,
                    "data was dropped because the receive buffer was full",
                ));
            }
            if state.stack_gone {
                return Err(ErrorKind::StackUnavailable.into());
            }
            if state.phase != Phase::Connected {
                return Ok(None);
            }
            self.data_ready.wait(&mut state);
        }
    }

    fn read_byte(&self) -> Result<Option<u8>> {
        Ok(self.wait_readable()?.and_then(|mut state| state.received.pop()))
    }

    fn read_bytes(&self, max_len: usize) -> Result<Option<Vec<u8>>> {
        Ok(self.wait_readable()?.map(|mut state| state.received.take(max_len)))
    }

    fn available(&self) -> usize {
        self.state.lock().received.len()
    }

    /// Fails unless the connection can still carry writes.
    fn check_writable(&self) -> Result<()> {
        let state = self.state.lock();
        if state.stack_gone {
            return Err(ErrorKind::StackUnavailable.into());
        }
        if state.phase != Phase::Connected {
            return Err(Error::with_message(ErrorKind::InvalidState, "connection is closed"));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let state = self.state.lock();
        state.phase == Phase::Connected && !state.stack_gone
    }
}

impl StackShared {
    pub(crate) fn lookup(&self, handle: ConnectionHandle) -> Option<Arc<Port>> {
        self.ports.read().get(handle).cloned()
    }

    fn port(&self, handle: ConnectionHandle) -> Result<Arc<Port>> {
        self.lookup(handle)
            .ok_or_else(|| Error::with_message(ErrorKind::InvalidHandle, format!("invalid or destroyed handle {handle}")))
    }

    /// Revokes `handle`, wakes its waiters, and closes the stack port.
    fn release(&self, handle: ConnectionHandle) -> Result<()> {
        let port = self
            .ports
            .write()
            .remove(handle)
            .ok_or_else(|| Error::with_message(ErrorKind::InvalidHandle, format!("invalid or destroyed handle {handle}")))?;
        port.close();
        let open = self.open_connections.fetch_sub(1, Ordering::Relaxed) - 1;

        let result = if self.state.lock().alive {
            match self.backend.close(handle) {
                Ok(()) | Err(PortCloseError::NotOpened) => Ok(()),
                Err(PortCloseError::Failed) => Err(self.stack_error("failed to close port")),
            }
        } else {
            Ok(())
        };
        debug!(%handle, open_connections = open, "connection released");
        result
    }
}

impl Stack {
    /// Opens an RFCOMM connection to `channel` on `address` and blocks until it is established.
    ///
    /// Channel assignment, security setup and the connect request are serialized with every other connection opened
    /// on this stack. The wait ends when the stack reports the connection as established or failed, when the stack
    /// is torn down, or after [`connect_timeout`][crate::StackConfig::connect_timeout].
    pub fn open_connection(&self, address: BdAddr, channel: u8, security: SecurityOptions) -> Result<ConnectionHandle> {
        let shared = &*self.shared;
        let port = Arc::new(Port::new(shared.config.receive_buffer_capacity));
        let handle = {
            let mut ports = shared.ports.write();
            shared.ensure_alive()?;
            shared.open_connections.fetch_add(1, Ordering::Relaxed);
            ports.insert(port.clone())
        };
        trace!(%address, channel, %handle, "opening connection");

        let opened = shared.channels.with_channel_registration(shared, channel, security, || {
            shared
                .backend
                .open_client(handle, channel, address)
                .map_err(|_| shared.stack_error("failed to open client port"))
        });

        match opened.and_then(|()| port.wait_connected(shared.config.connect_timeout)) {
            Ok(()) => {
                debug!(%address, channel, %handle, "connected");
                Ok(handle)
            }
            Err(err) => {
                if let Err(close_err) = shared.release(handle) {
                    warn!(%handle, "failed to release connection after failed connect: {close_err}");
                }
                Err(err)
            }
        }
    }

    /// Closes the connection and revokes `handle`.
    ///
    /// Threads blocked reading from the connection return end of stream. Any later use of `handle` fails with
    /// [`InvalidHandle`][ErrorKind::InvalidHandle]. Closing works after the stack has been torn down.
    pub fn close_connection(&self, handle: ConnectionHandle) -> Result<()> {
        self.shared.release(handle)
    }

    /// Reads one byte, blocking until one is available.
    ///
    /// Returns `None` at end of stream: the connection was closed, or was lost and every received byte has been
    /// read.
    pub fn read_byte(&self, handle: ConnectionHandle) -> Result<Option<u8>> {
        self.shared.port(handle)?.read_byte()
    }

    /// Reads up to `max_len` bytes, blocking until at least one is available.
    ///
    /// Returns every byte already received up to `max_len` without waiting for more. Returns `None` at end of
    /// stream, like [`read_byte`][Self::read_byte].
    pub fn read_bytes(&self, handle: ConnectionHandle, max_len: usize) -> Result<Option<Vec<u8>>> {
        let port = self.shared.port(handle)?;
        if max_len == 0 {
            return Ok(Some(Vec::new()));
        }
        port.read_bytes(max_len)
    }

    /// The number of bytes that can be read without blocking
    pub fn available_bytes(&self, handle: ConnectionHandle) -> Result<usize> {
        Ok(self.shared.port(handle)?.available())
    }

    /// Writes one byte.
    pub fn write_byte(&self, handle: ConnectionHandle, byte: u8) -> Result<()> {
        self.write_bytes(handle, &[byte])
    }

    /// Writes all of `data`, retrying while the stack accepts partial writes.
    ///
    /// If the connection is lost part-way the error message reports how many bytes were sent.
    pub fn write_bytes(&self, handle: ConnectionHandle, data: &[u8]) -> Result<()> {
        let port = self.shared.port(handle)?;
        port.check_writable()
            .map_err(|err| Error::with_message(err.kind(), "failed to write to closed connection"))?;

        // A connection lost part-way is reported as `NotConnected` rather than `InvalidState`.
        let mut done = 0;
        while done < data.len() {
            if !port.is_connected() {
                port.check_writable().map_err(|err| {
                    let kind = match err.kind() {
                        ErrorKind::InvalidState => ErrorKind::NotConnected,
                        kind => kind,
                    };
                    Error::with_message(
                        kind,
                        format!("connection lost after writing {done} of {} bytes", data.len()),
                    )
                })?;
            }
            let written = self
                .shared
                .backend
                .write(handle, &data[done..])
                .map_err(|_| self.shared.stack_error("failed to write"))?;
            if written == 0 {
                std::thread::yield_now();
            }
            done += written.min(data.len() - done);
        }
        Ok(())
    }

    /// The address of the remote device
    pub fn remote_address(&self, handle: ConnectionHandle) -> Result<BdAddr> {
        let port = self.shared.port(handle)?;
        if !port.is_connected() {
            return Err(Error::with_message(ErrorKind::InvalidState, "connection is closed"));
        }
        self.shared
            .backend
            .connected_address(handle)
            .ok_or_else(|| Error::with_message(ErrorKind::NotConnected, "connection down"))
    }
}

/// An open RFCOMM connection implementing [`std::io::Read`] and [`std::io::Write`].
///
/// The connection is closed when the `RfcommStream` is dropped.
#[derive(Debug)]
pub struct RfcommStream {
    stack: Stack,
    handle: ConnectionHandle,
    closed: bool,
}

impl RfcommStream {
    /// Opens a connection, see [`Stack::open_connection`].
    pub fn connect(stack: &Stack, address: BdAddr, channel: u8, security: SecurityOptions) -> Result<Self> {
        let handle = stack.open_connection(address, channel, security)?;
        Ok(RfcommStream {
            stack: stack.clone(),
            handle,
            closed: false,
        })
    }

    /// The handle of the underlying connection
    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    /// The address of the remote device
    pub fn remote_address(&self) -> Result<BdAddr> {
        self.stack.remote_address(self.handle)
    }

    /// The number of bytes that can be read without blocking
    pub fn available(&self) -> Result<usize> {
        self.stack.available_bytes(self.handle)
    }

    /// Closes the connection.
    ///
    /// The connection is automatically closed when `RfcommStream` is dropped, so you don't need to call this
    /// explicitly unless you want to observe close errors.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.stack.close_connection(self.handle)
    }
}

impl std::io::Read for RfcommStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.stack.read_bytes(self.handle, buf.len())? {
            Some(bytes) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            None => Ok(0),
        }
    }
}

impl std::io::Write for RfcommStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stack.write_bytes(self.handle, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for RfcommStream {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.stack.close_connection(self.handle) {
                warn!(handle = %self.handle, "failed to close connection: {err}");
            }
        }
    }
}
