use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::backend::{PortEvent, StackBackend, StackEvents};
use crate::config::StackConfig;
use crate::connection::Port;
use crate::discovery::DiscoveryState;
use crate::error::{ErrorKind, ExtendedError};
use crate::guard::ChannelGuard;
use crate::inquiry::InquiryState;
use crate::registry::{ConnectionHandle, Registry};
use crate::types::{BdAddr, DeviceClass, DeviceRecord};
use crate::{Error, Result};

/// A connection to a native Bluetooth stack.
///
/// `Stack` is a cheap handle to shared state and may be cloned and sent to other threads. Every clone refers to the
/// same stack. The stack is torn down by [`teardown`][Self::teardown] or when the last clone is dropped.
#[derive(Clone)]
pub struct Stack {
    pub(crate) shared: Arc<StackShared>,
}

pub(crate) struct StackShared {
    pub(crate) backend: Box<dyn StackBackend>,
    pub(crate) config: StackConfig,
    /// Inquiry and discovery state. Signalled through `events`.
    pub(crate) state: Mutex<StackState>,
    pub(crate) events: Condvar,
    pub(crate) ports: RwLock<Registry<Arc<Port>>>,
    pub(crate) channels: ChannelGuard,
    pub(crate) open_connections: AtomicUsize,
}

pub(crate) struct StackState {
    pub alive: bool,
    pub inquiry: InquiryState,
    pub discovery: DiscoveryState,
}

impl Stack {
    /// Connects the bridge to `backend` and registers for its callbacks.
    pub fn initialize<B: StackBackend>(backend: B, config: StackConfig) -> Result<Stack> {
        config.validate()?;

        let shared = Arc::new(StackShared {
            backend: Box::new(backend),
            state: Mutex::new(StackState {
                alive: true,
                inquiry: InquiryState::new(config.inquiry_capacity),
                discovery: DiscoveryState::new(config.discovery_pool_capacity),
            }),
            events: Condvar::new(),
            ports: RwLock::new(Registry::new()),
            channels: ChannelGuard::new(config.client_service_uuid),
            open_connections: AtomicUsize::new(0),
            config,
        });

        let sink = Arc::new(EventSink {
            shared: Arc::downgrade(&shared),
        });
        shared
            .backend
            .register(sink)
            .map_err(|_| shared.stack_error("failed to register stack callbacks"))?;

        debug!("stack initialized");
        Ok(Stack { shared })
    }

    /// Tears the stack down.
    ///
    /// Every thread blocked in an operation on this stack wakes up and fails with
    /// [`StackUnavailable`][ErrorKind::StackUnavailable] (blocked reads with buffered data return that data first).
    /// Every later operation fails the same way. Connection handles may still be closed.
    pub fn teardown(&self) {
        self.shared.shutdown();
    }

    /// Returns `false` once the stack has been torn down
    pub fn is_alive(&self) -> bool {
        self.shared.state.lock().alive
    }

    /// The configuration this stack was initialized with
    pub fn config(&self) -> &StackConfig {
        &self.shared.config
    }

    /// The number of connections currently open on this stack
    pub fn open_connections(&self) -> usize {
        self.shared.open_connections.load(Ordering::Relaxed)
    }

    /// The service UUID the next channel assignment will use
    pub fn client_service_uuid(&self) -> Uuid {
        self.shared.channels.service()
    }

    /// The address of the local adapter
    pub fn local_address(&self) -> Result<BdAddr> {
        self.shared.ensure_alive()?;
        self.shared
            .backend
            .local_version_info()
            .map(|info| info.address)
            .map_err(|_| self.shared.stack_error("failed to read local device info"))
    }

    /// The friendly name of the local adapter
    pub fn local_name(&self) -> Result<String> {
        self.shared.ensure_alive()?;
        self.shared
            .backend
            .local_name()
            .map_err(|_| self.shared.stack_error("failed to read local device name"))
    }

    /// Whether the local adapter is powered on and ready
    pub fn is_powered_on(&self) -> Result<bool> {
        self.shared.ensure_alive()?;
        Ok(self.shared.backend.is_device_ready())
    }

    /// Whether the stack's server is running
    pub fn is_server_up(&self) -> Result<bool> {
        self.shared.ensure_alive()?;
        Ok(self.shared.backend.is_server_up())
    }

    /// The native stack's software version string
    pub fn stack_version(&self) -> Result<Option<String>> {
        self.shared.ensure_alive()?;
        Ok(self.shared.backend.version())
    }

    /// The LMP sub-version of the local adapter
    pub fn device_version(&self) -> Result<u16> {
        self.shared.ensure_alive()?;
        self.shared
            .backend
            .local_version_info()
            .map(|info| info.lmp_sub_version)
            .map_err(|_| self.shared.stack_error("failed to read local device info"))
    }

    /// The manufacturer company identifier of the local adapter
    pub fn device_manufacturer(&self) -> Result<u16> {
        self.shared.ensure_alive()?;
        self.shared
            .backend
            .local_version_info()
            .map(|info| info.manufacturer)
            .map_err(|_| self.shared.stack_error("failed to read local device info"))
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("alive", &self.is_alive())
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

impl PartialEq for Stack {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Stack {}

impl StackShared {
    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.state.lock().alive {
            Ok(())
        } else {
            Err(ErrorKind::StackUnavailable.into())
        }
    }

    /// Builds a [`Stack`][ErrorKind::Stack] error from the stack's description of its last failure.
    pub(crate) fn stack_error(&self, message: &str) -> Error {
        let source = self
            .backend
            .extended_error()
            .map(|e| Box::new(ExtendedError(e)) as Box<dyn std::error::Error + Send + Sync>);
        if source.is_none() {
            debug!("{message}: no error code");
        }
        Error::new(ErrorKind::Stack, source, message)
    }

    fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if !state.alive {
                return;
            }
            state.alive = false;
        }
        self.events.notify_all();

        let ports = self.ports.read();
        for port in ports.values() {
            port.stack_gone();
        }
        let open_ports = ports.len();
        drop(ports);

        self.backend.unregister();
        debug!(open_ports, "stack torn down");
    }
}

impl Drop for StackShared {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The callback sink handed to the backend. Holds the stack weakly so that a backend keeping the sink alive does not
/// keep the stack alive.
struct EventSink {
    shared: Weak<StackShared>,
}

impl StackEvents for EventSink {
    fn on_device_found(&self, address: BdAddr, class: DeviceClass, name: &[u8]) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.device_found(DeviceRecord::from_raw_name(address, class, name));
    }

    fn on_inquiry_complete(&self, success: bool, responses: u16) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.inquiry_complete(success, responses);
    }

    fn on_discovery_complete(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.discovery_complete();
    }

    fn on_connection_event(&self, port: ConnectionHandle, event: PortEvent) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match shared.lookup(port) {
            Some(p) => p.connection_event(port, event),
            None => trace!(%port, ?event, "connection event for unknown port"),
        }
    }

    fn on_data_received(&self, port: ConnectionHandle, data: &[u8]) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match shared.lookup(port) {
            Some(p) => p.receive(port, data),
            None => trace!(%port, len = data.len(), "data for unknown port"),
        }
    }
}
