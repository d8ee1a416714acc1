//! Service discovery.
//!
//! Records read from the stack are stored in a fixed pool shared by every discovery on the stack. Each discovery
//! takes a contiguous window of the pool, starting after the previous window or at the start of the pool when the
//! window would not fit. Handles are pool indices and stay usable only until a later discovery reuses their slot:
//! after that they silently refer to the newer record.

use std::collections::BTreeMap;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::backend::DiscoveryResult;
use crate::btuuid::{attributes, services};
use crate::error::ErrorKind;
use crate::sdp::DataElement;
use crate::stack::StackShared;
use crate::types::BdAddr;
use crate::{Error, Result, Stack};

/// The raw bytes of a service attribute value
pub type AttributeValue = SmallVec<[u8; 16]>;

/// A service record read from a remote device, as a set of attributes keyed by attribute ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRecord {
    attributes: BTreeMap<u16, AttributeValue>,
}

impl ServiceRecord {
    /// Creates an empty record
    pub fn new() -> Self {
        ServiceRecord::default()
    }

    /// Adds an attribute, replacing any previous value with the same ID
    pub fn with_attribute(mut self, id: u16, value: &[u8]) -> Self {
        self.insert(id, value);
        self
    }

    /// Adds an attribute, replacing any previous value with the same ID
    pub fn insert(&mut self, id: u16, value: &[u8]) {
        self.attributes.insert(id, AttributeValue::from_slice(value));
    }

    /// The value of attribute `id`, if the record has it
    pub fn attribute(&self, id: u16) -> Option<&[u8]> {
        self.attributes.get(&id).map(|v| v.as_slice())
    }

    /// The IDs of every attribute in the record, in ascending order
    pub fn attribute_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.attributes.keys().copied()
    }

    /// Decodes attribute `id` as an SDP data element
    pub fn element(&self, id: u16) -> Option<DataElement> {
        DataElement::decode(self.attribute(id)?)
    }

    /// The service classes the record belongs to, most specific first.
    ///
    /// Empty if the record has no well-formed service class ID list.
    pub fn service_class_ids(&self) -> Vec<Uuid> {
        let Some(DataElement::Sequence(classes)) = self.element(attributes::SERVICE_CLASS_ID_LIST) else {
            return Vec::new();
        };
        classes.iter().filter_map(DataElement::as_uuid).collect()
    }

    /// The RFCOMM server channel listed in the record's protocol descriptor list, if it has one
    pub fn rfcomm_channel(&self) -> Option<u8> {
        let protocols = self.element(attributes::PROTOCOL_DESCRIPTOR_LIST)?;
        protocols.as_list()?.iter().find_map(|protocol| match protocol.as_list()? {
            [id, channel, ..] if id.as_uuid() == Some(services::RFCOMM) => {
                channel.as_uint().and_then(|c| u8::try_from(c).ok())
            }
            _ => None,
        })
    }
}

/// A reference to a service record found by a discovery.
///
/// See the [module documentation][self] for how long a handle stays meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceRecordHandle(u32);

impl ServiceRecordHandle {
    /// Creates a handle from a pool index
    pub fn from_index(index: u32) -> Self {
        ServiceRecordHandle(index)
    }

    /// The pool index of this handle
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
pub(crate) struct DiscoveryState {
    pool: Vec<Option<ServiceRecord>>,
    used: usize,
    active: bool,
    complete: bool,
    /// The waiter went away before completion. The stack is still searching, so the discovery stays active until it
    /// reports completion.
    abandoned: bool,
}

impl DiscoveryState {
    pub fn new(capacity: usize) -> Self {
        let mut pool = Vec::with_capacity(capacity);
        pool.resize_with(capacity, || None);
        DiscoveryState {
            pool,
            used: 0,
            active: false,
            complete: false,
            abandoned: false,
        }
    }

    /// Stores `records` in the next window of the pool and returns their handles.
    fn store(&mut self, records: Vec<ServiceRecord>) -> Vec<ServiceRecordHandle> {
        debug_assert!(records.len() <= self.pool.len());
        let start = if self.used + records.len() > self.pool.len() {
            0
        } else {
            self.used
        };
        let count = records.len();
        for (slot, record) in self.pool[start..start + count].iter_mut().zip(records) {
            *slot = Some(record);
        }
        self.used = start + count;
        (start..start + count)
            .map(|i| ServiceRecordHandle(i as u32))
            .collect()
    }

    fn record(&self, handle: ServiceRecordHandle) -> Result<Option<&ServiceRecord>> {
        self.pool
            .get(handle.0 as usize)
            .map(Option::as_ref)
            .ok_or_else(|| Error::with_message(ErrorKind::InvalidHandle, format!("invalid record handle {}", handle.0)))
    }
}

impl StackShared {
    pub(crate) fn discovery_complete(&self) {
        let mut state = self.state.lock();
        if !state.alive || !state.discovery.active {
            trace!("ignoring discovery completion outside of a discovery");
            return;
        }
        if state.discovery.abandoned {
            debug!("abandoned service discovery finished");
            state.discovery.abandoned = false;
            state.discovery.active = false;
            return;
        }
        state.discovery.complete = true;
        drop(state);
        self.events.notify_all();
    }
}

impl Stack {
    /// Starts discovering the services of `address`.
    ///
    /// With a `filter`, only records of that service class are reported, and the filter becomes the service UUID
    /// used for later channel assignments. A successful return means the stack has started the discovery; the
    /// results are collected with [`ServiceDiscovery::wait`]. Only one discovery can run at a time.
    pub fn start_service_discovery(&self, address: BdAddr, filter: Option<Uuid>) -> Result<ServiceDiscovery> {
        {
            let mut state = self.shared.state.lock();
            if !state.alive {
                return Err(ErrorKind::StackUnavailable.into());
            }
            if state.discovery.active {
                return Err(ErrorKind::AlreadyDiscovering.into());
            }
            state.discovery.active = true;
            state.discovery.complete = false;
        }

        if let Some(uuid) = filter {
            self.shared.channels.set_service(uuid);
        }

        debug!(%address, ?filter, "starting service discovery");
        if self.shared.backend.start_discovery(address, filter).is_err() {
            self.shared.state.lock().discovery.active = false;
            return Err(self.shared.stack_error("failed to start service discovery"));
        }

        Ok(ServiceDiscovery {
            stack: self.clone(),
            address,
            filter,
        })
    }

    /// Discovers the services of `address` and blocks until the results are available.
    pub fn discover_services(&self, address: BdAddr, filter: Option<Uuid>) -> Result<Vec<ServiceRecordHandle>> {
        self.start_service_discovery(address, filter)?.wait()
    }

    /// Fetches attribute `attribute_id` of a discovered record.
    ///
    /// Returns `None` if the record has no such attribute. Fails with
    /// [`InvalidHandle`][ErrorKind::InvalidHandle] if `handle` lies outside the record pool.
    pub fn service_attribute(&self, handle: ServiceRecordHandle, attribute_id: u16) -> Result<Option<AttributeValue>> {
        let state = self.shared.state.lock();
        if !state.alive {
            return Err(ErrorKind::StackUnavailable.into());
        }
        Ok(state
            .discovery
            .record(handle)?
            .and_then(|record| record.attribute(attribute_id))
            .map(AttributeValue::from_slice))
    }

    /// A copy of a whole discovered record, `None` if its slot has never been filled.
    pub fn service_record(&self, handle: ServiceRecordHandle) -> Result<Option<ServiceRecord>> {
        let state = self.shared.state.lock();
        if !state.alive {
            return Err(ErrorKind::StackUnavailable.into());
        }
        Ok(state.discovery.record(handle)?.cloned())
    }
}

/// A running service discovery.
///
/// Dropping it without calling [`wait`][Self::wait] abandons the results. The stack cannot be told to stop a
/// discovery, so a new one cannot start until the abandoned one has completed, and fails with
/// [`AlreadyDiscovering`][ErrorKind::AlreadyDiscovering] until then.
#[derive(Debug)]
pub struct ServiceDiscovery {
    stack: Stack,
    address: BdAddr,
    filter: Option<Uuid>,
}

impl ServiceDiscovery {
    /// The device being searched
    pub fn address(&self) -> BdAddr {
        self.address
    }

    /// Blocks until the discovery completes and returns handles to the records found.
    ///
    /// There is no timeout; the wait ends when the stack reports completion or is torn down. An empty result means
    /// the device has no matching services.
    pub fn wait(self) -> Result<Vec<ServiceRecordHandle>> {
        let shared = &*self.stack.shared;
        {
            let mut state = shared.state.lock();
            loop {
                if !state.alive {
                    return Err(Error::with_message(
                        ErrorKind::StackUnavailable,
                        "stack torn down during service discovery",
                    ));
                }
                if state.discovery.complete {
                    break;
                }
                shared.events.wait(&mut state);
            }
        }

        let (result, found) = shared.backend.last_discovery_result(self.address);
        if result != DiscoveryResult::Success {
            debug!(address = %self.address, ?result, "service discovery failed");
            return Err(Error::with_message(
                ErrorKind::Discovery(result),
                format!("service discovery on {} failed", self.address),
            ));
        }
        if found == 0 {
            return Ok(Vec::new());
        }

        let capacity = shared.config.discovery_pool_capacity;
        let mut count = usize::from(found);
        if count > capacity {
            warn!(found, capacity, "too many service records");
            count = capacity;
        }

        let mut records = shared.backend.read_discovery_records(self.address, count, self.filter);
        if records.is_empty() {
            return Err(Error::with_message(
                ErrorKind::Stack,
                format!("stack returned no service records, expected {count}"),
            ));
        }
        records.truncate(count);

        let handles = shared.state.lock().discovery.store(records);
        debug!(address = %self.address, records = handles.len(), "service discovery complete");
        Ok(handles)
    }
}

impl Drop for ServiceDiscovery {
    fn drop(&mut self) {
        let mut state = self.stack.shared.state.lock();
        if state.alive && !state.discovery.complete {
            debug!(address = %self.address, "service discovery abandoned before completion");
            state.discovery.abandoned = true;
        } else {
            state.discovery.active = false;
        }
    }
}
