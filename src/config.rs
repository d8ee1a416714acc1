//! Stack configuration

use std::time::Duration;

use uuid::Uuid;

use crate::error::ErrorKind;
use crate::{Error, Result};

/// Service UUID used for channel assignment until a service discovery supplies a filter UUID
pub const DEFAULT_CLIENT_SERVICE_UUID: Uuid = Uuid::from_u128(0x5fc2a42e_144e_4bb5_b43f_4e61711d1c32);

/// Tunables of a [`Stack`][crate::Stack].
///
/// The defaults match the buffer sizes commonly used with WIDCOMM-style stacks.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct StackConfig {
    /// Number of inquiry responses retained before the oldest is overwritten
    pub inquiry_capacity: usize,
    /// Number of service record slots shared by all discoveries
    pub discovery_pool_capacity: usize,
    /// Receive buffer size of each connection, in bytes
    pub receive_buffer_capacity: usize,
    /// Upper bound on waiting for a connection to be established. `None` waits until the stack reports success or
    /// failure, or the stack is torn down.
    pub connect_timeout: Option<Duration>,
    /// Service UUID used for channel assignment before any filtered service discovery has run
    pub client_service_uuid: Uuid,
    /// Service name under which client security levels are registered
    pub security_service_name: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            inquiry_capacity: 50,
            discovery_pool_capacity: 100,
            receive_buffer_capacity: 0x10000,
            connect_timeout: None,
            client_service_uuid: DEFAULT_CLIENT_SERVICE_UUID,
            security_service_name: String::from("btbridge"),
        }
    }
}

impl StackConfig {
    /// Sets [`inquiry_capacity`][Self::inquiry_capacity]
    pub fn with_inquiry_capacity(mut self, capacity: usize) -> Self {
        self.inquiry_capacity = capacity;
        self
    }

    /// Sets [`discovery_pool_capacity`][Self::discovery_pool_capacity]
    pub fn with_discovery_pool_capacity(mut self, capacity: usize) -> Self {
        self.discovery_pool_capacity = capacity;
        self
    }

    /// Sets [`receive_buffer_capacity`][Self::receive_buffer_capacity]
    pub fn with_receive_buffer_capacity(mut self, capacity: usize) -> Self {
        self.receive_buffer_capacity = capacity;
        self
    }

    /// Sets [`connect_timeout`][Self::connect_timeout]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets [`client_service_uuid`][Self::client_service_uuid]
    pub fn with_client_service_uuid(mut self, uuid: Uuid) -> Self {
        self.client_service_uuid = uuid;
        self
    }

    /// Sets [`security_service_name`][Self::security_service_name]
    pub fn with_security_service_name(mut self, name: impl Into<String>) -> Self {
        self.security_service_name = name.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let capacities = [
            ("inquiry_capacity", self.inquiry_capacity),
            ("discovery_pool_capacity", self.discovery_pool_capacity),
            ("receive_buffer_capacity", self.receive_buffer_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(Error::with_message(ErrorKind::InvalidParameter, format!("{name} must not be 0")));
            }
        }
        if self.discovery_pool_capacity > u32::MAX as usize {
            return Err(Error::with_message(
                ErrorKind::InvalidParameter,
                "discovery_pool_capacity does not fit a record handle",
            ));
        }
        Ok(())
    }
}
