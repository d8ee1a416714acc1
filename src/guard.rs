use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

use crate::stack::StackShared;
use crate::types::SecurityOptions;
use crate::Result;

/// Serializes server channel assignment on the shared stack handle.
///
/// SCN assignment and security registration are not reentrant in the native stacks, so a connection holds this
/// lock from channel assignment until its connect attempt has been issued.
#[derive(Debug)]
pub(crate) struct ChannelGuard {
    service: Mutex<Uuid>,
}

impl ChannelGuard {
    pub fn new(service: Uuid) -> Self {
        ChannelGuard {
            service: Mutex::new(service),
        }
    }

    /// Changes the service UUID used for subsequent channel assignments.
    pub fn set_service(&self, service: Uuid) {
        *self.service.lock() = service;
    }

    pub fn service(&self) -> Uuid {
        *self.service.lock()
    }

    /// Assigns `channel`, applies `security`, and runs `body` while still holding the registration lock.
    pub fn with_channel_registration<R>(
        &self,
        shared: &StackShared,
        channel: u8,
        security: SecurityOptions,
        body: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let service = self.service.lock();
        trace!(channel, service = %*service, "assigning SCN");
        shared
            .backend
            .assign_scn(*service, channel)
            .map_err(|_| shared.stack_error("failed to assign SCN"))?;
        shared
            .backend
            .set_security_level(&shared.config.security_service_name, security)
            .map_err(|_| shared.stack_error("error setting security level"))?;
        body()
    }
}
