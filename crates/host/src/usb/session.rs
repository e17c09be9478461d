//! Session: backend plus the registry of open device handles
//!
//! Handles live in an arena keyed by [`HandleId`]. Bound endpoints carry
//! only the key, so closing a handle never has to chase references to it.

use crate::usb::endpoint::{Endpoint, HandleId};
use crate::usb::enumerate::enumerate;
use crate::usb::handle::{DeviceHandle, EndpointSelector};
use model::{Bus, Device, Result, UsbBackend, UsbError, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// USB session
///
/// Owns the native backend and every handle opened through it. Dropping
/// the session tears down all open handles.
pub struct Session<B: UsbBackend> {
    /// Native transport
    backend: B,
    /// Open handles
    handles: HashMap<HandleId, DeviceHandle>,
    /// Next handle ID to assign
    next_handle_id: u32,
}

impl<B: UsbBackend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            handles: HashMap::new(),
            next_handle_id: 1,
        }
    }

    /// Rescan and return the descriptor tree
    pub fn busses(&mut self) -> Result<Vec<Arc<Bus>>> {
        enumerate(&mut self.backend)
    }

    /// Open `device` and register the handle
    pub fn open(&mut self, device: &Arc<Device>) -> Result<HandleId> {
        let handle = DeviceHandle::open(device)?;

        let id = HandleId(self.next_handle_id);
        self.next_handle_id += 1;
        self.handles.insert(id, handle);

        info!("Opened device {} as handle {}", device, id);
        Ok(id)
    }

    pub fn handle(&self, id: HandleId) -> Result<&DeviceHandle> {
        self.handles
            .get(&id)
            .ok_or(UsbError::HandleClosed { handle: id.0 })
    }

    pub fn handle_mut(&mut self, id: HandleId) -> Result<&mut DeviceHandle> {
        self.handles
            .get_mut(&id)
            .ok_or(UsbError::HandleClosed { handle: id.0 })
    }

    /// Close a handle, releasing its claimed interface first
    pub fn close(&mut self, id: HandleId) -> Result<()> {
        let handle = self
            .handles
            .remove(&id)
            .ok_or(UsbError::HandleClosed { handle: id.0 })?;
        drop(handle);
        debug!("Closed handle {}", id);
        Ok(())
    }

    /// IDs of all open handles, ascending
    pub fn open_handles(&self) -> Vec<HandleId> {
        let mut ids: Vec<HandleId> = self.handles.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Bind an endpoint of the handle's device to the handle
    pub fn get_endpoint<'a>(
        &self,
        id: HandleId,
        endpoint: impl Into<EndpointSelector<'a>>,
    ) -> Result<Endpoint> {
        let descriptor = self.handle(id)?.find_endpoint(endpoint)?;
        Ok(Endpoint::new(descriptor, id))
    }

    pub fn endpoint_write(
        &mut self,
        endpoint: &Endpoint,
        _data: &Value,
        _timeout: Duration,
    ) -> Result<usize> {
        self.handle_mut(endpoint.handle())?;
        Err(UsbError::Unsupported {
            operation: "endpoint write",
        })
    }

    pub fn endpoint_read(
        &mut self,
        endpoint: &Endpoint,
        _length: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.handle_mut(endpoint.handle())?;
        Err(UsbError::Unsupported {
            operation: "endpoint read",
        })
    }

    pub fn endpoint_reset(&mut self, endpoint: &Endpoint) -> Result<()> {
        self.handle_mut(endpoint.handle())?;
        Err(UsbError::Unsupported {
            operation: "endpoint reset",
        })
    }

    pub fn endpoint_clear_halt(&mut self, endpoint: &Endpoint) -> Result<()> {
        self.handle_mut(endpoint.handle())?;
        Err(UsbError::Unsupported {
            operation: "endpoint clear halt",
        })
    }
}
