//! Endpoints bound to an open device handle

use model::{EndpointDescriptor, types::Direction};
use serde::Serialize;
use std::fmt;
use std::ops::Deref;

/// Key of an open handle in a [`Session`](super::Session)
///
/// Assigned when a device is opened and never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HandleId(pub u32);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An endpoint descriptor bound to an open handle.
///
/// The binding is a lookup key only: it does not keep the handle open, and
/// I/O through it fails once the handle has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    descriptor: EndpointDescriptor,
    handle: HandleId,
}

impl Endpoint {
    pub(crate) fn new(descriptor: EndpointDescriptor, handle: HandleId) -> Self {
        Self { descriptor, handle }
    }

    pub fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn is_in(&self) -> bool {
        self.descriptor.direction() == Direction::In
    }
}

impl Deref for Endpoint {
    type Target = EndpointDescriptor;

    fn deref(&self) -> &EndpointDescriptor {
        &self.descriptor
    }
}
