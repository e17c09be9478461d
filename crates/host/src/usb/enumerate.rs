//! Enumeration entry point

use model::{Bus, Result, UsbBackend, build_busses};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rescan busses and devices, then build the descriptor tree.
///
/// Either rescan failing aborts with the transport's error. A build failure
/// anywhere in the tree fails the whole call; no partial tree is returned.
pub fn enumerate<B: UsbBackend + ?Sized>(backend: &mut B) -> Result<Vec<Arc<Bus>>> {
    let bus_count = backend.find_busses()?;
    let device_count = backend.find_devices()?;
    debug!(
        "Rescan found {} busses, {} devices",
        bus_count, device_count
    );

    let native = backend.busses()?;
    let busses = build_busses(&native).inspect_err(|e| {
        warn!("Failed to build descriptor tree: {}", e);
    })?;

    info!(
        "Enumerated {} busses with {} devices",
        busses.len(),
        busses.iter().map(|b| b.devices.len()).sum::<usize>()
    );
    Ok(busses)
}
