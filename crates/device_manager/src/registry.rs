//! Device registry
//!
//! Authoritative list of enumerated devices plus the selected subset.

use std::collections::HashSet;
use std::sync::Arc;

use contracts::{ContractError, DeviceIndex, DeviceRecord, HandleId, Result};
use metrics::gauge;
use tracing::{debug, info, instrument, warn};

use crate::backend::DeviceBackend;

/// Enumerated devices and the current selection
pub struct DeviceRegistry<B: DeviceBackend> {
    backend: Arc<B>,
    /// Hardware enumeration order
    all_devices: Vec<DeviceRecord>,
    /// Selected indices, in selection order
    selected: Vec<DeviceIndex>,
}

impl<B: DeviceBackend> DeviceRegistry<B> {
    /// Create an empty registry; call [`refresh`](Self::refresh) to populate
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            all_devices: Vec::new(),
            selected: Vec::new(),
        }
    }

    /// Re-enumerate devices.
    ///
    /// Replaces the whole list. Devices whose serial still enumerates keep
    /// their native handle; selections that no longer resolve are dropped.
    ///
    /// # Errors
    /// `EmptyData` if no device is attached; the registry is cleared.
    #[instrument(name = "device_registry_refresh", skip(self))]
    pub fn refresh(&mut self) -> Result<usize> {
        let count = self.backend.enumerate();
        gauge!("vision_devices_enumerated").set(count as f64);

        if count == 0 {
            self.all_devices.clear();
            self.selected.clear();
            warn!("no device connected");
            return Err(ContractError::empty_data("no device connected"));
        }

        let mut seen = HashSet::with_capacity(count);
        let mut fresh = Vec::with_capacity(count);
        for position in 0..count {
            let index = position as DeviceIndex;
            let mut serial = self.backend.serial(position);

            if !serial.is_empty() && !seen.insert(serial.clone()) {
                warn!(device_index = index, serial = %serial, "duplicate serial, marking unresolved");
                serial.clear();
            }

            let mut record = DeviceRecord::new(index, serial);
            if record.has_serial() {
                record.native_handle = self
                    .all_devices
                    .iter()
                    .find(|d| d.serial == record.serial)
                    .and_then(|d| d.native_handle);
            }
            fresh.push(record);
        }

        let previous = std::mem::replace(&mut self.all_devices, fresh);
        self.selected.retain(|index| {
            let before = previous.iter().find(|d| d.index == *index);
            let after = self.all_devices.iter().find(|d| d.index == *index);
            match (before, after) {
                (Some(b), Some(a)) => b.serial == a.serial,
                _ => false,
            }
        });

        for device in &self.all_devices {
            debug!(device_index = device.index, serial = %device.serial, "device enumerated");
        }
        info!(count, "device list refreshed");
        Ok(count)
    }

    /// Snapshot of all devices
    pub fn list(&self) -> Vec<DeviceRecord> {
        self.all_devices.clone()
    }

    pub fn len(&self) -> usize {
        self.all_devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_devices.is_empty()
    }

    /// Device by index
    pub fn find(&self, index: DeviceIndex) -> Option<DeviceRecord> {
        self.get(index).cloned()
    }

    pub(crate) fn get(&self, index: DeviceIndex) -> Option<&DeviceRecord> {
        self.all_devices.iter().find(|d| d.index == index)
    }

    /// Device by serial
    pub fn find_by_serial(&self, serial: &str) -> Option<DeviceRecord> {
        if serial.is_empty() {
            return None;
        }
        self.all_devices.iter().find(|d| d.serial == serial).cloned()
    }

    /// Add a device to the selection.
    ///
    /// Returns `false` for a negative or unknown index, or when the
    /// selection would outgrow the device list. Selecting twice is a no-op.
    pub fn select(&mut self, index: DeviceIndex) -> bool {
        if index < 0 {
            warn!(device_index = index, "select rejected: negative index");
            return false;
        }
        let Some(record) = self.get(index) else {
            warn!(device_index = index, "select rejected: device not found");
            return false;
        };
        let serial = record.serial.clone();

        if self.selected.contains(&index) {
            debug!(device_index = index, serial = %serial, "device already selected");
            return true;
        }
        if self.selected.len() + 1 > self.all_devices.len() {
            warn!(device_index = index, serial = %serial, "select rejected: selection full");
            return false;
        }

        self.selected.push(index);
        info!(device_index = index, serial = %serial, "device selected");
        true
    }

    /// Remove a device from the selection
    pub fn deselect(&mut self, index: DeviceIndex) -> bool {
        let Some(serial) = self.get(index).map(|d| d.serial.clone()) else {
            warn!(device_index = index, "deselect rejected: device not found");
            return false;
        };
        let Some(pos) = self.selected.iter().position(|i| *i == index) else {
            warn!(device_index = index, serial = %serial, "deselect rejected: not selected");
            return false;
        };

        self.selected.remove(pos);
        info!(device_index = index, serial = %serial, "device deselected");
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
        info!("selection cleared");
    }

    /// Selected devices, in selection order
    pub fn selected(&self) -> Vec<DeviceRecord> {
        self.selected
            .iter()
            .filter_map(|index| self.find(*index))
            .collect()
    }

    pub fn is_selected(&self, index: DeviceIndex) -> bool {
        self.selected.contains(&index)
    }

    pub fn selected_list_is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Log every device.
    ///
    /// # Errors
    /// `Cancelled` when the list is empty.
    pub fn log_devices(&self) -> Result<usize> {
        if self.all_devices.is_empty() {
            warn!("device list is empty");
            return Err(ContractError::cancelled("device list is empty"));
        }
        for device in &self.all_devices {
            info!(
                device_index = device.index,
                serial = %device.serial,
                nickname = %device.nickname,
                open = device.is_open(),
                selected = self.is_selected(device.index),
                "device"
            );
        }
        Ok(self.all_devices.len())
    }

    /// Record handle ownership; only the lifecycle controller calls this
    pub(crate) fn set_native_handle(&mut self, index: DeviceIndex, handle: Option<HandleId>) {
        if let Some(record) = self.all_devices.iter_mut().find(|d| d.index == index) {
            record.native_handle = handle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockBackend;
    use contracts::Status;

    fn registry(serials: &[&str]) -> (Arc<MockBackend>, DeviceRegistry<MockBackend>) {
        let backend = Arc::new(MockBackend::with_serials(serials.iter().copied()));
        let mut registry = DeviceRegistry::new(backend.clone());
        let _ = registry.refresh();
        (backend, registry)
    }

    #[test]
    fn test_refresh_builds_records() {
        let (_, registry) = registry(&["AB12", "CD34"]);
        let list = registry.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].index, 0);
        assert_eq!(list[1].serial, "CD34");
        assert_eq!(list[1].nickname, "Kinect-1");
        assert!(list.iter().all(|d| !d.is_open()));
    }

    #[test]
    fn test_refresh_empty_clears() {
        let (backend, mut registry) = registry(&["AB12"]);
        assert!(registry.select(0));

        backend.set_serials(Vec::<String>::new());
        let err = registry.refresh().unwrap_err();
        assert_eq!(err.status(), Status::EmptyData);
        assert!(registry.is_empty());
        assert!(registry.selected_list_is_empty());
        assert_eq!(registry.log_devices().unwrap_err().status(), Status::Cancelled);
    }

    #[test]
    fn test_duplicate_serial_is_unresolved() {
        let (_, registry) = registry(&["AB12", "AB12"]);
        assert_eq!(registry.find(0).unwrap().serial, "AB12");
        assert!(!registry.find(1).unwrap().has_serial());
    }

    #[test]
    fn test_select_rules() {
        let (_, mut registry) = registry(&["AB12", "CD34"]);
        assert!(!registry.select(-1));
        assert!(!registry.select(2));
        assert!(registry.select(1));
        assert!(registry.select(1));
        assert_eq!(registry.selected().len(), 1);
        assert!(registry.select(0));
        assert_eq!(
            registry.selected().iter().map(|d| d.index).collect::<Vec<_>>(),
            vec![1, 0]
        );
    }

    #[test]
    fn test_deselect_rules() {
        let (_, mut registry) = registry(&["AB12"]);
        assert!(!registry.deselect(0));
        assert!(!registry.deselect(4));
        registry.select(0);
        assert!(registry.deselect(0));
        assert!(registry.selected_list_is_empty());
    }

    #[test]
    fn test_refresh_prunes_stale_selection_and_keeps_handles() {
        let (backend, mut registry) = registry(&["AB12", "CD34"]);
        registry.select(0);
        registry.select(1);
        registry.set_native_handle(1, Some(HandleId(9)));

        // AB12 unplugged, CD34 moves to position 0
        backend.set_serials(["CD34"]);
        assert_eq!(registry.refresh().unwrap(), 1);

        let record = registry.find(0).unwrap();
        assert_eq!(record.serial, "CD34");
        assert_eq!(record.native_handle, Some(HandleId(9)));
        assert!(registry.selected_list_is_empty());
    }

    #[test]
    fn test_log_devices_counts() {
        let (_, registry) = registry(&["AB12", "CD34"]);
        assert_eq!(registry.log_devices().unwrap(), 2);
    }
}
