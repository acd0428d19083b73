//! Anchor-side list of the tags it has admitted
//!
//! Each admitted tag occupies one slot. The slot determines the short id the
//! tag uses for the rest of the session. Records are never removed; once the
//! registry is full, further tags are turned away.

use heapless::Vec;

use crate::{configs::MAX_DEVICES, mac, DeviceId, ShortId};

/// Index of a slot in the registry
pub type SlotIndex = usize;

/// A registered tag
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceRecord {
    /// The tag's identity
    pub device_id: DeviceId,
    /// The slot the tag occupies
    pub slot_index: SlotIndex,
}

/// Returned by [`DeviceRegistry::register`] when no slot is left
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegistryFull;

/// Bounded mapping from tag identities to slots
#[derive(Clone, Debug, Default)]
pub struct DeviceRegistry<const N: usize = MAX_DEVICES> {
    records: Vec<DeviceRecord, N>,
}

impl<const N: usize> DeviceRegistry<N> {
    /// Creates an empty registry
    pub fn new() -> Self {
        DeviceRegistry {
            records: Vec::new(),
        }
    }

    /// Admits a tag, or looks up the slot it already has
    ///
    /// Registering a known tag again returns its slot and leaves the registry
    /// unchanged.
    pub fn register(&mut self, device_id: DeviceId) -> Result<SlotIndex, RegistryFull> {
        if let Some(slot) = self.slot_of(device_id) {
            return Ok(slot);
        }

        let slot_index = self.records.len();
        self.records
            .push(DeviceRecord {
                device_id,
                slot_index,
            })
            .map_err(|_| RegistryFull)?;

        log::debug!("registered {:016x} in slot {}", device_id.0, slot_index);

        Ok(slot_index)
    }

    /// The slot of a registered tag
    pub fn slot_of(&self, device_id: DeviceId) -> Option<SlotIndex> {
        self.records
            .iter()
            .find(|record| record.device_id == device_id)
            .map(|record| record.slot_index)
    }

    /// The record in `slot`, if it is occupied
    pub fn get(&self, slot: SlotIndex) -> Option<&DeviceRecord> {
        self.records.get(slot)
    }

    /// Number of registered tags
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no tag is registered
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether all slots are taken
    pub fn is_full(&self) -> bool {
        self.records.is_full()
    }
}

/// The short id that belongs to a slot
pub fn slot_to_short_id(slot: SlotIndex) -> ShortId {
    mac::ShortAddress(slot as u16 + 1)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_twice_is_idempotent() {
        let mut registry = DeviceRegistry::<4>::new();
        let id = mac::ExtendedAddress(0x0102_0304_0506_0708);

        assert_eq!(registry.register(id), Ok(0));
        assert_eq!(registry.register(id), Ok(0));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn slots_are_handed_out_in_order() {
        let mut registry = DeviceRegistry::<4>::new();

        for i in 0..4 {
            assert_eq!(registry.register(mac::ExtendedAddress(100 + i)), Ok(i as usize));
        }
        assert_eq!(registry.slot_of(mac::ExtendedAddress(102)), Some(2));
        assert_eq!(registry.get(3).map(|r| r.device_id), Some(mac::ExtendedAddress(103)));
    }

    #[test]
    fn overflow_is_rejected() {
        let mut registry = DeviceRegistry::<MAX_DEVICES>::new();

        for i in 0..MAX_DEVICES as u64 {
            assert!(registry.register(mac::ExtendedAddress(i)).is_ok());
        }
        assert!(registry.is_full());
        assert_eq!(
            registry.register(mac::ExtendedAddress(MAX_DEVICES as u64)),
            Err(RegistryFull)
        );
        assert_eq!(registry.len(), MAX_DEVICES);

        // Known tags still get their slot when the registry is full.
        assert_eq!(registry.register(mac::ExtendedAddress(1)), Ok(1));
    }

    #[test]
    fn short_id_is_slot_plus_one() {
        assert_eq!(slot_to_short_id(0), mac::ShortAddress(1));
        assert_eq!(slot_to_short_id(3), mac::ShortAddress(4));
    }
}
