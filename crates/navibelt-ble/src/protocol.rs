//! BLE identifiers of the belt
//!
//! Belts advertise one of two primary services. The characteristics of the
//! control protocol live under the Bluetooth base UUID and are resolved with
//! `Characteristic::from_uuid`.

use navibelt_core::Characteristic;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service UUIDs
// ----------------------------------------------------------------------------

/// Primary service advertised by current firmware (16-bit `0xFE51`)
pub const BELT_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fe51_0000_1000_8000_00805f9b34fb);

/// Primary service advertised by early firmware
pub const LEGACY_BELT_SERVICE_UUID: Uuid = Uuid::from_u128(0x65333333_a115_11e2_9e9a_0800200ca100);

/// Services used to filter scans
pub const BELT_SERVICE_UUIDS: [Uuid; 2] = [BELT_SERVICE_UUID, LEGACY_BELT_SERVICE_UUID];

/// True if an advertisement looks like a belt
pub fn is_belt_advertisement(services: &[Uuid], local_name: Option<&str>, name_prefix: Option<&str>) -> bool {
    if !services.iter().any(|uuid| BELT_SERVICE_UUIDS.contains(uuid)) {
        return false;
    }
    match name_prefix {
        Some(prefix) => local_name.is_some_and(|name| name.starts_with(prefix)),
        None => true,
    }
}

/// Map a GATT characteristic UUID to a protocol characteristic
pub fn characteristic_for(uuid: Uuid) -> Option<Characteristic> {
    Characteristic::from_uuid(uuid)
}
