use common::{LicensePlate, Vehicle};
use tracing::debug;

/// Attach each plate to the first vehicle (in detection order) that contains
/// at least `overlap_ratio` of the plate's area. A vehicle matched by a later
/// plate takes that plate instead. Unmatched plates are dropped.
///
/// Returns how many plates were attached.
pub fn associate(vehicles: &mut [Vehicle], plates: Vec<LicensePlate>, overlap_ratio: f32) -> usize {
    let mut attached = 0;
    for plate in plates {
        match vehicles
            .iter_mut()
            .find(|vehicle| vehicle.contains_plate(&plate, overlap_ratio))
        {
            Some(vehicle) => {
                vehicle.license_plate = Some(plate);
                attached += 1;
            }
            None => debug!(region = ?plate.region, text = %plate.text, "plate outside every vehicle"),
        }
    }
    attached
}
