use crate::components::Immunities;

/// Pre-ward snapshot of a creature's environmental immunities.
///
/// Captured once when a ward starts and written back exactly once when it
/// ends, so whatever the creature brought to the table survives protection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImmunitySnapshot {
    pub drowning: bool,
    pub weather: bool,
    pub hazard: bool,
}

impl ImmunitySnapshot {
    pub fn capture(immunities: &Immunities) -> Self {
        Self {
            drowning: immunities.drowning,
            weather: immunities.weather,
            hazard: immunities.hazard,
        }
    }

    /// Blanket environmental immunity for the duration of a ward.
    pub fn grant_all(immunities: &mut Immunities) {
        immunities.drowning = true;
        immunities.weather = true;
        immunities.hazard = true;
    }

    pub fn restore(&self, immunities: &mut Immunities) {
        immunities.drowning = self.drowning;
        immunities.weather = self.weather;
        immunities.hazard = self.hazard;
    }
}
