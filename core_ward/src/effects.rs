use bevy::{math::Vec2, prelude::*};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::debug;

use crate::{resources::SimulationTick, ward_config::WardTuningHandle};

/// Cosmetic event emitted by the ward engine. Presentation is host business;
/// nothing downstream of these events affects behavior.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub enum WardEffect {
    Shockwave { at: Vec2, power: f32 },
    RevivalBurst { at: Vec2 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectRecord {
    pub tick: u64,
    pub effect: WardEffect,
    /// Jittered ray headings in radians, for shockwave presentation.
    pub rays: Vec<f32>,
}

/// Ring of recent effects for telemetry consumers.
#[derive(Resource, Debug, Clone, Default)]
pub struct WardEffectLog {
    pub entries: Vec<EffectRecord>,
}

impl WardEffectLog {
    pub fn push(&mut self, record: EffectRecord, limit: usize) {
        self.entries.push(record);
        if self.entries.len() > limit.max(1) {
            let overflow = self.entries.len() - limit.max(1);
            self.entries.drain(0..overflow);
        }
    }
}

/// Drains effect events into the telemetry log. Ray jitter is seeded from
/// the tick so replays stay deterministic.
pub fn record_effects(
    tick: Res<SimulationTick>,
    tuning: Res<WardTuningHandle>,
    mut events: EventReader<WardEffect>,
    mut log: ResMut<WardEffectLog>,
) {
    let limit = tuning.get().effect_log_limit;
    for effect in events.read() {
        let rays = match effect {
            WardEffect::Shockwave { power, .. } => {
                let mut rng = SmallRng::seed_from_u64(tick.0 ^ 0x57A2_D00D);
                let count = (power / 4.0).ceil().clamp(4.0, 16.0) as usize;
                (0..count)
                    .map(|_| rng.gen_range(0.0..std::f32::consts::TAU))
                    .collect()
            }
            WardEffect::RevivalBurst { .. } => Vec::new(),
        };
        debug!(
            target: "deathward::effects",
            event = "ward_effect",
            tick = tick.0,
            effect = ?effect,
            rays = rays.len(),
        );
        log.push(
            EffectRecord {
                tick: tick.0,
                effect: *effect,
                rays,
            },
            limit,
        );
    }
}
