//! Synthetic occupancy source
//!
//! Terminal rung of the source chain. When both live sources are down the
//! pipeline still produces a full bundle by synthesizing occupancy for every
//! catalog facility from its demand profile. The curve is additive:
//! profile baseline, time-of-day adjustment, weekday adjustment, then seeded
//! jitter, clamped into a configurable band so values stay plausible.
//!
//! The time and weekday windows are local wall-clock values, taken from UTC
//! plus a fixed configured offset.
//!
//! With a fixed seed the output is fully reproducible, which the tests and
//! demo deployments rely on.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{SourceAdapter, SourceError};
use crate::models::{DemandProfile, Facility, RawRecord, SourceKind, Trend};
use crate::registry::Registry;

/// Coefficients of the synthetic occupancy curve, in percentage points
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationProfile {
    /// Baseline occupancy for business facilities
    pub base_business: f64,

    /// Baseline occupancy for shopping facilities
    pub base_shopping: f64,

    /// Baseline occupancy for mixed facilities
    pub base_mixed: f64,

    /// Adjustment during commute windows (07-09, 16-18 local)
    pub commute_peak_boost: f64,

    /// Adjustment during shopping windows (10-13, 15-19 local)
    pub shopping_peak_boost: f64,

    /// Overnight adjustment (22-05 local), typically negative
    pub night_drop: f64,

    /// Saturday adjustment
    pub saturday_boost: f64,

    /// Sunday adjustment, typically negative
    pub sunday_drop: f64,

    /// Maximum absolute jitter
    pub jitter_pct: f64,

    /// Lower clamp of the synthesized occupancy
    pub min_occupancy_pct: f64,

    /// Upper clamp of the synthesized occupancy
    pub max_occupancy_pct: f64,

    /// Hours added to UTC before sampling the windows (CET is 1, CEST is 2)
    pub utc_offset_hours: i64,

    /// Fixed RNG seed for reproducible output
    pub seed: Option<u64>,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            base_business: 45.0,
            base_shopping: 40.0,
            base_mixed: 42.0,
            commute_peak_boost: 18.0,
            shopping_peak_boost: 15.0,
            night_drop: -25.0,
            saturday_boost: 8.0,
            sunday_drop: -15.0,
            jitter_pct: 10.0,
            min_occupancy_pct: 10.0,
            max_occupancy_pct: 95.0,
            utc_offset_hours: 1,
            seed: None,
        }
    }
}

impl SimulationProfile {
    /// Baseline occupancy for a demand profile
    pub fn base_for(&self, profile: DemandProfile) -> f64 {
        match profile {
            DemandProfile::Business => self.base_business,
            DemandProfile::Shopping => self.base_shopping,
            DemandProfile::Mixed => self.base_mixed,
        }
    }

    /// Deterministic time-of-day adjustment for an hour (0-23)
    pub fn time_of_day_adjustment(&self, hour: u32, profile: DemandProfile) -> f64 {
        let commute = matches!(hour, 7..=9 | 16..=18);
        let shopping = matches!(hour, 10..=13 | 15..=19);
        let night = matches!(hour, 22..=23 | 0..=5);

        let mut adjustment = 0.0;
        if night {
            adjustment += self.night_drop;
        }

        match profile {
            DemandProfile::Business => {
                if commute {
                    adjustment += self.commute_peak_boost;
                }
            }
            DemandProfile::Shopping => {
                if shopping {
                    adjustment += self.shopping_peak_boost;
                }
            }
            DemandProfile::Mixed => {
                if commute {
                    adjustment += self.commute_peak_boost / 2.0;
                }
                if shopping {
                    adjustment += self.shopping_peak_boost / 2.0;
                }
            }
        }

        adjustment
    }

    /// Deterministic weekday adjustment
    pub fn weekday_adjustment(&self, weekday: Weekday) -> f64 {
        match weekday {
            Weekday::Sat => self.saturday_boost,
            Weekday::Sun => self.sunday_drop,
            _ => 0.0,
        }
    }
}

/// Synthesizes occupancy records for every catalog facility
pub struct SimulationAdapter {
    registry: Arc<Registry>,
    profile: SimulationProfile,
    rng: Mutex<ChaCha8Rng>,
}

impl SimulationAdapter {
    /// Create a new simulation adapter
    ///
    /// When the profile carries a seed the output is reproducible; otherwise
    /// the RNG is seeded from entropy.
    pub fn new(registry: Arc<Registry>, profile: SimulationProfile) -> Self {
        let rng = match profile.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            registry,
            profile,
            rng: Mutex::new(rng),
        }
    }

    /// Synthesize a record for every catalog facility. Cannot fail.
    pub async fn synthesize(&self, now: DateTime<Utc>) -> Vec<RawRecord> {
        let mut rng = self.rng.lock().await;

        // The demand windows are local wall-clock hours; captured_at stays UTC
        let local = now + self.local_offset();

        self.registry
            .facilities()
            .iter()
            .map(|facility| {
                let occupancy = self.occupancy_for(facility, local, &mut rng);
                let free_spaces =
                    ((1.0 - occupancy / 100.0) * f64::from(facility.capacity)).round() as i64;

                RawRecord {
                    facility_id: Some(facility.id.clone()),
                    name: facility.name.clone(),
                    capacity: i64::from(facility.capacity),
                    free_spaces,
                    trend: Some(self.trend_for(facility, local)),
                    captured_at: now,
                    source: SourceKind::Simulation,
                }
            })
            .collect()
    }

    fn local_offset(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.profile.utc_offset_hours).unwrap_or_default()
    }

    fn occupancy_for(
        &self,
        facility: &Facility,
        local: DateTime<Utc>,
        rng: &mut ChaCha8Rng,
    ) -> f64 {
        let p = &self.profile;

        let deterministic = p.base_for(facility.demand_profile)
            + p.time_of_day_adjustment(local.hour(), facility.demand_profile)
            + p.weekday_adjustment(local.weekday());

        let jitter = if p.jitter_pct > 0.0 {
            rng.gen_range(-p.jitter_pct..=p.jitter_pct)
        } else {
            0.0
        };

        (deterministic + jitter).clamp(p.min_occupancy_pct, p.max_occupancy_pct)
    }

    /// Trend from the deterministic slope of the curve one hour ahead
    fn trend_for(&self, facility: &Facility, local: DateTime<Utc>) -> Trend {
        let here = self
            .profile
            .time_of_day_adjustment(local.hour(), facility.demand_profile);
        let next = self
            .profile
            .time_of_day_adjustment((local.hour() + 1) % 24, facility.demand_profile);

        match next.partial_cmp(&here) {
            Some(Ordering::Greater) => Trend::Increasing,
            Some(Ordering::Less) => Trend::Decreasing,
            _ => Trend::Constant,
        }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for SimulationAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Simulation
    }

    async fn acquire(&self) -> Result<Vec<RawRecord>, SourceError> {
        Ok(self.synthesize(Utc::now()).await)
    }
}
