//! Zone count heuristic
//!
//! Maps an entity's area (and optionally its population) to the number of
//! zones it should be divided into. The thresholds are hand-tuned defaults;
//! they live in [`SizingPolicy`] so callers can override them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tiered thresholds used to pick a target zone count
///
/// Area tiers are checked in order: the first tier whose upper bound is
/// strictly greater than the area wins, otherwise `max_area_count` is used.
/// Population floors are checked in order: the first floor whose threshold is
/// strictly exceeded raises the count to at least its value.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SizingPolicy {
    /// `(area upper bound in km², zone count)`, ascending by bound
    pub area_tiers: Vec<(f64, usize)>,
    /// Zone count for areas beyond the last tier
    pub max_area_count: usize,
    /// `(population threshold, minimum zone count)`, descending by threshold
    pub population_floors: Vec<(u64, usize)>,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            area_tiers: vec![(10.0, 5), (50.0, 15), (100.0, 25), (500.0, 50)],
            max_area_count: 100,
            population_floors: vec![
                (500_000, 150),
                (200_000, 100),
                (100_000, 75),
                (50_000, 50),
            ],
        }
    }
}

impl SizingPolicy {
    /// Target number of zones for an entity of `area_km2` square kilometres
    pub fn target_zone_count(&self, area_km2: f64, population: Option<u64>) -> usize {
        let by_area = self
            .area_tiers
            .iter()
            .find(|(bound, _)| area_km2 < *bound)
            .map(|&(_, count)| count)
            .unwrap_or(self.max_area_count);

        let floor = population
            .and_then(|pop| {
                self.population_floors
                    .iter()
                    .find(|(threshold, _)| pop > *threshold)
                    .map(|&(_, count)| count)
            })
            .unwrap_or(0);

        by_area.max(floor)
    }

    /// Check that the tiers are ordered so the heuristic stays monotone
    pub(crate) fn is_monotone(&self) -> bool {
        let areas_ok = self
            .area_tiers
            .windows(2)
            .all(|w| w[0].0 < w[1].0 && w[0].1 <= w[1].1)
            && self
                .area_tiers
                .last()
                .map_or(true, |&(_, count)| count <= self.max_area_count);

        let floors_ok = self
            .population_floors
            .windows(2)
            .all(|w| w[0].0 > w[1].0 && w[0].1 >= w[1].1);

        areas_ok && floors_ok
    }
}

/// Target zone count using the default thresholds
pub fn target_zone_count(area_km2: f64, population: Option<u64>) -> usize {
    SizingPolicy::default().target_zone_count(area_km2, population)
}

/// Split an entity's zone count across its parts by area fraction
///
/// Each part receives `floor(total * part_area / sum_area)`, floored at 1.
/// A geometry with zero total area gives every part a single zone.
pub fn part_counts(total: usize, part_areas: &[f64]) -> Vec<usize> {
    let sum: f64 = part_areas.iter().sum();
    part_areas
        .iter()
        .map(|&area| {
            if sum > 0.0 && area.is_finite() {
                ((total as f64 * (area / sum)).floor() as usize).max(1)
            } else {
                1
            }
        })
        .collect()
}
