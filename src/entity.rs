//! Input entities and output zones
//!
//! An [`Entity`] is a named administrative area (a municipality) with a
//! possibly multi-part boundary. Partitioning it yields [`Zone`]s, which are
//! grouped per region into a [`FeatureCollection`] for the output layer.

use geo::{MultiPolygon, Polygon};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::PartitionError;

/// Number of leading characters of a region code that name the region
pub const REGION_PREFIX_LEN: usize = 2;

/// A named area to be partitioned
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Display name, used as the prefix of every zone label
    pub name: String,

    /// Administrative code; the first two characters identify the region
    pub region_code: String,

    /// Boundary in lon/lat degrees
    pub geometry: MultiPolygon<f64>,

    /// Resident count, when known
    pub population: Option<u64>,
}

impl Entity {
    pub fn new(
        name: impl Into<String>,
        region_code: impl Into<String>,
        geometry: impl Into<MultiPolygon<f64>>,
    ) -> Self {
        Self {
            name: name.into(),
            region_code: region_code.into(),
            geometry: geometry.into(),
            population: None,
        }
    }

    pub fn with_population(mut self, population: u64) -> Self {
        self.population = Some(population);
        self
    }

    /// Region this entity belongs to
    pub fn region(&self) -> &str {
        region_prefix(&self.region_code)
    }

    /// Number of polygon parts
    #[inline]
    pub fn part_count(&self) -> usize {
        self.geometry.0.len()
    }
}

/// Leading region characters of an administrative code
fn region_prefix(code: &str) -> &str {
    match code.char_indices().nth(REGION_PREFIX_LEN) {
        Some((idx, _)) => &code[..idx],
        None => code,
    }
}

/// Entities whose code falls in the same region as `code`
pub fn entities_in_region<'a>(entities: &'a [Entity], code: &str) -> Vec<&'a Entity> {
    let prefix = region_prefix(code);
    entities
        .iter()
        .filter(|e| e.region_code.starts_with(prefix))
        .collect()
}

/// One output zone
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub id: Uuid,

    /// Hierarchical label, e.g. `"Toledo - Zone 3"`
    pub name: String,

    #[cfg_attr(feature = "serde", serde(rename = "isUnlocked"))]
    pub unlocked: bool,

    pub description: String,

    /// Zone boundary, a subset of its entity's geometry
    pub geometry: Polygon<f64>,
}

impl Zone {
    /// A locked zone with an empty description
    pub fn new(id: Uuid, name: String, geometry: Polygon<f64>) -> Self {
        Self {
            id,
            name,
            unlocked: false,
            description: String::new(),
            geometry,
        }
    }
}

/// Zones produced for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResult {
    /// Name of the partitioned entity
    pub entity: String,

    /// Zones in emission order
    pub zones: Vec<Zone>,

    /// Zone count the sizing heuristic asked for
    pub requested: usize,

    /// Zone count actually produced
    pub produced: usize,

    /// Non-fatal problems met along the way
    pub issues: Vec<PartitionError>,
}

/// Zones of a region, ready to be serialized as one document
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureCollection {
    pub region_name: String,
    pub features: Vec<Zone>,
}

impl FeatureCollection {
    /// Collect the zones of `results` in order
    pub fn from_results(
        region_name: impl Into<String>,
        results: impl IntoIterator<Item = PartitionResult>,
    ) -> Self {
        Self {
            region_name: region_name.into(),
            features: results.into_iter().flat_map(|r| r.zones).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::fixtures::unit_square;

    fn entity(code: &str) -> Entity {
        Entity::new(format!("E{}", code), code, unit_square())
    }

    #[test]
    fn test_new_entity() {
        let e = Entity::new("Toledo", "45168", unit_square()).with_population(85_000);
        assert_eq!(e.part_count(), 1);
        assert_eq!(e.population, Some(85_000));
        assert_eq!(e.region(), "45");
    }

    #[test]
    fn test_region_prefix() {
        assert_eq!(region_prefix("28079"), "28");
        assert_eq!(region_prefix("7"), "7");
        assert_eq!(region_prefix(""), "");
    }

    #[test]
    fn test_entities_in_region() {
        let entities = vec![entity("28079"), entity("45168"), entity("28005")];
        let madrid: Vec<&str> = entities_in_region(&entities, "28")
            .into_iter()
            .map(|e| e.region_code.as_str())
            .collect();
        assert_eq!(madrid, vec!["28079", "28005"]);

        assert_eq!(entities_in_region(&entities, "45000").len(), 1);
        assert!(entities_in_region(&entities, "08").is_empty());
    }

    #[test]
    fn test_zone_defaults() {
        let zone = Zone::new(Uuid::nil(), "A - Zone 1".to_string(), unit_square());
        assert!(!zone.unlocked);
        assert!(zone.description.is_empty());
    }

    #[test]
    fn test_feature_collection_from_results() {
        let result = |entity: &str, n: usize| PartitionResult {
            entity: entity.to_string(),
            zones: (1..=n)
                .map(|k| Zone::new(Uuid::nil(), format!("{} - Zone {}", entity, k), unit_square()))
                .collect(),
            requested: n,
            produced: n,
            issues: Vec::new(),
        };

        let collection =
            FeatureCollection::from_results("Madrid", vec![result("A", 2), result("B", 3)]);
        assert_eq!(collection.region_name, "Madrid");
        assert_eq!(collection.len(), 5);
        assert_eq!(collection.features[2].name, "B - Zone 1");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_zone_serialization() {
        let zone = Zone::new(Uuid::nil(), "A - Zone 1".to_string(), unit_square());
        let collection = FeatureCollection {
            region_name: "Madrid".to_string(),
            features: vec![zone],
        };

        let json = serde_json::to_string(&collection).unwrap();
        assert!(json.contains("\"region_name\":\"Madrid\""));
        assert!(json.contains("\"isUnlocked\":false"));
        assert!(json.contains("\"description\":\"\""));

        let restored: FeatureCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, collection);
    }
}
