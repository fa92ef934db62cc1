//! Partition configuration and builder
//!
//! This module provides the options recognised by the partitioner and a
//! validating builder. Profiles only fill in the method/hardware axes that
//! were not set explicitly.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PartitionError, Result};
use crate::sizing::SizingPolicy;

/// Approximate kilometres per degree used to convert lon/lat area to km²
pub const KM_PER_DEGREE: f64 = 111.0;

/// Tessellation strategy used to cut a polygon into zones
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TessellationMethod {
    /// Random sites, Lloyd relaxation, clipped Voronoi cells
    #[default]
    Voronoi,
    /// Square lattice over the bounding box, clipped to the polygon
    Grid,
}

/// Which hardware the sampler should run on
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HardwarePreference {
    /// Never probe for an accelerator
    Cpu,
    /// Require an accelerator; warns and falls back to CPU if none is found
    Gpu,
    /// Use an accelerator when one can be probed
    #[default]
    Auto,
}

/// Speed/quality bias applied to unset method and hardware options
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Profile {
    /// Grid tessellation on the CPU
    Fast,
    /// Voronoi tessellation, accelerator if available
    Precise,
    /// No bias
    #[default]
    None,
}

impl fmt::Display for TessellationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TessellationMethod::Voronoi => write!(f, "voronoi"),
            TessellationMethod::Grid => write!(f, "grid"),
        }
    }
}

impl FromStr for TessellationMethod {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "voronoi" => Ok(TessellationMethod::Voronoi),
            "grid" => Ok(TessellationMethod::Grid),
            other => Err(PartitionError::InvalidConfig(format!(
                "unknown method '{}' (expected voronoi or grid)",
                other
            ))),
        }
    }
}

impl fmt::Display for HardwarePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwarePreference::Cpu => write!(f, "cpu"),
            HardwarePreference::Gpu => write!(f, "gpu"),
            HardwarePreference::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for HardwarePreference {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(HardwarePreference::Cpu),
            "gpu" => Ok(HardwarePreference::Gpu),
            "auto" => Ok(HardwarePreference::Auto),
            other => Err(PartitionError::InvalidConfig(format!(
                "unknown hardware '{}' (expected cpu, gpu or auto)",
                other
            ))),
        }
    }
}

impl FromStr for Profile {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Profile::Fast),
            "precise" => Ok(Profile::Precise),
            "none" | "" => Ok(Profile::None),
            other => Err(PartitionError::InvalidConfig(format!(
                "unknown profile '{}' (expected fast, precise or none)",
                other
            ))),
        }
    }
}

impl Profile {
    /// Fill in the method and hardware axes the caller left unset
    pub fn resolve(
        self,
        method: Option<TessellationMethod>,
        hardware: Option<HardwarePreference>,
    ) -> (TessellationMethod, HardwarePreference) {
        match self {
            Profile::Fast => (
                method.unwrap_or(TessellationMethod::Grid),
                hardware.unwrap_or(HardwarePreference::Cpu),
            ),
            Profile::Precise => (
                method.unwrap_or(TessellationMethod::Voronoi),
                hardware.unwrap_or(HardwarePreference::Auto),
            ),
            Profile::None => (method.unwrap_or_default(), hardware.unwrap_or_default()),
        }
    }
}

/// Default worker cap for the CPU pool: `min(16, cpu_count)`
pub fn default_cpu_workers() -> usize {
    num_cpus::get().clamp(1, 16)
}

/// Configuration for a partitioning run
///
/// Built with [`PartitionConfigBuilder`]. The same configuration (including
/// the seed) reproduces the same zones for the same input.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionConfig {
    /// Tessellation strategy after profile resolution
    pub method: TessellationMethod,

    /// Hardware preference after profile resolution
    pub hardware: HardwarePreference,

    /// Profile the configuration was built with
    pub profile: Profile,

    /// Lloyd relaxation rounds applied to Voronoi sites
    ///
    /// - 0: raw random sites
    /// - 5: default
    pub relaxation_iterations: usize,

    /// Sampling attempts allowed per requested point
    pub sample_attempt_multiplier: usize,

    /// Processing budget for one entity
    pub entity_timeout: Duration,

    /// Upper bound on CPU pool workers
    pub max_cpu_workers: usize,

    /// Base random seed; entity `i` of a batch uses `seed + i`
    pub seed: u64,

    /// Area/population thresholds for zone counts
    pub sizing: SizingPolicy,

    /// Kilometres per degree for the planar area approximation
    pub km_per_degree: f64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        PartitionConfigBuilder::new().build().unwrap()
    }
}

/// Builder for creating PartitionConfig with validation
///
/// # Example
///
/// ```rust
/// use rust_voronoi_zones::*;
///
/// let config = PartitionConfigBuilder::new()
///     .seed(42)
///     .method(TessellationMethod::Grid)
///     .relaxation_iterations(3)
///     .unwrap()
///     .build()
///     .unwrap();
/// assert_eq!(config.method, TessellationMethod::Grid);
/// ```
#[derive(Debug, Clone)]
pub struct PartitionConfigBuilder {
    method: Option<TessellationMethod>,
    hardware: Option<HardwarePreference>,
    profile: Profile,
    relaxation_iterations: usize,
    sample_attempt_multiplier: usize,
    entity_timeout: Duration,
    max_cpu_workers: usize,
    seed: Option<u64>,
    sizing: SizingPolicy,
    km_per_degree: f64,
}

impl PartitionConfigBuilder {
    /// Create a new builder with default values
    ///
    /// Defaults:
    /// - method / hardware: unset, resolved through the profile
    /// - profile: None (Voronoi, Auto)
    /// - relaxation_iterations: 5
    /// - sample_attempt_multiplier: 1000
    /// - entity_timeout: 600s
    /// - max_cpu_workers: min(16, cpu_count)
    /// - seed: random
    pub fn new() -> Self {
        Self {
            method: None,
            hardware: None,
            profile: Profile::None,
            relaxation_iterations: 5,
            sample_attempt_multiplier: 1000,
            entity_timeout: Duration::from_secs(600),
            max_cpu_workers: default_cpu_workers(),
            seed: None,
            sizing: SizingPolicy::default(),
            km_per_degree: KM_PER_DEGREE,
        }
    }

    /// Set the tessellation method explicitly (overrides the profile)
    pub fn method(mut self, method: TessellationMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the hardware preference explicitly (overrides the profile)
    pub fn hardware(mut self, hardware: HardwarePreference) -> Self {
        self.hardware = Some(hardware);
        self
    }

    /// Set the speed/quality profile
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the number of Lloyd relaxation rounds
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if iterations > 20
    pub fn relaxation_iterations(mut self, iterations: usize) -> Result<Self> {
        if iterations > 20 {
            return Err(PartitionError::InvalidConfig(format!(
                "relaxation iterations must be <= 20 (got {})",
                iterations
            )));
        }
        self.relaxation_iterations = iterations;
        Ok(self)
    }

    /// Set the sampling attempt budget per requested point
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if multiplier is 0
    pub fn sample_attempt_multiplier(mut self, multiplier: usize) -> Result<Self> {
        if multiplier == 0 {
            return Err(PartitionError::InvalidConfig(
                "sample attempt multiplier must be >= 1".to_string(),
            ));
        }
        self.sample_attempt_multiplier = multiplier;
        Ok(self)
    }

    /// Set the per-entity timeout
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the timeout is zero
    pub fn entity_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(PartitionError::InvalidConfig(
                "entity timeout must be positive".to_string(),
            ));
        }
        self.entity_timeout = timeout;
        Ok(self)
    }

    /// Set the CPU worker cap
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if workers is 0
    pub fn max_cpu_workers(mut self, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(PartitionError::InvalidConfig(
                "max cpu workers must be >= 1".to_string(),
            ));
        }
        self.max_cpu_workers = workers;
        Ok(self)
    }

    /// Set the base random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Replace the sizing thresholds
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the tiers are not ordered so that the count
    /// grows with area and population
    pub fn sizing(mut self, sizing: SizingPolicy) -> Result<Self> {
        if !sizing.is_monotone() {
            return Err(PartitionError::InvalidConfig(
                "sizing tiers must be ordered and non-decreasing".to_string(),
            ));
        }
        self.sizing = sizing;
        Ok(self)
    }

    /// Override the kilometres-per-degree factor
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the factor is not a positive finite number
    pub fn km_per_degree(mut self, km: f64) -> Result<Self> {
        if !(km.is_finite() && km > 0.0) {
            return Err(PartitionError::InvalidConfig(format!(
                "km per degree must be positive (got {})",
                km
            )));
        }
        self.km_per_degree = km;
        Ok(self)
    }

    /// Build the configuration
    ///
    /// If no seed was provided, draws one from the thread RNG.
    pub fn build(self) -> Result<PartitionConfig> {
        let (method, hardware) = self.profile.resolve(self.method, self.hardware);
        let seed = self.seed.unwrap_or_else(rand::random);

        Ok(PartitionConfig {
            method,
            hardware,
            profile: self.profile,
            relaxation_iterations: self.relaxation_iterations,
            sample_attempt_multiplier: self.sample_attempt_multiplier,
            entity_timeout: self.entity_timeout,
            max_cpu_workers: self.max_cpu_workers,
            seed,
            sizing: self.sizing,
            km_per_degree: self.km_per_degree,
        })
    }
}

impl Default for PartitionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = PartitionConfigBuilder::new().build().unwrap();
        assert_eq!(config.method, TessellationMethod::Voronoi);
        assert_eq!(config.hardware, HardwarePreference::Auto);
        assert_eq!(config.profile, Profile::None);
        assert_eq!(config.relaxation_iterations, 5);
        assert_eq!(config.sample_attempt_multiplier, 1000);
        assert_eq!(config.entity_timeout, Duration::from_secs(600));
        assert!(config.max_cpu_workers >= 1 && config.max_cpu_workers <= 16);
        assert_eq!(config.km_per_degree, KM_PER_DEGREE);
    }

    #[test]
    fn test_fast_profile() {
        let config = PartitionConfigBuilder::new()
            .profile(Profile::Fast)
            .build()
            .unwrap();
        assert_eq!(config.method, TessellationMethod::Grid);
        assert_eq!(config.hardware, HardwarePreference::Cpu);
    }

    #[test]
    fn test_precise_profile() {
        let config = PartitionConfigBuilder::new()
            .profile(Profile::Precise)
            .build()
            .unwrap();
        assert_eq!(config.method, TessellationMethod::Voronoi);
        assert_eq!(config.hardware, HardwarePreference::Auto);
    }

    #[test]
    fn test_explicit_axes_override_profile() {
        // All four hardware x method combinations stay reachable
        let config = PartitionConfigBuilder::new()
            .profile(Profile::Fast)
            .method(TessellationMethod::Voronoi)
            .hardware(HardwarePreference::Gpu)
            .build()
            .unwrap();
        assert_eq!(config.method, TessellationMethod::Voronoi);
        assert_eq!(config.hardware, HardwarePreference::Gpu);

        let config = PartitionConfigBuilder::new()
            .profile(Profile::Precise)
            .method(TessellationMethod::Grid)
            .hardware(HardwarePreference::Cpu)
            .build()
            .unwrap();
        assert_eq!(config.method, TessellationMethod::Grid);
        assert_eq!(config.hardware, HardwarePreference::Cpu);
    }

    #[test]
    fn test_builder_validation() {
        assert!(PartitionConfigBuilder::new().relaxation_iterations(21).is_err());
        assert!(PartitionConfigBuilder::new().sample_attempt_multiplier(0).is_err());
        assert!(PartitionConfigBuilder::new()
            .entity_timeout(Duration::ZERO)
            .is_err());
        assert!(PartitionConfigBuilder::new().max_cpu_workers(0).is_err());
        assert!(PartitionConfigBuilder::new().km_per_degree(-1.0).is_err());
        assert!(PartitionConfigBuilder::new().km_per_degree(f64::NAN).is_err());
    }

    #[test]
    fn test_seed_is_kept() {
        let config = PartitionConfigBuilder::new().seed(42).build().unwrap();
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_parse_options() {
        assert_eq!("grid".parse::<TessellationMethod>().unwrap(), TessellationMethod::Grid);
        assert_eq!("VORONOI".parse::<TessellationMethod>().unwrap(), TessellationMethod::Voronoi);
        assert_eq!("gpu".parse::<HardwarePreference>().unwrap(), HardwarePreference::Gpu);
        assert_eq!("precise".parse::<Profile>().unwrap(), Profile::Precise);
        assert!("hexagon".parse::<TessellationMethod>().is_err());
        assert!("tpu".parse::<HardwarePreference>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_serialization() {
        let config = PartitionConfigBuilder::new()
            .seed(12345)
            .profile(Profile::Fast)
            .build()
            .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"grid\""));
        let restored: PartitionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }
}
