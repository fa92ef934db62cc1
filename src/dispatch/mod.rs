//! Hardware selection for point sampling
//!
//! A [`DispatchController`] starts `Unselected` and settles on `Cpu` or `Gpu`
//! the first time it is asked for a decision. The resulting
//! [`DispatchDecision`] is immutable and shared by every entity of a batch.

#[cfg(feature = "gpu")]
mod wgpu_device;

#[cfg(feature = "gpu")]
pub use wgpu_device::WgpuAccelerator;

use std::fmt;
use std::sync::Arc;

use crate::config::HardwarePreference;
use crate::error::{PartitionError, Result};
use crate::sampling::{CpuSampler, GpuSampler, PointSampler};

/// A device that can generate uniform random samples in bulk
pub trait Accelerator: Send + Sync {
    /// Human-readable device name
    fn name(&self) -> String;

    /// Generate `count` points uniformly distributed in the unit square
    ///
    /// The same `seed` always yields the same batch.
    fn uniform_batch(&self, count: usize, seed: u64) -> Result<Vec<[f32; 2]>>;

    /// Free device memory held between batches
    fn release(&self) {}
}

/// Looks for an accelerator on the host
pub trait DeviceProbe {
    fn probe(&self) -> Result<Arc<dyn Accelerator>>;
}

/// Probe for the real hardware of this machine
///
/// Without the `gpu` feature no device is ever found.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl DeviceProbe for SystemProbe {
    #[cfg(feature = "gpu")]
    fn probe(&self) -> Result<Arc<dyn Accelerator>> {
        let device = WgpuAccelerator::new()?;
        Ok(Arc::new(device))
    }

    #[cfg(not(feature = "gpu"))]
    fn probe(&self) -> Result<Arc<dyn Accelerator>> {
        Err(PartitionError::DeviceUnavailable(
            "built without the `gpu` feature".to_string(),
        ))
    }
}

/// Hardware the controller has settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HardwareState {
    /// No decision taken yet
    #[default]
    Unselected,
    Cpu,
    Gpu,
}

impl fmt::Display for HardwareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareState::Unselected => write!(f, "unselected"),
            HardwareState::Cpu => write!(f, "cpu"),
            HardwareState::Gpu => write!(f, "gpu"),
        }
    }
}

/// Outcome of hardware selection, fixed for the rest of a batch
#[derive(Clone)]
pub struct DispatchDecision {
    state: HardwareState,
    accelerator: Option<Arc<dyn Accelerator>>,
    warning: Option<String>,
}

impl fmt::Debug for DispatchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchDecision")
            .field("state", &self.state)
            .field("accelerator", &self.accelerator.as_ref().map(|a| a.name()))
            .field("warning", &self.warning)
            .finish()
    }
}

impl DispatchDecision {
    /// Host-only decision
    pub fn cpu() -> Self {
        Self {
            state: HardwareState::Cpu,
            accelerator: None,
            warning: None,
        }
    }

    /// Decision that samples on `accelerator`
    pub fn gpu(accelerator: Arc<dyn Accelerator>) -> Self {
        Self {
            state: HardwareState::Gpu,
            accelerator: Some(accelerator),
            warning: None,
        }
    }

    #[inline]
    pub fn state(&self) -> HardwareState {
        self.state
    }

    /// Degradation warning, set when a GPU was required but not found
    #[inline]
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    #[inline]
    pub fn accelerator(&self) -> Option<&Arc<dyn Accelerator>> {
        self.accelerator.as_ref()
    }

    /// Sampler matching the selected hardware
    pub fn sampler(&self, attempt_multiplier: usize) -> Arc<dyn PointSampler> {
        match &self.accelerator {
            Some(accelerator) => Arc::new(GpuSampler::new(accelerator.clone(), attempt_multiplier)),
            None => Arc::new(CpuSampler::new(attempt_multiplier)),
        }
    }

    /// Free accelerator memory, a no-op on the CPU path
    pub fn release(&self) {
        if let Some(accelerator) = &self.accelerator {
            accelerator.release();
        }
    }
}

/// Hardware selection state machine
#[derive(Debug)]
pub struct DispatchController {
    preference: HardwarePreference,
    decision: Option<DispatchDecision>,
}

impl DispatchController {
    pub fn new(preference: HardwarePreference) -> Self {
        Self {
            preference,
            decision: None,
        }
    }

    pub fn state(&self) -> HardwareState {
        self.decision
            .as_ref()
            .map_or(HardwareState::Unselected, DispatchDecision::state)
    }

    /// Settle on a hardware path, probing at most once
    ///
    /// - `Cpu` never probes
    /// - `Gpu` falls back to CPU with a single warning if the probe fails
    /// - `Auto` falls back to CPU quietly
    ///
    /// Later calls return the first decision unchanged.
    pub fn select(&mut self, probe: &dyn DeviceProbe) -> DispatchDecision {
        if let Some(decision) = &self.decision {
            return decision.clone();
        }

        let decision = match self.preference {
            HardwarePreference::Cpu => DispatchDecision::cpu(),
            HardwarePreference::Gpu | HardwarePreference::Auto => match probe.probe() {
                Ok(accelerator) => {
                    tracing::info!(device = %accelerator.name(), "sampling on accelerator");
                    DispatchDecision::gpu(accelerator)
                }
                Err(err) if self.preference == HardwarePreference::Gpu => {
                    let message = format!("GPU requested but unavailable, using CPU: {}", err);
                    tracing::warn!(error = %err, "GPU requested but unavailable, using CPU");
                    DispatchDecision {
                        warning: Some(message),
                        ..DispatchDecision::cpu()
                    }
                }
                Err(err) => {
                    tracing::info!(error = %err, "no accelerator found, using CPU");
                    DispatchDecision::cpu()
                }
            },
        };

        tracing::info!(
            preference = %self.preference,
            state = %decision.state(),
            "hardware selected"
        );
        self.decision = Some(decision.clone());
        decision
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Probes and accelerators for hosts with or without a device

    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that never finds a device
    #[derive(Default)]
    pub struct NoDevice {
        pub probes: AtomicUsize,
    }

    impl DeviceProbe for NoDevice {
        fn probe(&self) -> Result<Arc<dyn Accelerator>> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Err(PartitionError::DeviceUnavailable("no adapter".to_string()))
        }
    }

    /// Probe that hands out a shared accelerator
    pub struct WithDevice(pub Arc<HostAccelerator>);

    impl DeviceProbe for WithDevice {
        fn probe(&self) -> Result<Arc<dyn Accelerator>> {
            let device: Arc<dyn Accelerator> = self.0.clone();
            Ok(device)
        }
    }

    /// Accelerator emulated on the host with a seeded generator
    #[derive(Default)]
    pub struct HostAccelerator {
        pub batches: AtomicUsize,
        pub releases: AtomicUsize,
        /// Fail every batch after this many have succeeded
        pub fail_after: Option<usize>,
    }

    impl HostAccelerator {
        pub fn failing_after(batches: usize) -> Self {
            Self {
                fail_after: Some(batches),
                ..Self::default()
            }
        }

        pub fn batches(&self) -> usize {
            self.batches.load(Ordering::SeqCst)
        }

        pub fn releases(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }
    }

    impl Accelerator for HostAccelerator {
        fn name(&self) -> String {
            "host emulator".to_string()
        }

        fn uniform_batch(&self, count: usize, seed: u64) -> Result<Vec<[f32; 2]>> {
            let served = self.batches.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.map_or(false, |limit| served >= limit) {
                return Err(PartitionError::DeviceRuntime("device lost".to_string()));
            }
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            Ok((0..count).map(|_| [rng.gen::<f32>(), rng.gen::<f32>()]).collect())
        }

        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_starts_unselected() {
        let controller = DispatchController::new(HardwarePreference::Auto);
        assert_eq!(controller.state(), HardwareState::Unselected);
    }

    #[test]
    fn test_cpu_never_probes() {
        let probe = NoDevice::default();
        let mut controller = DispatchController::new(HardwarePreference::Cpu);
        let decision = controller.select(&probe);

        assert_eq!(decision.state(), HardwareState::Cpu);
        assert_eq!(controller.state(), HardwareState::Cpu);
        assert_eq!(probe.probes.load(Ordering::SeqCst), 0);
        assert!(decision.warning().is_none());
    }

    #[test]
    fn test_forced_gpu_without_device_warns_once() {
        let probe = NoDevice::default();
        let mut controller = DispatchController::new(HardwarePreference::Gpu);

        let first = controller.select(&probe);
        let second = controller.select(&probe);

        assert_eq!(first.state(), HardwareState::Cpu);
        assert!(first.warning().is_some());
        assert_eq!(second.warning(), first.warning());
        assert_eq!(probe.probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auto_without_device_is_quiet() {
        let probe = NoDevice::default();
        let decision = DispatchController::new(HardwarePreference::Auto).select(&probe);

        assert_eq!(decision.state(), HardwareState::Cpu);
        assert!(decision.warning().is_none());
        assert!(decision.accelerator().is_none());
    }

    #[test]
    fn test_auto_with_device_selects_gpu() {
        let device = Arc::new(HostAccelerator::default());
        let probe = WithDevice(device.clone());
        let decision = DispatchController::new(HardwarePreference::Auto).select(&probe);

        assert_eq!(decision.state(), HardwareState::Gpu);
        assert_eq!(decision.sampler(1000).name(), "gpu");

        decision.release();
        assert_eq!(device.releases(), 1);
    }

    #[test]
    fn test_cpu_decision_sampler() {
        let decision = DispatchDecision::cpu();
        assert_eq!(decision.sampler(10).name(), "cpu");
        decision.release();
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_system_probe_without_feature() {
        assert!(matches!(
            SystemProbe.probe(),
            Err(PartitionError::DeviceUnavailable(_))
        ));
    }
}
