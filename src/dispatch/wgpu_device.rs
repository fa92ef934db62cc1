//! `wgpu` compute backend
//!
//! A WGSL kernel fills a storage buffer with unit-square samples from a PCG
//! hash of the invocation index and the batch seed. Buffers are cached across
//! batches and dropped by [`Accelerator::release`].

use std::borrow::Cow;
use std::sync::Mutex;

use wgpu::util::DeviceExt;

use super::Accelerator;
use crate::error::{PartitionError, Result};

const WORKGROUP_SIZE: u32 = 64;

const SAMPLE_SHADER: &str = r#"
struct Params {
    seed_lo: u32,
    seed_hi: u32,
    count: u32,
    _pad: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read_write> samples: array<vec2<f32>>;

fn pcg(v: u32) -> u32 {
    let state = v * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn unit(h: u32) -> f32 {
    return f32(h >> 8u) / 16777216.0;
}

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= params.count) {
        return;
    }
    let hx = pcg(pcg(2u * i) ^ params.seed_lo);
    let hy = pcg(pcg(2u * i + 1u) ^ params.seed_hi);
    samples[i] = vec2<f32>(unit(hx), unit(hy));
}
"#;

/// Storage and readback buffers sized for `capacity` samples
struct BatchBuffers {
    capacity: usize,
    storage: wgpu::Buffer,
    staging: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Sampling accelerator on the first adapter `wgpu` can open
pub struct WgpuAccelerator {
    adapter_name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    params: wgpu::Buffer,
    buffers: Mutex<Option<BatchBuffers>>,
}

impl WgpuAccelerator {
    /// Open a device and compile the sampling kernel
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no adapter or device can be opened
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| PartitionError::DeviceUnavailable("no compatible adapter".to_string()))?;

        let adapter_name = adapter.get_info().name;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("zone sampler"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))
        .map_err(|e| PartitionError::DeviceUnavailable(e.to_string()))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("uniform samples"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SAMPLE_SHADER)),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("uniform samples"),
            layout: None,
            module: &module,
            entry_point: "main",
        });

        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sample params"),
            contents: bytemuck::cast_slice(&[0u32; 4]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        tracing::debug!(adapter = %adapter_name, "wgpu device opened");

        Ok(Self {
            adapter_name,
            device,
            queue,
            pipeline,
            params,
            buffers: Mutex::new(None),
        })
    }

    fn allocate(&self, capacity: usize) -> BatchBuffers {
        let size = (capacity * std::mem::size_of::<[f32; 2]>()) as wgpu::BufferAddress;

        let storage = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("samples"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("samples readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("samples"),
            layout: &self.pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: storage.as_entire_binding(),
                },
            ],
        });

        BatchBuffers {
            capacity,
            storage,
            staging,
            bind_group,
        }
    }

    fn run(&self, buffers: &BatchBuffers, count: usize, seed: u64) -> Result<Vec<[f32; 2]>> {
        let params = [seed as u32, (seed >> 32) as u32, count as u32, 0];
        self.queue
            .write_buffer(&self.params, 0, bytemuck::cast_slice(&params));

        let bytes = (count * std::mem::size_of::<[f32; 2]>()) as wgpu::BufferAddress;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sample batch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sample batch"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            pass.dispatch_workgroups((count as u32).div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        encoder.copy_buffer_to_buffer(&buffers.storage, 0, &buffers.staging, 0, bytes);
        self.queue.submit(Some(encoder.finish()));

        let slice = buffers.staging.slice(..bytes);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| PartitionError::DeviceRuntime(e.to_string()))?
            .map_err(|e| PartitionError::DeviceRuntime(e.to_string()))?;

        let samples = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, [f32; 2]>(&view).to_vec()
        };
        buffers.staging.unmap();

        Ok(samples)
    }
}

impl Accelerator for WgpuAccelerator {
    fn name(&self) -> String {
        self.adapter_name.clone()
    }

    fn uniform_batch(&self, count: usize, seed: u64) -> Result<Vec<[f32; 2]>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut cache = self
            .buffers
            .lock()
            .map_err(|_| PartitionError::DeviceRuntime("buffer cache poisoned".to_string()))?;
        if cache.as_ref().map_or(true, |b| b.capacity < count) {
            *cache = Some(self.allocate(count));
        }
        let buffers = cache
            .as_ref()
            .ok_or_else(|| PartitionError::DeviceRuntime("no sample buffers".to_string()))?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let samples = self.run(buffers, count, seed);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(PartitionError::DeviceRuntime(err.to_string()));
        }
        samples
    }

    fn release(&self) {
        if let Ok(mut cache) = self.buffers.lock() {
            if let Some(buffers) = cache.take() {
                buffers.storage.destroy();
                buffers.staging.destroy();
            }
        }
        self.device.poll(wgpu::Maintain::Wait);
    }
}
