//! GPU compute backend.
//!
//! Uses wgpu for cross-platform acceleration (Metal, Vulkan, DX12). The
//! engine selects an adapter by index; the shader implements the batched
//! forward recurrence with the same tie-break rule as the CPU kernels, so
//! index outputs are bit-equal across backends.

pub mod accel;
pub(crate) mod shaders;

use crate::error::DecodeError;

/// Create a device and queue on the adapter with the given index.
pub fn create_device(index: usize) -> Result<(wgpu::Device, wgpu::Queue), DecodeError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
    if index >= adapters.len() {
        return Err(DecodeError::BackendUnavailable {
            device: index,
            reason: format!("{} adapter(s) present", adapters.len()),
        });
    }
    let adapter = adapters.swap_remove(index);
    pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("trellis-gpu"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
        },
        None,
    ))
    .map_err(|e| DecodeError::BackendUnavailable {
        device: index,
        reason: e.to_string(),
    })
}
