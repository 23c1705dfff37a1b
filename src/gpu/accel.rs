//! Batched Viterbi forward accelerator.
//!
//! One workgroup per sequence; sequences are dispatched in chunks sized to
//! the device's buffer limits. The accelerator fills the caller's
//! pre-allocated terminal posterior and memoization slabs; the backtrace
//! stays on the CPU (it is linear in F and branchy).

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::engine::{Batch, Model};
use crate::error::DecodeError;

use super::shaders;

/// Maximum workgroups per dispatch dimension.
const MAX_DISPATCH: usize = 65_535;

/// GPU params struct matching the WGSL Params layout.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GpuParams {
    batch: u32,
    frames: u32,
    states: u32,
    _pad: u32,
}

pub struct Accelerator {
    index: usize,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
}

impl Accelerator {
    /// Create the accelerator on the adapter with the given index.
    pub fn new(index: usize) -> Result<Self, DecodeError> {
        let (device, queue) = super::create_device(index)?;

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("viterbi_forward"),
            source: wgpu::ShaderSource::Wgsl(shaders::FORWARD.into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("viterbi_forward_pipeline"),
            layout: None,
            module: &shader_module,
            entry_point: Some("viterbi_forward"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            index,
            device,
            queue,
            pipeline,
        })
    }

    /// Run the forward pass for a whole batch, filling `delta_term` (B, S)
    /// and `memo` (B, F, S). Sequences are processed in chunks that fit
    /// within the device's max buffer size limits.
    pub fn forward(
        &self,
        model: &Model,
        batch: &Batch,
        delta_term: &mut [f32],
        memo: &mut [i32],
    ) -> Result<(), DecodeError> {
        let ext = batch.ext;
        let states = ext.states;
        let fs = ext.frames * states;

        let limits = self.device.limits();
        let max_buf = limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size));
        // Per-sequence footprint of the largest buffers: observation and
        // memo at F*S each, the delta ping-pong at 2*S.
        let per_seq = ((ext.frames + 2) * states * 4) as u64;
        let transition_bytes = (states * states * 4) as u64;
        if per_seq > max_buf || transition_bytes > max_buf {
            return Err(DecodeError::BackendUnavailable {
                device: self.index,
                reason: "sequence exceeds device buffer limits".into(),
            });
        }
        let chunk = ((max_buf / per_seq) as usize)
            .min(ext.batch)
            .min(MAX_DISPATCH)
            .max(1);

        let transition_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("transition_t"),
                contents: bytemuck::cast_slice(&model.log_transition_t),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let initial_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("initial"),
                contents: bytemuck::cast_slice(&model.log_initial),
                usage: wgpu::BufferUsages::STORAGE,
            });

        let mut offset = 0usize;
        while offset < ext.batch {
            let cb = chunk.min(ext.batch - offset);
            self.forward_chunk(
                batch,
                cb,
                offset,
                fs,
                &transition_buf,
                &initial_buf,
                &mut delta_term[offset * states..(offset + cb) * states],
                &mut memo[offset * fs..(offset + cb) * fs],
            )?;
            offset += cb;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn forward_chunk(
        &self,
        batch: &Batch,
        cb: usize,
        offset: usize,
        fs: usize,
        transition_buf: &wgpu::Buffer,
        initial_buf: &wgpu::Buffer,
        delta_term_out: &mut [f32],
        memo_out: &mut [i32],
    ) -> Result<(), DecodeError> {
        let ext = batch.ext;
        let states = ext.states;

        let obs_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("observation"),
                contents: bytemuck::cast_slice(&batch.obs[offset * fs..(offset + cb) * fs]),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let lens: Vec<u32> = batch.lens[offset..offset + cb]
            .iter()
            .map(|&l| l as u32)
            .collect();
        let lens_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lens"),
                contents: bytemuck::cast_slice(&lens),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let params = GpuParams {
            batch: cb as u32,
            frames: ext.frames as u32,
            states: states as u32,
            _pad: 0,
        };
        let params_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let delta_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("delta"),
            size: (cb * 2 * states * 4) as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let term_size = (cb * states * 4) as u64;
        let term_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("delta_term"),
            size: term_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let memo_size = (cb * fs * 4) as u64;
        let memo_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("memo"),
            size: memo_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let term_staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("term_staging"),
            size: term_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let memo_staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("memo_staging"),
            size: memo_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = self.pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("viterbi_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: obs_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: transition_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: initial_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: lens_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: delta_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: term_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: memo_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: params_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viterbi_chunk_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("viterbi_chunk_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(cb as u32, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&term_buf, 0, &term_staging, 0, term_size);
        encoder.copy_buffer_to_buffer(&memo_buf, 0, &memo_staging, 0, memo_size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let term_slice = term_staging.slice(..);
        let memo_slice = memo_staging.slice(..);
        let (term_tx, term_rx) = std::sync::mpsc::channel();
        term_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = term_tx.send(result);
        });
        let (memo_tx, memo_rx) = std::sync::mpsc::channel();
        memo_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = memo_tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        for rx in [&term_rx, &memo_rx] {
            rx.recv()
                .map_err(|_| self.readback_error("readback channel closed"))?
                .map_err(|e| self.readback_error(e))?;
        }

        {
            let data = term_slice.get_mapped_range();
            delta_term_out.copy_from_slice(bytemuck::cast_slice(&data));
        }
        term_staging.unmap();
        {
            let data = memo_slice.get_mapped_range();
            memo_out.copy_from_slice(bytemuck::cast_slice(&data));
        }
        memo_staging.unmap();
        Ok(())
    }

    fn readback_error(&self, reason: impl ToString) -> DecodeError {
        DecodeError::BackendUnavailable {
            device: self.index,
            reason: reason.to_string(),
        }
    }
}
