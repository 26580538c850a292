// This file is part of Nitrogen.
//
// Nitrogen is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Nitrogen is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Nitrogen.  If not, see <http://www.gnu.org/licenses/>.
use crate::{
    backend::{ComputeBackend, Dispatch, PassUniforms},
    earth_consts::AtmosphereParameters,
    schedule::PassKind,
    shader_source::kernel_source,
    table_helpers::{TableDimensions, TableHelpers},
    tables::{TableKind, Tables},
};
use anyhow::{anyhow, ensure, Result};
use gpu::{Gpu, GpuConfig};
use log::{debug, trace};
use std::{collections::HashMap, mem, num::NonZeroU64};
use zerocopy::AsBytes;

// Note: must match the workgroup size declared in every kernel.
pub const BLOCK_SIZE: u32 = 8;

pub const TABLE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

pub struct GpuTable {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    extent: wgpu::Extent3d,
}

impl GpuTable {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        self.extent
    }
}

struct Kernel {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

pub struct GpuBackend {
    gpu: Gpu,
    kernels: HashMap<PassKind, Kernel>,
    params_buffer: Option<wgpu::Buffer>,
}

fn view_dimension(kind: TableKind) -> wgpu::TextureViewDimension {
    if kind.is_volume() {
        wgpu::TextureViewDimension::D3
    } else {
        wgpu::TextureViewDimension::D2
    }
}

fn uniform(binding: u32, min_binding_size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(min_binding_size as u64),
        },
        count: None,
    }
}

fn texture(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension,
        },
        count: None,
    }
}

fn storage_texture(
    binding: u32,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: TABLE_FORMAT,
            view_dimension,
        },
        count: None,
    }
}

impl GpuBackend {
    pub fn new(gpu: Gpu) -> Self {
        Self {
            gpu,
            kernels: HashMap::new(),
            params_buffer: None,
        }
    }

    pub fn new_headless(config: GpuConfig) -> Result<Self> {
        Ok(Self::new(Gpu::new_headless(config)?))
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    fn build_kernel(&self, kind: PassKind, dims: &TableDimensions) -> Result<Kernel> {
        let device = self.gpu.device();
        let label = format!("atmosphere-{}", kind.name());
        let module = self
            .gpu
            .create_shader_module(&format!("{}.wgsl", label), &kernel_source(kind, dims))?;

        let mut entries = vec![
            uniform(0, mem::size_of::<AtmosphereParameters>()), // atmosphere
            uniform(1, mem::size_of::<PassUniforms>()),         // pass_uniforms
        ];
        let mut binding = 2;
        for input in kind.inputs() {
            entries.push(texture(binding, view_dimension(input.kind())));
            binding += 1;
        }
        for output in kind.outputs() {
            entries.push(storage_texture(binding, view_dimension(output.kind())));
            binding += 1;
        }
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{}-bind-group-layout", label)),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}-pipeline-layout", label)),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = self
            .gpu
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&format!("{}-pipeline", label)),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: "main",
            })?;
        Ok(Kernel {
            bind_group_layout,
            pipeline,
        })
    }
}

impl ComputeBackend for GpuBackend {
    type Table = GpuTable;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn create_table(&mut self, kind: TableKind, extent: wgpu::Extent3d) -> Result<GpuTable> {
        trace!("allocating {} {:?}", kind.label(), extent);
        let dimension = if kind.is_volume() {
            wgpu::TextureDimension::D3
        } else {
            wgpu::TextureDimension::D2
        };
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(kind.label()),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: TABLE_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(kind.label()),
            format: Some(TABLE_FORMAT),
            dimension: Some(view_dimension(kind)),
            ..Default::default()
        });
        Ok(GpuTable {
            texture,
            view,
            extent,
        })
    }

    fn build_kernels(&mut self, dims: &TableDimensions) -> Result<()> {
        dims.validate()?;
        let mut kernels = HashMap::new();
        for kind in PassKind::ALL {
            kernels.insert(kind, self.build_kernel(kind, dims)?);
        }
        debug!(
            "built {} atmosphere kernels on {}",
            kernels.len(),
            self.gpu.adapter_info().name
        );
        self.kernels = kernels;
        Ok(())
    }

    fn upload_parameters(&mut self, params: &AtmosphereParameters) -> Result<()> {
        self.params_buffer = Some(self.gpu.push_data(
            "atmosphere-params-buffer",
            params,
            wgpu::BufferUsages::UNIFORM,
        ));
        Ok(())
    }

    fn dispatch(&mut self, dispatch: &Dispatch, tables: &mut Tables<GpuTable>) -> Result<()> {
        let pass = dispatch.pass;
        let kernel = self
            .kernels
            .get(&pass.kind)
            .ok_or_else(|| anyhow!("kernels must be built before dispatch of {}", pass))?;
        let params_buffer = self
            .params_buffer
            .as_ref()
            .ok_or_else(|| anyhow!("parameters must be uploaded before dispatch"))?;
        let uniforms_buffer = self.gpu.push_data(
            "atmosphere-pass-uniforms-buffer",
            &dispatch.uniforms,
            wgpu::BufferUsages::UNIFORM,
        );

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: uniforms_buffer.as_entire_binding(),
            },
        ];
        for (binding, table) in pass.inputs().iter().chain(pass.outputs()).enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32 + 2,
                resource: wgpu::BindingResource::TextureView(tables.get(*table).view()),
            });
        }
        let bind_group = self
            .gpu
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("atmosphere-pass-bind-group"),
                layout: &kernel.bind_group_layout,
                entries: &entries,
            });

        let mut encoder =
            self.gpu
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("atmosphere-pass-command-encoder"),
                });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(pass.kind.name()),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&kernel.pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(
                (dispatch.width + BLOCK_SIZE - 1) / BLOCK_SIZE,
                (dispatch.height + BLOCK_SIZE - 1) / BLOCK_SIZE,
                1,
            );
        }
        self.gpu.queue().submit(vec![encoder.finish()]);
        Ok(())
    }

    fn barrier(&mut self) -> Result<()> {
        self.gpu.finish();
        Ok(())
    }

    fn read_table(&mut self, table: &GpuTable) -> Result<Vec<f32>> {
        let bytes = self
            .gpu
            .download_texture(&table.texture, table.extent, TABLE_FORMAT)?;
        let mut texels = vec![0f32; TableHelpers::float_count(table.extent)];
        ensure!(
            bytes.len() == texels.as_bytes().len(),
            "table download size mismatch: got {} bytes",
            bytes.len()
        );
        texels.as_bytes_mut().copy_from_slice(&bytes);
        Ok(texels)
    }

    fn write_table(&mut self, table: &mut GpuTable, texels: &[f32]) -> Result<()> {
        self.gpu
            .upload_texture(&table.texture, table.extent, TABLE_FORMAT, texels.as_bytes())
    }
}
