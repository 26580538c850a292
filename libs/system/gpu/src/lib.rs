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

// Note: re-export so that dependent crates use the same wgpu we do.
pub use wgpu;

use anyhow::{anyhow, bail, ensure, Result};
use futures::executor::block_on;
use log::{info, trace};
use parking_lot::Mutex;
use std::{mem, str::FromStr, sync::Arc};
use structopt::StructOpt;
use wgpu::util::DeviceExt;
use zerocopy::AsBytes;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerPreference {
    LowPower,
    HighPerformance,
}

impl FromStr for PowerPreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "low" | "low-power" => Self::LowPower,
            "high" | "high-performance" => Self::HighPerformance,
            _ => bail!("unknown power preference {}; expected low or high", s),
        })
    }
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(pref: PowerPreference) -> Self {
        match pref {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

#[derive(Clone, Debug, StructOpt)]
pub struct GpuOpts {
    /// Which class of adapter to prefer: low or high
    #[structopt(long, default_value = "high")]
    gpu_power: PowerPreference,

    /// Use the software fallback adapter, if one is available.
    #[structopt(long)]
    gpu_fallback: bool,
}

#[derive(Clone, Debug)]
pub struct GpuConfig {
    power_preference: PowerPreference,
    force_fallback_adapter: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

impl GpuConfig {
    pub fn from_opts(opts: &GpuOpts) -> Self {
        Self {
            power_preference: opts.gpu_power,
            force_fallback_adapter: opts.gpu_fallback,
        }
    }
}

/// A headless device and queue. We only ever do compute and copies,
/// so there is no surface or swap chain to manage.
pub struct Gpu {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl Gpu {
    pub fn new_headless(config: GpuConfig) -> Result<Self> {
        block_on(Self::new_async(config))
    }

    pub async fn new_async(config: GpuConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference.into(),
                force_fallback_adapter: config.force_fallback_adapter,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("no suitable graphics adapter"))?;
        let info = adapter.get_info();
        info!(
            "using adapter {} ({:?} on {:?})",
            info.name, info.device_type, info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gpu-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                },
                None,
            )
            .await?;

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    /// Tests that need real hardware call this and skip when it fails.
    pub fn for_test() -> Result<Self> {
        Self::new_headless(GpuConfig::default())
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn push_data<T: AsBytes>(
        &self,
        label: &'static str,
        data: &T,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        let size = mem::size_of::<T>() as wgpu::BufferAddress;
        trace!("uploading {} with {} bytes", label, size);
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data.as_bytes(),
                usage,
            })
    }

    /// Build a shader module from wgsl source, surfacing parse and
    /// validation failures as errors instead of device loss.
    pub fn create_shader_module(&self, label: &str, wgsl: &str) -> Result<wgpu::ShaderModule> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            bail!("failed to build shader module {}: {}", label, err);
        }
        Ok(module)
    }

    /// Wrap pipeline creation so that layout mismatches are reported
    /// against the pipeline that caused them.
    pub fn create_compute_pipeline(
        &self,
        desc: &wgpu::ComputePipelineDescriptor,
    ) -> Result<wgpu::ComputePipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_compute_pipeline(desc);
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            bail!(
                "failed to build compute pipeline {}: {}",
                desc.label.unwrap_or("<unnamed>"),
                err
            );
        }
        Ok(pipeline)
    }

    pub fn stride_for_row_size(size: u32) -> u32 {
        (size + wgpu::COPY_BYTES_PER_ROW_ALIGNMENT - 1) / wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
    }

    /// Block until all submitted work has retired.
    pub fn finish(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Replace the full contents of `texture` with tightly packed `data`.
    pub fn upload_texture(
        &self,
        texture: &wgpu::Texture,
        extent: wgpu::Extent3d,
        format: wgpu::TextureFormat,
        data: &[u8],
    ) -> Result<()> {
        let texel_size = texture_format_size(format)?;
        let bytes_per_row = extent.width * texel_size;
        let expect = bytes_per_row as usize
            * extent.height as usize
            * extent.depth_or_array_layers as usize;
        ensure!(
            data.len() == expect,
            "texture upload size mismatch: got {} bytes, expected {}",
            data.len(),
            expect
        );
        trace!("uploading {} bytes to texture {:?}", data.len(), extent);
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(extent.height),
            },
            extent,
        );
        self.queue.submit(None);
        self.finish();
        Ok(())
    }

    /// Read back the full contents of `texture`, with the copy row
    /// padding removed.
    pub fn download_texture(
        &self,
        texture: &wgpu::Texture,
        extent: wgpu::Extent3d,
        format: wgpu::TextureFormat,
    ) -> Result<Vec<u8>> {
        let texel_size = texture_format_size(format)?;
        let row_size = extent.width * texel_size;
        let bytes_per_row = Self::stride_for_row_size(row_size);
        let rows = extent.height * extent.depth_or_array_layers;
        let download_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture-download-buffer"),
            size: u64::from(bytes_per_row) * u64::from(rows),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture-download-command-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &download_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(extent.height),
                },
            },
            extent,
        );
        self.queue.submit(vec![encoder.finish()]);

        let status = Arc::new(Mutex::new(None));
        let status_ref = status.clone();
        download_buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                *status_ref.lock() = Some(result);
            });
        while status.lock().is_none() {
            self.finish();
        }
        if let Some(Err(err)) = status.lock().take() {
            bail!("failed to map texture download buffer: {}", err);
        }

        let mut out = Vec::with_capacity((row_size * rows) as usize);
        {
            let mapping = download_buffer.slice(..).get_mapped_range();
            for row in mapping.chunks(bytes_per_row as usize) {
                out.extend_from_slice(&row[..row_size as usize]);
            }
        }
        download_buffer.unmap();
        Ok(out)
    }
}

pub fn texture_format_size(texture_format: wgpu::TextureFormat) -> Result<u32> {
    Ok(match texture_format {
        wgpu::TextureFormat::R8Unorm => 1,
        wgpu::TextureFormat::R32Float => 4,
        wgpu::TextureFormat::Rgba8Unorm => 4,
        wgpu::TextureFormat::Rg32Float => 8,
        wgpu::TextureFormat::Rgba16Float => 8,
        wgpu::TextureFormat::Rgba32Float => 16,
        _ => bail!("texture format size not known for {:?}", texture_format),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stride_rounds_to_copy_alignment() {
        assert_eq!(Gpu::stride_for_row_size(1), 256);
        assert_eq!(Gpu::stride_for_row_size(256), 256);
        assert_eq!(Gpu::stride_for_row_size(257), 512);
        assert_eq!(Gpu::stride_for_row_size(64 * 16), 1024);
    }

    #[test]
    fn test_texture_format_size() -> Result<()> {
        assert_eq!(texture_format_size(wgpu::TextureFormat::Rgba32Float)?, 16);
        assert!(texture_format_size(wgpu::TextureFormat::Depth32Float).is_err());
        Ok(())
    }

    #[test]
    fn test_power_preference_from_str() -> Result<()> {
        assert_eq!(
            "low".parse::<PowerPreference>()?,
            PowerPreference::LowPower
        );
        assert_eq!(
            "high-performance".parse::<PowerPreference>()?,
            PowerPreference::HighPerformance
        );
        assert!("medium".parse::<PowerPreference>().is_err());
        Ok(())
    }

    #[test]
    fn test_texture_round_trip() -> Result<()> {
        let gpu = match Gpu::for_test() {
            Ok(gpu) => gpu,
            Err(_) => return Ok(()),
        };
        // Narrow enough that download rows need padding.
        let extent = wgpu::Extent3d {
            width: 5,
            height: 3,
            depth_or_array_layers: 2,
        };
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("test-round-trip-texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let texels = (0..5 * 3 * 2 * 4).map(|i| i as f32).collect::<Vec<f32>>();
        gpu.upload_texture(
            &texture,
            extent,
            wgpu::TextureFormat::Rgba32Float,
            texels.as_bytes(),
        )?;
        let raw = gpu.download_texture(&texture, extent, wgpu::TextureFormat::Rgba32Float)?;
        assert_eq!(raw.as_slice(), texels.as_bytes());
        Ok(())
    }
}
