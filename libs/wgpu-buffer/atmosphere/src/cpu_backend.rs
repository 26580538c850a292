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
    backend::{ComputeBackend, Dispatch},
    earth_consts::AtmosphereParameters,
    kernels::{texel_kernel, KernelContext, TexelOutputs},
    table_helpers::{TableDimensions, TableHelpers, CHANNELS},
    tables::{TableKind, Tables},
};
use anyhow::{anyhow, ensure, Result};
use log::trace;
use nalgebra::Vector4;
use rayon::prelude::*;

/// A host resident RGBA32F table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CpuTable {
    extent: wgpu::Extent3d,
    texels: Vec<f32>,
}

impl CpuTable {
    pub fn new(extent: wgpu::Extent3d) -> Self {
        Self {
            extent,
            texels: vec![0f32; TableHelpers::float_count(extent)],
        }
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        self.extent
    }

    pub fn texels(&self) -> &[f32] {
        &self.texels
    }

    fn offset(&self, x: u32, y: u32, z: u32) -> usize {
        let e = &self.extent;
        ((z as usize * e.height as usize + y as usize) * e.width as usize + x as usize) * CHANNELS
    }

    /// Fetch with clamp-to-edge addressing.
    pub fn texel(&self, x: i64, y: i64, z: i64) -> Vector4<f32> {
        let e = &self.extent;
        let x = x.clamp(0, i64::from(e.width) - 1) as u32;
        let y = y.clamp(0, i64::from(e.height) - 1) as u32;
        let z = z.clamp(0, i64::from(e.depth_or_array_layers) - 1) as u32;
        let i = self.offset(x, y, z);
        Vector4::new(
            self.texels[i],
            self.texels[i + 1],
            self.texels[i + 2],
            self.texels[i + 3],
        )
    }

    pub fn set_texel(&mut self, x: u32, y: u32, z: u32, value: Vector4<f32>) {
        let i = self.offset(x, y, z);
        self.texels[i..i + CHANNELS].copy_from_slice(value.as_slice());
    }
}

/// Runs the kernels on the host, one rayon task per texel. Slow, but
/// needs no adapter and is bit-for-bit reproducible.
#[derive(Debug, Default)]
pub struct CpuBackend {
    params: Option<AtmosphereParameters>,
    dims: Option<TableDimensions>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one dispatch without touching any table. Texels come back
    /// row-major over the dispatch grid.
    pub(crate) fn evaluate(
        &self,
        dispatch: &Dispatch,
        inputs: &[&CpuTable],
    ) -> Result<Vec<TexelOutputs>> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| anyhow!("parameters must be uploaded before dispatch"))?;
        let dims = self
            .dims
            .as_ref()
            .ok_or_else(|| anyhow!("kernels must be built before dispatch"))?;
        let kernel = texel_kernel(dispatch.pass.kind);
        let ctx = KernelContext {
            params,
            dims,
            uniforms: &dispatch.uniforms,
            inputs,
        };
        let width = dispatch.width;
        Ok((0..width * dispatch.height)
            .into_par_iter()
            .map(|i| kernel(&ctx, i % width, i / width))
            .collect())
    }
}

impl ComputeBackend for CpuBackend {
    type Table = CpuTable;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn create_table(&mut self, kind: TableKind, extent: wgpu::Extent3d) -> Result<CpuTable> {
        trace!("allocating {} {:?}", kind.label(), extent);
        Ok(CpuTable::new(extent))
    }

    fn build_kernels(&mut self, dims: &TableDimensions) -> Result<()> {
        dims.validate()?;
        self.dims = Some(*dims);
        Ok(())
    }

    fn upload_parameters(&mut self, params: &AtmosphereParameters) -> Result<()> {
        self.params = Some(*params);
        Ok(())
    }

    fn dispatch(&mut self, dispatch: &Dispatch, tables: &mut Tables<CpuTable>) -> Result<()> {
        let pass = dispatch.pass;
        let layer = if pass.is_layered() {
            dispatch.uniforms.layer
        } else {
            0
        };

        let texels = {
            let inputs = pass
                .inputs()
                .iter()
                .map(|input| tables.get(*input))
                .collect::<Vec<_>>();
            self.evaluate(dispatch, &inputs)?
        };

        for (slot, output) in pass.outputs().iter().enumerate() {
            let extent = tables.get(*output).extent();
            ensure!(
                dispatch.width <= extent.width
                    && dispatch.height <= extent.height
                    && layer < extent.depth_or_array_layers,
                "dispatch of {} does not fit output {} ({:?})",
                pass,
                output,
                extent
            );
            let table = tables.get_mut(*output);
            for (i, texel) in texels.iter().enumerate() {
                let i = i as u32;
                table.set_texel(i % dispatch.width, i / dispatch.width, layer, texel[slot]);
            }
        }
        Ok(())
    }

    fn barrier(&mut self) -> Result<()> {
        // Dispatches complete before they return.
        Ok(())
    }

    fn read_table(&mut self, table: &CpuTable) -> Result<Vec<f32>> {
        Ok(table.texels.clone())
    }

    fn write_table(&mut self, table: &mut CpuTable, texels: &[f32]) -> Result<()> {
        ensure!(
            texels.len() == table.texels.len(),
            "table write size mismatch: got {} floats, expected {}",
            texels.len(),
            table.texels.len()
        );
        table.texels.copy_from_slice(texels);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        backend::PassUniforms,
        schedule::{PassDescriptor, PassKind},
    };
    use rand::{seq::SliceRandom, thread_rng};

    fn small_dims() -> TableDimensions {
        TableDimensions {
            transmittance_width: 32,
            transmittance_height: 8,
            irradiance_width: 8,
            irradiance_height: 4,
            scattering_r: 4,
            scattering_mu: 8,
            scattering_mu_s: 4,
            scattering_nu: 2,
        }
    }

    fn ready_backend(dims: &TableDimensions) -> Result<CpuBackend> {
        let mut backend = CpuBackend::new();
        backend.upload_parameters(&AtmosphereParameters::default())?;
        backend.build_kernels(dims)?;
        Ok(backend)
    }

    #[test]
    fn test_texel_addressing() {
        let mut table = CpuTable::new(wgpu::Extent3d {
            width: 3,
            height: 2,
            depth_or_array_layers: 2,
        });
        let v = Vector4::new(1.0, 2.0, 3.0, 4.0);
        table.set_texel(2, 1, 1, v);
        assert_eq!(table.texel(2, 1, 1), v);
        assert_eq!(table.texel(9, 9, 9), v);
        assert_eq!(table.texel(-1, 0, 0), Vector4::zeros());
        assert_eq!(&table.texels()[table.texels().len() - 4..], &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_dispatch_requires_parameters() -> Result<()> {
        let dims = small_dims();
        let mut backend = CpuBackend::new();
        backend.build_kernels(&dims)?;
        let mut tables = Tables::try_new(|kind| backend.create_table(kind, kind.extent(&dims)))?;
        let pass = PassDescriptor::new(PassKind::Transmittance, 1);
        let dispatch = Dispatch {
            pass: &pass,
            width: dims.transmittance_width,
            height: dims.transmittance_height,
            uniforms: PassUniforms::default(),
        };
        assert!(backend.dispatch(&dispatch, &mut tables).is_err());
        Ok(())
    }

    #[test]
    fn test_scrambled_order_matches_parallel() -> Result<()> {
        let dims = small_dims();
        let params = AtmosphereParameters::default();
        let mut backend = ready_backend(&dims)?;
        let mut tables = Tables::try_new(|kind| backend.create_table(kind, kind.extent(&dims)))?;

        let transmittance = PassDescriptor::new(PassKind::Transmittance, 1);
        backend.dispatch(
            &Dispatch {
                pass: &transmittance,
                width: dims.transmittance_width,
                height: dims.transmittance_height,
                uniforms: PassUniforms::default(),
            },
            &mut tables,
        )?;

        // Evaluate one inscatter layer in parallel, then texel by texel in
        // a random order; every texel is independent so both must agree
        // exactly.
        let pass = PassDescriptor::new(PassKind::InscatterSingle, 1);
        let extent = dims.scattering_extent();
        let dispatch = Dispatch {
            pass: &pass,
            width: extent.width,
            height: extent.height,
            uniforms: PassUniforms::for_pass(&pass, &params, &dims, 1),
        };
        let inputs = vec![tables.get(crate::tables::TableRef::Transmittance)];
        let parallel = backend.evaluate(&dispatch, &inputs)?;

        let kernel = texel_kernel(pass.kind);
        let ctx = KernelContext {
            params: &params,
            dims: &dims,
            uniforms: &dispatch.uniforms,
            inputs: &inputs,
        };
        let mut order = (0..extent.width * extent.height).collect::<Vec<u32>>();
        order.shuffle(&mut thread_rng());
        for i in order {
            let texel = kernel(&ctx, i % extent.width, i / extent.width);
            assert_eq!(texel, parallel[i as usize]);
        }
        Ok(())
    }

    #[test]
    fn test_write_table_checks_size() -> Result<()> {
        let mut backend = CpuBackend::new();
        let extent = wgpu::Extent3d {
            width: 2,
            height: 2,
            depth_or_array_layers: 1,
        };
        let mut table = backend.create_table(TableKind::Irradiance, extent)?;
        assert!(backend.write_table(&mut table, &[0.0; 3]).is_err());
        backend.write_table(&mut table, &[0.5; 16])?;
        assert_eq!(backend.read_table(&table)?, vec![0.5; 16]);
        Ok(())
    }
}
