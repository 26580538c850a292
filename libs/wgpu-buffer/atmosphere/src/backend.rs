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
    earth_consts::AtmosphereParameters,
    schedule::PassDescriptor,
    table_helpers::TableDimensions,
    tables::{TableKind, Tables},
};
use anyhow::Result;
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes};

/// Per-dispatch constants. Layout must match `PassUniforms` in common.wgsl.
#[repr(C)]
#[derive(AsBytes, FromBytes, Copy, Clone, Debug, Default, PartialEq)]
pub struct PassUniforms {
    /// dmin, dmax, dminp, dmaxp for the current radius layer.
    pub dhdh: [f32; 4],
    pub r: f32,
    pub layer: u32,
    pub copy_scale: f32,
    pub first_order: u32,
}
assert_eq_size!(PassUniforms, [f32; 8]);

impl PassUniforms {
    /// The radius and view distance bounds for one slice of the 4D table.
    /// Computed in double precision; the end layers are nudged inside the
    /// shell so that the ground and top boundaries stay well defined.
    pub fn for_layer(params: &AtmosphereParameters, dims: &TableDimensions, layer: u32) -> Self {
        let rg = f64::from(params.bottom_radius);
        let rt = f64::from(params.top_radius);
        let last = dims.scattering_r - 1;
        let t = f64::from(layer) / f64::from(last);
        let mut r = (rg * rg + t * t * (rt * rt - rg * rg)).sqrt();
        if layer == 0 {
            r += 0.01;
        } else if layer == last {
            r -= 0.001;
        }
        let rho = (r * r - rg * rg).max(0.0).sqrt();
        let h = (rt * rt - rg * rg).sqrt();
        Self {
            dhdh: [(rt - r) as f32, (rho + h) as f32, (r - rg) as f32, rho as f32],
            r: r as f32,
            layer,
            copy_scale: 0.0,
            first_order: 0,
        }
    }

    pub fn for_pass(
        pass: &PassDescriptor,
        params: &AtmosphereParameters,
        dims: &TableDimensions,
        layer: u32,
    ) -> Self {
        let base = if pass.is_layered() {
            Self::for_layer(params, dims, layer)
        } else {
            Self::default()
        };
        Self {
            copy_scale: pass.copy_scale,
            first_order: u32::from(pass.first_order),
            ..base
        }
    }
}

/// One 2D grid of work: a flat pass, or one radius layer of a layered pass.
#[derive(Clone, Copy, Debug)]
pub struct Dispatch<'a> {
    pub pass: &'a PassDescriptor,
    pub width: u32,
    pub height: u32,
    pub uniforms: PassUniforms,
}

/// Everything the precompute needs from a compute device. Tables are
/// RGBA32F, kernels are the nine passes, and dispatches must complete
/// before `barrier` returns.
pub trait ComputeBackend {
    type Table;

    fn name(&self) -> &'static str;

    /// Allocate a zero filled table of the given kind.
    fn create_table(&mut self, kind: TableKind, extent: wgpu::Extent3d) -> Result<Self::Table>;

    /// Build every pass kernel for the given table sizes.
    fn build_kernels(&mut self, dims: &TableDimensions) -> Result<()>;

    fn upload_parameters(&mut self, params: &AtmosphereParameters) -> Result<()>;

    /// Bind the pass inputs for sampling and outputs for writing and run
    /// the kernel over `dispatch.width` x `dispatch.height` texels.
    fn dispatch(&mut self, dispatch: &Dispatch, tables: &mut Tables<Self::Table>) -> Result<()>;

    fn barrier(&mut self) -> Result<()>;

    /// Tightly packed RGBA floats, x fastest, then y, then z.
    fn read_table(&mut self, table: &Self::Table) -> Result<Vec<f32>>;

    fn write_table(&mut self, table: &mut Self::Table, texels: &[f32]) -> Result<()>;
}
