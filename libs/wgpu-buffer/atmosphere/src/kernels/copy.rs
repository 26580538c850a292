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
use super::{
    common::{extend, mu_mu_s_nu, phase_rayleigh},
    one, KernelContext, TexelOutputs,
};
use nalgebra::Vector4;

pub(super) fn copy_irradiance(ctx: &KernelContext, x: u32, y: u32) -> TexelOutputs {
    let (x, y) = (i64::from(x), i64::from(y));
    let accumulated = ctx.input(0).texel(x, y, 0);
    let delta = ctx.input(1).texel(x, y, 0);
    one(accumulated + delta * ctx.uniforms.copy_scale)
}

/// Pack single scattering as rayleigh rgb with the red channel of mie in
/// alpha.
pub(super) fn copy_inscatter_single(ctx: &KernelContext, x: u32, y: u32) -> TexelOutputs {
    let (x, y, z) = (i64::from(x), i64::from(y), i64::from(ctx.uniforms.layer));
    let ray = ctx.input(0).texel(x, y, z);
    let mie = ctx.input(1).texel(x, y, z);
    one(Vector4::new(ray.x, ray.y, ray.z, mie.x))
}

/// Accumulate one order of multiple scattering. deltaS carries the
/// rayleigh phase function already, which the renderer applies again, so
/// it is divided out here.
pub(super) fn copy_inscatter_n(ctx: &KernelContext, x: u32, y: u32) -> TexelOutputs {
    let (_, _, nu) = mu_mu_s_nu(
        ctx.params,
        ctx.dims,
        ctx.uniforms.r,
        ctx.uniforms.dhdh,
        x,
        y,
    );
    let (x, y, z) = (i64::from(x), i64::from(y), i64::from(ctx.uniforms.layer));
    let accumulated = ctx.input(0).texel(x, y, z);
    let delta = ctx.input(1).texel(x, y, z).xyz();
    one(accumulated + extend(delta / phase_rayleigh(nu)))
}
