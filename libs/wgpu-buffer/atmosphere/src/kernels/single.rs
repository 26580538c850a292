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
    common::{
        density, extend, horizon_mu, irradiance_r_mu_s, limit, mu_mu_s_nu, rgb,
        transmittance as lookup_transmittance, transmittance_along, transmittance_r_mu,
    },
    one, KernelContext, TexelOutputs, INSCATTER_INTEGRAL_SAMPLES,
    TRANSMITTANCE_INTEGRAL_SAMPLES,
};
use crate::{cpu_backend::CpuTable, earth_consts::AtmosphereParameters};
use nalgebra::Vector3;

fn optical_depth(p: &AtmosphereParameters, scale_height: f32, r: f32, mu: f32) -> f32 {
    if mu < horizon_mu(p, r) {
        return 1e9;
    }
    let dx = limit(p, r, mu) / TRANSMITTANCE_INTEGRAL_SAMPLES as f32;
    let mut yi = density(p, scale_height, r);
    let mut result = 0.0;
    for i in 1..=TRANSMITTANCE_INTEGRAL_SAMPLES {
        let xj = i as f32 * dx;
        let rj = (r * r + xj * xj + 2.0 * xj * r * mu).sqrt();
        let yj = density(p, scale_height, rj);
        result += (yi + yj) / 2.0 * dx;
        yi = yj;
    }
    result
}

pub(super) fn transmittance(ctx: &KernelContext, x: u32, y: u32) -> TexelOutputs {
    let p = ctx.params;
    let (r, mu) = transmittance_r_mu(p, ctx.dims, x, y);
    let depth = rgb(p.rayleigh_scattering) * optical_depth(p, p.rayleigh_scale_height, r, mu)
        + rgb(p.mie_extinction) * optical_depth(p, p.mie_scale_height, r, mu);
    one(extend(depth.map(|d| (-d).exp())))
}

pub(super) fn irradiance_single(ctx: &KernelContext, x: u32, y: u32) -> TexelOutputs {
    let p = ctx.params;
    let (r, mu_s) = irradiance_r_mu_s(p, ctx.dims, x, y);
    let direct = lookup_transmittance(p, ctx.input(0), r, mu_s) * mu_s.max(0.0);
    one(extend(direct))
}

fn single_integrand(
    p: &AtmosphereParameters,
    table: &CpuTable,
    r: f32,
    mu: f32,
    mu_s: f32,
    nu: f32,
    t: f32,
) -> (Vector3<f32>, Vector3<f32>) {
    let ri = (r * r + t * t + 2.0 * r * mu * t).sqrt();
    let mu_si = (nu * t + mu_s * r) / ri;
    let ri = ri.max(p.bottom_radius);
    if mu_si < horizon_mu(p, ri) {
        // The sun is below the horizon at this point.
        return (Vector3::zeros(), Vector3::zeros());
    }
    let ti = transmittance_along(p, table, r, mu, t).component_mul(&lookup_transmittance(
        p, table, ri, mu_si,
    ));
    (
        ti * density(p, p.rayleigh_scale_height, ri),
        ti * density(p, p.mie_scale_height, ri),
    )
}

pub(super) fn inscatter_single(ctx: &KernelContext, x: u32, y: u32) -> TexelOutputs {
    let p = ctx.params;
    let table = ctx.input(0);
    let r = ctx.uniforms.r;
    let (mu, mu_s, nu) = mu_mu_s_nu(p, ctx.dims, r, ctx.uniforms.dhdh, x, y);

    let dx = limit(p, r, mu) / INSCATTER_INTEGRAL_SAMPLES as f32;
    let (mut rayi, mut miei) = single_integrand(p, table, r, mu, mu_s, nu, 0.0);
    let mut ray = Vector3::zeros();
    let mut mie = Vector3::zeros();
    for i in 1..=INSCATTER_INTEGRAL_SAMPLES {
        let xj = i as f32 * dx;
        let (rayj, miej) = single_integrand(p, table, r, mu, mu_s, nu, xj);
        ray += (rayi + rayj) / 2.0 * dx;
        mie += (miei + miej) / 2.0 * dx;
        rayi = rayj;
        miei = miej;
    }
    let ray = ray.component_mul(&rgb(p.rayleigh_scattering));
    let mie = mie.component_mul(&rgb(p.mie_scattering));
    [extend(ray), extend(mie)]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::table_helpers::TableDimensions;
    use approx::assert_relative_eq;

    #[test]
    fn test_blocked_ray_has_no_depth_budget() {
        let p = AtmosphereParameters::default();
        let r = p.bottom_radius + 0.5;
        assert_eq!(optical_depth(&p, p.rayleigh_scale_height, r, -0.9), 1e9);
    }

    #[test]
    fn test_zenith_depth_matches_closed_form() {
        let p = AtmosphereParameters::default();
        let r = p.bottom_radius;
        let h = p.rayleigh_scale_height;
        // Straight up through an exponential atmosphere truncated at the
        // limit radius.
        let expect = h * (1.0 - (-(p.limit_radius - r) / h).exp());
        assert_relative_eq!(optical_depth(&p, h, r, 1.0), expect, max_relative = 1e-3);
    }

    #[test]
    fn test_transmittance_texel_bounds() {
        let p = AtmosphereParameters::default();
        let dims = TableDimensions::default();
        let uniforms = Default::default();
        let ctx = KernelContext {
            params: &p,
            dims: &dims,
            uniforms: &uniforms,
            inputs: &[],
        };
        let grazing = transmittance(&ctx, 0, 0)[0];
        let zenith = transmittance(&ctx, dims.transmittance_width - 1, 0)[0];
        for c in 0..3 {
            assert!(zenith[c] > grazing[c]);
            assert!(zenith[c] <= 1.0 && zenith[c] > 0.0);
        }
        // Blue is scattered most.
        assert!(zenith.z < zenith.x);
        assert_eq!(zenith.w, 0.0);
    }
}
