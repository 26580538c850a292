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
        density, extend, horizon_mu, irradiance, irradiance_r_mu_s, limit, mu_mu_s_nu, phase_mie,
        phase_rayleigh, rgb, texture_4d, transmittance_along,
    },
    one, KernelContext, TexelOutputs, INSCATTER_INTEGRAL_SAMPLES,
    INSCATTER_SPHERICAL_INTEGRAL_SAMPLES, IRRADIANCE_INTEGRAL_SAMPLES,
};
use crate::cpu_backend::CpuTable;
use nalgebra::Vector3;
use std::f32::consts::PI;

/// Scattered light arriving at (r, mu_s) from direction `w`: either the
/// single scattering tables with their phase functions still to apply,
/// or the previous order's combined deltaS.
#[allow(clippy::too_many_arguments)]
fn incoming(
    ctx: &KernelContext,
    delta_rayleigh: &CpuTable,
    delta_mie: &CpuTable,
    r: f32,
    w: &Vector3<f32>,
    mu_s: f32,
    nu: f32,
) -> Vector3<f32> {
    let p = ctx.params;
    let ray = texture_4d(p, ctx.dims, delta_rayleigh, r, w.z, mu_s, nu).xyz();
    if ctx.uniforms.first_order != 0 {
        let mie = texture_4d(p, ctx.dims, delta_mie, r, w.z, mu_s, nu).xyz();
        ray * phase_rayleigh(nu) + mie * phase_mie(p, nu)
    } else {
        ray
    }
}

/// Radiance scattered towards the viewer at a single point, gathered over
/// the full sphere of incoming directions including light reflected by
/// the ground.
pub(super) fn delta_j(ctx: &KernelContext, x: u32, y: u32) -> TexelOutputs {
    let p = ctx.params;
    let transmittance = ctx.input(0);
    let delta_irradiance = ctx.input(1);
    let delta_rayleigh = ctx.input(2);
    let delta_mie = ctx.input(3);
    let rg = p.bottom_radius;

    let r = ctx.uniforms.r.clamp(rg, p.top_radius);
    let (mu, mu_s, nu) = mu_mu_s_nu(p, ctx.dims, r, ctx.uniforms.dhdh, x, y);
    let mu = mu.clamp(-1.0, 1.0);
    let mu_s = mu_s.clamp(-1.0, 1.0);
    let var = (1.0 - mu * mu).sqrt() * (1.0 - mu_s * mu_s).sqrt();
    let nu = nu.clamp(mu_s * mu - var, mu_s * mu + var);

    let cos_theta_min = horizon_mu(p, r);
    let v = Vector3::new((1.0 - mu * mu).sqrt(), 0.0, mu);
    let sx = if v.x == 0.0 {
        0.0
    } else {
        (nu - mu_s * mu) / v.x
    };
    let s = Vector3::new(sx, (1.0 - sx * sx - mu_s * mu_s).max(0.0).sqrt(), mu_s);

    let samples = INSCATTER_SPHERICAL_INTEGRAL_SAMPLES;
    let dtheta = PI / samples as f32;
    let dphi = PI / samples as f32;
    let rayleigh_here = rgb(p.rayleigh_scattering) * density(p, p.rayleigh_scale_height, r);
    let mie_here = rgb(p.mie_scattering) * density(p, p.mie_scale_height, r);

    let mut raymie = Vector3::zeros();
    for itheta in 0..samples {
        let theta = (itheta as f32 + 0.5) * dtheta;
        let cos_theta = theta.cos();

        let mut ground_reflectance = 0.0;
        let mut ground_distance = 0.0;
        let mut ground_transmittance = Vector3::zeros();
        if cos_theta < cos_theta_min {
            // This direction sees the ground; account for light reflected
            // off it towards this point.
            ground_reflectance = p.ground_reflectance / PI;
            ground_distance = -r * cos_theta
                - (r * r * (cos_theta * cos_theta - 1.0) + rg * rg)
                    .max(0.0)
                    .sqrt();
            ground_transmittance = transmittance_along(
                p,
                transmittance,
                rg,
                -(r * cos_theta + ground_distance) / rg,
                ground_distance,
            );
        }

        for iphi in 0..2 * samples {
            let phi = (iphi as f32 + 0.5) * dphi;
            let dw = dtheta * dphi * theta.sin();
            let w = Vector3::new(
                phi.cos() * theta.sin(),
                phi.sin() * theta.sin(),
                cos_theta,
            );
            let nu1 = s.dot(&w);
            let nu2 = v.dot(&w);

            let ground_normal = (Vector3::new(0.0, 0.0, r) + w * ground_distance) / rg;
            let ground_irradiance =
                irradiance(p, delta_irradiance, rg, ground_normal.dot(&s));
            let mut raymie1 =
                ground_irradiance.component_mul(&ground_transmittance) * ground_reflectance;
            raymie1 += incoming(ctx, delta_rayleigh, delta_mie, r, &w, mu_s, nu1);

            let scatter = rayleigh_here * phase_rayleigh(nu2) + mie_here * phase_mie(p, nu2);
            raymie += raymie1.component_mul(&scatter) * dw;
        }
    }
    one(extend(raymie))
}

/// Ground irradiance from the previous order of scattered light, over the
/// upper hemisphere.
pub(super) fn irradiance_n(ctx: &KernelContext, x: u32, y: u32) -> TexelOutputs {
    let p = ctx.params;
    let delta_rayleigh = ctx.input(0);
    let delta_mie = ctx.input(1);
    let (r, mu_s) = irradiance_r_mu_s(p, ctx.dims, x, y);
    let s = Vector3::new((1.0 - mu_s * mu_s).max(0.0).sqrt(), 0.0, mu_s);

    let samples = IRRADIANCE_INTEGRAL_SAMPLES;
    let dphi = PI / samples as f32;
    let dtheta = PI / samples as f32;
    let mut result = Vector3::zeros();
    for iphi in 0..2 * samples {
        let phi = (iphi as f32 + 0.5) * dphi;
        for itheta in 0..samples / 2 {
            let theta = (itheta as f32 + 0.5) * dtheta;
            let dw = dtheta * dphi * theta.sin();
            let w = Vector3::new(
                phi.cos() * theta.sin(),
                phi.sin() * theta.sin(),
                theta.cos(),
            );
            let nu = s.dot(&w);
            result += incoming(ctx, delta_rayleigh, delta_mie, r, &w, mu_s, nu) * w.z * dw;
        }
    }
    one(extend(result))
}

/// Line integral of deltaJ towards the viewer, attenuated on the way.
pub(super) fn inscatter_n(ctx: &KernelContext, x: u32, y: u32) -> TexelOutputs {
    let p = ctx.params;
    let transmittance = ctx.input(0);
    let delta_j = ctx.input(1);
    let r = ctx.uniforms.r;
    let (mu, mu_s, nu) = mu_mu_s_nu(p, ctx.dims, r, ctx.uniforms.dhdh, x, y);

    let integrand = |t: f32| {
        let ri = (r * r + t * t + 2.0 * r * mu * t).max(0.0).sqrt();
        let mui = (r * mu + t) / ri;
        let mu_si = (nu * t + mu_s * r) / ri;
        texture_4d(p, ctx.dims, delta_j, ri, mui, mu_si, nu)
            .xyz()
            .component_mul(&transmittance_along(p, transmittance, r, mu, t))
    };

    let dx = limit(p, r, mu) / INSCATTER_INTEGRAL_SAMPLES as f32;
    let mut raymiei = integrand(0.0);
    let mut raymie = Vector3::zeros();
    for i in 1..=INSCATTER_INTEGRAL_SAMPLES {
        let xj = i as f32 * dx;
        let raymiej = integrand(xj);
        raymie += (raymiei + raymiej) / 2.0 * dx;
        raymiei = raymiej;
    }
    one(extend(raymie))
}
