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
    cpu_backend::CpuTable, earth_consts::AtmosphereParameters, table_helpers::TableDimensions,
};
use nalgebra::{Vector3, Vector4};
use std::f32::consts::PI;

pub(crate) fn rgb(v: [f32; 4]) -> Vector3<f32> {
    Vector3::new(v[0], v[1], v[2])
}

pub(crate) fn extend(v: Vector3<f32>) -> Vector4<f32> {
    Vector4::new(v.x, v.y, v.z, 0.0)
}

// Texture addressing. Reads are texel fetches with the filtering done by
// hand: texel centres at (i + 0.5) / size, edges clamped.

pub(crate) fn sample_2d(table: &CpuTable, u: f32, v: f32) -> Vector4<f32> {
    let extent = table.extent();
    let s = u * extent.width as f32 - 0.5;
    let t = v * extent.height as f32 - 0.5;
    let (x0, fx) = (s.floor(), s - s.floor());
    let (y0, fy) = (t.floor(), t - t.floor());
    let (x0, y0) = (x0 as i64, y0 as i64);
    let a = table.texel(x0, y0, 0) * (1.0 - fx) + table.texel(x0 + 1, y0, 0) * fx;
    let b = table.texel(x0, y0 + 1, 0) * (1.0 - fx) + table.texel(x0 + 1, y0 + 1, 0) * fx;
    a * (1.0 - fy) + b * fy
}

pub(crate) fn sample_3d(table: &CpuTable, u: f32, v: f32, w: f32) -> Vector4<f32> {
    let extent = table.extent();
    let s = u * extent.width as f32 - 0.5;
    let t = v * extent.height as f32 - 0.5;
    let q = w * extent.depth_or_array_layers as f32 - 0.5;
    let (fx, fy, fz) = (s - s.floor(), t - t.floor(), q - q.floor());
    let (x0, y0, z0) = (s.floor() as i64, t.floor() as i64, q.floor() as i64);
    let plane = |z: i64| {
        let a = table.texel(x0, y0, z) * (1.0 - fx) + table.texel(x0 + 1, y0, z) * fx;
        let b = table.texel(x0, y0 + 1, z) * (1.0 - fx) + table.texel(x0 + 1, y0 + 1, z) * fx;
        a * (1.0 - fy) + b * fy
    };
    plane(z0) * (1.0 - fz) + plane(z0 + 1) * fz
}

/// Cosine of the horizon seen from radius `r`; rays below it hit the ground.
pub(crate) fn horizon_mu(p: &AtmosphereParameters, r: f32) -> f32 {
    let ratio = p.bottom_radius / r;
    -(1.0 - ratio * ratio).max(0.0).sqrt()
}

/// Distance to the nearest of the ground or the top of the atmosphere.
pub(crate) fn limit(p: &AtmosphereParameters, r: f32, mu: f32) -> f32 {
    let rg = p.bottom_radius;
    let rl = p.limit_radius;
    let mut dout = -r * mu + (r * r * (mu * mu - 1.0) + rl * rl).max(0.0).sqrt();
    let delta2 = r * r * (mu * mu - 1.0) + rg * rg;
    if delta2 >= 0.0 {
        let din = -r * mu - delta2.sqrt();
        if din >= 0.0 {
            dout = dout.min(din);
        }
    }
    dout
}

pub(crate) fn transmittance_uv(p: &AtmosphereParameters, r: f32, mu: f32) -> (f32, f32) {
    let u_r = ((r - p.bottom_radius).max(0.0) / (p.top_radius - p.bottom_radius)).sqrt();
    let u_mu = ((mu + 0.15) / 1.15 * 1.5f32.tan()).atan() / 1.5;
    (u_mu, u_r)
}

pub(crate) fn transmittance_r_mu(
    p: &AtmosphereParameters,
    dims: &TableDimensions,
    x: u32,
    y: u32,
) -> (f32, f32) {
    let u = (x as f32 + 0.5) / dims.transmittance_width as f32;
    let v = (y as f32 + 0.5) / dims.transmittance_height as f32;
    let r = p.bottom_radius + v * v * (p.top_radius - p.bottom_radius);
    let mu = -0.15 + (1.5 * u).tan() / 1.5f32.tan() * 1.15;
    (r, mu)
}

pub(crate) fn irradiance_uv(p: &AtmosphereParameters, r: f32, mu_s: f32) -> (f32, f32) {
    let u_r = (r - p.bottom_radius) / (p.top_radius - p.bottom_radius);
    let u_mu_s = (mu_s + 0.2) / 1.2;
    (u_mu_s, u_r)
}

pub(crate) fn irradiance_r_mu_s(
    p: &AtmosphereParameters,
    dims: &TableDimensions,
    x: u32,
    y: u32,
) -> (f32, f32) {
    let r = p.bottom_radius
        + y as f32 / (dims.irradiance_height - 1) as f32 * (p.top_radius - p.bottom_radius);
    let mu_s = -0.2 + x as f32 / (dims.irradiance_width - 1) as f32 * 1.2;
    (r, mu_s)
}

/// Look up the 4D scattering function stored in a 3D table with nu
/// slices laid side by side along x.
#[allow(clippy::too_many_arguments)]
pub(crate) fn texture_4d(
    p: &AtmosphereParameters,
    dims: &TableDimensions,
    table: &CpuTable,
    r: f32,
    mu: f32,
    mu_s: f32,
    nu: f32,
) -> Vector4<f32> {
    let res_r = dims.scattering_r as f32;
    let res_mu = dims.scattering_mu as f32;
    let res_mu_s = dims.scattering_mu_s as f32;
    let res_nu = dims.scattering_nu as f32;
    let rg = p.bottom_radius;
    let rt = p.top_radius;

    let r = r.clamp(rg, rt);
    let mu = mu.clamp(-1.0, 1.0);
    let h = (rt * rt - rg * rg).sqrt();
    let rho = (r * r - rg * rg).max(0.0).sqrt();
    let rmu = r * mu;
    let delta = rmu * rmu - r * r + rg * rg;
    let cst = if rmu < 0.0 && delta > 0.0 {
        Vector4::new(1.0, 0.0, 0.0, 0.5 - 0.5 / res_mu)
    } else {
        Vector4::new(-1.0, h * h, h, 0.5 + 0.5 / res_mu)
    };
    let u_r = 0.5 / res_r + rho / h * (1.0 - 1.0 / res_r);
    let u_mu = cst.w
        + (rmu * cst.x + (delta + cst.y).max(0.0).sqrt()) / (rho + cst.z).max(1e-6)
            * (0.5 - 1.0 / res_mu);
    let u_mu_s = 0.5 / res_mu_s
        + ((mu_s.max(-0.1975) * (1.26f32 * 1.1).tan()).atan() / 1.1 + (1.0 - 0.26))
            * 0.5
            * (1.0 - 1.0 / res_mu_s);

    let lerp = (nu + 1.0) / 2.0 * (res_nu - 1.0);
    let u_nu = lerp.floor();
    let lerp = lerp - u_nu;
    let a = sample_3d(table, (u_nu + u_mu_s) / res_nu, u_mu, u_r);
    let b = sample_3d(table, (u_nu + u_mu_s + 1.0) / res_nu, u_mu, u_r);
    a * (1.0 - lerp) + b * lerp
}

/// Invert the 4D addressing for the texel at (x, y) of a radius slice.
pub(crate) fn mu_mu_s_nu(
    p: &AtmosphereParameters,
    dims: &TableDimensions,
    r: f32,
    dhdh: [f32; 4],
    x: u32,
    y: u32,
) -> (f32, f32, f32) {
    let res_mu = dims.scattering_mu as f32;
    let res_mu_s = dims.scattering_mu_s as f32;
    let res_nu = dims.scattering_nu as f32;
    let rg = p.bottom_radius;
    let rt = p.top_radius;
    let (x, y) = (x as f32, y as f32);
    let half = res_mu / 2.0;

    let mu = if y < half {
        let d = 1.0 - y / (half - 1.0);
        let d = (d * dhdh[3]).max(dhdh[2]).min(dhdh[3] * 0.999);
        let mu = (rg * rg - r * r - d * d) / (2.0 * r * d);
        mu.min(horizon_mu(p, r) - 0.001)
    } else {
        let d = (y - half) / (half - 1.0);
        let d = (d * dhdh[1]).max(dhdh[0]).min(dhdh[1] * 0.999);
        (rt * rt - r * r - d * d) / (2.0 * r * d)
    };
    let mu = mu.clamp(-1.0, 1.0);
    let mu_s = (x % res_mu_s) / (res_mu_s - 1.0);
    let mu_s = ((2.0 * mu_s - 1.0 + 0.26) * 1.1).tan() / (1.26f32 * 1.1).tan();
    let nu = -1.0 + (x / res_mu_s).floor() / (res_nu - 1.0) * 2.0;
    (mu, mu_s, nu)
}

pub(crate) fn transmittance(
    p: &AtmosphereParameters,
    table: &CpuTable,
    r: f32,
    mu: f32,
) -> Vector3<f32> {
    let (u, v) = transmittance_uv(p, r, mu);
    sample_2d(table, u, v).xyz()
}

/// Transmittance between the point at radius `r` and the point a
/// distance `d` along direction `mu`, derived from two table lookups.
pub(crate) fn transmittance_along(
    p: &AtmosphereParameters,
    table: &CpuTable,
    r: f32,
    mu: f32,
    d: f32,
) -> Vector3<f32> {
    let r1 = (r * r + d * d + 2.0 * r * mu * d).max(0.0).sqrt();
    let mu1 = (r * mu + d) / r1.max(1e-6);
    let ratio = |num: Vector3<f32>, den: Vector3<f32>| {
        num.zip_map(&den, |n, d| (n / d.max(1e-30)).min(1.0))
    };
    if mu > 0.0 {
        ratio(transmittance(p, table, r, mu), transmittance(p, table, r1, mu1))
    } else {
        ratio(
            transmittance(p, table, r1, -mu1),
            transmittance(p, table, r, -mu),
        )
    }
}

pub(crate) fn irradiance(
    p: &AtmosphereParameters,
    table: &CpuTable,
    r: f32,
    mu_s: f32,
) -> Vector3<f32> {
    let (u, v) = irradiance_uv(p, r, mu_s);
    sample_2d(table, u, v).xyz()
}

pub(crate) fn phase_rayleigh(mu: f32) -> f32 {
    (3.0 / (16.0 * PI)) * (1.0 + mu * mu)
}

pub(crate) fn phase_mie(p: &AtmosphereParameters, mu: f32) -> f32 {
    let g = p.mie_phase_g;
    1.5 * 1.0 / (4.0 * PI) * (1.0 - g * g) * (1.0 + g * g - 2.0 * g * mu).powf(-1.5)
        * (1.0 + mu * mu)
        / (2.0 + g * g)
}

pub(crate) fn density(p: &AtmosphereParameters, scale_height: f32, r: f32) -> f32 {
    (-(r - p.bottom_radius) / scale_height).exp()
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(width: u32, height: u32, depth: u32) -> CpuTable {
        let mut table = CpuTable::new(wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        });
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    table.set_texel(x, y, z, Vector4::new(x as f32, y as f32, z as f32, 1.0));
                }
            }
        }
        table
    }

    #[test]
    fn test_sample_hits_texel_centres() {
        let table = ramp(4, 2, 1);
        let v = sample_2d(&table, 2.5 / 4.0, 0.5 / 2.0);
        assert_relative_eq!(v.x, 2.0);
        assert_relative_eq!(v.y, 0.0);
        let v = sample_2d(&table, 2.0 / 4.0, 1.0 / 2.0);
        assert_relative_eq!(v.x, 1.5);
        assert_relative_eq!(v.y, 0.5);
        // Clamp to edge.
        let v = sample_2d(&table, -1.0, 2.0);
        assert_relative_eq!(v.x, 0.0);
        assert_relative_eq!(v.y, 1.0);
    }

    #[test]
    fn test_sample_3d_blends_layers() {
        let table = ramp(2, 2, 4);
        let v = sample_3d(&table, 0.25, 0.25, 0.5);
        assert_relative_eq!(v.z, 1.5);
        assert_relative_eq!(v.w, 1.0);
    }

    #[test]
    fn test_transmittance_mapping_inverts() {
        let p = AtmosphereParameters::default();
        let dims = TableDimensions::default();
        for &(x, y) in &[(0, 0), (17, 40), (255, 63), (128, 1)] {
            let (r, mu) = transmittance_r_mu(&p, &dims, x, y);
            let (u, v) = transmittance_uv(&p, r, mu);
            assert_relative_eq!(u * 256.0 - 0.5, x as f32, epsilon = 1e-2);
            assert_relative_eq!(v * 64.0 - 0.5, y as f32, epsilon = 5e-2);
        }
    }

    #[test]
    fn test_limit_hits_ground_when_looking_down() {
        let p = AtmosphereParameters::default();
        let r = p.bottom_radius + 1.0;
        let down = limit(&p, r, -1.0);
        assert_relative_eq!(down, 1.0, epsilon = 1e-2);
        let up = limit(&p, r, 1.0);
        assert_relative_eq!(up, p.limit_radius - r, epsilon = 1e-2);
    }

    #[test]
    fn test_phase_functions_normalized() {
        let p = AtmosphereParameters::default();
        // Integrate over the sphere; both phase functions integrate to 1.
        let n = 2000;
        let mut rayleigh = 0.0;
        let mut mie = 0.0;
        for i in 0..n {
            let mu = -1.0 + (i as f32 + 0.5) * 2.0 / n as f32;
            rayleigh += phase_rayleigh(mu) * 2.0 * PI * 2.0 / n as f32;
            mie += phase_mie(&p, mu) * 2.0 * PI * 2.0 / n as f32;
        }
        assert_relative_eq!(rayleigh, 1.0, epsilon = 1e-3);
        assert_relative_eq!(mie, 1.0, epsilon = 2e-2);
    }

    #[test]
    fn test_view_parameters_are_finite() {
        let p = AtmosphereParameters::default();
        let dims = TableDimensions::default();
        for layer in [0, 1, dims.scattering_r - 1] {
            let u = crate::backend::PassUniforms::for_layer(&p, &dims, layer);
            for y in 0..dims.scattering_mu {
                for x in [0, 31, 32, 255] {
                    let (mu, mu_s, nu) = mu_mu_s_nu(&p, &dims, u.r, u.dhdh, x, y);
                    assert!(mu.is_finite() && (-1.0..=1.0).contains(&mu));
                    assert!(mu_s.is_finite());
                    assert!((-1.0..=1.0).contains(&nu));
                }
            }
        }
    }
}
