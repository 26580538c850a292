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
use anyhow::{ensure, Result};
use static_assertions::{assert_eq_size, const_assert_eq};
use std::mem;
use zerocopy::{AsBytes, FromBytes};

// All distances in km.
pub const EARTH_BOTTOM_RADIUS_KM: f32 = 6360.0;
pub const EARTH_TOP_RADIUS_KM: f32 = 6420.0;
pub const EARTH_LIMIT_RADIUS_KM: f32 = 6421.0;

pub const RAYLEIGH_SCALE_HEIGHT_KM: f32 = 8.0;
pub const MIE_SCALE_HEIGHT_KM: f32 = 1.2;

// Scattering coefficients in 1/km at 680, 550 and 440nm.
pub const RAYLEIGH_SCATTERING: [f32; 3] = [5.8e-3, 1.35e-2, 3.31e-2];
pub const MIE_SCATTERING: f32 = 4e-3;
pub const MIE_SINGLE_SCATTERING_ALBEDO: f32 = 0.9;

pub const MIE_PHASE_FUNCTION_G: f32 = 0.8;
pub const AVERAGE_GROUND_REFLECTANCE: f32 = 0.1;

/// The scalar uniform block shared by every precompute kernel. Layout
/// must match `AtmosphereParameters` in common.wgsl.
#[repr(C)]
#[derive(AsBytes, FromBytes, Copy, Clone, Debug, PartialEq)]
pub struct AtmosphereParameters {
    pub rayleigh_scattering: [f32; 4],
    pub mie_scattering: [f32; 4],
    pub mie_extinction: [f32; 4],
    pub bottom_radius: f32,
    pub top_radius: f32,
    pub limit_radius: f32,
    pub rayleigh_scale_height: f32,
    pub mie_scale_height: f32,
    pub mie_phase_g: f32,
    pub ground_reflectance: f32,
    pub padding0: f32,
}
assert_eq_size!(AtmosphereParameters, [f32; 20]);
const_assert_eq!(mem::size_of::<AtmosphereParameters>() % 16, 0);

impl Default for AtmosphereParameters {
    fn default() -> Self {
        let [r, g, b] = RAYLEIGH_SCATTERING;
        let mie_extinction = MIE_SCATTERING / MIE_SINGLE_SCATTERING_ALBEDO;
        Self {
            rayleigh_scattering: [r, g, b, 0.0],
            mie_scattering: [MIE_SCATTERING, MIE_SCATTERING, MIE_SCATTERING, 0.0],
            mie_extinction: [mie_extinction, mie_extinction, mie_extinction, 0.0],
            bottom_radius: EARTH_BOTTOM_RADIUS_KM,
            top_radius: EARTH_TOP_RADIUS_KM,
            limit_radius: EARTH_LIMIT_RADIUS_KM,
            rayleigh_scale_height: RAYLEIGH_SCALE_HEIGHT_KM,
            mie_scale_height: MIE_SCALE_HEIGHT_KM,
            mie_phase_g: MIE_PHASE_FUNCTION_G,
            ground_reflectance: AVERAGE_GROUND_REFLECTANCE,
            padding0: 0.0,
        }
    }
}

impl AtmosphereParameters {
    pub fn with_ground_reflectance(mut self, reflectance: f32) -> Self {
        self.ground_reflectance = reflectance;
        self
    }

    pub fn with_mie_phase_g(mut self, g: f32) -> Self {
        self.mie_phase_g = g;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.bottom_radius > 0.0
                && self.bottom_radius < self.top_radius
                && self.top_radius <= self.limit_radius,
            "atmosphere radii must satisfy 0 < bottom < top <= limit; got {} {} {}",
            self.bottom_radius,
            self.top_radius,
            self.limit_radius
        );
        ensure!(
            self.rayleigh_scale_height > 0.0 && self.mie_scale_height > 0.0,
            "scale heights must be positive"
        );
        ensure!(
            self.mie_phase_g > -1.0 && self.mie_phase_g < 1.0,
            "mie phase g must be in (-1, 1); got {}",
            self.mie_phase_g
        );
        ensure!(
            self.ground_reflectance >= 0.0,
            "ground reflectance must not be negative"
        );
        let coefficients = self.rayleigh_scattering[..3]
            .iter()
            .chain(&self.mie_scattering[..3])
            .chain(&self.mie_extinction[..3]);
        for &beta in coefficients {
            ensure!(
                beta.is_finite() && beta >= 0.0,
                "scattering coefficients must be finite and non-negative"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_is_earth() -> Result<()> {
        let params = AtmosphereParameters::default();
        params.validate()?;
        assert_relative_eq!(params.mie_extinction[0], 4e-3 / 0.9);
        assert_eq!(params.as_bytes().len(), 80);
        Ok(())
    }

    #[test]
    fn test_reject_inverted_shell() {
        let mut params = AtmosphereParameters::default();
        params.top_radius = params.bottom_radius - 1.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_reject_bad_phase() {
        assert!(AtmosphereParameters::default()
            .with_mie_phase_g(1.0)
            .validate()
            .is_err());
    }
}
