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

//! Per-texel reference versions of the precompute kernels. Each mirrors
//! the wgsl entry point of the same name in `shaders/`.
mod common;
mod copy;
mod multiple;
mod single;

use crate::{
    backend::PassUniforms, cpu_backend::CpuTable, earth_consts::AtmosphereParameters,
    schedule::PassKind, table_helpers::TableDimensions,
};
use nalgebra::Vector4;

pub const TRANSMITTANCE_INTEGRAL_SAMPLES: u32 = 500;
pub const INSCATTER_INTEGRAL_SAMPLES: u32 = 50;
pub const IRRADIANCE_INTEGRAL_SAMPLES: u32 = 32;
pub const INSCATTER_SPHERICAL_INTEGRAL_SAMPLES: u32 = 16;

pub(crate) struct KernelContext<'a> {
    pub params: &'a AtmosphereParameters,
    pub dims: &'a TableDimensions,
    pub uniforms: &'a PassUniforms,
    pub inputs: &'a [&'a CpuTable],
}

impl<'a> KernelContext<'a> {
    pub fn input(&self, index: usize) -> &'a CpuTable {
        self.inputs[index]
    }
}

/// Up to two output texels; passes with a single output leave the
/// second zeroed.
pub(crate) type TexelOutputs = [Vector4<f32>; 2];

pub(crate) type TexelKernel = fn(&KernelContext, u32, u32) -> TexelOutputs;

pub(crate) fn texel_kernel(kind: PassKind) -> TexelKernel {
    match kind {
        PassKind::Transmittance => single::transmittance,
        PassKind::IrradianceSingle => single::irradiance_single,
        PassKind::InscatterSingle => single::inscatter_single,
        PassKind::CopyIrradiance => copy::copy_irradiance,
        PassKind::CopyInscatterSingle => copy::copy_inscatter_single,
        PassKind::DeltaJ => multiple::delta_j,
        PassKind::IrradianceN => multiple::irradiance_n,
        PassKind::InscatterN => multiple::inscatter_n,
        PassKind::CopyInscatterN => copy::copy_inscatter_n,
    }
}

fn one(texel: Vector4<f32>) -> TexelOutputs {
    [texel, Vector4::zeros()]
}
