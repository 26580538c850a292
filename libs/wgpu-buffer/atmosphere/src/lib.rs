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

// The model here follows the 2008 paper and reference code:
//     Precomputed Atmospheric Scattering
//     Eric Bruneton and Fabrice Neyret
//     https://hal.inria.fr/inria-00288758
// All errors and omissions below were introduced in transcription
// to Rust/wgpu and are not reflective of the high quality of the
// original work in any way.
mod backend;
mod config;
mod cpu_backend;
mod dump;
mod earth_consts;
mod gpu_backend;
mod kernels;
mod ping_pong;
mod precompute;
mod schedule;
mod shader_source;
mod table_helpers;
mod tables;

pub use crate::{
    backend::{ComputeBackend, Dispatch, PassUniforms},
    config::{AtmosphereConfig, AtmosphereOpts},
    cpu_backend::{CpuBackend, CpuTable},
    dump::{dump_table, value_range},
    earth_consts::AtmosphereParameters,
    gpu_backend::{GpuBackend, GpuTable, BLOCK_SIZE, TABLE_FORMAT},
    kernels::{
        INSCATTER_INTEGRAL_SAMPLES, INSCATTER_SPHERICAL_INTEGRAL_SAMPLES,
        IRRADIANCE_INTEGRAL_SAMPLES, TRANSMITTANCE_INTEGRAL_SAMPLES,
    },
    ping_pong::{PingPong, Role},
    precompute::{AtmospherePrecomputer, TableSource},
    schedule::{PassDescriptor, PassKind, PassSchedule, Step, DEFAULT_MAX_SCATTERING_ORDER},
    shader_source::{entry_source, kernel_source, prelude},
    table_helpers::{
        TableDimensions, TableHelpers, IRRADIANCE_EXTENT, SCATTERING_EXTENT, TRANSMITTANCE_EXTENT,
    },
    tables::{Accumulator, OutputTable, TableKind, TableRef, Tables},
};
