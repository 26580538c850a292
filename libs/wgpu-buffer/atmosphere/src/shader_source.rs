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
    kernels::{
        INSCATTER_INTEGRAL_SAMPLES, INSCATTER_SPHERICAL_INTEGRAL_SAMPLES,
        IRRADIANCE_INTEGRAL_SAMPLES, TRANSMITTANCE_INTEGRAL_SAMPLES,
    },
    schedule::PassKind,
    table_helpers::TableDimensions,
};

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

pub fn entry_source(kind: PassKind) -> &'static str {
    match kind {
        PassKind::Transmittance => include_str!("shaders/transmittance.wgsl"),
        PassKind::IrradianceSingle => include_str!("shaders/irradiance_single.wgsl"),
        PassKind::InscatterSingle => include_str!("shaders/inscatter_single.wgsl"),
        PassKind::CopyIrradiance => include_str!("shaders/copy_irradiance.wgsl"),
        PassKind::CopyInscatterSingle => include_str!("shaders/copy_inscatter_single.wgsl"),
        PassKind::DeltaJ => include_str!("shaders/delta_j.wgsl"),
        PassKind::IrradianceN => include_str!("shaders/irradiance_n.wgsl"),
        PassKind::InscatterN => include_str!("shaders/inscatter_n.wgsl"),
        PassKind::CopyInscatterN => include_str!("shaders/copy_inscatter_n.wgsl"),
    }
}

/// Table sizes and sample counts as wgsl constants, so that the kernels
/// agree with the tables they are dispatched over.
pub fn prelude(dims: &TableDimensions) -> String {
    let mut out = String::new();
    let mut float = |name: &str, value: u32| {
        out.push_str(&format!("const {}: f32 = {}.0;\n", name, value));
    };
    float("TRANSMITTANCE_W", dims.transmittance_width);
    float("TRANSMITTANCE_H", dims.transmittance_height);
    float("SKY_W", dims.irradiance_width);
    float("SKY_H", dims.irradiance_height);
    float("RES_R", dims.scattering_r);
    float("RES_MU", dims.scattering_mu);
    float("RES_MU_S", dims.scattering_mu_s);
    float("RES_NU", dims.scattering_nu);
    for (name, value) in [
        ("TRANSMITTANCE_INTEGRAL_SAMPLES", TRANSMITTANCE_INTEGRAL_SAMPLES),
        ("INSCATTER_INTEGRAL_SAMPLES", INSCATTER_INTEGRAL_SAMPLES),
        ("IRRADIANCE_INTEGRAL_SAMPLES", IRRADIANCE_INTEGRAL_SAMPLES),
        (
            "INSCATTER_SPHERICAL_INTEGRAL_SAMPLES",
            INSCATTER_SPHERICAL_INTEGRAL_SAMPLES,
        ),
    ] {
        out.push_str(&format!("const {}: i32 = {};\n", name, value));
    }
    out
}

/// The complete module for one pass: prelude, shared helpers, then the
/// pass entry point.
pub fn kernel_source(kind: PassKind, dims: &TableDimensions) -> String {
    format!(
        "{}\n{}\n{}",
        prelude(dims),
        COMMON_WGSL,
        entry_source(kind)
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::{anyhow, Result};

    fn validate(kind: PassKind, dims: &TableDimensions) -> Result<naga::Module> {
        let source = kernel_source(kind, dims);
        let module = naga::front::wgsl::parse_str(&source)
            .map_err(|err| anyhow!("{}: {}", kind.name(), err.emit_to_string(&source)))?;
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|err| anyhow!("{}: {:?}", kind.name(), err))?;
        Ok(module)
    }

    #[test]
    fn test_all_kernels_validate() -> Result<()> {
        let reduced = TableDimensions {
            transmittance_width: 32,
            transmittance_height: 8,
            irradiance_width: 8,
            irradiance_height: 4,
            scattering_r: 4,
            scattering_mu: 8,
            scattering_mu_s: 4,
            scattering_nu: 2,
        };
        for dims in [TableDimensions::default(), reduced] {
            for kind in PassKind::ALL {
                let module = validate(kind, &dims)?;
                assert!(module.entry_points.iter().any(|ep| ep.name == "main"));
            }
        }
        Ok(())
    }

    #[test]
    fn test_binding_count_matches_pass() -> Result<()> {
        let dims = TableDimensions::default();
        for kind in PassKind::ALL {
            let module = validate(kind, &dims)?;
            let bound = module
                .global_variables
                .iter()
                .filter(|(_, var)| var.binding.is_some())
                .count();
            assert_eq!(bound, 2 + kind.inputs().len() + kind.outputs().len());
        }
        Ok(())
    }

    #[test]
    fn test_prelude_uses_dimensions() {
        let source = prelude(&TableDimensions::default());
        assert!(source.contains("const RES_MU: f32 = 128.0;"));
        assert!(source.contains("const TRANSMITTANCE_INTEGRAL_SAMPLES: i32 = 500;"));
        assert_eq!(source.lines().count(), 12);
        assert!(source.lines().all(|line| line.starts_with("const ") && line.ends_with(';')));
    }
}
