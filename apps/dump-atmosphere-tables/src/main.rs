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
use anyhow::{bail, Result};
use atmosphere::{
    value_range, AtmosphereConfig, AtmosphereOpts, AtmospherePrecomputer, ComputeBackend,
    CpuBackend, GpuBackend, OutputTable, TableSource,
};
use gpu::{GpuConfig, GpuOpts};
use log::info;
use std::{str::FromStr, time::Instant};
use structopt::StructOpt;
use tracelog::TraceLogOpts;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Backend {
    Cpu,
    Gpu,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "cpu" => Self::Cpu,
            "gpu" => Self::Gpu,
            _ => bail!("unknown backend {}; expected cpu or gpu", s),
        })
    }
}

/// Precompute the atmospheric scattering tables and write them to the
/// cache directory
#[derive(Debug, StructOpt)]
struct Opt {
    /// Where to run the precompute: cpu or gpu
    #[structopt(long, default_value = "gpu")]
    backend: Backend,

    #[structopt(flatten)]
    atmosphere_opts: AtmosphereOpts,

    #[structopt(flatten)]
    gpu_opts: GpuOpts,

    #[structopt(flatten)]
    tracelog_opts: TraceLogOpts,
}

fn run<B: ComputeBackend>(backend: B, config: AtmosphereConfig) -> Result<()> {
    let start = Instant::now();
    let mut precomputer = AtmospherePrecomputer::new(backend, config)?;
    println!("Allocate time: {:?}", start.elapsed());

    let start = Instant::now();
    let source = precomputer.try_initialize()?;
    match source {
        TableSource::Cache => println!("Load time: {:?}", start.elapsed()),
        TableSource::Precomputed => println!("Precompute time: {:?}", start.elapsed()),
    }

    for table in OutputTable::ALL {
        let texels = precomputer.read_output(table)?;
        let (lo, hi) = value_range(&texels);
        info!("{}: {} floats in {} -> {}", table.file_name(), texels.len(), lo, hi);
    }
    Ok(())
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    let tracelog = tracelog::init(&opt.tracelog_opts)?;
    if tracelog.is_tracing() {
        info!("recording a chrome trace");
    }

    let config = AtmosphereConfig::from_opts(&opt.atmosphere_opts);
    info!(
        "writing atmosphere tables to {} with {} scattering orders",
        config.cache_dir().display(),
        config.max_scattering_order()
    );
    match opt.backend {
        Backend::Cpu => run(CpuBackend::new(), config),
        Backend::Gpu => {
            let backend = GpuBackend::new_headless(GpuConfig::from_opts(&opt.gpu_opts))?;
            info!("using adapter {}", backend.gpu().adapter_info().name);
            run(backend, config)
        }
    }
}
