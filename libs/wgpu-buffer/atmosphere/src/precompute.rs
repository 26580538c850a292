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
    backend::{ComputeBackend, Dispatch, PassUniforms},
    config::AtmosphereConfig,
    dump::dump_table,
    earth_consts::AtmosphereParameters,
    schedule::{PassDescriptor, PassSchedule, Step},
    table_helpers::{TableDimensions, TableHelpers},
    tables::{OutputTable, TableRef, Tables},
};
use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use std::{path::Path, time::Instant};

/// Where the tables came from during initialization.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableSource {
    Cache,
    Precomputed,
}

pub struct AtmospherePrecomputer<B: ComputeBackend> {
    backend: B,
    config: AtmosphereConfig,
    schedule: PassSchedule,
    tables: Tables<B::Table>,
    prepared: bool,
}

impl<B: ComputeBackend> AtmospherePrecomputer<B> {
    /// Allocate every table up front; nothing is computed until
    /// `initialize` or `precompute`.
    pub fn new(mut backend: B, config: AtmosphereConfig) -> Result<Self> {
        config.parameters().validate()?;
        let schedule = PassSchedule::build(config.max_scattering_order())?;
        let dims = *config.dimensions();
        let tables = Tables::try_new(|kind| backend.create_table(kind, kind.extent(&dims)))?;
        trace!(
            "allocated atmosphere tables on the {} backend: {} passes scheduled",
            backend.name(),
            schedule.passes().count()
        );
        Ok(Self {
            backend,
            config,
            schedule,
            tables,
            prepared: false,
        })
    }

    /// Load the cached tables or precompute them. Any failure leaves the
    /// atmosphere unavailable and is reported as `false`.
    pub fn initialize(&mut self) -> bool {
        match self.try_initialize() {
            Ok(source) => {
                debug!("atmosphere tables ready from {:?}", source);
                true
            }
            Err(err) => {
                error!("atmosphere unavailable: {:#}", err);
                false
            }
        }
    }

    pub fn try_initialize(&mut self) -> Result<TableSource> {
        self.prepare()?;
        if !self.config.force_precompute() && self.load_cached_textures()? {
            return Ok(TableSource::Cache);
        }
        self.precompute()?;
        if let Err(err) = self.write_textures() {
            warn!(
                "failed to cache atmosphere tables in {}: {:#}",
                self.config.cache_dir().display(),
                err
            );
        }
        Ok(TableSource::Precomputed)
    }

    fn prepare(&mut self) -> Result<()> {
        if self.prepared {
            return Ok(());
        }
        self.backend
            .upload_parameters(self.config.parameters())
            .context("uploading atmosphere parameters")?;
        self.backend
            .build_kernels(self.config.dimensions())
            .context("building atmosphere kernels")?;
        self.prepared = true;
        Ok(())
    }

    /// Run every scheduled pass, in order, with a barrier after each
    /// dispatch.
    pub fn precompute(&mut self) -> Result<()> {
        self.prepare()?;
        let start = Instant::now();
        let steps = self.schedule.steps().to_vec();
        for step in &steps {
            match step {
                Step::Reset(table) => {
                    let extent = table.kind().extent(self.config.dimensions());
                    let zeros = vec![0f32; TableHelpers::float_count(extent)];
                    self.backend
                        .write_table(self.tables.get_mut(*table), &zeros)
                        .with_context(|| format!("clearing {}", table))?;
                }
                Step::Run(pass) => self.run_pass(pass)?,
                Step::Swap(accumulator) => {
                    trace!("swap {:?}", accumulator);
                    self.tables.swap_roles(*accumulator);
                }
            }
        }
        info!(
            "precomputed {} scattering orders in {:?} on the {} backend",
            self.schedule.max_order(),
            start.elapsed(),
            self.backend.name()
        );
        Ok(())
    }

    fn run_pass(&mut self, pass: &PassDescriptor) -> Result<()> {
        let params = *self.config.parameters();
        let dims = *self.config.dimensions();
        let extent = pass.outputs()[0].kind().extent(&dims);
        let layers = if pass.is_layered() {
            extent.depth_or_array_layers
        } else {
            1
        };

        let start = Instant::now();
        for layer in 0..layers {
            let dispatch = Dispatch {
                pass,
                width: extent.width,
                height: extent.height,
                uniforms: PassUniforms::for_pass(pass, &params, &dims, layer),
            };
            self.backend
                .dispatch(&dispatch, &mut self.tables)
                .with_context(|| format!("dispatching {} layer {}", pass, layer))?;
            self.backend.barrier()?;
        }
        debug!("{}: {:?} over {} layer(s)", pass, start.elapsed(), layers);

        if let Some(dir) = self.config.dump_dir().map(Path::to_path_buf) {
            for output in pass.outputs() {
                let texels = self.read_table(*output)?;
                let prefix = format!("{}-{}-{}", pass.kind.name(), pass.order, output.kind().label());
                dump_table(&dir, &prefix, output.kind().extent(&dims), &texels)?;
            }
        }
        Ok(())
    }

    /// Load all three output tables from the cache directory. Returns
    /// false, leaving the tables untouched, if any file is missing or has
    /// the wrong size.
    pub fn load_cached_textures(&mut self) -> Result<bool> {
        let dir = self.config.cache_dir().to_owned();
        let mut loaded = Vec::with_capacity(OutputTable::ALL.len());
        for table in OutputTable::ALL {
            let path = TableHelpers::cache_path(&dir, table);
            let extent = table.kind().extent(self.config.dimensions());
            match TableHelpers::read_table(&path, extent)? {
                Some(texels) => loaded.push((table, texels)),
                None => {
                    info!("no usable atmosphere cache in {}", dir.display());
                    return Ok(false);
                }
            }
        }
        for (table, texels) in loaded {
            self.backend
                .write_table(self.tables.get_mut(table.table_ref()), &texels)
                .with_context(|| format!("uploading cached {}", table.file_name()))?;
        }
        info!("loaded atmosphere tables from {}", dir.display());
        Ok(true)
    }

    pub fn write_textures(&mut self) -> Result<()> {
        let dir = self.config.cache_dir().to_owned();
        for table in OutputTable::ALL {
            let texels = self.read_output(table)?;
            TableHelpers::write_table(&TableHelpers::cache_path(&dir, table), &texels)?;
        }
        info!("wrote atmosphere tables to {}", dir.display());
        Ok(())
    }

    pub fn transmittance_table(&self) -> &B::Table {
        self.tables.output(OutputTable::Transmittance)
    }

    pub fn irradiance_table(&self) -> &B::Table {
        self.tables.output(OutputTable::Irradiance)
    }

    pub fn inscatter_table(&self) -> &B::Table {
        self.tables.output(OutputTable::Inscatter)
    }

    /// Host copy of one of the converged tables.
    pub fn read_output(&mut self, table: OutputTable) -> Result<Vec<f32>> {
        self.read_table(table.table_ref())
    }

    /// Host copy of any table, including the scratch tables of the last
    /// order computed.
    pub fn read_table(&mut self, table: TableRef) -> Result<Vec<f32>> {
        self.backend.read_table(self.tables.get(table))
    }

    pub fn parameters(&self) -> &AtmosphereParameters {
        self.config.parameters()
    }

    pub fn dimensions(&self) -> &TableDimensions {
        self.config.dimensions()
    }

    pub fn config(&self) -> &AtmosphereConfig {
        &self.config
    }

    pub fn schedule(&self) -> &PassSchedule {
        &self.schedule
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
