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
    earth_consts::AtmosphereParameters, schedule::DEFAULT_MAX_SCATTERING_ORDER,
    table_helpers::TableDimensions,
};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(Clone, Debug, Default, StructOpt)]
pub struct AtmosphereOpts {
    /// Directory holding the precomputed tables [default: .]
    #[structopt(long, parse(from_os_str))]
    atmosphere_cache: Option<PathBuf>,

    /// Ignore any cached tables and always precompute
    #[structopt(long)]
    force_precompute: bool,

    /// Number of scattering orders to accumulate [default: 3]
    #[structopt(long)]
    scattering_orders: Option<u32>,

    /// Write every intermediate table to this directory as png layers
    #[structopt(long, parse(from_os_str))]
    dump_tables: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct AtmosphereConfig {
    parameters: AtmosphereParameters,
    dimensions: TableDimensions,
    max_scattering_order: u32,
    cache_dir: PathBuf,
    force_precompute: bool,
    dump_dir: Option<PathBuf>,
}

impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            parameters: AtmosphereParameters::default(),
            dimensions: TableDimensions::default(),
            max_scattering_order: DEFAULT_MAX_SCATTERING_ORDER,
            cache_dir: PathBuf::from("."),
            force_precompute: false,
            dump_dir: None,
        }
    }
}

impl AtmosphereConfig {
    pub fn from_opts(opts: &AtmosphereOpts) -> Self {
        let mut config = Self::default();
        if let Some(dir) = &opts.atmosphere_cache {
            config.cache_dir = dir.to_owned();
        }
        if let Some(orders) = opts.scattering_orders {
            config.max_scattering_order = orders;
        }
        config.force_precompute = opts.force_precompute;
        config.dump_dir = opts.dump_tables.clone();
        config
    }

    pub fn with_parameters(mut self, parameters: AtmosphereParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_dimensions(mut self, dimensions: TableDimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_max_scattering_order(mut self, order: u32) -> Self {
        self.max_scattering_order = order;
        self
    }

    pub fn with_cache_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cache_dir = dir.as_ref().to_owned();
        self
    }

    pub fn with_force_precompute(mut self, force: bool) -> Self {
        self.force_precompute = force;
        self
    }

    pub fn with_dump_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.dump_dir = Some(dir.as_ref().to_owned());
        self
    }

    pub fn parameters(&self) -> &AtmosphereParameters {
        &self.parameters
    }

    pub fn dimensions(&self) -> &TableDimensions {
        &self.dimensions
    }

    pub fn max_scattering_order(&self) -> u32 {
        self.max_scattering_order
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn force_precompute(&self) -> bool {
        self.force_precompute
    }

    pub fn dump_dir(&self) -> Option<&Path> {
        self.dump_dir.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_opts_match_default_config() {
        let opts = AtmosphereOpts::from_iter(&["test"]);
        let config = AtmosphereConfig::from_opts(&opts);
        assert_eq!(config.cache_dir(), Path::new("."));
        assert_eq!(config.max_scattering_order(), DEFAULT_MAX_SCATTERING_ORDER);
        assert!(!config.force_precompute());
        assert!(config.dump_dir().is_none());
        assert_eq!(config.dimensions(), &TableDimensions::default());
    }

    #[test]
    fn test_parse_opts() {
        let opts = AtmosphereOpts::from_iter(&[
            "test",
            "--atmosphere-cache",
            "/tmp/sky",
            "--force-precompute",
            "--scattering-orders",
            "5",
            "--dump-tables",
            "dump",
        ]);
        let config = AtmosphereConfig::from_opts(&opts);
        assert_eq!(config.cache_dir(), Path::new("/tmp/sky"));
        assert!(config.force_precompute());
        assert_eq!(config.max_scattering_order(), 5);
        assert_eq!(config.dump_dir(), Some(Path::new("dump")));
    }

    #[test]
    fn test_builders() {
        let params = AtmosphereParameters::default().with_ground_reflectance(0.2);
        let config = AtmosphereConfig::default()
            .with_parameters(params)
            .with_max_scattering_order(1)
            .with_cache_dir("cache")
            .with_force_precompute(true);
        assert_eq!(config.parameters().ground_reflectance, 0.2);
        assert_eq!(config.max_scattering_order(), 1);
        assert_eq!(config.cache_dir(), Path::new("cache"));
        assert!(config.force_precompute());
    }
}
