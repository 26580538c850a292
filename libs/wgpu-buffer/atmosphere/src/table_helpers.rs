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
use crate::tables::OutputTable;
use anyhow::{ensure, Context, Result};
use log::{trace, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};
use zerocopy::AsBytes;

pub const TRANSMITTANCE_EXTENT: wgpu::Extent3d = wgpu::Extent3d {
    width: 256,
    height: 64,
    depth_or_array_layers: 1,
};

const SCATTERING_TEXTURE_R_SIZE: u32 = 32;
const SCATTERING_TEXTURE_MU_SIZE: u32 = 128;
const SCATTERING_TEXTURE_MU_S_SIZE: u32 = 32;
const SCATTERING_TEXTURE_NU_SIZE: u32 = 8;
pub const SCATTERING_EXTENT: wgpu::Extent3d = wgpu::Extent3d {
    width: SCATTERING_TEXTURE_NU_SIZE * SCATTERING_TEXTURE_MU_S_SIZE,
    height: SCATTERING_TEXTURE_MU_SIZE,
    depth_or_array_layers: SCATTERING_TEXTURE_R_SIZE,
};

pub const IRRADIANCE_EXTENT: wgpu::Extent3d = wgpu::Extent3d {
    width: 64,
    height: 16,
    depth_or_array_layers: 1,
};

/// Every table is RGBA.
pub const CHANNELS: usize = 4;

/// Table resolutions. The default is the only size the cache and the
/// renderer are built for; smaller sizes exist to keep tests quick.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableDimensions {
    pub transmittance_width: u32,
    pub transmittance_height: u32,
    pub irradiance_width: u32,
    pub irradiance_height: u32,
    pub scattering_r: u32,
    pub scattering_mu: u32,
    pub scattering_mu_s: u32,
    pub scattering_nu: u32,
}

impl Default for TableDimensions {
    fn default() -> Self {
        Self {
            transmittance_width: TRANSMITTANCE_EXTENT.width,
            transmittance_height: TRANSMITTANCE_EXTENT.height,
            irradiance_width: IRRADIANCE_EXTENT.width,
            irradiance_height: IRRADIANCE_EXTENT.height,
            scattering_r: SCATTERING_TEXTURE_R_SIZE,
            scattering_mu: SCATTERING_TEXTURE_MU_SIZE,
            scattering_mu_s: SCATTERING_TEXTURE_MU_S_SIZE,
            scattering_nu: SCATTERING_TEXTURE_NU_SIZE,
        }
    }
}

impl TableDimensions {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.transmittance_width >= 2 && self.transmittance_height >= 2,
            "transmittance table must be at least 2x2"
        );
        ensure!(
            self.irradiance_width >= 2 && self.irradiance_height >= 2,
            "irradiance table must be at least 2x2"
        );
        ensure!(
            self.scattering_mu >= 4 && self.scattering_mu % 2 == 0,
            "scattering mu resolution must be even and at least 4; got {}",
            self.scattering_mu
        );
        ensure!(
            self.scattering_r >= 2 && self.scattering_mu_s >= 2 && self.scattering_nu >= 2,
            "scattering r, mu_s and nu resolutions must be at least 2"
        );
        Ok(())
    }

    pub fn transmittance_extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.transmittance_width,
            height: self.transmittance_height,
            depth_or_array_layers: 1,
        }
    }

    pub fn irradiance_extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.irradiance_width,
            height: self.irradiance_height,
            depth_or_array_layers: 1,
        }
    }

    pub fn scattering_extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.scattering_nu * self.scattering_mu_s,
            height: self.scattering_mu,
            depth_or_array_layers: self.scattering_r,
        }
    }
}

pub struct TableHelpers;

impl TableHelpers {
    pub fn texel_count(extent: wgpu::Extent3d) -> usize {
        extent.width as usize * extent.height as usize * extent.depth_or_array_layers as usize
    }

    pub fn float_count(extent: wgpu::Extent3d) -> usize {
        Self::texel_count(extent) * CHANNELS
    }

    pub fn cache_path(cache_dir: &Path, table: OutputTable) -> PathBuf {
        cache_dir.join(table.file_name())
    }

    /// Read one raw table. A missing or unreadable file, or one whose length
    /// does not match `extent`, is a cache miss rather than an error.
    pub fn read_table(path: &Path, extent: wgpu::Extent3d) -> Result<Option<Vec<f32>>> {
        let expect_bytes = (Self::float_count(extent) * 4) as u64;
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => {
                trace!("no cached table at {}", path.display());
                return Ok(None);
            }
        };
        if !metadata.is_file() {
            warn!("ignoring cached table {}: not a regular file", path.display());
            return Ok(None);
        }
        if metadata.len() != expect_bytes {
            warn!(
                "ignoring cached table {}: {} bytes on disk, expected {}",
                path.display(),
                metadata.len(),
                expect_bytes
            );
            return Ok(None);
        }

        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("ignoring cached table {}: {}", path.display(), err);
                return Ok(None);
            }
        };
        if raw.len() as u64 != expect_bytes {
            warn!("ignoring cached table {}: changed size while reading", path.display());
            return Ok(None);
        }
        let mut texels = vec![0f32; Self::float_count(extent)];
        texels.as_bytes_mut().copy_from_slice(&raw);
        Ok(Some(texels))
    }

    pub fn write_table(path: &Path, texels: &[f32]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        trace!("writing {} floats to {}", texels.len(), path.display());
        fs::write(path, texels.as_bytes()).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::{
        env,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// A fresh, empty scratch directory under the system temp dir.
    pub(crate) fn scratch_dir(name: &str) -> Result<PathBuf> {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = env::temp_dir().join(format!(
            "atmosphere-{}-{}-{}",
            name,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    #[test]
    fn test_default_extents() {
        let dims = TableDimensions::default();
        assert_eq!(dims.transmittance_extent(), TRANSMITTANCE_EXTENT);
        assert_eq!(dims.irradiance_extent(), IRRADIANCE_EXTENT);
        assert_eq!(dims.scattering_extent(), SCATTERING_EXTENT);
        assert_eq!(TableHelpers::float_count(SCATTERING_EXTENT), 256 * 128 * 32 * 4);
    }

    #[test]
    fn test_reject_odd_mu() {
        let dims = TableDimensions {
            scattering_mu: 7,
            ..Default::default()
        };
        assert!(dims.validate().is_err());
        assert!(TableDimensions::default().validate().is_ok());
    }

    #[test]
    fn test_table_file_round_trip() -> Result<()> {
        let dir = scratch_dir("table-file")?;
        let extent = wgpu::Extent3d {
            width: 3,
            height: 2,
            depth_or_array_layers: 1,
        };
        let texels = (0..24).map(|i| i as f32 * 0.5).collect::<Vec<_>>();
        let path = TableHelpers::cache_path(&dir.join("nested"), OutputTable::Irradiance);
        TableHelpers::write_table(&path, &texels)?;
        assert_eq!(TableHelpers::read_table(&path, extent)?, Some(texels));
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn test_wrong_size_is_a_miss() -> Result<()> {
        let dir = scratch_dir("table-size")?;
        let path = TableHelpers::cache_path(&dir, OutputTable::Transmittance);
        fs::write(&path, [0u8; 12])?;
        assert_eq!(TableHelpers::read_table(&path, TRANSMITTANCE_EXTENT)?, None);
        let missing = TableHelpers::cache_path(&dir, OutputTable::Inscatter);
        assert_eq!(TableHelpers::read_table(&missing, SCATTERING_EXTENT)?, None);
        fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn test_unreadable_file_is_a_miss() -> Result<()> {
        let dir = scratch_dir("table-unreadable")?;
        let path = TableHelpers::cache_path(&dir, OutputTable::Inscatter);
        fs::create_dir_all(&path)?;
        let extent = wgpu::Extent3d {
            width: fs::metadata(&path)?.len() as u32 / 16,
            height: 1,
            depth_or_array_layers: 1,
        };
        assert_eq!(TableHelpers::read_table(&path, extent)?, None);
        fs::remove_dir_all(dir)?;
        Ok(())
    }
}
