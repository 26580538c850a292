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
use crate::table_helpers::{TableHelpers, CHANNELS};
use anyhow::{anyhow, ensure, Context, Result};
use image::{ImageBuffer, Luma, Rgb};
use log::debug;
use std::{fs, path::Path};

const EXPOSURE: f32 = 10.0;

/// Simple exposure and gamma so that tables with wildly different ranges
/// are all visible as images.
fn tonemap(v: f32) -> u8 {
    let mapped = (1.0 - (-v * EXPOSURE).exp()).powf(1.0 / 2.2);
    if mapped.is_nan() {
        return 0;
    }
    (mapped.clamp(0.0, 1.0) * 255.0) as u8
}

/// The smallest and largest value in `texels`.
pub fn value_range(texels: &[f32]) -> (f32, f32) {
    texels
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
}

/// Split RGBA floats into tone mapped rgb and alpha byte planes.
fn split_pixels(texels: &[f32]) -> (Vec<u8>, Vec<u8>) {
    let count = texels.len() / CHANNELS;
    let mut rgb = Vec::with_capacity(count * 3);
    let mut alpha = Vec::with_capacity(count);
    for texel in texels.chunks_exact(CHANNELS) {
        rgb.push(tonemap(texel[0]));
        rgb.push(tonemap(texel[1]));
        rgb.push(tonemap(texel[2]));
        alpha.push(tonemap(texel[3]));
    }
    (rgb, alpha)
}

fn save_layered(
    data: &[u8],
    px_size: usize,
    extent: wgpu::Extent3d,
    dir: &Path,
    prefix: &str,
) -> Result<()> {
    let layer_size = (extent.width * extent.height) as usize * px_size;
    for (layer_num, layer) in data.chunks_exact(layer_size).enumerate() {
        let path = dir.join(format!("{}-layer{:02}.png", prefix, layer_num));
        if px_size == 3 {
            ImageBuffer::<Rgb<u8>, _>::from_raw(extent.width, extent.height, layer)
                .ok_or_else(|| anyhow!("layer buffer too small for {}", path.display()))?
                .save(&path)
                .with_context(|| format!("saving {}", path.display()))?;
        } else {
            ImageBuffer::<Luma<u8>, _>::from_raw(extent.width, extent.height, layer)
                .ok_or_else(|| anyhow!("layer buffer too small for {}", path.display()))?
                .save(&path)
                .with_context(|| format!("saving {}", path.display()))?;
        }
    }
    Ok(())
}

/// Write `texels` as one rgb png and one alpha png per z layer.
pub fn dump_table(dir: &Path, prefix: &str, extent: wgpu::Extent3d, texels: &[f32]) -> Result<()> {
    ensure!(
        texels.len() == TableHelpers::float_count(extent),
        "cannot dump {}: {} floats for extent {:?}",
        prefix,
        texels.len(),
        extent
    );
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let (lo, hi) = value_range(texels);
    debug!("dumping {}: range {} -> {}", prefix, lo, hi);
    let (rgb, alpha) = split_pixels(texels);
    save_layered(&rgb, 3, extent, dir, &format!("{}-rgb", prefix))?;
    save_layered(&alpha, 1, extent, dir, &format!("{}-a", prefix))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::table_helpers::test::scratch_dir;

    #[test]
    fn test_tonemap_bounds() {
        assert_eq!(tonemap(0.0), 0);
        assert_eq!(tonemap(1e9), 255);
        assert_eq!(tonemap(f32::NAN), 0);
        assert_eq!(tonemap(-1.0), 0);
    }

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(&[0.5, -2.0, 3.0, 1.0]), (-2.0, 3.0));
    }

    #[test]
    fn test_dump_writes_layers() -> Result<()> {
        let dir = scratch_dir("dump")?;
        let extent = wgpu::Extent3d {
            width: 4,
            height: 2,
            depth_or_array_layers: 3,
        };
        let texels = (0..TableHelpers::float_count(extent))
            .map(|i| i as f32 / 100.0)
            .collect::<Vec<_>>();
        dump_table(&dir, "deltaJ-2", extent, &texels)?;
        for layer in 0..3 {
            assert!(dir.join(format!("deltaJ-2-rgb-layer{:02}.png", layer)).exists());
            assert!(dir.join(format!("deltaJ-2-a-layer{:02}.png", layer)).exists());
        }
        assert!(dump_table(&dir, "short", extent, &texels[1..]).is_err());
        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
