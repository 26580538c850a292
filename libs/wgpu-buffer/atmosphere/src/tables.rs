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
    ping_pong::{PingPong, Role},
    table_helpers::TableDimensions,
};
use anyhow::Result;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TableKind {
    Transmittance,
    Irradiance,
    Inscatter,
    DeltaIrradiance,
    DeltaRayleigh,
    DeltaMie,
    DeltaJ,
}

impl TableKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transmittance => "atmosphere-transmittance-texture",
            Self::Irradiance => "atmosphere-irradiance-texture",
            Self::Inscatter => "atmosphere-inscatter-texture",
            Self::DeltaIrradiance => "atmosphere-delta-irradiance-texture",
            Self::DeltaRayleigh => "atmosphere-delta-rayleigh-texture",
            Self::DeltaMie => "atmosphere-delta-mie-texture",
            Self::DeltaJ => "atmosphere-delta-j-texture",
        }
    }

    /// Scattering tables are 3D; everything else is a flat 2D table.
    pub fn is_volume(&self) -> bool {
        matches!(
            self,
            Self::Inscatter | Self::DeltaRayleigh | Self::DeltaMie | Self::DeltaJ
        )
    }

    pub fn extent(&self, dims: &TableDimensions) -> wgpu::Extent3d {
        match self {
            Self::Transmittance => dims.transmittance_extent(),
            Self::Irradiance | Self::DeltaIrradiance => dims.irradiance_extent(),
            Self::Inscatter | Self::DeltaRayleigh | Self::DeltaMie | Self::DeltaJ => {
                dims.scattering_extent()
            }
        }
    }
}

/// The two double buffered accumulators.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Accumulator {
    Irradiance,
    Inscatter,
}

/// A logical table binding. Accumulators are named by role, so that the
/// same reference resolves to a different physical slot after a swap.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TableRef {
    Transmittance,
    Irradiance(Role),
    Inscatter(Role),
    DeltaIrradiance,
    DeltaRayleigh,
    DeltaMie,
    DeltaJ,
}

impl TableRef {
    pub fn kind(&self) -> TableKind {
        match self {
            Self::Transmittance => TableKind::Transmittance,
            Self::Irradiance(_) => TableKind::Irradiance,
            Self::Inscatter(_) => TableKind::Inscatter,
            Self::DeltaIrradiance => TableKind::DeltaIrradiance,
            Self::DeltaRayleigh => TableKind::DeltaRayleigh,
            Self::DeltaMie => TableKind::DeltaMie,
            Self::DeltaJ => TableKind::DeltaJ,
        }
    }

    pub fn accumulator(&self) -> Option<Accumulator> {
        match self {
            Self::Irradiance(_) => Some(Accumulator::Irradiance),
            Self::Inscatter(_) => Some(Accumulator::Inscatter),
            _ => None,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Transmittance => write!(f, "transmittance"),
            Self::Irradiance(Role::Read) => write!(f, "irradiance[read]"),
            Self::Irradiance(Role::Write) => write!(f, "irradiance[write]"),
            Self::Inscatter(Role::Read) => write!(f, "inscatter[read]"),
            Self::Inscatter(Role::Write) => write!(f, "inscatter[write]"),
            Self::DeltaIrradiance => write!(f, "deltaE"),
            Self::DeltaRayleigh => write!(f, "deltaSR"),
            Self::DeltaMie => write!(f, "deltaSM"),
            Self::DeltaJ => write!(f, "deltaJ"),
        }
    }
}

/// The three converged tables that are persisted and handed to the renderer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OutputTable {
    Transmittance,
    Irradiance,
    Inscatter,
}

impl OutputTable {
    pub const ALL: [OutputTable; 3] = [Self::Transmittance, Self::Irradiance, Self::Inscatter];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Transmittance => "transmittance.raw",
            Self::Irradiance => "irradiance.raw",
            Self::Inscatter => "inscatter.raw",
        }
    }

    pub fn table_ref(&self) -> TableRef {
        match self {
            Self::Transmittance => TableRef::Transmittance,
            Self::Irradiance => TableRef::Irradiance(Role::Read),
            Self::Inscatter => TableRef::Inscatter(Role::Read),
        }
    }

    pub fn kind(&self) -> TableKind {
        self.table_ref().kind()
    }
}

/// Every table the precompute touches, owned in one place.
#[derive(Debug)]
pub struct Tables<T> {
    transmittance: T,
    irradiance: PingPong<T>,
    inscatter: PingPong<T>,
    delta_irradiance: T,
    delta_rayleigh: T,
    delta_mie: T,
    delta_j: T,
}

impl<T> Tables<T> {
    pub fn try_new<F>(mut allocate: F) -> Result<Self>
    where
        F: FnMut(TableKind) -> Result<T>,
    {
        Ok(Self {
            transmittance: allocate(TableKind::Transmittance)?,
            irradiance: PingPong::new(
                allocate(TableKind::Irradiance)?,
                allocate(TableKind::Irradiance)?,
            ),
            inscatter: PingPong::new(
                allocate(TableKind::Inscatter)?,
                allocate(TableKind::Inscatter)?,
            ),
            delta_irradiance: allocate(TableKind::DeltaIrradiance)?,
            delta_rayleigh: allocate(TableKind::DeltaRayleigh)?,
            delta_mie: allocate(TableKind::DeltaMie)?,
            delta_j: allocate(TableKind::DeltaJ)?,
        })
    }

    pub fn get(&self, table: TableRef) -> &T {
        match table {
            TableRef::Transmittance => &self.transmittance,
            TableRef::Irradiance(role) => self.irradiance.get(role),
            TableRef::Inscatter(role) => self.inscatter.get(role),
            TableRef::DeltaIrradiance => &self.delta_irradiance,
            TableRef::DeltaRayleigh => &self.delta_rayleigh,
            TableRef::DeltaMie => &self.delta_mie,
            TableRef::DeltaJ => &self.delta_j,
        }
    }

    pub fn get_mut(&mut self, table: TableRef) -> &mut T {
        match table {
            TableRef::Transmittance => &mut self.transmittance,
            TableRef::Irradiance(role) => self.irradiance.get_mut(role),
            TableRef::Inscatter(role) => self.inscatter.get_mut(role),
            TableRef::DeltaIrradiance => &mut self.delta_irradiance,
            TableRef::DeltaRayleigh => &mut self.delta_rayleigh,
            TableRef::DeltaMie => &mut self.delta_mie,
            TableRef::DeltaJ => &mut self.delta_j,
        }
    }

    pub fn output(&self, table: OutputTable) -> &T {
        self.get(table.table_ref())
    }

    pub fn swap_roles(&mut self, accumulator: Accumulator) {
        match accumulator {
            Accumulator::Irradiance => self.irradiance.swap_roles(),
            Accumulator::Inscatter => self.inscatter.swap_roles(),
        }
    }

    pub fn read_index(&self, accumulator: Accumulator) -> usize {
        match accumulator {
            Accumulator::Irradiance => self.irradiance.read_index(),
            Accumulator::Inscatter => self.inscatter.read_index(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn numbered() -> Result<Tables<usize>> {
        let mut next = 0;
        Tables::try_new(|_| {
            next += 1;
            Ok(next)
        })
    }

    #[test]
    fn test_roles_resolve_through_swap() -> Result<()> {
        let mut tables = numbered()?;
        let read = *tables.get(TableRef::Irradiance(Role::Read));
        let write = *tables.get(TableRef::Irradiance(Role::Write));
        assert_ne!(read, write);
        tables.swap_roles(Accumulator::Irradiance);
        assert_eq!(*tables.get(TableRef::Irradiance(Role::Read)), write);
        assert_eq!(*tables.get(TableRef::Irradiance(Role::Write)), read);
        assert_eq!(tables.read_index(Accumulator::Irradiance), 1);
        assert_eq!(tables.read_index(Accumulator::Inscatter), 0);
        Ok(())
    }

    #[test]
    fn test_all_slots_distinct() -> Result<()> {
        let tables = numbered()?;
        let mut ids = [
            TableRef::Transmittance,
            TableRef::Irradiance(Role::Read),
            TableRef::Irradiance(Role::Write),
            TableRef::Inscatter(Role::Read),
            TableRef::Inscatter(Role::Write),
            TableRef::DeltaIrradiance,
            TableRef::DeltaRayleigh,
            TableRef::DeltaMie,
            TableRef::DeltaJ,
        ]
        .iter()
        .map(|r| *tables.get(*r))
        .collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 9);
        Ok(())
    }

    #[test]
    fn test_volume_extents() {
        let dims = TableDimensions::default();
        assert!(TableKind::DeltaJ.is_volume());
        assert!(!TableKind::DeltaIrradiance.is_volume());
        let extent = TableKind::Inscatter.extent(&dims);
        assert_eq!(extent.width, 256);
        assert_eq!(extent.height, 128);
        assert_eq!(extent.depth_or_array_layers, 32);
        assert_eq!(OutputTable::Irradiance.kind(), TableKind::Irradiance);
    }
}
