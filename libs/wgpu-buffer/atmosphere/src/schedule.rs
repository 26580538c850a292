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
    ping_pong::Role,
    tables::{Accumulator, OutputTable, TableRef, Tables},
};
use anyhow::{bail, ensure, Result};
use std::{collections::HashSet, fmt};

pub const DEFAULT_MAX_SCATTERING_ORDER: u32 = 3;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PassKind {
    Transmittance,
    IrradianceSingle,
    InscatterSingle,
    CopyIrradiance,
    CopyInscatterSingle,
    DeltaJ,
    IrradianceN,
    InscatterN,
    CopyInscatterN,
}

impl PassKind {
    pub const ALL: [PassKind; 9] = [
        Self::Transmittance,
        Self::IrradianceSingle,
        Self::InscatterSingle,
        Self::CopyIrradiance,
        Self::CopyInscatterSingle,
        Self::DeltaJ,
        Self::IrradianceN,
        Self::InscatterN,
        Self::CopyInscatterN,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Transmittance => "transmittance",
            Self::IrradianceSingle => "irradiance1",
            Self::InscatterSingle => "inscatter1",
            Self::CopyIrradiance => "copy-irradiance",
            Self::CopyInscatterSingle => "copy-inscatter1",
            Self::DeltaJ => "inscatter-s",
            Self::IrradianceN => "irradiance-n",
            Self::InscatterN => "inscatter-n",
            Self::CopyInscatterN => "copy-inscatter-n",
        }
    }

    /// Tables bound for sampling, in binding order.
    pub fn inputs(&self) -> &'static [TableRef] {
        match self {
            Self::Transmittance => &[],
            Self::IrradianceSingle => &[TableRef::Transmittance],
            Self::InscatterSingle => &[TableRef::Transmittance],
            Self::CopyIrradiance => &[
                TableRef::Irradiance(Role::Read),
                TableRef::DeltaIrradiance,
            ],
            Self::CopyInscatterSingle => &[TableRef::DeltaRayleigh, TableRef::DeltaMie],
            Self::DeltaJ => &[
                TableRef::Transmittance,
                TableRef::DeltaIrradiance,
                TableRef::DeltaRayleigh,
                TableRef::DeltaMie,
            ],
            Self::IrradianceN => &[TableRef::DeltaRayleigh, TableRef::DeltaMie],
            Self::InscatterN => &[TableRef::Transmittance, TableRef::DeltaJ],
            Self::CopyInscatterN => &[TableRef::Inscatter(Role::Read), TableRef::DeltaRayleigh],
        }
    }

    /// Tables bound for writing, in binding order after the inputs.
    pub fn outputs(&self) -> &'static [TableRef] {
        match self {
            Self::Transmittance => &[TableRef::Transmittance],
            Self::IrradianceSingle => &[TableRef::DeltaIrradiance],
            Self::InscatterSingle => &[TableRef::DeltaRayleigh, TableRef::DeltaMie],
            Self::CopyIrradiance => &[TableRef::Irradiance(Role::Write)],
            Self::CopyInscatterSingle => &[TableRef::Inscatter(Role::Write)],
            Self::DeltaJ => &[TableRef::DeltaJ],
            Self::IrradianceN => &[TableRef::DeltaIrradiance],
            Self::InscatterN => &[TableRef::DeltaRayleigh],
            Self::CopyInscatterN => &[TableRef::Inscatter(Role::Write)],
        }
    }

    /// Layered passes write a 3D table one radius slice per dispatch.
    pub fn is_layered(&self) -> bool {
        self.outputs()[0].kind().is_volume()
    }
}

/// One dispatchable pass with the per-pass constants it needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassDescriptor {
    pub kind: PassKind,
    /// The scattering order this pass contributes to.
    pub order: u32,
    /// Weight of deltaE when accumulating irradiance.
    pub copy_scale: f32,
    /// Whether the delta tables still hold single scattering, which is
    /// stored without its phase function applied.
    pub first_order: bool,
}

impl PassDescriptor {
    pub fn new(kind: PassKind, order: u32) -> Self {
        Self {
            kind,
            order,
            copy_scale: 0.0,
            first_order: false,
        }
    }

    pub fn with_copy_scale(mut self, copy_scale: f32) -> Self {
        self.copy_scale = copy_scale;
        self
    }

    pub fn with_first_order(mut self, first_order: bool) -> Self {
        self.first_order = first_order;
        self
    }

    pub fn inputs(&self) -> &'static [TableRef] {
        self.kind.inputs()
    }

    pub fn outputs(&self) -> &'static [TableRef] {
        self.kind.outputs()
    }

    pub fn is_layered(&self) -> bool {
        self.kind.is_layered()
    }
}

impl fmt::Display for PassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.kind.name(), self.order)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    /// Zero a table before it is first accumulated into.
    Reset(TableRef),
    Run(PassDescriptor),
    /// Publish the write slot of an accumulator as its read slot.
    Swap(Accumulator),
}

/// The fixed, data-driven sequence of passes.
#[derive(Clone, Debug)]
pub struct PassSchedule {
    max_order: u32,
    steps: Vec<Step>,
}

impl PassSchedule {
    pub fn build(max_order: u32) -> Result<Self> {
        ensure!(
            max_order >= 1,
            "scattering order must be at least 1; got {}",
            max_order
        );
        let mut steps = vec![
            Step::Reset(TableRef::Irradiance(Role::Read)),
            Step::Run(PassDescriptor::new(PassKind::Transmittance, 1)),
            Step::Run(PassDescriptor::new(PassKind::IrradianceSingle, 1)),
            Step::Run(PassDescriptor::new(PassKind::InscatterSingle, 1)),
            Step::Run(PassDescriptor::new(PassKind::CopyIrradiance, 1).with_copy_scale(0.0)),
            Step::Swap(Accumulator::Irradiance),
        ];
        // Single scattering reaches the output once, either on the way
        // into the first multiple scattering order or on its own.
        let copy_single = [
            Step::Run(PassDescriptor::new(PassKind::CopyInscatterSingle, 1)),
            Step::Swap(Accumulator::Inscatter),
        ];
        if max_order == 1 {
            steps.extend_from_slice(&copy_single);
        }
        for order in 2..=max_order {
            let first_order = order == 2;
            if first_order {
                steps.extend_from_slice(&copy_single);
            }
            steps.extend_from_slice(&[
                Step::Run(
                    PassDescriptor::new(PassKind::DeltaJ, order).with_first_order(first_order),
                ),
                Step::Run(
                    PassDescriptor::new(PassKind::IrradianceN, order)
                        .with_first_order(first_order),
                ),
                Step::Run(PassDescriptor::new(PassKind::InscatterN, order)),
                Step::Run(PassDescriptor::new(PassKind::CopyIrradiance, order).with_copy_scale(1.0)),
                Step::Swap(Accumulator::Irradiance),
                Step::Run(PassDescriptor::new(PassKind::CopyInscatterN, order)),
                Step::Swap(Accumulator::Inscatter),
            ]);
        }
        let schedule = Self { max_order, steps };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn max_order(&self) -> u32 {
        self.max_order
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn passes(&self) -> impl Iterator<Item = &PassDescriptor> + '_ {
        self.steps.iter().filter_map(|step| match step {
            Step::Run(pass) => Some(pass),
            _ => None,
        })
    }

    /// Replay the schedule against numbered slots and check that no pass
    /// reads a slot nobody wrote, no pass reads and writes the same
    /// physical slot, every accumulator write is published, and every
    /// output table ends up written.
    pub fn validate(&self) -> Result<()> {
        let mut next = 0usize;
        let mut tables = Tables::try_new(|_| {
            next += 1;
            Ok(next)
        })?;
        let mut written = HashSet::new();
        let mut unpublished = HashSet::new();
        for step in &self.steps {
            match step {
                Step::Reset(table) => {
                    written.insert(*tables.get(*table));
                }
                Step::Run(pass) => {
                    let mut reads = HashSet::new();
                    for input in pass.inputs() {
                        let slot = *tables.get(*input);
                        ensure!(
                            written.contains(&slot),
                            "pass {} reads {} before anything writes it",
                            pass,
                            input
                        );
                        reads.insert(slot);
                    }
                    for output in pass.outputs() {
                        let slot = *tables.get(*output);
                        ensure!(
                            !reads.contains(&slot),
                            "pass {} reads and writes the same slot through {}",
                            pass,
                            output
                        );
                        written.insert(slot);
                        if let Some(accumulator) = output.accumulator() {
                            unpublished.insert(accumulator);
                        }
                    }
                }
                Step::Swap(accumulator) => {
                    if !unpublished.remove(accumulator) {
                        bail!("swap of {:?} without a pending write", accumulator);
                    }
                    tables.swap_roles(*accumulator);
                }
            }
        }
        ensure!(
            unpublished.is_empty(),
            "accumulators written but never published: {:?}",
            unpublished
        );
        for table in OutputTable::ALL {
            ensure!(
                written.contains(tables.output(table)),
                "output table {:?} is never written",
                table
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(schedule: &PassSchedule) -> Vec<PassKind> {
        schedule.passes().map(|pass| pass.kind).collect()
    }

    #[test]
    fn test_default_order() -> Result<()> {
        use PassKind::*;
        let schedule = PassSchedule::build(DEFAULT_MAX_SCATTERING_ORDER)?;
        assert_eq!(
            kinds(&schedule),
            vec![
                Transmittance,
                IrradianceSingle,
                InscatterSingle,
                CopyIrradiance,
                CopyInscatterSingle,
                DeltaJ,
                IrradianceN,
                InscatterN,
                CopyIrradiance,
                CopyInscatterN,
                DeltaJ,
                IrradianceN,
                InscatterN,
                CopyIrradiance,
                CopyInscatterN,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_first_order_flags() -> Result<()> {
        let schedule = PassSchedule::build(4)?;
        for pass in schedule.passes() {
            match pass.kind {
                PassKind::DeltaJ | PassKind::IrradianceN => {
                    assert_eq!(pass.first_order, pass.order == 2)
                }
                PassKind::CopyIrradiance => {
                    let expect = if pass.order == 1 { 0.0 } else { 1.0 };
                    assert_eq!(pass.copy_scale, expect);
                }
                _ => assert!(!pass.first_order),
            }
        }
        Ok(())
    }

    #[test]
    fn test_copy_single_runs_once() -> Result<()> {
        for max_order in 1..=5 {
            let schedule = PassSchedule::build(max_order)?;
            let copies = schedule
                .passes()
                .filter(|pass| pass.kind == PassKind::CopyInscatterSingle)
                .count();
            assert_eq!(copies, 1);
            let multiple = schedule
                .passes()
                .filter(|pass| pass.kind == PassKind::InscatterN)
                .count();
            assert_eq!(multiple as u32, max_order - 1);
        }
        Ok(())
    }

    #[test]
    fn test_reject_zero_order() {
        assert!(PassSchedule::build(0).is_err());
    }

    #[test]
    fn test_validate_catches_read_before_write() {
        let schedule = PassSchedule {
            max_order: 1,
            steps: vec![Step::Run(PassDescriptor::new(PassKind::IrradianceSingle, 1))],
        };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn test_validate_catches_missing_swap() -> Result<()> {
        let mut schedule = PassSchedule::build(2)?;
        let last_swap = schedule
            .steps
            .iter()
            .rposition(|step| *step == Step::Swap(Accumulator::Inscatter))
            .unwrap();
        schedule.steps.remove(last_swap);
        assert!(schedule.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_validate_catches_unwritten_accumulator_read() -> Result<()> {
        let mut schedule = PassSchedule::build(2)?;
        schedule
            .steps
            .retain(|step| *step != Step::Reset(TableRef::Irradiance(Role::Read)));
        assert!(schedule.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_layering() {
        assert!(!PassKind::Transmittance.is_layered());
        assert!(!PassKind::IrradianceN.is_layered());
        assert!(!PassKind::CopyIrradiance.is_layered());
        assert!(PassKind::InscatterSingle.is_layered());
        assert!(PassKind::DeltaJ.is_layered());
        assert!(PassKind::CopyInscatterN.is_layered());
    }
}
