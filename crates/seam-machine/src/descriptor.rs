// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The machine descriptor: the self-contained output of lowering.

use seam_hir::Ty;

use crate::regions::{ExceptionRegion, RegionId};
use crate::state::{Operation, Transition};

/// Identifier of a state. Monotonically assigned; 0 is the entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

/// Identifier of a local, parameter, or lowering temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// A maximal run of operations executed without suspension, ending in
/// exactly one terminal transition.
#[derive(Debug, Clone)]
pub struct State {
    pub id: StateId,
    pub ops: Vec<Operation>,
    pub transition: Transition,
}

/// A variable known to the machine.
#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub id: VarId,
    /// None for lowering temporaries.
    pub name: Option<String>,
    pub ty: Ty,
    pub is_param: bool,
}

/// A local promoted to the persistent invocation frame because its live
/// range crosses a suspension or loop-back boundary.
#[derive(Debug, Clone)]
pub struct CapturedVariable {
    pub var: VarId,
    pub name: String,
    pub ty: Ty,
    /// Frame slot index; unique and stable for the whole invocation.
    pub slot: u32,
}

/// The two states bracketing one suspension, with the variables that
/// must survive across it.
#[derive(Debug, Clone)]
pub struct SuspensionPoint {
    pub before: StateId,
    pub resume: StateId,
    pub captured: Vec<VarId>,
}

/// The finished description of one lowered method: entry state, state
/// table, frame layout, and exception dispatch table. Immutable once
/// lowering completes; consumed by an emitter or driver.
#[derive(Debug, Clone)]
pub struct MachineDescriptor {
    pub name: String,
    pub entry: StateId,
    pub states: Vec<State>,
    pub locals: Vec<LocalDecl>,
    pub params: Vec<VarId>,
    pub frame: Vec<CapturedVariable>,
    pub suspension_points: Vec<SuspensionPoint>,
    pub regions: Vec<ExceptionRegion>,
}

impl MachineDescriptor {
    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0 as usize)
    }

    pub fn local(&self, id: VarId) -> Option<&LocalDecl> {
        self.locals.get(id.0 as usize)
    }

    /// Frame slot of a variable, or `None` if it was not promoted.
    pub fn frame_slot(&self, var: VarId) -> Option<u32> {
        self.frame.iter().find(|c| c.var == var).map(|c| c.slot)
    }

    pub fn region(&self, id: RegionId) -> Option<&ExceptionRegion> {
        self.regions.get(id.0 as usize)
    }

    /// Regions whose try, guarded, or finally range contains `state`,
    /// innermost first. Strict nesting makes the chain a single path up
    /// the parent links.
    pub fn regions_involving(&self, state: StateId) -> Vec<&ExceptionRegion> {
        let mut involved: Vec<&ExceptionRegion> = self
            .regions
            .iter()
            .filter(|r| r.involves(state))
            .collect();
        involved.sort_by(|a, b| self.region_depth(b.id).cmp(&self.region_depth(a.id)));
        involved
    }

    fn region_depth(&self, id: RegionId) -> u32 {
        let mut depth = 0;
        let mut cur = self.region(id).and_then(|r| r.parent);
        while let Some(p) = cur {
            depth += 1;
            cur = self.region(p).and_then(|r| r.parent);
        }
        depth
    }
}
