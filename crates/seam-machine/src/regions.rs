// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Exception regions: try/catch/finally extents as ranges over states.
//!
//! The lowerer opens a region when it enters a try, reports every state
//! it lowers while the region is open, and closes the region when the
//! whole construct is done. The finished regions form the dispatch table
//! the driver replays at each step to route throws and to run finally
//! ranges exactly once on every exit path.

use seam_hir::Span;

use crate::descriptor::{StateId, VarId};
use crate::error::LoweringError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub u32);

/// Filter of one catch clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    /// Matches exceptions of exactly this type name.
    Named(String),
    /// Catch-all.
    Any,
}

impl TypeFilter {
    pub fn matches(&self, exception_ty: &str) -> bool {
        match self {
            TypeFilter::Named(name) => name == exception_ty,
            TypeFilter::Any => true,
        }
    }
}

/// One catch clause: filter, optional binding slot, handler entry state.
#[derive(Debug, Clone)]
pub struct CatchHandler {
    pub filter: TypeFilter,
    pub binding: Option<VarId>,
    pub entry: StateId,
}

/// One try/catch/finally construct after lowering.
///
/// `try_states` is the catch-protected range. `guarded_states` is the
/// finally-protected range: the try range plus the catch handler bodies
/// (an exception escaping a handler still runs this region's finally,
/// but is not re-tested against this region's catches).
#[derive(Debug, Clone)]
pub struct ExceptionRegion {
    pub id: RegionId,
    pub parent: Option<RegionId>,
    pub try_states: Vec<StateId>,
    pub guarded_states: Vec<StateId>,
    pub catches: Vec<CatchHandler>,
    pub finally_entry: Option<StateId>,
    pub finally_states: Vec<StateId>,
}

impl ExceptionRegion {
    pub fn in_try(&self, state: StateId) -> bool {
        self.try_states.contains(&state)
    }

    pub fn guards(&self, state: StateId) -> bool {
        self.try_states.contains(&state) || self.guarded_states.contains(&state)
    }

    pub fn in_finally(&self, state: StateId) -> bool {
        self.finally_states.contains(&state)
    }

    /// True if the state belongs to the region in any capacity. A
    /// transition whose target this rejects is an exit from the region.
    pub fn involves(&self, state: StateId) -> bool {
        self.guards(state) || self.in_finally(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Try,
    Catch,
    Finally,
    Closed,
}

struct OpenRegion {
    region: ExceptionRegion,
    phase: Phase,
}

/// Builds regions under stack discipline and validates nesting.
pub struct RegionBuilder {
    regions: Vec<OpenRegion>,
    open_stack: Vec<RegionId>,
}

impl RegionBuilder {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            open_stack: Vec::new(),
        }
    }

    pub fn open_region(&mut self) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        let parent = self.open_stack.last().copied();
        self.regions.push(OpenRegion {
            region: ExceptionRegion {
                id,
                parent,
                try_states: Vec::new(),
                guarded_states: Vec::new(),
                catches: Vec::new(),
                finally_entry: None,
                finally_states: Vec::new(),
            },
            phase: Phase::Try,
        });
        self.open_stack.push(id);
        id
    }

    /// Record that `state` is being lowered under the currently open
    /// regions. Which range it lands in depends on each region's phase.
    pub fn record_state(&mut self, state: StateId) {
        for &id in &self.open_stack {
            let open = &mut self.regions[id.0 as usize];
            match open.phase {
                Phase::Try => {
                    if !open.region.try_states.contains(&state) {
                        open.region.try_states.push(state);
                    }
                }
                Phase::Catch => {
                    if !open.region.guarded_states.contains(&state) {
                        open.region.guarded_states.push(state);
                    }
                }
                Phase::Finally => {
                    if !open.region.finally_states.contains(&state) {
                        open.region.finally_states.push(state);
                    }
                }
                Phase::Closed => unreachable!("closed region left on the open stack"),
            }
        }
    }

    /// Switch the region from lowering its try body to its catch bodies.
    pub fn begin_catches(&mut self, id: RegionId, span: Span) -> Result<(), LoweringError> {
        let open = self.expect_open(id, span)?;
        if open.phase != Phase::Try {
            return Err(malformed(span, "catch clauses must follow the try body"));
        }
        open.phase = Phase::Catch;
        Ok(())
    }

    pub fn add_catch(
        &mut self,
        id: RegionId,
        filter: TypeFilter,
        binding: Option<VarId>,
        entry: StateId,
        span: Span,
    ) -> Result<(), LoweringError> {
        let open = self.expect_open(id, span)?;
        if open.phase != Phase::Catch {
            return Err(malformed(span, "catch added outside the catch section"));
        }
        open.region.catches.push(CatchHandler {
            filter,
            binding,
            entry,
        });
        Ok(())
    }

    pub fn begin_finally(
        &mut self,
        id: RegionId,
        entry: StateId,
        span: Span,
    ) -> Result<(), LoweringError> {
        let open = self.expect_open(id, span)?;
        if open.region.finally_entry.is_some() {
            return Err(malformed(span, "region already has a finally range"));
        }
        if open.phase == Phase::Closed {
            return Err(malformed(span, "finally added to a closed region"));
        }
        open.phase = Phase::Finally;
        open.region.finally_entry = Some(entry);
        Ok(())
    }

    /// Close the region. Must be the innermost open region.
    pub fn close_region(&mut self, id: RegionId, span: Span) -> Result<(), LoweringError> {
        match self.open_stack.last() {
            Some(&top) if top == id => {
                self.open_stack.pop();
                self.regions[id.0 as usize].phase = Phase::Closed;
                Ok(())
            }
            Some(_) => Err(malformed(span, "regions closed out of nesting order")),
            None => Err(malformed(span, "close of a region that is not open")),
        }
    }

    /// Finish building: all regions closed, nesting strict.
    pub fn finish(self, span: Span) -> Result<Vec<ExceptionRegion>, LoweringError> {
        if let Some(&open) = self.open_stack.last() {
            return Err(malformed(
                span,
                &format!("region {} left open at end of method", open.0),
            ));
        }
        let regions: Vec<ExceptionRegion> =
            self.regions.into_iter().map(|o| o.region).collect();
        validate_nesting(&regions, span)?;
        Ok(regions)
    }
}

impl Default for RegionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionBuilder {
    fn expect_open(
        &mut self,
        id: RegionId,
        span: Span,
    ) -> Result<&mut OpenRegion, LoweringError> {
        let open = self
            .regions
            .get_mut(id.0 as usize)
            .ok_or_else(|| malformed(span, "unknown region id"))?;
        if open.phase == Phase::Closed {
            return Err(malformed(span, "region modified after close"));
        }
        Ok(open)
    }
}

fn malformed(span: Span, detail: &str) -> LoweringError {
    LoweringError::MalformedRegion {
        detail: detail.to_string(),
        span,
    }
}

/// Regions must nest strictly: any two involved ranges are disjoint or
/// one contains the other. Stack-discipline construction guarantees
/// this, but the invariant is cheap to check and load-bearing for the
/// driver's unwind walk, so it is verified before the descriptor ships.
fn validate_nesting(regions: &[ExceptionRegion], span: Span) -> Result<(), LoweringError> {
    for (i, a) in regions.iter().enumerate() {
        for b in regions.iter().skip(i + 1) {
            let a_states = involved_states(a);
            let b_states = involved_states(b);
            let overlap = a_states.iter().filter(|s| b_states.contains(s)).count();
            if overlap == 0 {
                continue;
            }
            if overlap != a_states.len() && overlap != b_states.len() {
                return Err(malformed(
                    span,
                    &format!("regions {} and {} partially overlap", a.id.0, b.id.0),
                ));
            }
        }
    }
    Ok(())
}

fn involved_states(r: &ExceptionRegion) -> Vec<StateId> {
    let mut all = r.try_states.clone();
    all.extend(r.guarded_states.iter().copied());
    all.extend(r.finally_states.iter().copied());
    all
}
