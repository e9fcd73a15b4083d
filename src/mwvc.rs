//! MWVC solvers over the constraint composite graph
//!
//! Two strategies behind one contract: write `Variable`-vertex cover
//! membership into the output map and return the strategy's own objective
//! notion. The driver recomputes the reported total from the decoded
//! assignment either way, so the return value is informational.
//!
//! - [`LpMwvcSolver`] states the cover as an integer program (binary
//!   variable per vertex, `x_u + x_v ≥ 1` per edge) and thresholds the
//!   primal at ½. Exact when the backend finishes within the deadline.
//! - [`MessagePassingSolver`] runs damped min-sum message passing with
//!   injected noise. It keeps the best decoded assignment seen across
//!   iterations; the final messages need not be the best ones, so the
//!   committed cover is the best-so-far snapshot, not the last.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, warn};

use crate::ccg::{Ccg, VertexId, VertexKind};
use crate::deadline::Deadline;
use crate::instance::WcspInstance;
use crate::lp::{ConstraintSense, LpError, LpSolver, ObjectiveSense, VarKind};
use crate::{VarId, Weight};

/// Iteration cap of the message-passing loop.
pub const MAX_ITERATIONS: u64 = 5000;

/// Solver failures.
#[derive(Debug, thiserror::Error)]
pub enum MwvcError {
    /// The LP backend failed or timed out.
    #[error(transparent)]
    Lp(#[from] LpError),
}

impl MwvcError {
    /// Whether this failure is a deadline hit, in which case the caller
    /// falls back to the best prior assignment.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MwvcError::Lp(LpError::TimeOut))
    }
}

/// A vertex-cover strategy for the CCG.
pub trait MwvcSolver {
    /// Cover `g`, writing `Variable`-vertex membership into `out`.
    fn solve(
        &mut self,
        g: &Ccg,
        out: &mut BTreeMap<VarId, bool>,
        instance: &WcspInstance,
    ) -> Result<Weight, MwvcError>;
}

/// The integer-programming strategy.
pub struct LpMwvcSolver<S> {
    lp: S,
    deadline: Deadline,
}

impl<S: LpSolver> LpMwvcSolver<S> {
    /// Solve with the given backend, bounded by the deadline.
    pub fn new(lp: S, deadline: Deadline) -> Self {
        Self { lp, deadline }
    }
}

impl<S: LpSolver> MwvcSolver for LpMwvcSolver<S> {
    fn solve(
        &mut self,
        g: &Ccg,
        out: &mut BTreeMap<VarId, bool>,
        _instance: &WcspInstance,
    ) -> Result<Weight, MwvcError> {
        if g.num_vertices() == 0 {
            return Ok(0.0);
        }

        self.lp.reset();
        self.lp.set_time_limit(self.deadline.remaining());

        let mut lp_var: BTreeMap<VertexId, usize> = BTreeMap::new();
        for id in g.vertex_ids() {
            lp_var.insert(id, self.lp.add_variable(g.weight(id), VarKind::Binary, 0.0, 1.0));
        }
        self.lp.set_objective_sense(ObjectiveSense::Minimize);
        for (u, v) in g.edges() {
            self.lp.add_constraint(&[lp_var[&u], lp_var[&v]], &[1.0, 1.0], 1.0, ConstraintSense::Ge)?;
        }

        let mut primal = Vec::new();
        let objective = self.lp.solve(&mut primal)?;

        for (id, &x) in &lp_var {
            if let VertexKind::Variable(v) = g.kind(*id) {
                out.insert(v, primal[x] > 0.5);
            }
        }
        Ok(objective)
    }
}

/// The min-sum message-passing strategy.
pub struct MessagePassingSolver<R> {
    delta: Weight,
    rng: R,
    deadline: Deadline,
}

impl<R: Rng> MessagePassingSolver<R> {
    /// Solve with convergence threshold `delta`, perturbation source `rng`,
    /// bounded by the deadline.
    pub fn new(delta: Weight, rng: R, deadline: Deadline) -> Self {
        Self { delta, rng, deadline }
    }
}

impl<R: Rng> MwvcSolver for MessagePassingSolver<R> {
    fn solve(
        &mut self,
        g: &Ccg,
        out: &mut BTreeMap<VarId, bool>,
        instance: &WcspInstance,
    ) -> Result<Weight, MwvcError> {
        if g.num_vertices() == 0 {
            return Ok(0.0);
        }

        // One message per directed edge; index 0 is "source uncovered",
        // index 1 "source covered".
        let mut msgs: BTreeMap<(VertexId, VertexId), [Weight; 2]> = BTreeMap::new();
        for u in g.vertex_ids() {
            for v in g.neighbors(u) {
                msgs.insert((u, v), [0.0, 0.0]);
            }
        }

        let mut best_cost = f64::INFINITY;
        let mut best_cover: Option<BTreeMap<VarId, bool>> = None;
        let mut iterations: u64 = 0;
        let mut converged = false;

        while iterations < MAX_ITERATIONS {
            if self.deadline.reached() {
                break;
            }
            iterations += 1;

            let prev = msgs.clone();
            let mut settled = true;
            for (&(from, to), m) in msgs.iter_mut() {
                // An uncovered source forces every other neighbor into the
                // cover; a covered source pays its weight and leaves the
                // neighbors free.
                let w_from = g.weight(from);
                let mut uncovered = w_from;
                let mut other = [0.0, w_from];
                for n in g.neighbors(from) {
                    if n == to {
                        continue;
                    }
                    let pm = prev[&(n, from)];
                    uncovered += pm[1];
                    other[0] += pm[0];
                    other[1] += pm[1];
                }
                let mut next = [uncovered, other[0].min(other[1])];

                let old = prev[&(from, to)];
                let alpha = if iterations < 200 { 0.9 } else { 0.7 };
                next[0] = old[0] * alpha + next[0] * (1.0 - alpha);
                next[1] = old[1] * alpha + next[1] * (1.0 - alpha);

                // Noise keeps the iteration off symmetric fixed points.
                next[0] += self.rng.gen_range(1..=2) as Weight;
                next[1] += self.rng.gen_range(1..=2) as Weight;

                let floor = next[0].min(next[1]);
                next[0] -= floor;
                next[1] -= floor;

                if (old[0] - next[0]).abs() > self.delta || (old[1] - next[1]).abs() > self.delta {
                    settled = false;
                }
                *m = next;
            }

            // Decode the current messages into a cover; ties stay out.
            let mut cover: BTreeMap<VarId, bool> = BTreeMap::new();
            let mut finite = true;
            for v in g.vertex_ids() {
                let mut min0 = 0.0;
                let mut min1 = g.weight(v);
                for n in g.neighbors(v) {
                    let m = msgs[&(n, v)];
                    min0 += m[0];
                    min1 += m[1];
                }
                if !min0.is_finite() || !min1.is_finite() {
                    finite = false;
                }
                if let VertexKind::Variable(id) = g.kind(v) {
                    cover.insert(id, min0 > min1);
                }
            }
            converged = settled && finite;

            let assignment = instance.decode_cover(&cover);
            let cost = instance.compute_total_weight(&assignment);
            if cost < best_cost {
                best_cost = cost;
                best_cover = Some(cover);
            }
            debug!(
                iteration = iterations,
                best = best_cost,
                elapsed = self.deadline.elapsed(),
                "message passing progress"
            );

            if settled {
                break;
            }
        }

        if let Some(cover) = best_cover {
            out.extend(cover);
        }
        if !converged {
            warn!("message passing did not converge");
        }
        Ok(if best_cost.is_finite() { best_cost } else { 0.0 })
    }
}
