//! Kernelization via the half-integral LP relaxation of MWVC
//!
//! Relax vertex-cover membership to continuous `[0, 1]` variables, one per
//! vertex, with `x_u + x_v ≥ 1` per edge and the vertex weights as the
//! minimization objective. The relaxation is half-integral: every optimal
//! coordinate is 0, ½, or 1. Vertices at 1 belong to some minimum cover
//! and vertices at 0 to none; both are removed from the graph, recording
//! the value of any `Variable` vertex. Vertices at ½ stay.
//!
//! The classification bands are generous (`≥ 0.8 → 1`, `≤ 0.2 → 0`) to
//! absorb backend tolerance; a coordinate outside `[0, 1]` or non-finite
//! means the backend is inconsistent and kernelization fails.

use std::collections::BTreeMap;

use tracing::info;

use crate::ccg::{Ccg, VertexId, VertexKind};
use crate::lp::{ConstraintSense, LpError, LpSolver, ObjectiveSense, VarKind};
use crate::VarId;

/// Kernelization failures.
#[derive(Debug, thiserror::Error)]
pub enum KernelizerError {
    /// The LP backend failed.
    #[error(transparent)]
    Lp(#[from] LpError),
    /// A vertex's relaxation value fell outside the `{0, ½, 1}` bands.
    #[error("vertex relaxation value {value} falls outside the half-integral bands")]
    UnexpectedLpSolution {
        /// The offending primal value.
        value: f64,
    },
}

/// A graph-shrinking strategy: delete vertices from `g`, record forced
/// `Variable` values in `out`.
pub trait Kernelizer {
    /// Kernelize `g` in place.
    fn kernelize(
        &mut self,
        g: &mut Ccg,
        out: &mut BTreeMap<VarId, bool>,
    ) -> Result<(), KernelizerError>;
}

/// The half-integral LP strategy.
pub struct LpKernelizer<S> {
    lp: S,
}

impl<S: LpSolver> LpKernelizer<S> {
    /// Kernelize with the given LP backend.
    pub fn new(lp: S) -> Self {
        Self { lp }
    }
}

impl<S: LpSolver> Kernelizer for LpKernelizer<S> {
    fn kernelize(
        &mut self,
        g: &mut Ccg,
        out: &mut BTreeMap<VarId, bool>,
    ) -> Result<(), KernelizerError> {
        if g.num_vertices() == 0 {
            return Ok(());
        }

        self.lp.reset();
        let mut lp_var: BTreeMap<VertexId, usize> = BTreeMap::new();
        for id in g.vertex_ids() {
            lp_var.insert(id, self.lp.add_variable(g.weight(id), VarKind::Continuous, 0.0, 1.0));
        }
        self.lp.set_objective_sense(ObjectiveSense::Minimize);
        for (u, v) in g.edges().collect::<Vec<_>>() {
            self.lp.add_constraint(&[lp_var[&u], lp_var[&v]], &[1.0, 1.0], 1.0, ConstraintSense::Ge)?;
        }

        let mut primal = Vec::new();
        self.lp.solve(&mut primal)?;

        for (id, &x) in &lp_var {
            let value = primal[x];
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(KernelizerError::UnexpectedLpSolution { value });
            }
            if value >= 0.8 {
                if let VertexKind::Variable(v) = g.kind(*id) {
                    out.insert(v, true);
                }
                g.remove_vertex(*id);
            } else if value <= 0.2 {
                // Every neighbor sits at 1, or the relaxation would be
                // infeasible; the vertex leaves the cover.
                if let VertexKind::Variable(v) = g.kind(*id) {
                    out.insert(v, false);
                }
                g.remove_vertex(*id);
            }
        }
        Ok(())
    }
}

/// Re-run kernelization until the resolved-variable count stops growing or
/// every variable is resolved. `total_variables` is the count of variable
/// vertices the graph ever held; `make` builds a fresh kernelizer per
/// round. Returns the number of rounds run.
pub fn kernelize_to_fixpoint<K: Kernelizer>(
    g: &mut Ccg,
    out: &mut BTreeMap<VarId, bool>,
    total_variables: usize,
    mut make: impl FnMut() -> K,
) -> Result<usize, KernelizerError> {
    let mut rounds = 0;
    let mut resolved = usize::MAX;
    while resolved != out.len() {
        resolved = out.len();
        rounds += 1;
        make().kernelize(g, out)?;
        info!(
            round = rounds,
            resolved = out.len(),
            remaining = total_variables.saturating_sub(out.len()),
            "kernelization round finished"
        );
        if out.len() >= total_variables {
            break;
        }
    }
    Ok(rounds)
}
