//! Abstract LP backend
//!
//! The core never talks to a solver library directly; everything goes
//! through the [`LpSolver`] capability so backends are interchangeable.
//! The shipped implementation, [`HighsSolver`], buffers columns and rows
//! and materializes a fresh HiGHS model on every `solve` call.
//!
//! ## Invariants
//!
//! - Variable ids are dense indices in insertion order; the primal vector
//!   returned by `solve` is indexed by them.
//! - The backend runs single-threaded so repeated solves of the same model
//!   produce the same objective.
//! - `set_objective_sense` must be called before `solve`; there is no
//!   default sense.

use highs::{HighsModelStatus, RowProblem, Sense};

/// Dense index of an LP variable, in insertion order.
pub type LpVarId = usize;
/// Dense index of an LP constraint, in insertion order.
pub type LpConstraintId = usize;

/// Kind of an LP variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Continuous within its bounds.
    Continuous,
    /// Integral within its bounds (in this crate always `{0, 1}`).
    Binary,
}

/// Row sense of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSense {
    /// `lhs ≤ rhs`
    Le,
    /// `lhs ≥ rhs`
    Ge,
    /// `lhs = rhs`
    Eq,
}

/// Direction of the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    /// Minimize the objective.
    Minimize,
    /// Maximize the objective.
    Maximize,
}

/// Backend failures.
#[derive(Debug, thiserror::Error)]
pub enum LpError {
    /// The backend hit its time limit; any partial primal is not trusted.
    #[error("LP backend reached its time limit")]
    TimeOut,
    /// A constraint must reference at least one variable.
    #[error("constraint references no variables")]
    EmptyConstraint,
    /// Anything else the backend reports.
    #[error("LP backend error: {0}")]
    Backend(String),
}

/// The plug-in boundary between the core and any LP/ILP library.
pub trait LpSolver {
    /// Drop all variables, constraints, and the objective sense.
    fn reset(&mut self);

    /// Add a variable with the given objective coefficient and bounds;
    /// returns its dense id.
    fn add_variable(&mut self, coefficient: f64, kind: VarKind, lb: f64, ub: f64) -> LpVarId;

    /// Add a linear constraint `Σ coefs[i] · vars[i]  (sense)  rhs`.
    fn add_constraint(
        &mut self,
        vars: &[LpVarId],
        coefs: &[f64],
        rhs: f64,
        sense: ConstraintSense,
    ) -> Result<LpConstraintId, LpError>;

    /// Set the objective direction. Must be called before [`Self::solve`].
    fn set_objective_sense(&mut self, sense: ObjectiveSense);

    /// Limit the wall-clock time of the next `solve`, in seconds.
    fn set_time_limit(&mut self, seconds: f64);

    /// Solve the program. On success the primal values are written into
    /// `primal` (indexed by [`LpVarId`]) and the objective value is
    /// returned.
    fn solve(&mut self, primal: &mut Vec<f64>) -> Result<f64, LpError>;
}

#[derive(Debug, Clone)]
struct Column {
    coefficient: f64,
    kind: VarKind,
    lb: f64,
    ub: f64,
}

#[derive(Debug, Clone)]
struct Row {
    factors: Vec<(LpVarId, f64)>,
    rhs: f64,
    sense: ConstraintSense,
}

/// [`LpSolver`] backed by the HiGHS solver, pinned to a single thread.
///
/// The model is rebuilt from the buffered columns/rows on every `solve`,
/// which is what makes `reset` and repeated solves cheap to reason about.
/// The objective is recomputed from the stored coefficients rather than
/// read back from the backend.
#[derive(Debug, Default)]
pub struct HighsSolver {
    columns: Vec<Column>,
    rows: Vec<Row>,
    sense: Option<ObjectiveSense>,
    time_limit: Option<f64>,
}

impl HighsSolver {
    /// A fresh, empty solver.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LpSolver for HighsSolver {
    fn reset(&mut self) {
        self.columns.clear();
        self.rows.clear();
        self.sense = None;
        // The time limit survives reset, matching the one-limit-per-run
        // contract of the callers.
    }

    fn add_variable(&mut self, coefficient: f64, kind: VarKind, lb: f64, ub: f64) -> LpVarId {
        self.columns.push(Column { coefficient, kind, lb, ub });
        self.columns.len() - 1
    }

    fn add_constraint(
        &mut self,
        vars: &[LpVarId],
        coefs: &[f64],
        rhs: f64,
        sense: ConstraintSense,
    ) -> Result<LpConstraintId, LpError> {
        if vars.is_empty() {
            return Err(LpError::EmptyConstraint);
        }
        debug_assert_eq!(vars.len(), coefs.len());
        let factors = vars.iter().copied().zip(coefs.iter().copied()).collect();
        self.rows.push(Row { factors, rhs, sense });
        Ok(self.rows.len() - 1)
    }

    fn set_objective_sense(&mut self, sense: ObjectiveSense) {
        self.sense = Some(sense);
    }

    fn set_time_limit(&mut self, seconds: f64) {
        if seconds.is_finite() {
            self.time_limit = Some(seconds.max(0.0));
        }
    }

    fn solve(&mut self, primal: &mut Vec<f64>) -> Result<f64, LpError> {
        primal.clear();
        if self.columns.is_empty() {
            return Ok(0.0);
        }

        let mut problem = RowProblem::default();
        let mut cols = Vec::with_capacity(self.columns.len());
        for c in &self.columns {
            let col = match c.kind {
                VarKind::Continuous => problem.add_column(c.coefficient, c.lb..=c.ub),
                VarKind::Binary => problem.add_integer_column(c.coefficient, c.lb..=c.ub),
            };
            cols.push(col);
        }
        for r in &self.rows {
            let factors = r.factors.iter().map(|&(v, f)| (cols[v], f));
            match r.sense {
                ConstraintSense::Le => problem.add_row(..=r.rhs, factors),
                ConstraintSense::Ge => problem.add_row(r.rhs.., factors),
                ConstraintSense::Eq => problem.add_row(r.rhs..=r.rhs, factors),
            }
        }

        let sense = match self.sense {
            Some(ObjectiveSense::Minimize) => Sense::Minimise,
            Some(ObjectiveSense::Maximize) => Sense::Maximise,
            None => return Err(LpError::Backend("objective sense not set".into())),
        };
        let mut model = problem.optimise(sense);
        model.set_option("parallel", "off");
        model.set_option("threads", 1);
        model.set_option("output_flag", false);
        if let Some(limit) = self.time_limit {
            model.set_option("time_limit", limit);
        }

        let solved = model.solve();
        match solved.status() {
            HighsModelStatus::Optimal => {}
            HighsModelStatus::ReachedTimeLimit => return Err(LpError::TimeOut),
            status => return Err(LpError::Backend(format!("{status:?}"))),
        }

        let solution = solved.get_solution();
        primal.extend_from_slice(solution.columns());

        let objective = self
            .columns
            .iter()
            .zip(primal.iter())
            .map(|(c, x)| c.coefficient * x)
            .sum();
        Ok(objective)
    }
}
