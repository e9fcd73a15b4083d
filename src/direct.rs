//! Direct LP formulation of the WCSP
//!
//! Bypasses the graph reduction entirely: one binary LP variable per
//! (constraint, value-tuple) pair with the tuple's weight as objective
//! coefficient, a simplex (`Σ = 1`) equality per constraint, and
//! channeling equalities tying every constraint's per-value marginals to
//! the unary constraint of the shared variable. Variables without a unary
//! constraint get a zero-weight one so every variable has indicators to
//! read the assignment from.

use std::collections::BTreeMap;

use crate::deadline::Deadline;
use crate::instance::{Constraint, WcspInstance};
use crate::lp::{ConstraintSense, LpError, LpSolver, LpVarId, ObjectiveSense, VarKind};
use crate::{DomainValue, VarId};

/// Solve the instance as one integer program; returns the assignment read
/// from the unary indicators.
pub fn solve_linear_programming<S: LpSolver>(
    instance: &WcspInstance,
    lp: &mut S,
    deadline: Deadline,
) -> Result<BTreeMap<VarId, DomainValue>, LpError> {
    lp.reset();
    lp.set_time_limit(deadline.remaining());
    lp.set_objective_sense(ObjectiveSense::Minimize);

    let nv = instance.boolean_blocks().len();

    // Every variable needs a unary constraint to read its value from;
    // materialize zero-weight ones where the instance has none.
    let mut constraints: Vec<Constraint> = instance.constraints().to_vec();
    let mut unary_index = vec![usize::MAX; nv];
    for (i, c) in constraints.iter().enumerate() {
        if c.scope().len() == 1 {
            unary_index[c.scope()[0]] = i;
        }
    }
    for v in 0..nv {
        if unary_index[v] == usize::MAX {
            constraints.push(Constraint::new(vec![v], instance.boolean_blocks()[v].clone()));
            unary_index[v] = constraints.len() - 1;
        }
    }

    // One indicator per value tuple, enumerated with the first scope
    // variable least significant.
    let mut tuple_vars: Vec<Vec<LpVarId>> = Vec::with_capacity(constraints.len());
    for c in &constraints {
        let dims: Vec<usize> = c.scope().iter().map(|&v| instance.domain_size(v)).collect();
        let count: usize = dims.iter().product();

        let mut vars = Vec::with_capacity(count);
        let mut values = Vec::with_capacity(dims.len());
        for j in 0..count {
            values.clear();
            let mut j0 = j;
            for &d in &dims {
                values.push(j0 % d);
                j0 /= d;
            }
            vars.push(lp.add_variable(c.tuple_weight(&values), VarKind::Binary, 0.0, 1.0));
        }

        // Exactly one tuple of each constraint takes effect.
        lp.add_constraint(&vars, &vec![1.0; count], 1.0, ConstraintSense::Eq)?;
        tuple_vars.push(vars);
    }

    // Channeling: a constraint's marginal over any scope variable equals
    // that variable's unary indicator, value by value.
    for (ci, c) in constraints.iter().enumerate() {
        let dims: Vec<usize> = c.scope().iter().map(|&v| instance.domain_size(v)).collect();
        for (k, &v) in c.scope().iter().enumerate() {
            let ui = unary_index[v];
            if ui == ci {
                continue;
            }
            let stride: usize = dims[..k].iter().product();
            for value in 0..dims[k] {
                let mut vars = Vec::new();
                let mut coefs = Vec::new();
                for (j, &tuple_var) in tuple_vars[ci].iter().enumerate() {
                    if j / stride % dims[k] == value {
                        vars.push(tuple_var);
                        coefs.push(1.0);
                    }
                }
                vars.push(tuple_vars[ui][value]);
                coefs.push(-1.0);
                lp.add_constraint(&vars, &coefs, 0.0, ConstraintSense::Eq)?;
            }
        }
    }

    let mut primal = Vec::new();
    lp.solve(&mut primal)?;

    let mut solution = BTreeMap::new();
    for v in 0..nv {
        let vars = &tuple_vars[unary_index[v]];
        if let Some(value) = vars.iter().position(|&x| primal[x] > 0.99) {
            solution.insert(v, value);
        }
    }
    Ok(solution)
}
