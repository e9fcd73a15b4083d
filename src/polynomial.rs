//! Multilinear polynomials over Boolean indicators
//!
//! A weight table over `s` indicators is rewritten as
//! `P(X₁,…,Xₛ) = Σ_S c_S ∏_{i∈S} X_i` agreeing with the table at every
//! bit-vector, via Möbius inversion on the subset lattice. Contributions of
//! all constraints accumulate into one shared [`Polynomial`].
//!
//! ## Ordering invariant
//!
//! [`TermKey`] orders by *descending* cardinality (ties lexicographic), so
//! iterating a [`Polynomial`] — or draining it with `pop_first` — visits
//! the highest-degree terms first. The graph construction leans on this:
//! rewriting a degree-`k` term mutates only coefficients of strictly lower
//! cardinality, which have not been visited yet.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::instance::Constraint;
use crate::{VarId, Weight};

/// Widest Boolean scope the `2^s` table expansion accepts. Wider
/// constraints are rejected rather than truncated.
pub const MAX_CONSTRAINT_BITS: usize = 24;

/// Conversion failures.
#[derive(Debug, thiserror::Error)]
pub enum PolynomialError {
    /// The constraint's Boolean scope exceeds [`MAX_CONSTRAINT_BITS`].
    #[error("constraint spans {bits} Boolean variables, beyond the {MAX_CONSTRAINT_BITS}-bit expansion limit")]
    TooWide {
        /// Boolean scope width of the offending constraint.
        bits: usize,
    },
}

/// A set of Boolean variable ids, stored sorted and deduplicated.
///
/// The `Ord` implementation is the load-bearing part: larger sets sort
/// first, ties break lexicographically, and the empty set (the constant
/// term) sorts last.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermKey(Vec<VarId>);

impl TermKey {
    /// Build a key from any id collection; duplicates collapse.
    pub fn new(vars: impl IntoIterator<Item = VarId>) -> Self {
        let mut vars: Vec<VarId> = vars.into_iter().collect();
        vars.sort_unstable();
        vars.dedup();
        Self(vars)
    }

    /// The constant-term key.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// A one-variable key.
    pub fn singleton(v: VarId) -> Self {
        Self(vec![v])
    }

    /// Cardinality of the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the constant-term key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The ids, sorted ascending.
    pub fn vars(&self) -> &[VarId] {
        &self.0
    }
}

impl Ord for TermKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.len().cmp(&self.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for TermKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Coefficients keyed by variable set, iterated highest-degree first.
pub type Polynomial = BTreeMap<TermKey, Weight>;

/// Convert one constraint's weight table into polynomial coefficients and
/// accumulate them into `poly`.
///
/// Bit `j` of a table index corresponds to the `j`-th variable of the
/// constraint's Boolean scope. The inversion solves the unit
/// lower-triangular system `c_x = w(x) − Σ_{y ⊊ x} c_y` as the in-place
/// subset transform, one bit at a time.
pub fn accumulate_constraint(c: &Constraint, poly: &mut Polynomial) -> Result<(), PolynomialError> {
    let s = c.bool_scope().len();
    if s > MAX_CONSTRAINT_BITS {
        return Err(PolynomialError::TooWide { bits: s });
    }
    let size = 1usize << s;

    let mut coefs = vec![0.0; size];
    let mut bits = vec![false; s];
    for (mask, coef) in coefs.iter_mut().enumerate() {
        for (j, bit) in bits.iter_mut().enumerate() {
            *bit = mask >> j & 1 == 1;
        }
        *coef = c.bit_weight(&bits);
    }

    for j in 0..s {
        for mask in 0..size {
            if mask >> j & 1 == 1 {
                let below = coefs[mask ^ (1 << j)];
                coefs[mask] -= below;
            }
        }
    }

    for (mask, coef) in coefs.into_iter().enumerate() {
        let key = TermKey::new(
            (0..s).filter(|j| mask >> j & 1 == 1).map(|j| c.bool_scope()[j]),
        );
        *poly.entry(key).or_insert(0.0) += coef;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::push_value_bits;

    /// Evaluate a polynomial at a full indicator assignment.
    pub(crate) fn eval(poly: &Polynomial, assignment: &dyn Fn(VarId) -> bool) -> Weight {
        poly.iter()
            .map(|(key, &w)| {
                if key.vars().iter().all(|&v| assignment(v)) {
                    w
                } else {
                    0.0
                }
            })
            .sum()
    }

    fn unary_boolean(weight0: Weight, weight1: Weight) -> Constraint {
        let mut c = Constraint::new(vec![0], vec![0]);
        c.set_bit_weight(vec![false], weight0);
        c.set_bit_weight(vec![true], weight1);
        c
    }

    #[test]
    fn keys_order_by_descending_cardinality_then_lex() {
        let mut poly = Polynomial::new();
        poly.insert(TermKey::empty(), 1.0);
        poly.insert(TermKey::singleton(2), 1.0);
        poly.insert(TermKey::singleton(0), 1.0);
        poly.insert(TermKey::new([0, 1]), 1.0);
        poly.insert(TermKey::new([0, 2]), 1.0);

        let order: Vec<Vec<VarId>> = poly.keys().map(|k| k.vars().to_vec()).collect();
        assert_eq!(order, vec![vec![0, 1], vec![0, 2], vec![0], vec![2], vec![]]);

        // pop_first drains in the same order.
        let (first, _) = poly.pop_first().unwrap();
        assert_eq!(first.vars(), &[0, 1]);
    }

    #[test]
    fn unary_table_inverts_exactly() {
        let mut poly = Polynomial::new();
        accumulate_constraint(&unary_boolean(0.0, 5.0), &mut poly).unwrap();

        assert_eq!(poly.get(&TermKey::empty()).copied().unwrap_or(0.0), 0.0);
        assert_eq!(poly[&TermKey::singleton(0)], 5.0);
    }

    #[test]
    fn xor_table_inverts_exactly() {
        // w(00)=0, w(01)=2, w(10)=2, w(11)=0 over indicators {0, 1}.
        let mut c = Constraint::new(vec![0, 1], vec![0, 1]);
        c.set_bit_weight(vec![false, false], 0.0);
        c.set_bit_weight(vec![true, false], 2.0);
        c.set_bit_weight(vec![false, true], 2.0);
        c.set_bit_weight(vec![true, true], 0.0);

        let mut poly = Polynomial::new();
        accumulate_constraint(&c, &mut poly).unwrap();

        assert_eq!(poly[&TermKey::singleton(0)], 2.0);
        assert_eq!(poly[&TermKey::singleton(1)], 2.0);
        assert_eq!(poly[&TermKey::new([0, 1])], -4.0);
        assert_eq!(poly.get(&TermKey::empty()).copied().unwrap_or(0.0), 0.0);
    }

    #[test]
    fn ternary_table_agrees_at_every_point() {
        // An arbitrary table over three indicators; the polynomial must
        // reproduce it exactly at all 8 points.
        let weights = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let mut c = Constraint::new(vec![0, 1, 2], vec![0, 1, 2]);
        for (mask, &w) in weights.iter().enumerate() {
            let bits: Vec<bool> = (0..3).map(|j| mask >> j & 1 == 1).collect();
            c.set_bit_weight(bits, w);
        }

        let mut poly = Polynomial::new();
        accumulate_constraint(&c, &mut poly).unwrap();

        for (mask, &w) in weights.iter().enumerate() {
            let value = eval(&poly, &|v| mask >> v & 1 == 1);
            assert!((value - w).abs() < 1e-9, "mask {mask}: {value} != {w}");
        }
    }

    #[test]
    fn domain_three_unary_uses_block_encoding() {
        // w(0)=0, w(1)=3, w(2)=7 over a two-indicator block; the free
        // bit-vector (0,0) weighs the default 0.
        let mut c = Constraint::new(vec![0], vec![0, 1]);
        for (v, w) in [(0, 0.0), (1, 3.0), (2, 7.0)] {
            let mut bits = Vec::new();
            push_value_bits(&mut bits, 2, v);
            c.set_bit_weight(bits, w);
        }

        let mut poly = Polynomial::new();
        accumulate_constraint(&c, &mut poly).unwrap();

        // Encodings: v=0 → (1,1), v=1 → (0,1), v=2 → (1,0).
        assert_eq!(poly[&TermKey::singleton(0)], 7.0);
        assert_eq!(poly[&TermKey::singleton(1)], 3.0);
        assert_eq!(poly[&TermKey::new([0, 1])], -10.0);
    }

    #[test]
    fn contributions_accumulate_across_constraints() {
        let mut poly = Polynomial::new();
        accumulate_constraint(&unary_boolean(0.0, 5.0), &mut poly).unwrap();
        accumulate_constraint(&unary_boolean(1.0, 2.0), &mut poly).unwrap();

        assert_eq!(poly[&TermKey::singleton(0)], 6.0);
        assert_eq!(poly[&TermKey::empty()], 1.0);
    }

    #[test]
    fn too_wide_scopes_are_rejected() {
        let wide: Vec<VarId> = (0..MAX_CONSTRAINT_BITS + 1).collect();
        let c = Constraint::new(vec![0], wide);
        let mut poly = Polynomial::new();
        assert!(matches!(
            accumulate_constraint(&c, &mut poly),
            Err(PolynomialError::TooWide { bits }) if bits == MAX_CONSTRAINT_BITS + 1
        ));
    }
}
