//! The constraint composite graph
//!
//! An undirected simple graph whose minimum weighted vertex cover, plus the
//! residual constant returned by [`Ccg::add_polynomial`], equals the
//! minimum of the accumulated constraint polynomial. Three vertex kinds:
//! `Variable` vertices carry a Boolean indicator id; `FlowerRoot` and
//! `Thorn` are the auxiliary vertices introduced by the term gadgets.
//!
//! ## Gadgets
//!
//! - Linear term, non-negative coefficient: added onto the variable
//!   vertex's weight.
//! - Linear term, negative coefficient `w`: a flower root of weight `|w|`
//!   adjacent to the variable.
//! - Higher-order term, negative coefficient `w`: `|w|` moves into the
//!   constant term; a flower root of weight `|w|` is adjacent to every
//!   variable of the term.
//! - Higher-order term, non-negative coefficient `w`: with `L = w + 1`,
//!   `L + w` leaves the constant term, `L` joins the first variable's
//!   linear coefficient and `w` the coefficient of the remaining
//!   variables; a flower root of weight `w` and a thorn of weight `L` are
//!   wired `root — thorn — v₁` and `root — vᵢ` for `i ≥ 2`. The rewrite
//!   mutates only lower-cardinality coefficients, which the term ordering
//!   guarantees have not been processed yet.
//!
//! ## Representation
//!
//! An arena of tombstoned slots: vertex handles stay stable across
//! deletions (simplification and kernelization both delete), and adjacency
//! is kept in ordered sets so duplicate edges collapse silently.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use itertools::Itertools;
use serde::Serialize;

use crate::polynomial::{Polynomial, TermKey};
use crate::{VarId, Weight, WEIGHT_EPS};

/// What a vertex stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    /// A Boolean indicator variable.
    Variable(VarId),
    /// Flower-root auxiliary vertex.
    FlowerRoot,
    /// Thorn auxiliary vertex.
    Thorn,
}

impl VertexKind {
    /// The signed external id used by the graph dumps: the indicator id
    /// for variable vertices, −1 for flower roots, −2 for thorns.
    pub fn external_id(self) -> i64 {
        match self {
            VertexKind::Variable(v) => v as i64,
            VertexKind::FlowerRoot => -1,
            VertexKind::Thorn => -2,
        }
    }
}

/// Stable handle of a vertex; survives deletions of other vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(usize);

#[derive(Debug, Clone)]
struct VertexRecord {
    kind: VertexKind,
    weight: Weight,
    adj: BTreeSet<VertexId>,
}

/// Vertex counts by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CcgStats {
    /// Vertices carrying a Boolean indicator.
    pub variables: usize,
    /// Flower-root auxiliary vertices.
    pub flower_roots: usize,
    /// Thorn auxiliary vertices.
    pub thorns: usize,
}

/// The constraint composite graph.
#[derive(Debug, Clone, Default)]
pub struct Ccg {
    slots: Vec<Option<VertexRecord>>,
    by_var: BTreeMap<VarId, VertexId>,
    num_edges: usize,
    num_live: usize,
    total_variables: usize,
}

impl Ccg {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live vertex handles, in creation order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| VertexId(i))
    }

    /// Number of live vertices.
    pub fn num_vertices(&self) -> usize {
        self.num_live
    }

    /// Number of edges between live vertices.
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Number of distinct variable vertices ever added (deletions do not
    /// shrink this; the kernelization driver compares it against the
    /// resolved count).
    pub fn num_total_variables(&self) -> usize {
        self.total_variables
    }

    /// The vertex's kind.
    pub fn kind(&self, id: VertexId) -> VertexKind {
        self.record(id).kind
    }

    /// The vertex's weight.
    pub fn weight(&self, id: VertexId) -> Weight {
        self.record(id).weight
    }

    /// Neighbors of a vertex, in handle order.
    pub fn neighbors(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.record(id).adj.iter().copied()
    }

    /// Edges as `(u, v)` pairs with `u < v`, each once.
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.vertex_ids()
            .flat_map(move |u| self.neighbors(u).filter(move |&v| u < v).map(move |v| (u, v)))
    }

    fn record(&self, id: VertexId) -> &VertexRecord {
        self.slots[id.0].as_ref().expect("vertex handle is live")
    }

    fn push_vertex(&mut self, kind: VertexKind, weight: Weight) -> VertexId {
        self.slots.push(Some(VertexRecord { kind, weight, adj: BTreeSet::new() }));
        self.num_live += 1;
        VertexId(self.slots.len() - 1)
    }

    fn add_or_get_variable(&mut self, v: VarId) -> VertexId {
        if let Some(&id) = self.by_var.get(&v) {
            return id;
        }
        let id = self.push_vertex(VertexKind::Variable(v), 0.0);
        self.by_var.insert(v, id);
        self.total_variables += 1;
        id
    }

    fn add_aux(&mut self, kind: VertexKind, weight: Weight) -> VertexId {
        self.push_vertex(kind, weight)
    }

    fn add_edge(&mut self, u: VertexId, v: VertexId) {
        debug_assert_ne!(u, v, "self-loops never arise");
        let inserted = self.slots[u.0].as_mut().expect("vertex handle is live").adj.insert(v);
        if inserted {
            self.slots[v.0].as_mut().expect("vertex handle is live").adj.insert(u);
            self.num_edges += 1;
        }
    }

    /// Delete a vertex and every edge incident to it.
    pub fn remove_vertex(&mut self, id: VertexId) {
        let record = self.slots[id.0].take().expect("vertex handle is live");
        self.num_live -= 1;
        self.num_edges -= record.adj.len();
        for n in record.adj {
            self.slots[n.0].as_mut().expect("adjacency references live vertices").adj.remove(&id);
        }
        if let VertexKind::Variable(v) = record.kind {
            self.by_var.remove(&v);
        }
    }

    /// Rewrite the polynomial's terms into graph gadgets, highest degree
    /// first, draining `p` in the process. Lower-degree coefficients are
    /// mutated as higher-degree terms are rewritten. Returns the final
    /// constant term, the residual to add to any MWVC weight of the graph.
    pub fn add_polynomial(&mut self, p: &mut Polynomial) -> Weight {
        let mut residual = 0.0;
        while let Some((key, w)) = p.pop_first() {
            if key.is_empty() {
                // The constant term sorts last; nothing mutates it after
                // this point.
                residual = w;
                continue;
            }
            if w.abs() < WEIGHT_EPS {
                continue;
            }

            if key.len() == 1 {
                let vertex = self.add_or_get_variable(key.vars()[0]);
                if w >= 0.0 {
                    self.slots[vertex.0]
                        .as_mut()
                        .expect("vertex handle is live")
                        .weight += w;
                } else {
                    let root = self.add_aux(VertexKind::FlowerRoot, -w);
                    self.add_edge(vertex, root);
                }
                continue;
            }

            let vertices: Vec<VertexId> =
                key.vars().iter().map(|&v| self.add_or_get_variable(v)).collect();

            if w < 0.0 {
                let w = -w;
                *p.entry(TermKey::empty()).or_insert(0.0) -= w;
                let root = self.add_aux(VertexKind::FlowerRoot, w);
                for &vertex in &vertices {
                    self.add_edge(vertex, root);
                }
            } else {
                // Attach L to the first variable; push the remainder of
                // the term down one degree.
                let l = w + 1.0;
                *p.entry(TermKey::empty()).or_insert(0.0) -= l + w;
                *p.entry(TermKey::singleton(key.vars()[0])).or_insert(0.0) += l;
                *p.entry(TermKey::new(key.vars()[1..].iter().copied())).or_insert(0.0) += w;

                let root = self.add_aux(VertexKind::FlowerRoot, w);
                let thorn = self.add_aux(VertexKind::Thorn, l);
                self.add_edge(root, thorn);
                self.add_edge(thorn, vertices[0]);
                for &vertex in &vertices[1..] {
                    self.add_edge(root, vertex);
                }
            }
        }
        residual
    }

    /// Connect the indicator vertices of every multi-indicator block into
    /// a clique. Blocks with a single indicator need no clique; blocks
    /// containing an indicator that never reached the graph are skipped.
    pub fn add_cliques(&mut self, blocks: &[Vec<VarId>]) {
        for block in blocks {
            if block.len() <= 1 {
                continue;
            }
            let vertices: Option<Vec<VertexId>> =
                block.iter().map(|v| self.by_var.get(v).copied()).collect();
            let vertices = match vertices {
                Some(vertices) => vertices,
                None => continue,
            };
            for (u, v) in vertices.iter().tuple_combinations() {
                self.add_edge(*u, *v);
            }
        }
    }

    /// Remove every vertex whose weight is within [`WEIGHT_EPS`] of zero.
    /// A removed variable vertex can never be picked by any MWVC, so its
    /// indicator is recorded as `false` in `out`.
    pub fn simplify(&mut self, out: &mut BTreeMap<VarId, bool>) {
        let ids: Vec<VertexId> = self.vertex_ids().collect();
        for id in ids {
            if self.weight(id).abs() < WEIGHT_EPS {
                if let VertexKind::Variable(v) = self.kind(id) {
                    out.insert(v, false);
                }
                self.remove_vertex(id);
            }
        }
    }

    /// Vertex counts by kind.
    pub fn statistics(&self) -> CcgStats {
        let mut stats = CcgStats { variables: 0, flower_roots: 0, thorns: 0 };
        for id in self.vertex_ids() {
            match self.kind(id) {
                VertexKind::Variable(_) => stats.variables += 1,
                VertexKind::FlowerRoot => stats.flower_roots += 1,
                VertexKind::Thorn => stats.thorns += 1,
            }
        }
        stats
    }

    /// Write the graph in DIMACS edges format: a `p edges n m` header, a
    /// `v id weight` line per vertex, and an `e u v` line per edge.
    ///
    /// With `renumber`, vertices take fresh 1-based ids and a trailing
    /// mapping block (`--- vertex types begin/end ---`) lists
    /// `new_id external_id` pairs, external ids being the indicator id or
    /// −1/−2 for flower roots/thorns. Without it, the signed external ids
    /// appear directly on both `v` and `e` lines.
    pub fn write_dimacs(&self, w: &mut impl Write, renumber: bool) -> io::Result<()> {
        writeln!(w, "p edges {} {}", self.num_vertices(), self.num_edges())?;

        let mut renumbered: BTreeMap<VertexId, usize> = BTreeMap::new();
        for (next, id) in self.vertex_ids().enumerate() {
            if renumber {
                renumbered.insert(id, next + 1);
                writeln!(w, "v {} {}", next + 1, self.weight(id))?;
            } else {
                writeln!(w, "v {} {}", self.kind(id).external_id(), self.weight(id))?;
            }
        }

        for (u, v) in self.edges() {
            if renumber {
                writeln!(w, "e {} {}", renumbered[&u], renumbered[&v])?;
            } else {
                writeln!(w, "e {} {}", self.kind(u).external_id(), self.kind(v).external_id())?;
            }
        }

        if renumber {
            writeln!(w, "--- vertex types begin ---")?;
            for id in self.vertex_ids() {
                writeln!(w, "{} {}", renumbered[&id], self.kind(id).external_id())?;
            }
            writeln!(w, "--- vertex types end ---")?;
        }
        Ok(())
    }

    /// Write the graph as an undirected graphviz dot document.
    pub fn write_graphviz(&self, w: &mut impl Write) -> io::Result<()> {
        let mut names: BTreeMap<VertexId, usize> = BTreeMap::new();
        writeln!(w, "graph G {{")?;
        for (next, id) in self.vertex_ids().enumerate() {
            names.insert(id, next);
            writeln!(
                w,
                "  {} [label=\"id={},weight={}\"];",
                next,
                self.kind(id).external_id(),
                self.weight(id)
            )?;
        }
        for (u, v) in self.edges() {
            writeln!(w, "  {} -- {};", names[&u], names[&v])?;
        }
        writeln!(w, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polynomial::accumulate_constraint;
    use crate::instance::Constraint;

    /// Brute-force MWVC weight by subset enumeration; only for tiny graphs.
    pub(crate) fn brute_force_mwvc(g: &Ccg) -> Weight {
        let ids: Vec<VertexId> = g.vertex_ids().collect();
        let edges: Vec<(VertexId, VertexId)> = g.edges().collect();
        let mut best = f64::INFINITY;
        for mask in 0..1u64 << ids.len() {
            let chosen: BTreeSet<VertexId> = ids
                .iter()
                .enumerate()
                .filter(|(i, _)| mask >> i & 1 == 1)
                .map(|(_, &id)| id)
                .collect();
            if edges.iter().any(|(u, v)| !chosen.contains(u) && !chosen.contains(v)) {
                continue;
            }
            let weight: Weight = chosen.iter().map(|&id| g.weight(id)).sum();
            best = best.min(weight);
        }
        best
    }

    /// Brute-force minimum of a polynomial over all 0/1 assignments of the
    /// ids it mentions.
    fn brute_force_poly_min(poly: &Polynomial) -> Weight {
        let vars: Vec<VarId> =
            poly.keys().flat_map(|k| k.vars().iter().copied()).collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
        let mut best = f64::INFINITY;
        for mask in 0..1u64 << vars.len() {
            let value: Weight = poly
                .iter()
                .map(|(key, &w)| {
                    let all_on = key.vars().iter().all(|v| {
                        let i = vars.binary_search(v).unwrap();
                        mask >> i & 1 == 1
                    });
                    if all_on {
                        w
                    } else {
                        0.0
                    }
                })
                .sum();
            best = best.min(value);
        }
        best
    }

    fn var_vertex(g: &Ccg, v: VarId) -> VertexId {
        g.vertex_ids()
            .find(|&id| g.kind(id) == VertexKind::Variable(v))
            .expect("variable vertex present")
    }

    #[test]
    fn unary_positive_term_weights_the_variable() {
        // P = 5·X₀: one variable vertex of weight 5, MWVC 0, residual 0.
        let mut poly = Polynomial::new();
        poly.insert(TermKey::singleton(0), 5.0);

        let mut g = Ccg::new();
        let residual = g.add_polynomial(&mut poly);
        assert_eq!(residual, 0.0);
        assert_eq!(g.num_vertices(), 1);
        assert_eq!(g.num_edges(), 0);
        assert_eq!(g.weight(var_vertex(&g, 0)), 5.0);
        assert_eq!(brute_force_mwvc(&g), 0.0);
    }

    #[test]
    fn negative_quadratic_becomes_a_flower() {
        // P = 2·X₀ + 2·X₁ − 4·X₀X₁ (the XOR-like table).
        let mut poly = Polynomial::new();
        poly.insert(TermKey::singleton(0), 2.0);
        poly.insert(TermKey::singleton(1), 2.0);
        poly.insert(TermKey::new([0, 1]), -4.0);

        let mut g = Ccg::new();
        let residual = g.add_polynomial(&mut poly);
        assert_eq!(residual, -4.0);

        let stats = g.statistics();
        assert_eq!((stats.variables, stats.flower_roots, stats.thorns), (2, 1, 0));
        assert_eq!(g.num_edges(), 2);

        // The flower root weighs 4 and covers both edges on its own.
        assert_eq!(brute_force_mwvc(&g), 4.0);
        // MWVC + residual = table optimum 0.
        assert_eq!(brute_force_mwvc(&g) + residual, 0.0);
    }

    #[test]
    fn positive_quadratic_uses_the_thorn_gadget() {
        // P = 3·X₀X₁: L = 4; residual −7; X₀ picks up 4, X₁ picks up 3.
        let mut poly = Polynomial::new();
        poly.insert(TermKey::new([0, 1]), 3.0);

        let mut g = Ccg::new();
        let residual = g.add_polynomial(&mut poly);
        assert_eq!(residual, -7.0);

        let stats = g.statistics();
        assert_eq!((stats.variables, stats.flower_roots, stats.thorns), (2, 1, 1));
        assert_eq!(g.weight(var_vertex(&g, 0)), 4.0);
        assert_eq!(g.weight(var_vertex(&g, 1)), 3.0);

        // min P = 0; the cover optimum must cancel the residual.
        assert_eq!(brute_force_mwvc(&g) + residual, 0.0);
    }

    #[test]
    fn negative_linear_term_hangs_a_flower_off_the_variable() {
        // P = 5 − 5·X₀ (the table w(0)=5, w(1)=0). The variable vertex
        // stays weightless and the flower root prices leaving it uncovered,
        // so every MWVC takes the free variable vertex: X₀ = 1, the
        // argmin of the table.
        let mut poly = Polynomial::new();
        poly.insert(TermKey::empty(), 5.0);
        poly.insert(TermKey::singleton(0), -5.0);

        let mut g = Ccg::new();
        let residual = g.add_polynomial(&mut poly);
        assert_eq!(residual, 5.0);

        let v = var_vertex(&g, 0);
        assert_eq!(g.weight(v), 0.0);
        let stats = g.statistics();
        assert_eq!((stats.variables, stats.flower_roots, stats.thorns), (1, 1, 0));
        assert_eq!(g.num_edges(), 1);
        assert_eq!(brute_force_mwvc(&g), 0.0);
    }

    #[test]
    fn mwvc_plus_residual_matches_polynomial_minimum() {
        // A denser polynomial including a positive cubic term.
        let mut poly = Polynomial::new();
        poly.insert(TermKey::singleton(0), 1.5);
        poly.insert(TermKey::singleton(2), 2.0);
        poly.insert(TermKey::new([0, 1]), 2.0);
        poly.insert(TermKey::new([1, 2]), -3.0);
        poly.insert(TermKey::new([0, 1, 2]), 2.5);

        let expected = brute_force_poly_min(&poly);

        let mut g = Ccg::new();
        let residual = g.add_polynomial(&mut poly.clone());
        let got = brute_force_mwvc(&g) + residual;
        assert!((got - expected).abs() < 1e-9, "{got} != {expected}");
    }

    #[test]
    fn table_to_cover_pipeline_preserves_the_optimum() {
        // Full pipeline over the XOR-like table built from a constraint.
        let mut c = Constraint::new(vec![0, 1], vec![0, 1]);
        c.set_bit_weight(vec![false, false], 0.0);
        c.set_bit_weight(vec![true, false], 2.0);
        c.set_bit_weight(vec![false, true], 2.0);
        c.set_bit_weight(vec![true, true], 0.0);

        let mut poly = Polynomial::new();
        accumulate_constraint(&c, &mut poly).unwrap();

        let mut g = Ccg::new();
        let residual = g.add_polynomial(&mut poly);
        assert_eq!(brute_force_mwvc(&g) + residual, 0.0);
    }

    #[test]
    fn cliques_connect_multi_indicator_blocks() {
        let mut poly = Polynomial::new();
        poly.insert(TermKey::singleton(0), 7.0);
        poly.insert(TermKey::singleton(1), 3.0);

        let mut g = Ccg::new();
        g.add_polynomial(&mut poly);
        assert_eq!(g.num_edges(), 0);

        g.add_cliques(&[vec![0, 1]]);
        assert_eq!(g.num_edges(), 1);

        // Re-adding collapses the duplicate silently.
        g.add_cliques(&[vec![0, 1]]);
        assert_eq!(g.num_edges(), 1);

        // A block mentioning an absent indicator is skipped, others still
        // apply.
        g.add_cliques(&[vec![5, 6], vec![0, 1]]);
        assert_eq!(g.num_edges(), 1);
        assert_eq!(g.num_vertices(), 2);
    }

    #[test]
    fn simplify_drops_zero_weight_vertices_as_false() {
        let mut poly = Polynomial::new();
        poly.insert(TermKey::singleton(0), 5.0);
        poly.insert(TermKey::new([1, 2]), -2.0);

        let mut g = Ccg::new();
        g.add_polynomial(&mut poly);
        // Indicators 1 and 2 carry no linear weight: vertices of weight 0.
        assert_eq!(g.num_vertices(), 4);

        let mut out = BTreeMap::new();
        g.simplify(&mut out);
        assert_eq!(out, BTreeMap::from([(1, false), (2, false)]));
        assert_eq!(g.num_vertices(), 2); // variable 0 and the flower root
        assert!(g.vertex_ids().all(|id| g.weight(id) >= WEIGHT_EPS));
        assert_eq!(g.num_edges(), 0);
    }

    #[test]
    fn dimacs_round_trip_preserves_the_graph() {
        let mut poly = Polynomial::new();
        poly.insert(TermKey::singleton(0), 2.0);
        poly.insert(TermKey::singleton(1), 2.0);
        poly.insert(TermKey::new([0, 1]), -4.0);
        poly.insert(TermKey::new([1, 2]), 3.0);

        let mut g = Ccg::new();
        g.add_polynomial(&mut poly);

        let mut dump = Vec::new();
        g.write_dimacs(&mut dump, true).unwrap();
        let text = String::from_utf8(dump).unwrap();

        // Reparse the dump: header counts, vertex lines, edge multiset.
        let mut lines = text.lines();
        let header: Vec<&str> = lines.next().unwrap().split_whitespace().collect();
        assert_eq!(header[..2], ["p", "edges"]);
        let nv: usize = header[2].parse().unwrap();
        let ne: usize = header[3].parse().unwrap();
        assert_eq!(nv, g.num_vertices());
        assert_eq!(ne, g.num_edges());

        let mut vertex_lines = 0;
        let mut edges = BTreeSet::new();
        let mut types = BTreeMap::new();
        let mut in_types = false;
        for line in lines {
            if line.starts_with("--- vertex types begin") {
                in_types = true;
                continue;
            }
            if line.starts_with("--- vertex types end") {
                in_types = false;
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if in_types {
                types.insert(
                    fields[0].parse::<usize>().unwrap(),
                    fields[1].parse::<i64>().unwrap(),
                );
            } else if fields[0] == "v" {
                vertex_lines += 1;
                let id: usize = fields[1].parse().unwrap();
                assert!(id >= 1 && id <= nv, "renumbered ids are 1-based");
            } else if fields[0] == "e" {
                let u: usize = fields[1].parse().unwrap();
                let v: usize = fields[2].parse().unwrap();
                edges.insert((u.min(v), u.max(v)));
            }
        }
        assert_eq!(vertex_lines, nv);
        assert_eq!(edges.len(), ne);
        assert_eq!(types.len(), nv);

        // The edge multiset matches the live graph under the renumbering.
        let renumbering: BTreeMap<VertexId, usize> =
            g.vertex_ids().enumerate().map(|(i, id)| (id, i + 1)).collect();
        let expected: BTreeSet<(usize, usize)> = g
            .edges()
            .map(|(u, v)| {
                let (a, b) = (renumbering[&u], renumbering[&v]);
                (a.min(b), a.max(b))
            })
            .collect();
        assert_eq!(edges, expected);
    }

    #[test]
    fn graphviz_dump_is_well_formed() {
        let mut poly = Polynomial::new();
        poly.insert(TermKey::singleton(0), 1.0);
        poly.insert(TermKey::singleton(1), -1.0);

        let mut g = Ccg::new();
        g.add_polynomial(&mut poly);

        let mut dump = Vec::new();
        g.write_graphviz(&mut dump).unwrap();
        let text = String::from_utf8(dump).unwrap();
        assert!(text.starts_with("graph G {"));
        assert!(text.contains("label=\"id=1,weight=0\""));
        assert!(text.contains("--"));
        assert!(text.trim_end().ends_with('}'));
    }
}
