//! WCSP data model, loaders, and the cover decoder
//!
//! A problem instance is a list of weighted constraints plus the mapping
//! from finite-domain variables to their Boolean indicator blocks. A
//! variable of domain size `d` owns `d − 1` indicators in a contiguous
//! block; the encoding of a value into its block is:
//!
//! - `d = 2`: the single indicator equals the value.
//! - `d > 2`: value `0` sets the whole block to ones; value `v > 0` clears
//!   bit `v − 1` and sets the rest.
//!
//! Each constraint stores its weight table twice: keyed by finite-domain
//! value tuples (used by [`WcspInstance::compute_total_weight`]) and keyed
//! by indicator bit-vectors (consumed by the polynomial conversion).
//! Tuples absent from either table weigh the constraint's default.
//!
//! Two loaders are provided: DIMACS
//! (<http://graphmod.ics.uci.edu/group/WCSP_file_format>) and UAI. UAI
//! scopes are stored reversed relative to the file (the format enumerates
//! table entries with the first listed variable slowest) and entries are
//! normalized to weights `−ln(p / Σp)`, clamped to `1e6` when non-finite.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use crate::{DomainValue, VarId, Weight};

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// DIMACS-style WCSP files.
    Dimacs,
    /// UAI Markov-network files.
    Uai,
}

/// Loader failures.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A record could not be parsed.
    #[error("line {line}: {reason}")]
    InputMalformed {
        /// 1-based line of the offending record.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// The input ended in the middle of a record.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Underlying reader failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn malformed(line: usize, reason: impl Into<String>) -> LoadError {
    LoadError::InputMalformed { line, reason: reason.into() }
}

/// Append the Boolean encoding of `value` for a block of `block_len`
/// indicators onto `bits`.
pub fn push_value_bits(bits: &mut Vec<bool>, block_len: usize, value: DomainValue) {
    if block_len == 1 {
        bits.push(value != 0);
        return;
    }
    for k in 1..=block_len {
        bits.push(value != k);
    }
}

/// A weighted constraint, immutable once the instance is built.
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    scope: Vec<VarId>,
    bool_scope: Vec<VarId>,
    tuple_weights: BTreeMap<Vec<DomainValue>, Weight>,
    bit_weights: BTreeMap<Vec<bool>, Weight>,
    default_weight: Weight,
}

impl Constraint {
    /// A constraint over the given finite-domain scope whose Boolean scope
    /// is the concatenation of the scope variables' indicator blocks.
    pub fn new(scope: Vec<VarId>, bool_scope: Vec<VarId>) -> Self {
        Self { scope, bool_scope, ..Self::default() }
    }

    /// Set the weight of tuples absent from the tables.
    pub fn set_default_weight(&mut self, w: Weight) {
        self.default_weight = w;
    }

    /// Ordered finite-domain variable ids.
    pub fn scope(&self) -> &[VarId] {
        &self.scope
    }

    /// Ordered Boolean indicator ids (concatenated blocks).
    pub fn bool_scope(&self) -> &[VarId] {
        &self.bool_scope
    }

    /// The weight applied to unlisted tuples.
    pub fn default_weight(&self) -> Weight {
        self.default_weight
    }

    /// Record the weight of a finite-domain value tuple.
    pub fn set_tuple_weight(&mut self, values: Vec<DomainValue>, w: Weight) {
        self.tuple_weights.insert(values, w);
    }

    /// Record the weight of an indicator bit-vector.
    pub fn set_bit_weight(&mut self, bits: Vec<bool>, w: Weight) {
        self.bit_weights.insert(bits, w);
    }

    /// Weight of a finite-domain value tuple; unlisted tuples weigh the
    /// default.
    pub fn tuple_weight(&self, values: &[DomainValue]) -> Weight {
        self.tuple_weights.get(values).copied().unwrap_or(self.default_weight)
    }

    /// Weight of an indicator bit-vector; unlisted vectors weigh the
    /// default.
    pub fn bit_weight(&self, bits: &[bool]) -> Weight {
        self.bit_weights.get(bits).copied().unwrap_or(self.default_weight)
    }
}

/// A WCSP instance: constraints plus the finite-domain → indicator-block
/// mapping.
#[derive(Debug, Clone, Default)]
pub struct WcspInstance {
    constraints: Vec<Constraint>,
    boolean_blocks: Vec<Vec<VarId>>,
}

impl WcspInstance {
    /// Build an instance directly from its parts.
    pub fn new(boolean_blocks: Vec<Vec<VarId>>, constraints: Vec<Constraint>) -> Self {
        Self { constraints, boolean_blocks }
    }

    /// Load an instance from a reader in the given format.
    pub fn from_reader(reader: impl BufRead, format: Format) -> Result<Self, LoadError> {
        match format {
            Format::Dimacs => Self::load_dimacs(reader),
            Format::Uai => Self::load_uai(reader),
        }
    }

    /// The ordered constraint list.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Indicator blocks indexed by finite-domain variable id.
    pub fn boolean_blocks(&self) -> &[Vec<VarId>] {
        &self.boolean_blocks
    }

    /// Domain size of a finite-domain variable.
    pub fn domain_size(&self, v: VarId) -> usize {
        self.boolean_blocks[v].len() + 1
    }

    /// Total weight of an assignment: per-constraint table lookups, with
    /// variables absent from the assignment read as value 0.
    pub fn compute_total_weight(&self, assignment: &BTreeMap<VarId, DomainValue>) -> Weight {
        let mut total = 0.0;
        let mut values = Vec::new();
        for c in &self.constraints {
            values.clear();
            values.extend(c.scope().iter().map(|v| assignment.get(v).copied().unwrap_or(0)));
            total += c.tuple_weight(&values);
        }
        total
    }

    /// Reconstruct the finite-domain assignment from a Boolean cover map.
    ///
    /// For a block `[b₀, …, b_{d−2}]`: a two-value domain reads the value
    /// of `b₀` directly; larger domains take the position of the first
    /// indicator that is *false* (plus one), or `0` when every indicator
    /// is true. A variable whose `b₀` is absent from the cover is
    /// unconstrained and omitted. Indicators absent from the cover beyond
    /// `b₀` read as true.
    pub fn decode_cover(&self, cover: &BTreeMap<VarId, bool>) -> BTreeMap<VarId, DomainValue> {
        let mut solution = BTreeMap::new();
        for (v, block) in self.boolean_blocks.iter().enumerate() {
            let first = match block.first() {
                Some(first) => first,
                None => continue,
            };
            if !cover.contains_key(first) {
                continue;
            }
            if block.len() == 1 {
                solution.insert(v, cover[first] as DomainValue);
                continue;
            }
            let value = match block
                .iter()
                .position(|b| !cover.get(b).copied().unwrap_or(true))
            {
                Some(k) => k + 1,
                None => 0,
            };
            solution.insert(v, value);
        }
        solution
    }

    /// Dump the finite-domain → Boolean mapping in human-readable form.
    pub fn write_boolean_mapping(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "--- Non-Boolean Variable Mapping BEGINS ---")?;
        for (v, block) in self.boolean_blocks.iter().enumerate() {
            write!(w, "{v}\t")?;
            for b in block {
                write!(w, "{b} ")?;
            }
            writeln!(w)?;
        }
        writeln!(w, "--- Non-Boolean Variable Mapping ENDS ---")
    }

    fn load_dimacs(reader: impl BufRead) -> Result<Self, LoadError> {
        let mut lines = LineSource::new(reader);

        // Header: name, variable count, max domain size, constraint count,
        // global upper bound. The name and the bound are ignored.
        let (line_no, header) = lines.next_line()?;
        let mut tok = header.split_whitespace();
        tok.next().ok_or_else(|| malformed(line_no, "missing problem name"))?;
        let nv: usize = parse_field(tok.next(), line_no, "variable count")?;
        let _max_domain: usize = parse_field(tok.next(), line_no, "max domain size")?;
        let nc: usize = parse_field(tok.next(), line_no, "constraint count")?;

        // Domain sizes, one per variable, defining the indicator blocks.
        let (line_no, domains) = lines.next_line()?;
        let mut boolean_blocks = Vec::with_capacity(nv);
        let mut next_bool_id: VarId = 0;
        let mut tok = domains.split_whitespace();
        for v in 0..nv {
            let d: usize = parse_field(tok.next(), line_no, "domain size")?;
            if d == 0 {
                return Err(malformed(line_no, format!("variable {v} has an empty domain")));
            }
            let block: Vec<VarId> = (next_bool_id..next_bool_id + d - 1).collect();
            next_bool_id += block.len();
            boolean_blocks.push(block);
        }

        let mut constraints = Vec::with_capacity(nc);
        for _ in 0..nc {
            let (line_no, header) = lines.next_line()?;
            let mut tok = header.split_whitespace();
            let arity: usize = parse_field(tok.next(), line_no, "constraint arity")?;

            let mut scope = Vec::with_capacity(arity);
            let mut bool_scope = Vec::new();
            for _ in 0..arity {
                let vid: VarId = parse_field(tok.next(), line_no, "variable id")?;
                let block = boolean_blocks
                    .get(vid)
                    .ok_or_else(|| malformed(line_no, format!("unknown variable {vid}")))?;
                bool_scope.extend_from_slice(block);
                scope.push(vid);
            }
            let default_cost: Weight = parse_field(tok.next(), line_no, "default cost")?;
            let ntuples: usize = parse_field(tok.next(), line_no, "tuple count")?;

            let mut constraint = Constraint::new(scope, bool_scope);
            constraint.set_default_weight(default_cost);

            for _ in 0..ntuples {
                let (line_no, entry) = lines.next_line()?;
                let mut tok = entry.split_whitespace();
                let mut values = Vec::with_capacity(arity);
                let mut bits = Vec::with_capacity(constraint.bool_scope().len());
                for k in 0..arity {
                    let val: DomainValue = parse_field(tok.next(), line_no, "tuple value")?;
                    let block_len = boolean_blocks[constraint.scope()[k]].len();
                    if val > block_len {
                        return Err(malformed(
                            line_no,
                            format!("value {val} outside the domain of variable {}", constraint.scope()[k]),
                        ));
                    }
                    values.push(val);
                    push_value_bits(&mut bits, block_len, val);
                }
                let cost: Weight = parse_field(tok.next(), line_no, "tuple cost")?;
                constraint.set_tuple_weight(values, cost);
                constraint.set_bit_weight(bits, cost);
            }

            constraints.push(constraint);
        }

        Ok(Self { constraints, boolean_blocks })
    }

    fn load_uai(mut reader: impl BufRead) -> Result<Self, LoadError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let mut tok = TokenSource::new(&text);

        tok.next_str("preamble")?; // "MARKOV"; the value is not checked
        let nv: usize = tok.next_parsed("variable count")?;

        let mut boolean_blocks = Vec::with_capacity(nv);
        let mut next_bool_id: VarId = 0;
        for v in 0..nv {
            let d: usize = tok.next_parsed("domain size")?;
            if d == 0 {
                return Err(malformed(tok.line(), format!("variable {v} has an empty domain")));
            }
            let block: Vec<VarId> = (next_bool_id..next_bool_id + d - 1).collect();
            next_bool_id += block.len();
            boolean_blocks.push(block);
        }

        let nc: usize = tok.next_parsed("constraint count")?;

        // Scopes are stored reversed: the format enumerates table entries
        // with the last listed variable fastest, and the table decoding
        // below walks the reversed scope least-significant first.
        let mut constraints = Vec::with_capacity(nc);
        for _ in 0..nc {
            let arity: usize = tok.next_parsed("constraint arity")?;
            let mut scope = vec![0; arity];
            for j in 0..arity {
                let vid: VarId = tok.next_parsed("variable id")?;
                if vid >= boolean_blocks.len() {
                    return Err(malformed(tok.line(), format!("unknown variable {vid}")));
                }
                scope[arity - j - 1] = vid;
            }
            let mut bool_scope = Vec::new();
            for &vid in &scope {
                bool_scope.extend_from_slice(&boolean_blocks[vid]);
            }
            constraints.push(Constraint::new(scope, bool_scope));
        }

        for constraint in &mut constraints {
            let ntuples: usize = tok.next_parsed("table size")?;
            let mut costs = Vec::with_capacity(ntuples);
            for _ in 0..ntuples {
                costs.push(tok.next_parsed::<Weight>("table entry")?);
            }

            let sum: Weight = costs.iter().sum();
            for (j, cost) in costs.into_iter().enumerate() {
                let mut w = -(cost / sum).ln();
                if !w.is_finite() {
                    w = 1e6;
                }

                let mut values = Vec::with_capacity(constraint.scope().len());
                let mut bits = Vec::with_capacity(constraint.bool_scope().len());
                let mut j0 = j;
                for &vid in constraint.scope() {
                    let d = boolean_blocks[vid].len() + 1;
                    let val = j0 % d;
                    j0 /= d;
                    values.push(val);
                    push_value_bits(&mut bits, d - 1, val);
                }
                constraint.set_tuple_weight(values, w);
                constraint.set_bit_weight(bits, w);
            }
        }

        Ok(Self { constraints, boolean_blocks })
    }
}

fn parse_field<T: std::str::FromStr>(
    tok: Option<&str>,
    line: usize,
    what: &str,
) -> Result<T, LoadError> {
    let tok = tok.ok_or_else(|| malformed(line, format!("missing {what}")))?;
    tok.parse().map_err(|_| malformed(line, format!("invalid {what}: {tok:?}")))
}

/// Line-oriented reader that skips blank lines and tracks line numbers.
struct LineSource<R> {
    lines: io::Lines<R>,
    line: usize,
}

impl<R: BufRead> LineSource<R> {
    fn new(reader: R) -> Self {
        Self { lines: reader.lines(), line: 0 }
    }

    fn next_line(&mut self) -> Result<(usize, String), LoadError> {
        loop {
            self.line += 1;
            match self.lines.next() {
                None => return Err(LoadError::UnexpectedEof),
                Some(line) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        return Ok((self.line, line));
                    }
                }
            }
        }
    }
}

/// Whitespace tokenizer with line tracking, for the token-oriented UAI
/// format.
struct TokenSource<'a> {
    tokens: std::vec::IntoIter<(usize, &'a str)>,
    line: usize,
}

impl<'a> TokenSource<'a> {
    fn new(text: &'a str) -> Self {
        let tokens: Vec<(usize, &'a str)> = text
            .lines()
            .enumerate()
            .flat_map(|(i, l)| l.split_whitespace().map(move |t| (i + 1, t)))
            .collect();
        Self { tokens: tokens.into_iter(), line: 0 }
    }

    fn line(&self) -> usize {
        self.line
    }

    fn next_str(&mut self, what: &str) -> Result<&'a str, LoadError> {
        match self.tokens.next() {
            Some((line, tok)) => {
                self.line = line;
                Ok(tok)
            }
            None => Err(malformed(self.line, format!("missing {what}"))),
        }
    }

    fn next_parsed<T: std::str::FromStr>(&mut self, what: &str) -> Result<T, LoadError> {
        let tok = self.next_str(what)?;
        tok.parse().map_err(|_| malformed(self.line, format!("invalid {what}: {tok:?}")))
    }
}
