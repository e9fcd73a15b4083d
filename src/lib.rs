//! Crate root: public surface, core aliases, and solver-wide invariants
//!
//! This crate solves Weighted Constraint Satisfaction Problems (WCSPs) by
//! reducing them to the Minimum Weighted Vertex Cover (MWVC) problem on the
//! *constraint composite graph* (CCG). The pipeline:
//!
//! 1. Each weighted constraint becomes a multilinear polynomial over Boolean
//!    indicator variables ([`polynomial`], Möbius inversion on the subset
//!    lattice).
//! 2. The accumulated polynomial is rewritten into a weighted undirected
//!    graph whose MWVC weight, plus a residual constant, equals the WCSP
//!    optimum ([`ccg`]).
//! 3. The graph is shrunk by the half-integral LP relaxation of MWVC
//!    ([`kernelize`]), then covered either by an integer program or by
//!    damped min-sum message passing ([`mwvc`]).
//! 4. The Boolean cover decodes back to a finite-domain assignment
//!    ([`instance::WcspInstance::decode_cover`]).
//!
//! ## Invariants
//!
//! - **Two id spaces.** Finite-domain variable ids and Boolean indicator ids
//!   are disjoint, both non-negative. A finite-domain variable of domain
//!   size `d` owns a contiguous block of `d − 1` Boolean indicators; the
//!   mapping lives in [`instance::WcspInstance`].
//! - **Residual accounting.** After [`ccg::Ccg::add_polynomial`] the MWVC
//!   optimum of the graph plus the returned residual constant equals the
//!   minimum of the accumulated polynomial over `{0,1}^n`.
//! - **Zero threshold.** Vertex weights and polynomial coefficients within
//!   [`WEIGHT_EPS`] of zero are treated as zero; after simplification no
//!   vertex weight is below the threshold.
//! - **Single-threaded.** The whole core is synchronous; the LP backend is
//!   pinned to one thread so objective comparisons stay deterministic. The
//!   only nondeterministic path is the message-passing solver's injected
//!   noise, and its PRNG is caller-supplied so tests can pin a seed.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Deadline clock threaded through solver calls.
pub mod deadline;
/// Abstract LP backend and the HiGHS implementation.
pub mod lp;
/// WCSP data model, DIMACS/UAI loaders, and the cover decoder.
pub mod instance;
/// Multilinear polynomial terms and per-constraint Möbius inversion.
pub mod polynomial;
/// The constraint composite graph and its builder.
pub mod ccg;
/// Half-integral LP kernelization.
pub mod kernelize;
/// MWVC solvers: LP/ILP and min-sum message passing.
pub mod mwvc;
/// Direct LP formulation of the WCSP (no CCG).
pub mod direct;

/// Variable identifier. Used for both id spaces (finite-domain variable ids
/// and Boolean indicator ids); the two never mix inside one container.
pub type VarId = usize;

/// A value of a finite-domain variable, in `0..domain_size`.
pub type DomainValue = usize;

/// Constraint weights and everything derived from them.
pub type Weight = f64;

/// Below this magnitude a weight is considered zero throughout the crate:
/// polynomial coefficients are skipped, vertices are simplified out.
pub const WEIGHT_EPS: Weight = 1e-6;

pub use ccg::{Ccg, CcgStats, VertexKind};
pub use deadline::Deadline;
pub use instance::{Constraint, Format, LoadError, WcspInstance};
pub use kernelize::{kernelize_to_fixpoint, Kernelizer, KernelizerError, LpKernelizer};
pub use lp::{ConstraintSense, HighsSolver, LpError, LpSolver, ObjectiveSense, VarKind};
pub use mwvc::{LpMwvcSolver, MessagePassingSolver, MwvcError, MwvcSolver};
pub use polynomial::{Polynomial, PolynomialError, TermKey, MAX_CONSTRAINT_BITS};
