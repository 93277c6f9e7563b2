//! Trust kernel of the peano proof assistant.
//!
//! A pure, synchronous library over immutable term trees: capture-avoiding
//! substitution, alpha-equivalence, beta/delta/special reduction, and the
//! conversion test the type checker builds on. The surface parser
//! constructs [tt::Term]s and registers [env::Decl]s; everything here takes
//! the environment by shared reference and never mutates its inputs.

pub mod env;
pub mod reduce;
pub mod tt;

pub use env::{
    Context, Decl, DeclAxiom, DeclDef, DeclSpecial, DeclThm, Env, EnvError, LocalEnv, SpecialFn,
};
pub use reduce::ReduceError;
pub use tt::{
    mk_abs, mk_app, mk_pi, mk_ref, mk_sort, mk_var, BadTerm, InvalidNameError, Name, Parameter,
    Sort, Term,
};
