//! Beta, delta and special reduction, normalization, and conversion.
//!
//! Every one-step reducer mutates its term in place and reports whether a
//! rewrite happened; `(t', reduced?)` in the abstract presentation is the
//! pair of the mutated term and the returned flag. A step reduces at most
//! one redex. Termination of the `*_normalize` loops is a property of
//! well-typed input and is the caller's responsibility.

use crate::env::{Context, Decl, DeclDef, Env, LocalEnv};
use crate::tt::{mk_abs, Name, Parameter, Term, TermBinder};
use std::iter::zip;
use std::mem;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ReduceError {
    #[error("not a beta-redex: {0}")]
    NotRedex(Term),
    #[error("not a reference: {0}")]
    NotReference(Term),
    #[error("{name} applied to {got} arguments but has arity {arity}")]
    TooManyArgs { name: Name, got: usize, arity: usize },
    #[error("special {name} needs {arity} arguments, got {got}")]
    InsufficientArgs { name: Name, got: usize, arity: usize },
    #[error("definition {name} has no body")]
    CorruptDefinition { name: Name },
    #[error("theorem {name} has no proof")]
    UnprovenTheorem { name: Name },
    #[error("special {name} cannot be delta-unfolded")]
    SpecialInDelta { name: Name },
}

impl Term {
    fn beta_contract(&mut self) -> bool {
        let Term::App(app) = &mut *self else {
            return false;
        };
        let Term::Abs(lam) = &app.fun else {
            return false;
        };
        let lam = lam.clone();
        let arg = mem::take(&mut Arc::make_mut(app).arg);
        let TermBinder {
            binder_name, body, ..
        } = Arc::unwrap_or_clone(lam);
        let mut contractum = body;
        contractum.subst(&[(binder_name, arg)]);
        *self = contractum;
        true
    }

    /// ((λ x:τ. m) n)  ▷β  [n/x]m
    ///
    /// Contracts the redex at the root; anything else is a caller bug.
    pub fn beta_reduce(&mut self) -> Result<(), ReduceError> {
        if self.beta_contract() {
            Ok(())
        } else {
            Err(ReduceError::NotRedex(self.clone()))
        }
    }

    /// One leftmost-outermost beta step, exploring binder domains before
    /// bodies and function positions before contraction and arguments.
    pub fn beta_step(&mut self) -> bool {
        match self {
            Term::Var(_) | Term::Sort(_) => false,
            Term::Abs(inner) | Term::Pi(inner) => {
                let inner = Arc::make_mut(inner);
                inner.binder_type.beta_step() || inner.body.beta_step()
            }
            Term::App(inner) => {
                let app = Arc::make_mut(inner);
                if app.fun.beta_step() {
                    return true;
                }
                if app.fun.is_abs() {
                    return self.beta_contract();
                }
                app.arg.beta_step()
            }
            Term::Ref(inner) => {
                let inner = Arc::make_mut(inner);
                inner.args.iter_mut().any(|arg| arg.beta_step())
            }
        }
    }

    pub fn beta_normalize(&mut self) {
        while self.beta_step() {}
    }

    /// Weak-head normalization: beta only, never under a binder.
    pub fn whnf(&mut self) -> bool {
        let mut changed = false;
        loop {
            let Term::App(inner) = &mut *self else {
                return changed;
            };
            if Arc::make_mut(inner).fun.whnf() {
                changed = true;
            }
            if self.beta_contract() {
                changed = true;
                continue;
            }
            return changed;
        }
    }

    /// Beta-conversion modulo alpha, with no declarations in play.
    pub fn beta_eq(&self, other: &Term) -> bool {
        let mut m1 = self.clone();
        let mut m2 = other.clone();
        m1.beta_normalize();
        m2.beta_normalize();
        m1.alpha_eq(&m2)
    }
}

impl DeclDef {
    /// Pairs the leading parameters with `args` into one simultaneous
    /// substitution and wraps the body in a lambda per leftover parameter
    /// before applying it, so leftover binders are freshened when they
    /// collide with free variables of the arguments.
    pub fn instantiate(&self, args: &[Term]) -> Result<Term, ReduceError> {
        let Some(body) = &self.body else {
            return Err(ReduceError::CorruptDefinition { name: self.name });
        };
        if args.len() > self.params.len() {
            return Err(ReduceError::TooManyArgs {
                name: self.name,
                got: args.len(),
                arity: self.params.len(),
            });
        }
        let mut subst = Vec::with_capacity(args.len());
        for (x, arg) in zip(&self.params, args) {
            subst.push((x.name, arg.clone()));
        }
        let mut m = body.clone();
        for x in self.params[args.len()..].iter().rev() {
            m = mk_abs(x.name, x.ty.clone(), m);
        }
        m.subst(&subst);
        Ok(m)
    }
}

enum Lookup<'a> {
    Global(&'a Env),
    Local(&'a LocalEnv),
}

impl Lookup<'_> {
    fn fetch(&self, name: Name) -> Option<&Decl> {
        match self {
            Lookup::Global(env) => env.fetch(name),
            Lookup::Local(env) => env.fetch(name),
        }
    }
}

/// Unfolding policy at a reference. Definitions unfold; proved theorems and
/// axioms are opaque; an unknown name is left for higher layers to judge.
fn delta_reduce_with(src: &Lookup<'_>, m: &mut Term) -> Result<bool, ReduceError> {
    let Term::Ref(inner) = &*m else {
        return Err(ReduceError::NotReference(m.clone()));
    };
    let Some(decl) = src.fetch(inner.name) else {
        return Ok(false);
    };
    if inner.args.len() > decl.arity() {
        return Err(ReduceError::TooManyArgs {
            name: inner.name,
            got: inner.args.len(),
            arity: decl.arity(),
        });
    }
    match decl {
        Decl::Def(def) => {
            let contractum = def.instantiate(&inner.args)?;
            if log::log_enabled!(log::Level::Debug) {
                println!("δ: unfolding {}", inner.name);
            }
            *m = contractum;
            Ok(true)
        }
        Decl::Thm(thm) => {
            if thm.proof.is_none() {
                return Err(ReduceError::UnprovenTheorem { name: thm.name });
            }
            Ok(false)
        }
        Decl::Axiom(_) => Ok(false),
        Decl::Special(special) => Err(ReduceError::SpecialInDelta { name: special.name }),
    }
}

fn delta_step_with(src: &Lookup<'_>, m: &mut Term) -> Result<bool, ReduceError> {
    match m {
        Term::Var(_) | Term::Sort(_) => Ok(false),
        Term::Abs(inner) | Term::Pi(inner) => {
            let inner = Arc::make_mut(inner);
            if delta_step_with(src, &mut inner.binder_type)? {
                return Ok(true);
            }
            delta_step_with(src, &mut inner.body)
        }
        Term::App(inner) => {
            let inner = Arc::make_mut(inner);
            if delta_step_with(src, &mut inner.fun)? {
                return Ok(true);
            }
            delta_step_with(src, &mut inner.arg)
        }
        Term::Ref(inner) => {
            // arguments first; the node itself only when they are quiescent
            let inner = Arc::make_mut(inner);
            for arg in &mut inner.args {
                if delta_step_with(src, arg)? {
                    return Ok(true);
                }
            }
            delta_reduce_with(src, m)
        }
    }
}

impl Env {
    /// One-step unfolding of the reference at the root.
    pub fn delta_reduce(&self, m: &mut Term) -> Result<bool, ReduceError> {
        delta_reduce_with(&Lookup::Global(self), m)
    }

    pub fn delta_step(&self, m: &mut Term) -> Result<bool, ReduceError> {
        delta_step_with(&Lookup::Global(self), m)
    }

    pub fn delta_normalize(&self, m: &mut Term) -> Result<(), ReduceError> {
        while self.delta_step(m)? {}
        Ok(())
    }
}

impl LocalEnv {
    pub fn delta_reduce(&self, m: &mut Term) -> Result<bool, ReduceError> {
        delta_reduce_with(&Lookup::Local(self), m)
    }

    pub fn delta_step(&self, m: &mut Term) -> Result<bool, ReduceError> {
        delta_step_with(&Lookup::Local(self), m)
    }

    pub fn delta_normalize(&self, m: &mut Term) -> Result<(), ReduceError> {
        while self.delta_step(m)? {}
        Ok(())
    }
}

impl Env {
    /// Fires the host computation of a fully applied special. Specials are
    /// never eta-expanded: fewer than `arity` arguments is a hard failure.
    pub fn special_reduce(&self, ctx: &Context, m: &mut Term) -> Result<bool, ReduceError> {
        let Term::Ref(inner) = &*m else {
            return Err(ReduceError::NotReference(m.clone()));
        };
        let Some(Decl::Special(special)) = self.fetch(inner.name) else {
            return Ok(false);
        };
        let arity = special.params.len();
        if inner.args.len() > arity {
            return Err(ReduceError::TooManyArgs {
                name: special.name,
                got: inner.args.len(),
                arity,
            });
        }
        if inner.args.len() < arity {
            return Err(ReduceError::InsufficientArgs {
                name: special.name,
                got: inner.args.len(),
                arity,
            });
        }
        if log::log_enabled!(log::Level::Debug) {
            println!("σ: firing special {}", special.name);
        }
        let contractum = (special.eval)(self, ctx, &inner.args);
        *m = contractum;
        Ok(true)
    }

    fn special_step_in(&self, ctx: &mut Context, m: &mut Term) -> Result<bool, ReduceError> {
        match m {
            Term::Var(_) | Term::Sort(_) => Ok(false),
            Term::Abs(inner) | Term::Pi(inner) => {
                let inner = Arc::make_mut(inner);
                if self.special_step_in(ctx, &mut inner.binder_type)? {
                    return Ok(true);
                }
                ctx.push(Parameter {
                    name: inner.binder_name,
                    ty: inner.binder_type.clone(),
                });
                let reduced = self.special_step_in(ctx, &mut inner.body);
                ctx.pop();
                reduced
            }
            Term::App(inner) => {
                let inner = Arc::make_mut(inner);
                if self.special_step_in(ctx, &mut inner.fun)? {
                    return Ok(true);
                }
                self.special_step_in(ctx, &mut inner.arg)
            }
            Term::Ref(inner) => {
                let inner = Arc::make_mut(inner);
                for arg in &mut inner.args {
                    if self.special_step_in(ctx, arg)? {
                        return Ok(true);
                    }
                }
                self.special_reduce(ctx, m)
            }
        }
    }

    pub fn special_step(&self, ctx: &Context, m: &mut Term) -> Result<bool, ReduceError> {
        let mut ctx = ctx.clone();
        self.special_step_in(&mut ctx, m)
    }

    pub fn special_normalize(&self, ctx: &Context, m: &mut Term) -> Result<(), ReduceError> {
        let mut ctx = ctx.clone();
        while self.special_step_in(&mut ctx, m)? {}
        Ok(())
    }

    /// Combined reduction to normal form. Specials go first because they may
    /// introduce definitions; delta before beta keeps an unfolding from
    /// racing the redexes it exposes.
    pub fn normalize(&self, ctx: &Context, m: &mut Term) -> Result<(), ReduceError> {
        let mut ctx = ctx.clone();
        loop {
            if self.special_step_in(&mut ctx, m)? {
                continue;
            }
            if self.delta_step(m)? {
                continue;
            }
            if m.beta_step() {
                continue;
            }
            return Ok(());
        }
    }

    /// Definitional equality: normalize both sides, compare modulo alpha.
    ///
    /// Γ ⊢ m₁ : τ    Γ ⊢ m₂ : τ
    /// -------------------------
    /// Γ ⊢ m₁ ≡ m₂ : τ
    pub fn beta_eq(&self, ctx: &Context, m1: &Term, m2: &Term) -> Result<bool, ReduceError> {
        let mut m1 = m1.clone();
        let mut m2 = m2.clone();
        self.normalize(ctx, &mut m1)?;
        self.normalize(ctx, &mut m2)?;
        Ok(m1.alpha_eq(&m2))
    }
}
