//! Declarations and the environments that hold them.
//!
//! An [Env] is read-only during a reduction call and may be shared between
//! threads; reducers take it by shared reference and never mutate it.

use crate::tt::{Name, Parameter, Term};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Host computation attached to a special. Invoked only with exactly
/// `arity` arguments; the result becomes the contractum.
pub type SpecialFn = Arc<dyn Fn(&Env, &Context, &[Term]) -> Term + Send + Sync>;

#[derive(Debug, Clone)]
pub enum Decl {
    Def(Arc<DeclDef>),
    Thm(Arc<DeclThm>),
    Axiom(Arc<DeclAxiom>),
    Special(Arc<DeclSpecial>),
}

#[derive(Debug, Clone)]
pub struct DeclDef {
    pub name: Name,
    pub params: Vec<Parameter>,
    /// Absent while the surface layer is still elaborating the definition.
    pub body: Option<Term>,
}

/// Opaque once proved: delta never unfolds a theorem.
#[derive(Debug, Clone)]
pub struct DeclThm {
    pub name: Name,
    pub params: Vec<Parameter>,
    pub proof: Option<Term>,
}

#[derive(Debug, Clone)]
pub struct DeclAxiom {
    pub name: Name,
    pub params: Vec<Parameter>,
}

#[derive(Clone)]
pub struct DeclSpecial {
    pub name: Name,
    pub params: Vec<Parameter>,
    pub eval: SpecialFn,
}

impl fmt::Debug for DeclSpecial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclSpecial")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Decl {
    pub fn name(&self) -> Name {
        match self {
            Decl::Def(decl) => decl.name,
            Decl::Thm(decl) => decl.name,
            Decl::Axiom(decl) => decl.name,
            Decl::Special(decl) => decl.name,
        }
    }

    pub fn params(&self) -> &[Parameter] {
        match self {
            Decl::Def(decl) => &decl.params,
            Decl::Thm(decl) => &decl.params,
            Decl::Axiom(decl) => &decl.params,
            Decl::Special(decl) => &decl.params,
        }
    }

    pub fn arity(&self) -> usize {
        self.params().len()
    }
}

#[derive(Error, Debug, Clone)]
pub enum EnvError {
    #[error("redeclared name: {name}")]
    Redeclared { name: Name },
}

/// The global declaration registry. A scratch scope can be stacked on a
/// parent with [Env::nested]; lookup walks the chain.
#[derive(Debug, Clone, Default)]
pub struct Env {
    decls: HashMap<Name, Decl>,
    parent: Option<Arc<Env>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nested(parent: Arc<Env>) -> Self {
        Env {
            decls: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn declare(&mut self, decl: Decl) -> Result<(), EnvError> {
        let name = decl.name();
        if self.decls.contains_key(&name) {
            return Err(EnvError::Redeclared { name });
        }
        self.decls.insert(name, decl);
        Ok(())
    }

    pub fn fetch(&self, name: Name) -> Option<&Decl> {
        match self.decls.get(&name) {
            Some(decl) => Some(decl),
            None => self.parent.as_deref()?.fetch(name),
        }
    }
}

/// Map-only environment for parse-time resolution; no layered lookup.
#[derive(Debug, Clone, Default)]
pub struct LocalEnv {
    decls: HashMap<Name, Decl>,
}

impl LocalEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, decl: Decl) -> Result<(), EnvError> {
        let name = decl.name();
        if self.decls.contains_key(&name) {
            return Err(EnvError::Redeclared { name });
        }
        self.decls.insert(name, decl);
        Ok(())
    }

    pub fn fetch(&self, name: Name) -> Option<&Decl> {
        self.decls.get(&name)
    }
}

/// The ordered list of in-scope bindings. Only special reduction reads it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub binders: Vec<Parameter>,
}

impl Context {
    pub fn push(&mut self, binder: Parameter) {
        self.binders.push(binder);
    }

    pub fn pop(&mut self) -> Option<Parameter> {
        self.binders.pop()
    }

    /// Type of the innermost binding of `name`.
    pub fn get(&self, name: Name) -> Option<&Term> {
        self.binders.iter().rev().find_map(|binder| {
            if binder.name == name {
                Some(&binder.ty)
            } else {
                None
            }
        })
    }
}
