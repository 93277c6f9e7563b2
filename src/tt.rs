//! Term algebra of the kernel.
//!
//! [Term] values may be ill-typed; the reducers in [crate::reduce] assume
//! well-typedness is the caller's problem. Terms are immutable trees shared
//! through [Arc]; mutating operations go through [Arc::make_mut] so inputs
//! held elsewhere are never observed to change.

use regex::Regex;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;
use std::iter::zip;
use std::mem;
use std::sync::atomic::AtomicUsize;
use std::sync::LazyLock;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct Name(usize);

static NAME_COUNTER: AtomicUsize = AtomicUsize::new(0);
static NAME_TABLE: LazyLock<Mutex<HashMap<String, Name>>> = LazyLock::new(Default::default);
static NAME_REV_TABLE: LazyLock<Mutex<HashMap<Name, String>>> = LazyLock::new(Default::default);

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match NAME_REV_TABLE.lock().unwrap().get(self) {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "#{}", self.0),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("invalid name")]
pub struct InvalidNameError;

impl TryFrom<&str> for Name {
    type Error = InvalidNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Name::intern(value)
    }
}

impl Name {
    pub fn fresh() -> Self {
        let id = NAME_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Name(id)
    }

    pub fn intern(value: &str) -> Result<Name, InvalidNameError> {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            regex::Regex::new(r"[\p{Cased_Letter}_][\p{Cased_Letter}\p{Number}_']*(\.[\p{Cased_Letter}_][\p{Cased_Letter}\p{Number}_']*)*").unwrap()
        });
        if !RE.is_match(value) {
            return Err(InvalidNameError);
        }
        Ok(Name::intern_raw(value))
    }

    fn intern_raw(value: &str) -> Name {
        let mut name_table = NAME_TABLE.lock().unwrap();
        if let Some(&name) = name_table.get(value) {
            return name;
        }
        let name = Name::fresh();
        name_table.insert(value.to_owned(), name);
        drop(name_table);
        // This can be put here outside the critical section of NAME_TABLE
        // because no one but this function knows of the value of `name`.
        NAME_REV_TABLE
            .lock()
            .unwrap()
            .insert(name, value.to_owned());
        name
    }

    /// The first primed variant (`x'`, `x''`, …) of `self` not in `avoid`.
    pub fn variant(self, avoid: &HashSet<Name>) -> Name {
        let mut candidate = NAME_REV_TABLE
            .lock()
            .unwrap()
            .get(&self)
            .cloned()
            .unwrap_or_else(|| "x".to_owned());
        loop {
            candidate.push('\'');
            let name = Name::intern_raw(&candidate);
            if !avoid.contains(&name) {
                return name;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    Type,
    Kind,
}

impl Display for Sort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sort::Type => write!(f, "*"),
            Sort::Kind => write!(f, "□"),
        }
    }
}

/// Use syn's convention [https://docs.rs/syn/latest/syn/enum.Expr.html#syntax-tree-enums].
#[derive(Clone, Debug)]
pub enum Term {
    #[non_exhaustive]
    Var(Arc<TermVar>),
    #[non_exhaustive]
    Sort(Sort),
    #[non_exhaustive]
    Abs(Arc<TermBinder>),
    #[non_exhaustive]
    Pi(Arc<TermBinder>),
    #[non_exhaustive]
    App(Arc<TermApp>),
    #[non_exhaustive]
    Ref(Arc<TermRef>),
}

#[derive(Clone, Debug)]
pub struct TermVar {
    pub name: Name,
}

#[derive(Clone, Debug, Default)]
pub struct TermBinder {
    pub binder_name: Name,
    pub binder_type: Term,
    pub body: Term,
}

#[derive(Clone, Debug, Default)]
pub struct TermApp {
    pub fun: Term,
    pub arg: Term,
}

#[derive(Clone, Debug)]
pub struct TermRef {
    pub name: Name,
    pub args: Vec<Term>,
}

impl Default for Term {
    fn default() -> Self {
        Term::Sort(Sort::Type)
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const TERM_PREC_BINDER: u8 = 0;
        const TERM_PREC_APP: u8 = 1;
        const TERM_PREC_ATOM: u8 = 2;

        fn fmt_term(term: &Term, f: &mut std::fmt::Formatter<'_>, prec: u8) -> std::fmt::Result {
            match term {
                Term::Var(inner) => write!(f, "{}", inner.name),
                Term::Sort(sort) => write!(f, "{}", sort),
                Term::Abs(inner) | Term::Pi(inner) => {
                    let needs_paren = prec > TERM_PREC_BINDER;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    let binder = if term.is_abs() { "λ" } else { "Π" };
                    write!(f, "{} {}:", binder, inner.binder_name)?;
                    fmt_term(&inner.binder_type, f, TERM_PREC_APP)?;
                    write!(f, ". ")?;
                    fmt_term(&inner.body, f, TERM_PREC_BINDER)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::App(inner) => {
                    let needs_paren = prec > TERM_PREC_APP;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    fmt_term(&inner.fun, f, TERM_PREC_APP)?;
                    write!(f, " ")?;
                    fmt_term(&inner.arg, f, TERM_PREC_ATOM)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::Ref(inner) => {
                    if inner.args.is_empty() {
                        return write!(f, "{}", inner.name);
                    }
                    write!(f, "[{}", inner.name)?;
                    for arg in &inner.args {
                        write!(f, " ")?;
                        fmt_term(arg, f, TERM_PREC_ATOM)?;
                    }
                    write!(f, "]")
                }
            }
        }

        fmt_term(self, f, TERM_PREC_BINDER)
    }
}

#[inline]
pub fn mk_var(name: Name) -> Term {
    Term::Var(Arc::new(TermVar { name }))
}

#[inline]
pub fn mk_sort(sort: Sort) -> Term {
    Term::Sort(sort)
}

#[inline]
pub fn mk_abs(binder_name: Name, binder_type: Term, body: Term) -> Term {
    Term::Abs(Arc::new(TermBinder {
        binder_name,
        binder_type,
        body,
    }))
}

#[inline]
pub fn mk_pi(binder_name: Name, binder_type: Term, body: Term) -> Term {
    Term::Pi(Arc::new(TermBinder {
        binder_name,
        binder_type,
        body,
    }))
}

#[inline]
pub fn mk_app(fun: Term, arg: Term) -> Term {
    Term::App(Arc::new(TermApp { fun, arg }))
}

#[inline]
pub fn mk_ref(name: Name, args: Vec<Term>) -> Term {
    Term::Ref(Arc::new(TermRef { name, args }))
}

#[derive(Error, Debug, Clone)]
#[error("expected a binder: {0}")]
pub struct BadTerm(pub Term);

/// A formal parameter or an in-scope binding.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: Name,
    pub ty: Term,
}

impl Term {
    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn is_sort(&self) -> bool {
        matches!(self, Term::Sort(_))
    }

    pub fn is_abs(&self) -> bool {
        matches!(self, Term::Abs(_))
    }

    pub fn is_pi(&self) -> bool {
        matches!(self, Term::Pi(_))
    }

    pub fn is_binder(&self) -> bool {
        matches!(self, Term::Abs(_) | Term::Pi(_))
    }

    pub fn is_app(&self) -> bool {
        matches!(self, Term::App(_))
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Term::Ref(_))
    }

    pub fn as_binder(&self) -> Result<&TermBinder, BadTerm> {
        match self {
            Term::Abs(inner) | Term::Pi(inner) => Ok(inner),
            _ => Err(BadTerm(self.clone())),
        }
    }

    /// FV(self). Reference heads count as free occurrences.
    pub fn free_vars(&self) -> HashSet<Name> {
        fn collect(m: &Term, bound: &mut Vec<Name>, acc: &mut HashSet<Name>) {
            match m {
                Term::Var(inner) => {
                    if !bound.contains(&inner.name) {
                        acc.insert(inner.name);
                    }
                }
                Term::Sort(_) => {}
                Term::Abs(inner) | Term::Pi(inner) => {
                    collect(&inner.binder_type, bound, acc);
                    bound.push(inner.binder_name);
                    collect(&inner.body, bound, acc);
                    bound.pop();
                }
                Term::App(inner) => {
                    collect(&inner.fun, bound, acc);
                    collect(&inner.arg, bound, acc);
                }
                Term::Ref(inner) => {
                    if !bound.contains(&inner.name) {
                        acc.insert(inner.name);
                    }
                    for arg in &inner.args {
                        collect(arg, bound, acc);
                    }
                }
            }
        }
        let mut acc = HashSet::new();
        collect(self, &mut vec![], &mut acc);
        acc
    }

    pub fn contains_free(&self, name: Name) -> bool {
        match self {
            Term::Var(inner) => inner.name == name,
            Term::Sort(_) => false,
            Term::Abs(inner) | Term::Pi(inner) => {
                inner.binder_type.contains_free(name)
                    || (inner.binder_name != name && inner.body.contains_free(name))
            }
            Term::App(inner) => inner.fun.contains_free(name) || inner.arg.contains_free(name),
            Term::Ref(inner) => {
                inner.name == name || inner.args.iter().any(|arg| arg.contains_free(name))
            }
        }
    }

    /// {x₁, ⋯, xₙ} # self <==> ∀ i, xᵢ ∉ FV(self)
    pub fn is_fresh(&self, free_list: &[Name]) -> bool {
        free_list.iter().all(|&name| !self.contains_free(name))
    }

    pub fn head(&self) -> &Term {
        let mut m = self;
        while let Term::App(inner) = m {
            m = &inner.fun;
        }
        m
    }

    pub fn args(&self) -> Vec<&Term> {
        let mut m = self;
        let mut args = vec![];
        while let Term::App(inner) = m {
            args.push(&inner.arg);
            m = &inner.fun;
        }
        args.reverse();
        args
    }

    /// m.apply([l₁ ⋯ lₙ])
    /// assert(self = m l₁ ⋯ lₙ)
    pub fn apply(&mut self, args: impl IntoIterator<Item = Term>) {
        let mut m = mem::take(self);
        for arg in args {
            m = mk_app(m, arg);
        }
        *self = m;
    }

    /// m = n l*
    /// m.unapply() // => l*
    /// assert(m = n)
    pub fn unapply(&mut self) -> Vec<Term> {
        let mut args = vec![];
        let mut m = &mut *self;
        while let Term::App(inner) = m {
            let inner = Arc::make_mut(inner);
            args.push(mem::take(&mut inner.arg));
            m = &mut inner.fun;
        }
        *self = mem::take(m);
        args.reverse();
        args
    }

    /// Simultaneously substitute `m₁ ⋯ mₙ` for free occurrences of
    /// `x₁ ⋯ xₙ`, avoiding capture. Bound variables are renamed to their
    /// first primed variant when a replacement would otherwise be captured.
    pub fn subst(&mut self, subst: &[(Name, Term)]) {
        match self {
            Term::Var(inner) => {
                let name = inner.name;
                for (x, m) in subst {
                    if name == *x {
                        *self = m.clone();
                        break;
                    }
                }
            }
            Term::Sort(_) => {}
            Term::Abs(inner) | Term::Pi(inner) => {
                let inner = Arc::make_mut(inner);
                // The domain is outside the scope of the binder.
                inner.binder_type.subst(subst);
                let x = inner.binder_name;
                let mut live: Vec<(Name, Term)> = vec![];
                for (y, n) in subst {
                    if *y != x && inner.body.contains_free(*y) {
                        live.push((*y, n.clone()));
                    }
                }
                if live.is_empty() {
                    return;
                }
                if live.iter().any(|(_, n)| n.contains_free(x)) {
                    let mut avoid = inner.body.free_vars();
                    for (_, n) in &live {
                        avoid.extend(n.free_vars());
                    }
                    let fresh = x.variant(&avoid);
                    live.push((x, mk_var(fresh)));
                    inner.binder_name = fresh;
                }
                inner.body.subst(&live);
            }
            Term::App(inner) => {
                let inner = Arc::make_mut(inner);
                inner.fun.subst(subst);
                inner.arg.subst(subst);
            }
            Term::Ref(inner) => {
                // Reference heads name declarations, not variables; only the
                // arguments are substitution sites.
                for arg in &mut Arc::make_mut(inner).args {
                    arg.subst(subst);
                }
            }
        }
    }

    /// Structural equality modulo consistent renaming of bound variables.
    pub fn alpha_eq(&self, other: &Term) -> bool {
        fn resolve(map: &[(Name, Name)], name: Name) -> Name {
            map.iter()
                .rev()
                .find(|(x, _)| *x == name)
                .map(|&(_, w)| w)
                .unwrap_or(name)
        }

        fn help(
            m1: &Term,
            m2: &Term,
            map1: &mut Vec<(Name, Name)>,
            map2: &mut Vec<(Name, Name)>,
        ) -> bool {
            match (m1, m2) {
                (Term::Var(inner1), Term::Var(inner2)) => {
                    resolve(map1, inner1.name) == resolve(map2, inner2.name)
                }
                (Term::Sort(sort1), Term::Sort(sort2)) => sort1 == sort2,
                (Term::Abs(inner1), Term::Abs(inner2))
                | (Term::Pi(inner1), Term::Pi(inner2)) => {
                    if !help(&inner1.binder_type, &inner2.binder_type, map1, map2) {
                        return false;
                    }
                    // Both bound names map to a shared fresh witness.
                    let witness = Name::fresh();
                    map1.push((inner1.binder_name, witness));
                    map2.push((inner2.binder_name, witness));
                    let eq = help(&inner1.body, &inner2.body, map1, map2);
                    map1.pop();
                    map2.pop();
                    eq
                }
                (Term::App(inner1), Term::App(inner2)) => {
                    help(&inner1.fun, &inner2.fun, map1, map2)
                        && help(&inner1.arg, &inner2.arg, map1, map2)
                }
                (Term::Ref(inner1), Term::Ref(inner2)) => {
                    inner1.name == inner2.name
                        && inner1.args.len() == inner2.args.len()
                        && zip(&inner1.args, &inner2.args)
                            .all(|(a1, a2)| help(a1, a2, map1, map2))
                }
                _ => false,
            }
        }

        help(self, other, &mut vec![], &mut vec![])
    }
}
