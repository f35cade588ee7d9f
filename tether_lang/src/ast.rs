//! Syntax tree for the policy language.

use crate::lexer::Span;
use crate::rules::Effect;

/// A reference like `Net::DnsZone::"example.com"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    /// Type path, e.g. `["Net", "DnsZone"]`.
    pub path: Vec<String>,
    pub id: String,
    pub span: Span,
}

impl EntityRef {
    /// The type path joined with `::`.
    pub fn type_name(&self) -> String {
        self.path.join("::")
    }
}

/// Constraint on one slot of the policy head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Bare `principal` / `action` / `resource`.
    Any(Span),
    Eq(EntityRef),
    In(Vec<EntityRef>, Span),
}

impl Scope {
    pub fn entities(&self) -> &[EntityRef] {
        match self {
            Scope::Any(_) => &[],
            Scope::Eq(e) => std::slice::from_ref(e),
            Scope::In(es, _) => es,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Scope::Any(s) | Scope::In(_, s) => *s,
            Scope::Eq(e) => e.span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    When,
    Unless,
}

/// One `&&`-separated term of a condition body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    True(Span),
    ResourceIn(Vec<EntityRef>, Span),
    ResourceEq(EntityRef),
    ContextEq { key: String, value: String, span: Span },
    ContextLike { key: String, pattern: String, span: Span },
}

impl Clause {
    pub fn span(&self) -> Span {
        match self {
            Clause::True(s) | Clause::ResourceIn(_, s) => *s,
            Clause::ResourceEq(e) => e.span,
            Clause::ContextEq { span, .. } | Clause::ContextLike { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub clauses: Vec<Clause>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// From an `@id("…")` annotation, else `policy<N>` by position.
    pub id: String,
    pub effect: Effect,
    pub principal: Scope,
    pub action: Scope,
    pub resource: Scope,
    pub conditions: Vec<Condition>,
    pub span: Span,
}

impl Policy {
    /// Every clause across all conditions, paired with its condition kind.
    pub fn clauses(&self) -> impl Iterator<Item = (ConditionKind, &Clause)> {
        self.conditions
            .iter()
            .flat_map(|c| c.clauses.iter().map(move |cl| (c.kind, cl)))
    }
}
