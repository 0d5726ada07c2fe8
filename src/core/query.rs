// =============================================================================
// QUERY — Prédicats, chemins d'attributs et contexte de requête
// =============================================================================
//
// Le compilateur de filtres ne parle à aucune base : il produit un ARBRE de
// prédicats indépendant du backend, accompagné de la liste des JOINs qu'il a
// demandés. Chaque backend (mémoire, SQL...) interprète ensuite cet arbre.
//
//   QueryContext → la racine (type source) + les JOINs déjà ouverts
//   AttributePath → « à partir de tel JOIN, suivre ces attributs »
//   Predicate    → l'arbre booléen (AND, NOT, comparaisons, IN, LIKE...)
//   Specs        → une fonction contexte → prédicat, composable par AND
//
// EXEMPLE : `selectedAccount.state.amount = 1000` depuis Client donne
//   JOIN j1 : r.selectedAccount (LEFT, Account)
//   Compare(j1.state.amount, =, 1000)
//
// Les JOINs LEFT sont réutilisés : deux filtres sur le même attribut
// relationnel du même parent partagent le même JOIN.
//
// =============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::error::LinkResult;
use super::path;
use super::processor::Processor;
use super::typeside::{FieldType, Value};

/// Point de départ d'un chemin : la racine ou un JOIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinRef {
    Root,
    Join(usize),
}

impl fmt::Display for JoinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinRef::Root => write!(f, "r"),
            JoinRef::Join(id) => write!(f, "j{}", id),
        }
    }
}

/// Sorte de JOIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Un JOIN ouvert par le compilateur.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub id: usize,
    pub parent: JoinRef,
    /// Attributs suivis depuis le parent (embarqués puis relation)
    pub attribute: Vec<String>,
    pub kind: JoinKind,
    /// Entité atteinte
    pub target_type: String,
    /// Relation to-many (collection ou tableau d'entités)
    pub plural: bool,
    /// Attribut de la cible qui référence le parent (to-many)
    pub mapped_by: Option<String>,
}

impl Join {
    pub fn alias(&self) -> JoinRef {
        JoinRef::Join(self.id)
    }
}

/// Un chemin d'attribut résolu côté source.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePath {
    pub join: JoinRef,
    /// Attributs suivis depuis le JOIN (vide : l'entité jointe elle-même)
    pub attributes: Vec<String>,
    /// Type déclaré de l'attribut terminal
    pub value_type: FieldType,
}

impl AttributePath {
    pub fn root(type_name: &str) -> Self {
        AttributePath {
            join: JoinRef::Root,
            attributes: Vec::new(),
            value_type: FieldType::object(type_name),
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.join)?;
        for attr in &self.attributes {
            write!(f, ".{}", attr)?;
        }
        Ok(())
    }
}

/// Opérateur de comparaison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,      // =
    Neq,     // !=
    Lt,      // <
    Gt,      // >
    Lte,     // <=
    Gte,     // >=
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompOp::Eq => write!(f, "="),
            CompOp::Neq => write!(f, "!="),
            CompOp::Lt => write!(f, "<"),
            CompOp::Gt => write!(f, ">"),
            CompOp::Lte => write!(f, "<="),
            CompOp::Gte => write!(f, ">="),
        }
    }
}

/// L'arbre de prédicats.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Conjonction vide : toujours vrai
    True,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare {
        path: AttributePath,
        op: CompOp,
        value: Value,
    },
    In {
        path: AttributePath,
        values: Vec<Value>,
    },
    IsNull(AttributePath),
    Like {
        path: AttributePath,
        pattern: String,
        case_sensitive: bool,
    },
}

impl Predicate {
    pub fn compare(path: AttributePath, op: CompOp, value: impl Into<Value>) -> Self {
        Predicate::Compare { path, op, value: value.into() }
    }

    pub fn eq(path: AttributePath, value: impl Into<Value>) -> Self {
        Self::compare(path, CompOp::Eq, value)
    }

    /// Conjonction aplatie ; les `True` disparaissent.
    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut parts = Vec::new();
        for p in predicates {
            match p {
                Predicate::True => {}
                Predicate::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Predicate::True,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(predicates.into_iter().collect())
    }

    pub fn negate(self) -> Self {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Predicate::True)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "TRUE"),
            Predicate::And(parts) | Predicate::Or(parts) => {
                let sep = if matches!(self, Predicate::And(_)) { " AND " } else { " OR " };
                let rendered: Vec<String> = parts.iter().map(|p| format!("({})", p)).collect();
                write!(f, "{}", rendered.join(sep))
            }
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
            Predicate::Compare { path, op, value } => write!(f, "{} {} {}", path, op, value),
            Predicate::In { path, values } => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} IN ({})", path, rendered.join(", "))
            }
            Predicate::IsNull(path) => write!(f, "{} IS NULL", path),
            Predicate::Like { path, pattern, case_sensitive } => {
                let op = if *case_sensitive { "LIKE" } else { "ILIKE" };
                write!(f, "{} {} \"{}\"", path, op, pattern)
            }
        }
    }
}

// ─── Contexte de requête ──────────────────────────────────────────

/// La racine d'une requête et les JOINs ouverts pendant la compilation.
pub struct QueryContext<'a> {
    processor: &'a Processor,
    root_type: String,
    joins: Vec<Join>,
}

impl<'a> QueryContext<'a> {
    pub fn new(processor: &'a Processor, root_type: &str) -> Self {
        QueryContext {
            processor,
            root_type: root_type.to_string(),
            joins: Vec::new(),
        }
    }

    pub fn processor(&self) -> &'a Processor {
        self.processor
    }

    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn into_joins(self) -> Vec<Join> {
        self.joins
    }

    /// Type atteint par un point de départ.
    pub fn type_of(&self, from: JoinRef) -> &str {
        match from {
            JoinRef::Root => &self.root_type,
            JoinRef::Join(id) => self
                .joins
                .iter()
                .find(|j| j.id == id)
                .map(|j| j.target_type.as_str())
                .unwrap_or(&self.root_type),
        }
    }

    /// Ouvre un JOIN, ou réutilise un JOIN LEFT existant sur le même
    /// attribut du même parent.
    pub fn join(
        &mut self,
        parent: JoinRef,
        attribute: Vec<String>,
        kind: JoinKind,
        target_type: &str,
        plural: bool,
        mapped_by: Option<String>,
    ) -> JoinRef {
        if kind == JoinKind::Left && self.processor.config().reuse_left_joins {
            if let Some(existing) = self
                .joins
                .iter()
                .find(|j| j.kind == JoinKind::Left && j.parent == parent && j.attribute == attribute)
            {
                return existing.alias();
            }
        }
        let id = self.joins.len() + 1;
        trace!(alias = id, attribute = %attribute.join("."), target_type, ?kind, "JOIN ouvert");
        self.joins.push(Join {
            id,
            parent,
            attribute,
            kind,
            target_type: target_type.to_string(),
            plural,
            mapped_by,
        });
        JoinRef::Join(id)
    }

    /// Chemin d'attribut depuis la racine, pour une référence pointillée
    /// sur le type SOURCE.
    pub fn source_path(&mut self, reference: &str) -> LinkResult<AttributePath> {
        let root = AttributePath::root(&self.root_type);
        path::walk_source_path(self, &root, reference, false)
    }

    /// Chemin d'attribut depuis un point d'ancrage quelconque.
    pub fn source_path_from(&mut self, anchor: &AttributePath, reference: &str) -> LinkResult<AttributePath> {
        path::walk_source_path(self, anchor, reference, false)
    }

    /// Comme `source_path_from`, mais la relation terminale est elle aussi
    /// jointe : le résultat sert d'ancrage à des prédicats imbriqués.
    pub fn anchor_path(&mut self, anchor: &AttributePath, reference: &str) -> LinkResult<AttributePath> {
        path::walk_source_path(self, anchor, reference, true)
    }
}

// ─── Specs ────────────────────────────────────────────────────────

type SpecsFn = dyn Fn(&mut QueryContext<'_>) -> LinkResult<Predicate> + Send + Sync;

/// Un prédicat différé : construit contre un contexte de requête.
#[derive(Clone)]
pub struct Specs(Arc<SpecsFn>);

impl fmt::Debug for Specs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Specs(..)")
    }
}

impl Specs {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&mut QueryContext<'_>) -> LinkResult<Predicate> + Send + Sync + 'static,
    {
        Specs(Arc::new(build))
    }

    /// Ne filtre rien.
    pub fn all() -> Self {
        Specs::new(|_| Ok(Predicate::True))
    }

    pub fn build(&self, ctx: &mut QueryContext<'_>) -> LinkResult<Predicate> {
        (self.0)(ctx)
    }

    pub fn and(self, other: Specs) -> Specs {
        Specs::new(move |ctx| {
            let left = self.build(ctx)?;
            let right = other.build(ctx)?;
            Ok(Predicate::and([left, right]))
        })
    }

    pub fn not(self) -> Specs {
        Specs::new(move |ctx| Ok(self.build(ctx)?.negate()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TypeCache;

    fn path(attr: &str) -> AttributePath {
        AttributePath {
            join: JoinRef::Root,
            attributes: vec![attr.to_string()],
            value_type: FieldType::String,
        }
    }

    #[test]
    fn test_and_flattens_and_drops_true() {
        let p = Predicate::and([
            Predicate::True,
            Predicate::and([Predicate::eq(path("a"), 1i64), Predicate::eq(path("b"), 2i64)]),
            Predicate::IsNull(path("c")),
        ]);
        match p {
            Predicate::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("attendu And, obtenu {}", other),
        }
        assert!(Predicate::and(Vec::new()).is_true());
    }

    #[test]
    fn test_double_negation_cancels() {
        let p = Predicate::IsNull(path("a"));
        assert_eq!(p.clone().negate().negate(), p);
    }

    #[test]
    fn test_left_join_reuse() {
        let processor = Processor::new(Arc::new(TypeCache::new()));
        let mut ctx = QueryContext::new(&processor, "Client");
        let attr = vec!["selectedAccount".to_string()];
        let a = ctx.join(JoinRef::Root, attr.clone(), JoinKind::Left, "Account", false, None);
        let b = ctx.join(JoinRef::Root, attr.clone(), JoinKind::Left, "Account", false, None);
        let c = ctx.join(JoinRef::Root, attr, JoinKind::Inner, "Account", false, None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(ctx.joins().len(), 2);
        assert_eq!(ctx.type_of(a), "Account");
    }

    #[test]
    fn test_join_reuse_distinguishes_parents() {
        let processor = Processor::new(Arc::new(TypeCache::new()));
        let mut ctx = QueryContext::new(&processor, "Client");
        let lead = ctx.join(JoinRef::Root, vec!["lead".into()], JoinKind::Left, "Client", false, None);
        let root_account = ctx.join(JoinRef::Root, vec!["selectedAccount".into()], JoinKind::Left, "Account", false, None);
        let lead_account = ctx.join(lead, vec!["selectedAccount".into()], JoinKind::Left, "Account", false, None);
        assert_ne!(root_account, lead_account);
    }

    #[test]
    fn test_specs_and_composes() {
        let processor = Processor::new(Arc::new(TypeCache::new()));
        let mut ctx = QueryContext::new(&processor, "Client");
        let specs = Specs::new(|_| Ok(Predicate::IsNull(path("a"))))
            .and(Specs::all())
            .and(Specs::new(|_| Ok(Predicate::IsNull(path("b")))).not());
        let built = specs.build(&mut ctx).expect("prédicat");
        assert_eq!(
            built,
            Predicate::And(vec![
                Predicate::IsNull(path("a")),
                Predicate::Not(Box::new(Predicate::IsNull(path("b")))),
            ])
        );
    }
}
