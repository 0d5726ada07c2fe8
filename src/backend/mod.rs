// =============================================================================
// BACKEND — Exécution des requêtes compilées
// =============================================================================
//
// Le cœur produit une Query indépendante de tout stockage :
//   - le type source (la racine)
//   - les JOINs ouverts par le compilateur de filtres
//   - l'arbre de prédicats
//   - les tris, l'offset et la limite
//
// Chaque backend implémente QueryBackend pour l'exécuter :
//   - memory → évaluation en mémoire (tests, prototypage)
//   - sql    → rendu en texte SQL (PostgreSQL, Snowflake, Trino)
//
// Le cœur ne connaît JAMAIS les backends ; le dépôt (repository) fait le
// lien entre les deux.
//
// =============================================================================

pub mod memory;
pub mod sql;

use crate::core::error::LinkResult;
use crate::core::instance::Record;
use crate::core::query::{AttributePath, Join, Predicate, QueryContext};

/// Un critère de tri résolu.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub path: AttributePath,
    pub ascending: bool,
}

/// Une requête prête à exécuter.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub source_type: String,
    pub joins: Vec<Join>,
    pub predicate: Predicate,
    pub order: Vec<Order>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Query {
    /// Sans filtre : toutes les racines du type.
    pub fn all(source_type: &str) -> Self {
        Query {
            source_type: source_type.to_string(),
            joins: Vec::new(),
            predicate: Predicate::True,
            order: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    /// Fige le contexte de requête (racine + JOINs) avec son prédicat.
    pub fn from_context(ctx: QueryContext<'_>, predicate: Predicate) -> Self {
        let source_type = ctx.root_type().to_string();
        Query {
            joins: ctx.into_joins(),
            predicate,
            ..Query::all(&source_type)
        }
    }

    pub fn with_order(mut self, order: Vec<Order>) -> Self {
        self.order = order;
        self
    }

    pub fn with_page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// Trait abstrait pour tout stockage interrogeable.
///
/// `fetch` rend des racines distinctes (une racine appariée via plusieurs
/// lignes de JOIN n'apparaît qu'une fois), triées puis découpées selon
/// l'offset et la limite.
pub trait QueryBackend: Send + Sync {
    fn fetch(&self, query: &Query) -> LinkResult<Vec<Record>>;

    /// Compte les lignes appariées ; `distinct` compte les racines.
    /// L'offset et la limite sont ignorés.
    fn count(&self, query: &Query, distinct: bool) -> LinkResult<usize>;

    /// Nom du backend
    fn name(&self) -> &str;
}
