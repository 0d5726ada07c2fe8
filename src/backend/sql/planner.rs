// =============================================================================
// SQL PLANNER — Traduction des Query compilées en SQL
// =============================================================================
//
// Le planificateur rend une Query (racine, JOINs, prédicat, tris, page) en
// requête SQL concrète. Les JOINs viennent du QueryContext, qui réutilise
// déjà les JOINs LEFT : un même attribut relationnel ne se joint qu'une fois.
//
// ┌──────────────────────────────────────────────────────────────────┐
// │ Filtres (ClientDto) :                                            │
// │   selectedAccount.amount = 1000                                  │
// │   accounts.currency      = "UAH"                                 │
// │                                                                  │
// │ SQL :                                                            │
// │   SELECT DISTINCT r.*                                            │
// │   FROM "Client" r                                                │
// │   LEFT JOIN "Account" j1 ON r."selectedAccount" = j1."number"    │
// │   LEFT JOIN "Account" j2 ON j2."owner" = r."uid"                 │
// │   WHERE (j1."state_amount" = 1000 AND j2."currencyCode" = 'UAH') │
// │                                                                  │
// │   to-one  : colonne de référence du parent = clé de la cible     │
// │   to-many : colonne mapped_by de la cible = clé du parent        │
// └──────────────────────────────────────────────────────────────────┘
//
// =============================================================================

use tracing::debug;

use crate::backend::sql::{value_to_sql_literal, SqlDialect};
use crate::backend::Query;
use crate::core::cache::TypeCache;
use crate::core::error::{LinkError, LinkResult};
use crate::core::query::{AttributePath, Join, JoinKind, JoinRef, Predicate};

/// Résultat de la planification SQL
#[derive(Debug, Clone)]
pub struct SqlPlan {
    /// La requête SQL générée
    pub sql: String,
    /// Nombre de JOINs dans la requête
    pub join_count: usize,
}

impl std::fmt::Display for SqlPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.sql)?;
        writeln!(f, "-- {} JOINs", self.join_count)
    }
}

/// Planificateur SQL : traduit une Query en SQL.
pub struct SqlPlanner<'a, D: SqlDialect> {
    dialect: &'a D,
    cache: &'a TypeCache,
}

impl<'a, D: SqlDialect> SqlPlanner<'a, D> {
    pub fn new(dialect: &'a D, cache: &'a TypeCache) -> Self {
        SqlPlanner { dialect, cache }
    }

    /// SELECT des racines appariées, triées et paginées.
    pub fn plan_select(&self, query: &Query) -> LinkResult<SqlPlan> {
        let select = if query.joins.is_empty() { "SELECT r.*" } else { "SELECT DISTINCT r.*" };
        let mut sql = format!("{}\n{}", select, self.from_clause(query)?);

        if !query.order.is_empty() {
            let orders: Vec<String> = query
                .order
                .iter()
                .map(|o| format!("{} {}", self.column(query, &o.path), if o.ascending { "ASC" } else { "DESC" }))
                .collect();
            sql.push_str(&format!("\nORDER BY {}", orders.join(", ")));
        }

        let pagination = self.dialect.pagination(query.offset, query.limit);
        if !pagination.is_empty() {
            sql.push('\n');
            sql.push_str(&pagination);
        }
        sql.push(';');

        debug!(dialect = %self.dialect.dialect_name(), source = %query.source_type, joins = query.joins.len(), "SELECT planifié");
        Ok(SqlPlan {
            sql,
            join_count: query.joins.len(),
        })
    }

    /// COUNT des lignes, ou des racines distinctes.
    pub fn plan_count(&self, query: &Query, distinct: bool) -> LinkResult<SqlPlan> {
        let counted = if distinct {
            format!("COUNT(DISTINCT {})", self.primary_key_column(&query.source_type, "r")?)
        } else {
            "COUNT(*)".to_string()
        };
        let sql = format!("SELECT {}\n{};", counted, self.from_clause(query)?);
        debug!(dialect = %self.dialect.dialect_name(), source = %query.source_type, distinct, "COUNT planifié");
        Ok(SqlPlan {
            sql,
            join_count: query.joins.len(),
        })
    }

    fn from_clause(&self, query: &Query) -> LinkResult<String> {
        let mut sql = format!("FROM {} r", self.dialect.table_name(&query.source_type));
        for join in &query.joins {
            sql.push('\n');
            sql.push_str(&self.join_clause(query, join)?);
        }
        if !query.predicate.is_true() {
            sql.push_str(&format!("\nWHERE {}", self.predicate(query, &query.predicate)?));
        }
        Ok(sql)
    }

    fn join_clause(&self, query: &Query, join: &Join) -> LinkResult<String> {
        let keyword = match join.kind {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        let alias = join.alias().to_string();
        let parent_alias = join.parent.to_string();
        let on = if join.plural {
            let mapped_by = join.mapped_by.as_deref().ok_or_else(|| {
                LinkError::Backend(format!(
                    "relation to-many {} sans attribut mapped_by",
                    join.attribute.join(".")
                ))
            })?;
            let parent_type = parent_type(query, join.parent);
            format!(
                "{}.{} = {}",
                alias,
                self.dialect.quote_identifier(mapped_by),
                self.primary_key_column(parent_type, &parent_alias)?,
            )
        } else {
            format!(
                "{}.{} = {}",
                parent_alias,
                self.dialect.quote_identifier(&join.attribute.join("_")),
                self.primary_key_column(&join.target_type, &alias)?,
            )
        };
        Ok(format!("{} {} {} ON {}", keyword, self.dialect.table_name(&join.target_type), alias, on))
    }

    fn primary_key_column(&self, entity: &str, alias: &str) -> LinkResult<String> {
        let pk = self
            .cache
            .primary_key(entity)
            .ok_or_else(|| LinkError::Backend(format!("{} n'a pas de clé primaire", entity)))?;
        Ok(format!("{}.{}", alias, self.dialect.quote_identifier(&pk.name)))
    }

    /// Colonne d'un chemin ; un chemin vide désigne l'entité jointe (sa clé).
    fn column(&self, query: &Query, path: &AttributePath) -> String {
        if path.attributes.is_empty() {
            let entity = parent_type(query, path.join);
            if let Ok(pk) = self.primary_key_column(entity, &path.join.to_string()) {
                return pk;
            }
        }
        format!("{}.{}", path.join, self.dialect.quote_identifier(&path.attributes.join("_")))
    }

    fn predicate(&self, query: &Query, predicate: &Predicate) -> LinkResult<String> {
        Ok(match predicate {
            Predicate::True => "TRUE".to_string(),
            Predicate::And(parts) | Predicate::Or(parts) => {
                let sep = if matches!(predicate, Predicate::And(_)) { " AND " } else { " OR " };
                let rendered = parts
                    .iter()
                    .map(|p| self.predicate(query, p))
                    .collect::<LinkResult<Vec<_>>>()?;
                format!("({})", rendered.join(sep))
            }
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(query, inner)?),
            Predicate::Compare { path, op, value } => {
                format!("{} {} {}", self.column(query, path), op, value_to_sql_literal(value)?)
            }
            Predicate::In { path, values } => {
                let rendered = values.iter().map(value_to_sql_literal).collect::<LinkResult<Vec<_>>>()?;
                format!("{} IN ({})", self.column(query, path), rendered.join(", "))
            }
            Predicate::IsNull(path) => format!("{} IS NULL", self.column(query, path)),
            Predicate::Like { path, pattern, case_sensitive } => {
                let column = self.column(query, path);
                let pattern = value_to_sql_literal(&pattern.as_str().into())?;
                if *case_sensitive {
                    format!("{} LIKE {}", column, pattern)
                } else {
                    self.dialect.ilike(&column, &pattern)
                }
            }
        })
    }
}

/// Type atteint par un alias de la requête.
fn parent_type(query: &Query, join: JoinRef) -> &str {
    match join {
        JoinRef::Root => &query.source_type,
        JoinRef::Join(id) => query
            .joins
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.target_type.as_str())
            .unwrap_or(&query.source_type),
    }
}
