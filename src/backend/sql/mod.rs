// =============================================================================
// BACKEND SQL — Rendu des requêtes compilées en SQL
// =============================================================================
//
// Ce module traduit une Query en texte SQL :
//   racine      → FROM "Client" r
//   JOINs       → LEFT JOIN "Account" j1 ON ...
//   prédicat    → WHERE ...
//   tris / page → ORDER BY ... LIMIT ... OFFSET ...
//
// Les attributs embarqués sont aplatis en colonnes de la table de leur
// entité : `personalData.name` devient la colonne "personalData_name".
//
// Le trait SqlDialect permet de supporter les différences entre
// PostgreSQL, Snowflake, Trino, etc.
//
// =============================================================================

pub mod planner;

use crate::core::error::{LinkError, LinkResult};
use crate::core::typeside::Value;

/// Dialecte SQL : les différences entre moteurs.
pub trait SqlDialect {
    /// Nom du dialecte
    fn dialect_name(&self) -> String;

    /// Quote un identifiant (table, colonne)
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name)
    }

    /// Nom complet de la table d'une entité
    fn table_name(&self, entity: &str) -> String {
        self.quote_identifier(entity)
    }

    /// LIKE insensible à la casse
    fn ilike(&self, column: &str, pattern: &str) -> String {
        format!("{} ILIKE {}", column, pattern)
    }

    /// Clause de pagination (vide si ni offset ni limite)
    fn pagination(&self, offset: usize, limit: Option<usize>) -> String {
        match (offset, limit) {
            (0, None) => String::new(),
            (0, Some(limit)) => format!("LIMIT {}", limit),
            (offset, None) => format!("OFFSET {}", offset),
            (offset, Some(limit)) => format!("LIMIT {} OFFSET {}", limit, offset),
        }
    }
}

// ─── PostgreSQL ──────────────────────────────────────────────────────────────

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn dialect_name(&self) -> String {
        "PostgreSQL".to_string()
    }
}

// ─── Snowflake ───────────────────────────────────────────────────────────────

pub struct SnowflakeDialect;

impl SqlDialect for SnowflakeDialect {
    fn dialect_name(&self) -> String {
        "Snowflake".to_string()
    }

    fn pagination(&self, offset: usize, limit: Option<usize>) -> String {
        // Snowflake exige une limite devant OFFSET
        match (offset, limit) {
            (0, None) => String::new(),
            (offset, None) => format!("LIMIT NULL OFFSET {}", offset),
            (0, Some(limit)) => format!("LIMIT {}", limit),
            (offset, Some(limit)) => format!("LIMIT {} OFFSET {}", limit, offset),
        }
    }
}

// ─── Trino (ex-Presto) ──────────────────────────────────────────────────────
//
// Trino est un moteur de requêtes fédérées : il ne stocke pas de données
// lui-même mais requête des catalogues (Hive, Iceberg, PostgreSQL...).
//
// Particularités :
//   - Pas d'ILIKE : on compare en minuscules avec LOWER(...) LIKE
//   - OFFSET se place AVANT LIMIT
//   - Les tables sont qualifiées : catalog.schema."table"
//

pub struct TrinoDialect {
    /// Catalogue Trino (ex: "hive", "iceberg", "postgresql")
    pub catalog: String,
    /// Schéma Trino dans le catalogue (ex: "default", "public")
    pub schema_name: String,
}

impl TrinoDialect {
    pub fn new(catalog: &str, schema_name: &str) -> Self {
        TrinoDialect {
            catalog: catalog.to_string(),
            schema_name: schema_name.to_string(),
        }
    }
}

impl SqlDialect for TrinoDialect {
    fn dialect_name(&self) -> String {
        "Trino".to_string()
    }

    fn table_name(&self, entity: &str) -> String {
        format!("{}.{}.{}", self.catalog, self.schema_name, self.quote_identifier(entity))
    }

    fn ilike(&self, column: &str, pattern: &str) -> String {
        format!("LOWER({}) LIKE {}", column, pattern)
    }

    fn pagination(&self, offset: usize, limit: Option<usize>) -> String {
        match (offset, limit) {
            (0, None) => String::new(),
            (0, Some(limit)) => format!("LIMIT {}", limit),
            (offset, None) => format!("OFFSET {}", offset),
            (offset, Some(limit)) => format!("OFFSET {} LIMIT {}", offset, limit),
        }
    }
}

/// Convertit une Value en littéral SQL
pub fn value_to_sql_literal(value: &Value) -> LinkResult<String> {
    Ok(match value {
        Value::String(s) => quote_literal(s),
        Value::Integer(i) => format!("{}", i),
        Value::Float(f) => format!("{}", f),
        Value::Decimal(d) => format!("{}", d),
        Value::Boolean(b) => if *b { "TRUE".into() } else { "FALSE".into() },
        Value::DateTime(dt) => format!("TIMESTAMP '{}'", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
        // Énumérations stockées par nom
        Value::Enum(e) => quote_literal(&e.name),
        Value::Null => "NULL".into(),
        other => {
            return Err(LinkError::Backend(format!(
                "pas de littéral SQL pour {} ({})",
                other,
                other.get_type()
            )))
        }
    })
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
