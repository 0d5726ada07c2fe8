// =============================================================================
// MEMORY — Backend en mémoire
// =============================================================================
//
// MemoryStore évalue les Query DIRECTEMENT sur des enregistrements en
// mémoire, sans base de données. Parfait pour les tests et le prototypage.
//
// COMMENT ÇA MARCHE :
//
//   Query : Client, JOIN j1 LEFT r.accounts, WHERE j1.currencyCode = 'UAH'
//
//   1. Pour chaque racine, dérouler les JOINs en LIGNES :
//        un JOIN to-many produit une ligne par élément, un JOIN LEFT sans
//        cible produit une ligne où l'alias est NULL
//   2. Évaluer le prédicat sur chaque ligne en logique à TROIS valeurs
//        (NULL = inconnu ; seule une ligne VRAIE est retenue)
//   3. Une racine est retenue si au moins une de ses lignes l'est
//   4. Trier (NULL en dernier en ascendant), puis offset / limite
//
// Le store sert aussi de recherche de relation par clé primaire.
//
// =============================================================================

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::backend::{Order, Query, QueryBackend};
use crate::core::cache::TypeCache;
use crate::core::convert::Converter;
use crate::core::error::{LinkError, LinkResult};
use crate::core::instance::Record;
use crate::core::processor::RelationLookup;
use crate::core::query::{AttributePath, CompOp, Join, JoinKind, JoinRef, Predicate};
use crate::core::typeside::Value;

/// Une ligne : l'enregistrement lié à chaque alias (0 = racine).
type Row<'r> = Vec<Option<&'r Record>>;

static NULL: Value = Value::Null;

/// Stockage en mémoire, par type source.
#[derive(Debug)]
pub struct MemoryStore {
    cache: Arc<TypeCache>,
    records: DashMap<String, Vec<Record>>,
}

impl MemoryStore {
    pub fn new(cache: Arc<TypeCache>) -> Self {
        MemoryStore {
            cache,
            records: DashMap::new(),
        }
    }

    pub fn insert(&self, record: Record) {
        self.records
            .entry(record.type_name().to_string())
            .or_default()
            .push(record);
    }

    pub fn insert_all(&self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.insert(record);
        }
    }

    /// Copie des enregistrements d'un type.
    pub fn records(&self, type_name: &str) -> Vec<Record> {
        self.records
            .get(type_name)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self, type_name: &str) -> usize {
        self.records.get(type_name).map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.records.iter().all(|r| r.is_empty())
    }

    /// Racines retenues avec leur première ligne appariée, et le nombre
    /// total de lignes appariées.
    fn matching<'r>(&self, roots: &'r [Record], query: &Query) -> (Vec<(&'r Record, Row<'r>)>, usize) {
        let mut matched = Vec::new();
        let mut matched_rows = 0;
        for root in roots {
            let mut first = None;
            for row in expand(root, &query.joins) {
                if eval(&query.predicate, &row) == Some(true) {
                    matched_rows += 1;
                    if first.is_none() {
                        first = Some(row);
                    }
                }
            }
            if let Some(row) = first {
                matched.push((root, row));
            }
        }
        (matched, matched_rows)
    }
}

impl QueryBackend for MemoryStore {
    fn fetch(&self, query: &Query) -> LinkResult<Vec<Record>> {
        let roots = self.records(&query.source_type);
        let (mut matched, _) = self.matching(&roots, query);
        if !query.order.is_empty() {
            matched.sort_by(|(_, a), (_, b)| compare_rows(&query.order, a, b));
        }
        let page: Vec<Record> = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(root, _)| root.clone())
            .collect();
        debug!(
            backend = "memory",
            source = %query.source_type,
            joins = query.joins.len(),
            scanned = roots.len(),
            returned = page.len(),
            "requête évaluée"
        );
        Ok(page)
    }

    fn count(&self, query: &Query, distinct: bool) -> LinkResult<usize> {
        let roots = self.records(&query.source_type);
        let (matched, rows) = self.matching(&roots, query);
        let count = if distinct { matched.len() } else { rows };
        debug!(backend = "memory", source = %query.source_type, distinct, count, "comptage évalué");
        Ok(count)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl RelationLookup for MemoryStore {
    fn lookup(&self, entity_type: &str, key: &Value) -> LinkResult<Option<Record>> {
        let pk = self
            .cache
            .primary_key(entity_type)
            .ok_or_else(|| LinkError::Backend(format!("{} n'a pas de clé primaire", entity_type)))?;
        let key = Converter::new(&self.cache).convert(key, &pk.field_type)?;
        Ok(self.records.get(entity_type).and_then(|records| {
            records
                .iter()
                .find(|r| r.get(&pk.name).sql_eq(&key) == Some(true))
                .cloned()
        }))
    }
}

// ─── Lignes ───────────────────────────────────────────────────────

fn expand<'r>(root: &'r Record, joins: &[Join]) -> Vec<Row<'r>> {
    let mut rows: Vec<Row<'r>> = vec![vec![Some(root)]];
    for join in joins {
        let mut next = Vec::with_capacity(rows.len());
        for row in rows {
            let targets: Vec<&'r Record> = match bound(&row, join.parent) {
                Some(parent) => {
                    let value = follow(parent, &join.attribute);
                    match value.items() {
                        Some(items) => items.iter().filter_map(Value::as_record).collect(),
                        None => value.as_record().into_iter().collect(),
                    }
                }
                None => Vec::new(),
            };
            if targets.is_empty() {
                if join.kind == JoinKind::Left {
                    let mut extended = row.clone();
                    extended.push(None);
                    next.push(extended);
                }
            } else {
                for target in targets {
                    let mut extended = row.clone();
                    extended.push(Some(target));
                    next.push(extended);
                }
            }
        }
        rows = next;
    }
    rows
}

fn bound<'r>(row: &Row<'r>, join: JoinRef) -> Option<&'r Record> {
    match join {
        JoinRef::Root => row.first().copied().flatten(),
        JoinRef::Join(id) => row.get(id).copied().flatten(),
    }
}

/// Suit des attributs depuis un enregistrement ; tout intermédiaire non
/// objet donne NULL.
fn follow<'r>(record: &'r Record, attributes: &[String]) -> &'r Value {
    let Some((last, init)) = attributes.split_last() else {
        return &NULL;
    };
    let mut current = record;
    for attr in init {
        match current.get(attr).as_record() {
            Some(next) => current = next,
            None => return &NULL,
        }
    }
    current.get(last)
}

fn resolve<'r>(row: &Row<'r>, path: &AttributePath) -> Cow<'r, Value> {
    match bound(row, path.join) {
        None => Cow::Owned(Value::Null),
        Some(record) if path.attributes.is_empty() => Cow::Owned(Value::Object(record.clone())),
        Some(record) => Cow::Borrowed(follow(record, &path.attributes)),
    }
}

// ─── Évaluation à trois valeurs ───────────────────────────────────

fn eval(predicate: &Predicate, row: &Row<'_>) -> Option<bool> {
    match predicate {
        Predicate::True => Some(true),
        Predicate::And(parts) => {
            let mut unknown = false;
            for part in parts {
                match eval(part, row) {
                    Some(false) => return Some(false),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            if unknown { None } else { Some(true) }
        }
        Predicate::Or(parts) => {
            let mut unknown = false;
            for part in parts {
                match eval(part, row) {
                    Some(true) => return Some(true),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            if unknown { None } else { Some(false) }
        }
        Predicate::Not(inner) => eval(inner, row).map(|b| !b),
        Predicate::Compare { path, op, value } => compare(&resolve(row, path), *op, value),
        Predicate::In { path, values } => {
            let lhs = resolve(row, path);
            let mut unknown = false;
            for candidate in values {
                match lhs.sql_eq(candidate) {
                    Some(true) => return Some(true),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            if unknown { None } else { Some(false) }
        }
        Predicate::IsNull(path) => Some(resolve(row, path).is_null()),
        Predicate::Like { path, pattern, case_sensitive } => {
            let lhs = resolve(row, path);
            let text = match lhs.as_ref() {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some(if *case_sensitive {
                like_match(&text, pattern)
            } else {
                like_match(&text.to_lowercase(), &pattern.to_lowercase())
            })
        }
    }
}

/// Compare deux Values avec un opérateur (NULL → inconnu).
fn compare(lhs: &Value, op: CompOp, rhs: &Value) -> Option<bool> {
    match op {
        CompOp::Eq => lhs.sql_eq(rhs),
        CompOp::Neq => lhs.sql_eq(rhs).map(|b| !b),
        _ => {
            if lhs.is_null() || rhs.is_null() {
                return None;
            }
            // Types incomparables → faux
            let Some(ord) = lhs.compare(rhs) else {
                return Some(false);
            };
            Some(match op {
                CompOp::Lt => ord == Ordering::Less,
                CompOp::Gt => ord == Ordering::Greater,
                CompOp::Lte => ord != Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
    }
}

/// Motif LIKE : `%` = toute suite, `_` = un caractère.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    // reachable[j] : le préfixe text[..i] apparie pattern[..j]
    let mut reachable = vec![false; pattern.len() + 1];
    reachable[0] = true;
    for j in 1..=pattern.len() {
        reachable[j] = reachable[j - 1] && pattern[j - 1] == '%';
    }
    for c in &text {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || reachable[j],
                '_' => reachable[j - 1],
                p => reachable[j - 1] && p == *c,
            };
        }
        reachable = next;
    }
    reachable[pattern.len()]
}

// ─── Tri ──────────────────────────────────────────────────────────

fn compare_rows(order: &[Order], a: &Row<'_>, b: &Row<'_>) -> Ordering {
    for o in order {
        let left = resolve(a, &o.path);
        let right = resolve(b, &o.path);
        // NULL est la plus grande valeur : en dernier en ascendant
        let ord = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => left.compare(&right).unwrap_or(Ordering::Equal),
        };
        let ord = if o.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::Collection;
    use crate::core::schema::TypeDescriptor;
    use crate::core::typeside::{CollectionKind, FieldType};
    use pretty_assertions::assert_eq;

    fn account(number: &str, currency: &str) -> Record {
        Record::new("Account").with("number", number).with("currencyCode", currency)
    }

    fn store() -> MemoryStore {
        let cache = TypeCache::new();
        cache.declare(
            TypeDescriptor::entity("Client")
                .id("uid", FieldType::Integer)
                .field("name", FieldType::String)
                .field("selectedAccount", FieldType::object("Account"))
                .field("accounts", FieldType::list(FieldType::object("Account"))),
        );
        cache.declare(
            TypeDescriptor::entity("Account")
                .id("number", FieldType::String)
                .field("currencyCode", FieldType::String),
        );
        let store = MemoryStore::new(Arc::new(cache));
        let uah = account("UA-1", "UAH");
        let usd = account("US-2", "USD");
        store.insert_all([
            Record::new("Client")
                .with("uid", 1i64)
                .with("name", "Yurii")
                .with("selectedAccount", uah.clone())
                .with(
                    "accounts",
                    Collection::from_items(CollectionKind::List, vec![Value::Object(uah.clone()), Value::Object(usd.clone())]),
                ),
            Record::new("Client").with("uid", 2i64).with("name", "Abc"),
            Record::new("Client").with("uid", 3i64),
        ]);
        store.insert_all([uah, usd]);
        store
    }

    fn attr(join: JoinRef, attrs: &[&str], ty: FieldType) -> AttributePath {
        AttributePath {
            join,
            attributes: attrs.iter().map(|a| a.to_string()).collect(),
            value_type: ty,
        }
    }

    fn accounts_join(kind: JoinKind) -> Join {
        Join {
            id: 1,
            parent: JoinRef::Root,
            attribute: vec!["accounts".into()],
            kind,
            target_type: "Account".into(),
            plural: true,
            mapped_by: None,
        }
    }

    #[test]
    fn test_true_fetches_everything() {
        let store = store();
        assert_eq!(store.fetch(&Query::all("Client")).expect("requête").len(), 3);
        assert_eq!(store.count(&Query::all("Client"), true).expect("comptage"), 3);
    }

    #[test]
    fn test_null_comparisons_are_unknown() {
        let store = store();
        let eq = Query {
            predicate: Predicate::eq(attr(JoinRef::Root, &["name"], FieldType::String), "Yurii").negate(),
            ..Query::all("Client")
        };
        // NOT (NULL = 'Yurii') reste inconnu : le client sans nom est exclu
        assert_eq!(store.count(&eq, true).expect("comptage"), 1);
    }

    #[test]
    fn test_left_join_fan_out() {
        let store = store();
        let query = Query {
            joins: vec![accounts_join(JoinKind::Left)],
            ..Query::all("Client")
        };
        assert_eq!(store.count(&query, false).expect("comptage"), 4);
        assert_eq!(store.count(&query, true).expect("comptage"), 3);

        let inner = Query {
            joins: vec![accounts_join(JoinKind::Inner)],
            ..Query::all("Client")
        };
        assert_eq!(store.count(&inner, true).expect("comptage"), 1);
    }

    #[test]
    fn test_predicate_on_joined_collection() {
        let store = store();
        let query = Query {
            joins: vec![accounts_join(JoinKind::Left)],
            predicate: Predicate::eq(attr(JoinRef::Join(1), &["currencyCode"], FieldType::String), "USD"),
            ..Query::all("Client")
        };
        let found = store.fetch(&query).expect("requête");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("uid"), &Value::Integer(1));
    }

    #[test]
    fn test_is_null_on_relation() {
        let store = store();
        let query = Query {
            predicate: Predicate::IsNull(attr(JoinRef::Root, &["selectedAccount"], FieldType::object("Account"))),
            ..Query::all("Client")
        };
        assert_eq!(store.count(&query, true).expect("comptage"), 2);
    }

    #[test]
    fn test_sort_nulls_last_and_page() {
        let store = store();
        let order = vec![Order {
            path: attr(JoinRef::Root, &["name"], FieldType::String),
            ascending: true,
        }];
        let query = Query::all("Client").with_order(order.clone());
        let names: Vec<Value> = store.fetch(&query).expect("requête").iter().map(|r| r.get("name").clone()).collect();
        assert_eq!(names, vec![Value::from("Abc"), Value::from("Yurii"), Value::Null]);

        let page = Query::all("Client").with_order(order).with_page(1, Some(1));
        let found = store.fetch(&page).expect("requête");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("name"), &Value::from("Yurii"));
    }

    #[test]
    fn test_like_patterns() {
        assert!(like_match("test abc", "%abc%"));
        assert!(like_match("abc", "a_c"));
        assert!(!like_match("abd", "%abc%"));
        assert!(like_match("", "%"));
        assert!(!like_match("", "_"));
    }

    #[test]
    fn test_lookup_by_primary_key() {
        let store = store();
        let found = store.lookup("Account", &Value::from("US-2")).expect("recherche");
        assert_eq!(found.map(|r| r.get("currencyCode").clone()), Some(Value::from("USD")));
        assert_eq!(store.lookup("Account", &Value::from("XX")).expect("recherche"), None);
        assert!(store.lookup("Unknown", &Value::from("XX")).is_err());
    }
}
