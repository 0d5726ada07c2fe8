// =============================================================================
// INSTANCE — Les enregistrements concrets (sources et projections)
// =============================================================================
//
// Un Record est une instance d'un type déclaré : un nom de type et une table
// champ → valeur. Les entités persistantes comme les projections de
// transport sont des Records ; seul leur descripteur (schema.rs) les
// distingue.
//
// Un champ absent vaut NULL : `get` ne panique jamais, ce qui permet aux
// chaînes de lecture de court-circuiter sur l'absence au lieu d'échouer.
//
// Les collections portent leur sorte (List / Set / Queue). Un Set
// déduplique à l'insertion en conservant l'ordre d'arrivée.
//
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;

use super::typeside::{CollectionKind, Value};

static NULL: Value = Value::Null;

/// Une instance d'un type déclaré.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(type_name: &str) -> Self {
        Record {
            type_name: type_name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Enregistrement sans type (objets JSON décodés).
    pub fn anonymous() -> Self {
        Record::default()
    }

    /// Construction chaînée : `Record::new("Client").with("name", "John")`.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Valeur d'un champ, NULL si absent.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    /// Emplacement d'un champ, créé à NULL s'il n'existe pas encore.
    pub fn slot(&mut self, field: &str) -> &mut Value {
        self.fields.entry(field.to_string()).or_default()
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        write!(f, "{} {{ {} }}", self.type_name, parts.join(", "))
    }
}

/// Une collection typée par sa sorte.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    kind: CollectionKind,
    items: Vec<Value>,
}

impl Collection {
    pub fn new(kind: CollectionKind) -> Self {
        Collection { kind, items: Vec::new() }
    }

    pub fn from_items(kind: CollectionKind, items: impl IntoIterator<Item = Value>) -> Self {
        let mut collection = Collection::new(kind);
        for item in items {
            collection.push(item);
        }
        collection
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Ajoute en fin ; un Set ignore les doublons.
    pub fn push(&mut self, item: Value) {
        if self.kind == CollectionKind::Set && self.items.contains(&item) {
            return;
        }
        self.items.push(item);
    }

    /// Retire la tête d'une file (ordre FIFO).
    pub fn pop_front(&mut self) -> Option<Value> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Collection> for Value {
    fn from(c: Collection) -> Self {
        Value::Collection(c)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_null() {
        let client = Record::new("Client").with("uid", 1i64);
        assert!(client.get("personalData").is_null());
        assert_eq!(client.get("uid"), &Value::Integer(1));
    }

    #[test]
    fn test_slot_creates_null() {
        let mut client = Record::new("Client");
        assert!(client.slot("lead").is_null());
        assert!(client.contains("lead"));
    }

    #[test]
    fn test_set_deduplicates_in_insertion_order() {
        let set = Collection::from_items(
            CollectionKind::Set,
            vec![Value::from("b"), Value::from("a"), Value::from("b")],
        );
        assert_eq!(set.as_slice(), &[Value::from("b"), Value::from("a")]);

        let list = Collection::from_items(CollectionKind::List, vec![Value::from("b"), Value::from("b")]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = Collection::from_items(CollectionKind::Queue, vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(queue.pop_front(), Some(Value::Integer(1)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_display_skips_nulls() {
        let r = Record::new("Account").with("number", "1").with("currency", Value::Null);
        assert_eq!(r.to_string(), "Account { number: \"1\" }");
    }
}
