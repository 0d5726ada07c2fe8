// =============================================================================
// TYPESIDE — Les types déclarés et les valeurs dynamiques
// =============================================================================
//
// Le moteur ne connaît pas les types Rust des objets qu'il manipule : il
// travaille sur des valeurs dynamiques décrites par des métadonnées
// explicites. Le Typeside fixe le vocabulaire commun :
//
//   FieldType → le type DÉCLARÉ d'un champ (String, Enum(Gender), List<Account>...)
//   Value     → une valeur CONCRÈTE (une cellule d'un enregistrement)
//
// ANALOGIE : FieldType est la colonne d'une table, Value le contenu d'une
// cellule. Un Value::Object contient un enregistrement complet (instance.rs).
//
// Les comparaisons suivent la logique SQL : comparer avec NULL ne donne
// ni vrai ni faux (None).
//
// =============================================================================

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use super::instance::{Collection, Record};

/// Sorte de collection, fixée par le type déclaré du champ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Séquence ordonnée, doublons autorisés
    List,
    /// Ensemble ordonné par insertion, sans doublons
    Set,
    /// File FIFO
    Queue,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKind::List => write!(f, "List"),
            CollectionKind::Set => write!(f, "Set"),
            CollectionKind::Queue => write!(f, "Queue"),
        }
    }
}

/// Le type déclaré d'un champ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Integer,
    Float,
    /// Décimal exact (montants)
    Decimal,
    Boolean,
    /// Instant UTC
    DateTime,
    /// Énumération déclarée (nom du descripteur)
    Enum(String),
    /// Objet d'un type déclaré (entité, embarqué, projection...)
    Object(String),
    /// Tableau de taille fixe
    Array(Box<FieldType>),
    /// Collection d'une sorte donnée
    Collection(CollectionKind, Box<FieldType>),
    /// Type non contraint (élément de collection non précisé)
    Any,
}

impl FieldType {
    pub fn object(name: &str) -> Self {
        FieldType::Object(name.to_string())
    }

    pub fn enumeration(name: &str) -> Self {
        FieldType::Enum(name.to_string())
    }

    pub fn list(element: FieldType) -> Self {
        FieldType::Collection(CollectionKind::List, Box::new(element))
    }

    pub fn set(element: FieldType) -> Self {
        FieldType::Collection(CollectionKind::Set, Box::new(element))
    }

    pub fn queue(element: FieldType) -> Self {
        FieldType::Collection(CollectionKind::Queue, Box::new(element))
    }

    pub fn array(element: FieldType) -> Self {
        FieldType::Array(Box::new(element))
    }

    /// Type d'élément d'un tableau ou d'une collection.
    pub fn element_type(&self) -> Option<&FieldType> {
        match self {
            FieldType::Array(e) | FieldType::Collection(_, e) => Some(e),
            _ => None,
        }
    }

    pub fn object_name(&self) -> Option<&str> {
        match self {
            FieldType::Object(name) => Some(name),
            _ => None,
        }
    }

    pub fn enum_name(&self) -> Option<&str> {
        match self {
            FieldType::Enum(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, FieldType::Enum(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Decimal)
    }

    pub fn is_plural(&self) -> bool {
        matches!(self, FieldType::Array(_) | FieldType::Collection(..))
    }

    /// Type porté par une valeur concrète (utile quand aucun champ n'est déclaré).
    pub fn of(value: &Value) -> FieldType {
        match value {
            Value::Null => FieldType::Any,
            Value::String(_) => FieldType::String,
            Value::Integer(_) => FieldType::Integer,
            Value::Float(_) => FieldType::Float,
            Value::Decimal(_) => FieldType::Decimal,
            Value::Boolean(_) => FieldType::Boolean,
            Value::DateTime(_) => FieldType::DateTime,
            Value::Enum(e) => FieldType::Enum(e.enum_type.clone()),
            Value::Object(r) => FieldType::Object(r.type_name().to_string()),
            Value::Array(_) => FieldType::array(FieldType::Any),
            Value::Collection(c) => FieldType::Collection(c.kind(), Box::new(FieldType::Any)),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Integer => write!(f, "Integer"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Decimal => write!(f, "Decimal"),
            FieldType::Boolean => write!(f, "Boolean"),
            FieldType::DateTime => write!(f, "DateTime"),
            FieldType::Enum(name) | FieldType::Object(name) => write!(f, "{}", name),
            FieldType::Array(e) => write!(f, "[{}]", e),
            FieldType::Collection(kind, e) => write!(f, "{}<{}>", kind, e),
            FieldType::Any => write!(f, "Any"),
        }
    }
}

/// Une constante d'énumération : type, nom, position de déclaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub enum_type: String,
    pub name: String,
    pub ordinal: usize,
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.enum_type, self.name)
    }
}

/// Une valeur concrète.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Enum(EnumValue),
    Object(Record),
    Array(Vec<Value>),
    Collection(Collection),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Enum(e) => write!(f, "{}", e),
            Value::Object(r) => write!(f, "{}", r),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Collection(c) => {
                let parts: Vec<String> = c.iter().map(|v| v.to_string()).collect();
                write!(f, "{}[{}]", c.kind(), parts.join(", "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Value::Enum(e)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Object(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Retourne le FieldType correspondant à cette valeur
    pub fn get_type(&self) -> FieldType {
        FieldType::of(self)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Object(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Object(r) => Some(r),
            _ => None,
        }
    }

    /// Éléments d'un tableau ou d'une collection.
    pub fn items(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            Value::Collection(c) => Some(c.as_slice()),
            _ => None,
        }
    }

    pub fn is_plural(&self) -> bool {
        self.items().is_some()
    }

    /// Vue décimale d'une valeur numérique.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Float(f) => Decimal::from_f64(*f),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Comparaison d'ordre. None si l'un des deux est NULL ou si les
    /// types ne sont pas comparables.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Enum(a), Value::Enum(b)) if a.enum_type == b.enum_type => {
                Some(a.ordinal.cmp(&b.ordinal))
            }
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            _ => Some(self.as_decimal()?.cmp(&other.as_decimal()?)),
        }
    }

    /// Égalité à trois valeurs : None dès qu'un côté est NULL.
    pub fn sql_eq(&self, other: &Value) -> Option<bool> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match self.compare(other) {
            Some(ord) => Some(ord == Ordering::Equal),
            None => Some(self == other),
        }
    }

    /// Valeur dynamique depuis du JSON non typé.
    /// Les nombres entiers deviennent Integer, les autres Float ;
    /// la coercition vers le type déclaré est l'affaire du convertisseur.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut record = Record::anonymous();
                for (k, v) in map {
                    record.set(k, Value::from_json(v));
                }
                Value::Object(record)
            }
        }
    }

    /// Représentation JSON (décimaux et instants en chaînes).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Decimal(d) => serde_json::Value::String(d.to_string()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::Enum(e) => serde_json::Value::String(e.name.clone()),
            Value::Object(r) => {
                let map = r
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(map)
            }
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Collection(c) => serde_json::Value::Array(c.iter().map(Value::to_json).collect()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
