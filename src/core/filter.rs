// =============================================================================
// FILTER — Les critères de filtrage et leur traduction en prédicats
// =============================================================================
//
// Un Filter est un critère sur UN attribut : égalité, appartenance,
// intervalle, motif, nullité. Il porte un drapeau de négation et se traduit
// en feuille de l'arbre de prédicats (query.rs), après conversion de ses
// opérandes vers le type déclaré de l'attribut (convert.rs).
//
//   Equals(v)             → attr = v
//   In([a, b])            → attr IN (a, b)      ; In([]) → TRUE
//   Range(from.., ..to)   → attr >= from AND attr <= to (bornes absentes ignorées)
//   Like("abc")           → attr ILIKE '%abc%'  (insensible à la casse par défaut)
//   Null / NotNull        → attr IS NULL / NOT (attr IS NULL)
//
// Les bornes d'un intervalle sont exclusives deux à deux : `from` et
// `from_exclusive` ne peuvent pas coexister, idem pour `to`. La violation
// est rejetée à la construction, pas à la compilation.
//
// En JSON, le discriminant `$type` choisit le filtre (défaut : equals) :
//   {"$type": "range", "from": "1992-01-01", "negated": true}
//
// =============================================================================

use std::collections::BTreeMap;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::json;

use super::convert::Converter;
use super::error::{FilterError, LinkResult};
use super::query::{AttributePath, CompOp, Predicate};
use super::typeside::{FieldType, Value};

/// Filtres nommés par référence de projection.
pub type FilterMap = BTreeMap<String, Filter>;

/// Intervalle ; chaque côté admet une borne inclusive OU exclusive.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Range {
    from: Option<Value>,
    from_exclusive: Option<Value>,
    to: Option<Value>,
    to_exclusive: Option<Value>,
}

fn present(v: &Option<Value>) -> bool {
    v.as_ref().is_some_and(|v| !v.is_null())
}

impl Range {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, value: impl Into<Value>) -> Result<Self, FilterError> {
        self.from = Some(value.into());
        self.check_from()?;
        Ok(self)
    }

    pub fn from_exclusive(mut self, value: impl Into<Value>) -> Result<Self, FilterError> {
        self.from_exclusive = Some(value.into());
        self.check_from()?;
        Ok(self)
    }

    pub fn to(mut self, value: impl Into<Value>) -> Result<Self, FilterError> {
        self.to = Some(value.into());
        self.check_to()?;
        Ok(self)
    }

    pub fn to_exclusive(mut self, value: impl Into<Value>) -> Result<Self, FilterError> {
        self.to_exclusive = Some(value.into());
        self.check_to()?;
        Ok(self)
    }

    fn check_from(&self) -> Result<(), FilterError> {
        if present(&self.from) && present(&self.from_exclusive) {
            return Err(FilterError::MutuallyExclusive { first: "from", second: "fromExclusive" });
        }
        Ok(())
    }

    fn check_to(&self) -> Result<(), FilterError> {
        if present(&self.to) && present(&self.to_exclusive) {
            return Err(FilterError::MutuallyExclusive { first: "to", second: "toExclusive" });
        }
        Ok(())
    }

    fn bounds(&self) -> [(CompOp, &Option<Value>); 4] {
        [
            (CompOp::Gte, &self.from),
            (CompOp::Lte, &self.to),
            (CompOp::Gt, &self.from_exclusive),
            (CompOp::Lt, &self.to_exclusive),
        ]
    }
}

/// La nature d'un filtre.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    Equals(Value),
    In(Vec<Value>),
    Range(Range),
    Like { value: String, case_sensitive: bool },
    /// IS NULL (la négation donne IS NOT NULL)
    Null,
}

/// Un critère sur un attribut, éventuellement nié.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    kind: FilterKind,
    negated: bool,
}

impl Filter {
    fn of(kind: FilterKind) -> Self {
        Filter { kind, negated: false }
    }

    pub fn equals(value: impl Into<Value>) -> Self {
        Self::of(FilterKind::Equals(value.into()))
    }

    pub fn is_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::of(FilterKind::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn range(range: Range) -> Self {
        Self::of(FilterKind::Range(range))
    }

    /// Motif « contient », insensible à la casse.
    pub fn like(value: &str) -> Self {
        Self::like_with_case(value, false)
    }

    pub fn like_with_case(value: &str, case_sensitive: bool) -> Self {
        Self::of(FilterKind::Like {
            value: value.to_string(),
            case_sensitive,
        })
    }

    /// Test de nullité : `true` → IS NULL, `false` → IS NOT NULL.
    pub fn null(is_null: bool) -> Self {
        Filter {
            kind: FilterKind::Null,
            negated: !is_null,
        }
    }

    pub fn not_null() -> Self {
        Self::null(false)
    }

    /// Inverse le filtre (NOT).
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    /// Feuille de prédicat pour l'attribut `path`.
    pub fn to_predicate(&self, path: AttributePath, converter: &Converter<'_>) -> LinkResult<Predicate> {
        let target = scalar_type(&path.value_type);
        let predicate = match &self.kind {
            FilterKind::Equals(value) => {
                // une liste se compare à la collection entière
                let value = if value.is_plural() {
                    converter.convert(value, &path.value_type)?
                } else {
                    converter.convert(value, &target)?
                };
                Predicate::compare(path, CompOp::Eq, value)
            }
            FilterKind::In(values) => {
                if values.is_empty() {
                    Predicate::True
                } else {
                    let values = values
                        .iter()
                        .map(|v| converter.convert(v, &target))
                        .collect::<LinkResult<Vec<_>>>()?;
                    Predicate::In { path, values }
                }
            }
            FilterKind::Range(range) => {
                let mut parts = Vec::new();
                for (op, bound) in range.bounds() {
                    if let Some(value) = bound.as_ref().filter(|v| !v.is_null()) {
                        let value = converter.convert(value, &target)?;
                        parts.push(Predicate::compare(path.clone(), op, value));
                    }
                }
                Predicate::and(parts)
            }
            FilterKind::Like { value, case_sensitive } => {
                let pattern = if *case_sensitive {
                    format!("%{}%", value)
                } else {
                    format!("%{}%", value.to_lowercase())
                };
                Predicate::Like {
                    path,
                    pattern,
                    case_sensitive: *case_sensitive,
                }
            }
            FilterKind::Null => Predicate::IsNull(path),
        };
        Ok(if self.negated { predicate.negate() } else { predicate })
    }

    // ─── JSON ─────────────────────────────────────────────────────

    /// Décode un filtre depuis un objet JSON à discriminant `$type`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, FilterError> {
        let object = json
            .as_object()
            .ok_or_else(|| FilterError::InvalidJson("un objet est attendu".into()))?;
        let field = |name: &str| object.get(name).map(Value::from_json).unwrap_or(Value::Null);
        let kind = match object.get("$type") {
            None => "equals".to_string(),
            Some(serde_json::Value::String(t)) => t.to_lowercase(),
            Some(other) => return Err(FilterError::InvalidJson(format!("$type invalide : {}", other))),
        };

        let mut filter = match kind.as_str() {
            "equals" => Filter::equals(field("value")),
            "in" => match field("values") {
                Value::Array(values) => Filter::is_in(values),
                Value::Null => Filter::is_in(Vec::<Value>::new()),
                other => return Err(FilterError::InvalidJson(format!("'values' doit être une liste : {}", other))),
            },
            "range" => {
                let mut range = Range::new();
                for (name, slot) in [
                    ("from", &mut range.from),
                    ("fromExclusive", &mut range.from_exclusive),
                    ("to", &mut range.to),
                    ("toExclusive", &mut range.to_exclusive),
                ] {
                    let value = field(name);
                    if !value.is_null() {
                        *slot = Some(value);
                    }
                }
                range.check_from()?;
                range.check_to()?;
                Filter::range(range)
            }
            "like" => {
                let value = match field("value") {
                    Value::String(s) => s,
                    other => return Err(FilterError::InvalidJson(format!("'value' doit être une chaîne : {}", other))),
                };
                let case_sensitive = field("caseSensitive").as_bool().unwrap_or(false);
                Filter::like_with_case(&value, case_sensitive)
            }
            "null" => Filter::null(field("isNull").as_bool().unwrap_or(true)),
            other => return Err(FilterError::InvalidJson(format!("type de filtre inconnu : {}", other))),
        };
        if field("negated").as_bool().unwrap_or(false) {
            filter = filter.negate();
        }
        Ok(filter)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut json = match &self.kind {
            FilterKind::Equals(value) => json!({"$type": "equals", "value": value.to_json()}),
            FilterKind::In(values) => {
                let values: Vec<_> = values.iter().map(Value::to_json).collect();
                json!({"$type": "in", "values": values})
            }
            FilterKind::Range(range) => {
                let mut json = json!({"$type": "range"});
                for (name, bound) in [
                    ("from", &range.from),
                    ("fromExclusive", &range.from_exclusive),
                    ("to", &range.to),
                    ("toExclusive", &range.to_exclusive),
                ] {
                    if let Some(value) = bound {
                        json[name] = value.to_json();
                    }
                }
                json
            }
            FilterKind::Like { value, case_sensitive } => {
                json!({"$type": "like", "value": value, "caseSensitive": case_sensitive})
            }
            FilterKind::Null => json!({"$type": "null"}),
        };
        json["negated"] = serde_json::Value::Bool(self.negated);
        json
    }
}

/// Type scalaire visé par un filtre : l'élément pour un attribut pluriel.
fn scalar_type(field_type: &FieldType) -> FieldType {
    match field_type.element_type() {
        Some(element) => element.clone(),
        None => field_type.clone(),
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Filter::from_json(&json).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TypeCache;
    use crate::core::error::LinkError;
    use crate::core::query::JoinRef;
    use crate::core::schema::EnumDescriptor;
    use pretty_assertions::assert_eq;

    fn attr(name: &str, value_type: FieldType) -> AttributePath {
        AttributePath {
            join: JoinRef::Root,
            attributes: vec![name.to_string()],
            value_type,
        }
    }

    fn cache() -> TypeCache {
        let cache = TypeCache::new();
        cache.declare_enum(EnumDescriptor::new("Gender", ["M", "F"]));
        cache
    }

    #[test]
    fn test_range_rejects_both_from_bounds() {
        let err = Range::new().from(1i64).and_then(|r| r.from_exclusive(2i64));
        assert_eq!(err, Err(FilterError::MutuallyExclusive { first: "from", second: "fromExclusive" }));
        let err = Range::new().to_exclusive(1i64).and_then(|r| r.to(2i64));
        assert_eq!(err, Err(FilterError::MutuallyExclusive { first: "to", second: "toExclusive" }));
    }

    #[test]
    fn test_range_allows_from_and_to() {
        let range = Range::new().from(1i64).and_then(|r| r.to(5i64)).expect("intervalle");
        let cache = cache();
        let p = Filter::range(range)
            .to_predicate(attr("age", FieldType::Integer), &Converter::new(&cache))
            .expect("prédicat");
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::compare(attr("age", FieldType::Integer), CompOp::Gte, 1i64),
                Predicate::compare(attr("age", FieldType::Integer), CompOp::Lte, 5i64),
            ])
        );
    }

    #[test]
    fn test_empty_in_is_unconditional() {
        let cache = cache();
        let p = Filter::is_in(Vec::<Value>::new())
            .to_predicate(attr("name", FieldType::String), &Converter::new(&cache))
            .expect("prédicat");
        assert_eq!(p, Predicate::True);
    }

    #[test]
    fn test_like_lowercases_and_wraps() {
        let cache = cache();
        let p = Filter::like("Abc")
            .to_predicate(attr("name", FieldType::String), &Converter::new(&cache))
            .expect("prédicat");
        assert_eq!(
            p,
            Predicate::Like { path: attr("name", FieldType::String), pattern: "%abc%".into(), case_sensitive: false }
        );
    }

    #[test]
    fn test_null_and_negation() {
        let cache = cache();
        let conv = Converter::new(&cache);
        let is_null = Filter::null(true).to_predicate(attr("x", FieldType::String), &conv).expect("prédicat");
        assert_eq!(is_null, Predicate::IsNull(attr("x", FieldType::String)));
        let not_null = Filter::null(false).to_predicate(attr("x", FieldType::String), &conv).expect("prédicat");
        assert_eq!(not_null, Predicate::IsNull(attr("x", FieldType::String)).negate());
        assert!(!Filter::null(false).negate().is_negated());
    }

    #[test]
    fn test_equals_converts_operand() {
        let cache = cache();
        let p = Filter::equals("F")
            .to_predicate(attr("gender", FieldType::enumeration("Gender")), &Converter::new(&cache))
            .expect("prédicat");
        match p {
            Predicate::Compare { value: Value::Enum(e), .. } => assert_eq!(e.ordinal, 1),
            other => panic!("attendu une comparaison d'énumération, obtenu {}", other),
        }
    }

    #[test]
    fn test_conversion_failure_yields_no_predicate() {
        let cache = cache();
        let result = Filter::is_in(vec![Value::from("M"), Value::Boolean(true)])
            .to_predicate(attr("gender", FieldType::enumeration("Gender")), &Converter::new(&cache));
        assert!(matches!(result, Err(LinkError::Conversion(_))));
    }

    #[test]
    fn test_json_defaults_to_equals() {
        let filter: Filter = serde_json::from_str(r#"{"value": "Yurii"}"#).expect("json");
        assert_eq!(filter, Filter::equals("Yurii"));
    }

    #[test]
    fn test_json_type_is_case_insensitive() {
        let filter: Filter = serde_json::from_str(r#"{"$type": "Like", "value": "abc", "negated": true}"#).expect("json");
        assert_eq!(filter, Filter::like("abc").negate());
        let filter: Filter = serde_json::from_str(r#"{"$type": "IN", "values": ["a", "b"]}"#).expect("json");
        assert_eq!(filter, Filter::is_in(["a", "b"]));
    }

    #[test]
    fn test_json_range_exclusivity_is_enforced() {
        let result: Result<Filter, _> = serde_json::from_str(r#"{"$type": "range", "from": 1, "fromExclusive": 2}"#);
        assert!(result.is_err());
        let unknown: Result<Filter, _> = serde_json::from_str(r#"{"$type": "between"}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_json_serialization_reads_back() {
        let range = Range::new().from_exclusive(3i64).expect("intervalle");
        let filter = Filter::range(range).negate();
        let text = serde_json::to_string(&filter).expect("sérialisation");
        let back: Filter = serde_json::from_str(&text).expect("json");
        assert_eq!(back, filter);
    }
}
