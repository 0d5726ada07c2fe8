// =============================================================================
// CONVERT — Coercition des opérandes de filtres vers le type déclaré
// =============================================================================
//
// Un filtre reçu en JSON ne porte que des types JSON (chaînes, nombres,
// booléens). Avant de construire un prédicat, l'opérande est converti vers
// le type déclaré de l'attribut visé :
//
//   Enum     ← constante (identité ou même nom), ordinal entier, nom
//   DateTime ← instant, millisecondes epoch, chaîne ISO-8601
//   Decimal  ← entier, flottant, chaîne
//
// Une combinaison non supportée est une erreur, jamais un passage silencieux.
//
// =============================================================================

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::cache::TypeCache;
use super::error::{ConversionError, LinkResult};
use super::typeside::{FieldType, Value};

/// Convertisseur d'opérandes, adossé au cache pour les énumérations.
#[derive(Debug, Clone, Copy)]
pub struct Converter<'a> {
    cache: &'a TypeCache,
}

impl<'a> Converter<'a> {
    pub fn new(cache: &'a TypeCache) -> Self {
        Converter { cache }
    }

    /// Convertit `value` vers `target`. NULL reste NULL.
    pub fn convert(&self, value: &Value, target: &FieldType) -> LinkResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match target {
            FieldType::Any | FieldType::Object(_) | FieldType::Array(_) | FieldType::Collection(..) => {
                Ok(value.clone())
            }
            FieldType::Enum(enum_type) => self.to_enum(value, enum_type),
            FieldType::DateTime => to_datetime(value),
            FieldType::Decimal => to_decimal(value),
            FieldType::Integer => to_integer(value),
            FieldType::Float => to_float(value),
            FieldType::String => to_string(value),
            FieldType::Boolean => to_boolean(value),
        }
    }

    fn to_enum(&self, value: &Value, enum_type: &str) -> LinkResult<Value> {
        match value {
            Value::Enum(e) if e.enum_type == enum_type => Ok(value.clone()),
            Value::Enum(e) => Ok(Value::Enum(self.cache.enum_value(enum_type, &e.name)?)),
            Value::Integer(ordinal) => Ok(Value::Enum(self.cache.enum_at(enum_type, *ordinal)?)),
            Value::String(name) => Ok(Value::Enum(self.cache.enum_value(enum_type, name)?)),
            other => Err(unsupported(other, &FieldType::Enum(enum_type.to_string()))),
        }
    }
}

fn unsupported(value: &Value, target: &FieldType) -> super::error::LinkError {
    ConversionError::unsupported(value.get_type(), target).into()
}

fn unparsable(value: &str, target: &FieldType) -> super::error::LinkError {
    ConversionError::Unparsable {
        value: value.to_string(),
        to: target.to_string(),
    }
    .into()
}

/// Instant depuis une chaîne ISO-8601 (avec ou sans fuseau, ou date seule).
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::from_str(text) {
        return Some(naive.and_utc());
    }
    NaiveDate::from_str(text)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn to_datetime(value: &Value) -> LinkResult<Value> {
    match value {
        Value::DateTime(_) => Ok(value.clone()),
        Value::Integer(millis) => Utc
            .timestamp_millis_opt(*millis)
            .single()
            .map(Value::DateTime)
            .ok_or_else(|| unparsable(&millis.to_string(), &FieldType::DateTime)),
        Value::String(text) => parse_datetime(text)
            .map(Value::DateTime)
            .ok_or_else(|| unparsable(text, &FieldType::DateTime)),
        other => Err(unsupported(other, &FieldType::DateTime)),
    }
}

fn to_decimal(value: &Value) -> LinkResult<Value> {
    match value {
        Value::String(text) => Decimal::from_str(text)
            .map(Value::Decimal)
            .map_err(|_| unparsable(text, &FieldType::Decimal)),
        other => other
            .as_decimal()
            .map(Value::Decimal)
            .ok_or_else(|| unsupported(other, &FieldType::Decimal)),
    }
}

fn to_integer(value: &Value) -> LinkResult<Value> {
    match value {
        Value::Integer(_) => Ok(value.clone()),
        Value::Decimal(d) if d.fract().is_zero() => d
            .to_i64()
            .map(Value::Integer)
            .ok_or_else(|| unsupported(value, &FieldType::Integer)),
        Value::String(text) => i64::from_str(text)
            .map(Value::Integer)
            .map_err(|_| unparsable(text, &FieldType::Integer)),
        other => Err(unsupported(other, &FieldType::Integer)),
    }
}

fn to_float(value: &Value) -> LinkResult<Value> {
    match value {
        Value::Float(_) => Ok(value.clone()),
        Value::Integer(i) => Ok(Value::Float(*i as f64)),
        Value::Decimal(d) => d
            .to_f64()
            .map(Value::Float)
            .ok_or_else(|| unsupported(value, &FieldType::Float)),
        Value::String(text) => f64::from_str(text)
            .map(Value::Float)
            .map_err(|_| unparsable(text, &FieldType::Float)),
        other => Err(unsupported(other, &FieldType::Float)),
    }
}

fn to_string(value: &Value) -> LinkResult<Value> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Enum(e) => Ok(Value::String(e.name.clone())),
        Value::Integer(i) => Ok(Value::String(i.to_string())),
        Value::Float(f) => Ok(Value::String(f.to_string())),
        Value::Decimal(d) => Ok(Value::String(d.to_string())),
        Value::Boolean(b) => Ok(Value::String(b.to_string())),
        other => Err(unsupported(other, &FieldType::String)),
    }
}

fn to_boolean(value: &Value) -> LinkResult<Value> {
    match value {
        Value::Boolean(_) => Ok(value.clone()),
        Value::String(text) => match text.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(unparsable(text, &FieldType::Boolean)),
        },
        other => Err(unsupported(other, &FieldType::Boolean)),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::LinkError;
    use crate::core::schema::EnumDescriptor;
    use chrono::Datelike;

    fn cache() -> TypeCache {
        let cache = TypeCache::new();
        cache.declare_enum(EnumDescriptor::new("Gender", ["M", "F"]));
        cache.declare_enum(EnumDescriptor::new("Sex", ["F", "M"]));
        cache
    }

    fn gender() -> FieldType {
        FieldType::enumeration("Gender")
    }

    #[test]
    fn test_enum_from_name_ordinal_and_instance() {
        let cache = cache();
        let conv = Converter::new(&cache);
        let f = conv.convert(&Value::from("F"), &gender()).expect("par nom");
        let by_ordinal = conv.convert(&Value::Integer(1), &gender()).expect("par ordinal");
        assert_eq!(f, by_ordinal);
        let same = conv.convert(&f, &gender()).expect("identité");
        assert_eq!(same, f);

        let sex_m = conv.convert(&Value::from("M"), &FieldType::enumeration("Sex")).expect("Sex");
        let gender_m = conv.convert(&sex_m, &gender()).expect("par nom entre énumérations");
        match gender_m {
            Value::Enum(e) => assert_eq!((e.enum_type.as_str(), e.ordinal), ("Gender", 0)),
            other => panic!("attendu une constante, obtenu {}", other),
        }
    }

    #[test]
    fn test_enum_rejects_boolean() {
        let cache = cache();
        let conv = Converter::new(&cache);
        assert!(matches!(
            conv.convert(&Value::Boolean(true), &gender()),
            Err(LinkError::Conversion(ConversionError::Unsupported { .. }))
        ));
        assert!(matches!(
            conv.convert(&Value::from("X"), &gender()),
            Err(LinkError::Conversion(ConversionError::UnknownConstant { .. }))
        ));
    }

    #[test]
    fn test_datetime_from_millis_and_iso() {
        let cache = cache();
        let conv = Converter::new(&cache);
        let from_millis = conv.convert(&Value::Integer(712_713_600_000), &FieldType::DateTime).expect("millis");
        let from_iso = conv.convert(&Value::from("1992-08-02T00:00:00Z"), &FieldType::DateTime).expect("iso");
        assert_eq!(from_millis, from_iso);
        match conv.convert(&Value::from("1992-08-02"), &FieldType::DateTime).expect("date seule") {
            Value::DateTime(dt) => assert_eq!((dt.year(), dt.month(), dt.day()), (1992, 8, 2)),
            other => panic!("attendu un instant, obtenu {}", other),
        }
    }

    #[test]
    fn test_decimal_from_integer_and_string() {
        let cache = cache();
        let conv = Converter::new(&cache);
        assert_eq!(
            conv.convert(&Value::Integer(1000), &FieldType::Decimal).ok(),
            Some(Value::Decimal(Decimal::from(1000)))
        );
        assert_eq!(
            conv.convert(&Value::from("10.50"), &FieldType::Decimal).ok(),
            Some(Value::Decimal(Decimal::new(1050, 2)))
        );
    }

    #[test]
    fn test_null_passes_through() {
        let cache = cache();
        let conv = Converter::new(&cache);
        assert_eq!(conv.convert(&Value::Null, &FieldType::DateTime).ok(), Some(Value::Null));
    }
}
