// =============================================================================
// EXTENSION — Les règles qui interceptent une chaîne de mapping
// =============================================================================
//
// Pendant la construction d'une chaîne, après chaque extraction de segment,
// les extensions sont testées DANS L'ORDRE :
//
//   Lecture : Array → Collection → Enum → Projection
//   Écriture : RelationByKey (navigation) puis Enum (terminal)
//
// La première applicable fournit l'étape suivante et peut rappeler le
// constructeur de chaînes (éléments d'un tableau ou d'une collection).
//
//   Array      : tableau source → tableau, élément par élément
//   Collection : collection source → collection de la projection
//                (réutilise la collection initiale du champ de premier
//                niveau ; une collection d'élément repart d'une vide)
//   Enum       : conversions entre constante, nom et ordinal
//   Projection : l'objet source est projeté récursivement (type nommé)
//   RelationByKey : `compte.numero` sur une entité → recherche par clé
//
// Enum et Projection ne s'appliquent qu'en FIN de chemin ; Array et
// Collection s'appliquent à toute profondeur et emportent le reste du
// chemin dans la chaîne d'élément.
//
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::cache::TypeCache;
use super::chain::{ChainBuilder, ReadChain, ReadStep};
use super::error::{ConversionError, LinkResult};
use super::schema::FieldDescriptor;
use super::typeside::{CollectionKind, FieldType, Value};

// ─── Conversions d'énumérations ───────────────────────────────────

/// Conversion choisie une fois pour toutes à la construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumConversion {
    /// Même énumération des deux côtés
    Identity,
    /// Énumération → autre énumération, par nom
    ByName(String),
    /// Énumération → chaîne
    ToName,
    /// Chaîne → énumération
    FromName(String),
    /// Énumération → ordinal, dans le type numérique porteur
    ToOrdinal(FieldType),
    /// Ordinal → énumération
    FromOrdinal(String),
}

impl EnumConversion {
    /// Conversion de `from` vers `to` ; au moins un côté est une énumération.
    pub fn between(from: &FieldType, to: &FieldType) -> LinkResult<Self> {
        let conversion = match (from, to) {
            (FieldType::Enum(a), FieldType::Enum(b)) if a == b => EnumConversion::Identity,
            (FieldType::Enum(_), FieldType::Enum(b)) => EnumConversion::ByName(b.clone()),
            (FieldType::Enum(_), FieldType::Any) => EnumConversion::Identity,
            (FieldType::Enum(_), FieldType::String) => EnumConversion::ToName,
            (FieldType::String, FieldType::Enum(b)) => EnumConversion::FromName(b.clone()),
            (FieldType::Enum(_), carrier) if carrier.is_numeric() => EnumConversion::ToOrdinal(carrier.clone()),
            (carrier, FieldType::Enum(b)) if carrier.is_numeric() => EnumConversion::FromOrdinal(b.clone()),
            (FieldType::Any, FieldType::Enum(b)) => EnumConversion::FromName(b.clone()),
            _ => return Err(ConversionError::unsupported(from, to).into()),
        };
        Ok(conversion)
    }

    pub fn apply(&self, value: &Value, cache: &TypeCache) -> LinkResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let converted = match (self, value) {
            (EnumConversion::Identity, v) => v.clone(),
            (EnumConversion::ByName(target), Value::Enum(e)) => Value::Enum(cache.enum_value(target, &e.name)?),
            (EnumConversion::ToName, Value::Enum(e)) => Value::String(e.name.clone()),
            (EnumConversion::FromName(target), Value::String(name)) => Value::Enum(cache.enum_value(target, name)?),
            (EnumConversion::FromName(target), Value::Enum(e)) => Value::Enum(cache.enum_value(target, &e.name)?),
            (EnumConversion::ToOrdinal(carrier), Value::Enum(e)) => match carrier {
                FieldType::Float => Value::Float(e.ordinal as f64),
                FieldType::Decimal => Value::Decimal(Decimal::from(e.ordinal as u64)),
                _ => Value::Integer(e.ordinal as i64),
            },
            (EnumConversion::FromOrdinal(target), Value::Integer(_) | Value::Float(_) | Value::Decimal(_)) => {
                let ordinal = ordinal_of(value).ok_or_else(|| ConversionError::Unparsable {
                    value: value.to_string(),
                    to: target.clone(),
                })?;
                Value::Enum(cache.enum_at(target, ordinal)?)
            }
            (conversion, other) => {
                return Err(ConversionError::unsupported(other.get_type(), format!("{:?}", conversion)).into())
            }
        };
        Ok(converted)
    }
}

/// Ordinal porté par un nombre entier, quelle que soit sa représentation.
fn ordinal_of(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
        Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
        _ => None,
    }
}

// ─── Extensions de lecture ────────────────────────────────────────

/// Extensions de lecture, dans leur ordre de priorité.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadExtension {
    Array,
    Collection,
    Enum,
    Projection,
}

impl ReadExtension {
    pub const PRIORITY: [ReadExtension; 4] = [
        ReadExtension::Array,
        ReadExtension::Collection,
        ReadExtension::Enum,
        ReadExtension::Projection,
    ];

    pub fn is_applicable(
        &self,
        builder: &ChainBuilder<'_>,
        remaining: &str,
        source: &FieldType,
        target: &FieldType,
        field: Option<&FieldDescriptor>,
    ) -> bool {
        match self {
            ReadExtension::Array => matches!((source, target), (FieldType::Array(_), FieldType::Array(_))),
            ReadExtension::Collection => {
                matches!((source, target), (FieldType::Collection(..), FieldType::Collection(..)))
            }
            ReadExtension::Enum => remaining.is_empty() && (source.is_enum() || target.is_enum()),
            ReadExtension::Projection => {
                remaining.is_empty()
                    && matches!(source, FieldType::Object(_))
                    && target
                        .object_name()
                        .is_some_and(|name| builder.processor().is_registered(name))
            }
        }
    }

    /// Étape fournie par l'extension, qui consomme le reste du chemin.
    pub fn build(
        &self,
        builder: &ChainBuilder<'_>,
        remaining: &str,
        source: &FieldType,
        target: &FieldType,
        field: Option<&FieldDescriptor>,
    ) -> LinkResult<ReadStep> {
        match self {
            ReadExtension::Array => {
                let (source_element, target_element) = element_types(source, target, None);
                let element = builder.read(remaining, &source_element, &target_element, None)?;
                Ok(ReadStep::Array(element))
            }
            ReadExtension::Collection => {
                let (source_element, target_element) = element_types(source, target, field);
                let element: ReadChain = builder.read(remaining, &source_element, &target_element, None)?;
                let kind = match target {
                    FieldType::Collection(kind, _) => *kind,
                    _ => CollectionKind::List,
                };
                Ok(ReadStep::Collection {
                    kind,
                    field: field.map(|f| f.name.clone()),
                    element,
                })
            }
            ReadExtension::Enum => Ok(ReadStep::Enum(EnumConversion::between(source, target)?)),
            ReadExtension::Projection => {
                let name = target.object_name().unwrap_or_default();
                Ok(ReadStep::Project(name.to_string()))
            }
        }
    }
}

/// Types d'éléments source et cible ; `contains` prime sur le déclaré.
fn element_types(source: &FieldType, target: &FieldType, field: Option<&FieldDescriptor>) -> (FieldType, FieldType) {
    let source_element = source.element_type().cloned().unwrap_or(FieldType::Any);
    let target_element = field
        .and_then(|f| f.contains().cloned())
        .or_else(|| target.element_type().cloned())
        .unwrap_or(FieldType::Any);
    (source_element, target_element)
}

// ─── Extension d'écriture : relation par clé ──────────────────────

/// `property` suivi de `remaining` désigne-t-il la clé primaire d'une
/// entité ? Renvoie le type de l'entité le cas échéant.
pub fn relation_by_key(
    cache: &TypeCache,
    property_type: &FieldType,
    remaining: &str,
) -> Option<String> {
    let entity = property_type.object_name()?;
    if !cache.is_entity(entity) {
        return None;
    }
    let key = cache.primary_key(entity)?;
    (key.name == remaining).then(|| entity.to_string())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::LinkError;
    use crate::core::schema::{EnumDescriptor, TypeDescriptor};

    fn cache() -> TypeCache {
        let cache = TypeCache::new();
        cache.declare_enum(EnumDescriptor::new("Gender", ["M", "F"]));
        cache.declare_enum(EnumDescriptor::new("Sex", ["F", "M"]));
        cache.declare(TypeDescriptor::entity("Account").id("number", FieldType::String));
        cache.declare(TypeDescriptor::embeddable("State").field("amount", FieldType::Decimal));
        cache
    }

    #[test]
    fn test_enum_conversion_selection() {
        let g = FieldType::enumeration("Gender");
        let s = FieldType::enumeration("Sex");
        assert_eq!(EnumConversion::between(&g, &g).ok(), Some(EnumConversion::Identity));
        assert_eq!(EnumConversion::between(&g, &s).ok(), Some(EnumConversion::ByName("Sex".into())));
        assert_eq!(EnumConversion::between(&g, &FieldType::String).ok(), Some(EnumConversion::ToName));
        assert_eq!(EnumConversion::between(&FieldType::String, &g).ok(), Some(EnumConversion::FromName("Gender".into())));
        assert_eq!(
            EnumConversion::between(&g, &FieldType::Integer).ok(),
            Some(EnumConversion::ToOrdinal(FieldType::Integer))
        );
        assert_eq!(EnumConversion::between(&FieldType::Integer, &g).ok(), Some(EnumConversion::FromOrdinal("Gender".into())));
    }

    #[test]
    fn test_unsupported_enum_conversion_names_both_types() {
        let err = EnumConversion::between(&FieldType::enumeration("Gender"), &FieldType::Boolean);
        match err {
            Err(LinkError::Conversion(ConversionError::Unsupported { from, to })) => {
                assert_eq!((from.as_str(), to.as_str()), ("Gender", "Boolean"));
            }
            other => panic!("attendu une erreur de conversion, obtenu {:?}", other),
        }
    }

    #[test]
    fn test_enum_conversion_apply() {
        let cache = cache();
        let f = Value::Enum(cache.enum_value("Gender", "F").expect("F"));
        assert_eq!(EnumConversion::ToName.apply(&f, &cache).ok(), Some(Value::from("F")));
        assert_eq!(EnumConversion::ToOrdinal(FieldType::Integer).apply(&f, &cache).ok(), Some(Value::Integer(1)));
        let sex = EnumConversion::ByName("Sex".into()).apply(&f, &cache).expect("par nom");
        assert_eq!(sex, Value::Enum(cache.enum_value("Sex", "F").expect("F")));
        assert_eq!(
            EnumConversion::FromName("Gender".into()).apply(&Value::from("F"), &cache).ok(),
            Some(f.clone())
        );
        assert_eq!(EnumConversion::FromOrdinal("Gender".into()).apply(&Value::Integer(1), &cache).ok(), Some(f));
        assert_eq!(EnumConversion::ToName.apply(&Value::Null, &cache).ok(), Some(Value::Null));
    }

    #[test]
    fn test_ordinal_carried_by_any_number() {
        let cache = cache();
        let g = FieldType::enumeration("Gender");
        let f = Value::Enum(cache.enum_value("Gender", "F").expect("F"));
        for carrier in [FieldType::Float, FieldType::Decimal] {
            assert_eq!(
                EnumConversion::between(&g, &carrier).ok(),
                Some(EnumConversion::ToOrdinal(carrier.clone()))
            );
            assert_eq!(
                EnumConversion::between(&carrier, &g).ok(),
                Some(EnumConversion::FromOrdinal("Gender".into()))
            );
        }
        assert_eq!(EnumConversion::ToOrdinal(FieldType::Float).apply(&f, &cache).ok(), Some(Value::Float(1.0)));
        assert_eq!(
            EnumConversion::ToOrdinal(FieldType::Decimal).apply(&f, &cache).ok(),
            Some(Value::Decimal(Decimal::from(1)))
        );

        let from = EnumConversion::FromOrdinal("Gender".into());
        assert_eq!(from.apply(&Value::Float(1.0), &cache).ok(), Some(f.clone()));
        assert_eq!(from.apply(&Value::Decimal(Decimal::from(1)), &cache).ok(), Some(f));
        assert!(from.apply(&Value::Float(0.5), &cache).is_err());
    }

    #[test]
    fn test_relation_by_key_requires_entity_primary_key() {
        let cache = cache();
        let account = FieldType::object("Account");
        assert_eq!(relation_by_key(&cache, &account, "number"), Some("Account".to_string()));
        assert_eq!(relation_by_key(&cache, &account, "state"), None);
        assert_eq!(relation_by_key(&cache, &FieldType::object("State"), "amount"), None);
    }
}
