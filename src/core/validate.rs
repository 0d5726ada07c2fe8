// =============================================================================
// VALIDATE — Vérification des déclarations de types
// =============================================================================
//
// Ce module vérifie que les descripteurs déclarés sont cohérents :
//   - Les types référencés (supertype, source, objets, énumérations) existent
//   - L'héritage ne boucle pas (ni sur soi-même, ni en cycle)
//   - Les attributs de filtrage d'un champ ne se contredisent pas
//
// La configuration échouerait de toute façon sur ces erreurs, mais une par
// une ; la validation les rapporte TOUTES d'un coup.
//
// =============================================================================

use std::collections::BTreeSet;

use thiserror::Error;

use super::cache::TypeCache;
use super::schema::{FieldAttr, FieldDescriptor, TypeDescriptor, TypeKind};
use super::typeside::FieldType;

/// Erreur de validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation error: {type_name} : {message}")]
pub struct ValidationError {
    pub type_name: String,
    pub message: String,
}

/// Vérifie tous les types déclarés dans le cache.
pub fn validate_declarations(cache: &TypeCache) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for name in cache.type_names() {
        if let Ok(descriptor) = cache.descriptor(&name) {
            errors.extend(check_type(cache, &descriptor));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Vérifie un seul type.
pub fn validate_type(cache: &TypeCache, type_name: &str) -> Result<(), Vec<ValidationError>> {
    let errors = match cache.descriptor(type_name) {
        Ok(descriptor) => check_type(cache, &descriptor),
        Err(_) => vec![error(type_name, "type non déclaré".to_string())],
    };
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn error(type_name: &str, message: String) -> ValidationError {
    ValidationError {
        type_name: type_name.to_string(),
        message,
    }
}

fn check_type(cache: &TypeCache, descriptor: &TypeDescriptor) -> Vec<ValidationError> {
    let name = descriptor.name.as_str();
    let mut errors = Vec::new();

    // Héritage
    if let Some(supertype) = &descriptor.supertype {
        if supertype == name {
            errors.push(error(name, "le type hérite de lui-même".to_string()));
        } else if cache.descriptor(supertype).is_err() {
            errors.push(error(name, format!("le supertype '{}' n'existe pas", supertype)));
        } else if has_inheritance_cycle(cache, name) {
            errors.push(error(name, "cycle dans la hiérarchie d'héritage".to_string()));
        }
    }

    // Source d'une projection
    if let TypeKind::Projection { source } = &descriptor.kind {
        match cache.kind(source) {
            None => errors.push(error(name, format!("le type source '{}' n'existe pas", source))),
            Some(TypeKind::Projection { .. }) => {
                errors.push(error(name, format!("le type source '{}' est lui-même une projection", source)))
            }
            Some(_) => {}
        }
    }

    // Champs
    for field in &descriptor.fields {
        check_field_type(cache, name, &field.name, &field.field_type, &mut errors);
        if let Some(contained) = field.contains() {
            check_field_type(cache, name, &field.name, contained, &mut errors);
        }
        check_attributes(name, field, &mut errors);
    }
    for computed in &descriptor.computed {
        check_field_type(cache, name, &computed.name, &computed.field_type, &mut errors);
    }

    errors
}

fn has_inheritance_cycle(cache: &TypeCache, start: &str) -> bool {
    let mut seen = BTreeSet::new();
    let mut current = Some(start.to_string());
    while let Some(name) = current {
        if !seen.insert(name.clone()) {
            return true;
        }
        current = cache.descriptor(&name).ok().and_then(|d| d.supertype.clone());
    }
    false
}

fn check_field_type(
    cache: &TypeCache,
    type_name: &str,
    field: &str,
    field_type: &FieldType,
    errors: &mut Vec<ValidationError>,
) {
    match field_type {
        FieldType::Object(target) if cache.descriptor(target).is_err() => {
            errors.push(error(type_name, format!("champ '{}' : type objet '{}' inconnu", field, target)))
        }
        FieldType::Enum(target) if cache.enum_descriptor(target).is_err() => {
            errors.push(error(type_name, format!("champ '{}' : énumération '{}' inconnue", field, target)))
        }
        FieldType::Array(element) | FieldType::Collection(_, element) => {
            check_field_type(cache, type_name, field, element, errors)
        }
        _ => {}
    }
}

fn check_attributes(type_name: &str, field: &FieldDescriptor, errors: &mut Vec<ValidationError>) {
    let has = |pred: fn(&FieldAttr) -> bool| field.attrs.iter().any(pred);

    let range_from = has(|a| matches!(a, FieldAttr::RangeFrom { .. }));
    let range_to = has(|a| matches!(a, FieldAttr::RangeTo { .. }));
    if range_from && range_to {
        errors.push(error(
            type_name,
            format!("champ '{}' : RangeFrom et RangeTo sont exclusifs", field.name),
        ));
    }

    let is_null = has(|a| matches!(a, FieldAttr::IsNull));
    let is_not_null = has(|a| matches!(a, FieldAttr::IsNotNull));
    if is_null && is_not_null {
        errors.push(error(
            type_name,
            format!("champ '{}' : IsNull et IsNotNull sont exclusifs", field.name),
        ));
    }
    if (is_null || is_not_null) && field.field_type != FieldType::Boolean {
        errors.push(error(
            type_name,
            format!("champ '{}' : un test de nullité exige un champ booléen", field.name),
        ));
    }

    let links = field.attrs.iter().filter(|a| matches!(a, FieldAttr::Link(_))).count();
    if links > 1 {
        errors.push(error(type_name, format!("champ '{}' : plusieurs liens déclarés", field.name)));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::EnumDescriptor;

    fn valid_cache() -> TypeCache {
        let cache = TypeCache::new();
        cache.declare_enum(EnumDescriptor::new("Gender", ["M", "F"]));
        cache.declare(
            TypeDescriptor::entity("Client")
                .id("uid", FieldType::Integer)
                .field("gender", FieldType::enumeration("Gender"))
                .field("accounts", FieldType::list(FieldType::object("Account"))),
        );
        cache.declare(TypeDescriptor::entity("Account").id("number", FieldType::String));
        cache.declare(
            TypeDescriptor::projection("ClientFilter", "Client")
                .field_with("from", FieldType::DateTime, [FieldAttr::from()])
                .field_with("absent", FieldType::Boolean, [FieldAttr::IsNull]),
        );
        cache
    }

    #[test]
    fn test_error_message_and_source() {
        let err = ValidationError {
            type_name: "ClientFilter".into(),
            message: "attributs incompatibles".into(),
        };
        assert_eq!(err.to_string(), "Validation error: ClientFilter : attributs incompatibles");
        let as_error: &dyn std::error::Error = &err;
        assert!(as_error.source().is_none());
    }

    #[test]
    fn test_valid_declarations() {
        let cache = valid_cache();
        assert!(validate_declarations(&cache).is_ok());
    }

    #[test]
    fn test_unknown_references() {
        let cache = valid_cache();
        cache.declare(
            TypeDescriptor::entity("Broken")
                .field("x", FieldType::object("Nowhere"))
                .field("y", FieldType::set(FieldType::enumeration("Color"))),
        );
        cache.declare(TypeDescriptor::projection("OrphanDto", "Missing"));
        let errors = validate_declarations(&cache).expect_err("devrait échouer");
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.message.contains("Nowhere")));
        assert!(errors.iter().any(|e| e.message.contains("Color")));
        assert!(errors.iter().any(|e| e.type_name == "OrphanDto"));
    }

    #[test]
    fn test_inheritance_problems() {
        let cache = valid_cache();
        cache.declare(TypeDescriptor::entity("Selfish").extends("Selfish"));
        cache.declare(TypeDescriptor::entity("A").extends("B"));
        cache.declare(TypeDescriptor::entity("B").extends("A"));
        let errors = validate_declarations(&cache).expect_err("devrait échouer");
        assert!(errors.iter().any(|e| e.type_name == "Selfish" && e.message.contains("lui-même")));
        assert!(errors.iter().any(|e| e.type_name == "A" && e.message.contains("cycle")));
        assert!(errors.iter().any(|e| e.type_name == "B" && e.message.contains("cycle")));
    }

    #[test]
    fn test_conflicting_filter_attributes() {
        let cache = valid_cache();
        cache.declare(
            TypeDescriptor::projection("BadFilter", "Client")
                .field_with("range", FieldType::Integer, [FieldAttr::from(), FieldAttr::to()])
                .field_with("nulls", FieldType::Boolean, [FieldAttr::IsNull, FieldAttr::IsNotNull])
                .field_with("notBool", FieldType::String, [FieldAttr::IsNull]),
        );
        let errors = validate_type(&cache, "BadFilter").expect_err("devrait échouer");
        assert_eq!(errors.len(), 3);
        println!("{}", errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"));
    }

    #[test]
    fn test_validate_unknown_type() {
        let cache = valid_cache();
        assert!(validate_type(&cache, "Nope").is_err());
    }
}
