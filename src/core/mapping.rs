// =============================================================================
// MAPPING — Les métadonnées de mapping d'un type de projection
// =============================================================================
//
// Pour chaque projection enregistrée, la configuration construit UNE fois :
//   - une chaîne de LECTURE par champ (source → valeur du champ)
//   - une chaîne d'ÉCRITURE par champ (valeur du champ → source)
//
// EXEMPLE : ClientDto (source Client)
//
//   champ            lecture                                écriture
//   name     Get(personalData) → Get(name)        nav(personalData) → Set(name)
//   gender   Get(personalData) → Get(gender)      nav(personalData) → Set(gender)
//            → Enum(ToName)                         après Enum(FromName)
//   accounts Get(accounts) → Collection[Project]  lecture seule
//
// Les métadonnées sont immuables après construction et appartiennent au
// processeur qui les a construites. Les champs ignorés n'ont pas de chaîne.
//
// =============================================================================

use tracing::debug;

use super::chain::{ChainBuilder, ReadChain, WriteChain};
use super::error::{LinkError, LinkResult};
use super::schema::FieldDescriptor;
use super::typeside::FieldType;

/// Chaînes d'un champ de projection.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub field: String,
    pub read: ReadChain,
    pub write: WriteChain,
}

/// Les métadonnées d'un type de projection.
#[derive(Debug, Clone)]
pub struct MappingMetadata {
    pub projection_type: String,
    pub source_type: String,
    mappings: Vec<FieldMapping>,
}

impl MappingMetadata {
    /// Construit les chaînes de tous les champs de `projection_type`.
    /// Toute erreur est rendue telle quelle ; l'appelant l'enveloppe.
    pub fn build(builder: &ChainBuilder<'_>, projection_type: &str) -> LinkResult<Self> {
        let cache = builder.processor().cache();
        let descriptor = cache.descriptor(projection_type)?;
        let source_type = descriptor
            .source()
            .ok_or_else(|| LinkError::NotProcessable(projection_type.to_string()))?
            .to_string();
        cache.descriptor(&source_type)?;

        let source = FieldType::object(&source_type);
        let mut mappings = Vec::new();
        for field in cache.fields(projection_type)?.iter() {
            if field.is_ignored() {
                continue;
            }
            let link = field.link_path();
            let read = builder.read(link, &source, &field.field_type, Some(field))?;
            let write = builder.write(link, &source_type, &write_target(field))?;
            debug!(
                projection = projection_type,
                field = %field.name,
                link,
                read_steps = read.steps().len(),
                "champ lié"
            );
            mappings.push(FieldMapping {
                field: field.name.clone(),
                read,
                write,
            });
        }

        Ok(MappingMetadata {
            projection_type: projection_type.to_string(),
            source_type,
            mappings,
        })
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    pub fn read_mapping(&self, field: &str) -> Option<&ReadChain> {
        self.mappings.iter().find(|m| m.field == field).map(|m| &m.read)
    }

    pub fn write_mapping(&self, field: &str) -> Option<&WriteChain> {
        self.mappings.iter().find(|m| m.field == field).map(|m| &m.write)
    }
}

/// Type cible de l'écriture : l'override Contains remplace l'élément déclaré.
fn write_target(field: &FieldDescriptor) -> FieldType {
    match (&field.field_type, field.contains()) {
        (FieldType::Array(_), Some(element)) => FieldType::array(element.clone()),
        (FieldType::Collection(kind, _), Some(element)) => FieldType::Collection(*kind, Box::new(element.clone())),
        (declared, _) => declared.clone(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TypeCache;
    use crate::core::chain::{ReadStep, WriteConversion, WriteTerminal};
    use crate::core::extension::EnumConversion;
    use crate::core::processor::Processor;
    use crate::core::schema::{EnumDescriptor, FieldAttr, TypeDescriptor};
    use std::sync::Arc;

    fn processor() -> Processor {
        let cache = TypeCache::new();
        cache.declare_enum(EnumDescriptor::new("Gender", ["M", "F"]));
        cache.declare(
            TypeDescriptor::entity("Client")
                .id("uid", FieldType::Integer)
                .field("personalData", FieldType::object("PersonalData"))
                .field("accounts", FieldType::list(FieldType::object("Account")))
                .computed("accountCount", FieldType::Integer, |r| {
                    crate::core::typeside::Value::Integer(r.get("accounts").items().map_or(0, |i| i.len() as i64))
                }),
        );
        cache.declare(
            TypeDescriptor::embeddable("PersonalData")
                .field("name", FieldType::String)
                .field("gender", FieldType::enumeration("Gender")),
        );
        cache.declare(TypeDescriptor::entity("Account").id("number", FieldType::String));
        cache.declare(TypeDescriptor::projection("AccountDto", "Account").field("number", FieldType::String));
        cache.declare(
            TypeDescriptor::projection("ClientDto", "Client")
                .field_with("name", FieldType::String, [FieldAttr::link("personalData.name")])
                .field_with("gender", FieldType::String, [FieldAttr::link("personalData.gender")])
                .field("accounts", FieldType::list(FieldType::object("AccountDto")))
                .field("accountCount", FieldType::Integer)
                .field_with("scratch", FieldType::String, [FieldAttr::Ignored]),
        );
        let mut processor = Processor::new(Arc::new(cache));
        processor.add("AccountDto").expect("AccountDto");
        processor.add("ClientDto").expect("ClientDto");
        processor
    }

    #[test]
    fn test_build_skips_ignored_fields() {
        let p = processor();
        let meta = MappingMetadata::build(&ChainBuilder::new(&p), "ClientDto").expect("métadonnées");
        let fields: Vec<&str> = meta.mappings().iter().map(|m| m.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "gender", "accounts", "accountCount"]);
        assert_eq!(meta.source_type, "Client");
    }

    #[test]
    fn test_enum_field_chains() {
        let p = processor();
        let meta = MappingMetadata::build(&ChainBuilder::new(&p), "ClientDto").expect("métadonnées");
        let read = meta.read_mapping("gender").expect("lecture");
        assert!(matches!(read.steps().last(), Some(ReadStep::Enum(EnumConversion::ToName))));
        match meta.write_mapping("gender").map(|w| w.terminal()) {
            Some(WriteTerminal::Set { conversion: WriteConversion::Enum(EnumConversion::FromName(e)), .. }) => {
                assert_eq!(e, "Gender")
            }
            other => panic!("attendu Set + FromName, obtenu {:?}", other),
        }
    }

    #[test]
    fn test_collection_of_projections_is_read_only_on_write() {
        let p = processor();
        let meta = MappingMetadata::build(&ChainBuilder::new(&p), "ClientDto").expect("métadonnées");
        assert!(matches!(meta.read_mapping("accounts").map(|r| r.steps()), Some([ReadStep::Get(_), ReadStep::Collection { .. }])));
        assert!(matches!(meta.write_mapping("accounts").map(|w| w.terminal()), Some(WriteTerminal::ReadOnly)));
        assert!(matches!(meta.write_mapping("accountCount").map(|w| w.terminal()), Some(WriteTerminal::ReadOnly)));
    }

    #[test]
    fn test_unknown_link_fails() {
        let p = processor();
        p.cache().declare(
            TypeDescriptor::projection("BrokenDto", "Client")
                .field_with("x", FieldType::String, [FieldAttr::link("personalData.nope")]),
        );
        let err = MappingMetadata::build(&ChainBuilder::new(&p), "BrokenDto");
        assert!(matches!(err, Err(LinkError::UnknownProperty { .. })));
    }
}
