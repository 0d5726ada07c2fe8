// =============================================================================
// CACHE — Le cache des métadonnées de types
// =============================================================================
//
// Le cache détient les descripteurs déclarés et mémoïse, une fois par type :
//   - la table des champs (champs propres + champs hérités, le sous-type
//     l'emportant en cas de collision),
//   - les Properties construites à la demande.
//
// CONCURRENCE : chaque type possède une cellule « calcul unique »
// (OnceCell). Le premier accès calcule la table, les accès concurrents au
// même type attendent ce calcul, puis toutes les lectures suivantes se
// contentent de cloner un Arc. Aucune éviction.
//
// Le cache est un objet explicite, injecté dans le processeur : deux
// processeurs peuvent partager le même cache ou en avoir chacun un.
//
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::trace;

use super::error::{ConversionError, LinkError, LinkResult};
use super::instance::Record;
use super::property::Property;
use super::schema::{EnumDescriptor, FieldDescriptor, TypeDescriptor, TypeKind};
use super::typeside::{EnumValue, FieldType};

/// Table ordonnée nom → champ d'un type, héritage inclus.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    fields: Vec<Arc<FieldDescriptor>>,
    index: HashMap<String, usize>,
}

impl FieldTable {
    fn insert(&mut self, field: FieldDescriptor) {
        let field = Arc::new(field);
        match self.index.get(&field.name) {
            Some(&pos) => self.fields[pos] = field,
            None => {
                self.index.insert(field.name.clone(), self.fields.len());
                self.fields.push(field);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.index.get(name).map(|&pos| &self.fields[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FieldDescriptor>> {
        self.fields.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Le cache des métadonnées.
#[derive(Debug, Default)]
pub struct TypeCache {
    types: DashMap<String, Arc<TypeDescriptor>>,
    enums: DashMap<String, Arc<EnumDescriptor>>,
    tables: DashMap<String, Arc<OnceCell<Arc<FieldTable>>>>,
    properties: DashMap<(String, String), Property>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Déclaration ──────────────────────────────────────────────

    /// Déclare (ou redéclare) un type. Une redéclaration invalide les
    /// tables déjà calculées, sous-types compris.
    pub fn declare(&self, descriptor: TypeDescriptor) {
        trace!(type_name = %descriptor.name, kind = ?descriptor.kind, "type déclaré");
        let name = descriptor.name.clone();
        if self.types.insert(name, Arc::new(descriptor)).is_some() {
            self.tables.clear();
            self.properties.clear();
        }
    }

    pub fn declare_enum(&self, descriptor: EnumDescriptor) {
        trace!(enum_type = %descriptor.name, variants = descriptor.variants.len(), "énumération déclarée");
        self.enums.insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    // ─── Consultation ─────────────────────────────────────────────

    pub fn descriptor(&self, type_name: &str) -> LinkResult<Arc<TypeDescriptor>> {
        self.types
            .get(type_name)
            .map(|d| d.value().clone())
            .ok_or_else(|| LinkError::UnknownType(type_name.to_string()))
    }

    pub fn is_declared(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name) || self.enums.contains_key(type_name)
    }

    pub fn enum_descriptor(&self, enum_type: &str) -> LinkResult<Arc<EnumDescriptor>> {
        self.enums
            .get(enum_type)
            .map(|d| d.value().clone())
            .ok_or_else(|| LinkError::UnknownType(enum_type.to_string()))
    }

    /// Noms des types déclarés, triés.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn kind(&self, type_name: &str) -> Option<TypeKind> {
        self.types.get(type_name).map(|d| d.kind.clone())
    }

    pub fn is_entity(&self, type_name: &str) -> bool {
        self.kind(type_name) == Some(TypeKind::Entity)
    }

    pub fn is_projection(&self, type_name: &str) -> bool {
        matches!(self.kind(type_name), Some(TypeKind::Projection { .. }))
    }

    /// Le champ est-il une relation (entité ou collection d'entités) ?
    pub fn is_relation(&self, field_type: &FieldType) -> bool {
        match field_type {
            FieldType::Object(name) => self.is_entity(name),
            FieldType::Array(e) | FieldType::Collection(_, e) => self.is_relation(e),
            _ => false,
        }
    }

    /// Table des champs du type, calculée une seule fois.
    pub fn fields(&self, type_name: &str) -> LinkResult<Arc<FieldTable>> {
        if !self.types.contains_key(type_name) {
            return Err(LinkError::UnknownType(type_name.to_string()));
        }
        let cell = self
            .tables
            .entry(type_name.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        cell.get_or_try_init(|| self.compute_table(type_name)).cloned()
    }

    /// Lignée du type, du type lui-même jusqu'à la racine.
    fn lineage(&self, type_name: &str) -> LinkResult<Vec<Arc<TypeDescriptor>>> {
        let mut chain: Vec<Arc<TypeDescriptor>> = Vec::new();
        let mut current = Some(type_name.to_string());
        while let Some(name) = current {
            if chain.iter().any(|d| d.name == name) {
                return Err(LinkError::path(type_name, &name, "héritage cyclique"));
            }
            let descriptor = self.descriptor(&name)?;
            current = descriptor.supertype.clone();
            chain.push(descriptor);
        }
        Ok(chain)
    }

    fn compute_table(&self, type_name: &str) -> LinkResult<Arc<FieldTable>> {
        let mut table = FieldTable::default();
        for descriptor in self.lineage(type_name)?.iter().rev() {
            for field in &descriptor.fields {
                table.insert(field.clone());
            }
        }
        trace!(type_name, fields = table.len(), "table de champs calculée");
        Ok(Arc::new(table))
    }

    /// Property `name` du type : champ stocké, sinon propriété calculée.
    pub fn property(&self, type_name: &str, name: &str) -> LinkResult<Property> {
        let key = (type_name.to_string(), name.to_string());
        if let Some(prop) = self.properties.get(&key) {
            return Ok(prop.value().clone());
        }
        let prop = self.build_property(type_name, name)?;
        self.properties.insert(key, prop.clone());
        Ok(prop)
    }

    fn build_property(&self, type_name: &str, name: &str) -> LinkResult<Property> {
        if let Some(field) = self.fields(type_name)?.get(name) {
            return Ok(Property::field(type_name, field.clone()));
        }
        for descriptor in self.lineage(type_name)? {
            if let Some(computed) = descriptor.own_computed(name) {
                return Ok(Property::computed(type_name, computed));
            }
        }
        Err(LinkError::unknown_property(type_name, name))
    }

    /// Le type déclare-t-il (ou hérite-t-il) cette propriété ?
    pub fn has_property(&self, type_name: &str, name: &str) -> bool {
        self.property(type_name, name).is_ok()
    }

    /// Champ clé primaire d'une entité.
    pub fn primary_key(&self, type_name: &str) -> Option<Arc<FieldDescriptor>> {
        let table = self.fields(type_name).ok()?;
        let key = table.iter().find(|f| f.is_id()).cloned();
        key
    }

    /// Nouvelle instance du type, champs initialisés à leur valeur par défaut.
    pub fn instantiate(&self, type_name: &str) -> LinkResult<Record> {
        let table = self.fields(type_name)?;
        let mut record = Record::new(type_name);
        for field in table.iter() {
            if let Some(default) = &field.default {
                record.set(&field.name, default.clone());
            }
        }
        Ok(record)
    }

    // ─── Énumérations ─────────────────────────────────────────────

    pub fn enum_value(&self, enum_type: &str, name: &str) -> LinkResult<EnumValue> {
        let descriptor = self.enum_descriptor(enum_type)?;
        descriptor.value(name).ok_or_else(|| {
            ConversionError::UnknownConstant {
                enum_type: enum_type.to_string(),
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn enum_at(&self, enum_type: &str, ordinal: i64) -> LinkResult<EnumValue> {
        let descriptor = self.enum_descriptor(enum_type)?;
        usize::try_from(ordinal)
            .ok()
            .and_then(|o| descriptor.at(o))
            .ok_or_else(|| {
                ConversionError::OrdinalOutOfRange {
                    enum_type: enum_type.to_string(),
                    ordinal,
                }
                .into()
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::FieldAttr;
    use crate::core::typeside::Value;

    fn user_client_cache() -> TypeCache {
        let cache = TypeCache::new();
        cache.declare(
            TypeDescriptor::entity("User")
                .id("uid", FieldType::Integer)
                .field("loginData", FieldType::object("LoginData"))
                .field("note", FieldType::String),
        );
        cache.declare(
            TypeDescriptor::entity("Client")
                .extends("User")
                .field("personalData", FieldType::object("PersonalData"))
                .field_with("note", FieldType::Integer, [FieldAttr::Ignored])
                .computed("leadPresent", FieldType::Boolean, |r| Value::Boolean(!r.get("lead").is_null())),
        );
        cache.declare_enum(EnumDescriptor::new("Gender", ["M", "F"]));
        cache
    }

    #[test]
    fn test_fields_include_supertype() {
        let cache = user_client_cache();
        let table = cache.fields("Client").expect("table");
        assert_eq!(table.names(), vec!["uid", "loginData", "note", "personalData"]);
    }

    #[test]
    fn test_subtype_wins_on_collision() {
        let cache = user_client_cache();
        let table = cache.fields("Client").expect("table");
        let note = table.get("note").expect("note");
        assert_eq!(note.field_type, FieldType::Integer);
        assert!(note.is_ignored());
    }

    #[test]
    fn test_fields_computed_once() {
        let cache = user_client_cache();
        let first = cache.fields("Client").expect("table");
        let second = cache.fields("Client").expect("table");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_property_falls_back_to_computed() {
        let cache = user_client_cache();
        let prop = cache.property("Client", "leadPresent").expect("propriété calculée");
        assert!(!prop.is_writable());
        assert!(matches!(
            cache.property("Client", "nope"),
            Err(LinkError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_primary_key_is_inherited() {
        let cache = user_client_cache();
        assert_eq!(cache.primary_key("Client").map(|f| f.name.clone()), Some("uid".to_string()));
    }

    #[test]
    fn test_cyclic_inheritance_is_an_error() {
        let cache = TypeCache::new();
        cache.declare(TypeDescriptor::plain("A").extends("B"));
        cache.declare(TypeDescriptor::plain("B").extends("A"));
        assert!(cache.fields("A").is_err());
    }

    #[test]
    fn test_enum_lookup_errors() {
        let cache = user_client_cache();
        assert_eq!(cache.enum_value("Gender", "F").map(|e| e.ordinal).ok(), Some(1));
        assert!(matches!(
            cache.enum_at("Gender", 5),
            Err(LinkError::Conversion(ConversionError::OrdinalOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_concurrent_first_access() {
        let cache = Arc::new(user_client_cache());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.fields("Client").map(|t| t.len()).unwrap_or(0))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap_or(0), 4);
        }
    }
}
