// =============================================================================
// SCHEMA — Les descripteurs de types (entités, embarqués, projections)
// =============================================================================
//
// Un descripteur décrit un type de façon EXPLICITE : son rôle, son éventuel
// supertype, ses champs déclarés et leurs attributs. C'est la table de
// métadonnées que le cache (cache.rs) mémoïse.
//
// Quatre rôles :
//   Entity      → type persistant, a une clé primaire, atteint par JOIN
//   Embeddable  → valeur embarquée dans une entité (pas de JOIN)
//   Projection  → objet de transport, lié à UN type source
//   Plain       → tout le reste (objets sans persistance)
//
// EXEMPLE :
//
//   Client ──personalData──▶ PersonalData (embarqué)
//      │
//      └──selectedAccount──▶ Account (entité)
//
//   ClientDto  (projection de Client)
//      name  @link("personalData.name")
//      login @link("loginData.email")
//
// Les attributs d'un champ pilotent à la fois le chaînage (link, contains,
// id) et la dérivation implicite de filtres (range, like, in, null...).
//
// =============================================================================

use std::fmt;
use std::sync::Arc;

use super::instance::Record;
use super::query::Specs;
use super::typeside::{EnumValue, FieldType, Value};

/// Accesseur calculé : lecture seule, dérivée de l'enregistrement.
pub type Getter = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Prédicat personnalisé d'une projection auto-spécifiante.
pub type InstanceSpecs = Arc<dyn Fn(&Record) -> Specs + Send + Sync>;

/// Un attribut déclaré sur un champ.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAttr {
    /// Chemin pointillé vers le champ du type source (défaut : le nom du champ)
    Link(String),
    /// Champ ignoré par le processeur (ni chaîné, ni filtré)
    Ignored,
    /// Inverse le filtre dérivé
    Negate,
    /// Borne basse d'un intervalle
    RangeFrom { exclusive: bool },
    /// Borne haute d'un intervalle
    RangeTo { exclusive: bool },
    /// Recherche par motif ; sensibilité à la casse (None → configuration)
    Like { case_sensitive: Option<bool> },
    /// Appartenance à une liste de valeurs
    In,
    /// Booléen : true → IS NULL, false → IS NOT NULL
    IsNull,
    /// Booléen : true → IS NOT NULL, false → IS NULL
    IsNotNull,
    /// Type d'élément d'une collection de projection
    Contains(FieldType),
    /// Clé primaire d'une entité
    Id,
    /// Attribut de l'entité cible qui référence le propriétaire (to-many)
    MappedBy(String),
}

impl FieldAttr {
    pub fn link(path: &str) -> Self {
        FieldAttr::Link(path.to_string())
    }

    pub fn mapped_by(attribute: &str) -> Self {
        FieldAttr::MappedBy(attribute.to_string())
    }

    pub fn like() -> Self {
        FieldAttr::Like { case_sensitive: None }
    }

    pub fn from() -> Self {
        FieldAttr::RangeFrom { exclusive: false }
    }

    pub fn to() -> Self {
        FieldAttr::RangeTo { exclusive: false }
    }
}

/// Borne d'intervalle déclarée sur un champ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    From { exclusive: bool },
    To { exclusive: bool },
}

/// Un champ déclaré.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub attrs: Vec<FieldAttr>,
    /// Valeur initiale à l'instanciation (ex. collection pré-allouée)
    pub default: Option<Value>,
}

impl FieldDescriptor {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        FieldDescriptor {
            name: name.to_string(),
            field_type,
            attrs: Vec::new(),
            default: None,
        }
    }

    /// Chemin source : l'attribut Link, sinon le nom du champ.
    pub fn link_path(&self) -> &str {
        self.attrs
            .iter()
            .find_map(|a| match a {
                FieldAttr::Link(path) => Some(path.as_str()),
                _ => None,
            })
            .unwrap_or(&self.name)
    }

    pub fn is_ignored(&self) -> bool {
        self.attrs.contains(&FieldAttr::Ignored)
    }

    pub fn is_negated(&self) -> bool {
        self.attrs.contains(&FieldAttr::Negate)
    }

    pub fn is_id(&self) -> bool {
        self.attrs.contains(&FieldAttr::Id)
    }

    pub fn is_in(&self) -> bool {
        self.attrs.contains(&FieldAttr::In)
    }

    pub fn range_bound(&self) -> Option<RangeBound> {
        self.attrs.iter().find_map(|a| match a {
            FieldAttr::RangeFrom { exclusive } => Some(RangeBound::From { exclusive: *exclusive }),
            FieldAttr::RangeTo { exclusive } => Some(RangeBound::To { exclusive: *exclusive }),
            _ => None,
        })
    }

    /// Some(sensibilité) si le champ porte l'attribut Like.
    pub fn like(&self) -> Option<Option<bool>> {
        self.attrs.iter().find_map(|a| match a {
            FieldAttr::Like { case_sensitive } => Some(*case_sensitive),
            _ => None,
        })
    }

    /// Some(true) pour IsNull, Some(false) pour IsNotNull.
    pub fn null_check(&self) -> Option<bool> {
        self.attrs.iter().find_map(|a| match a {
            FieldAttr::IsNull => Some(true),
            FieldAttr::IsNotNull => Some(false),
            _ => None,
        })
    }

    pub fn contains(&self) -> Option<&FieldType> {
        self.attrs.iter().find_map(|a| match a {
            FieldAttr::Contains(t) => Some(t),
            _ => None,
        })
    }

    pub fn mapped_by(&self) -> Option<&str> {
        self.attrs.iter().find_map(|a| match a {
            FieldAttr::MappedBy(attr) => Some(attr.as_str()),
            _ => None,
        })
    }

    /// Type d'élément effectif : override Contains, sinon celui déclaré.
    pub fn element_type(&self) -> Option<FieldType> {
        match self.contains() {
            Some(t) => Some(t.clone()),
            None => self.field_type.element_type().cloned(),
        }
    }
}

/// Propriété calculée (accesseur sans champ de stockage).
#[derive(Clone)]
pub struct ComputedProperty {
    pub name: String,
    pub field_type: FieldType,
    pub getter: Getter,
}

impl fmt::Debug for ComputedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedProperty")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .finish()
    }
}

/// Rôle d'un type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Entity,
    Embeddable,
    Projection { source: String },
    Plain,
}

/// Le descripteur complet d'un type.
#[derive(Clone)]
pub struct TypeDescriptor {
    pub name: String,
    pub kind: TypeKind,
    pub supertype: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    pub computed: Vec<ComputedProperty>,
    pub specs: Option<InstanceSpecs>,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("supertype", &self.supertype)
            .field("fields", &self.fields)
            .field("computed", &self.computed)
            .field("specs", &self.specs.is_some())
            .finish()
    }
}

impl TypeDescriptor {
    fn with_kind(name: &str, kind: TypeKind) -> Self {
        TypeDescriptor {
            name: name.to_string(),
            kind,
            supertype: None,
            fields: Vec::new(),
            computed: Vec::new(),
            specs: None,
        }
    }

    pub fn entity(name: &str) -> Self {
        Self::with_kind(name, TypeKind::Entity)
    }

    pub fn embeddable(name: &str) -> Self {
        Self::with_kind(name, TypeKind::Embeddable)
    }

    /// Projection liée au type source `source`.
    pub fn projection(name: &str, source: &str) -> Self {
        Self::with_kind(name, TypeKind::Projection { source: source.to_string() })
    }

    pub fn plain(name: &str) -> Self {
        Self::with_kind(name, TypeKind::Plain)
    }

    pub fn extends(mut self, supertype: &str) -> Self {
        self.supertype = Some(supertype.to_string());
        self
    }

    pub fn field(self, name: &str, field_type: FieldType) -> Self {
        self.field_with(name, field_type, [])
    }

    pub fn field_with(
        mut self,
        name: &str,
        field_type: FieldType,
        attrs: impl IntoIterator<Item = FieldAttr>,
    ) -> Self {
        let mut field = FieldDescriptor::new(name, field_type);
        field.attrs.extend(attrs);
        self.fields.push(field);
        self
    }

    /// Clé primaire (raccourci pour `field_with(.., [FieldAttr::Id])`).
    pub fn id(self, name: &str, field_type: FieldType) -> Self {
        self.field_with(name, field_type, [FieldAttr::Id])
    }

    /// Valeur initiale du DERNIER champ déclaré.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.default = Some(value.into());
        }
        self
    }

    pub fn computed<F>(mut self, name: &str, field_type: FieldType, getter: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.computed.push(ComputedProperty {
            name: name.to_string(),
            field_type,
            getter: Arc::new(getter),
        });
        self
    }

    /// Rend la projection auto-spécifiante : son prédicat est ajouté (AND)
    /// au prédicat dérivé de ses champs.
    pub fn specs<F>(mut self, specs: F) -> Self
    where
        F: Fn(&Record) -> Specs + Send + Sync + 'static,
    {
        self.specs = Some(Arc::new(specs));
        self
    }

    pub fn is_entity(&self) -> bool {
        self.kind == TypeKind::Entity
    }

    pub fn is_projection(&self) -> bool {
        matches!(self.kind, TypeKind::Projection { .. })
    }

    /// Type source d'une projection.
    pub fn source(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Projection { source } => Some(source),
            _ => None,
        }
    }

    /// Champ déclaré directement sur ce type (sans le supertype).
    pub fn own_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn own_computed(&self, name: &str) -> Option<&ComputedProperty> {
        self.computed.iter().find(|c| c.name == name)
    }
}

/// Une énumération : liste ordonnée de constantes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumDescriptor {
    pub fn new<I, S>(name: &str, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EnumDescriptor {
            name: name.to_string(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Constante par nom.
    pub fn value(&self, name: &str) -> Option<EnumValue> {
        let ordinal = self.variants.iter().position(|v| v == name)?;
        Some(self.make(ordinal))
    }

    /// Constante par position de déclaration.
    pub fn at(&self, ordinal: usize) -> Option<EnumValue> {
        if ordinal < self.variants.len() {
            Some(self.make(ordinal))
        } else {
            None
        }
    }

    fn make(&self, ordinal: usize) -> EnumValue {
        EnumValue {
            enum_type: self.name.clone(),
            name: self.variants[ordinal].clone(),
            ordinal,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_path_defaults_to_name() {
        let dto = TypeDescriptor::projection("ClientDto", "Client")
            .field("birthday", FieldType::DateTime)
            .field_with("name", FieldType::String, [FieldAttr::link("personalData.name")]);
        assert_eq!(dto.own_field("birthday").map(|f| f.link_path()), Some("birthday"));
        assert_eq!(dto.own_field("name").map(|f| f.link_path()), Some("personalData.name"));
        assert_eq!(dto.source(), Some("Client"));
    }

    #[test]
    fn test_default_value_applies_to_last_field() {
        let dto = TypeDescriptor::plain("Holder")
            .field("a", FieldType::String)
            .field("b", FieldType::Integer)
            .default_value(7i64);
        assert_eq!(dto.own_field("a").and_then(|f| f.default.clone()), None);
        assert_eq!(dto.own_field("b").and_then(|f| f.default.clone()), Some(Value::Integer(7)));
    }

    #[test]
    fn test_attribute_queries() {
        let field = FieldDescriptor {
            attrs: vec![FieldAttr::RangeTo { exclusive: true }, FieldAttr::Negate],
            ..FieldDescriptor::new("birthdayTo", FieldType::DateTime)
        };
        assert_eq!(field.range_bound(), Some(RangeBound::To { exclusive: true }));
        assert!(field.is_negated());
        assert_eq!(field.like(), None);
        assert_eq!(field.null_check(), None);
    }

    #[test]
    fn test_element_type_honors_contains() {
        let field = FieldDescriptor {
            attrs: vec![FieldAttr::Contains(FieldType::object("AccountDto"))],
            ..FieldDescriptor::new("accounts", FieldType::set(FieldType::Any))
        };
        assert_eq!(field.element_type(), Some(FieldType::object("AccountDto")));
    }

    #[test]
    fn test_enum_lookup() {
        let gender = EnumDescriptor::new("Gender", ["M", "F"]);
        assert_eq!(gender.value("F").map(|v| v.ordinal), Some(1));
        assert_eq!(gender.at(0).map(|v| v.name), Some("M".to_string()));
        assert!(gender.at(2).is_none());
        assert!(gender.value("X").is_none());
    }
}
