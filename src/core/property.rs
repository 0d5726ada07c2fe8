// =============================================================================
// PROPERTY — Un accesseur nommé et typé sur un champ d'un type
// =============================================================================
//
// Une Property lie un nom de champ à sa lecture et son écriture sur un
// Record. Deux variantes :
//   - Field    → champ stocké : lecture, écriture, accès mutable
//   - Computed → accesseur calculé : lecture seule
//
// Les Properties sont construites paresseusement par le cache (cache.rs),
// une fois par (type, nom), puis partagées par les chaînes de mapping.
//
// =============================================================================

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::error::{LinkError, LinkResult};
use super::instance::Record;
use super::schema::{ComputedProperty, FieldDescriptor, Getter};
use super::typeside::{FieldType, Value};

#[derive(Clone)]
enum Access {
    Field(Arc<FieldDescriptor>),
    Computed(Getter),
}

/// Accesseur d'un champ (ou d'une propriété calculée) d'un type.
#[derive(Clone)]
pub struct Property {
    owner: String,
    name: String,
    field_type: FieldType,
    access: Access,
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.access {
            Access::Field(_) => "field",
            Access::Computed(_) => "computed",
        };
        write!(f, "Property({}.{}: {}, {})", self.owner, self.name, self.field_type, kind)
    }
}

impl Property {
    pub fn field(owner: &str, descriptor: Arc<FieldDescriptor>) -> Self {
        Property {
            owner: owner.to_string(),
            name: descriptor.name.clone(),
            field_type: descriptor.field_type.clone(),
            access: Access::Field(descriptor),
        }
    }

    pub fn computed(owner: &str, computed: &ComputedProperty) -> Self {
        Property {
            owner: owner.to_string(),
            name: computed.name.clone(),
            field_type: computed.field_type.clone(),
            access: Access::Computed(computed.getter.clone()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type du propriétaire (celui sur lequel la propriété a été résolue).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Descripteur du champ stocké, None pour une propriété calculée.
    pub fn descriptor(&self) -> Option<&FieldDescriptor> {
        match &self.access {
            Access::Field(d) => Some(d),
            Access::Computed(_) => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.access, Access::Field(_))
    }

    /// Lecture ; emprunte la valeur stockée, calcule sinon.
    pub fn get<'a>(&self, record: &'a Record) -> Cow<'a, Value> {
        match &self.access {
            Access::Field(_) => Cow::Borrowed(record.get(&self.name)),
            Access::Computed(getter) => Cow::Owned(getter(record)),
        }
    }

    /// Emplacement mutable du champ (créé à NULL si absent).
    pub fn get_mut<'a>(&self, record: &'a mut Record) -> LinkResult<&'a mut Value> {
        match &self.access {
            Access::Field(_) => Ok(record.slot(&self.name)),
            Access::Computed(_) => Err(self.read_only()),
        }
    }

    pub fn set(&self, record: &mut Record, value: Value) -> LinkResult<()> {
        match &self.access {
            Access::Field(_) => {
                record.set(&self.name, value);
                Ok(())
            }
            Access::Computed(_) => Err(self.read_only()),
        }
    }

    fn read_only(&self) -> LinkError {
        LinkError::ReadOnly {
            type_name: self.owner.clone(),
            property: self.name.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::TypeDescriptor;

    #[test]
    fn test_field_property_reads_and_writes() {
        let prop = Property::field("Account", Arc::new(FieldDescriptor::new("number", FieldType::String)));
        let mut account = Record::new("Account");
        assert!(prop.get(&account).is_null());
        prop.set(&mut account, Value::from("42")).expect("écriture");
        assert_eq!(prop.get(&account).into_owned(), Value::from("42"));
        assert!(prop.is_writable());
    }

    #[test]
    fn test_computed_property_is_read_only() {
        let descriptor = TypeDescriptor::plain("Person").computed("fullName", FieldType::String, |r| {
            Value::from(format!("{} {}", r.get("name").as_str().unwrap_or(""), r.get("surname").as_str().unwrap_or("")))
        });
        let prop = Property::computed("Person", &descriptor.computed[0]);
        let mut person = Record::new("Person").with("name", "John").with("surname", "Doe");
        assert_eq!(prop.get(&person).into_owned(), Value::from("John Doe"));
        assert!(!prop.is_writable());
        assert!(matches!(prop.set(&mut person, Value::Null), Err(LinkError::ReadOnly { .. })));
    }
}
