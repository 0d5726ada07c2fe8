// =============================================================================
// CHAIN — Construction et exécution des chaînes de mapping
// =============================================================================
//
// Une chaîne est une DONNÉE : une suite d'étapes construite une fois à la
// configuration, puis interprétée à chaque projection ou fusion.
//
// LECTURE (source → valeur de projection) pour `selectedAccount.state.amount` :
//
//   Get(selectedAccount) → Get(state) → Get(amount)
//
//   Une valeur absente court-circuite la suite : la chaîne rend NULL au lieu
//   d'échouer sur un intermédiaire manquant.
//
// ÉCRITURE (valeur de projection → mutation de la source) :
//
//   naviguer(selectedAccount) → naviguer(state) → Set(amount)
//
//   Un intermédiaire absent est instancié (valeurs par défaut du type),
//   de sorte que la feuille puisse toujours être écrite.
//
// La composition est associative : construire `a.b` puis `.c` ou `a` puis
// `.b.c` donne la même suite d'étapes.
//
// Les projections imbriquées sont référencées PAR NOM (étape Project) et
// résolues à l'exécution : la construction ne descend jamais dans les
// chaînes d'un autre type, ce qui rend les types auto-référencés sûrs.
//
// =============================================================================

use std::borrow::Cow;

use tracing::trace;

use super::error::{LinkError, LinkResult};
use super::extension::{relation_by_key, EnumConversion, ReadExtension};
use super::instance::{Collection, Record};
use super::path::split_head;
use super::processor::Processor;
use super::property::Property;
use super::schema::FieldDescriptor;
use super::typeside::{CollectionKind, FieldType, Value};

// ─── Étapes ───────────────────────────────────────────────────────

/// Une étape de lecture.
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Extraction d'une propriété de l'objet courant
    Get(Property),
    /// Tableau : chaîne appliquée à chaque élément
    Array(ReadChain),
    /// Collection : chaîne appliquée à chaque élément, sorte de la cible
    Collection {
        kind: CollectionKind,
        /// Champ de la projection dont la collection initiale est réutilisée
        field: Option<String>,
        element: ReadChain,
    },
    Enum(EnumConversion),
    /// Projection récursive vers le type nommé
    Project(String),
}

/// Une chaîne de lecture.
#[derive(Debug, Clone, Default)]
pub struct ReadChain {
    steps: Vec<ReadStep>,
}

/// Contexte d'exécution d'une chaîne.
pub struct ExecContext<'a> {
    pub processor: &'a Processor,
    /// Projection en cours de construction (réutilisation des collections)
    pub target: Option<&'a Record>,
    /// Profondeur de projection imbriquée
    pub depth: usize,
}

impl ReadChain {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[ReadStep] {
        &self.steps
    }

    fn prepend(mut self, step: ReadStep) -> Self {
        self.steps.insert(0, step);
        self
    }

    /// Lit la valeur de projection depuis un enregistrement source.
    pub fn read(&self, source: &Record, ctx: &ExecContext<'_>) -> LinkResult<Value> {
        match self.steps.split_first() {
            Some((ReadStep::Get(prop), rest)) => run(rest, prop.get(source), ctx),
            _ => run(&self.steps, Cow::Owned(Value::Object(source.clone())), ctx),
        }
    }

    /// Applique la chaîne à une valeur quelconque (éléments de collection).
    pub fn apply(&self, value: &Value, ctx: &ExecContext<'_>) -> LinkResult<Value> {
        run(&self.steps, Cow::Borrowed(value), ctx)
    }
}

fn run<'v>(steps: &[ReadStep], current: Cow<'v, Value>, ctx: &ExecContext<'_>) -> LinkResult<Value> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(current.into_owned());
    };
    if current.is_null() {
        return Ok(Value::Null);
    }
    match step {
        ReadStep::Get(prop) => match current {
            Cow::Borrowed(value) => {
                let record = expect_record(value, prop)?;
                run(rest, prop.get(record), ctx)
            }
            Cow::Owned(value) => {
                let record = expect_record(&value, prop)?;
                let next = prop.get(record).into_owned();
                run(rest, Cow::Owned(next), ctx)
            }
        },
        ReadStep::Array(element) => {
            let items = current.items().unwrap_or_default();
            let mapped = items
                .iter()
                .map(|item| element.apply(item, ctx))
                .collect::<LinkResult<Vec<_>>>()?;
            run(rest, Cow::Owned(Value::Array(mapped)), ctx)
        }
        ReadStep::Collection { kind, field, element } => {
            let mut collection = field
                .as_deref()
                .and_then(|name| ctx.target.map(|t| t.get(name)))
                .and_then(|existing| match existing {
                    Value::Collection(c) => Some(c.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| Collection::new(*kind));
            for item in current.items().unwrap_or_default() {
                collection.push(element.apply(item, ctx)?);
            }
            run(rest, Cow::Owned(Value::Collection(collection)), ctx)
        }
        ReadStep::Enum(conversion) => {
            let converted = conversion.apply(&current, ctx.processor.cache())?;
            run(rest, Cow::Owned(converted), ctx)
        }
        ReadStep::Project(type_name) => {
            let record = current
                .as_record()
                .ok_or_else(|| LinkError::path(type_name, "", format!("valeur non objet : {}", current)))?;
            let projected = ctx.processor.project_nested(record, type_name, ctx.depth + 1)?;
            run(rest, Cow::Owned(Value::Object(projected)), ctx)
        }
    }
}

fn expect_record<'v>(value: &'v Value, prop: &Property) -> LinkResult<&'v Record> {
    value
        .as_record()
        .ok_or_else(|| LinkError::path(prop.owner(), prop.name(), format!("valeur non objet : {}", value)))
}

/// Conversion appliquée avant l'écriture terminale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteConversion {
    None,
    Enum(EnumConversion),
    /// Réemballe les éléments dans la sorte de collection de la source
    Recollect(CollectionKind),
}

/// L'étape terminale d'une écriture.
#[derive(Debug, Clone)]
pub enum WriteTerminal {
    /// Écriture directe après conversion
    Set { property: Property, conversion: WriteConversion },
    /// Recherche de l'entité par clé (la chaîne s'arrête là)
    RelationByKey { property: Property, entity_type: String },
    /// Fusion récursive d'une projection imbriquée
    Merge { property: Property, projection_type: String },
    /// Propriété en lecture seule : aucune écriture
    ReadOnly,
}

/// Une chaîne d'écriture.
#[derive(Debug, Clone)]
pub struct WriteChain {
    navigation: Vec<Property>,
    terminal: WriteTerminal,
}

impl WriteChain {
    pub fn read_only() -> Self {
        WriteChain {
            navigation: Vec::new(),
            terminal: WriteTerminal::ReadOnly,
        }
    }

    pub fn terminal(&self) -> &WriteTerminal {
        &self.terminal
    }

    pub fn navigation(&self) -> &[Property] {
        &self.navigation
    }

    /// Écrit `value` dans `source`, en instanciant les intermédiaires absents.
    pub fn write(&self, source: &mut Record, value: &Value, ctx: &ExecContext<'_>) -> LinkResult<()> {
        if let WriteTerminal::ReadOnly = self.terminal {
            return Ok(());
        }
        let cache = ctx.processor.cache();
        let mut target: &mut Record = source;
        for prop in &self.navigation {
            let slot = prop.get_mut(target)?;
            if slot.is_null() {
                let type_name = prop.field_type().object_name().unwrap_or_default();
                *slot = Value::Object(cache.instantiate(type_name)?);
            }
            target = slot.as_record_mut().ok_or_else(|| LinkError::NotInstantiable {
                type_name: prop.owner().to_string(),
                property: prop.name().to_string(),
                field_type: prop.field_type().to_string(),
            })?;
        }

        match &self.terminal {
            WriteTerminal::ReadOnly => Ok(()),
            WriteTerminal::Set { property, conversion } => {
                let converted = match conversion {
                    WriteConversion::None => value.clone(),
                    WriteConversion::Enum(conv) => conv.apply(value, cache)?,
                    WriteConversion::Recollect(kind) => match value.items() {
                        Some(items) => Value::Collection(Collection::from_items(*kind, items.iter().cloned())),
                        None => value.clone(),
                    },
                };
                property.set(target, converted)
            }
            WriteTerminal::RelationByKey { property, entity_type } => {
                if value.is_null() {
                    return property.set(target, Value::Null);
                }
                let lookup = ctx
                    .processor
                    .lookup()
                    .ok_or_else(|| LinkError::Config("aucune recherche de relation injectée".into()))?;
                let entity = lookup.lookup(entity_type, value)?.ok_or_else(|| LinkError::RelationNotFound {
                    entity_type: entity_type.clone(),
                    key: value.to_string(),
                })?;
                property.set(target, Value::Object(entity))
            }
            WriteTerminal::Merge { property, projection_type } => {
                let Some(nested) = value.as_record() else {
                    return property.set(target, Value::Null);
                };
                let slot = property.get_mut(target)?;
                if slot.is_null() {
                    let type_name = property.field_type().object_name().unwrap_or_default();
                    *slot = Value::Object(cache.instantiate(type_name)?);
                }
                match slot.as_record_mut() {
                    Some(child) => ctx.processor.merge_nested(child, nested, projection_type, ctx.depth + 1),
                    None => Err(LinkError::NotInstantiable {
                        type_name: property.owner().to_string(),
                        property: property.name().to_string(),
                        field_type: property.field_type().to_string(),
                    }),
                }
            }
        }
    }
}

// ─── Construction ─────────────────────────────────────────────────

/// Constructeur de chaînes, adossé au processeur (cache, enregistrements,
/// recherche de relations, configuration).
pub struct ChainBuilder<'a> {
    processor: &'a Processor,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(processor: &'a Processor) -> Self {
        ChainBuilder { processor }
    }

    pub fn processor(&self) -> &'a Processor {
        self.processor
    }

    fn separator(&self) -> &str {
        &self.processor.config().path_separator
    }

    /// Chaîne de lecture de `path` depuis une valeur de type `source` vers
    /// une valeur de type `target`.
    pub fn read(
        &self,
        path: &str,
        source: &FieldType,
        target: &FieldType,
        field: Option<&FieldDescriptor>,
    ) -> LinkResult<ReadChain> {
        if path.is_empty() {
            return match self.applicable(path, source, target, field) {
                Some(ext) => Ok(ReadChain { steps: vec![ext.build(self, path, source, target, field)?] }),
                None => Ok(ReadChain::identity()),
            };
        }

        let (head, tail) = split_head(path, self.separator());
        let owner = source
            .object_name()
            .ok_or_else(|| LinkError::path(&source.to_string(), path, "segment sur une valeur non objet"))?;
        let prop = self.processor.cache().property(owner, head)?;
        let current = prop.field_type().clone();
        trace!(owner, segment = head, field_type = %current, "segment de lecture");

        let chain = if let Some(ext) = self.applicable(tail, &current, target, field) {
            ReadChain { steps: vec![ext.build(self, tail, &current, target, field)?] }
        } else if !tail.is_empty() {
            self.read(tail, &current, target, field)?
        } else {
            ReadChain::identity()
        };
        Ok(chain.prepend(ReadStep::Get(prop)))
    }

    fn applicable(
        &self,
        remaining: &str,
        source: &FieldType,
        target: &FieldType,
        field: Option<&FieldDescriptor>,
    ) -> Option<ReadExtension> {
        ReadExtension::PRIORITY
            .into_iter()
            .find(|ext| ext.is_applicable(self, remaining, source, target, field))
    }

    /// Chaîne d'écriture de `path` sur le type source `source_type`, pour
    /// une valeur de projection de type `target`.
    pub fn write(&self, path: &str, source_type: &str, target: &FieldType) -> LinkResult<WriteChain> {
        let cache = self.processor.cache();
        let separator = self.separator();
        let mut navigation = Vec::new();
        let mut owner = source_type.to_string();
        let mut remaining = path;

        loop {
            let (head, tail) = split_head(remaining, separator);
            let prop = cache.property(&owner, head)?;
            if !prop.is_writable() {
                trace!(owner = %owner, segment = head, "propriété en lecture seule : écriture ignorée");
                return Ok(WriteChain::read_only());
            }

            if tail.is_empty() {
                let terminal = self.terminal(prop, target)?;
                return Ok(WriteChain { navigation, terminal });
            }

            if self.processor.lookup().is_some() {
                if let Some(entity_type) = relation_by_key(cache, prop.field_type(), tail) {
                    return Ok(WriteChain {
                        navigation,
                        terminal: WriteTerminal::RelationByKey { property: prop, entity_type },
                    });
                }
            }

            if prop.field_type().is_plural() {
                trace!(owner = %owner, segment = head, "navigation à travers une collection : écriture ignorée");
                return Ok(WriteChain::read_only());
            }

            let next = match prop.field_type().object_name() {
                Some(name) if cache.fields(name).is_ok() => name.to_string(),
                _ => {
                    return Err(LinkError::NotInstantiable {
                        type_name: owner,
                        property: head.to_string(),
                        field_type: prop.field_type().to_string(),
                    })
                }
            };
            navigation.push(prop);
            owner = next;
            remaining = tail;
        }
    }

    fn terminal(&self, property: Property, target: &FieldType) -> LinkResult<WriteTerminal> {
        let source = property.field_type().clone();

        if let (Some(projection), FieldType::Object(_)) = (target.object_name(), &source) {
            if self.processor.is_registered(projection) {
                return Ok(WriteTerminal::Merge {
                    property,
                    projection_type: projection.to_string(),
                });
            }
        }

        let projects_elements = target
            .element_type()
            .and_then(FieldType::object_name)
            .is_some_and(|name| self.processor.is_registered(name));
        if projects_elements {
            return Ok(WriteTerminal::ReadOnly);
        }

        let conversion = if source.is_enum() || target.is_enum() {
            match EnumConversion::between(target, &source)? {
                EnumConversion::Identity => WriteConversion::None,
                conv => WriteConversion::Enum(conv),
            }
        } else if let (FieldType::Collection(kind, _), true) = (&source, target.is_plural()) {
            WriteConversion::Recollect(*kind)
        } else {
            WriteConversion::None
        };
        Ok(WriteTerminal::Set { property, conversion })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TypeCache;
    use crate::core::processor::RelationLookup;
    use crate::core::schema::TypeDescriptor;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    struct NoAccounts;

    impl RelationLookup for NoAccounts {
        fn lookup(&self, _entity_type: &str, _key: &Value) -> LinkResult<Option<Record>> {
            Ok(None)
        }
    }

    fn cache() -> Arc<TypeCache> {
        let cache = TypeCache::new();
        cache.declare(
            TypeDescriptor::entity("Client")
                .id("uid", FieldType::Integer)
                .field("personalData", FieldType::object("PersonalData"))
                .field("selectedAccount", FieldType::object("Account")),
        );
        cache.declare(TypeDescriptor::embeddable("PersonalData").field("name", FieldType::String));
        cache.declare(
            TypeDescriptor::entity("Account")
                .id("number", FieldType::String)
                .field("state", FieldType::object("AccountState")),
        );
        cache.declare(TypeDescriptor::embeddable("AccountState").field("amount", FieldType::Decimal));
        Arc::new(cache)
    }

    fn exec(p: &Processor) -> ExecContext<'_> {
        ExecContext { processor: p, target: None, depth: 0 }
    }

    #[test]
    fn test_read_follows_path() {
        let p = Processor::new(cache());
        let chain = ChainBuilder::new(&p)
            .read("personalData.name", &FieldType::object("Client"), &FieldType::String, None)
            .expect("chaîne");
        assert_eq!(chain.steps().len(), 2);
        let client = Record::new("Client").with("personalData", Record::new("PersonalData").with("name", "Yurii"));
        assert_eq!(chain.read(&client, &exec(&p)).expect("lecture"), Value::from("Yurii"));
    }

    #[test]
    fn test_read_short_circuits_on_absent_intermediate() {
        let p = Processor::new(cache());
        let chain = ChainBuilder::new(&p)
            .read("selectedAccount.state.amount", &FieldType::object("Client"), &FieldType::Decimal, None)
            .expect("chaîne");
        let client = Record::new("Client").with("uid", 1i64);
        assert_eq!(chain.read(&client, &exec(&p)).expect("lecture"), Value::Null);
    }

    #[test]
    fn test_write_instantiates_intermediates() {
        let p = Processor::new(cache());
        let chain = ChainBuilder::new(&p)
            .write("selectedAccount.state.amount", "Client", &FieldType::Decimal)
            .expect("chaîne");
        assert_eq!(chain.navigation().len(), 2);

        let mut client = Record::new("Client");
        chain
            .write(&mut client, &Value::Decimal(Decimal::from(10)), &exec(&p))
            .expect("écriture");
        let amount = client
            .get("selectedAccount")
            .as_record()
            .map(|a| a.get("state"))
            .and_then(Value::as_record)
            .map(|s| s.get("amount").clone());
        assert_eq!(amount, Some(Value::Decimal(Decimal::from(10))));
    }

    #[test]
    fn test_relation_by_key_needs_a_lookup() {
        let without = Processor::new(cache());
        let chain = ChainBuilder::new(&without)
            .write("selectedAccount.number", "Client", &FieldType::String)
            .expect("chaîne");
        assert!(matches!(chain.terminal(), WriteTerminal::Set { .. }));

        let with = Processor::new(cache()).with_lookup(Arc::new(NoAccounts));
        let chain = ChainBuilder::new(&with)
            .write("selectedAccount.number", "Client", &FieldType::String)
            .expect("chaîne");
        match chain.terminal() {
            WriteTerminal::RelationByKey { entity_type, .. } => assert_eq!(entity_type, "Account"),
            other => panic!("attendu RelationByKey, obtenu {:?}", other),
        }

        let mut client = Record::new("Client");
        let err = chain.write(&mut client, &Value::from("UA-404"), &exec(&with));
        assert!(matches!(err, Err(LinkError::RelationNotFound { .. })));
        chain.write(&mut client, &Value::Null, &exec(&with)).expect("clé nulle");
        assert!(client.get("selectedAccount").is_null());
    }

    #[test]
    fn test_write_through_collection_is_read_only() {
        let cache = cache();
        cache.declare(
            TypeDescriptor::entity("Bank")
                .id("code", FieldType::String)
                .field("accounts", FieldType::list(FieldType::object("Account")))
                .field("vault", FieldType::array(FieldType::object("Account"))),
        );
        let p = Processor::new(cache);
        for path in ["accounts.number", "vault.state.amount"] {
            let chain = ChainBuilder::new(&p)
                .write(path, "Bank", &FieldType::list(FieldType::String))
                .expect("chaîne");
            assert!(matches!(chain.terminal(), WriteTerminal::ReadOnly), "chemin {}", path);
        }
    }

    #[test]
    fn test_write_through_scalar_fails() {
        let p = Processor::new(cache());
        let err = ChainBuilder::new(&p).write("uid.value", "Client", &FieldType::Integer);
        assert!(matches!(err, Err(LinkError::NotInstantiable { .. })));
    }
}
