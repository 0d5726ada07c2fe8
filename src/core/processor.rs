// =============================================================================
// PROCESSOR — Enregistrement, projection, fusion, compilation de filtres
// =============================================================================
//
// Le processeur est le point d'entrée du moteur :
//
//   1. CONFIGURATION (une fois, `&mut self`)
//        declare / declare_enum → décrire les types dans le cache
//        add / register         → désigner les projections à lier
//        configure              → construire toutes les chaînes
//
//   2. REQUÊTES (`&self`, partageable entre threads)
//        project / project_all  → source → projection
//        merge / merge_into     → projection → source
//        merge_paths            → chemins source → source
//        compile_predicate      → filtres nommés → Specs
//        compile_instance_predicate → instance de filtrage → Specs
//
// Un échec de construction ne concerne que son type : `configure` rend la
// liste des erreurs, les autres types restent utilisables.
//
// =============================================================================

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::ProcessorConfig;

use super::cache::TypeCache;
use super::chain::{ChainBuilder, ExecContext};
use super::convert::Converter;
use super::error::{LinkError, LinkResult};
use super::filter::{Filter, FilterMap, Range};
use super::instance::Record;
use super::mapping::MappingMetadata;
use super::path;
use super::query::{AttributePath, Predicate, QueryContext, Specs};
use super::schema::{EnumDescriptor, RangeBound, TypeDescriptor};
use super::typeside::{FieldType, Value};
use super::validate::{self, ValidationError};

/// Recherche d'une entité par clé primaire (relation par clé).
pub trait RelationLookup: Send + Sync {
    fn lookup(&self, entity_type: &str, key: &Value) -> LinkResult<Option<Record>>;
}

/// Critère dérivé d'une instance de filtrage, avant résolution des JOINs.
#[derive(Debug, Clone)]
enum Derived {
    Leaf { path: String, filter: Filter },
    Nested { path: String, negated: bool, children: Vec<Derived> },
    Custom(Specs),
}

/// Le processeur de liens.
pub struct Processor {
    cache: Arc<TypeCache>,
    config: ProcessorConfig,
    lookup: Option<Arc<dyn RelationLookup>>,
    registered: BTreeSet<String>,
    metadata: HashMap<String, Arc<MappingMetadata>>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("config", &self.config)
            .field("registered", &self.registered)
            .field("configured", &self.metadata.len())
            .field("lookup", &self.lookup.is_some())
            .finish()
    }
}

impl Processor {
    pub fn new(cache: Arc<TypeCache>) -> Self {
        Processor {
            cache,
            config: ProcessorConfig::default(),
            lookup: None,
            registered: BTreeSet::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Active l'extension relation-par-clé.
    pub fn with_lookup(mut self, lookup: Arc<dyn RelationLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn cache(&self) -> &TypeCache {
        &self.cache
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn lookup(&self) -> Option<&dyn RelationLookup> {
        self.lookup.as_deref()
    }

    // ─── Enregistrement ───────────────────────────────────────────

    pub fn declare(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        self.cache.declare(descriptor);
        self
    }

    pub fn declare_enum(&mut self, descriptor: EnumDescriptor) -> &mut Self {
        self.cache.declare_enum(descriptor);
        self
    }

    /// Désigne une projection déjà déclarée. Idempotent.
    pub fn add(&mut self, projection_type: &str) -> LinkResult<&mut Self> {
        let descriptor = self
            .cache
            .descriptor(projection_type)
            .map_err(|e| LinkError::establishing(projection_type, e))?;
        if !descriptor.is_projection() {
            return Err(LinkError::establishing(
                projection_type,
                LinkError::NotProcessable(projection_type.to_string()),
            ));
        }
        if self.registered.insert(projection_type.to_string()) {
            debug!(projection = projection_type, "projection enregistrée");
        }
        Ok(self)
    }

    /// Déclare puis désigne une projection.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> LinkResult<&mut Self> {
        let name = descriptor.name.clone();
        self.cache.declare(descriptor);
        self.add(&name)
    }

    /// Construit les chaînes de toutes les projections désignées et pas
    /// encore configurées. Les types en échec sont rendus, les autres liés.
    pub fn configure(&mut self) -> Result<(), Vec<LinkError>> {
        let pending: Vec<String> = self
            .registered
            .iter()
            .filter(|name| !self.metadata.contains_key(*name))
            .cloned()
            .collect();

        let mut built = Vec::new();
        let mut errors = Vec::new();
        {
            let builder = ChainBuilder::new(self);
            for name in pending {
                match MappingMetadata::build(&builder, &name) {
                    Ok(meta) => built.push(meta),
                    Err(e) => errors.push(LinkError::establishing(&name, e)),
                }
            }
        }
        for meta in built {
            debug!(projection = %meta.projection_type, source = %meta.source_type, fields = meta.mappings().len(), "projection configurée");
            self.metadata.insert(meta.projection_type.clone(), Arc::new(meta));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Vérifie toutes les déclarations du cache d'un coup.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validate::validate_declarations(&self.cache)
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.registered.contains(type_name)
    }

    /// La projection est-elle liée et utilisable ?
    pub fn is_processable(&self, type_name: &str) -> bool {
        self.metadata.contains_key(type_name)
    }

    pub fn metadata(&self, projection_type: &str) -> LinkResult<&MappingMetadata> {
        self.metadata
            .get(projection_type)
            .map(|m| m.as_ref())
            .ok_or_else(|| LinkError::NotProcessable(projection_type.to_string()))
    }

    /// Type source d'une projection déclarée.
    pub fn source_of(&self, projection_type: &str) -> LinkResult<String> {
        let descriptor = self.cache.descriptor(projection_type)?;
        descriptor
            .source()
            .map(str::to_string)
            .ok_or_else(|| LinkError::NotProcessable(projection_type.to_string()))
    }

    // ─── Projection ───────────────────────────────────────────────

    /// Projette `source` vers `projection_type` ; absent reste absent.
    pub fn project(&self, source: Option<&Record>, projection_type: &str) -> LinkResult<Option<Record>> {
        match source {
            None => Ok(None),
            Some(record) => self.project_nested(record, projection_type, 0).map(Some),
        }
    }

    pub fn project_all(&self, sources: &[Record], projection_type: &str) -> LinkResult<Vec<Record>> {
        sources
            .iter()
            .map(|s| self.project_nested(s, projection_type, 0))
            .collect()
    }

    pub(crate) fn project_nested(&self, source: &Record, projection_type: &str, depth: usize) -> LinkResult<Record> {
        self.do_project(source, projection_type, depth)
            .map_err(|e| LinkError::processing(Some(source), projection_type, e))
    }

    fn do_project(&self, source: &Record, projection_type: &str, depth: usize) -> LinkResult<Record> {
        if depth > self.config.max_depth {
            return Err(LinkError::DepthExceeded(self.config.max_depth));
        }
        let meta = self.metadata(projection_type)?;
        trace!(projection = projection_type, source = source.type_name(), depth, "projection");
        let mut projection = self.cache.instantiate(projection_type)?;
        for mapping in meta.mappings() {
            let value = {
                let ctx = ExecContext {
                    processor: self,
                    target: Some(&projection),
                    depth,
                };
                mapping.read.read(source, &ctx)?
            };
            projection.set(&mapping.field, value);
        }
        Ok(projection)
    }

    // ─── Fusion ───────────────────────────────────────────────────

    /// Fusionne `projection` dans `source` et rend la source ; absente
    /// reste absente.
    pub fn merge(&self, source: Option<Record>, projection: &Record) -> LinkResult<Option<Record>> {
        match source {
            None => Ok(None),
            Some(mut record) => {
                self.merge_into(&mut record, projection)?;
                Ok(Some(record))
            }
        }
    }

    pub fn merge_into(&self, source: &mut Record, projection: &Record) -> LinkResult<()> {
        let projection_type = projection.type_name().to_string();
        self.merge_nested(source, projection, &projection_type, 0)
    }

    pub(crate) fn merge_nested(
        &self,
        source: &mut Record,
        projection: &Record,
        projection_type: &str,
        depth: usize,
    ) -> LinkResult<()> {
        if depth > self.config.max_depth {
            return Err(LinkError::processing(
                Some(source),
                projection_type,
                LinkError::DepthExceeded(self.config.max_depth),
            ));
        }
        let meta = self
            .metadata(projection_type)
            .map_err(|e| LinkError::processing(Some(source), projection_type, e))?;
        trace!(projection = projection_type, source = source.type_name(), depth, "fusion");
        let ctx = ExecContext {
            processor: self,
            target: None,
            depth,
        };
        for mapping in meta.mappings() {
            mapping
                .write
                .write(source, projection.get(&mapping.field), &ctx)
                .map_err(|e| LinkError::processing(Some(source), projection_type, e))?;
        }
        Ok(())
    }

    /// Écrit des valeurs désignées par des chemins du type SOURCE.
    pub fn merge_paths(&self, source: &mut Record, values: &BTreeMap<String, Value>) -> LinkResult<()> {
        let source_type = source.type_name().to_string();
        let builder = ChainBuilder::new(self);
        let ctx = ExecContext {
            processor: self,
            target: None,
            depth: 0,
        };
        for (path, value) in values {
            builder
                .write(path, &source_type, &FieldType::of(value))
                .and_then(|chain| chain.write(source, value, &ctx))
                .map_err(|e| LinkError::processing(Some(source), &source_type, e))?;
        }
        Ok(())
    }

    // ─── Chemins ──────────────────────────────────────────────────

    pub fn resolve_path(&self, projection_type: &str, reference: &str) -> LinkResult<String> {
        path::resolve_path(&self.cache, projection_type, reference, &self.config.path_separator)
    }

    /// Chemin d'attribut de requête pour une référence de projection.
    pub fn to_query_path(
        &self,
        projection_type: &str,
        reference: &str,
        ctx: &mut QueryContext<'_>,
    ) -> LinkResult<AttributePath> {
        let source_path = self.resolve_path(projection_type, reference)?;
        ctx.source_path(&source_path)
    }

    /// Contexte de requête enraciné sur la source de la projection.
    pub fn query_context(&self, projection_type: &str) -> LinkResult<QueryContext<'_>> {
        Ok(QueryContext::new(self, &self.source_of(projection_type)?))
    }

    // ─── Compilation de filtres ───────────────────────────────────

    /// Compile des filtres nommés par référence de projection. Les
    /// références sont résolues immédiatement ; les JOINs à la construction.
    pub fn compile_predicate(&self, filters: &FilterMap, projection_type: &str) -> LinkResult<Specs> {
        self.source_of(projection_type)?;
        let leaves = filters
            .iter()
            .map(|(reference, filter)| {
                let path = self.resolve_path(projection_type, reference)?;
                Ok(Derived::Leaf { path, filter: filter.clone() })
            })
            .collect::<LinkResult<Vec<_>>>()?;
        debug!(projection = projection_type, filters = leaves.len(), "filtres compilés");
        Ok(derived_specs(leaves))
    }

    /// Compile le prédicat implicite d'une instance de filtrage : chaque
    /// champ renseigné devient un critère, selon ses attributs.
    pub fn compile_instance_predicate(&self, instance: &Record) -> LinkResult<Specs> {
        let projection_type = instance.type_name();
        self.source_of(projection_type)?;
        let mut derived = self.derive(instance)?;
        if let Some(custom) = &self.cache.descriptor(projection_type)?.specs {
            derived.push(Derived::Custom((custom.as_ref())(instance)));
        }
        debug!(projection = projection_type, criteria = derived.len(), "instance de filtrage compilée");
        Ok(derived_specs(derived))
    }

    fn derive(&self, instance: &Record) -> LinkResult<Vec<Derived>> {
        let table = self.cache.fields(instance.type_name())?;
        let mut derived = Vec::new();
        for field in table.iter() {
            let value = instance.get(&field.name);
            if field.is_ignored() || value.is_null() {
                continue;
            }
            let path = field.link_path().to_string();

            let filter = if let Some(bound) = field.range_bound() {
                let range = match bound {
                    RangeBound::From { exclusive: false } => Range::new().from(value.clone())?,
                    RangeBound::From { exclusive: true } => Range::new().from_exclusive(value.clone())?,
                    RangeBound::To { exclusive: false } => Range::new().to(value.clone())?,
                    RangeBound::To { exclusive: true } => Range::new().to_exclusive(value.clone())?,
                };
                Filter::range(range)
            } else if let (Some(case), Value::String(text)) = (field.like(), value) {
                Filter::like_with_case(text, case.unwrap_or(self.config.like_case_sensitive))
            } else if let (true, Some(items)) = (field.is_in(), value.items()) {
                Filter::is_in(items.iter().cloned())
            } else if let (Some(is_null_attr), Value::Boolean(flag)) = (field.null_check(), value) {
                // IsNull : true → IS NULL ; IsNotNull : true → IS NOT NULL
                Filter::null(*flag == is_null_attr)
            } else if let Some(nested) = value.as_record().filter(|r| self.cache.is_projection(r.type_name())) {
                derived.push(Derived::Nested {
                    path,
                    negated: field.is_negated(),
                    children: self.derive(nested)?,
                });
                continue;
            } else {
                Filter::equals(value.clone())
            };

            let filter = if field.is_negated() { filter.negate() } else { filter };
            trace!(field = %field.name, path = %path, ?filter, "critère dérivé");
            derived.push(Derived::Leaf { path, filter });
        }
        Ok(derived)
    }
}

/// Specs différé : résout les chemins (et ouvre les JOINs) à la construction.
fn derived_specs(derived: Vec<Derived>) -> Specs {
    Specs::new(move |ctx| {
        let root = AttributePath::root(ctx.root_type());
        build_derived(ctx, &root, &derived)
    })
}

fn build_derived(ctx: &mut QueryContext<'_>, anchor: &AttributePath, derived: &[Derived]) -> LinkResult<Predicate> {
    let mut parts = Vec::with_capacity(derived.len());
    for item in derived {
        let predicate = match item {
            Derived::Leaf { path, filter } => {
                let attribute = ctx.source_path_from(anchor, path)?;
                let converter = Converter::new(ctx.processor().cache());
                filter.to_predicate(attribute, &converter)?
            }
            Derived::Nested { path, negated, children } => {
                let nested_anchor = ctx.anchor_path(anchor, path)?;
                let inner = build_derived(ctx, &nested_anchor, children)?;
                if *negated {
                    inner.negate()
                } else {
                    inner
                }
            }
            Derived::Custom(specs) => specs.build(ctx)?,
        };
        parts.push(predicate);
    }
    Ok(Predicate::and(parts))
}

// =============================================================================
// TESTS
// =============================================================================
