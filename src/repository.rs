// =============================================================================
// REPOSITORY — Recherches par projection sur un backend
// =============================================================================
//
// Le dépôt relie le processeur (chemins, filtres, projections) à un
// QueryBackend (exécution) :
//
//   filtres nommés   → compile_predicate          ┐
//   instance filtre  → compile_instance_predicate ┤→ Query → backend
//   tris             → to_query_path              ┘
//
//   find_all / find_page / find_one → projections du résultat
//   find_sources / find_one_source  → enregistrements sources bruts
//   count / count_matching / exists → comptages (distincts selon config)
//
// =============================================================================

use tracing::debug;

use crate::backend::{Order, Query, QueryBackend};
use crate::core::error::LinkResult;
use crate::core::filter::FilterMap;
use crate::core::instance::Record;
use crate::core::paging::{PagingAndSorting, Sheet};
use crate::core::processor::Processor;
use crate::core::query::Specs;

/// Recherches typées par projection.
pub struct Repository<'a, B: QueryBackend> {
    processor: &'a Processor,
    backend: &'a B,
}

impl<'a, B: QueryBackend> Repository<'a, B> {
    pub fn new(processor: &'a Processor, backend: &'a B) -> Self {
        Repository { processor, backend }
    }

    pub fn processor(&self) -> &'a Processor {
        self.processor
    }

    // ─── Par filtres nommés ───────────────────────────────────────

    /// Projections des sources appariées, triées et paginées.
    pub fn find_all(
        &self,
        filters: &FilterMap,
        paging: &PagingAndSorting,
        projection_type: &str,
    ) -> LinkResult<Vec<Record>> {
        let specs = self.processor.compile_predicate(filters, projection_type)?;
        let query = self.query(&specs, projection_type, Some(paging))?;
        let sources = self.backend.fetch(&query)?;
        debug!(projection = projection_type, found = sources.len(), "find_all");
        self.processor.project_all(&sources, projection_type)
    }

    /// Une page de projections, avec le total des sources appariées.
    pub fn find_page(
        &self,
        filters: &FilterMap,
        paging: &PagingAndSorting,
        projection_type: &str,
    ) -> LinkResult<Sheet<Record>> {
        let content = self.find_all(filters, paging, projection_type)?;
        let total = self.count(filters, projection_type)?;
        Ok(Sheet::new(content, total, paging.page_size))
    }

    pub fn count(&self, filters: &FilterMap, projection_type: &str) -> LinkResult<usize> {
        let specs = self.processor.compile_predicate(filters, projection_type)?;
        self.count_specs(&specs, projection_type)
    }

    /// Première projection appariée, s'il y en a une.
    pub fn find_one(&self, filters: &FilterMap, projection_type: &str) -> LinkResult<Option<Record>> {
        let found = self.find_all(filters, &PagingAndSorting::page(0, 1), projection_type)?;
        Ok(found.into_iter().next())
    }

    pub fn exists(&self, filters: &FilterMap, projection_type: &str) -> LinkResult<bool> {
        Ok(self.count(filters, projection_type)? > 0)
    }

    // ─── Par instance de filtrage ─────────────────────────────────

    pub fn count_matching(&self, filter: &Record) -> LinkResult<usize> {
        let specs = self.processor.compile_instance_predicate(filter)?;
        self.count_specs(&specs, filter.type_name())
    }

    /// Sources appariées à l'instance ; les tris référencent ses champs.
    pub fn find_sources(&self, filter: &Record, paging: &PagingAndSorting) -> LinkResult<Vec<Record>> {
        let specs = self.processor.compile_instance_predicate(filter)?;
        let query = self.query(&specs, filter.type_name(), Some(paging))?;
        let sources = self.backend.fetch(&query)?;
        debug!(filter = filter.type_name(), found = sources.len(), "find_sources");
        Ok(sources)
    }

    /// Une page de projections `projection_type` des sources appariées.
    pub fn find_matching(
        &self,
        filter: &Record,
        paging: &PagingAndSorting,
        projection_type: &str,
    ) -> LinkResult<Sheet<Record>> {
        let sources = self.find_sources(filter, paging)?;
        let total = self.count_matching(filter)?;
        let content = self.processor.project_all(&sources, projection_type)?;
        Ok(Sheet::new(content, total, paging.page_size))
    }

    pub fn find_one_source(&self, filter: &Record) -> LinkResult<Option<Record>> {
        let found = self.find_sources(filter, &PagingAndSorting::page(0, 1))?;
        Ok(found.into_iter().next())
    }

    // ─── Construction des requêtes ────────────────────────────────

    fn query(&self, specs: &Specs, projection_type: &str, paging: Option<&PagingAndSorting>) -> LinkResult<Query> {
        let mut ctx = self.processor.query_context(projection_type)?;
        let predicate = specs.build(&mut ctx)?;
        let Some(paging) = paging else {
            return Ok(Query::from_context(ctx, predicate));
        };
        let order = paging
            .sortings
            .iter()
            .map(|s| {
                Ok(Order {
                    path: self.processor.to_query_path(projection_type, &s.reference, &mut ctx)?,
                    ascending: s.direction.is_ascending(),
                })
            })
            .collect::<LinkResult<Vec<_>>>()?;
        Ok(Query::from_context(ctx, predicate)
            .with_order(order)
            .with_page(paging.offset(), paging.limit()))
    }

    fn count_specs(&self, specs: &Specs, projection_type: &str) -> LinkResult<usize> {
        let query = self.query(specs, projection_type, None)?;
        let distinct = self.processor.config().distinct_count;
        let count = self.backend.count(&query, distinct)?;
        debug!(projection = projection_type, distinct, count, "comptage");
        Ok(count)
    }
}
