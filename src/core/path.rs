// =============================================================================
// PATH — Résolution des références pointillées
// =============================================================================
//
// Deux directions :
//
//   1. PROJECTION → SOURCE : `resolve_path(ClientDto, "selectedAccount.amount")`
//      lit l'attribut link de chaque segment et descend dans le type déclaré
//      du champ, jusqu'à obtenir la référence équivalente côté source :
//        "selectedAccount.state.amount"
//
//   2. SOURCE → REQUÊTE : `walk_source_path` parcourt une référence source
//      et ouvre un JOIN LEFT à chaque attribut relationnel (entité ou
//      collection d'entités). Les objets embarqués restent de simples
//      attributs.
//
//      Client.selectedAccount.state.amount
//        → JOIN j1 = r.selectedAccount ; attribut j1.state.amount
//
// Le séparateur de segments est configurable (`.` par défaut).
//
// =============================================================================

use super::cache::TypeCache;
use super::error::{LinkError, LinkResult};
use super::query::{AttributePath, JoinKind, QueryContext};
use super::typeside::FieldType;

/// Sépare le premier segment du reste : `"a.b.c"` → `("a", "b.c")`.
pub fn split_head<'a>(reference: &'a str, separator: &str) -> (&'a str, &'a str) {
    match reference.split_once(separator) {
        Some((head, tail)) => (head, tail),
        None => (reference, ""),
    }
}

/// Nom du type dans lequel descendre depuis un champ : le type objet, ou
/// le type d'élément pour une collection ou un tableau.
fn navigable_type(field_type: &FieldType) -> Option<&str> {
    match field_type {
        FieldType::Object(name) => Some(name),
        FieldType::Array(e) | FieldType::Collection(_, e) => navigable_type(e),
        _ => None,
    }
}

/// Référence équivalente côté source pour une référence de projection.
pub fn resolve_path(
    cache: &TypeCache,
    projection_type: &str,
    reference: &str,
    separator: &str,
) -> LinkResult<String> {
    let (head, tail) = split_head(reference, separator);
    let table = cache
        .fields(projection_type)
        .map_err(|e| LinkError::path(projection_type, reference, e.to_string()))?;
    let field = table
        .get(head)
        .ok_or_else(|| LinkError::path(projection_type, reference, format!("champ '{}' absent", head)))?;
    let link = field.link_path();
    if tail.is_empty() {
        return Ok(link.to_string());
    }
    let next = field
        .contains()
        .and_then(navigable_type)
        .or_else(|| navigable_type(&field.field_type))
        .ok_or_else(|| {
            LinkError::path(
                projection_type,
                reference,
                format!("'{}' ({}) n'a pas de sous-champs", head, field.field_type),
            )
        })?;
    let rest = resolve_path(cache, next, tail, separator)?;
    Ok(format!("{}{}{}", link, separator, rest))
}

/// Parcourt une référence source depuis un ancrage et ouvre les JOINs
/// nécessaires. Avec `join_terminal`, une relation en fin de chemin est
/// jointe elle aussi.
pub fn walk_source_path(
    ctx: &mut QueryContext<'_>,
    anchor: &AttributePath,
    reference: &str,
    join_terminal: bool,
) -> LinkResult<AttributePath> {
    let processor = ctx.processor();
    let cache = processor.cache();
    let separator = processor.config().path_separator.clone();

    let mut join = anchor.join;
    let mut prefix = anchor.attributes.clone();
    let mut current = navigable_type(&anchor.value_type)
        .ok_or_else(|| LinkError::path(ctx.root_type(), reference, "l'ancrage n'est pas un objet"))?
        .to_string();
    let mut value_type = anchor.value_type.clone();

    let segments: Vec<&str> = reference.split(separator.as_str()).filter(|s| !s.is_empty()).collect();
    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        let table = cache.fields(&current)?;
        let field = table.get(segment).ok_or_else(|| {
            LinkError::path(&current, reference, format!("attribut '{}' absent", segment))
        })?;
        value_type = field.field_type.clone();
        prefix.push(segment.to_string());

        if cache.is_relation(&field.field_type) && (!is_last || join_terminal) {
            let target = navigable_type(&field.field_type).unwrap_or_default().to_string();
            let attribute = std::mem::take(&mut prefix);
            join = ctx.join(
                join,
                attribute,
                JoinKind::Left,
                &target,
                field.field_type.is_plural(),
                field.mapped_by().map(str::to_string),
            );
            value_type = FieldType::Object(target.clone());
            current = target;
        } else if !is_last {
            current = navigable_type(&field.field_type)
                .ok_or_else(|| {
                    LinkError::path(&current, reference, format!("'{}' n'a pas de sous-attributs", segment))
                })?
                .to_string();
        }
    }

    Ok(AttributePath { join, attributes: prefix, value_type })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processor::Processor;
    use crate::core::query::JoinRef;
    use crate::core::schema::{FieldAttr, TypeDescriptor};
    use std::sync::Arc;

    fn bank_cache() -> TypeCache {
        let cache = TypeCache::new();
        cache.declare(
            TypeDescriptor::entity("Client")
                .id("uid", FieldType::Integer)
                .field("personalData", FieldType::object("PersonalData"))
                .field("selectedAccount", FieldType::object("Account"))
                .field("accounts", FieldType::set(FieldType::object("Account"))),
        );
        cache.declare(TypeDescriptor::embeddable("PersonalData").field("name", FieldType::String));
        cache.declare(
            TypeDescriptor::entity("Account")
                .id("number", FieldType::String)
                .field("state", FieldType::object("AccountState")),
        );
        cache.declare(TypeDescriptor::embeddable("AccountState").field("amount", FieldType::Decimal));
        cache.declare(
            TypeDescriptor::projection("AccountDto", "Account")
                .field("number", FieldType::String)
                .field_with("amount", FieldType::Decimal, [FieldAttr::link("state.amount")]),
        );
        cache.declare(
            TypeDescriptor::projection("ClientDto", "Client")
                .field_with("name", FieldType::String, [FieldAttr::link("personalData.name")])
                .field("selectedAccount", FieldType::object("AccountDto"))
                .field_with(
                    "accounts",
                    FieldType::set(FieldType::Any),
                    [FieldAttr::Contains(FieldType::object("AccountDto"))],
                ),
        );
        cache
    }

    #[test]
    fn test_split_head() {
        assert_eq!(split_head("a.b.c", "."), ("a", "b.c"));
        assert_eq!(split_head("a", "."), ("a", ""));
        assert_eq!(split_head("a/b", "/"), ("a", "b"));
    }

    #[test]
    fn test_resolve_single_segment_uses_link() {
        let cache = bank_cache();
        assert_eq!(resolve_path(&cache, "ClientDto", "name", ".").ok(), Some("personalData.name".to_string()));
    }

    #[test]
    fn test_resolve_descends_into_nested_projection() {
        let cache = bank_cache();
        assert_eq!(
            resolve_path(&cache, "ClientDto", "selectedAccount.amount", ".").ok(),
            Some("selectedAccount.state.amount".to_string())
        );
        assert_eq!(
            resolve_path(&cache, "ClientDto", "accounts.amount", ".").ok(),
            Some("accounts.state.amount".to_string())
        );
    }

    #[test]
    fn test_resolve_missing_segment_fails() {
        let cache = bank_cache();
        assert!(matches!(
            resolve_path(&cache, "ClientDto", "selectedAccount.nope", "."),
            Err(LinkError::PathResolution { .. })
        ));
        assert!(matches!(
            resolve_path(&cache, "ClientDto", "name.first", "."),
            Err(LinkError::PathResolution { .. })
        ));
    }

    #[test]
    fn test_walk_joins_relations_only() {
        let processor = Processor::new(Arc::new(bank_cache()));
        let mut ctx = QueryContext::new(&processor, "Client");

        let name = ctx.source_path("personalData.name").expect("chemin");
        assert_eq!(name.join, JoinRef::Root);
        assert_eq!(name.attributes, vec!["personalData", "name"]);
        assert!(ctx.joins().is_empty());

        let amount = ctx.source_path("selectedAccount.state.amount").expect("chemin");
        assert_eq!(amount.to_string(), "j1.state.amount");
        assert_eq!(amount.value_type, FieldType::Decimal);

        let number = ctx.source_path("selectedAccount.number").expect("chemin");
        assert_eq!(number.join, amount.join);
        assert_eq!(ctx.joins().len(), 1);
    }

    #[test]
    fn test_walk_terminal_relation_is_attribute_unless_anchored() {
        let processor = Processor::new(Arc::new(bank_cache()));
        let mut ctx = QueryContext::new(&processor, "Client");
        let fk = ctx.source_path("selectedAccount").expect("chemin");
        assert_eq!(fk.join, JoinRef::Root);
        assert!(ctx.joins().is_empty());

        let root = AttributePath::root("Client");
        let anchored = ctx.anchor_path(&root, "selectedAccount").expect("ancrage");
        assert_eq!(anchored.join, JoinRef::Join(1));
        assert!(anchored.attributes.is_empty());
        assert_eq!(anchored.value_type, FieldType::object("Account"));
    }

    #[test]
    fn test_walk_to_many_marks_join_plural() {
        let processor = Processor::new(Arc::new(bank_cache()));
        let mut ctx = QueryContext::new(&processor, "Client");
        ctx.source_path("accounts.number").expect("chemin");
        assert!(ctx.joins()[0].plural);
        assert_eq!(ctx.joins()[0].target_type, "Account");
    }
}
