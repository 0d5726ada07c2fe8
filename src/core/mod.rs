// =============================================================================
// CORE — Module principal du moteur de liaison
// =============================================================================
//
// Ce module regroupe toute la logique pure :
// pas de SQL ni de stockage. Les descripteurs de types produisent des
// chaînes de mapping, qui produisent des arbres de prédicats.
//
// Architecture :
//   error     → la taxonomie d'erreurs
//   typeside  → les valeurs dynamiques et leurs types
//   instance  → les enregistrements et collections
//   schema    → les descripteurs déclarés (champs, attributs, projections)
//   property  → l'accès uniforme champ / propriété calculée
//   cache     → les métadonnées de types, calculées une fois
//   path      → la résolution de chemins projection → source
//   convert   → la coercition des valeurs vers un type
//   filter    → les filtres nommés (égalité, intervalle, motif...)
//   extension → les extensions post-mapping (tableau, collection, enum...)
//   chain     → construction et exécution des chaînes de lecture/écriture
//   mapping   → les métadonnées de mapping d'une projection
//   query     → prédicats, JOINs et contexte de requête
//   processor → enregistrement, projection, fusion, compilation de filtres
//   validate  → la vérification des déclarations
//   paging    → pagination, tris et pages de résultats
//
// =============================================================================

pub mod error;
pub mod typeside;
pub mod instance;
pub mod schema;
pub mod property;
pub mod cache;
pub mod path;
pub mod convert;
pub mod filter;
pub mod extension;
pub mod chain;
pub mod mapping;
pub mod query;
pub mod processor;
pub mod validate;
pub mod paging;
