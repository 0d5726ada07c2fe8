// =============================================================================
// LINKRUST — Liaison déclarative projection ↔ entité en Rust
// =============================================================================
//
// LinkRust relie des types de PROJECTION (DTO) à des types SOURCE (entités)
// via des chemins pointillés déclarés sur chaque champ. À partir de ces
// déclarations, il construit une fois des chaînes de lecture et d'écriture,
// puis s'en sert pour :
//   - projeter une source vers une projection (et inversement fusionner)
//   - compiler des filtres (ou une instance de filtrage) en prédicats de
//     requête, avec les JOINs nécessaires
//   - chercher, compter et paginer via un backend interchangeable
//
// Architecture :
//   core/       → le moteur pur (types, chaînes, filtres, prédicats)
//   backend/    → exécution des requêtes (mémoire, rendu SQL)
//   config      → réglages du processeur (TOML)
//   repository  → recherches par projection sur un backend
//
// =============================================================================

pub mod core;
pub mod backend;
pub mod config;
pub mod repository;
