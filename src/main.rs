// =============================================================================
// LINKRUST — Point d'entrée : démonstration du moteur de liaison
// =============================================================================
//
// Ce main.rs montre un exemple complet :
//   1. Déclarer les entités (Client, Account...) et leurs projections
//   2. Configurer le processeur (construction des chaînes)
//   3. Projeter une entité, puis fusionner une projection modifiée
//   4. Filtrer et compter via le backend mémoire
//   5. Rendre les mêmes requêtes en SQL (PostgreSQL + Trino)
//
// Les traces se règlent par RUST_LOG (ex. RUST_LOG=linkrust=debug) ; un
// fichier de réglages TOML peut être désigné par LINKRUST_CONFIG.
//
// =============================================================================

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use linkrust::backend::memory::MemoryStore;
use linkrust::backend::sql::planner::SqlPlanner;
use linkrust::backend::sql::{PostgresDialect, TrinoDialect};
use linkrust::backend::{Query, QueryBackend};
use linkrust::config::ProcessorConfig;
use linkrust::core::cache::TypeCache;
use linkrust::core::filter::{Filter, FilterMap};
use linkrust::core::instance::{Collection, Record};
use linkrust::core::paging::PagingAndSorting;
use linkrust::core::processor::Processor;
use linkrust::core::schema::{EnumDescriptor, FieldAttr, TypeDescriptor};
use linkrust::core::typeside::{CollectionKind, FieldType, Value};
use linkrust::repository::Repository;

type DemoResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> DemoResult<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("╔══════════════════════════════════════════════════╗");
    println!("║      LINKRUST — Liaison projection ↔ entité      ║");
    println!("║      Chaînes de mapping et filtres compilés      ║");
    println!("╚══════════════════════════════════════════════════╝\n");

    let config = match std::env::var("LINKRUST_CONFIG") {
        Ok(path) => ProcessorConfig::from_file(path)?,
        Err(_) => ProcessorConfig::default(),
    };

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 1 : Déclarer le domaine et les projections
    // ═══════════════════════════════════════════════════════════
    println!("═══ ÉTAPE 1 : Déclarations ═══\n");

    let cache = Arc::new(TypeCache::new());
    declare_domain(&cache);
    let store = Arc::new(MemoryStore::new(cache.clone()));
    let mut processor = Processor::new(cache.clone())
        .with_config(config)
        .with_lookup(store.clone());

    for projection in ["AccountDto", "ClientDto", "ClientSpecificationDto"] {
        processor.add(projection)?;
    }

    match processor.validate() {
        Ok(()) => println!("✓ Déclarations valides"),
        Err(errors) => {
            for e in errors {
                println!("✗ {}", e);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 2 : Configurer (chaînes construites une fois)
    // ═══════════════════════════════════════════════════════════
    println!("\n═══ ÉTAPE 2 : Configuration ═══\n");

    if let Err(errors) = processor.configure() {
        for e in &errors {
            println!("✗ {}", e);
        }
        return Err(format!("{} projection(s) non configurée(s)", errors.len()).into());
    }
    for projection in ["AccountDto", "ClientDto", "ClientSpecificationDto"] {
        let meta = processor.metadata(projection)?;
        println!("✓ {} ← {} ({} champs liés)", projection, meta.source_type, meta.mappings().len());
    }

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 3 : Projeter puis fusionner
    // ═══════════════════════════════════════════════════════════
    println!("\n═══ ÉTAPE 3 : Projection et fusion ═══\n");

    let (clients, accounts) = sample_data(&cache)?;
    store.insert_all(accounts);
    store.insert_all(clients.clone());

    let yurii = &clients[0];
    let dto = processor
        .project(Some(yurii), "ClientDto")?
        .ok_or("projection absente")?;
    println!("Source     : {}", yurii);
    println!("Projection : {}\n", dto);

    let update = dto
        .clone()
        .with("name", "Iouri")
        .with("gender", "F");
    let merged = processor
        .merge(Some(yurii.clone()), &update)?
        .ok_or("fusion absente")?;
    println!("Après fusion : {}\n", merged);

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 4 : Filtrer via le backend mémoire
    // ═══════════════════════════════════════════════════════════
    let repo = Repository::new(&processor, store.as_ref());
    println!("═══ ÉTAPE 4 : Filtres (backend {}) ═══\n", store.name());

    let mut filters = FilterMap::new();
    filters.insert("name".into(), Filter::equals("Abc"));
    println!("name = Abc                 → {} client(s)", repo.count(&filters, "ClientDto")?);

    let mut filters = FilterMap::new();
    filters.insert("selectedAccount.currency".into(), Filter::equals("UAH"));
    println!("selectedAccount.currency   → {} client(s)", repo.count(&filters, "ClientDto")?);

    let json = serde_json::json!({ "$type": "in", "values": ["Yurii", "Abc"] });
    let mut filters = FilterMap::new();
    filters.insert("name".into(), Filter::from_json(&json)?);
    let page = repo.find_page(&filters, &PagingAndSorting::page(0, 2).asc("uid"), "ClientDto")?;
    println!(
        "name IN (Yurii, Abc) page 0 → {} / {} ({} pages)",
        page.len(),
        page.total_elements,
        page.total_pages.unwrap_or(1)
    );

    let spec = Record::new("ClientSpecificationDto").with("selectedAccountAbsent", true);
    println!("sans compte sélectionné    → {} client(s)", repo.count_matching(&spec)?);

    // ═══════════════════════════════════════════════════════════
    // ÉTAPE 5 : Rendu SQL
    // ═══════════════════════════════════════════════════════════
    println!("\n═══ ÉTAPE 5 : SQL ═══\n");

    let spec = Record::new("ClientSpecificationDto")
        .with("name", "abc")
        .with("selectedAccount", Record::new("AccountDto").with("currency", "UAH"));
    let specs = processor.compile_instance_predicate(&spec)?;
    let mut ctx = processor.query_context("ClientSpecificationDto")?;
    let predicate = specs.build(&mut ctx)?;
    let query = Query::from_context(ctx, predicate).with_page(0, Some(20));

    println!("── PostgreSQL ──\n{}", SqlPlanner::new(&PostgresDialect, &cache).plan_select(&query)?);
    let trino = TrinoDialect::new("iceberg", "bank");
    println!("── Trino ──\n{}", SqlPlanner::new(&trino, &cache).plan_count(&query, true)?);

    Ok(())
}

fn declare_domain(cache: &TypeCache) {
    cache.declare_enum(EnumDescriptor::new("Gender", ["M", "F"]));
    cache.declare_enum(EnumDescriptor::new("AccountType", ["CHECKING", "SAVINGS"]));

    cache.declare(
        TypeDescriptor::entity("Client")
            .id("uid", FieldType::Integer)
            .field("loginData", FieldType::object("LoginData"))
            .field("personalData", FieldType::object("PersonalData"))
            .field("selectedAccount", FieldType::object("Account"))
            .field_with(
                "accounts",
                FieldType::list(FieldType::object("Account")),
                [FieldAttr::mapped_by("owner")],
            ),
    );
    cache.declare(
        TypeDescriptor::embeddable("LoginData")
            .field("email", FieldType::String)
            .field("password", FieldType::String),
    );
    cache.declare(
        TypeDescriptor::embeddable("PersonalData")
            .field("name", FieldType::String)
            .field("birthday", FieldType::DateTime)
            .field("gender", FieldType::enumeration("Gender")),
    );
    cache.declare(
        TypeDescriptor::entity("Account")
            .id("number", FieldType::String)
            .field("currencyCode", FieldType::String)
            .field("type", FieldType::enumeration("AccountType"))
            .field("state", FieldType::object("AccountState")),
    );
    cache.declare(TypeDescriptor::embeddable("AccountState").field("amount", FieldType::Decimal));

    cache.declare(
        TypeDescriptor::projection("AccountDto", "Account")
            .field("number", FieldType::String)
            .field_with("currency", FieldType::String, [FieldAttr::link("currencyCode")])
            .field("type", FieldType::String)
            .field_with("amount", FieldType::Decimal, [FieldAttr::link("state.amount")]),
    );
    cache.declare(
        TypeDescriptor::projection("ClientDto", "Client")
            .field("uid", FieldType::Integer)
            .field_with("login", FieldType::String, [FieldAttr::link("loginData.email")])
            .field_with("name", FieldType::String, [FieldAttr::link("personalData.name")])
            .field_with("gender", FieldType::String, [FieldAttr::link("personalData.gender")])
            .field("selectedAccount", FieldType::object("AccountDto"))
            .field_with(
                "accounts",
                FieldType::list(FieldType::Any),
                [FieldAttr::Contains(FieldType::object("AccountDto"))],
            ),
    );
    cache.declare(
        TypeDescriptor::projection("ClientSpecificationDto", "Client")
            .field_with("name", FieldType::String, [FieldAttr::link("personalData.name"), FieldAttr::like()])
            .field_with("bornAfter", FieldType::DateTime, [FieldAttr::link("personalData.birthday"), FieldAttr::from()])
            .field_with("selectedAccountAbsent", FieldType::Boolean, [FieldAttr::link("selectedAccount"), FieldAttr::IsNull])
            .field("selectedAccount", FieldType::object("AccountDto")),
    );
}

fn account(cache: &TypeCache, number: &str, currency: &str, kind: &str, amount: i64) -> DemoResult<Record> {
    Ok(Record::new("Account")
        .with("number", number)
        .with("currencyCode", currency)
        .with("type", cache.enum_value("AccountType", kind)?)
        .with("state", Record::new("AccountState").with("amount", Decimal::from(amount))))
}

/// Quatre clients, dont un seul avec des comptes ; rend aussi les comptes.
fn sample_data(cache: &TypeCache) -> DemoResult<(Vec<Record>, Vec<Record>)> {
    let birthday = Utc
        .with_ymd_and_hms(1992, 8, 2, 0, 0, 0)
        .single()
        .ok_or("date invalide")?;
    let checking = account(cache, "UA-001", "UAH", "CHECKING", 1_000)?;
    let savings = account(cache, "US-002", "USD", "SAVINGS", 1_000_000)?;

    let person = |name: &str, gender: &str| -> DemoResult<Record> {
        Ok(Record::new("PersonalData")
            .with("name", name)
            .with("birthday", birthday)
            .with("gender", cache.enum_value("Gender", gender)?))
    };

    let clients = vec![
        Record::new("Client")
            .with("uid", 1i64)
            .with("loginData", Record::new("LoginData").with("email", "some@email.net"))
            .with("personalData", person("Yurii", "M")?)
            .with("selectedAccount", checking.clone())
            .with(
                "accounts",
                Collection::from_items(
                    CollectionKind::List,
                    vec![Value::Object(checking.clone()), Value::Object(savings.clone())],
                ),
            ),
        Record::new("Client").with("uid", 2i64).with("personalData", person("Abc", "F")?),
        Record::new("Client").with("uid", 3i64).with("personalData", person("Abc", "F")?),
        Record::new("Client").with("uid", 4i64).with("personalData", person("test", "M")?),
    ];
    Ok((clients, vec![checking, savings]))
}
