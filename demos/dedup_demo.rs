//! Demonstration of duplicate detection and merging
//!
//! Seeds a collection with the overlap patterns seen in real imports, then
//! walks through a scan, a dry run, and an actual merge.

use case_registry::{
    CaseRecord, CaseRegistry, Config, DocumentStore, MemoryDocumentStore, SnapshotCache,
    CASES_COLLECTION,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("🔍 Case Registry - Duplicate Cleanup Demo");
    println!("=========================================");

    let config = Arc::new(Config::default());
    let store = Arc::new(MemoryDocumentStore::new());
    let cache = Arc::new(SnapshotCache::new(&config.cache));
    let registry = CaseRegistry::new(config, store.clone(), cache);

    println!("📦 Seeding a collection with known duplicates...");
    seed_duplicates(&store).await?;

    let report = registry.find_duplicates().await?;
    println!("\n📊 Scan results:");
    println!("  by slug:        {} group(s)", report.stats.slug_groups);
    println!("  by title:       {} group(s)", report.stats.title_groups);
    println!("  by name + year: {} group(s)", report.stats.name_year_groups);
    println!(
        "  {} of {} cases involved",
        report.stats.cases_involved, report.stats.total_cases
    );

    println!("\n🧪 Dry run:");
    let dry = registry.deduplicate(true).await?;
    for action in &dry.actions {
        println!(
            "  would delete {} (keeping {})",
            action.target_slug, action.kept_slug
        );
    }

    println!("\n🧹 Merging for real...");
    let merged = registry.deduplicate(false).await?;
    println!(
        "  removed {} duplicate(s), {} failure(s)",
        merged.deleted, merged.failed
    );

    println!("\n📋 Surviving cases:");
    for case in registry.list_cases(None).await? {
        println!("  {:<24} {}", case.id, case.record.name);
    }

    println!("\n🎉 Demo completed successfully!");

    Ok(())
}

/// Creates the three duplicate shapes the scanner clusters on.
async fn seed_duplicates(store: &MemoryDocumentStore) -> anyhow::Result<()> {
    // Shared slug: a healed record plus the raw import that spawned it
    let mut canonical = CaseRecord {
        slug: "1-1-silva-2023".to_string(),
        title: "1.1 - Silva / 2023".to_string(),
        name: "Silva".to_string(),
        year: Some(2023),
        month: Some(3),
        number: Some(1),
        ..Default::default()
    };
    canonical
        .extra
        .insert("client_email".to_string(), json!("silva@example.com"));
    store
        .upsert(CASES_COLLECTION, "1-1-silva-2023", canonical.to_document()?)
        .await?;

    let shadow = CaseRecord {
        slug: "1-1-silva-2023".to_string(),
        name: "Silva Importado".to_string(),
        ..Default::default()
    };
    store
        .upsert(CASES_COLLECTION, "import-0031", shadow.to_document()?)
        .await?;

    // Same client and year, created twice by the old double-submit bug
    for (id, name) in [("2-1-pereira-2021", "Pereira"), ("rascunho-pereira", "PEREIRA")] {
        let record = CaseRecord {
            name: name.to_string(),
            year: Some(2021),
            ..Default::default()
        };
        store
            .upsert(CASES_COLLECTION, id, record.to_document()?)
            .await?;
    }

    Ok(())
}
