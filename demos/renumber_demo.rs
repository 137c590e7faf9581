//! Demonstration of chronological renumbering over a messy imported collection
//!
//! Seeds an in-memory store with legacy records that never had a derived
//! identity, renumbers every partition, then inserts a case mid-sequence to
//! show the peers shifting.

use case_registry::{
    CaseRecord, CaseRegistry, CaseType, Config, DocumentStore, MemoryDocumentStore, NewCase,
    SnapshotCache, CASES_COLLECTION,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("⚖️  Case Registry - Renumbering Demo");
    println!("====================================");

    let config = Arc::new(Config::default());
    let store = Arc::new(MemoryDocumentStore::new());
    let cache = Arc::new(SnapshotCache::new(&config.cache));
    let registry = CaseRegistry::new(config, store.clone(), cache);

    // Legacy documents live under arbitrary keys with no derived identity
    println!("📦 Seeding legacy imports...");
    for (id, name, year, month, case_type) in [
        ("import-0007", "Silva", 2023, 3, CaseType::Antigo),
        ("import-0012", "Alves", 2023, 1, CaseType::Antigo),
        ("import-0018", "Ação Trabalhista Ltda", 2022, 11, CaseType::Novo),
    ] {
        let record = CaseRecord {
            name: name.to_string(),
            year: Some(year),
            month: Some(month),
            case_type: Some(case_type),
            ..Default::default()
        };
        store.upsert(CASES_COLLECTION, id, record.to_document()?).await?;
        println!("  imported {} as {}", name, id);
    }

    println!("\n🔢 Renumbering all partitions...");
    for report in registry.renumber_all(false).await? {
        println!(
            "  {}: examined {}, changed {}, migrated {}",
            report.case_type, report.examined, report.changed, report.migrated
        );
    }

    // Costa opened between Alves and Silva, so it takes the middle rank
    println!("\n➕ Creating a case that lands mid-sequence...");
    let mut input = NewCase::new("Costa", CaseType::Antigo);
    input.year = Some(2023);
    input.month = Some(2);
    let costa = registry.create_case(input).await?;
    println!("  created \"{}\" under key {}", costa.record.title, costa.id);

    println!("\n📋 Final collection:");
    for case in registry.list_cases(None).await? {
        println!("  {:<24} {}", case.id, case.record.title);
    }

    let stats = registry.stats().await?;
    println!(
        "\n📊 {} cases ({} antigo, {} novo, {} futuro)",
        stats.total_cases, stats.antigo, stats.novo, stats.futuro
    );

    println!("\n🎉 Demo completed successfully!");

    Ok(())
}
