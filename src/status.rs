//! Index status overview for `philo status`.
//!
//! Lists every configured school with its stored index (if any): chunk
//! count, embedding model, and when it was built. Stored indexes for
//! schools no longer in the config are listed separately.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::store::{IndexRecord, IndexStore};

pub async fn run_status(config: &Config) -> Result<()> {
    let store = IndexStore::open(config).await?;
    let records = store.list().await?;
    store.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Philosophy RAG Index Status");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Embedder:    {}", embedder_label(config));
    println!("  Generator:   {}", config.generation.provider);
    println!();

    if config.schools.is_empty() {
        println!("  No schools configured.");
        return Ok(());
    }

    println!(
        "  {:<16} {:>8} {:<24} {}",
        "SCHOOL", "CHUNKS", "MODEL", "BUILT"
    );
    println!("  {}", "-".repeat(70));
    for school in &config.schools {
        match records.iter().find(|r| r.school_id == school.id) {
            Some(r) => println!(
                "  {:<16} {:>8} {:<24} {}",
                school.id,
                r.chunk_count,
                r.model,
                format_relative(r.built_at, Utc::now())
            ),
            None => println!("  {:<16} {:>8} {:<24} {}", school.id, "-", "-", "not built"),
        }
    }

    let orphans: Vec<&IndexRecord> = records
        .iter()
        .filter(|r| config.school_config(&r.school_id).is_none())
        .collect();
    if !orphans.is_empty() {
        println!();
        println!("  Stored but not configured:");
        for r in orphans {
            println!("    {} ({} chunks)", r.school_id, r.chunk_count);
        }
    }
    println!();
    Ok(())
}

fn embedder_label(config: &Config) -> String {
    match (&config.embedding.model, config.embedding.dims) {
        (Some(model), Some(dims)) => format!("{} ({}, {} dims)", config.embedding.provider, model, dims),
        (Some(model), None) => format!("{} ({})", config.embedding.provider, model),
        (None, Some(dims)) => format!("{} ({} dims)", config.embedding.provider, dims),
        (None, None) => config.embedding.provider.clone(),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// "3 hours ago", or an absolute date past thirty days.
fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - at).num_seconds();
    if delta < 0 || delta >= 86400 * 30 {
        return at.format("%Y-%m-%d %H:%M").to_string();
    }
    let (n, unit) = if delta < 60 {
        return "just now".to_string();
    } else if delta < 3600 {
        (delta / 60, "min")
    } else if delta < 86400 {
        (delta / 3600, "hour")
    } else {
        (delta / 86400, "day")
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}
