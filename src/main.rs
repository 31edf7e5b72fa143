use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use matchminer::config::MinerConfig;
use matchminer::patterns::Direction;
use matchminer::record::RawInput;
use matchminer::storage::SqliteKv;
use matchminer::store::PatternStore;
use matchminer::sync::{self, FlushOutcome, SyncBridge};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let input_path = parse_positional_arg().ok_or_else(|| {
        anyhow!("usage: matchminer <records.json> [--db <path>] [--sync] [--export <dir>]")
    })?;
    let config = MinerConfig::from_env();

    let raw = fs::read_to_string(&input_path)
        .with_context(|| format!("unable to read {}", input_path.display()))?;
    let values: Vec<serde_json::Value> =
        serde_json::from_str(&raw).context("input file is not a JSON array of records")?;

    let mut inputs = Vec::with_capacity(values.len());
    let mut unrecognized = 0usize;
    for (row, value) in values.iter().enumerate() {
        match RawInput::from_value(value) {
            Ok(input) => inputs.push(input),
            Err(err) => {
                unrecognized += 1;
                warn!(row, %err, "record shape not recognized");
            }
        }
    }

    let db_path = parse_db_path_arg()
        .or_else(default_db_path)
        .context("unable to resolve sqlite path")?;
    if let Some(dir) = db_path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let kv =
        SqliteKv::open(&db_path).map_err(|err| anyhow!("open {}: {err}", db_path.display()))?;

    let mut miss = PatternStore::new(Direction::Miss, config.columns.clone(), config.thresholds);
    let mut hit = PatternStore::new(Direction::Hit, config.columns.clone(), config.thresholds);
    miss.load(&kv);
    hit.load(&kv);

    let miss_report = miss.rebuild(&inputs, &kv)?;
    let hit_report = hit.rebuild(&inputs, &kv)?;

    println!("Pattern rebuild complete");
    println!("DB: {}", db_path.display());
    println!(
        "Records: {} ({} unrecognized shape)",
        values.len(),
        unrecognized
    );
    println!(
        "Miss: processed={} failed={} patterns={}",
        miss_report.processed, miss_report.failed, miss_report.distinct_patterns
    );
    println!(
        "Hit:  processed={} failed={} patterns={}",
        hit_report.processed, hit_report.failed, hit_report.distinct_patterns
    );

    if has_flag("--sync") {
        let Some(sync_config) = config.sync.clone() else {
            return Err(anyhow!("--sync requires PATTERN_SYNC_URL"));
        };
        let bridge = SyncBridge::new(sync_config);
        match bridge.fetch_remote() {
            Ok(snapshot) => {
                miss.merge_snapshot(&snapshot.warning_rules, &kv);
                hit.merge_snapshot(&snapshot.success_rules, &kv);
            }
            Err(err) => warn!(%err, "remote fetch failed, flushing local state only"),
        }
        for (direction, store) in [(Direction::Miss, &miss), (Direction::Hit, &hit)] {
            match bridge.flush(direction, &store.patterns()) {
                Ok(FlushOutcome::Sent { stored }) => {
                    println!("Synced {}: {stored} patterns stored", direction.label());
                }
                Ok(FlushOutcome::Skipped) => {
                    println!("Sync skipped ({}): already in flight", direction.label());
                }
                Err(err) => warn!(%err, "pattern sync failed"),
            }
        }
    }

    if let Some(dir) = parse_export_dir_arg() {
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        for (direction, store) in [(Direction::Miss, &miss), (Direction::Hit, &hit)] {
            let (name, body) = sync::export_pretty(direction, &store.patterns())?;
            let path = dir.join(&name);
            fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
            println!("Exported {}", path.display());
        }
    }

    Ok(())
}

fn parse_positional_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--db" || arg == "--export" {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        return Some(PathBuf::from(arg));
    }
    None
}

fn parse_db_path_arg() -> Option<PathBuf> {
    parse_value_arg("--db").map(PathBuf::from)
}

fn parse_export_dir_arg() -> Option<PathBuf> {
    parse_value_arg("--export").map(PathBuf::from)
}

fn parse_value_arg(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            if let Some(next) = args.get(idx + 1) {
                return Some(next.clone());
            }
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == flag)
}

fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(
                PathBuf::from(base)
                    .join("matchminer")
                    .join("patterns.sqlite"),
            );
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".cache")
            .join("matchminer")
            .join("patterns.sqlite"),
    )
}
