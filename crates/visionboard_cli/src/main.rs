//! CLI smoke entry point.
//!
//! Verifies `visionboard_core` linkage and that a store opens, commits and
//! counts. With a path argument (or `VISIONBOARD_DB_PATH`) the store is a
//! file there; otherwise it lives in memory. A store that cannot be opened
//! aborts the process.

use std::path::PathBuf;
use visionboard_core::{Dream, PersistentStore, StoreConfig};

fn main() {
    println!("visionboard_core ping={}", visionboard_core::ping());
    println!("visionboard_core version={}", visionboard_core::core_version());

    let config = match db_path() {
        Some(path) => StoreConfig::file(path),
        None => StoreConfig::in_memory(),
    };
    let store = PersistentStore::open_or_abort(config);

    let mut context = store.new_background_context();
    let mut dream = Dream::new();
    dream.title = "smoke".to_string();
    let saved = context.insert_dream(dream).and_then(|_| context.save());
    match (saved, store.count_dreams()) {
        (Ok(_), Ok(count)) => println!(
            "visionboard_core store=ok dreams={count} generation={}",
            store.current_generation()
        ),
        (Err(err), _) | (_, Err(err)) => {
            eprintln!("visionboard_core store=error {err}");
            std::process::exit(1);
        }
    }
}

fn db_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("VISIONBOARD_DB_PATH").map(PathBuf::from))
}
