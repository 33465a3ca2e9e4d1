//! CLI command implementations
//!
//! Each command opens the store from config, runs one operation and returns
//! its result as JSON. Writes carry the log index they apply, which becomes
//! the consistent index of their transaction.

use std::path::Path;
use std::sync::atomic::AtomicU64;

use serde_json::{json, Value};

use crate::config::Config;
use crate::consistent::ConsistentStore;
use crate::mvcc::KeyValue;

use super::args::{Cli, Command};
use super::errors::CliResult;
use super::io::write_response;

/// Run a parsed command and write its response
pub fn run_command(cli: Cli) -> CliResult<()> {
    let name = cli.command.name();
    let result = execute(&cli.config, cli.command)?;
    write_response(name, &result)
}

/// Load config and execute one command
pub fn execute(config_path: &Path, command: Command) -> CliResult<Value> {
    let config = Config::load(config_path)?;

    match command {
        Command::Index => index(&config),
        Command::Put { key, value, index } => put(&config, &key, &value, index),
        Command::Delete { key, end, index } => delete(&config, &key, end.as_deref(), index),
        Command::Get {
            key,
            end,
            limit,
            revision,
        } => get(&config, &key, end.as_deref(), limit, revision),
    }
}

fn open(config: &Config, index: u64) -> CliResult<ConsistentStore<AtomicU64>> {
    Ok(ConsistentStore::open_with_config(config, AtomicU64::new(index))?)
}

/// Report the recovered consistent index and current revision
pub fn index(config: &Config) -> CliResult<Value> {
    let store = open(config, 0)?;
    Ok(json!({
        "consistent_index": store.consistent_index()?,
        "revision": store.current_revision()?,
    }))
}

pub fn put(config: &Config, key: &str, value: &str, index: u64) -> CliResult<Value> {
    let store = open(config, index)?;
    let revision = store.put(key.as_bytes(), value.as_bytes())?;
    Ok(json!({
        "consistent_index": store.consistent_index()?,
        "revision": revision,
    }))
}

pub fn delete(config: &Config, key: &str, end: Option<&str>, index: u64) -> CliResult<Value> {
    let store = open(config, index)?;
    let (deleted, revision) = store.delete_range(key.as_bytes(), end.map(str::as_bytes))?;
    Ok(json!({
        "consistent_index": store.consistent_index()?,
        "deleted": deleted,
        "revision": revision,
    }))
}

pub fn get(
    config: &Config,
    key: &str,
    end: Option<&str>,
    limit: usize,
    revision: i64,
) -> CliResult<Value> {
    let store = open(config, 0)?;
    let result = store.range(key.as_bytes(), end.map(str::as_bytes), limit, revision)?;
    let kvs: Vec<Value> = result.kvs.iter().map(kv_json).collect();
    Ok(json!({
        "count": result.count,
        "kvs": kvs,
        "revision": result.revision,
    }))
}

fn kv_json(kv: &KeyValue) -> Value {
    json!({
        "key": String::from_utf8_lossy(&kv.key),
        "value": String::from_utf8_lossy(&kv.value),
        "create_revision": kv.create_revision,
        "mod_revision": kv.mod_revision,
        "version": kv.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config::new(dir.path().to_string_lossy())
    }

    #[test]
    fn test_fresh_index() {
        let dir = TempDir::new().unwrap();
        let out = index(&config(&dir)).unwrap();
        assert_eq!(out["consistent_index"], 0);
        assert_eq!(out["revision"], 0);
    }

    #[test]
    fn test_put_delete_get() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let out = put(&config, "a", "1", 5).unwrap();
        assert_eq!(out["revision"], 1);
        assert_eq!(out["consistent_index"], 5);
        put(&config, "b", "2", 6).unwrap();

        let out = get(&config, "a", Some("z"), 0, 0).unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["kvs"][1]["value"], "2");

        let out = delete(&config, "a", None, 7).unwrap();
        assert_eq!(out["deleted"], 1);
        assert_eq!(out["revision"], 3);

        let out = index(&config).unwrap();
        assert_eq!(out["consistent_index"], 7);
        assert_eq!(out["revision"], 3);

        let out = get(&config, "a", None, 0, 2).unwrap();
        assert_eq!(out["kvs"][0]["value"], "1");
    }

    #[test]
    fn test_execute_loads_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aerokv.json");
        let data_dir = dir.path().join("data");
        fs::write(
            &path,
            json!({ "data_dir": data_dir.to_string_lossy() }).to_string(),
        )
        .unwrap();

        let out = execute(
            &path,
            Command::Put {
                key: "k".into(),
                value: "v".into(),
                index: 3,
            },
        )
        .unwrap();
        assert_eq!(out["consistent_index"], 3);
        assert!(data_dir.join("aerokv.db").exists());
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let err = execute(Path::new("/nonexistent/aerokv.json"), Command::Index).unwrap_err();
        assert_eq!(err.code().code(), "AERO_CLI_CONFIG_ERROR");
    }
}
