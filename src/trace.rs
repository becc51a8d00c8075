//! Action trace persistence
//!
//! A successful fresh run leaves behind a replayable recipe: the list
//! of single-key action mappings, stripped of runtime element
//! metadata. Traces are keyed by a digest of the carrier site and
//! task shape rather than one global file, so different task shapes
//! cannot silently poison each other. Writes go through a temp file
//! and rename, a crash cannot leave a torn trace behind.

use crate::agent::INTERACTED_ELEMENT_KEY;
use crate::error::Result;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reduce raw run records to the replayable form: drop the
/// `interacted_element` entry and keep exactly the first remaining
/// action key of every record.
pub fn prepare_replay_actions(raw: &[Map<String, Value>]) -> Vec<Map<String, Value>> {
    let mut actions = Vec::with_capacity(raw.len());

    for record in raw {
        for (name, params) in record {
            if name == INTERACTED_ELEMENT_KEY {
                continue;
            }
            let mut action = Map::new();
            action.insert(name.clone(), params.clone());
            actions.push(action);
            break;
        }
    }

    actions
}

/// Directory-backed store of recorded traces, one file per task key
pub struct TraceStore {
    dir: PathBuf,
}

impl TraceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Key for a task shape: digest of carrier and site, hex-truncated
    /// for the filename
    pub fn task_key(carrier: &str, task_signature: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(carrier.as_bytes());
        hasher.update(b"\0");
        hasher.update(task_signature.as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }

    fn path_for(&self, carrier: &str, key: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.json", carrier, key))
    }

    /// Whether a trace exists for the key
    pub fn exists(&self, carrier: &str, key: &str) -> bool {
        self.path_for(carrier, key).is_file()
    }

    /// Load a stored trace, if any
    pub fn load(&self, carrier: &str, key: &str) -> Result<Option<Vec<Map<String, Value>>>> {
        let path = self.path_for(carrier, key);
        if !path.is_file() {
            debug!("No stored trace at {}", path.display());
            return Ok(None);
        }

        let data = fs::read_to_string(&path)?;
        let actions: Vec<Map<String, Value>> = serde_json::from_str(&data)?;
        info!("Loaded {} recorded actions from {}", actions.len(), path.display());
        Ok(Some(actions))
    }

    /// Overwrite the trace for the key wholesale
    pub fn store(&self, carrier: &str, key: &str, actions: &[Map<String, Value>]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(carrier, key);
        let data = serde_json::to_string_pretty(actions)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;

        info!("Stored {} actions to {}", actions.len(), path.display());
        Ok(())
    }

    /// Store root, mainly for logging
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_record(name: &str, with_element: bool) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert(name.to_string(), json!({ "text": "x" }));
        if with_element {
            record.insert(
                INTERACTED_ELEMENT_KEY.to_string(),
                json!({ "tag": "a", "text": "x" }),
            );
        }
        record
    }

    #[test]
    fn test_prepare_drops_element_and_keeps_one_key() {
        let raw = vec![
            raw_record("click_link", true),
            raw_record("input_text", true),
            raw_record("scroll", false),
        ];

        let actions = prepare_replay_actions(&raw);
        assert_eq!(actions.len(), 3);
        for action in &actions {
            assert_eq!(action.len(), 1);
            assert!(!action.contains_key(INTERACTED_ELEMENT_KEY));
        }
        assert!(actions[0].contains_key("click_link"));
        assert!(actions[2].contains_key("scroll"));
    }

    #[test]
    fn test_prepare_skips_element_only_records() {
        let mut record = Map::new();
        record.insert(INTERACTED_ELEMENT_KEY.to_string(), json!({ "tag": "a" }));

        let actions = prepare_replay_actions(&[record]);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_task_key_stable_and_keyed() {
        let a = TraceStore::task_key("hmm", "http://www.seacargotracking.net/");
        let b = TraceStore::task_key("hmm", "http://www.seacargotracking.net/");
        let c = TraceStore::task_key("msc", "http://www.seacargotracking.net/");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_store_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TraceStore::new(dir.path());
        let key = TraceStore::task_key("hmm", "sig");

        assert!(store.load("hmm", &key).unwrap().is_none());

        let actions = vec![raw_record("go_to_url", false)];
        store.store("hmm", &key, &actions).unwrap();

        assert!(store.exists("hmm", &key));
        let loaded = store.load("hmm", &key).unwrap().unwrap();
        assert_eq!(loaded, actions);

        // No temp file left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}
