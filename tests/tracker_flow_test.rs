//! End-to-end dispatcher flows against a scripted driver and model.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shiptrack::{
    CompletionModel, Config, PageDriver, Result, TraceStore, TrackOutcome, Tracker, CARRIER,
    TARGET_URL,
};
use std::path::Path;
use std::sync::Mutex;

/// Model that replays a fixed list of planner responses
struct ScriptedModel {
    responses: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(responses: &[&str]) -> Self {
        let mut responses: Vec<String> = responses.iter().map(|s| s.to_string()).collect();
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| "I am not sure what to do.".to_string()))
    }
}

/// In-memory page driver recording what the agent did to it
#[derive(Default)]
struct ScriptedDriver {
    url: String,
    navigations: Vec<String>,
    queries: Vec<String>,
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.url = url.to_string();
        self.navigations.push(url.to_string());
        Ok(())
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    fn page_text(&self) -> String {
        "HYUNDAI Merchant Marine (HMM) Track and Trace".to_string()
    }

    async fn click_link(&mut self, text: &str) -> Result<()> {
        self.url = format!("{}{}", self.url, text.to_lowercase().replace(' ', "-"));
        Ok(())
    }

    async fn submit_query(&mut self, text: &str) -> Result<()> {
        self.queries.push(text.to_string());
        Ok(())
    }

    async fn move_mouse(&mut self, _x: u32, _y: u32) -> Result<()> {
        Ok(())
    }
}

fn test_config(trace_dir: &Path, max_steps: usize) -> Config {
    Config {
        api_key: "test-key".to_string(),
        model: "gemini-2.0-flash".to_string(),
        trace_dir: trace_dir.to_path_buf(),
        max_steps,
        http_timeout_secs: 30,
        user_agent: None,
    }
}

fn answer_shape_ok(text: &str) -> bool {
    text.starts_with("Voyage: ") && text.contains(", Arrival: ")
}

#[tokio::test]
async fn fresh_run_stores_reduced_trace() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(&[
        r#"{"go_to_url": {"url": "http://www.seacargotracking.net/"}}"#,
        r#"{"click_link": {"text": "HYUNDAI Merchant Marine (HMM)"}}"#,
        r#"{"input_text": {"text": "SINI25432400"}}"#,
        r#"{"done": {"text": "Voyage: HMM0012E, Arrival: 2025-09-14"}}"#,
    ]);
    let tracker = Tracker::new(test_config(dir.path(), 20), model);

    let outcome = tracker
        .fetch_with_driver("SINI25432400", ScriptedDriver::default())
        .await
        .unwrap();

    let answer = match outcome {
        TrackOutcome::Found(text) => text,
        TrackOutcome::NoResults => panic!("expected an answer"),
    };
    assert!(answer_shape_ok(&answer), "unexpected shape: {}", answer);

    // The fresh-discovery task carried the literal booking ID and URL.
    let tracker_model_prompts = tracker_prompts(&tracker);
    let first = &tracker_model_prompts[0];
    assert!(first.contains("\"SINI25432400\""));
    assert!(first.contains(TARGET_URL));

    // The trace landed on disk, element-free and one action key each.
    let key = TraceStore::task_key(CARRIER, TARGET_URL);
    let store = TraceStore::new(dir.path());
    let actions = store.load(CARRIER, &key).unwrap().unwrap();
    assert_eq!(actions.len(), 4);
    for action in &actions {
        assert_eq!(action.len(), 1);
        assert!(!action.contains_key("interacted_element"));
    }
    assert!(actions[0].contains_key("go_to_url"));
    assert!(actions[3].contains_key("done"));
}

#[tokio::test]
async fn replay_run_is_seeded_and_does_not_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let key = TraceStore::task_key(CARRIER, TARGET_URL);
    let store = TraceStore::new(dir.path());

    let mut nav = Map::new();
    nav.insert(
        "go_to_url".to_string(),
        json!({ "url": "http://www.seacargotracking.net/" }),
    );
    let stored: Vec<Map<String, Value>> = vec![nav];
    store.store(CARRIER, &key, &stored).unwrap();
    let before = std::fs::read_to_string(dir.path().join(format!("{}-{}.json", CARRIER, key))).unwrap();

    // One planner call after the seeded action.
    let model = ScriptedModel::new(&[r#"{"done": {"text": "Voyage: HMM0055W, Arrival: 2025-10-02"}}"#]);
    let tracker = Tracker::new(test_config(dir.path(), 20), model);

    let outcome = tracker
        .fetch_with_driver("NEWBOOKING99", ScriptedDriver::default())
        .await
        .unwrap();
    assert!(matches!(outcome, TrackOutcome::Found(_)));

    // Replay task text noted the new booking ID.
    let prompts = tracker_prompts(&tracker);
    assert!(prompts[0].contains("new booking ID \"NEWBOOKING99\""));

    // Stored trace untouched by the replay run.
    let after = std::fs::read_to_string(dir.path().join(format!("{}-{}.json", CARRIER, key))).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn run_without_answer_yields_no_results() {
    let dir = tempfile::tempdir().unwrap();
    // Planner never produces valid JSON; the step budget runs out.
    let model = ScriptedModel::new(&[]);
    let tracker = Tracker::new(test_config(dir.path(), 3), model);

    let outcome = tracker
        .fetch_with_driver("SINI25432400", ScriptedDriver::default())
        .await
        .unwrap();
    assert_eq!(outcome, TrackOutcome::NoResults);
    assert_eq!(outcome.to_string(), "No results found");

    // No trace is stored for an unanswered run.
    let key = TraceStore::task_key(CARRIER, TARGET_URL);
    let store = TraceStore::new(dir.path());
    assert!(store.load(CARRIER, &key).unwrap().is_none());
}

fn tracker_prompts(tracker: &Tracker<ScriptedModel>) -> Vec<String> {
    tracker.model().prompts()
}
