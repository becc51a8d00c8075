//! Planner-driven agent loop
//!
//! Runs a task to completion within a step budget. Seeded replay
//! actions are consumed first, then each step asks the model for one
//! action against the current page. Hooks run before and after every
//! step, replay steps included.
//!
//! Every executed step is recorded as a single-key JSON mapping
//! (action name to parameters). Interaction steps additionally carry
//! an `interacted_element` entry describing the page element touched;
//! that entry is runtime metadata and is never written to a trace.

use crate::browser::PageDriver;
use crate::error::{Error, Result};
use crate::llm::CompletionModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Key of the runtime element metadata inside raw action records
pub const INTERACTED_ELEMENT_KEY: &str = "interacted_element";

/// Page text sent to the planner is capped at this many characters
const PAGE_SNAPSHOT_MAX_CHARS: usize = 4000;

/// One atomic step the planner can ask for.
///
/// Externally tagged, so the serialized form is exactly the single-key
/// mapping the trace format requires: `{"go_to_url": {"url": "..."}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    GoToUrl { url: String },
    ClickLink { text: String },
    InputText { text: String },
    Scroll { down: bool },
    Extract { hint: String },
    Done { text: String },
}

impl Action {
    /// Action name as it appears in records
    pub fn name(&self) -> &'static str {
        match self {
            Self::GoToUrl { .. } => "go_to_url",
            Self::ClickLink { .. } => "click_link",
            Self::InputText { .. } => "input_text",
            Self::Scroll { .. } => "scroll",
            Self::Extract { .. } => "extract",
            Self::Done { .. } => "done",
        }
    }
}

/// Mutable view of the run handed to hooks
pub struct StepContext<'a> {
    driver: &'a mut dyn PageDriver,
    instructions: &'a mut Vec<String>,
}

impl<'a> StepContext<'a> {
    pub fn new(driver: &'a mut dyn PageDriver, instructions: &'a mut Vec<String>) -> Self {
        Self { driver, instructions }
    }

    /// Address of the page the run is currently on
    pub fn current_url(&self) -> String {
        self.driver.current_url()
    }

    /// Move the pointer on the current page
    pub async fn move_mouse(&mut self, x: u32, y: u32) -> Result<()> {
        self.driver.move_mouse(x, y).await
    }

    /// Append an instruction the planner sees on every later step
    pub fn add_instruction(&mut self, text: &str) {
        self.instructions.push(text.to_string());
    }

    /// Instructions queued so far
    pub fn instructions(&self) -> &[String] {
        self.instructions
    }
}

/// Lifecycle callback invoked around every agent step
#[async_trait]
pub trait StepHook: Send + Sync {
    async fn on_step_start(&self, _ctx: &mut StepContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_step_end(&self, _ctx: &mut StepContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Completed run: final answer plus the raw action records
#[derive(Debug, Clone)]
pub struct RunResult {
    final_result: Option<String>,
    actions: Vec<Map<String, Value>>,
    steps: usize,
}

impl RunResult {
    /// Final answer text, if the agent reported one
    pub fn final_result(&self) -> Option<String> {
        self.final_result.clone()
    }

    /// Raw per-step records, element metadata included
    pub fn model_actions(&self) -> &[Map<String, Value>] {
        &self.actions
    }

    /// Steps the run consumed
    pub fn steps(&self) -> usize {
        self.steps
    }
}

/// Step-bounded agent driving a page through planner decisions
pub struct Agent<'a, D: PageDriver> {
    driver: D,
    model: &'a dyn CompletionModel,
    task: String,
    message_context: Option<String>,
    initial_actions: VecDeque<Map<String, Value>>,
    max_steps: usize,
    instructions: Vec<String>,
    history: Vec<Map<String, Value>>,
    observation: Option<String>,
}

impl<'a, D: PageDriver> Agent<'a, D> {
    pub fn new(driver: D, model: &'a dyn CompletionModel, task: &str) -> Self {
        Self {
            driver,
            model,
            task: task.to_string(),
            message_context: None,
            initial_actions: VecDeque::new(),
            max_steps: 20,
            instructions: Vec::new(),
            history: Vec::new(),
            observation: None,
        }
    }

    /// Extra context shown to the planner alongside the task
    pub fn with_message_context(mut self, context: &str) -> Self {
        self.message_context = Some(context.to_string());
        self
    }

    /// Seed the run with recorded actions to replay before planning
    pub fn with_initial_actions(mut self, actions: Vec<Map<String, Value>>) -> Self {
        self.initial_actions = actions.into();
        self
    }

    /// Step budget for the whole run
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Run to a final answer or until the step budget is exhausted
    pub async fn run(mut self, hooks: &[&dyn StepHook]) -> Result<RunResult> {
        let mut steps = 0;
        let mut final_result = None;

        while steps < self.max_steps {
            steps += 1;

            {
                let mut ctx = StepContext::new(&mut self.driver, &mut self.instructions);
                for hook in hooks {
                    hook.on_step_start(&mut ctx).await?;
                }
            }

            let action = if let Some(raw) = self.initial_actions.pop_front() {
                match decode_action(&raw) {
                    Ok(action) => Some(action),
                    Err(e) => {
                        warn!("Skipping unreplayable recorded action: {}", e);
                        None
                    }
                }
            } else {
                self.plan_step().await?
            };

            if let Some(action) = action {
                info!("Step {}: {}", steps, action.name());
                self.execute(&action).await;
                self.history.push(record_action(&action));

                if let Action::Done { text } = &action {
                    final_result = Some(text.clone());
                }
            }

            {
                let mut ctx = StepContext::new(&mut self.driver, &mut self.instructions);
                for hook in hooks {
                    hook.on_step_end(&mut ctx).await?;
                }
            }

            if final_result.is_some() {
                break;
            }
        }

        if final_result.is_none() {
            info!("Run ended without a final answer after {} steps", steps);
        }

        Ok(RunResult {
            final_result,
            actions: self.history,
            steps,
        })
    }

    /// Ask the model for the next action. Malformed planner output is
    /// logged and skipped; the step budget still ticks.
    async fn plan_step(&mut self) -> Result<Option<Action>> {
        let prompt = self.build_prompt();
        let response = self.model.complete(&prompt).await?;

        let Some(raw) = extract_json_object(&response) else {
            warn!("Planner returned no JSON object: {:?}", truncate(&response, 200));
            return Ok(None);
        };

        match serde_json::from_str::<Action>(raw) {
            Ok(action) => Ok(Some(action)),
            Err(e) => {
                warn!("Planner returned unparseable action ({}): {}", e, raw);
                Ok(None)
            }
        }
    }

    fn build_prompt(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str("You are a browser automation agent.\n\nTask:\n");
        prompt.push_str(&self.task);
        prompt.push('\n');

        if let Some(context) = &self.message_context {
            prompt.push_str("\nContext:\n");
            prompt.push_str(context);
            prompt.push('\n');
        }

        if !self.instructions.is_empty() {
            prompt.push_str("\nAdditional instructions:\n");
            for instruction in &self.instructions {
                prompt.push_str("- ");
                prompt.push_str(instruction);
                prompt.push('\n');
            }
        }

        if !self.history.is_empty() {
            prompt.push_str("\nActions taken so far:\n");
            for record in &self.history {
                let name = record
                    .keys()
                    .find(|k| k.as_str() != INTERACTED_ELEMENT_KEY)
                    .map(String::as_str)
                    .unwrap_or("unknown");
                prompt.push_str("- ");
                prompt.push_str(name);
                prompt.push('\n');
            }
        }

        let url = self.driver.current_url();
        if url.is_empty() {
            prompt.push_str("\nNo page is loaded yet.\n");
        } else {
            prompt.push_str("\nCurrent URL: ");
            prompt.push_str(&url);
            prompt.push_str("\nPage text:\n");
            prompt.push_str(&truncate(&self.driver.page_text(), PAGE_SNAPSHOT_MAX_CHARS));
            prompt.push('\n');
        }

        if let Some(observation) = &self.observation {
            prompt.push_str("\nLast observation:\n");
            prompt.push_str(observation);
            prompt.push('\n');
        }

        prompt.push_str(
            "\nAvailable actions (respond with exactly one JSON object whose single \
             key is the action name):\n\
             {\"go_to_url\": {\"url\": \"http://...\"}}\n\
             {\"click_link\": {\"text\": \"link text\"}}\n\
             {\"input_text\": {\"text\": \"text to submit\"}}\n\
             {\"scroll\": {\"down\": true}}\n\
             {\"extract\": {\"hint\": \"what to look for\"}}\n\
             {\"done\": {\"text\": \"final answer\"}}\n\
             JSON only:",
        );

        prompt
    }

    /// Apply an action to the page. Driver failures become observations
    /// for the planner instead of aborting the run.
    async fn execute(&mut self, action: &Action) {
        let result = match action {
            Action::GoToUrl { url } => self.driver.navigate(url).await,
            Action::ClickLink { text } => self.driver.click_link(text).await,
            Action::InputText { text } => self.driver.submit_query(text).await,
            Action::Scroll { .. } => self.driver.scroll().await,
            Action::Extract { hint } => {
                let text = self.driver.page_text();
                self.observation = Some(format!(
                    "Looking for {:?}. Page text:\n{}",
                    hint,
                    truncate(&text, PAGE_SNAPSHOT_MAX_CHARS)
                ));
                Ok(())
            }
            Action::Done { .. } => Ok(()),
        };

        if let Err(e) = result {
            warn!("Action {} failed: {}", action.name(), e);
            self.observation = Some(format!("Action {} failed: {}", action.name(), e));
        }
    }
}

/// Build the raw record for an executed action: the single-key action
/// mapping, plus element metadata for interaction steps.
fn record_action(action: &Action) -> Map<String, Value> {
    let value = serde_json::to_value(action).unwrap_or(Value::Null);
    let mut record = match value {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let element = match action {
        Action::ClickLink { text } => Some(json!({ "tag": "a", "text": text })),
        Action::InputText { .. } => Some(json!({ "tag": "input", "name": "query" })),
        _ => None,
    };
    if let Some(element) = element {
        record.insert(INTERACTED_ELEMENT_KEY.to_string(), element);
    }

    record
}

/// Decode a recorded single-key action mapping back into an action,
/// ignoring any element metadata carried alongside it
pub fn decode_action(raw: &Map<String, Value>) -> Result<Action> {
    let mut call = Map::new();
    for (key, value) in raw {
        if key != INTERACTED_ELEMENT_KEY {
            call.insert(key.clone(), value.clone());
            break;
        }
    }

    if call.is_empty() {
        return Err(Error::Agent("empty action record".into()));
    }

    serde_json::from_value(Value::Object(call)).map_err(|e| Error::Agent(e.to_string()))
}

/// Extract the first balanced JSON object from model output
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    debug!("Truncating {} chars of page text to {}", s.len(), max_chars);
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serializes_as_single_key_map() {
        let action = Action::GoToUrl {
            url: "http://www.seacargotracking.net/".to_string(),
        };
        let value = serde_json::to_value(&action).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("go_to_url"));
    }

    #[test]
    fn test_record_action_carries_element_for_interactions() {
        let record = record_action(&Action::ClickLink {
            text: "Track and Trace".to_string(),
        });
        assert!(record.contains_key("click_link"));
        assert!(record.contains_key(INTERACTED_ELEMENT_KEY));

        let record = record_action(&Action::Scroll { down: true });
        assert!(record.contains_key("scroll"));
        assert!(!record.contains_key(INTERACTED_ELEMENT_KEY));
    }

    #[test]
    fn test_decode_action_ignores_element_metadata() {
        let mut raw = record_action(&Action::InputText {
            text: "SINI25432400".to_string(),
        });
        assert!(raw.contains_key(INTERACTED_ELEMENT_KEY));

        let action = decode_action(&raw).unwrap();
        assert_eq!(
            action,
            Action::InputText {
                text: "SINI25432400".to_string()
            }
        );

        raw.retain(|k, _| k == INTERACTED_ELEMENT_KEY);
        assert!(decode_action(&raw).is_err());
    }

    #[test]
    fn test_extract_json_object() {
        let text = "Sure, here is the action:\n{\"done\": {\"text\": \"Voyage: V1, Arrival: A1\"}}\nHope it helps.";
        assert_eq!(
            extract_json_object(text),
            Some("{\"done\": {\"text\": \"Voyage: V1, Arrival: A1\"}}")
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_extract_json_object_braces_in_strings() {
        let text = r#"{"done": {"text": "curly } inside"}}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("0123456789abc", 10), "0123456789");
    }

    #[test]
    fn test_planner_output_round_trip() {
        let raw = r#"{"click_link": {"text": "HYUNDAI Merchant Marine (HMM)"}}"#;
        let action: Action = serde_json::from_str(raw).unwrap();
        assert_eq!(action.name(), "click_link");
    }
}
