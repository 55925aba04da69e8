//! Scripted [`CommandRunner`] for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use og_cloud::{CommandError, CommandOutput, CommandRunner, CommandSpec};

/// Replays canned outputs keyed by a command prefix such as
/// `"aws acm describe-certificate"`.
///
/// Each key holds a queue; the last entry repeats once the queue is down to
/// one element. Every call is recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, prefix: &str, outputs: impl IntoIterator<Item = CommandOutput>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push((prefix.to_string(), outputs.into_iter().collect()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn call_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for call in self.calls() {
            *counts.entry(call).or_insert(0) += 1;
        }
        counts
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let line = spec.to_string();
        self.calls.lock().unwrap().push(line.clone());

        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .iter_mut()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, queue)| queue)
            .unwrap_or_else(|| panic!("no script for `{line}`"));

        let output = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(output)
    }

    fn spawn_detached(&self, spec: &CommandSpec) -> Result<u32, CommandError> {
        self.calls.lock().unwrap().push(spec.to_string());
        Ok(31337)
    }
}
