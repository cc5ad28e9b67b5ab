//! Judge abstraction.
//!
//! The engine talks to exactly one interface: text in, JSON text out. Any
//! backend implementing [`Judge`] can drive an evaluation; tests use a
//! scripted stub, production uses the OpenAI-compatible client.

mod openai;

pub use openai::{OpenAiConfig, OpenAiJudge};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from judge backends, split into transport-class failures (worth
/// retrying) and output-class failures (the model answered, but unusably).
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Judge returned unusable output: {0}")]
    Output(String),

    #[error("Judge not configured: {0}")]
    NotConfigured(String),
}

impl JudgeError {
    /// Whether a retry has any chance of succeeding.
    pub fn is_transport(&self) -> bool {
        match self {
            JudgeError::Transport(_) | JudgeError::RateLimited { .. } | JudgeError::Timeout(_) => {
                true
            }
            JudgeError::Api { status, .. } => *status >= 500,
            JudgeError::Output(_) | JudgeError::NotConfigured(_) => false,
        }
    }
}

/// A judge scores text against criteria embedded in the prompt and answers
/// with a single JSON document. Implementations must be safe for concurrent
/// use; the engine fans out many calls against one shared instance.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, JudgeError>;

    /// Model identifier reported in evaluation metadata.
    fn model(&self) -> &str;
}

#[cfg(test)]
pub mod testing {
    //! Scripted judge for engine and property tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Script {
        /// Substring matched against the user prompt; empty matches any.
        key: String,
        response: Option<String>,
        /// Number of leading calls for this key that fail with a transport
        /// error before `response` is served.
        fail_first: usize,
    }

    /// Judge stub answering from a fixed script, with call accounting and
    /// concurrency tracking.
    pub struct ScriptedJudge {
        scripts: Vec<Script>,
        delay: Option<Duration>,
        total_calls: AtomicUsize,
        calls_by_key: Mutex<HashMap<String, usize>>,
        prompts: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl ScriptedJudge {
        pub fn new() -> Self {
            Self {
                scripts: Vec::new(),
                delay: None,
                total_calls: AtomicUsize::new(0),
                calls_by_key: Mutex::new(HashMap::new()),
                prompts: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }

        pub fn respond(mut self, key: &str, json: &str) -> Self {
            self.scripts.push(Script {
                key: key.to_string(),
                response: Some(json.to_string()),
                fail_first: 0,
            });
            self
        }

        /// Every call matching `key` fails with a transport error.
        pub fn fail(mut self, key: &str) -> Self {
            self.scripts.push(Script {
                key: key.to_string(),
                response: None,
                fail_first: usize::MAX,
            });
            self
        }

        /// The first `fails` calls matching `key` fail, later ones succeed.
        pub fn flaky(mut self, key: &str, fails: usize, json: &str) -> Self {
            self.scripts.push(Script {
                key: key.to_string(),
                response: Some(json.to_string()),
                fail_first: fails,
            });
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.total_calls.load(Ordering::SeqCst)
        }

        pub fn calls_for(&self, key: &str) -> usize {
            self.calls_by_key.lock().get(key).copied().unwrap_or(0)
        }

        pub fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().clone()
        }
    }

    impl Default for ScriptedJudge {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Judge for ScriptedJudge {
        async fn judge(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, JudgeError> {
            self.total_calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push(user_prompt.to_string());

            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let outcome = match self
                .scripts
                .iter()
                .find(|script| user_prompt.contains(&script.key))
            {
                Some(script) => {
                    let seen = {
                        let mut counts = self.calls_by_key.lock();
                        let entry = counts.entry(script.key.clone()).or_insert(0);
                        *entry += 1;
                        *entry
                    };
                    if seen <= script.fail_first {
                        Err(JudgeError::Transport("scripted transport failure".into()))
                    } else {
                        match &script.response {
                            Some(json) => Ok(json.clone()),
                            None => Err(JudgeError::Transport("scripted transport failure".into())),
                        }
                    }
                }
                None => Err(JudgeError::Output("no script for prompt".into())),
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            outcome
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }
}
