//! The evaluation engine.
//!
//! One request fans out over the requested schemes and their transitive
//! dependencies. Concurrency rules:
//!
//! - every scheme is evaluated at most once per request, enforced by a
//!   request-local map of shared futures;
//! - every judge call, across all inflight requests, passes through one
//!   process-wide counting semaphore;
//! - a failing scheme settles into a fallback result and never aborts its
//!   siblings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use gutachter_core::{
    checklist, derived, gate, rubric, ContextType, EvaluationResult, ScaleInfo, Scheme,
    SchemeKind, SchemeRegistry,
};

use crate::judge::{Judge, JudgeError};
use crate::parser;
use crate::prompts;
use crate::resilience::{self, RetryPolicy};

// Judged kinds run cool; rubric selection gets slightly more room.
const GATE_TEMPERATURE: f32 = 0.1;
const CHECKLIST_TEMPERATURE: f32 = 0.1;
const ORDINAL_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the global judge-call semaphore.
    pub max_concurrent_judge_calls: usize,
    /// Deadline per judge call; a timed-out call counts as a transport
    /// failure and releases its semaphore slot.
    pub judge_timeout: Duration,
    pub retry: RetryPolicy,
    pub max_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_judge_calls: 20,
            judge_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            max_tokens: 1024,
        }
    }
}

/// Outcome of one evaluation request.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// One result per requested scheme id, in request order.
    pub results: Vec<EvaluationResult>,
    /// AND over all requested binary-gate results.
    pub gates_passed: bool,
    /// Mean over all numeric results, absent if there are none.
    pub overall_score: Option<f64>,
    /// Label of the first numeric result.
    pub overall_label: Option<String>,
    pub metadata: OutcomeMetadata,
}

#[derive(Debug, Clone)]
pub struct OutcomeMetadata {
    pub processing_time_ms: u64,
    pub model_used: String,
}

type SharedEval = Shared<BoxFuture<'static, Arc<EvaluationResult>>>;

pub struct EvaluationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: Arc<SchemeRegistry>,
    judge: Arc<dyn Judge>,
    limiter: Arc<Semaphore>,
    config: EngineConfig,
}

impl EvaluationEngine {
    pub fn new(registry: Arc<SchemeRegistry>, judge: Arc<dyn Judge>, config: EngineConfig) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_judge_calls));
        Self {
            inner: Arc::new(EngineInner {
                registry,
                judge,
                limiter,
                config,
            }),
        }
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.inner.registry
    }

    pub fn model(&self) -> &str {
        self.inner.judge.model()
    }

    /// Evaluate `text` against the requested schemes.
    ///
    /// Every requested id yields exactly one result, in request order.
    /// Unknown ids settle into entry-level error results; they never fail
    /// the request.
    pub async fn evaluate(
        &self,
        text: &str,
        scheme_ids: &[String],
        context: ContextType,
    ) -> EvaluationOutcome {
        let started = Instant::now();
        tracing::debug!(schemes = scheme_ids.len(), ?context, "starting evaluation");

        let scope = Arc::new(RequestScope {
            engine: Arc::clone(&self.inner),
            text: Arc::<str>::from(text),
            context,
            cache: Mutex::new(HashMap::new()),
        });

        let demands: Vec<SharedEval> = scheme_ids.iter().map(|id| scope.demand(id)).collect();
        let settled = join_all(demands).await;
        // Drop the settled futures so the scope's self-references go away
        // with the request.
        scope.cache.lock().clear();

        let results: Vec<EvaluationResult> = settled.iter().map(|r| (**r).clone()).collect();

        let gates_passed = results.iter().all(|r| {
            !(matches!(r.scale_info, ScaleInfo::Gate { .. }) && r.value.as_bool() == Some(false))
        });

        let numeric: Vec<(&EvaluationResult, f64)> = results
            .iter()
            .filter_map(|r| r.value.as_f64().map(|v| (r, v)))
            .collect();
        let overall_score = (!numeric.is_empty())
            .then(|| numeric.iter().map(|(_, v)| v).sum::<f64>() / numeric.len() as f64);
        let overall_label = numeric
            .first()
            .map(|(r, _)| r.label.clone())
            .filter(|label| !label.is_empty());

        EvaluationOutcome {
            results,
            gates_passed,
            overall_score,
            overall_label,
            metadata: OutcomeMetadata {
                processing_time_ms: started.elapsed().as_millis() as u64,
                model_used: self.inner.judge.model().to_string(),
            },
        }
    }
}

/// State owned by a single request: the input, the rule-scope context and
/// the memoization table. Never shared across requests.
struct RequestScope {
    engine: Arc<EngineInner>,
    text: Arc<str>,
    context: ContextType,
    cache: Mutex<HashMap<String, SharedEval>>,
}

impl RequestScope {
    /// Demand a scheme's result. The first demand inserts an in-flight
    /// shared future; every later demand, from any branch of the DAG,
    /// awaits that same handle.
    fn demand(self: &Arc<Self>, id: &str) -> SharedEval {
        let mut cache = self.cache.lock();
        if let Some(entry) = cache.get(id) {
            return entry.clone();
        }
        let scope = Arc::clone(self);
        let scheme_id = id.to_string();
        let eval = async move { Arc::new(scope.evaluate_scheme(scheme_id).await) }
            .boxed()
            .shared();
        cache.insert(id.to_string(), eval.clone());
        eval
    }

    async fn evaluate_scheme(self: Arc<Self>, id: String) -> EvaluationResult {
        let Some(scheme) = self.engine.registry.get(&id) else {
            tracing::warn!(scheme = %id, "unknown scheme requested");
            return EvaluationResult::unknown_scheme(&id);
        };

        match &scheme.kind {
            SchemeKind::Derived(payload) => {
                let demands: Vec<SharedEval> = scheme
                    .dependencies
                    .iter()
                    .map(|dep| self.demand(dep))
                    .collect();
                let deps = join_all(demands).await;
                derived::resolve(&scheme, payload, &deps)
            }
            SchemeKind::BinaryGate(payload) => {
                if gate::applicable_rules(payload, self.context).is_empty() {
                    // Nothing to ask the judge; the gate resolves by its
                    // default action.
                    return gate::resolve(&scheme, payload, self.context, &BTreeMap::new());
                }
                let prompt = prompts::gate_prompt(&self.text, &scheme, payload, self.context);
                match self.call_judge(&prompt, GATE_TEMPERATURE).await {
                    Ok(raw) => match parser::parse_gate_response(&raw) {
                        Ok(triggers) => gate::resolve(&scheme, payload, self.context, &triggers),
                        Err(err) => self.judge_failure(&scheme, &err.to_string()),
                    },
                    Err(err) => self.judge_failure(&scheme, &err.to_string()),
                }
            }
            SchemeKind::ChecklistAdditive(payload) => {
                let prompt = prompts::checklist_prompt(&self.text, &scheme, payload);
                match self.call_judge(&prompt, CHECKLIST_TEMPERATURE).await {
                    Ok(raw) => match parser::parse_checklist_response(&raw) {
                        Ok(ratings) => checklist::aggregate(&scheme, payload, &ratings),
                        Err(err) => self.judge_failure(&scheme, &err.to_string()),
                    },
                    Err(err) => self.judge_failure(&scheme, &err.to_string()),
                }
            }
            SchemeKind::OrdinalRubric(payload) => {
                let prompt = prompts::ordinal_prompt(&self.text, &scheme, payload);
                match self.call_judge(&prompt, ORDINAL_TEMPERATURE).await {
                    Ok(raw) => match parser::parse_ordinal_response(&raw) {
                        Ok(selection) => rubric::resolve(&scheme, payload, &selection),
                        Err(err) => self.judge_failure(&scheme, &err.to_string()),
                    },
                    Err(err) => self.judge_failure(&scheme, &err.to_string()),
                }
            }
        }
    }

    /// One judge call under the global limiter, with per-call timeout and
    /// transport retries. The permit is released before any backoff sleep.
    async fn call_judge(&self, prompt: &str, temperature: f32) -> Result<String, JudgeError> {
        let engine = &self.engine;
        resilience::with_retries(&engine.config.retry, || async move {
            let permit = Arc::clone(&engine.limiter)
                .acquire_owned()
                .await
                .map_err(|_| JudgeError::Transport("concurrency limiter closed".into()))?;
            let call = engine.judge.judge(
                prompts::SYSTEM_PROMPT,
                prompt,
                temperature,
                engine.config.max_tokens,
            );
            let result = match tokio::time::timeout(engine.config.judge_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(JudgeError::Timeout(engine.config.judge_timeout)),
            };
            drop(permit);
            result
        })
        .await
    }

    fn judge_failure(&self, scheme: &Scheme, detail: &str) -> EvaluationResult {
        tracing::warn!(scheme = %scheme.id, error = %detail, "scheme evaluation failed, using fallback");
        EvaluationResult::errored(scheme, format!("Bewertung fehlgeschlagen: {detail}"))
    }
}
