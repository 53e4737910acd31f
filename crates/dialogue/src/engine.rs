//! Dialogue engine
//!
//! The single entry point for the transport layer: one `TurnInput` in,
//! one `Reply` out, never an error. Routing happens first; after a turn
//! is routed, every downstream failure (catalog misses, LLM outages,
//! unparseable replies) is absorbed into a `Direct` reply. The `Error`
//! variant only surfaces session lookup failures the user must react to.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nb_assistant_catalog::{CatalogStore, VectorIndex};
use nb_assistant_config::AssistantConfig;
use nb_assistant_core::{
    ErrorKind, Intent, Preference, Reply, ResponseObject, Topic, TurnInput,
};
use nb_assistant_llm::{parse_reply, LlmClient, PromptBuilder, PromptContext};

use crate::extractor::EntityExtractor;
use crate::funnel::{FunnelController, FunnelEvent, FunnelOutcome, DEFAULT_SWEEP_INTERVAL};
use crate::planner::{PlanOutcome, RetrievalPlan, RetrievalPlanner};
use crate::router::{IntentRouter, Route};
use crate::shaper;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Ask all funnel questions at once instead of stepwise.
    pub one_shot: bool,
    /// Budget for one LLM call; past it the fallback answers.
    pub llm_deadline: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            one_shot: false,
            llm_deadline: Duration::from_secs(30),
        }
    }
}

pub struct DialogueEngine {
    catalog: Arc<CatalogStore>,
    llm: Arc<dyn LlmClient>,
    extractor: EntityExtractor,
    router: IntentRouter,
    funnel: Arc<FunnelController>,
    planner: RetrievalPlanner,
    prompts: PromptBuilder,
    options: EngineOptions,
}

impl DialogueEngine {
    pub fn new(
        config: Arc<AssistantConfig>,
        catalog: Arc<CatalogStore>,
        vectors: Arc<VectorIndex>,
        llm: Arc<dyn LlmClient>,
        options: EngineOptions,
    ) -> Self {
        let extractor = EntityExtractor::new(Arc::clone(&config), Arc::clone(&catalog));
        let router = IntentRouter::new(Arc::clone(&config), Arc::clone(&catalog));
        let funnel = Arc::new(FunnelController::new(Arc::clone(&config)));
        let planner = RetrievalPlanner::new(
            Arc::clone(&catalog),
            vectors,
            config.funnel.default_series.clone(),
        );
        let prompts = PromptBuilder::new(config.prompt_template.clone());
        Self {
            catalog,
            llm,
            extractor,
            router,
            funnel,
            planner,
            prompts,
            options,
        }
    }

    /// The funnel controller, e.g. for wiring the periodic expiry sweep.
    pub fn funnel(&self) -> &Arc<FunnelController> {
        &self.funnel
    }

    /// Spawn the hourly session sweep; returns its shutdown handle.
    pub fn start_session_sweep(&self) -> tokio::sync::watch::Sender<bool> {
        self.funnel.start_cleanup_task(DEFAULT_SWEEP_INTERVAL)
    }

    /// Handle one user turn.
    pub async fn handle_turn(&self, input: TurnInput) -> Reply {
        match input {
            TurnInput::Query { text } => self.handle_query(&text).await,
            TurnInput::FunnelAnswer {
                session_id,
                option_id,
                step_index,
            } => {
                let event = self.funnel.answer(&session_id, &option_id, step_index);
                self.reply_for_event(&session_id, event).await
            }
            TurnInput::FunnelBatchAnswer {
                session_id,
                answers,
            } => {
                let event = self.funnel.answer_batch(&session_id, &answers);
                self.reply_for_event(&session_id, event).await
            }
        }
    }

    /// The pending question for an open session, as requested by the
    /// transport after a `FunnelStart` notification.
    pub async fn next_question(&self, session_id: &str) -> Reply {
        let event = self.funnel.current_question(session_id);
        self.reply_for_event(session_id, event).await
    }

    async fn handle_query(&self, query: &str) -> Reply {
        let intent = self.extractor.extract(query);
        match self.router.route(query, &intent, &self.funnel) {
            Route::Listing => Reply::Direct {
                response: shaper::listing_reply(&self.catalog),
            },
            Route::UnknownSeries(tokens) => Reply::Direct {
                response: shaper::unknown_series_reply(&tokens, &self.catalog),
            },
            Route::Funnel(_) => {
                if self.options.one_shot {
                    match self.funnel.start_batch(query) {
                        Some((session_id, FunnelEvent::Batch { questions, note })) => {
                            Reply::FunnelBatch {
                                session_id,
                                questions,
                                note,
                            }
                        }
                        _ => self.direct_answer(&intent).await,
                    }
                } else {
                    match self.funnel.start(query) {
                        Some((session_id, _first_question)) => Reply::FunnelStart {
                            session_id,
                            message: "為了更精準地幫助您，我想先確認幾個需求重點。".to_string(),
                        },
                        // No questions configured: degrade to a direct
                        // answer rather than a dead end.
                        None => self.direct_answer(&intent).await,
                    }
                }
            }
            Route::Direct => self.direct_answer(&intent).await,
        }
    }

    async fn reply_for_event(&self, session_id: &str, event: FunnelEvent) -> Reply {
        match event {
            FunnelEvent::Question {
                step_index,
                total_steps,
                question,
                note,
            } => Reply::FunnelQuestion {
                session_id: session_id.to_string(),
                step_index,
                total_steps,
                question,
                note,
            },
            FunnelEvent::Batch { questions, note } => Reply::FunnelBatch {
                session_id: session_id.to_string(),
                questions,
                note,
            },
            FunnelEvent::Complete(outcome) => self.complete_funnel(outcome).await,
            FunnelEvent::Expired => Reply::Error {
                kind: ErrorKind::SessionExpired,
                message: "對話已過期，請重新描述您的需求。".to_string(),
            },
            FunnelEvent::NotFound => Reply::Error {
                kind: ErrorKind::SessionNotFound,
                message: "找不到這個對話，請重新開始。".to_string(),
            },
        }
    }

    /// The funnel finished: its session state is already committed and
    /// removed, so nothing here can corrupt a session even when the turn
    /// is cancelled mid-LLM-call.
    async fn complete_funnel(&self, outcome: FunnelOutcome) -> Reply {
        let response = match self.planner.plan_funnel(&outcome) {
            PlanOutcome::DataUnavailable { field, names } => {
                shaper::data_unavailable_reply(field, &names)
            }
            PlanOutcome::Plan(plan) if plan.rows.is_empty() => shaper::no_rows_reply(),
            PlanOutcome::Plan(plan) => {
                self.answer_with_llm(
                    Topic::Comparison,
                    &outcome.enhanced_query,
                    &plan,
                    &outcome.preferences,
                )
                .await
            }
        };
        Reply::FunnelComplete {
            session_id: outcome.session_id,
            preferences: outcome.preferences,
            reply: response,
        }
    }

    async fn direct_answer(&self, intent: &Intent) -> Reply {
        let response = match self.planner.plan(intent) {
            PlanOutcome::DataUnavailable { field, names } => {
                shaper::data_unavailable_reply(field, &names)
            }
            PlanOutcome::Plan(plan) if plan.rows.is_empty() => shaper::no_rows_reply(),
            PlanOutcome::Plan(plan) => {
                self.answer_with_llm(intent.topic, &intent.original_query, &plan, &[])
                    .await
            }
        };
        Reply::Direct { response }
    }

    /// One LLM round under the turn deadline. Every failure mode lands in
    /// the rule-based fallback, which is indistinguishable in shape from
    /// a parsed reply.
    async fn answer_with_llm(
        &self,
        topic: Topic,
        query: &str,
        plan: &RetrievalPlan,
        preferences: &[Preference],
    ) -> ResponseObject {
        let prompt = self.prompts.build(&PromptContext {
            query,
            topic,
            rows: &plan.rows,
            target_names: &plan.target_names,
            preferences,
        });

        let started = Instant::now();
        let result = tokio::time::timeout(self.options.llm_deadline, self.llm.complete(&prompt))
            .await
            .unwrap_or(Err(nb_assistant_llm::LlmError::Timeout));
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(text) => {
                tracing::info!(latency_ms, outcome = "success", "llm call finished");
                match parse_reply(&text, &plan.target_names) {
                    Ok(response) => {
                        tracing::info!(shaping = "llm_parsed", "reply shaped");
                        response
                    }
                    Err(error) => {
                        tracing::warn!(shaping = "fallback", %error, "llm reply unusable");
                        shaper::fallback_reply(topic, &plan.rows, &plan.target_names)
                    }
                }
            }
            Err(error) => {
                tracing::warn!(latency_ms, outcome = "error", %error, "llm call failed");
                shaper::fallback_reply(topic, &plan.rows, &plan.target_names)
            }
        }
    }
}
