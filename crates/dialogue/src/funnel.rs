//! Funnel controller
//!
//! Owns every dialogue session. A session walks an ordered list of
//! multiple-choice questions selected by the detected scenario; answering
//! the last one produces the collected preferences, the merged row
//! filters and an enhanced query for retrieval and prompting.
//!
//! Sessions are single-writer: each lives behind its own mutex, so
//! concurrent answers to the same session serialize while different
//! sessions proceed independently. Expiry is opportunistic on every
//! operation, with a periodic sweep for sessions nobody touches again.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::watch;

use nb_assistant_config::{
    AssistantConfig, FilterSpec, MatchRule, NO_PREFERENCE_OPTION_IDS,
};
use nb_assistant_core::{
    Intent, IntentShape, OptionView, Preference, QuestionView, Scenario, Topic,
};

/// How many leading questions may be shuffled per session.
const SHUFFLE_PREFIX: usize = 3;

/// Default sweep interval for the background cleanup task.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// One live session. Only the controller touches these.
#[derive(Debug)]
struct FunnelSession {
    session_id: String,
    original_query: String,
    scenario: Scenario,
    question_order: Vec<String>,
    step_index: usize,
    answers: IndexMap<String, String>,
    created_at: Instant,
    updated_at: Instant,
}

/// Result of one controller operation.
#[derive(Debug)]
pub enum FunnelEvent {
    /// The question at `step_index`; `note` carries a validation message
    /// when an answer was rejected and the question is re-emitted.
    Question {
        step_index: usize,
        total_steps: usize,
        question: QuestionView,
        note: Option<String>,
    },
    /// The whole question list (one-shot mode), with the same note
    /// semantics.
    Batch {
        questions: Vec<QuestionView>,
        note: Option<String>,
    },
    /// All questions answered; the session is gone.
    Complete(FunnelOutcome),
    Expired,
    NotFound,
}

/// Everything the retrieval path needs from a finished funnel.
#[derive(Debug, Clone)]
pub struct FunnelOutcome {
    pub session_id: String,
    pub scenario: Scenario,
    pub original_query: String,
    pub preferences: Vec<Preference>,
    pub filters: FilterSpec,
    pub enhanced_query: String,
}

pub struct FunnelController {
    config: Arc<AssistantConfig>,
    sessions: RwLock<HashMap<String, Arc<Mutex<FunnelSession>>>>,
    ttl: Duration,
}

impl FunnelController {
    pub fn new(config: Arc<AssistantConfig>) -> Self {
        let ttl = Duration::from_secs(config.funnel.session_ttl_secs);
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Whether `query` should open a funnel, and under which scenario.
    ///
    /// Queries naming a known SKU or series never funnel, even when they
    /// also contain vague phrasing; neither do queries carrying series-like
    /// digit tokens, which are attempted specific references and belong to
    /// the unknown-series path.
    pub fn should_activate(&self, query: &str, intent: &Intent) -> Option<Scenario> {
        if intent.shape != IntentShape::Unknown {
            return None;
        }
        if has_series_like_token(query) {
            return None;
        }
        let query_lower = query.to_lowercase();
        let funnel = &self.config.funnel;

        let vague = funnel
            .trigger
            .vague
            .iter()
            .any(|k| query_lower.contains(&k.to_lowercase()));
        let unclear_topic = matches!(intent.topic, Topic::General | Topic::Unclear);
        let lifestyle = funnel.lifestyle_topics.contains(&intent.topic);

        if vague || unclear_topic || lifestyle {
            Some(funnel.detect_scenario(&query_lower))
        } else {
            None
        }
    }

    /// Open a stepwise session and return its id plus the first question.
    /// `None` when the configuration yields an empty question order.
    pub fn start(&self, query: &str) -> Option<(String, FunnelEvent)> {
        let session = self.create_session(query)?;
        let session_id = session.session_id.clone();
        let event = self.question_event(&session, None);
        self.sessions
            .write()
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));
        tracing::info!(session_id = %session_id, "funnel session started");
        Some((session_id, event))
    }

    /// Open a one-shot session and return the full question list.
    pub fn start_batch(&self, query: &str) -> Option<(String, FunnelEvent)> {
        let session = self.create_session(query)?;
        let session_id = session.session_id.clone();
        let event = FunnelEvent::Batch {
            questions: self.question_views(&session.question_order),
            note: None,
        };
        self.sessions
            .write()
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));
        tracing::info!(session_id = %session_id, "one-shot funnel session started");
        Some((session_id, event))
    }

    /// Record one answer. Re-answering the current step overwrites the
    /// previous choice; a stale `expected_step` or an unknown option id
    /// re-emits the current question without touching state.
    pub fn answer(
        &self,
        session_id: &str,
        option_id: &str,
        expected_step: Option<usize>,
    ) -> FunnelEvent {
        let handle = match self.lookup(session_id) {
            Ok(handle) => handle,
            Err(event) => return event,
        };
        let mut session = handle.lock();

        if let Some(step) = expected_step {
            if step != session.step_index {
                tracing::debug!(
                    session_id,
                    expected = step,
                    current = session.step_index,
                    "stale funnel answer ignored"
                );
                return self.question_event(&session, None);
            }
        }

        let feature_id = session.question_order[session.step_index].clone();
        let feature = &self.config.funnel.features[feature_id.as_str()];
        if feature.option(option_id).is_none() {
            tracing::info!(session_id, option_id, "invalid funnel answer");
            return self.question_event(
                &session,
                Some(format!("無效的選項：{}，請重新選擇", option_id)),
            );
        }

        session.answers.insert(feature_id, option_id.to_string());
        session.step_index += 1;
        session.updated_at = Instant::now();

        if session.step_index >= session.question_order.len() {
            let outcome = self.build_outcome(&session);
            let age_secs = session.created_at.elapsed().as_secs();
            drop(session);
            self.sessions.write().remove(session_id);
            tracing::info!(session_id, age_secs, "funnel session complete");
            FunnelEvent::Complete(outcome)
        } else {
            tracing::debug!(session_id, step = session.step_index, "funnel advanced");
            self.question_event(&session, None)
        }
    }

    /// Record a whole answer map at once. Semantics of the outcome match
    /// the stepwise path exactly; any unknown feature or option re-emits
    /// the batch with a note and no state change.
    pub fn answer_batch(
        &self,
        session_id: &str,
        answers: &HashMap<String, String>,
    ) -> FunnelEvent {
        let handle = match self.lookup(session_id) {
            Ok(handle) => handle,
            Err(event) => return event,
        };
        let mut session = handle.lock();

        for feature_id in &session.question_order {
            let Some(option_id) = answers.get(feature_id) else {
                return FunnelEvent::Batch {
                    questions: self.question_views(&session.question_order),
                    note: Some(format!("缺少問題 {} 的回答", feature_id)),
                };
            };
            let feature = &self.config.funnel.features[feature_id.as_str()];
            if feature.option(option_id).is_none() {
                return FunnelEvent::Batch {
                    questions: self.question_views(&session.question_order),
                    note: Some(format!("問題 {} 的選項 {} 無效", feature_id, option_id)),
                };
            }
        }

        for feature_id in session.question_order.clone() {
            let option_id = answers[&feature_id].clone();
            session.answers.insert(feature_id, option_id);
        }
        session.step_index = session.question_order.len();
        session.updated_at = Instant::now();

        let outcome = self.build_outcome(&session);
        drop(session);
        self.sessions.write().remove(session_id);
        tracing::info!(session_id, "one-shot funnel session complete");
        FunnelEvent::Complete(outcome)
    }

    /// The current question for `session_id`, e.g. right after a
    /// `FunnelStart` notification.
    pub fn current_question(&self, session_id: &str) -> FunnelEvent {
        match self.lookup(session_id) {
            Ok(handle) => {
                let session = handle.lock();
                self.question_event(&session, None)
            }
            Err(event) => event,
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Drop every session older than the TTL.
    pub fn cleanup_expired(&self) {
        let mut sessions = self.sessions.write();
        let ttl = self.ttl;
        let before = sessions.len();
        sessions.retain(|_, handle| handle.lock().updated_at.elapsed() <= ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "funnel sessions expired");
        }
    }

    /// Spawn the periodic sweep. Returns a shutdown sender; send `true`
    /// to stop the task.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => controller.cleanup_expired(),
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        shutdown_tx
    }

    fn create_session(&self, query: &str) -> Option<FunnelSession> {
        let query_lower = query.to_lowercase();
        let scenario = self.config.funnel.detect_scenario(&query_lower);
        let session_id = uuid::Uuid::new_v4().to_string();

        let mut question_order = self.config.funnel.question_order(scenario);
        if question_order.is_empty() {
            tracing::warn!(scenario = scenario.key(), "no funnel questions configured");
            return None;
        }
        if self.config.funnel.shuffle_leading_questions {
            shuffle_prefix(&mut question_order, &session_id);
        }

        let now = Instant::now();
        Some(FunnelSession {
            session_id,
            original_query: query.to_string(),
            scenario,
            question_order,
            step_index: 0,
            answers: IndexMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a session handle, expiring it opportunistically.
    fn lookup(&self, session_id: &str) -> Result<Arc<Mutex<FunnelSession>>, FunnelEvent> {
        let handle = {
            let sessions = self.sessions.read();
            sessions.get(session_id).cloned()
        };
        let Some(handle) = handle else {
            return Err(FunnelEvent::NotFound);
        };
        let expired = handle.lock().updated_at.elapsed() > self.ttl;
        if expired {
            self.sessions.write().remove(session_id);
            tracing::info!(session_id, "funnel session expired on access");
            return Err(FunnelEvent::Expired);
        }
        Ok(handle)
    }

    fn question_event(&self, session: &FunnelSession, note: Option<String>) -> FunnelEvent {
        let feature_id = &session.question_order[session.step_index];
        FunnelEvent::Question {
            step_index: session.step_index,
            total_steps: session.question_order.len(),
            question: self.question_view(feature_id),
            note,
        }
    }

    fn question_views(&self, order: &[String]) -> Vec<QuestionView> {
        order.iter().map(|id| self.question_view(id)).collect()
    }

    fn question_view(&self, feature_id: &str) -> QuestionView {
        let feature = &self.config.funnel.features[feature_id];
        QuestionView {
            feature_id: feature_id.to_string(),
            prompt_text: feature.prompt_text.clone(),
            options: feature
                .options
                .iter()
                .map(|o| OptionView {
                    option_id: o.option_id.clone(),
                    label: o.label.clone(),
                    description: o.description.clone(),
                })
                .collect(),
        }
    }

    fn build_outcome(&self, session: &FunnelSession) -> FunnelOutcome {
        let mut preferences = Vec::new();
        let mut filters: IndexMap<String, MatchRule> = IndexMap::new();

        for (feature_id, option_id) in &session.answers {
            let feature = &self.config.funnel.features[feature_id.as_str()];
            let Some(option) = feature.option(option_id) else {
                continue;
            };
            if NO_PREFERENCE_OPTION_IDS.contains(&option_id.as_str()) {
                continue;
            }
            preferences.push(Preference {
                feature_id: feature_id.clone(),
                feature_label: if feature.name.is_empty() {
                    feature_id.clone()
                } else {
                    feature.name.clone()
                },
                option_id: option_id.clone(),
                option_label: option.label.clone(),
            });
            for (field, rule) in &option.filter {
                filters.insert(field.clone(), rule.clone());
            }
        }

        let enhanced_query = enhance_query(&session.original_query, &preferences);
        FunnelOutcome {
            session_id: session.session_id.clone(),
            scenario: session.scenario,
            original_query: session.original_query.clone(),
            preferences,
            filters,
            enhanced_query,
        }
    }
}

/// `true` when the query carries a run of three or more digits, i.e.
/// an attempted concrete series or model reference.
fn has_series_like_token(query: &str) -> bool {
    let mut run = 0usize;
    for b in query.bytes() {
        if b.is_ascii_digit() {
            run += 1;
            if run >= 3 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Shuffle the first [`SHUFFLE_PREFIX`] entries with a generator seeded
/// from the session id, so a transcript is reproducible from its id.
fn shuffle_prefix(order: &mut [String], session_id: &str) {
    let prefix = SHUFFLE_PREFIX.min(order.len());
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    session_id.hash(&mut hasher);
    let mut rng = rand::rngs::StdRng::seed_from_u64(hasher.finish());
    order[..prefix].shuffle(&mut rng);
}

/// Weave the chosen preferences back into the original query text.
fn enhance_query(original: &str, preferences: &[Preference]) -> String {
    if preferences.is_empty() {
        return original.to_string();
    }
    let parts: Vec<String> = preferences
        .iter()
        .map(|p| format!("{}: {}", p.feature_label, p.option_label))
        .collect();
    format!("根據以下偏好條件：{}，{}", parts.join(" | "), original)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FUNNEL: &str = r#"{
        "features": {
            "gpu": {"name": "顯示晶片", "prompt_text": "需要怎樣的顯示效能？", "options": [
                {"option_id": "discrete", "label": "獨立顯卡", "filter": {"gpu": {"any_of": ["rtx", "rx"]}}},
                {"option_id": "no_preference", "label": "沒有偏好"}]},
            "cpu": {"name": "處理器", "prompt_text": "需要怎樣的運算效能？", "options": [
                {"option_id": "high", "label": "高效能", "filter": {"cpu": {"any_of": ["r7", "r9", "i7", "i9"]}}},
                {"option_id": "no_preference", "label": "沒有偏好"}]},
            "price": {"name": "預算", "prompt_text": "預算範圍？", "options": [
                {"option_id": "budget", "label": "經濟實惠", "filter": {"price": {"max": 1000}}},
                {"option_id": "flexible", "label": "彈性"}]}
        },
        "priorities": {
            "gaming": ["gpu", "cpu", "price"],
            "business": ["cpu", "price", "gpu"],
            "general": ["cpu", "gpu", "price"]
        },
        "scenario_keywords": {"gaming": ["遊戲"], "business": ["辦公", "商務"]},
        "lifestyle_topics": ["portability"],
        "trigger_keywords": {"vague": ["推薦", "適合"], "comparison": ["比較"]},
        "session_ttl_secs": 86400
    }"#;

    fn controller() -> FunnelController {
        let config = AssistantConfig::from_strs(
            r#"{"intent_keywords": {"portability": {"keywords": ["輕便"], "description": ""}}}"#,
            r#"{"entity_patterns": {
                "MODEL_NAME": {"patterns": ["[A-Z]{2,4}\\d{3}"]},
                "SERIES_KEY": {"patterns": ["\\d{3}"]}}}"#,
            FUNNEL,
            "{context} {query}",
        )
        .unwrap();
        FunnelController::new(Arc::new(config))
    }

    fn vague_intent(query: &str, topic: Topic) -> Intent {
        Intent {
            original_query: query.to_string(),
            model_names: Vec::new(),
            series_keys: Vec::new(),
            topic,
            shape: IntentShape::Unknown,
        }
    }

    #[test]
    fn test_activation_on_vague_query() {
        let controller = controller();
        let intent = vague_intent("我想要一台適合辦公的筆電", Topic::General);
        assert_eq!(
            controller.should_activate("我想要一台適合辦公的筆電", &intent),
            Some(Scenario::Business)
        );
    }

    #[test]
    fn test_activation_on_lifestyle_topic() {
        let controller = controller();
        let intent = vague_intent("想要輕便一點的", Topic::Portability);
        assert_eq!(
            controller.should_activate("想要輕便一點的", &intent),
            Some(Scenario::General)
        );
    }

    #[test]
    fn test_no_activation_when_model_named() {
        let controller = controller();
        let mut intent = vague_intent("推薦 AG958 嗎", Topic::General);
        intent.model_names = vec!["AG958".to_string()];
        intent.shape = IntentShape::SpecificModel;
        assert_eq!(controller.should_activate("推薦 AG958 嗎", &intent), None);
    }

    #[test]
    fn test_no_activation_on_series_like_token() {
        // "777 系列" is an attempted concrete reference; the router's
        // unknown-series path owns it.
        let controller = controller();
        let intent = vague_intent("777 系列有哪些？", Topic::General);
        assert_eq!(controller.should_activate("777 系列有哪些？", &intent), None);
    }

    #[test]
    fn test_stepwise_flow_to_completion() {
        let controller = controller();
        let (session_id, first) = controller.start("適合辦公的筆電").unwrap();
        let FunnelEvent::Question {
            step_index,
            total_steps,
            question,
            ..
        } = first
        else {
            panic!("expected a question");
        };
        assert_eq!(step_index, 0);
        assert_eq!(total_steps, 3);

        // Answer every step with its first option.
        let mut current = question;
        for step in 0..total_steps {
            let option = current.options[0].option_id.clone();
            match controller.answer(&session_id, &option, Some(step)) {
                FunnelEvent::Question {
                    step_index,
                    question,
                    ..
                } => {
                    assert_eq!(step_index, step + 1);
                    current = question;
                }
                FunnelEvent::Complete(outcome) => {
                    assert_eq!(step, total_steps - 1);
                    assert_eq!(outcome.preferences.len(), 3);
                    assert!(outcome.filters.contains_key("cpu"));
                    assert!(outcome.enhanced_query.contains("適合辦公的筆電"));
                    assert_eq!(controller.session_count(), 0);
                    return;
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        panic!("funnel never completed");
    }

    #[test]
    fn test_invalid_option_re_emits_question() {
        let controller = controller();
        let (session_id, _) = controller.start("適合辦公的筆電").unwrap();
        let event = controller.answer(&session_id, "nonsense", None);
        let FunnelEvent::Question {
            step_index, note, ..
        } = event
        else {
            panic!("expected the current question back");
        };
        assert_eq!(step_index, 0);
        assert!(note.is_some());
    }

    #[test]
    fn test_stale_step_is_ignored() {
        let controller = controller();
        let (session_id, _) = controller.start("適合辦公的筆電").unwrap();
        let first_option = {
            let FunnelEvent::Question { question, .. } = controller.current_question(&session_id)
            else {
                panic!();
            };
            question.options[0].option_id.clone()
        };
        controller.answer(&session_id, &first_option, Some(0));
        // Replaying step 0 must not advance or mutate anything.
        let event = controller.answer(&session_id, &first_option, Some(0));
        let FunnelEvent::Question { step_index, .. } = event else {
            panic!("expected the current question back");
        };
        assert_eq!(step_index, 1);
    }

    #[test]
    fn test_unknown_session() {
        let controller = controller();
        assert!(matches!(
            controller.answer("missing", "x", None),
            FunnelEvent::NotFound
        ));
    }

    #[test]
    fn test_batch_flow() {
        let controller = controller();
        let (session_id, event) = controller.start_batch("適合遊戲的筆電").unwrap();
        let FunnelEvent::Batch { questions, .. } = event else {
            panic!("expected the question list");
        };
        assert_eq!(questions.len(), 3);

        let mut answers = HashMap::new();
        for q in &questions {
            answers.insert(q.feature_id.clone(), q.options[0].option_id.clone());
        }
        let FunnelEvent::Complete(outcome) = controller.answer_batch(&session_id, &answers) else {
            panic!("expected completion");
        };
        assert_eq!(outcome.scenario, Scenario::Gaming);
        assert_eq!(outcome.preferences.len(), 3);
    }

    #[test]
    fn test_batch_rejects_missing_answer() {
        let controller = controller();
        let (session_id, _) = controller.start_batch("適合遊戲的筆電").unwrap();
        let answers = HashMap::from([("gpu".to_string(), "discrete".to_string())]);
        let event = controller.answer_batch(&session_id, &answers);
        assert!(matches!(event, FunnelEvent::Batch { note: Some(_), .. }));
        // Session is still alive and unanswered.
        assert_eq!(controller.session_count(), 1);
    }

    #[test]
    fn test_no_preference_answers_contribute_nothing() {
        let controller = controller();
        let (session_id, event) = controller.start_batch("隨便").unwrap();
        let FunnelEvent::Batch { questions, .. } = event else {
            panic!();
        };
        let mut answers = HashMap::new();
        for q in &questions {
            let no_pref = q
                .options
                .iter()
                .find(|o| NO_PREFERENCE_OPTION_IDS.contains(&o.option_id.as_str()))
                .unwrap();
            answers.insert(q.feature_id.clone(), no_pref.option_id.clone());
        }
        let FunnelEvent::Complete(outcome) = controller.answer_batch(&session_id, &answers) else {
            panic!();
        };
        assert!(outcome.preferences.is_empty());
        assert!(outcome.filters.is_empty());
        assert_eq!(outcome.enhanced_query, "隨便");
    }

    #[test]
    fn test_shuffle_is_reproducible_from_session_id() {
        let mut a = vec!["gpu".to_string(), "cpu".to_string(), "price".to_string()];
        let mut b = a.clone();
        shuffle_prefix(&mut a, "session-1");
        shuffle_prefix(&mut b, "session-1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_enhance_query_format() {
        let prefs = vec![Preference {
            feature_id: "gpu".to_string(),
            feature_label: "顯示晶片".to_string(),
            option_id: "discrete".to_string(),
            option_label: "獨立顯卡".to_string(),
        }];
        let enhanced = enhance_query("找一台筆電", &prefs);
        assert_eq!(enhanced, "根據以下偏好條件：顯示晶片: 獨立顯卡，找一台筆電");
    }
}
