//! Application state: in-memory puzzle and learner stores, prompts, and the model backend.
//!
//! This module owns:
//!   - generated puzzles by id
//!   - per-learner skill plus a short history of previous skills
//!   - the prompts struct (from TOML or defaults)
//!   - the completion backend (OpenRouter client, or a fake in tests)
//!
//! The core flows are pure; this is the only place that keeps anything between requests.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::{load_agent_config_from_env, Prompts};
use crate::domain::GeneratedPuzzle;
use crate::llm::{Completion, ModelClient};
use crate::orchestrator::{
    grade_submission, record_attempt_outcome, AttemptRecord, AttemptResult, Grade,
};
use crate::scheduler::SkillContext;

/// Skills kept per learner for smoothing.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LearnerRecord {
    /// `None` until the first graded attempt.
    pub skill: Option<f64>,
    /// Previous skills, oldest first.
    pub recent_skills: Vec<f64>,
    /// Graded submissions per puzzle id.
    pub attempts: HashMap<String, u32>,
}

impl LearnerRecord {
    pub fn context(&self) -> Option<SkillContext> {
        self.skill.map(|current_skill| SkillContext {
            current_skill,
            recent_skills: self.recent_skills.clone(),
            previous_band: None,
        })
    }
}

/// One submission as the host sees it.
#[derive(Clone, Copy, Debug)]
pub struct Submission<'a> {
    pub learner_id: &'a str,
    pub solution_order: &'a [usize],
    pub time_spent: f64,
    /// Falls back to the stored count for this puzzle plus one.
    pub attempts_count: Option<u32>,
}

#[derive(Clone)]
pub struct AppState {
    pub puzzles: Arc<RwLock<HashMap<String, GeneratedPuzzle>>>,
    pub learners: Arc<RwLock<HashMap<String, LearnerRecord>>>,
    pub llm: Arc<dyn Completion>,
    pub model_configured: bool,
    pub prompts: Prompts,
}

impl AppState {
    /// Build state from env: load config, then the OpenRouter client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();
        let client = ModelClient::from_env(&cfg.model);
        let model_configured = client.has_credentials();

        if model_configured {
            info!(target: "parsons_forge", model = %client.settings.model, base_url = %client.settings.base_url, "Model client configured");
        } else {
            warn!(target: "parsons_forge", "OPENROUTER_API_KEY not set; puzzle generation will fail until it is configured");
        }

        let mut state = Self::with_backend(Arc::new(client), cfg.prompts);
        state.model_configured = model_configured;
        state
    }

    pub fn with_backend(llm: Arc<dyn Completion>, prompts: Prompts) -> Self {
        Self {
            puzzles: Arc::new(RwLock::new(HashMap::new())),
            learners: Arc::new(RwLock::new(HashMap::new())),
            llm,
            model_configured: true,
            prompts,
        }
    }

    pub async fn insert_puzzle(&self, p: GeneratedPuzzle) {
        self.puzzles.write().await.insert(p.id.clone(), p);
    }

    pub async fn get_puzzle(&self, id: &str) -> Option<GeneratedPuzzle> {
        self.puzzles.read().await.get(id).cloned()
    }

    pub async fn learner(&self, id: &str) -> Option<LearnerRecord> {
        self.learners.read().await.get(id).cloned()
    }

    /// Grade a submission and fold it into the learner's skill.
    ///
    /// The learners write lock is held from read to write, so concurrent submissions
    /// for one learner apply one after another.
    #[instrument(level = "info", skip(self, puzzle, sub), fields(puzzle_id = %puzzle.id, learner_id = %sub.learner_id))]
    pub async fn record_submission(&self, puzzle: &GeneratedPuzzle, sub: Submission<'_>) -> (Grade, AttemptResult) {
        let grade = grade_submission(&puzzle.puzzle, sub.solution_order);

        let mut learners = self.learners.write().await;
        let entry = learners.entry(sub.learner_id.to_string()).or_default();

        let prior = entry.attempts.get(&puzzle.id).copied().unwrap_or(0);
        let attempts_count = sub.attempts_count.unwrap_or(prior + 1);
        entry.attempts.insert(puzzle.id.clone(), prior + 1);

        let mut history = entry.recent_skills.clone();
        if let Some(previous) = entry.skill {
            history.push(previous);
        }
        if history.len() > HISTORY_LIMIT {
            history.drain(..history.len() - HISTORY_LIMIT);
        }

        let result = record_attempt_outcome(&AttemptRecord {
            current_skill: entry.skill,
            recent_skills: history.clone(),
            puzzle_difficulty: puzzle.difficulty,
            is_correct: grade.correct,
            time_spent: sub.time_spent,
            attempts_count,
            max_time: None,
        });

        entry.skill = Some(result.skill_after);
        entry.recent_skills = history;
        (grade, result)
    }
}
