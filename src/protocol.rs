//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, DifficultyParameters, GeneratedPuzzle};
use crate::orchestrator::{AttemptResult, Grade};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
    pub ok: bool,
    pub model_configured: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateIn {
    pub topic: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub learner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIn {
    pub learner_id: String,
    pub solution_order: Vec<usize>,
    /// Seconds.
    #[serde(default)]
    pub time_spent: Option<f64>,
    #[serde(default)]
    pub attempts_count: Option<u32>,
}

/// What the frontend sees of a puzzle. The solution order never leaves the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleOut {
    pub id: String,
    pub title: String,
    pub description: String,
    pub topic: String,
    pub language: String,
    pub difficulty: Difficulty,
    pub lines: Vec<String>,
    pub distractors: Vec<String>,
    pub problem: String,
    pub hint: String,
    pub parameters: DifficultyParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOut {
    pub correct: bool,
    pub score: u8,
    pub skill_before: f64,
    pub skill_after: f64,
    pub recommended_difficulty: Difficulty,
    pub next_parameters: DifficultyParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerOut {
    pub learner_id: String,
    pub skill: f64,
    pub recent_skills: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}

/// Map internal puzzle to its public representation.
pub fn to_out(p: &GeneratedPuzzle) -> PuzzleOut {
    PuzzleOut {
        id: p.id.clone(),
        title: p.title.clone(),
        description: p.description.clone(),
        topic: p.topic.clone(),
        language: p.language.clone(),
        difficulty: p.difficulty,
        lines: p.puzzle.lines.clone(),
        distractors: p.puzzle.distractors.clone(),
        problem: p.puzzle.problem.clone(),
        hint: p.puzzle.hint.clone(),
        parameters: p.parameters.clone(),
    }
}

pub fn submit_out(grade: Grade, result: AttemptResult) -> SubmitOut {
    SubmitOut {
        correct: grade.correct,
        score: grade.score,
        skill_before: result.skill_before,
        skill_after: result.skill_after,
        recommended_difficulty: result.recommended_difficulty,
        next_parameters: result.next_parameters,
    }
}
