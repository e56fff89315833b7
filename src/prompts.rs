//! Generation prompt for Parsons puzzles.
//!
//! The prompt states the puzzle structure, optional few-shot examples, size targets
//! (taken from scheduler parameters when available) and the strict JSON schema the
//! parser expects.

use crate::config::Prompts;
use crate::domain::{Difficulty, DifficultyParameters};
use crate::util::fill_template;

const FEW_SHOT_EXAMPLES: &str = r#"Example 1 (Python, wrong-operator distractor):
Correct code:
def square(n):
    result = n * n
    return result
Expected JSON:
{
  "lines": ["def square(n):", "    result = n * n", "    return result"],
  "distractors": ["    result = n * 2", "    return n"],
  "solutionOrder": [0, 1, 2],
  "problem": "Calculate the square of a number",
  "hint": "Multiply the number by itself"
}

Example 2 (Python, off-by-one distractor):
Correct code:
def sum_first_n(n):
    total = 0
    for i in range(1, n + 1):
        total += i
    return total
Expected JSON:
{
  "lines": ["def sum_first_n(n):", "    total = 0", "    for i in range(1, n + 1):", "        total += i", "    return total"],
  "distractors": ["    for i in range(1, n):", "    total = n"],
  "solutionOrder": [0, 1, 2, 3, 4],
  "problem": "Sum the integers from 1 to n",
  "hint": "The range must include n"
}

Example 3 (JavaScript, wrong-condition distractor):
Correct code:
function isEven(num) {
    if (num % 2 === 0) {
        return true;
    }
    return false;
}
Expected JSON:
{
  "lines": ["function isEven(num) {", "    if (num % 2 === 0) {", "        return true;", "    }", "    return false;", "}"],
  "distractors": ["    if (num % 2 === 1) {", "    return num;"],
  "solutionOrder": [0, 1, 2, 3, 4, 5],
  "problem": "Check whether a number is even",
  "hint": "Look at the remainder after dividing by 2"
}

Example 4 (Python, scrambled lines):
Correct code:
def get_last(arr):
    if len(arr) == 0:
        return None
    return arr[len(arr) - 1]
Expected JSON:
{
  "lines": ["    return arr[len(arr) - 1]", "def get_last(arr):", "        return None", "    if len(arr) == 0:"],
  "distractors": ["    return arr[len(arr)]", "    if len(arr) == 1:"],
  "solutionOrder": [1, 3, 2, 0],
  "problem": "Get the last element of a list",
  "hint": "The last index is the length minus one"
}"#;

const SCHEMA_BLOCK: &str = r#"IMPORTANT: Return ONLY valid JSON matching this exact schema:
{
  "lines": ["line1", "line2", ...],
  "distractors": ["distractor1", "distractor2", ...],
  "solutionOrder": [0, 1, 2, ...],
  "problem": "Brief description of what the code does",
  "hint": "Optional hint for students"
}

Schema requirements:
- "lines": array of valid {language} code lines, in scrambled order
- "distractors": array of plausible but incorrect lines (off-by-one, wrong operators, swapped variables)
- "solutionOrder": array of integer indices into "lines", in correct execution order
- "problem": what the code accomplishes
- "hint": short guidance that does not reveal the order

Example: if lines=["print(x)", "x = 5"], then solutionOrder=[1, 0].

Do not include explanations, markdown formatting, or any text outside the JSON object."#;

/// Inputs for one generation prompt.
#[derive(Clone, Debug)]
pub struct PromptSpec<'a> {
  pub topic: &'a str,
  pub language: &'a str,
  pub difficulty: Difficulty,
  /// Explicit size targets; difficulty defaults apply when absent.
  pub parameters: Option<&'a DifficultyParameters>,
  pub include_examples: bool,
}

/// Default size target when no scheduler parameters are supplied.
pub fn default_line_range(difficulty: Difficulty) -> &'static str {
  match difficulty {
    Difficulty::Easy => "4-6 lines",
    Difficulty::Medium => "7-10 lines",
    Difficulty::Hard => "11-15 lines",
  }
}

pub fn default_distractor_count(difficulty: Difficulty) -> u32 {
  match difficulty {
    Difficulty::Easy => 2,
    Difficulty::Medium => 3,
    Difficulty::Hard => 4,
  }
}

pub fn build_puzzle_prompt(spec: &PromptSpec<'_>) -> String {
  let language = spec.language;
  let difficulty = spec.difficulty.as_str();

  let mut prompt = format!(
    "Generate a Parsons puzzle for {language} programming.\n\n\
     A Parsons puzzle consists of:\n\
     1. Lines of code from a working program (scrambled)\n\
     2. Distractor lines that look similar but don't belong\n\
     3. The correct order of lines to solve the problem\n\n"
  );

  if spec.include_examples {
    prompt.push_str("Few-shot examples showing correct code, plausible distractors, and the expected JSON:\n\n");
    prompt.push_str(FEW_SHOT_EXAMPLES);
    prompt.push_str("\n\n");
  }

  let (size_line, distractor_line, trap_line) = match spec.parameters {
    Some(p) => (
      format!("- Number of code lines: {} (between {} and {})", p.lines.optimal, p.lines.min, p.lines.max),
      format!("- Number of distractors: {}", p.distractors.optimal),
      if p.semantic_traps.optimal > 0 {
        format!("- Include {} semantic trap(s): distractors that differ from a correct line by one subtle token\n", p.semantic_traps.optimal)
      } else {
        String::new()
      },
    ),
    None => (
      format!("- For {difficulty} difficulty: {}", default_line_range(spec.difficulty)),
      format!("- Number of distractors: {}", default_distractor_count(spec.difficulty)),
      String::new(),
    ),
  };

  prompt.push_str(&format!(
    "Requirements:\n\
     - Topic: {topic}\n\
     - Difficulty: {difficulty}\n\
     - Language: {language}\n\
     {size_line}\n\
     {distractor_line}\n\
     {trap_line}\
     - All lines should be syntactically valid {language}\n\
     - Distractors should be plausible but incorrect\n\
     - Code should solve a clear, educational problem\n\
     - Include proper indentation for {language}\n\n",
    topic = spec.topic,
  ));

  prompt.push_str(&fill_template(SCHEMA_BLOCK, &[("language", language)]));
  prompt
}

/// System + user message contents for one generation request.
pub fn generation_messages(prompts: &Prompts, spec: &PromptSpec<'_>) -> (String, String) {
  let system = fill_template(&prompts.generation_system, &[("language", spec.language)]);
  (system, build_puzzle_prompt(spec))
}
