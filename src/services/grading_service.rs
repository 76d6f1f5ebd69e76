use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

use crate::models::attempt::JsonMap;
use crate::models::question::{Question, QuestionType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question_id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub answer: JsonValue,
    pub points_earned: i32,
    pub max_points: i32,
    /// `None` while the answer waits for manual review.
    pub is_correct: Option<bool>,
    pub needs_review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub score: i32,
    pub max_score: i32,
    pub needs_review: bool,
    pub answers: Vec<GradedAnswer>,
}

pub struct GradingService;

impl GradingService {
    pub fn grade(questions: &[Question], answers: &JsonMap) -> GradeReport {
        let mut score = 0;
        let mut max_score = 0;
        let mut needs_review = false;
        let mut graded = Vec::with_capacity(questions.len());

        for q in questions {
            max_score += q.points;
            let answer = answers.get(&q.id).cloned().unwrap_or(JsonValue::Null);

            let verdict = if answer.is_null() {
                Some(false)
            } else {
                match q.question_type {
                    QuestionType::SingleChoice => Some(single_choice_correct(&q.correct, &answer)),
                    QuestionType::MultipleChoice => Some(multiple_choice_correct(&q.correct, &answer)),
                    QuestionType::ShortAnswer => short_answer_correct(&q.correct, &answer),
                    QuestionType::Essay => None,
                }
            };

            let points_earned = if verdict == Some(true) { q.points } else { 0 };
            let review = verdict.is_none();
            needs_review |= review;
            score += points_earned;

            graded.push(GradedAnswer {
                question_id: q.id.clone(),
                question_type: q.question_type,
                answer,
                points_earned,
                max_points: q.points,
                is_correct: verdict,
                needs_review: review,
            });
        }

        GradeReport {
            score,
            max_score,
            needs_review,
            answers: graded,
        }
    }
}

/// Accepts a bare index or `{"selected": n}`.
fn selected_index(answer: &JsonValue) -> Option<i64> {
    answer
        .as_i64()
        .or_else(|| answer.get("selected").and_then(|v| v.as_i64()))
}

fn index_set(value: &JsonValue) -> Option<BTreeSet<i64>> {
    let items = value
        .as_array()
        .or_else(|| value.get("selected").and_then(|v| v.as_array()))?;
    items.iter().map(|v| v.as_i64()).collect()
}

fn single_choice_correct(correct: &JsonValue, answer: &JsonValue) -> bool {
    match (selected_index(correct), selected_index(answer)) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    }
}

fn multiple_choice_correct(correct: &JsonValue, answer: &JsonValue) -> bool {
    match (index_set(correct), index_set(answer)) {
        (Some(expected), Some(given)) => !expected.is_empty() && expected == given,
        _ => false,
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `None` when the question has no accepted answers and must be reviewed by hand.
fn short_answer_correct(correct: &JsonValue, answer: &JsonValue) -> Option<bool> {
    let accepted: Vec<String> = match correct {
        JsonValue::String(s) => vec![normalize(s)],
        JsonValue::Array(items) => items.iter().filter_map(|v| v.as_str()).map(normalize).collect(),
        _ => Vec::new(),
    };
    if accepted.is_empty() {
        return None;
    }
    let given = answer.as_str().map(normalize)?;
    Some(accepted.contains(&given))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn questions() -> Vec<Question> {
        serde_json::from_value(json!([
            {"id": "q1", "type": "single_choice", "prompt": "2+2?", "options": ["3", "4"], "correct": 1, "points": 2},
            {"id": "q2", "type": "multiple_choice", "prompt": "Primes?", "options": ["2", "3", "4"], "correct": [0, 1]},
            {"id": "q3", "type": "short_answer", "prompt": "Capital of France?", "correct": ["Paris"]},
            {"id": "q4", "type": "essay", "prompt": "Discuss."}
        ]))
        .unwrap()
    }

    fn answers(value: JsonValue) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn grades_each_question_type() {
        let report = GradingService::grade(
            &questions(),
            &answers(json!({
                "q1": {"selected": 1},
                "q2": [1, 0],
                "q3": "  paris ",
                "q4": "Long text"
            })),
        );

        assert_eq!(report.max_score, 5);
        assert_eq!(report.score, 4);
        assert!(report.needs_review);
        let q4 = report.answers.iter().find(|a| a.question_id == "q4").unwrap();
        assert_eq!(q4.is_correct, None);
        assert!(q4.needs_review);
    }

    #[test]
    fn unanswered_and_wrong_answers_earn_nothing() {
        let report = GradingService::grade(&questions()[..3], &answers(json!({ "q1": 0, "q2": [0] })));

        assert_eq!(report.score, 0);
        assert_eq!(report.max_score, 4);
        assert!(!report.needs_review);
        assert!(report.answers.iter().all(|a| a.is_correct == Some(false)));
    }

    #[test]
    fn short_answer_without_key_needs_review() {
        let qs: Vec<Question> = serde_json::from_value(json!([
            {"id": "q1", "type": "short_answer", "prompt": "Explain"}
        ]))
        .unwrap();
        let report = GradingService::grade(&qs, &answers(json!({ "q1": "because" })));
        assert!(report.needs_review);
        assert_eq!(report.score, 0);
    }
}
