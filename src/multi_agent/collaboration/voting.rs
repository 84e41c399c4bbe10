use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::execution::{ExecutionResult, result::value_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingMethod {
    /// Plurality of distinct answers.
    Majority,
    /// Every agent must succeed with the same answer.
    Unanimous,
    /// Highest summed collaborator weight.
    Weighted,
}

/// Support gathered by one distinct answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteCount {
    pub choice: String,
    pub weight: f64,
    pub voters: Vec<String>,
}

const VOTE_KEYS: [&str; 4] = ["vote", "choice", "decision", "answer"];

/// Reads a vote from an agent's output: a `vote`/`choice`/`decision`/`answer`
/// field of a JSON object (or JSON text), else the trimmed text. Failed runs
/// and empty outputs abstain.
pub fn default_vote(result: &ExecutionResult) -> Option<String> {
    if !result.is_success() {
        return None;
    }

    match result.output() {
        Value::Null => None,
        Value::String(text) => {
            let parsed = serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| vote_field(&v));
            parsed.or_else(|| non_empty(text.trim()))
        }
        value @ Value::Object(_) => vote_field(value).or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}

fn vote_field(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    VOTE_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(|v| non_empty(value_text(v).trim()))
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

/// Groups votes by answer, in order of each answer's first voter.
/// `votes` holds (voter, vote, weight) in collaborator order.
pub fn tally(votes: &[(String, Option<String>, f64)]) -> Vec<VoteCount> {
    let mut counts: Vec<VoteCount> = Vec::new();
    for (voter, vote, weight) in votes {
        let Some(choice) = vote else { continue };
        match counts.iter_mut().find(|c| &c.choice == choice) {
            Some(count) => {
                count.weight += weight;
                count.voters.push(voter.clone());
            }
            None => counts.push(VoteCount {
                choice: choice.clone(),
                weight: *weight,
                voters: vec![voter.clone()],
            }),
        }
    }
    counts
}

/// Highest weight wins; on a tie the answer whose first voter came earliest.
pub fn leader(counts: &[VoteCount]) -> Option<&VoteCount> {
    let mut best: Option<&VoteCount> = None;
    for count in counts {
        match best {
            Some(top) if count.weight <= top.weight => {}
            _ => best = Some(count),
        }
    }
    best
}
