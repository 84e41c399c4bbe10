pub mod voting;

use std::{sync::Arc, time::Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    agent::{core::AgentBehavior, execution::ExecutionResult},
    error::{AgentError, ErrorKind},
};

pub use voting::{VoteCount, VotingMethod, default_vote};

pub type VoteExtractor = Arc<dyn Fn(&ExecutionResult) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationStrategy {
    Sequential,
    Parallel,
    Consensus,
}

pub struct Collaborator {
    pub agent: Arc<dyn AgentBehavior>,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub agent_name: String,
    pub result: ExecutionResult,
    /// Extracted vote; only set under the consensus strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollaborationDecision {
    /// Output of the last agent in a sequential chain.
    Final { output: Value },
    /// Outputs of every agent, in collaborator order.
    All { outputs: Vec<Value> },
    Consensus {
        choice: Option<String>,
        tally: Vec<VoteCount>,
        method: VotingMethod,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationResult {
    pub strategy: CollaborationStrategy,
    pub results: Vec<AgentResult>,
    pub decision: Option<CollaborationDecision>,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
}

impl CollaborationResult {
    /// Winning answer of a consensus run.
    pub fn choice(&self) -> Option<&str> {
        match &self.decision {
            Some(CollaborationDecision::Consensus { choice, .. }) => choice.as_deref(),
            _ => None,
        }
    }
}

/// Runs a group of agents on one task under a strategy.
pub struct AgentCollaboration {
    strategy: CollaborationStrategy,
    collaborators: Vec<Collaborator>,
    voting: VotingMethod,
    vote_extractor: VoteExtractor,
}

impl AgentCollaboration {
    pub fn new(strategy: CollaborationStrategy) -> Self {
        Self {
            strategy,
            collaborators: Vec::new(),
            voting: VotingMethod::Majority,
            vote_extractor: Arc::new(default_vote),
        }
    }

    pub fn with_agent(self, agent: Arc<dyn AgentBehavior>) -> Self {
        self.with_weighted_agent(agent, 1.0)
    }

    pub fn with_weighted_agent(mut self, agent: Arc<dyn AgentBehavior>, weight: f64) -> Self {
        self.collaborators.push(Collaborator { agent, weight });
        self
    }

    pub fn with_voting(mut self, method: VotingMethod) -> Self {
        self.voting = method;
        self
    }

    pub fn with_vote_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&ExecutionResult) -> Option<String> + Send + Sync + 'static,
    {
        self.vote_extractor = Arc::new(extractor);
        self
    }

    pub fn strategy(&self) -> CollaborationStrategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.collaborators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collaborators.is_empty()
    }

    pub async fn execute(&self, task: &str) -> CollaborationResult {
        let started = Instant::now();
        let mut outcome = if self.collaborators.is_empty() {
            self.failed(
                Vec::new(),
                None,
                AgentError::Configuration("collaboration has no agents".into()),
            )
        } else {
            match self.strategy {
                CollaborationStrategy::Sequential => self.run_sequential(task).await,
                CollaborationStrategy::Parallel => self.run_parallel(task).await,
                CollaborationStrategy::Consensus => self.run_consensus(task).await,
            }
        };
        outcome.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Collaboration {:?} over {} agent(s) finished: success={}",
            self.strategy,
            self.collaborators.len(),
            outcome.success
        );
        outcome
    }

    async fn run_sequential(&self, task: &str) -> CollaborationResult {
        let mut results = Vec::with_capacity(self.collaborators.len());
        let mut input = task.to_string();

        for collaborator in &self.collaborators {
            let result = collaborator.agent.execute(&input).await;
            let failed = !result.is_success();
            let next_input = format!("{}\n\nPrevious output:\n{}", task, result.output_text());
            results.push(agent_result(collaborator, result, None));

            if failed {
                let last = &results[results.len() - 1];
                warn!("Sequential chain stopped at agent {}", last.agent_id);
                let kind = last.result.error_kind().unwrap_or(ErrorKind::Internal);
                let error = format!(
                    "agent {} failed: {}",
                    last.agent_id,
                    last.result.error_message().unwrap_or_default()
                );
                return self.finish(results, None, Some((kind, error)));
            }
            input = next_input;
        }

        let output = results
            .last()
            .map(|r| r.result.output().clone())
            .unwrap_or(Value::Null);
        self.finish(results, Some(CollaborationDecision::Final { output }), None)
    }

    async fn run_all(&self, task: &str) -> Vec<ExecutionResult> {
        join_all(self.collaborators.iter().map(|c| c.agent.execute(task))).await
    }

    async fn run_parallel(&self, task: &str) -> CollaborationResult {
        let executed = self.run_all(task).await;
        let results: Vec<AgentResult> = self
            .collaborators
            .iter()
            .zip(executed)
            .map(|(c, r)| agent_result(c, r, None))
            .collect();

        let outputs = results.iter().map(|r| r.result.output().clone()).collect();
        let failed: Vec<&str> = results
            .iter()
            .filter(|r| !r.result.is_success())
            .map(|r| r.agent_id.as_str())
            .collect();
        let error = (!failed.is_empty()).then(|| {
            let kind = results
                .iter()
                .find_map(|r| r.result.error_kind())
                .unwrap_or(ErrorKind::Internal);
            (kind, format!("agents failed: {}", failed.join(", ")))
        });

        self.finish(results, Some(CollaborationDecision::All { outputs }), error)
    }

    async fn run_consensus(&self, task: &str) -> CollaborationResult {
        let executed = self.run_all(task).await;
        let results: Vec<AgentResult> = self
            .collaborators
            .iter()
            .zip(executed)
            .map(|(c, r)| {
                let vote = (self.vote_extractor)(&r);
                agent_result(c, r, vote)
            })
            .collect();

        let votes: Vec<(String, Option<String>, f64)> = self
            .collaborators
            .iter()
            .zip(&results)
            .map(|(c, r)| {
                let weight = match self.voting {
                    VotingMethod::Weighted => c.weight,
                    _ => 1.0,
                };
                (r.agent_id.clone(), r.vote.clone(), weight)
            })
            .collect();
        let tally = voting::tally(&votes);

        let verdict = match self.voting {
            VotingMethod::Unanimous => {
                let everyone_voted = results.iter().all(|r| r.vote.is_some());
                if everyone_voted && tally.len() == 1 {
                    Ok(tally[0].choice.clone())
                } else if tally.is_empty() {
                    Err("no agent produced a vote".to_string())
                } else {
                    Err(format!(
                        "agents disagree: {} distinct answer(s), {} abstention(s)",
                        tally.len(),
                        results.iter().filter(|r| r.vote.is_none()).count()
                    ))
                }
            }
            VotingMethod::Majority | VotingMethod::Weighted => voting::leader(&tally)
                .map(|c| c.choice.clone())
                .ok_or_else(|| "no agent produced a vote".to_string()),
        };

        match verdict {
            Ok(choice) => {
                info!("Consensus reached on '{}'", choice);
                let decision = CollaborationDecision::Consensus {
                    choice: Some(choice),
                    tally,
                    method: self.voting,
                };
                self.finish(results, Some(decision), None)
            }
            Err(reason) => {
                let decision = CollaborationDecision::Consensus {
                    choice: None,
                    tally,
                    method: self.voting,
                };
                self.failed(results, Some(decision), AgentError::NoConsensus(reason))
            }
        }
    }

    fn failed(
        &self,
        results: Vec<AgentResult>,
        decision: Option<CollaborationDecision>,
        error: AgentError,
    ) -> CollaborationResult {
        self.finish(results, decision, Some((error.kind(), error.to_string())))
    }

    fn finish(
        &self,
        results: Vec<AgentResult>,
        decision: Option<CollaborationDecision>,
        error: Option<(ErrorKind, String)>,
    ) -> CollaborationResult {
        let (error_kind, error) = match error {
            Some((kind, message)) => (Some(kind), Some(message)),
            None => (None, None),
        };
        CollaborationResult {
            strategy: self.strategy,
            results,
            decision,
            success: error.is_none(),
            error,
            error_kind,
            duration_ms: 0,
        }
    }
}

fn agent_result(
    collaborator: &Collaborator,
    result: ExecutionResult,
    vote: Option<String>,
) -> AgentResult {
    AgentResult {
        agent_id: collaborator.agent.get_id().to_string(),
        agent_name: collaborator.agent.get_name().to_string(),
        result,
        vote,
    }
}
