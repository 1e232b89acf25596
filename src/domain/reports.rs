//! Aggregates recomputed from the ordered output after every item.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use super::models::{
    AgentMistakeTag, ConversationArtifact, EvaluationRecord, SupportIntent, SupportSatisfaction,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetManifest {
    pub total_conversations: usize,
    pub seed: u64,
    pub language: String,
    pub model: String,
    pub output_path: String,
    pub distribution_by_issue: BTreeMap<String, usize>,
    pub distribution_by_case_class: BTreeMap<String, usize>,
    pub hidden_dissatisfaction_cases: usize,
    pub agent_error_cases: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationReport {
    pub input_path: String,
    pub output_path: String,
    pub model: String,
    pub total_conversations: usize,
    pub average_quality_score: f64,
    pub distribution_by_intent: BTreeMap<String, usize>,
    pub distribution_by_satisfaction: BTreeMap<String, usize>,
    pub distribution_by_quality_score: BTreeMap<String, usize>,
    pub distribution_by_agent_mistake: BTreeMap<String, usize>,
    pub records: Vec<EvaluationRecord>,
}

fn tally<'a>(labels: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Counts for every variant of `E`, including those never observed.
fn zero_filled<E>(observed: impl Iterator<Item = E>) -> BTreeMap<String, usize>
where
    E: IntoEnumIterator + AsRef<str>,
{
    let mut counts: BTreeMap<String, usize> = E::iter().map(|v| (v.as_ref().to_string(), 0)).collect();
    for value in observed {
        *counts.entry(value.as_ref().to_string()).or_insert(0) += 1;
    }
    counts
}

pub fn build_dataset_manifest(
    conversations: &[&ConversationArtifact],
    seed: u64,
    language: &str,
    model: &str,
    output_path: &str,
) -> DatasetManifest {
    DatasetManifest {
        total_conversations: conversations.len(),
        seed,
        language: language.to_string(),
        model: model.to_string(),
        output_path: output_path.to_string(),
        distribution_by_issue: tally(conversations.iter().map(|c| c.ground_truth.issue_type.as_ref())),
        distribution_by_case_class: tally(conversations.iter().map(|c| c.ground_truth.case_class.as_ref())),
        hidden_dissatisfaction_cases: conversations
            .iter()
            .filter(|c| c.ground_truth.hidden_dissatisfaction)
            .count(),
        agent_error_cases: conversations
            .iter()
            .filter(|c| !c.ground_truth.required_agent_errors.is_empty())
            .count(),
    }
}

pub fn build_evaluation_report(
    input_path: &str,
    output_path: &str,
    model: &str,
    records: &[&EvaluationRecord],
) -> EvaluationReport {
    let average_quality_score = if records.is_empty() {
        0.0
    } else {
        let total: f64 = records.iter().map(|r| f64::from(r.quality_score)).sum();
        (total / records.len() as f64 * 100.0).round() / 100.0
    };

    let mut by_quality: BTreeMap<String, usize> = (1..=5).map(|score| (score.to_string(), 0)).collect();
    for record in records {
        *by_quality.entry(record.quality_score.to_string()).or_insert(0) += 1;
    }

    EvaluationReport {
        input_path: input_path.to_string(),
        output_path: output_path.to_string(),
        model: model.to_string(),
        total_conversations: records.len(),
        average_quality_score,
        distribution_by_intent: zero_filled::<SupportIntent>(records.iter().map(|r| r.intent)),
        distribution_by_satisfaction: zero_filled::<SupportSatisfaction>(records.iter().map(|r| r.satisfaction)),
        distribution_by_quality_score: by_quality,
        distribution_by_agent_mistake: zero_filled::<AgentMistakeTag>(
            records.iter().flat_map(|r| r.agent_mistakes.iter().copied()),
        ),
        records: records.iter().map(|r| (*r).clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, score: u8, mistakes: Vec<AgentMistakeTag>) -> EvaluationRecord {
        EvaluationRecord {
            conversation_id: id.into(),
            intent: SupportIntent::PaymentIssue,
            satisfaction: SupportSatisfaction::Neutral,
            quality_score: score,
            agent_mistakes: mistakes,
        }
    }

    #[test]
    fn empty_report_is_zero_filled() {
        let report = build_evaluation_report("in.jsonl", "out.json", "m", &[]);
        assert_eq!(report.total_conversations, 0);
        assert_eq!(report.average_quality_score, 0.0);
        assert_eq!(report.distribution_by_intent.len(), 6);
        assert_eq!(report.distribution_by_quality_score.len(), 5);
        assert!(report.distribution_by_agent_mistake.values().all(|n| *n == 0));
    }

    #[test]
    fn average_is_rounded_to_two_decimals() {
        let records = [record("a", 4, vec![]), record("b", 4, vec![]), record("c", 5, vec![])];
        let refs: Vec<&EvaluationRecord> = records.iter().collect();

        let report = build_evaluation_report("in", "out", "m", &refs);

        assert_eq!(report.average_quality_score, 4.33);
        assert_eq!(report.distribution_by_quality_score["4"], 2);
        assert_eq!(report.distribution_by_quality_score["1"], 0);
        assert_eq!(report.distribution_by_intent["payment_issue"], 3);
        assert_eq!(report.distribution_by_intent["other"], 0);
    }

    #[test]
    fn mistakes_are_counted_per_tag() {
        let records = [
            record("a", 2, vec![AgentMistakeTag::RudeTone, AgentMistakeTag::NoResolution]),
            record("b", 1, vec![AgentMistakeTag::RudeTone]),
        ];
        let refs: Vec<&EvaluationRecord> = records.iter().collect();

        let report = build_evaluation_report("in", "out", "m", &refs);

        assert_eq!(report.distribution_by_agent_mistake["rude_tone"], 2);
        assert_eq!(report.distribution_by_agent_mistake["no_resolution"], 1);
        assert_eq!(report.distribution_by_agent_mistake["incorrect_info"], 0);
        assert_eq!(report.records.len(), 2);
    }
}
