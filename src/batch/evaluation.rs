//! Support-quality evaluation of an existing dataset.

use std::path::PathBuf;

use crate::cache::ReplayCache;
use crate::domain::prompts::{EVALUATOR_SYSTEM_PROMPT, build_evaluation_prompt};
use crate::domain::{ConversationArtifact, ConversationEvaluation, EvaluationRecord, EvaluationReport, build_evaluation_report};
use crate::error::ForgeError;
use crate::store;
use crate::structured::StructuredGenerator;

use super::{BatchOptions, BatchPipeline, BatchRunner, BatchSummary, ProgressEvent};

#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub seed: u64,
    pub options: BatchOptions,
}

/// Keeps every record inside the report document; the report is the output.
#[derive(Debug, Clone)]
pub struct EvaluationPipeline {
    input_path: PathBuf,
    output_path: PathBuf,
    seed: u64,
    model: String,
}

impl EvaluationPipeline {
    pub fn new(request: &EvaluationRequest, model: &str) -> Self {
        Self {
            input_path: request.input_path.clone(),
            output_path: request.output_path.clone(),
            seed: request.seed,
            model: model.to_string(),
        }
    }
}

impl BatchPipeline for EvaluationPipeline {
    type Item = ConversationArtifact;
    type Payload = ConversationEvaluation;
    type Record = EvaluationRecord;

    const NAMESPACE: &'static str = "support_evaluation";

    fn item_id<'i>(&self, item: &'i ConversationArtifact) -> &'i str {
        &item.conversation_id
    }

    fn record_id<'r>(&self, record: &'r EvaluationRecord) -> &'r str {
        &record.conversation_id
    }

    fn system_instruction(&self) -> &str {
        EVALUATOR_SYSTEM_PROMPT
    }

    fn prompt(&self, item: &ConversationArtifact) -> Result<String, ForgeError> {
        Ok(build_evaluation_prompt(item)?)
    }

    fn seed(&self, index: usize, _item: &ConversationArtifact) -> u64 {
        self.seed.wrapping_add(index as u64)
    }

    fn into_record(&self, item: &ConversationArtifact, payload: ConversationEvaluation) -> EvaluationRecord {
        EvaluationRecord::from_evaluation(item.conversation_id.clone(), payload)
    }

    fn load_output(&self) -> Result<Vec<EvaluationRecord>, ForgeError> {
        Ok(store::read_json::<EvaluationReport>(&self.output_path)?
            .map(|report| report.records)
            .unwrap_or_default())
    }

    fn write_aggregate(&self, ordered: &[&EvaluationRecord]) -> Result<(), ForgeError> {
        let report = build_evaluation_report(
            &self.input_path.display().to_string(),
            &self.output_path.display().to_string(),
            &self.model,
            ordered,
        );
        Ok(store::write_json(&self.output_path, &report)?)
    }

    fn rewrite_output(&self, ordered: &[&EvaluationRecord]) -> Result<(), ForgeError> {
        self.write_aggregate(ordered)
    }
}

/// Evaluate every conversation in `request.input_path`.
///
/// An empty dataset produces an empty report without touching the model.
pub async fn evaluate_dataset<G: StructuredGenerator>(
    generator: &mut G,
    cache: &ReplayCache,
    model: &str,
    request: &EvaluationRequest,
    on_progress: impl FnMut(&ProgressEvent),
) -> Result<BatchSummary, ForgeError> {
    let conversations: Vec<ConversationArtifact> = store::read_jsonl(&request.input_path)?;
    let pipeline = EvaluationPipeline::new(request, model);
    if conversations.is_empty() {
        pipeline.reset_output()?;
        return Ok(BatchSummary::default());
    }
    BatchRunner::new(generator, cache, model)
        .run(&pipeline, &conversations, request.options, on_progress)
        .await
}
