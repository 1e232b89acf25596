//! Synthetic dataset generation: one conversation per planned blueprint.

use std::path::PathBuf;

use crate::cache::ReplayCache;
use crate::domain::prompts::{GENERATOR_SYSTEM_PROMPT, build_generation_prompt};
use crate::domain::{ConversationArtifact, ConversationDraft, ScenarioBlueprint, ScenarioPlanner, build_dataset_manifest};
use crate::error::ForgeError;
use crate::store;
use crate::structured::StructuredGenerator;

use super::{BatchOptions, BatchPipeline, BatchRunner, BatchSummary, ProgressEvent};

#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub count: usize,
    pub seed: u64,
    pub language: String,
    pub output_path: PathBuf,
    pub manifest_path: PathBuf,
    pub options: BatchOptions,
}

/// Writes conversations as JSON Lines and keeps a manifest beside them.
#[derive(Debug, Clone)]
pub struct DatasetPipeline {
    output_path: PathBuf,
    manifest_path: PathBuf,
    seed: u64,
    language: String,
    model: String,
}

impl DatasetPipeline {
    pub fn new(request: &DatasetRequest, model: &str) -> Self {
        Self {
            output_path: request.output_path.clone(),
            manifest_path: request.manifest_path.clone(),
            seed: request.seed,
            language: request.language.clone(),
            model: model.to_string(),
        }
    }
}

impl BatchPipeline for DatasetPipeline {
    type Item = ScenarioBlueprint;
    type Payload = ConversationDraft;
    type Record = ConversationArtifact;

    const NAMESPACE: &'static str = "dataset_generation";

    fn item_id<'i>(&self, item: &'i ScenarioBlueprint) -> &'i str {
        &item.conversation_id
    }

    fn record_id<'r>(&self, record: &'r ConversationArtifact) -> &'r str {
        &record.conversation_id
    }

    fn system_instruction(&self) -> &str {
        GENERATOR_SYSTEM_PROMPT
    }

    fn prompt(&self, item: &ScenarioBlueprint) -> Result<String, ForgeError> {
        Ok(build_generation_prompt(item)?)
    }

    fn seed(&self, _index: usize, item: &ScenarioBlueprint) -> u64 {
        item.generation_seed
    }

    fn into_record(&self, item: &ScenarioBlueprint, payload: ConversationDraft) -> ConversationArtifact {
        ConversationArtifact::from_draft(item, payload)
    }

    fn load_output(&self) -> Result<Vec<ConversationArtifact>, ForgeError> {
        Ok(store::read_jsonl(&self.output_path)?)
    }

    fn append_output(&self, record: &ConversationArtifact) -> Result<(), ForgeError> {
        Ok(store::append_jsonl(&self.output_path, record)?)
    }

    fn write_aggregate(&self, ordered: &[&ConversationArtifact]) -> Result<(), ForgeError> {
        let manifest = build_dataset_manifest(
            ordered,
            self.seed,
            &self.language,
            &self.model,
            &self.output_path.display().to_string(),
        );
        Ok(store::write_json(&self.manifest_path, &manifest)?)
    }

    fn rewrite_output(&self, ordered: &[&ConversationArtifact]) -> Result<(), ForgeError> {
        store::write_jsonl(&self.output_path, ordered)?;
        self.write_aggregate(ordered)
    }
}

/// Plan `request.count` blueprints and generate a conversation for each.
pub async fn generate_dataset<G: StructuredGenerator>(
    generator: &mut G,
    cache: &ReplayCache,
    model: &str,
    request: &DatasetRequest,
    on_progress: impl FnMut(&ProgressEvent),
) -> Result<BatchSummary, ForgeError> {
    let blueprints = ScenarioPlanner::new().plan(request.count, request.seed, &request.language)?;
    let pipeline = DatasetPipeline::new(request, model);
    BatchRunner::new(generator, cache, model)
        .run(&pipeline, &blueprints, request.options, on_progress)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ItemStatus;
    use crate::batch::testing::ScriptedGenerator;
    use crate::domain::DatasetManifest;
    use crate::structured::GenerationError;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    const MODEL: &str = "gemini-2.5-flash-lite";

    fn draft(n: usize) -> Value {
        json!({
            "title": format!("Support chat number {n}"),
            "scenario_summary": "A customer contacts support about a billing problem.",
            "turns": [
                {"role": "customer", "message": "Hello, I was charged twice."},
                {"role": "agent", "message": "Sorry about that, let me check."},
                {"role": "customer", "message": "Thanks."},
                {"role": "agent", "message": "The duplicate hold will be released."}
            ],
            "final_customer_signal": "Okay, thank you."
        })
    }

    fn drafts(count: usize) -> Vec<Value> {
        (0..count).map(draft).collect()
    }

    fn request(dir: &TempDir, options: BatchOptions) -> DatasetRequest {
        DatasetRequest {
            count: 20,
            seed: 42,
            language: "uk".into(),
            output_path: dir.path().join("out/conversations.jsonl"),
            manifest_path: dir.path().join("out/manifest.json"),
            options,
        }
    }

    #[tokio::test]
    async fn fresh_run_writes_dataset_and_manifest() {
        let dir = TempDir::new().unwrap();
        let cache = ReplayCache::new(dir.path().join("cache"));
        let mut generator = ScriptedGenerator::with_payloads(drafts(20));
        let request = request(&dir, BatchOptions::default());

        let summary = generate_dataset(&mut generator, &cache, MODEL, &request, |_| {})
            .await
            .unwrap();

        assert_eq!(summary.generated, 20);
        assert_eq!(generator.calls.len(), 20);
        assert!(generator.calls.iter().all(|c| c.model == MODEL));

        let plan = ScenarioPlanner::new().plan(20, 42, "uk").unwrap();
        let written: Vec<ConversationArtifact> = store::read_jsonl(&request.output_path).unwrap();
        let ids: Vec<&str> = written.iter().map(|a| a.conversation_id.as_str()).collect();
        let planned: Vec<&str> = plan.iter().map(|b| b.conversation_id.as_str()).collect();
        assert_eq!(ids, planned);
        assert_eq!(generator.calls[3].seed, plan[3].generation_seed);
        assert_eq!(written[0].turns[3].turn_index, 3);

        let manifest: DatasetManifest = store::read_json(&request.manifest_path).unwrap().unwrap();
        assert_eq!(manifest.total_conversations, 20);
        assert_eq!(manifest.model, MODEL);
        assert_eq!(manifest.distribution_by_issue.len(), 5);
        assert!(manifest.distribution_by_issue.values().all(|n| *n == 4));
        assert_eq!(manifest.distribution_by_case_class["successful"], 5);
    }

    #[tokio::test]
    async fn failed_item_aborts_and_keeps_completed_work() {
        let dir = TempDir::new().unwrap();
        let cache = ReplayCache::new(dir.path().join("cache"));
        let mut generator = ScriptedGenerator::with_payloads(drafts(5));
        generator.push_error(GenerationError::MalformedResponse("boom".into()));
        let request = request(&dir, BatchOptions::default());

        let err = generate_dataset(&mut generator, &cache, MODEL, &request, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Generation(_)));

        let written: Vec<ConversationArtifact> = store::read_jsonl(&request.output_path).unwrap();
        assert_eq!(written.len(), 5);
        let manifest: DatasetManifest = store::read_json(&request.manifest_path).unwrap().unwrap();
        assert_eq!(manifest.total_conversations, 5);
    }

    #[tokio::test]
    async fn resumed_run_replays_cache_without_calls() {
        let dir = TempDir::new().unwrap();
        let cache = ReplayCache::new(dir.path().join("cache"));
        let mut first = ScriptedGenerator::with_payloads(drafts(20));
        generate_dataset(&mut first, &cache, MODEL, &request(&dir, BatchOptions::default()), |_| {})
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("out/conversations.jsonl")).unwrap();

        let mut second = ScriptedGenerator::default();
        let options = BatchOptions {
            resume_from_cache: true,
            ..BatchOptions::default()
        };
        let mut statuses = Vec::new();
        let summary = generate_dataset(&mut second, &cache, MODEL, &request(&dir, options), |event| {
            statuses.push(event.status)
        })
        .await
        .unwrap();

        assert!(second.calls.is_empty());
        assert_eq!(summary.reused_cache, 20);
        assert!(statuses.iter().all(|s| *s == ItemStatus::ReusedCache));
        let written: Vec<ConversationArtifact> =
            store::read_jsonl(&dir.path().join("out/conversations.jsonl")).unwrap();
        assert_eq!(written.len(), 20);
    }

    #[tokio::test]
    async fn resume_recovers_from_interrupted_append() {
        let dir = TempDir::new().unwrap();
        let cache = ReplayCache::new(dir.path().join("cache"));
        let mut first = ScriptedGenerator::with_payloads(drafts(20));
        generate_dataset(&mut first, &cache, MODEL, &request(&dir, BatchOptions::default()), |_| {})
            .await
            .unwrap();

        let output = dir.path().join("out/conversations.jsonl");
        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        let half: String = lines[5].chars().take(lines[5].chars().count() / 2).collect();
        let torn = format!("{}\n{half}", lines[..5].join("\n"));
        std::fs::write(&output, torn).unwrap();

        let mut second = ScriptedGenerator::default();
        let options = BatchOptions {
            resume_from_cache: true,
            ..BatchOptions::default()
        };
        let summary = generate_dataset(&mut second, &cache, MODEL, &request(&dir, options), |_| {})
            .await
            .unwrap();

        assert!(second.calls.is_empty());
        assert_eq!(summary.reused_output, 5);
        assert_eq!(summary.reused_cache, 15);
        let written: Vec<ConversationArtifact> = store::read_jsonl(&output).unwrap();
        assert_eq!(written.len(), 20);
        assert!(std::fs::read_to_string(&output).unwrap().ends_with("}\n"));
    }

    #[tokio::test]
    async fn force_refresh_ignores_cache_but_refills_it() {
        let dir = TempDir::new().unwrap();
        let cache = ReplayCache::new(dir.path().join("cache"));
        let mut first = ScriptedGenerator::with_payloads(drafts(20));
        generate_dataset(&mut first, &cache, MODEL, &request(&dir, BatchOptions::default()), |_| {})
            .await
            .unwrap();

        let mut second = ScriptedGenerator::with_payloads((100..120).map(draft));
        let options = BatchOptions {
            resume_from_cache: true,
            force_refresh: true,
            ..BatchOptions::default()
        };
        let summary = generate_dataset(&mut second, &cache, MODEL, &request(&dir, options), |_| {})
            .await
            .unwrap();

        assert_eq!(second.calls.len(), 20);
        assert_eq!(summary.generated, 20);
        let written: Vec<ConversationArtifact> =
            store::read_jsonl(&dir.path().join("out/conversations.jsonl")).unwrap();
        assert_eq!(written[0].title, "Support chat number 100");
    }
}
