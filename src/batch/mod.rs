//! Resumable batch orchestration.
//!
//! A [`BatchRunner`] drives an ordered list of work items through the replay
//! cache and a [`StructuredGenerator`], one item at a time. What an item is,
//! how its prompt is built, and where results are persisted is described by a
//! [`BatchPipeline`]; dataset generation and support evaluation are the two
//! pipelines shipped here.
//!
//! Output is persisted after every item and the aggregate is recomputed from
//! the ordered results each time, so an interrupted run can be resumed with
//! `resume_from_cache` and loses at most the item that was in flight.

pub mod evaluation;
pub mod generation;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::{HashMap, HashSet};

use strum::Display;
use tracing::{Instrument, debug, info, info_span};

use crate::cache::ReplayCache;
use crate::error::ForgeError;
use crate::structured::{StructuredGenerator, StructuredOutput};

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Index of the first item to process.
    pub start_from: usize,
    /// Keep existing output and consult the replay cache.
    pub resume_from_cache: bool,
    /// Start from empty output and never read the replay cache.
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ItemStatus {
    Generated,
    ReusedCache,
    ReusedOutput,
}

/// Emitted once per processed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Items processed so far in this run, including this one.
    pub completed: usize,
    /// Items this run will process, counted from `start_from`.
    pub total: usize,
    pub item_id: String,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub generated: usize,
    pub reused_cache: usize,
    pub reused_output: usize,
}

impl BatchSummary {
    fn record(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Generated => self.generated += 1,
            ItemStatus::ReusedCache => self.reused_cache += 1,
            ItemStatus::ReusedOutput => self.reused_output += 1,
        }
    }

    pub fn completed(&self) -> usize {
        self.generated + self.reused_cache + self.reused_output
    }
}

/// One kind of batch: its work items, prompts and persistence.
pub trait BatchPipeline {
    type Item;
    type Payload: StructuredOutput;
    type Record;

    /// Replay-cache namespace, so different pipelines never share entries.
    const NAMESPACE: &'static str;

    fn item_id<'i>(&self, item: &'i Self::Item) -> &'i str;
    fn record_id<'r>(&self, record: &'r Self::Record) -> &'r str;

    fn system_instruction(&self) -> &str;
    fn prompt(&self, item: &Self::Item) -> Result<String, ForgeError>;
    fn seed(&self, index: usize, item: &Self::Item) -> u64;
    fn into_record(&self, item: &Self::Item, payload: Self::Payload) -> Self::Record;

    /// Records already persisted by an earlier run, in file order.
    fn load_output(&self) -> Result<Vec<Self::Record>, ForgeError>;

    /// Persist one freshly produced record ahead of the aggregate rewrite.
    ///
    /// Pipelines whose records live inside the aggregate keep the default.
    fn append_output(&self, _record: &Self::Record) -> Result<(), ForgeError> {
        Ok(())
    }

    fn write_aggregate(&self, ordered: &[&Self::Record]) -> Result<(), ForgeError>;

    /// Replace the output with exactly `ordered`, then rewrite the aggregate.
    fn rewrite_output(&self, ordered: &[&Self::Record]) -> Result<(), ForgeError>;

    fn reset_output(&self) -> Result<(), ForgeError> {
        self.rewrite_output(&[])
    }
}

/// Drives a [`BatchPipeline`] to completion with exclusive use of one generator.
pub struct BatchRunner<'a, G> {
    generator: &'a mut G,
    cache: &'a ReplayCache,
    model: String,
}

impl<'a, G: StructuredGenerator> BatchRunner<'a, G> {
    pub fn new(generator: &'a mut G, cache: &'a ReplayCache, model: impl Into<String>) -> Self {
        Self {
            generator,
            cache,
            model: model.into(),
        }
    }

    pub async fn run<P: BatchPipeline>(
        &mut self,
        pipeline: &P,
        items: &[P::Item],
        options: BatchOptions,
        mut on_progress: impl FnMut(&ProgressEvent),
    ) -> Result<BatchSummary, ForgeError> {
        if options.start_from >= items.len() {
            return Err(ForgeError::StartOutOfRange {
                start_from: options.start_from,
                planned: items.len(),
            });
        }

        let mut results = self.prepare_output(pipeline, items, options)?;
        let total = items.len() - options.start_from;
        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };
        info!(
            namespace = P::NAMESPACE,
            model = %self.model,
            planned = items.len(),
            start_from = options.start_from,
            resume_from_cache = options.resume_from_cache,
            force_refresh = options.force_refresh,
            "starting batch run"
        );

        for (index, item) in items.iter().enumerate().skip(options.start_from) {
            let item_id = pipeline.item_id(item);
            let span = info_span!("batch_item", namespace = P::NAMESPACE, index, item_id);
            let status = self
                .process_item(pipeline, items, index, &mut results, options)
                .instrument(span)
                .await?;

            summary.record(status);
            on_progress(&ProgressEvent {
                completed: summary.completed(),
                total,
                item_id: item_id.to_string(),
                status,
            });
        }

        pipeline.rewrite_output(&ordered_records(pipeline, items, &results))?;
        info!(
            namespace = P::NAMESPACE,
            generated = summary.generated,
            reused_cache = summary.reused_cache,
            reused_output = summary.reused_output,
            "batch run finished"
        );
        Ok(summary)
    }

    /// Reset the output, or keep only the records this plan still expects.
    fn prepare_output<P: BatchPipeline>(
        &self,
        pipeline: &P,
        items: &[P::Item],
        options: BatchOptions,
    ) -> Result<HashMap<String, P::Record>, ForgeError> {
        if options.force_refresh || !options.resume_from_cache {
            pipeline.reset_output()?;
            return Ok(HashMap::new());
        }

        let expected: HashSet<&str> = items.iter().map(|item| pipeline.item_id(item)).collect();
        let mut results = HashMap::new();
        let mut dropped = 0usize;
        for record in pipeline.load_output()? {
            let id = pipeline.record_id(&record);
            if expected.contains(id) {
                results.insert(id.to_string(), record);
            } else {
                dropped += 1;
            }
        }

        pipeline.rewrite_output(&ordered_records(pipeline, items, &results))?;
        info!(kept = results.len(), dropped, "resuming from existing output");
        Ok(results)
    }

    async fn process_item<P: BatchPipeline>(
        &mut self,
        pipeline: &P,
        items: &[P::Item],
        index: usize,
        results: &mut HashMap<String, P::Record>,
        options: BatchOptions,
    ) -> Result<ItemStatus, ForgeError> {
        let item = &items[index];
        let item_id = pipeline.item_id(item);
        if options.resume_from_cache && results.contains_key(item_id) {
            debug!("keeping persisted output");
            return Ok(ItemStatus::ReusedOutput);
        }

        let prompt = pipeline.prompt(item)?;
        let seed = pipeline.seed(index, item);
        let key = ReplayCache::key(
            P::NAMESPACE,
            &self.model,
            seed,
            pipeline.system_instruction(),
            &prompt,
            <P::Payload as StructuredOutput>::SCHEMA_NAME,
        )?;

        let cached = if options.resume_from_cache && !options.force_refresh {
            self.cache.load::<P::Payload>(&key)?
        } else {
            None
        };
        let (payload, status) = match cached {
            Some(payload) => (payload, ItemStatus::ReusedCache),
            None => {
                let payload: P::Payload = self
                    .generator
                    .generate(&self.model, &prompt, pipeline.system_instruction(), seed)
                    .await?;
                self.cache.store(&key, &payload)?;
                (payload, ItemStatus::Generated)
            }
        };

        let record = pipeline.into_record(item, payload);
        pipeline.append_output(&record)?;
        results.insert(item_id.to_string(), record);
        pipeline.write_aggregate(&ordered_records(pipeline, items, results))?;
        debug!(%status, "item persisted");
        Ok(status)
    }
}

/// Results in planned order, skipping items without one.
fn ordered_records<'r, P: BatchPipeline>(
    pipeline: &P,
    items: &[P::Item],
    results: &'r HashMap<String, P::Record>,
) -> Vec<&'r P::Record> {
    items
        .iter()
        .filter_map(|item| results.get(pipeline.item_id(item)))
        .collect()
}
