use std::collections::VecDeque;

use serde_json::Value;

use crate::structured::{GenerationError, StructuredGenerator, StructuredOutput};

/// Generator double that replays scripted payloads and records each call.
#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    script: VecDeque<Result<Value, GenerationError>>,
    pub calls: Vec<GeneratorCall>,
}

#[derive(Debug, Clone)]
pub(crate) struct GeneratorCall {
    pub model: String,
    pub prompt: String,
    pub seed: u64,
}

impl ScriptedGenerator {
    pub fn with_payloads(payloads: impl IntoIterator<Item = Value>) -> Self {
        Self {
            script: payloads.into_iter().map(Ok).collect(),
            calls: Vec::new(),
        }
    }

    pub fn push_error(&mut self, error: GenerationError) {
        self.script.push_back(Err(error));
    }
}

impl StructuredGenerator for ScriptedGenerator {
    async fn generate<T: StructuredOutput>(
        &mut self,
        model: &str,
        prompt: &str,
        _system_instruction: &str,
        seed: u64,
    ) -> Result<T, GenerationError> {
        self.calls.push(GeneratorCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
            seed,
        });
        let payload = self
            .script
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::MalformedResponse("script exhausted".into())))?;
        serde_json::from_value(payload).map_err(|e| GenerationError::MalformedResponse(e.to_string()))
    }
}
