use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

use crate::structured::{SchemaDescriptor, StructuredOutput};

macro_rules! label_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, Display, AsRefStr, EnumIter,
        )]
        #[serde(rename_all = "snake_case")]
        #[strum(serialize_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }
    };
}

label_enum!(IssueType {
    PaymentIssue,
    TechnicalError,
    AccountAccess,
    PlanQuestion,
    RefundRequest,
});

label_enum!(CaseClass {
    Successful,
    Problematic,
    Conflict,
    AgentMistake,
});

label_enum!(ResolutionStatus {
    Resolved,
    PartiallyResolved,
    Unresolved,
});

label_enum!(CustomerSatisfaction {
    VeryDissatisfied,
    Dissatisfied,
    Neutral,
    Satisfied,
    Delighted,
});

label_enum!(ActorRole { Customer, Agent });

label_enum!(AgentErrorType {
    Tone,
    Logic,
    Policy,
    Accuracy,
    Process,
    Empathy,
});

label_enum!(
    /// Intent as judged by the evaluator; `Other` covers anything off-catalog.
    SupportIntent {
        PaymentIssue,
        TechnicalError,
        AccountAccess,
        PlanQuestion,
        RefundRequest,
        Other,
    }
);

label_enum!(SupportSatisfaction {
    Satisfied,
    Neutral,
    Unsatisfied,
});

label_enum!(AgentMistakeTag {
    IgnoredQuestion,
    IncorrectInfo,
    RudeTone,
    NoResolution,
    UnnecessaryEscalation,
});

fn enum_schema<E: IntoEnumIterator + AsRef<str>>(title: &str) -> Value {
    let values: Vec<String> = E::iter().map(|v| v.as_ref().to_string()).collect();
    json!({"enum": values, "title": title, "type": "string"})
}

fn text_schema(title: &str, min_length: usize, max_length: usize) -> Value {
    json!({"maxLength": max_length, "minLength": min_length, "title": title, "type": "string"})
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentError {
    #[serde(rename = "type")]
    pub kind: AgentErrorType,
    pub description: String,
    pub severity: u8,
}

/// Everything the generator needs to write one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioBlueprint {
    pub conversation_id: String,
    pub language: String,
    pub support_channel: String,
    pub issue_type: IssueType,
    pub case_class: CaseClass,
    pub customer_profile: String,
    pub scenario_prompt: String,
    pub customer_tone: String,
    pub resolution_status: ResolutionStatus,
    pub visible_customer_satisfaction: CustomerSatisfaction,
    pub actual_customer_satisfaction: CustomerSatisfaction,
    pub hidden_dissatisfaction: bool,
    pub problem_solved: bool,
    pub target_answer_quality_score: u8,
    pub required_story_beats: Vec<String>,
    #[serde(default)]
    pub required_agent_errors: Vec<AgentError>,
    pub min_turns: u8,
    pub max_turns: u8,
    pub generation_seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroundTruthLabel {
    pub issue_type: IssueType,
    pub case_class: CaseClass,
    pub resolution_status: ResolutionStatus,
    pub visible_customer_satisfaction: CustomerSatisfaction,
    pub actual_customer_satisfaction: CustomerSatisfaction,
    pub hidden_dissatisfaction: bool,
    pub problem_solved: bool,
    pub answer_quality_score: u8,
    #[serde(default)]
    pub required_agent_errors: Vec<AgentError>,
}

impl GroundTruthLabel {
    pub fn from_blueprint(blueprint: &ScenarioBlueprint) -> Self {
        Self {
            issue_type: blueprint.issue_type,
            case_class: blueprint.case_class,
            resolution_status: blueprint.resolution_status,
            visible_customer_satisfaction: blueprint.visible_customer_satisfaction,
            actual_customer_satisfaction: blueprint.actual_customer_satisfaction,
            hidden_dissatisfaction: blueprint.hidden_dissatisfaction,
            problem_solved: blueprint.problem_solved,
            answer_quality_score: blueprint.target_answer_quality_score,
            required_agent_errors: blueprint.required_agent_errors.clone(),
        }
    }

    pub fn has_error_of(&self, kind: AgentErrorType) -> bool {
        self.required_agent_errors.iter().any(|e| e.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DraftTurn {
    pub role: ActorRole,
    pub message: String,
}

/// What the generator model returns for one blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationDraft {
    pub title: String,
    pub scenario_summary: String,
    pub turns: Vec<DraftTurn>,
    pub final_customer_signal: String,
}

impl StructuredOutput for ConversationDraft {
    const SCHEMA_NAME: &'static str = "ConversationDraft";

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new(
            Self::SCHEMA_NAME,
            json!({
                "$defs": {
                    "ActorRole": enum_schema::<ActorRole>("ActorRole"),
                    "DraftTurn": {
                        "additionalProperties": false,
                        "properties": {
                            "role": {"$ref": "#/$defs/ActorRole"},
                            "message": text_schema("Message", 1, 1000)
                        },
                        "required": ["role", "message"],
                        "title": "DraftTurn",
                        "type": "object"
                    }
                },
                "additionalProperties": false,
                "properties": {
                    "title": text_schema("Title", 8, 120),
                    "scenario_summary": text_schema("Scenario Summary", 20, 320),
                    "turns": {
                        "items": {"$ref": "#/$defs/DraftTurn"},
                        "maxItems": 20,
                        "minItems": 4,
                        "title": "Turns",
                        "type": "array"
                    },
                    "final_customer_signal": text_schema("Final Customer Signal", 6, 200)
                },
                "required": ["title", "scenario_summary", "turns", "final_customer_signal"],
                "title": "ConversationDraft",
                "type": "object"
            }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatTurn {
    pub turn_index: usize,
    pub role: ActorRole,
    pub message: String,
}

/// One generated conversation, as written to the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationArtifact {
    pub conversation_id: String,
    pub language: String,
    pub support_channel: String,
    pub title: String,
    pub scenario_summary: String,
    pub turns: Vec<ChatTurn>,
    pub final_customer_signal: String,
    pub blueprint: ScenarioBlueprint,
    pub ground_truth: GroundTruthLabel,
}

impl ConversationArtifact {
    pub fn from_draft(blueprint: &ScenarioBlueprint, draft: ConversationDraft) -> Self {
        let turns = draft
            .turns
            .into_iter()
            .enumerate()
            .map(|(turn_index, turn)| ChatTurn {
                turn_index,
                role: turn.role,
                message: turn.message.trim().to_string(),
            })
            .collect();
        Self {
            conversation_id: blueprint.conversation_id.clone(),
            language: blueprint.language.clone(),
            support_channel: blueprint.support_channel.clone(),
            title: draft.title,
            scenario_summary: draft.scenario_summary,
            turns,
            final_customer_signal: draft.final_customer_signal,
            blueprint: blueprint.clone(),
            ground_truth: GroundTruthLabel::from_blueprint(blueprint),
        }
    }
}

/// What the evaluator model returns for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationEvaluation {
    pub intent: SupportIntent,
    pub satisfaction: SupportSatisfaction,
    pub quality_score: u8,
    #[serde(default)]
    pub agent_mistakes: Vec<AgentMistakeTag>,
}

impl StructuredOutput for ConversationEvaluation {
    const SCHEMA_NAME: &'static str = "ConversationEvaluation";

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new(
            Self::SCHEMA_NAME,
            json!({
                "$defs": {
                    "AgentMistakeTag": enum_schema::<AgentMistakeTag>("AgentMistakeTag"),
                    "SupportIntent": enum_schema::<SupportIntent>("SupportIntent"),
                    "SupportSatisfaction": enum_schema::<SupportSatisfaction>("SupportSatisfaction")
                },
                "additionalProperties": false,
                "properties": {
                    "intent": {"$ref": "#/$defs/SupportIntent"},
                    "satisfaction": {"$ref": "#/$defs/SupportSatisfaction"},
                    "quality_score": {"maximum": 5, "minimum": 1, "title": "Quality Score", "type": "integer"},
                    "agent_mistakes": {
                        "default": [],
                        "items": {"$ref": "#/$defs/AgentMistakeTag"},
                        "maxItems": 5,
                        "title": "Agent Mistakes",
                        "type": "array"
                    }
                },
                "required": ["intent", "satisfaction", "quality_score"],
                "title": "ConversationEvaluation",
                "type": "object"
            }),
        )
    }

    fn normalized(mut self) -> Self {
        let mut seen = Vec::with_capacity(self.agent_mistakes.len());
        self.agent_mistakes.retain(|tag| {
            if seen.contains(tag) {
                false
            } else {
                seen.push(*tag);
                true
            }
        });
        self
    }
}

/// One evaluated conversation, as written to the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationRecord {
    pub conversation_id: String,
    pub intent: SupportIntent,
    pub satisfaction: SupportSatisfaction,
    pub quality_score: u8,
    #[serde(default)]
    pub agent_mistakes: Vec<AgentMistakeTag>,
}

impl EvaluationRecord {
    pub fn from_evaluation(conversation_id: impl Into<String>, evaluation: ConversationEvaluation) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            intent: evaluation.intent,
            satisfaction: evaluation.satisfaction,
            quality_score: evaluation.quality_score,
            agent_mistakes: evaluation.agent_mistakes,
        }
    }
}
