//! Support-conversation domain: labels, records, prompts, planning and aggregates.

pub mod models;
pub mod prompts;
pub mod reports;
pub mod scenarios;

pub use models::{
    ActorRole, AgentError, AgentErrorType, AgentMistakeTag, CaseClass, ChatTurn, ConversationArtifact,
    ConversationDraft, ConversationEvaluation, CustomerSatisfaction, DraftTurn, EvaluationRecord,
    GroundTruthLabel, IssueType, ResolutionStatus, ScenarioBlueprint, SupportIntent, SupportSatisfaction,
};
pub use reports::{DatasetManifest, EvaluationReport, build_dataset_manifest, build_evaluation_report};
pub use scenarios::ScenarioPlanner;
