//! Deterministic planning of scenario blueprints.
//!
//! Every (issue, case class) pair appears at least once; the remaining slots
//! cycle through the pairs again. The order is shuffled by a BLAKE3 key over
//! (seed, position), so the same seed always yields the same plan.

use strum::IntoEnumIterator;

use super::models::{
    AgentError, AgentErrorType, CaseClass, CustomerSatisfaction, IssueType, ResolutionStatus,
    ScenarioBlueprint,
};
use crate::error::ForgeError;

const SUPPORT_CHANNELS: &[&str] = &["live_chat", "web_widget", "billing_portal", "mobile_app_chat"];

const CUSTOMER_PROFILES: &[&str] = &[
    "Small business owner who administers the account alone.",
    "Operations manager of a mid-sized team that depends heavily on the service.",
    "Startup founder who reacts quickly to outages and costs.",
    "Finance manager who keeps track of payments and refunds.",
    "Support specialist escalating an issue on behalf of their own team.",
];

const MIN_TURNS: u8 = 6;
const MAX_TURNS: u8 = 10;

struct Variant {
    prompt: &'static str,
    beats: [&'static str; 3],
}

fn variants(issue: IssueType) -> &'static [Variant] {
    match issue {
        IssueType::PaymentIssue => &[
            Variant {
                prompt: "Double charge after retrying a subscription payment.",
                beats: [
                    "the customer sees two charges for the same billing period",
                    "the agent asks for or checks the payment identifier",
                    "the difference between a bank hold and an actual charge is discussed",
                ],
            },
            Variant {
                prompt: "Payment is stuck in processing and the plan was never activated.",
                beats: [
                    "the customer reports a charge without plan activation",
                    "the agent checks the transaction status",
                    "the impact on access to features comes up",
                ],
            },
        ],
        IssueType::TechnicalError => &[
            Variant {
                prompt: "Report export stopped working after the latest app update.",
                beats: [
                    "the customer describes a reproducible technical error",
                    "the agent asks about the environment or reproduction steps",
                    "diagnostic steps are discussed in the chat",
                ],
            },
            Variant {
                prompt: "Saving settings fails with a 500 error.",
                beats: [
                    "the customer quotes a concrete error code or symptom",
                    "the agent gathers context and proposes a check",
                    "a temporary workaround or an escalation is discussed",
                ],
            },
        ],
        IssueType::AccountAccess => &[
            Variant {
                prompt: "The customer cannot log in after a password change and gets no recovery email.",
                beats: [
                    "the customer cannot regain access to the account",
                    "the agent checks the email, SSO or lock status",
                    "security or identity verification steps come up",
                ],
            },
            Variant {
                prompt: "The account was locked after several failed login attempts.",
                beats: [
                    "the customer reports the account lock",
                    "the agent explains the cause or the unlock procedure",
                    "a waiting period or a manual review is mentioned",
                ],
            },
        ],
        IssueType::PlanQuestion => &[
            Variant {
                prompt: "The customer wants to understand the difference between the Pro and Business plans.",
                beats: [
                    "the customer asks about plan capabilities",
                    "the agent explains plan limits or features",
                    "the effect of switching plans on existing data or billing is discussed",
                ],
            },
            Variant {
                prompt: "The customer is unsure whether to switch to annual billing.",
                beats: [
                    "the customer asks about plan terms",
                    "the agent explains billing terms or discounts",
                    "the moment of the plan change is mentioned",
                ],
            },
        ],
        IssueType::RefundRequest => &[
            Variant {
                prompt: "The customer asks for a refund after an unwanted subscription renewal.",
                beats: [
                    "the customer asks for the money back",
                    "the agent checks the charge date and the refund policy",
                    "a partial or full refund is discussed",
                ],
            },
            Variant {
                prompt: "The customer bought the wrong plan and wants to cancel the purchase.",
                beats: [
                    "the customer explains the mistaken purchase",
                    "the agent checks whether the plan was activated",
                    "the cancellation policy and deadlines come up",
                ],
            },
        ],
    }
}

fn issue_specific_error(issue: IssueType) -> &'static str {
    match issue {
        IssueType::PaymentIssue => "the agent misreads the payment status or skips key transaction details",
        IssueType::TechnicalError => "the agent jumps to a conclusion without enough diagnostics",
        IssueType::AccountAccess => "the agent skips an important verification or recovery step",
        IssueType::PlanQuestion => "the agent vaguely explains plan differences or the effect of switching",
        IssueType::RefundRequest => "the agent vaguely or wrongly explains the refund policy",
    }
}

/// Case-class dependent targets for one blueprint.
struct CaseTargets {
    customer_tone: &'static str,
    resolution_status: ResolutionStatus,
    visible: CustomerSatisfaction,
    actual: CustomerSatisfaction,
    hidden_dissatisfaction: bool,
    problem_solved: bool,
    quality_score: u8,
    agent_errors: Vec<AgentError>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScenarioPlanner;

impl ScenarioPlanner {
    pub fn new() -> Self {
        Self
    }

    /// All (issue, case class) pairs in declaration order.
    pub fn pairs() -> Vec<(IssueType, CaseClass)> {
        IssueType::iter()
            .flat_map(|issue| CaseClass::iter().map(move |case| (issue, case)))
            .collect()
    }

    /// Plan `count` blueprints. `count` must cover every (issue, case class) pair.
    pub fn plan(&self, count: usize, seed: u64, language: &str) -> Result<Vec<ScenarioBlueprint>, ForgeError> {
        let pairs = Self::pairs();
        if count < pairs.len() {
            return Err(ForgeError::Config(format!(
                "count must be at least {} to cover all issue and case classes",
                pairs.len()
            )));
        }

        let mut planned: Vec<(IssueType, CaseClass)> = pairs.iter().copied().cycle().take(count).collect();
        let mut order: Vec<usize> = (0..planned.len()).collect();
        order.sort_by_key(|position| shuffle_key(seed, *position as u64));
        planned = order.into_iter().map(|position| planned[position]).collect();

        Ok(planned
            .into_iter()
            .enumerate()
            .map(|(index, (issue, case))| self.blueprint(index, issue, case, seed, language))
            .collect())
    }

    fn blueprint(
        &self,
        index: usize,
        issue: IssueType,
        case: CaseClass,
        seed: u64,
        language: &str,
    ) -> ScenarioBlueprint {
        let slot = seed.wrapping_add(index as u64);
        let pool = variants(issue);
        let variant = &pool[(slot % pool.len() as u64) as usize];
        let targets = case_targets(issue, case, index, seed);

        ScenarioBlueprint {
            conversation_id: format!("chat_{seed:04}_{:03}", index + 1),
            language: language.to_string(),
            support_channel: SUPPORT_CHANNELS[(slot % SUPPORT_CHANNELS.len() as u64) as usize].to_string(),
            issue_type: issue,
            case_class: case,
            customer_profile: CUSTOMER_PROFILES
                [(seed.wrapping_mul(3).wrapping_add(index as u64) % CUSTOMER_PROFILES.len() as u64) as usize]
                .to_string(),
            scenario_prompt: variant.prompt.to_string(),
            customer_tone: targets.customer_tone.to_string(),
            resolution_status: targets.resolution_status,
            visible_customer_satisfaction: targets.visible,
            actual_customer_satisfaction: targets.actual,
            hidden_dissatisfaction: targets.hidden_dissatisfaction,
            problem_solved: targets.problem_solved,
            target_answer_quality_score: targets.quality_score,
            required_story_beats: story_beats(variant, case, targets.hidden_dissatisfaction, targets.problem_solved),
            required_agent_errors: targets.agent_errors,
            min_turns: MIN_TURNS,
            max_turns: MAX_TURNS,
            generation_seed: slot,
        }
    }
}

fn shuffle_key(seed: u64, position: u64) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(&position.to_le_bytes());
    *hasher.finalize().as_bytes()
}

fn story_beats(variant: &Variant, case: CaseClass, hidden: bool, solved: bool) -> Vec<String> {
    let mut beats: Vec<String> = variant.beats.iter().map(|b| b.to_string()).collect();
    if hidden {
        beats.push("at the end the customer sounds polite, but the problem is not fully solved".to_string());
    }
    match case {
        CaseClass::Conflict => {
            beats.push("tension between the customer and the agent clearly rises mid-conversation".to_string())
        }
        CaseClass::Successful => {
            beats.push("the agent brings the conversation to a clear, verified outcome".to_string())
        }
        _ if !solved => beats.push("the ending leaves a risk of the customer coming back".to_string()),
        _ => {}
    }
    beats
}

fn case_targets(issue: IssueType, case: CaseClass, index: usize, seed: u64) -> CaseTargets {
    let step = |modulus: usize| (index % modulus) as u8;
    match case {
        CaseClass::Successful => {
            let satisfaction = if index % 2 == 1 {
                CustomerSatisfaction::Satisfied
            } else {
                CustomerSatisfaction::Delighted
            };
            CaseTargets {
                customer_tone: "calm and pragmatic",
                resolution_status: ResolutionStatus::Resolved,
                visible: satisfaction,
                actual: satisfaction,
                hidden_dissatisfaction: false,
                problem_solved: true,
                quality_score: 92 - step(8),
                agent_errors: Vec::new(),
            }
        }
        CaseClass::Problematic => {
            let hidden = index % 2 == 0;
            CaseTargets {
                customer_tone: "anxious",
                resolution_status: if hidden {
                    ResolutionStatus::PartiallyResolved
                } else {
                    ResolutionStatus::Unresolved
                },
                visible: if hidden {
                    CustomerSatisfaction::Satisfied
                } else {
                    CustomerSatisfaction::Neutral
                },
                actual: if hidden {
                    CustomerSatisfaction::Dissatisfied
                } else {
                    CustomerSatisfaction::Neutral
                },
                hidden_dissatisfaction: hidden,
                problem_solved: false,
                quality_score: 62 - step(9),
                agent_errors: vec![AgentError {
                    kind: AgentErrorType::Process,
                    description: issue_specific_error(issue).to_string(),
                    severity: 3,
                }],
            }
        }
        CaseClass::Conflict => CaseTargets {
            customer_tone: "irritated",
            resolution_status: if index % 3 == 0 {
                ResolutionStatus::PartiallyResolved
            } else {
                ResolutionStatus::Unresolved
            },
            visible: CustomerSatisfaction::Dissatisfied,
            actual: CustomerSatisfaction::VeryDissatisfied,
            hidden_dissatisfaction: false,
            problem_solved: false,
            quality_score: 38 - step(7),
            agent_errors: vec![
                AgentError {
                    kind: AgentErrorType::Tone,
                    description: "the agent answers too sharply or defensively instead of de-escalating".to_string(),
                    severity: 4,
                },
                AgentError {
                    kind: AgentErrorType::Empathy,
                    description: "the agent does not acknowledge the customer's real discomfort".to_string(),
                    severity: 4,
                },
            ],
        },
        CaseClass::AgentMistake => {
            let hidden = index % 3 == 0;
            let second_kind = if shuffle_key(seed ^ 0x5eed, index as u64)[0] & 1 == 0 {
                AgentErrorType::Tone
            } else {
                AgentErrorType::Accuracy
            };
            CaseTargets {
                customer_tone: if hidden { "tense but polite" } else { "stressed" },
                resolution_status: if hidden {
                    ResolutionStatus::PartiallyResolved
                } else {
                    ResolutionStatus::Unresolved
                },
                visible: if hidden {
                    CustomerSatisfaction::Neutral
                } else {
                    CustomerSatisfaction::Dissatisfied
                },
                actual: CustomerSatisfaction::Dissatisfied,
                hidden_dissatisfaction: hidden,
                problem_solved: false,
                quality_score: 47 - step(11),
                agent_errors: vec![
                    AgentError {
                        kind: AgentErrorType::Logic,
                        description: issue_specific_error(issue).to_string(),
                        severity: 4,
                    },
                    AgentError {
                        kind: second_kind,
                        description: "the agent phrases the answer in a way that misleads or annoys the customer"
                            .to_string(),
                        severity: 3,
                    },
                ],
            }
        }
    }
}
