use serde::Serialize;

use super::models::{ChatTurn, ConversationArtifact, ScenarioBlueprint};

pub const GENERATOR_SYSTEM_PROMPT: &str = "\
You generate realistic customer support chats for QA analytics datasets.
Always follow the blueprint exactly.
Keep the dialogue natural, concise, and consistent with the requested language.
Do not add markdown, timestamps, or narration outside the schema.
Preserve subtle dissatisfaction when the blueprint requires hidden dissatisfaction.
If agent errors are required, make them realistic rather than cartoonish.";

pub const EVALUATOR_SYSTEM_PROMPT: &str = "\
You are a strict QA auditor for customer support conversations.
Classify the actual customer intent, customer satisfaction, agent quality, and agent mistakes.
Use only the labels allowed by the schema.
Return only the structured JSON response that matches the schema.";

pub fn build_generation_prompt(blueprint: &ScenarioBlueprint) -> Result<String, serde_json::Error> {
    let blueprint_json = serde_json::to_string_pretty(blueprint)?;
    Ok(format!(
        "Generate one customer support conversation using this blueprint.

Requirements:
- Language: {language}
- Use {min} to {max} turns.
- Alternate roles naturally between customer and agent.
- The transcript must feel like a real live chat, not a script.
- Keep each message focused and realistic for a SaaS support team.
- The topic, resolution, tone, and customer satisfaction must match the blueprint.
- If hidden dissatisfaction is true, the customer should be formally polite near the end while the problem remains unresolved or only partially addressed.
- Reflect all required story beats.
- Reflect all required agent errors, when present.

Blueprint:
{blueprint_json}",
        language = blueprint.language,
        min = blueprint.min_turns,
        max = blueprint.max_turns,
    ))
}

/// The evaluator only sees the transcript, never the blueprint or ground truth.
#[derive(Serialize)]
struct Transcript<'a> {
    conversation_id: &'a str,
    language: &'a str,
    support_channel: &'a str,
    title: &'a str,
    scenario_summary: &'a str,
    turns: &'a [ChatTurn],
    final_customer_signal: &'a str,
}

pub fn build_evaluation_prompt(conversation: &ConversationArtifact) -> Result<String, serde_json::Error> {
    let conversation_json = serde_json::to_string_pretty(&Transcript {
        conversation_id: &conversation.conversation_id,
        language: &conversation.language,
        support_channel: &conversation.support_channel,
        title: &conversation.title,
        scenario_summary: &conversation.scenario_summary,
        turns: &conversation.turns,
        final_customer_signal: &conversation.final_customer_signal,
    })?;
    Ok(format!(
        "Evaluate the following support conversation.

Required output:
- intent: one of payment_issue, technical_error, account_access, plan_question, refund_request, other
- satisfaction: one of satisfied, neutral, unsatisfied
- quality_score: integer from 1 to 5 where 5 is excellent and 1 is very poor
- agent_mistakes: zero or more of ignored_question, incorrect_info, rude_tone, no_resolution, unnecessary_escalation

Judging rules:
- Choose other only when the conversation does not fit the supported intent categories.
- Choose satisfied only when the customer leaves with a clearly positive or resolved outcome.
- Choose unsatisfied when the customer remains blocked, frustrated, or the issue is unresolved.
- Use no_resolution when the agent fails to bring the conversation to a usable resolution.
- Use ignored_question when the agent leaves a direct customer question unanswered.
- Use incorrect_info when the agent gives misleading, wrong, or overconfident information.
- Use rude_tone when the agent is dismissive, sharp, or unnecessarily defensive.
- Use unnecessary_escalation when escalation is avoidable and the agent escalates anyway.

Conversation:
{conversation_json}"
    ))
}
