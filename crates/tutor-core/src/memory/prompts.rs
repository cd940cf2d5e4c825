//! Prompt builders for every LLM call in the memory pipeline.

use crate::domain::Exchange;

/// Batched extraction prompt. The rules matter: memories are durable facts
/// about the learner (never about the conversation or the system), ASR
/// fragments are repaired, unintelligible text is ignored outright.
pub fn extraction_prompt(exchanges: &[Exchange]) -> String {
    let mut rendered = String::new();
    for (i, exchange) in exchanges.iter().enumerate() {
        rendered.push_str(&format!(
            "\n--- Exchange {} ---\nStudent: {}\nTutor: {}\nTopic: {}\n",
            i + 1,
            exchange.learner_text,
            exchange.tutor_text,
            exchange.topic
        ));
    }

    format!(
        r#"Analyze these {count} conversation exchanges to update the Student Profile.
{rendered}
Task 1: Extract STUDENT MEMORIES.
GOLDEN RULE: You are recording PERMANENT FACTS about the Student. You are NOT summarizing a conversation.

1. STRICT PROHIBITION (zero tolerance):
   - NEVER mention "The AI", "The Tutor", "The System", or "The Conversation".
   - NEVER output meta-commentary like "Student responded to the prompt".
   - BAD: "Student asked the AI for help with algebra."
   - GOOD: "Student requested help with algebra."

2. TRANSCRIPTION HANDLING (audio artifacts):
   - The Student text comes from realtime audio-to-text and may contain broken words (e.g. "chem is try").
   - REPAIR these fragments mentally to capture the intent ("chem is try" means "chemistry").
   - NO META-MEMORIES about text format ("Student types with spaces" must never be recorded).
   - If text is unintelligible, IGNORE it entirely.

3. CATEGORIES:
   - academic: knowledge gaps, misconceptions, or mastery (e.g. "Understands chain rule").
   - personal: hobbies, life details (e.g. "Plays soccer").
   - preference: learning needs (e.g. "Prefers visual examples").
   - context: emotional state (e.g. "Anxious about upcoming exam").

Task 2: Detect EMOTIONS (frustrated, confused, excited, anxious, tired, happy, or neutral).
Task 3: Identify KEY MOMENTS (breakthroughs, major struggles).
Task 4: Identify UNFINISHED TOPICS.

Return a SINGLE JSON object:
{{
  "memories": [
    {{"type": "academic|personal|preference|context", "text": "...", "importance": 0.0, "metadata": {{"emotion": "...", "topic": "..."}}}}
  ],
  "emotions": ["..."],
  "key_moments": ["..."],
  "unfinished_topics": ["..."]
}}

Return ONLY valid JSON."#,
        count = exchanges.len(),
        rendered = rendered
    )
}

/// Light-retrieval analysis: does this turn need memory retrieval at all,
/// and if so, what search query best captures the informational need?
pub fn light_retrieval_prompt(user_text: &str, tutor_text: &str) -> String {
    format!(
        r#"A student just said: "{user_text}"
The tutor's previous message was: "{tutor_text}"

Decide whether looking up long-term memories about this student would help the tutor respond.
Small acknowledgements ("ok", "thanks", "sure") do not need retrieval.
If retrieval helps, write the single best search query for the student's informational need.

Return ONLY valid JSON:
{{"need_retrieval": true|false, "retrieval_query": "...", "reasoning": "..."}}"#
    )
}

/// Deep-retrieval query synthesis from the recent conversation window.
pub fn deep_query_prompt(conversation_text: &str) -> String {
    format!(
        r#"Here are the most recent turns of a tutoring conversation:

{conversation_text}

Synthesize ONE thematic search query that captures what this conversation is really about,
suitable for retrieving long-term memories about the student.

Return ONLY valid JSON:
{{"deep_query": "..."}}"#
    )
}

/// Reflection-layer synthesis: candidate memories in, a single instruction
/// for the conversational agent out, or the sentinel "NONE".
pub fn reflection_prompt(memories_block: &str, conversation_context: &str) -> String {
    format!(
        r#"You advise a conversational tutoring agent. These long-term memories about the student were retrieved:

{memories_block}

Recent conversation:
{conversation_context}

If any of these memories would genuinely improve the agent's next responses, write ONE concise
natural-language instruction telling the agent how to use them. Do not quote the memories verbatim.
If none are relevant to the current moment, reply with exactly: NONE

Return ONLY the instruction or NONE."#
    )
}

/// Closing artifacts: session summary, goodbye, and next-session hooks.
pub fn closing_artifacts_prompt(
    topics: &str,
    key_moments: &str,
    emotional_journey: &str,
    current_emotion: &str,
    unfinished: &str,
) -> String {
    format!(
        r#"Analyze this tutoring session data and generate closing artifacts.

Data:
- Topics: {topics}
- Key Moments: {key_moments}
- Emotional Journey: {emotional_journey} (Ending: {current_emotion})
- Unfinished Topics: {unfinished}

Generate a JSON object with these 3 keys:
1. "summary": 1-2 concise sentences on what was learned and how they felt.
2. "goodbye": a warm, natural, personal goodbye message (1-2 sentences) acknowledging their emotion.
3. "hooks": array of 2-3 specific, actionable next-session topics based on unfinished items or key moments.

Return ONLY valid JSON:
{{"summary": "...", "goodbye": "...", "hooks": ["...", "..."]}}"#
    )
}

/// Welcome hook referencing a specific achievement from the last session.
pub fn welcome_hook_prompt(summary: &str, achievement: &str, emotional_state: &str) -> String {
    format!(
        r#"Generate a warm, natural welcome message (1-2 sentences) that references a specific achievement from last session.

Last session summary: {summary}
Key achievement: {achievement}
Emotional state when they left: {emotional_state}

Reference the achievement naturally, e.g. "Last time you cracked the discriminant - ready to build on that?"

Return ONLY the welcome message, nothing else."#
    )
}

/// Time-contextual personal relevance line from personal-category memories.
pub fn personal_relevance_prompt(day_name: &str, time_of_day: &str, personal_texts: &str) -> String {
    format!(
        r#"Generate a brief, time-contextual personal relevance string (max 20 words) for a tutoring session.

Current day: {day_name}
Time of day: {time_of_day}
Personal memories: {personal_texts}

Create a natural, contextual string referencing their personal life relevant to NOW,
e.g. "It's Friday - basketball game today?". If nothing is time-relevant, return an empty string.

Return ONLY the relevance string or an empty string, nothing else."#
    )
}

/// Conversation opener combining last session, emotion, and personal context.
pub fn suggested_opener_prompt(
    summary: &str,
    emotional_state: &str,
    personal_relevance: &str,
    unfinished: &str,
) -> String {
    format!(
        r#"Generate a natural, conversational opening line (1-2 sentences) for an AI tutor.

Last session: {summary}
Emotional state: {emotional_state}
Personal context: {personal_relevance}
Unfinished topics: {unfinished}

Sound like a friendly tutor who remembers them. Return ONLY the opener, nothing else."#
    )
}
