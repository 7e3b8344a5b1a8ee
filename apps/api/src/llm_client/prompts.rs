// Cross-cutting prompt fragments. Each pipeline module keeps its own prompts.rs
// for the templates it sends.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every prompt that is given the user's evidence.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Use ONLY the evidence provided below. Every employer, title, figure, \
    technology, and outcome you write must appear in that evidence. \
    Do NOT infer, interpolate, or invent details. \
    If the evidence does not support a claim, omit the claim entirely.";

/// Instruction to quote offending text exactly so callers can highlight it.
pub const VERBATIM_SPAN_INSTRUCTION: &str = "\
    When you report a problem, copy the offending text EXACTLY as it appears, \
    character for character. Never paraphrase, summarise, or correct it.";
