// Prompt templates for section rewrites and rewrite validation.

/// Rewrite prompt. Replace: {grounding_instruction}, {section}, {instruction},
/// {section_text}, {claims_json}
pub const REWRITE_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

Rewrite the resume "{section}" section below according to the user's instruction.

INSTRUCTION:
{instruction}

CURRENT SECTION:
{section_text}

EVIDENCE CLAIMS (source of truth, with the user's confidence 0.0 to 1.0):
{claims_json}

Return a JSON object with this EXACT schema:
{
  "text": "the full rewritten section",
  "keywordsAdded": ["terms you introduced that were not in the current section"],
  "evidenceUsed": ["evidenceId values of the claims you relied on"],
  "openQuestions": ["facts you would need from the user to strengthen the section"]
}

RULES:
1. Keep every figure exactly as the evidence states it
2. Prefer claims with higher confidence
3. If the instruction asks for something the evidence cannot support, leave it out and add an open question"#;

/// Validation prompt. Replace: {verbatim_instruction}, {section}, {original},
/// {rewritten}, {claims_json}, {precheck_json}
pub const VALIDATION_PROMPT_TEMPLATE: &str = r#"You are auditing an AI rewrite of a resume "{section}" section for claims the evidence does not support.

{verbatim_instruction}

ORIGINAL:
{original}

REWRITTEN:
{rewritten}

EVIDENCE CLAIMS (the ONLY facts the candidate has verified):
{claims_json}

ISSUES ALREADY FOUND BY AUTOMATED CHECKS (do not repeat them):
{precheck_json}

Return a JSON object with this EXACT schema:
{
  "confidence": 0.0,
  "issues": [
    {
      "kind": "hallucination | exaggeration | unsupported_claim | missing_evidence",
      "severity": "critical | warning | info",
      "problematicText": "exact span copied from REWRITTEN",
      "suggestion": "how to fix it"
    }
  ]
}

SEVERITY GUIDE:
- critical: an employer, title, credential, or outcome that appears in no evidence claim
- warning: a figure or scope inflated beyond what the evidence states
- info: wording that leans on a low-confidence claim

"confidence" is how sure you are of your verdict, from 0.0 to 1.0."#;
