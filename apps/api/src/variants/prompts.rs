// Prompt templates for dual-variant section generation.
// Both variants share one system prompt; only the personalized template sees evidence.

pub const VARIANT_SYSTEM: &str = "You are an expert resume writer. \
    Respond with the section content only: no preamble, no headings, \
    no markdown code fences, no commentary.";

/// Evidence-free "industry standard" variant.
/// Replace: {section}, {job_title}, {job_description}, {requirements}, {keywords}, {instructions}
pub const IDEAL_PROMPT_TEMPLATE: &str = r#"Write the "{section}" section of a resume for the role below as the strongest industry-standard candidate would present it.

TARGET ROLE: {job_title}

JOB DESCRIPTION:
{job_description}

REQUIREMENTS:
{requirements}

ATS KEYWORDS to incorporate naturally (do NOT keyword-stuff):
{keywords}

{instructions}

RULES:
1. Lead each statement with a strong action verb
2. Quantify outcomes wherever a realistic metric applies
3. Address the required qualifications first"#;

/// Evidence-grounded variant. Only the supplied evidence may be used.
/// Replace: {grounding_instruction}, {section}, {job_title}, {job_description},
///          {requirements}, {keywords}, {evidence_json}, {instructions}
pub const PERSONALIZED_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

Write the "{section}" section of a resume for the role below using the candidate's evidence.

TARGET ROLE: {job_title}

JOB DESCRIPTION:
{job_description}

REQUIREMENTS:
{requirements}

ATS KEYWORDS to incorporate where the evidence supports them:
{keywords}

CANDIDATE EVIDENCE (source of truth: ONLY use facts from these):
{evidence_json}

{instructions}

RULES:
1. Every statement must trace back to one evidence item above
2. Keep the candidate's real figures; never round them up
3. Omit requirements the evidence does not support"#;
