// Section rewrites and their grounding validation. Validation of session-bound
// rewrites runs in the background behind a latest-request guard.

pub mod handlers;
pub mod prompts;
pub mod rewriter;
pub mod tracker;
pub mod validator;
