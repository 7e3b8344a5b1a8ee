// Evidence ranking and requirement matching. Pure scoring, no LLM calls;
// the repository only reads evidence owned by the record store.

pub mod handlers;
pub mod matrix;
pub mod ranker;
pub mod repository;
