pub mod extraction;
pub mod finalize;
pub mod inference;
pub mod orchestrator;
