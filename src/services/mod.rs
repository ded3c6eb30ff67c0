// Services module - the pass generation pipeline

pub mod assets;
pub mod orchestrator;
pub mod pass_builder;
pub mod pkpass;
pub mod remote_signer;
pub mod resources;
