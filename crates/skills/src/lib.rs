//! Skills invoked on behalf of the voice agent's tool-use mechanism.
//!
//! Every capability here is a named, text-returning function over a small
//! in-memory store. The one hard rule, inherited from the voice surface:
//! whatever happens inside a skill, the caller gets back a sentence the
//! agent can read aloud, never an error value.

pub mod appointments;
pub mod pharmacy;
pub mod registry;

pub use registry::{SkillRegistry, SkillStore};
