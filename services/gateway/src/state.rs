//! State shared by every handler: configuration, the skill registry,
//! and the agent settings payload.

use crate::config::Config;
use serde_json::Value;
use std::sync::Arc;
use switchboard_skills::SkillRegistry;

/// Built once at startup and handed to the router as an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub skills: Arc<SkillRegistry>,
    /// The opaque `Settings` payload sent to the agent at the start of
    /// every call, loaded from disk once at startup.
    pub agent_settings: Arc<Value>,
}
