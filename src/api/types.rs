use std::sync::Arc;

use serde::Serialize;

use crate::core_state::CoreState;
use crate::models::{Arrhythmia, Report};

/// Shared context for all API handlers.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// Authenticated user, injected into request extensions by the identity
/// middleware.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub username: String,
}

/// A stored report with its episodes.
#[derive(Debug, Serialize)]
pub struct ReportDetail {
    pub report: Report,
    pub arrhythmias: Vec<Arrhythmia>,
}
