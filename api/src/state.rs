use std::sync::Arc;

use crate::analysis::TranscriptAnalyzer;
use crate::config::Config;
use crate::initiator::CallInitiator;
use crate::reconciler::EventReconciler;
use crate::store::CallStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CallStore>,
    pub initiator: Arc<dyn CallInitiator>,
    pub reconciler: EventReconciler,
    pub analyzer: TranscriptAnalyzer,
    pub config: Arc<Config>,
}
