pub mod pool;

use std::sync::Arc;

use crate::aicore::AiCore;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub ai_core: AiCore,
    pub config: Arc<Config>,
}
