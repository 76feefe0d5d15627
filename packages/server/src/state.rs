use std::sync::Arc;

use crate::avatar::AvatarService;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub avatars: Arc<AvatarService>,
    pub config: Arc<AppConfig>,
}
