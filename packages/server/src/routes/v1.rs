use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::avatar::get_thumbnail,
            handlers::avatar::create_avatar,
            handlers::avatar::change_mask,
            handlers::avatar::delete_avatar
        ))
        .routes(routes!(
            handlers::avatar::get_original,
            handlers::avatar::replace_avatar
        ))
        .layer(handlers::avatar::upload_body_limit(
            config.storage.max_blob_size,
        ))
}
