use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(tasks::submit))
        .route(
            "/current",
            get(tasks::get_current)
                .put(tasks::adopt_current)
                .delete(tasks::detach_current),
        )
        .route("/{id}", get(tasks::get_by_id))
}
