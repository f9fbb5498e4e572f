pub mod health;
pub mod tasks;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /load                          admission load (GET)
///
/// /tasks                         submit (POST, multipart)
/// /tasks/current                 poll (GET), adopt ?taskid= (PUT), detach (DELETE)
/// /tasks/{id}                    poll by id (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/load", get(handlers::load::get_load))
        .nest("/tasks", tasks::router())
}
