//! spanemu-api: REST API for the Spanner emulator.
//!
//! # API Routes
//!
//! All paths are relative to `/v1/projects/{project}`.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/instanceConfigs` | List instance configs |
//! | GET | `/instanceConfigs/{config}` | Get an instance config |
//! | GET | `/instances` | List instances |
//! | POST | `/instances` | Create an instance |
//! | GET | `/instances/{instance}` | Get an instance |
//! | PATCH | `/instances/{instance}` | Update masked instance fields |
//! | DELETE | `/instances/{instance}` | Delete an instance and its databases |
//! | GET | `/instances/{instance}/operations` | List instance operations |
//! | GET | `/instances/{instance}/operations/{op}` | Get an instance operation |
//! | GET | `/instances/{instance}/databases` | List databases |
//! | POST | `/instances/{instance}/databases` | Create a database |
//! | GET | `/instances/{instance}/databases/{db}` | Get a database |
//! | DELETE | `/instances/{instance}/databases/{db}` | Drop a database |
//! | GET | `/instances/{instance}/databases/{db}/ddl` | Get the schema as DDL |
//! | PATCH | `/instances/{instance}/databases/{db}/ddl` | Apply DDL statements |
//! | GET | `/instances/{instance}/databases/{db}/operations/{op}` | Get a database operation |
//! | POST | `/instances/{instance}/databases/{db}/read` | Key-set read |
//! | POST | `/instances/{instance}/databases/{db}/commit` | Apply mutations |

pub mod body;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use spanemu_service::Emulator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub emulator: Emulator,
}

/// Build the complete API router.
pub fn build_router(emulator: Emulator) -> Router {
    let state = ApiState { emulator };

    let project_routes = Router::new()
        .route("/instanceConfigs", get(handlers::list_instance_configs))
        .route("/instanceConfigs/{config}", get(handlers::get_instance_config))
        .route(
            "/instances",
            get(handlers::list_instances).post(handlers::create_instance),
        )
        .route(
            "/instances/{instance}",
            get(handlers::get_instance)
                .patch(handlers::update_instance)
                .delete(handlers::delete_instance),
        )
        .route(
            "/instances/{instance}/operations",
            get(handlers::list_instance_operations),
        )
        .route(
            "/instances/{instance}/operations/{operation}",
            get(handlers::get_instance_operation),
        )
        .route(
            "/instances/{instance}/databases",
            get(handlers::list_databases).post(handlers::create_database),
        )
        .route(
            "/instances/{instance}/databases/{database}",
            get(handlers::get_database).delete(handlers::drop_database),
        )
        .route(
            "/instances/{instance}/databases/{database}/ddl",
            get(handlers::get_database_ddl).patch(handlers::update_database_ddl),
        )
        .route(
            "/instances/{instance}/databases/{database}/operations/{operation}",
            get(handlers::get_database_operation),
        )
        .route(
            "/instances/{instance}/databases/{database}/read",
            post(handlers::read),
        )
        .route(
            "/instances/{instance}/databases/{database}/commit",
            post(handlers::commit),
        )
        .with_state(state);

    Router::new().nest("/v1/projects/{project}", project_routes)
}
