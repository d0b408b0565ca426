use std::sync::Arc;

use axum::http::Method;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::RbacConfig;
use crate::events::{Activity, ActivitySink, RequestContext};
use crate::routes::{articles, health, roles, settings, users};
use crate::utils::CredentialHasher;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub rbac: RbacConfig,
    pub hasher: Arc<dyn CredentialHasher>,
    pub events: Arc<dyn ActivitySink>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        rbac: RbacConfig,
        hasher: Arc<dyn CredentialHasher>,
        events: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            pool,
            rbac,
            hasher,
            events,
        }
    }

    /// Activity handle for one request.
    pub fn activity<'a>(&'a self, context: &'a RequestContext) -> Activity<'a> {
        Activity::new(self.events.as_ref()).with_context(context)
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::routes())
        .merge(users::routes())
        .merge(roles::routes())
        .merge(settings::routes())
        .merge(articles::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
