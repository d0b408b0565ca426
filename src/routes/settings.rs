use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::RequestContext;
use crate::models::settings::{SettingDefinition, SettingsUpdateRequest, UserSetting};
use crate::routes::parse_id;
use crate::services::settings;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/settings", get(list_definitions))
        .route("/users/:id/settings", get(get_settings).patch(update_settings))
}

#[utoipa::path(
    get,
    path = "/settings",
    tag = "Settings",
    responses((status = 200, description = "Setting keys and their defaults", body = [SettingDefinition]))
)]
pub async fn list_definitions(State(state): State<AppState>) -> AppResult<Json<Vec<SettingDefinition>>> {
    Ok(Json(settings::list_setting_definitions(&state.pool).await?))
}

#[utoipa::path(
    get,
    path = "/users/{id}/settings",
    tag = "Settings",
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 200, description = "The account's settings", body = [UserSetting]),
        (status = 404, description = "Unknown account")
    )
)]
pub async fn get_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<UserSetting>>> {
    let user_id = parse_id(&id, "user")?;
    Ok(Json(settings::get_settings(&state.pool, user_id).await?))
}

#[utoipa::path(
    patch,
    path = "/users/{id}/settings",
    tag = "Settings",
    params(("id" = i64, Path, description = "Account id")),
    request_body = SettingsUpdateRequest,
    responses(
        (status = 200, description = "Settings written", body = [UserSetting]),
        (status = 400, description = "Unknown setting key; nothing was written"),
        (status = 404, description = "Unknown account")
    )
)]
pub async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<SettingsUpdateRequest>,
) -> AppResult<Json<Vec<UserSetting>>> {
    let user_id = parse_id(&id, "user")?;
    let context = RequestContext::from_headers(&headers);
    let updates = payload.into_updates();

    let written = settings::update_settings(&state.pool, &state.activity(&context), user_id, &updates).await?;

    Ok(Json(written))
}
