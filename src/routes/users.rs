use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::RequestContext;
use crate::models::user::{ChangePasswordRequest, CreateUserRequest, User};
use crate::routes::parse_id;
use crate::services::{accounts, provisioning};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route("/users/:id/password", put(change_password))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created with default role and settings", body = User),
        (status = 400, description = "Empty username, email or password"),
        (status = 409, description = "Username or email already in use")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let context = RequestContext::from_headers(&headers);
    let account = provisioning::NewAccount {
        username: payload.username,
        email: payload.email,
        password: payload.password,
    };

    let user = provisioning::create_account(
        &state.pool,
        state.hasher.as_ref(),
        &state.rbac,
        &state.activity(&context),
        account,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = User),
        (status = 404, description = "Unknown account")
    )
)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<User>> {
    let user_id = parse_id(&id, "user")?;
    let user = accounts::get_account(&state.pool, user_id).await?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 204, description = "Account and its articles, likes, grants and settings deleted"),
        (status = 404, description = "Unknown account")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let user_id = parse_id(&id, "user")?;
    let context = RequestContext::from_headers(&headers);

    accounts::delete_account(&state.pool, &state.activity(&context), user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/users/{id}/password",
    tag = "Users",
    params(("id" = i64, Path, description = "Account id")),
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 403, description = "Current password does not match"),
        (status = 404, description = "Unknown account")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    let user_id = parse_id(&id, "user")?;
    let context = RequestContext::from_headers(&headers);

    accounts::change_password(
        &state.pool,
        state.hasher.as_ref(),
        &state.activity(&context),
        user_id,
        payload.current_password,
        payload.new_password,
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
