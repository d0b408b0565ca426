//! Role assignment and the role/permission grant ledger.
//!
//! Every change here is recorded in the activity log with critical severity.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::RequestContext;
use crate::models::rbac::{GrantOutcome, GrantResponse, Permission, Role, UserRole};
use crate::routes::parse_id;
use crate::services::{permissions, roles};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/roles/:id/permissions", get(list_role_permissions))
        .route(
            "/roles/:id/permissions/:permission_id",
            put(grant_permission).delete(revoke_permission),
        )
        .route("/permissions", get(list_permissions))
        .route("/users/:id/roles", get(list_user_roles))
        .route("/users/:id/roles/:role_id", put(assign_role).delete(revoke_role))
}

// =============================================================================
// ROLES
// =============================================================================

#[utoipa::path(
    get,
    path = "/roles",
    tag = "RBAC",
    responses((status = 200, description = "All roles", body = [Role]))
)]
pub async fn list_roles(State(state): State<AppState>) -> AppResult<Json<Vec<Role>>> {
    Ok(Json(roles::list_roles(&state.pool).await?))
}

#[utoipa::path(
    get,
    path = "/users/{id}/roles",
    tag = "RBAC",
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 200, description = "The account's role grant", body = [UserRole]),
        (status = 404, description = "Unknown account")
    )
)]
pub async fn list_user_roles(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<UserRole>>> {
    let user_id = parse_id(&id, "user")?;
    Ok(Json(roles::list_user_roles(&state.pool, user_id).await?))
}

#[utoipa::path(
    put,
    path = "/users/{id}/roles/{role_id}",
    tag = "RBAC",
    params(
        ("id" = i64, Path, description = "Account id"),
        ("role_id" = i64, Path, description = "Role to assign")
    ),
    responses(
        (status = 200, description = "Role assigned, replacing the previous one", body = UserRole),
        (status = 404, description = "Unknown account"),
        (status = 500, description = "Unknown role; previous grant kept")
    )
)]
pub async fn assign_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, role_id)): Path<(String, String)>,
) -> AppResult<Json<UserRole>> {
    let user_id = parse_id(&id, "user")?;
    let role_id = parse_id(&role_id, "role")?;
    let context = RequestContext::from_headers(&headers);

    let grant = roles::assign_role(&state.pool, &state.rbac, &state.activity(&context), user_id, role_id).await?;

    Ok(Json(grant))
}

#[utoipa::path(
    delete,
    path = "/users/{id}/roles/{role_id}",
    tag = "RBAC",
    params(
        ("id" = i64, Path, description = "Account id"),
        ("role_id" = i64, Path, description = "Role to revoke")
    ),
    responses(
        (status = 204, description = "Role no longer held by the account"),
        (status = 403, description = "The default role cannot be revoked")
    )
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, role_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let user_id = parse_id(&id, "user")?;
    let role_id = parse_id(&role_id, "role")?;
    let context = RequestContext::from_headers(&headers);

    roles::revoke_role(&state.pool, &state.rbac, &state.activity(&context), user_id, role_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// PERMISSIONS
// =============================================================================

#[utoipa::path(
    get,
    path = "/permissions",
    tag = "RBAC",
    responses((status = 200, description = "All permissions", body = [Permission]))
)]
pub async fn list_permissions(State(state): State<AppState>) -> AppResult<Json<Vec<Permission>>> {
    Ok(Json(permissions::list_permissions(&state.pool).await?))
}

#[utoipa::path(
    get,
    path = "/roles/{id}/permissions",
    tag = "RBAC",
    params(("id" = i64, Path, description = "Role id")),
    responses(
        (status = 200, description = "Permissions held by the role", body = [Permission]),
        (status = 404, description = "Unknown role")
    )
)]
pub async fn list_role_permissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Permission>>> {
    let role_id = parse_id(&id, "role")?;
    Ok(Json(permissions::list_role_permissions(&state.pool, role_id).await?))
}

#[utoipa::path(
    put,
    path = "/roles/{id}/permissions/{permission_id}",
    tag = "RBAC",
    params(
        ("id" = i64, Path, description = "Role id"),
        ("permission_id" = i64, Path, description = "Permission to grant")
    ),
    responses(
        (status = 201, description = "Permission granted", body = GrantResponse),
        (status = 200, description = "Permission was already granted", body = GrantResponse),
        (status = 409, description = "Already granted and re-grants are rejected")
    )
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, permission_id)): Path<(String, String)>,
) -> AppResult<(StatusCode, Json<GrantResponse>)> {
    let role_id = parse_id(&id, "role")?;
    let permission_id = parse_id(&permission_id, "permission")?;
    let context = RequestContext::from_headers(&headers);

    let outcome = permissions::grant_permission(
        &state.pool,
        state.rbac.regrant_policy,
        &state.activity(&context),
        role_id,
        permission_id,
    )
    .await?;

    let status = match outcome {
        GrantOutcome::Granted => StatusCode::CREATED,
        GrantOutcome::AlreadyGranted => StatusCode::OK,
    };

    Ok((
        status,
        Json(GrantResponse {
            role_id,
            permission_id,
            outcome,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}/permissions/{permission_id}",
    tag = "RBAC",
    params(
        ("id" = i64, Path, description = "Role id"),
        ("permission_id" = i64, Path, description = "Permission to revoke")
    ),
    responses(
        (status = 204, description = "Permission revoked"),
        (status = 404, description = "The role does not hold the permission")
    )
)]
pub async fn revoke_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, permission_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let role_id = parse_id(&id, "role")?;
    let permission_id = parse_id(&permission_id, "permission")?;
    let context = RequestContext::from_headers(&headers);

    permissions::revoke_permission(&state.pool, &state.activity(&context), role_id, permission_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
