//! Permission CRUD and user assignment. Bodies use the `isComposite` tree documents.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use service_core::error::AppError;

use crate::{
    middleware::{claims, AuthUser},
    models::{PermissionNode, UserPermissions},
    permissions::{codec, PermissionError},
    AppState,
};

fn parse(body: &Value) -> Result<PermissionNode, AppError> {
    codec::parse(body).map_err(|e| PermissionError::from(e).into())
}

/// `GET /permissions`
pub async fn list_permissions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<PermissionNode>>, AppError> {
    user.require(claims::PERMISSIONS_MANAGE)?;
    Ok(Json(state.permissions.list().await?))
}

/// `POST /permissions`
pub async fn create_permission(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<PermissionNode>), AppError> {
    user.require(claims::PERMISSIONS_MANAGE)?;
    let node = parse(&body)?;
    let created = state.permissions.create(node, user.username()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /permissions/:id`
pub async fn get_permission(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PermissionNode>, AppError> {
    user.require(claims::PERMISSIONS_MANAGE)?;
    Ok(Json(state.permissions.get(id).await?))
}

/// `PUT /permissions/:id`
pub async fn update_permission(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Json<PermissionNode>, AppError> {
    user.require(claims::PERMISSIONS_MANAGE)?;
    let node = parse(&body)?;
    Ok(Json(
        state.permissions.update(id, node, user.username()).await?,
    ))
}

/// `DELETE /permissions/:id`
pub async fn delete_permission(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require(claims::PERMISSIONS_MANAGE)?;
    state.permissions.delete(id, user.username()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /users/:user_id/permissions`: union the listed permissions into the user's roots.
pub async fn assign_user_permissions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Json<UserPermissions>, AppError> {
    user.require(claims::PERMISSIONS_MANAGE)?;
    let roots = codec::parse_list(&body).map_err(PermissionError::from)?;
    Ok(Json(
        state
            .permissions
            .assign_to_user(user_id, roots, user.username())
            .await?,
    ))
}

/// `GET /users/:user_id/permissions`
pub async fn get_user_permissions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<UserPermissions>, AppError> {
    user.require(claims::PERMISSIONS_MANAGE)?;
    Ok(Json(state.permissions.user_permissions(user_id).await?))
}
