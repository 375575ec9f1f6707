// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared resource endpoints: CRUD and search.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::{
    auth::{roles::PERMISSION_UPLOAD, Auth, AuthenticatedUser},
    error::ApiError,
    models::{NewResource, Resource, ResourceQuery, ResourceUpdate, SearchQuery},
    state::AppState,
    store::InMemoryStore,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_resources).post(create_resource))
        .route("/search", get(search_resources))
        .route(
            "/{resource_id}",
            get(get_resource).put(update_resource).delete(delete_resource),
        )
}

/// Only the owner or an admin may change a resource.
fn ensure_can_modify(
    store: &InMemoryStore,
    caller: &AuthenticatedUser,
    resource_id: i64,
) -> Result<(), ApiError> {
    let resource = store.resource(resource_id)?;
    if resource.owner_id == caller.user_id || caller.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the owner can modify this resource"))
    }
}

pub async fn list_resources(
    Auth(_caller): Auth,
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
) -> Json<Vec<Resource>> {
    Json(state.store.read().await.list_resources(&query))
}

pub async fn search_resources(
    Auth(_caller): Auth,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<Resource>> {
    Json(state.store.read().await.search_resources(&query.q))
}

pub async fn get_resource(
    Auth(_caller): Auth,
    Path(resource_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Resource>, ApiError> {
    Ok(Json(state.store.read().await.resource(resource_id)?))
}

pub async fn create_resource(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<NewResource>,
) -> Result<(StatusCode, Json<Resource>), ApiError> {
    let mut store = state.store.write().await;

    // Checked against the current record, not the token's snapshot.
    let owner = store.user(caller.user_id)?;
    if !owner.permissions.contains(PERMISSION_UPLOAD) {
        return Err(ApiError::forbidden("Uploading resources is not permitted"));
    }

    let resource = store.create_resource(owner.id, request)?;
    tracing::info!(resource_id = resource.id, owner_id = owner.id, "Resource created");
    Ok((StatusCode::CREATED, Json(resource)))
}

pub async fn update_resource(
    Auth(caller): Auth,
    Path(resource_id): Path<i64>,
    State(state): State<AppState>,
    Json(update): Json<ResourceUpdate>,
) -> Result<Json<Resource>, ApiError> {
    let mut store = state.store.write().await;
    ensure_can_modify(&store, &caller, resource_id)?;
    Ok(Json(store.update_resource(resource_id, update)?))
}

pub async fn delete_resource(
    Auth(caller): Auth,
    Path(resource_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let mut store = state.store.write().await;
    ensure_can_modify(&store, &caller, resource_id)?;
    store.delete_resource(resource_id)?;
    tracing::info!(resource_id, user_id = caller.user_id, "Resource deleted");
    Ok(StatusCode::NO_CONTENT)
}
