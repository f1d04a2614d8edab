use crate::server::{
    Result, ServerError, ServerRouter,
    auth::{OptionalPrincipal, RequestPrincipal},
    extract::Json,
    routes::market,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use meydan_common::{
    model::{
        Id,
        content::{Collection, ContentItem, ContentKind},
    },
    policy::{Action, Resource, admin_only, decide},
};
use meydan_db::client::DbClient;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_content)
        .typed_post(create_content)
        .typed_delete(delete_content)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/content/{kind}", rejection(ServerError))]
struct ContentPath {
    kind: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/content/{kind}/{id}", rejection(ServerError))]
struct ContentItemPath {
    kind: String,
    id: u64,
}

fn content_kind(name: &str) -> Option<ContentKind> {
    name.parse::<Collection>()
        .ok()
        .and_then(Collection::content_kind)
}

/// Resolves a collection name for reading or deleting. Anything outside the
/// content kinds is refused as if it were forbidden.
fn available_content_kind(name: &str) -> Result<ContentKind> {
    content_kind(name).ok_or_else(|| ServerError::CollectionNotAvailable(name.to_owned()))
}

async fn list_content(
    ContentPath { kind }: ContentPath,
    State(db): State<Arc<DbClient>>,
    OptionalPrincipal(principal): OptionalPrincipal,
) -> Result<Json<Vec<ContentItem>>> {
    let kind = available_content_kind(&kind)?;
    decide(&principal, Action::Read, Resource::Collection(kind.into())).into_result()?;

    Ok(Json(db.fetch_content(kind).await))
}

async fn create_content(
    ContentPath { kind }: ContentPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
    Json(body): Json<Value>,
) -> Result<Json<ContentItem>> {
    admin_only(&principal).into_result()?;
    let kind = content_kind(&kind).ok_or(ServerError::InvalidCollection(kind))?;
    decide(&principal, Action::Create, Resource::Collection(kind.into())).into_result()?;

    let Value::Object(fields) = body else {
        return Err(ServerError::InvalidBody("a content item must be a JSON object"));
    };

    let item = db.create_content(kind, fields).await?;

    info!(%principal, %kind, item_id = %item.id, "Created content item");
    Ok(Json(item))
}

async fn delete_content(
    ContentItemPath { kind, id }: ContentItemPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
) -> Result<StatusCode> {
    if kind == Collection::Market.as_str() {
        market::delete_listing(&db, &principal, id.into()).await?;
        return Ok(StatusCode::NO_CONTENT);
    }

    let kind = available_content_kind(&kind)?;
    decide(&principal, Action::Delete, Resource::Collection(kind.into())).into_result()?;

    let id = Id::from(id);
    if !db.delete_content(kind, id).await? {
        return Err(ServerError::ContentNotFound(kind, id));
    }

    info!(%principal, %kind, item_id = %id, "Deleted content item");
    Ok(StatusCode::NO_CONTENT)
}
