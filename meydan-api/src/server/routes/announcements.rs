use crate::server::{Result, ServerError, ServerRouter, auth::RequestPrincipal, extract::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use meydan_common::{
    model::content::Collection,
    policy::{Action, Resource, decide},
};
use meydan_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_announcements)
        .typed_post(replace_announcements)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/announcements", rejection(ServerError))]
struct AnnouncementsPath();

async fn get_announcements(
    AnnouncementsPath(): AnnouncementsPath,
    State(db): State<Arc<DbClient>>,
) -> Json<Vec<String>> {
    Json(db.fetch_announcements().await)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct ReplaceAnnouncements {
    announcements: Vec<String>,
}

async fn replace_announcements(
    AnnouncementsPath(): AnnouncementsPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
    Json(request): Json<ReplaceAnnouncements>,
) -> Result<Json<Vec<String>>> {
    let resource = Resource::Collection(Collection::Announcements);
    decide(&principal, Action::Replace, resource).into_result()?;

    let announcements = db.replace_announcements(request.announcements).await?;

    info!(%principal, count = announcements.len(), "Replaced announcements");
    Ok(Json(announcements))
}
