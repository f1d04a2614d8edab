use crate::server::{
    Result, ServerError, ServerRouter,
    auth::{OptionalPrincipal, RequestPrincipal},
    extract::Json,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use meydan_common::{
    model::{
        Id, Transition,
        content::Collection,
        market::{Listing, ListingMarker, NewListing},
    },
    policy::{Action, DenyReason, Principal, Resource, authenticated, can_view_listing, decide},
};
use meydan_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_listings)
        .typed_post(create_listing)
        .typed_post(approve_listing)
        .typed_delete(delete_listing_by_id)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/market", rejection(ServerError))]
struct MarketPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/market/approve/{id}", rejection(ServerError))]
struct ApproveListingPath {
    id: Id<ListingMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/market/{id}", rejection(ServerError))]
struct ListingPath {
    id: Id<ListingMarker>,
}

/// Lists what the caller may see. The filter runs on every request against
/// the current snapshot.
async fn list_listings(
    MarketPath(): MarketPath,
    State(db): State<Arc<DbClient>>,
    OptionalPrincipal(principal): OptionalPrincipal,
) -> Result<Json<Vec<Listing>>> {
    let resource = Resource::Collection(Collection::Market);
    decide(&principal, Action::Read, resource).into_result()?;

    let listings: Vec<_> = db
        .fetch_listings()
        .await?
        .into_iter()
        .filter(|listing| can_view_listing(&principal, listing))
        .collect();

    debug!(%principal, count = listings.len(), "Listing market");
    Ok(Json(listings))
}

/// Submits a listing owned by the caller. Status and owner always come from
/// the server.
async fn create_listing(
    MarketPath(): MarketPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
    Json(listing): Json<NewListing>,
) -> Result<Json<Listing>> {
    let resource = Resource::Collection(Collection::Market);
    decide(&principal, Action::Create, resource).into_result()?;
    let (Some(owner), Some(role)) = (principal.contact(), principal.role()) else {
        return Err(DenyReason::Unauthenticated.into());
    };

    listing.validate()?;
    let listing = db.create_listing(listing, owner.clone(), role).await?;

    info!(%principal, listing_id = %listing.id, status = %listing.status(), "Created listing");
    Ok(Json(listing))
}

async fn approve_listing(
    ApproveListingPath { id }: ApproveListingPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
) -> Result<Json<Listing>> {
    let resource = Resource::Collection(Collection::Market);
    decide(&principal, Action::Approve, resource).into_result()?;

    let (listing, transition) = db
        .approve_listing(id)
        .await?
        .ok_or(ServerError::ListingNotFound(id))?;

    match transition {
        Transition::Applied => info!(%principal, listing_id = %id, "Approved listing"),
        Transition::Unchanged => debug!(listing_id = %id, "Listing was already approved"),
    }
    Ok(Json(listing))
}

async fn delete_listing_by_id(
    ListingPath { id }: ListingPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
) -> Result<StatusCode> {
    delete_listing(&db, &principal, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Deletes a listing if `principal` is an admin or owns it.
pub(super) async fn delete_listing(
    db: &DbClient,
    principal: &Principal,
    id: Id<ListingMarker>,
) -> Result<()> {
    authenticated(principal).into_result()?;

    let listing = db
        .fetch_listing(id)
        .await?
        .ok_or(ServerError::ListingNotFound(id))?;
    let resource = Resource::Listing {
        owner: listing.owner.as_ref(),
    };
    decide(principal, Action::Delete, resource).into_result()?;

    if !db.delete_listing(id).await? {
        return Err(ServerError::ListingNotFound(id));
    }

    info!(%principal, listing_id = %id, "Deleted listing");
    Ok(())
}
