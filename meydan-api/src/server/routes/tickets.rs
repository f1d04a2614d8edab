use crate::server::{
    Result, ServerError, ServerRouter, auth::RequestPrincipal, extract::{Json, Query},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use meydan_common::{
    model::{
        Id, ModelValidationError, Transition,
        content::Collection,
        ticket::{NewTicket, Ticket, TicketMarker},
        user::Contact,
    },
    policy::{Action, DenyReason, Principal, Resource, admin_only, authenticated, decide},
};
use meydan_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_tickets)
        .typed_post(create_ticket)
        .typed_put(respond_ticket)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/tickets", rejection(ServerError))]
struct TicketsPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/tickets/{id}/respond", rejection(ServerError))]
struct RespondTicketPath {
    id: Id<TicketMarker>,
}

/// Older clients also send `role`. It is ignored like any other unknown
/// parameter: the role always comes from the token.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketQuery {
    #[serde(default)]
    user_id: Option<String>,
}

/// Without a `userId` an admin sees every ticket and a user their own.
/// With one, only that user and admins may look.
async fn list_tickets(
    TicketsPath(): TicketsPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
    Query(query): Query<TicketQuery>,
) -> Result<Json<Vec<Ticket>>> {
    authenticated(&principal).into_result()?;

    let requested = match query.user_id.filter(|user_id| !user_id.trim().is_empty()) {
        None => None,
        Some(user_id) => match Contact::new(user_id) {
            Ok(contact) => Some(contact),
            // Nobody owns a malformed contact.
            Err(_) => {
                admin_only(&principal).into_result()?;
                return Ok(Json(Vec::new()));
            }
        },
    };

    let owner = match (requested, &principal) {
        (Some(owner), _) => Some(owner),
        (None, Principal::User(contact)) => Some(contact.clone()),
        (None, Principal::Admin(_) | Principal::Anonymous) => None,
    };

    let resource = match &owner {
        Some(owner) => Resource::TicketsOf(owner),
        None => Resource::AllTickets,
    };
    decide(&principal, Action::Read, resource).into_result()?;

    let tickets: Vec<_> = db
        .fetch_tickets()
        .await?
        .into_iter()
        .filter(|ticket| owner.as_ref().is_none_or(|owner| ticket.is_owned_by(owner)))
        .collect();

    debug!(%principal, count = tickets.len(), "Listing tickets");
    Ok(Json(tickets))
}

async fn create_ticket(
    TicketsPath(): TicketsPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
    Json(ticket): Json<NewTicket>,
) -> Result<Json<Ticket>> {
    let resource = Resource::Collection(Collection::Tickets);
    decide(&principal, Action::Create, resource).into_result()?;
    let Some(owner) = principal.contact() else {
        return Err(DenyReason::Unauthenticated.into());
    };

    ticket.validate()?;
    let ticket = db.create_ticket(ticket, owner.clone()).await?;

    info!(%principal, ticket_id = %ticket.id, kind = %ticket.kind, "Opened ticket");
    Ok(Json(ticket))
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct RespondRequest {
    response: String,
}

/// Resolves a ticket. A second response leaves the first one in place.
async fn respond_ticket(
    RespondTicketPath { id }: RespondTicketPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
    Json(request): Json<RespondRequest>,
) -> Result<Json<Ticket>> {
    let resource = Resource::Collection(Collection::Tickets);
    decide(&principal, Action::Respond, resource).into_result()?;

    if request.response.trim().is_empty() {
        return Err(ModelValidationError::EmptyField("response").into());
    }

    let (ticket, transition) = db
        .respond_ticket(id, request.response)
        .await?
        .ok_or(ServerError::TicketNotFound(id))?;

    match transition {
        Transition::Applied => info!(%principal, ticket_id = %id, "Resolved ticket"),
        Transition::Unchanged => debug!(ticket_id = %id, "Ticket was already resolved"),
    }
    Ok(Json(ticket))
}
