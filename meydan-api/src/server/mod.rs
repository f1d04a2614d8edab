use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use extract::Json;
use meydan_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenDecodeError, AuthTokenHashError, PasswordHashError},
        content::{ContentKind, ContentMarker},
        market::ListingMarker,
        ticket::TicketMarker,
        user::InvalidContactError,
    },
    policy::DenyReason,
};
use meydan_db::{
    client::{DbClient, DbError},
    session::SessionStore,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::error;

mod auth;
mod extract;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub sessions: Arc<SessionStore>,
}

impl ServerState {
    #[must_use]
    pub fn new(db_client: DbClient, sessions: SessionStore) -> Self {
        Self {
            db_client: Arc::new(db_client),
            sessions: Arc::new(sessions),
        }
    }
}

pub fn routes() -> ServerRouter {
    routes::routes()
}

/// The complete application: every route under `/api`, request tracing and
/// a JSON 404 for everything else.
pub fn app(state: ServerState) -> Router {
    Router::new()
        .nest("/api", routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error("Provided token was invalid or has expired")]
    InvalidToken,
    #[error("This action requires a bearer token")]
    MissingToken,
    #[error("Access denied: {0:?}")]
    Denied(DenyReason),
    #[error("Invalid request: {0}")]
    Validation(#[from] ModelValidationError),
    #[error("Invalid request: {0}")]
    InvalidContact(#[from] InvalidContactError),
    #[error("Invalid request: {0}")]
    InvalidBody(&'static str),
    #[error("Contact or password is incorrect")]
    InvalidCredentials,
    #[error("The old password is incorrect")]
    WrongPassword,
    #[error("The password could not be hashed: {0}")]
    PasswordHash(#[from] PasswordHashError),
    #[error("Collection {0:?} is not available")]
    CollectionNotAvailable(String),
    #[error("Collection {0:?} cannot hold content")]
    InvalidCollection(String),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("No {0} item with id {1} exists.")]
    ContentNotFound(ContentKind, Id<ContentMarker>),
    #[error("Listing with id {0} was not found.")]
    ListingNotFound(Id<ListingMarker>),
    #[error("Ticket with id {0} was not found.")]
    TicketNotFound(Id<TicketMarker>),
    #[error("The account was not found.")]
    AccountNotFound,
}

impl From<DenyReason> for ServerError {
    fn from(value: DenyReason) -> Self {
        ServerError::Denied(value)
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::ContentNotFound(..)
            | ServerError::ListingNotFound(_)
            | ServerError::TicketNotFound(_)
            | ServerError::AccountNotFound => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_)
            | ServerError::InvalidToken
            | ServerError::MissingToken
            | ServerError::InvalidCredentials
            | ServerError::Denied(DenyReason::Unauthenticated) => StatusCode::UNAUTHORIZED,
            ServerError::Denied(DenyReason::Forbidden) | ServerError::CollectionNotAvailable(_) => {
                StatusCode::FORBIDDEN
            }
            ServerError::JsonRejection(_)
            | ServerError::QueryRejection(_)
            | ServerError::Validation(_)
            | ServerError::InvalidContact(_)
            | ServerError::InvalidBody(_)
            | ServerError::WrongPassword
            | ServerError::InvalidCollection(_)
            | ServerError::Database(DbError::ContactTaken(_)) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::PasswordHash(_)
            | ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let message = if status.is_server_error() {
            "Internal server error".to_owned()
        } else {
            self.to_string()
        };
        let error_response = ErrorResponse {
            status: status.as_u16(),
            message,
        };
        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::ServerError;
    use axum::http::StatusCode;
    use meydan_common::{
        model::user::Contact,
        policy::DenyReason,
    };
    use meydan_db::client::DbError;

    #[test]
    fn deny_reasons_keep_distinct_statuses() {
        assert_eq!(
            ServerError::from(DenyReason::Unauthenticated).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::from(DenyReason::Forbidden).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn taken_contacts_are_client_errors() {
        let contact = Contact::new("0532".to_owned()).unwrap();
        let error = ServerError::from(DbError::ContactTaken(contact));

        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_failures_are_server_errors() {
        let error = ServerError::from(DbError::Io(std::io::Error::other("disk full")));

        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
