use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use meydan_common::{model::auth::AuthToken, policy::Principal};
use meydan_db::session::{Session, SessionStore};
use std::sync::Arc;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// A caller holding a live bearer token.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Authenticated {
    pub token: AuthToken,
    pub session: Session,
}

/// The caller's principal on endpoints that need one to decide.
///
/// No `Authorization` header yields [`Principal::Anonymous`] and leaves the
/// verdict to the policy. A header that is present but does not verify is
/// rejected outright.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct RequestPrincipal(pub Principal);

/// The caller's principal on endpoints where authentication is optional.
/// Credentials that do not verify count as no credentials.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct OptionalPrincipal(pub Principal);

async fn authenticate<S>(parts: &mut Parts, state: &S) -> Result<Option<Authenticated>, ServerError>
where
    Arc<SessionStore>: FromRef<S>,
    S: Send + Sync,
{
    let header = match AuthorizationHeader::from_request_parts(parts, state).await {
        Ok(header) => header,
        Err(rejection) if rejection.is_missing() => return Ok(None),
        Err(rejection) => return Err(ServerError::InvalidAuthorizationHeader(rejection)),
    };

    let token: AuthToken = header.token().parse()?;

    let session = Arc::<SessionStore>::from_ref(state)
        .verify(&token)
        .await?
        .ok_or(ServerError::InvalidToken)?;

    Ok(Some(Authenticated { token, session }))
}

impl<S> FromRequestParts<S> for Authenticated
where
    Arc<SessionStore>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
            .await?
            .ok_or(ServerError::MissingToken)
    }
}

impl<S> FromRequestParts<S> for RequestPrincipal
where
    Arc<SessionStore>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = authenticate(parts, state)
            .await?
            .map_or(Principal::Anonymous, |authenticated| {
                authenticated.session.principal
            });

        Ok(Self(principal))
    }
}

impl<S> FromRequestParts<S> for OptionalPrincipal
where
    Arc<SessionStore>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state).await {
            Ok(authenticated) => Ok(Self(authenticated.map_or(
                Principal::Anonymous,
                |authenticated| authenticated.session.principal,
            ))),
            Err(err @ ServerError::AuthTokenHash(_)) => Err(err),
            Err(err) => {
                debug!(error = %err, "Treating caller as anonymous");
                Ok(Self(Principal::Anonymous))
            }
        }
    }
}
