use crate::server::{
    Result, ServerError, ServerRouter,
    auth::{Authenticated, RequestPrincipal},
    extract::Json,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use meydan_common::{
    model::{
        ModelValidationError,
        auth::PasswordDigest,
        user::{Contact, NewUser, Role, User},
    },
    policy::{Action, Principal, Resource, decide},
};
use meydan_db::{client::DbClient, session::SessionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(register)
        .typed_post(login)
        .typed_post(logout)
        .typed_post(change_password)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/register", rejection(ServerError))]
struct RegisterPath();

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct RegisterRequest {
    name: String,
    contact: String,
    password: String,
}

async fn register(
    RegisterPath(): RegisterPath,
    State(db): State<Arc<DbClient>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<User>> {
    for (field, value) in [
        ("name", &request.name),
        ("contact", &request.contact),
        ("password", &request.password),
    ] {
        if value.trim().is_empty() {
            return Err(ModelValidationError::EmptyField(field).into());
        }
    }

    let user = NewUser {
        name: request.name.trim().to_owned(),
        contact: Contact::new(request.contact)?,
        password: PasswordDigest::hash(&request.password)?,
        role: Role::User,
    };
    let user = db.create_user(user).await?;

    info!(user_id = %user.id, contact = %user.contact, "Registered user");
    Ok(Json(user))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/login", rejection(ServerError))]
struct LoginPath();

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct LoginRequest {
    contact: String,
    password: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    user: Contact,
    full_name: String,
    role: Role,
}

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    State(sessions): State<Arc<SessionStore>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let contact = Contact::new(request.contact).map_err(|_| ServerError::InvalidCredentials)?;

    let user = db
        .fetch_user_by_contact(&contact)
        .await?
        .filter(|user| user.password.verify(&request.password))
        .ok_or(ServerError::InvalidCredentials)?;

    let token = sessions.issue(&user).await?;

    info!(user_id = %user.id, role = %user.role, "Logged in");
    Ok(Json(LoginResponse {
        token: token.as_token_str(),
        user: user.contact,
        full_name: user.name,
        role: user.role,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/logout", rejection(ServerError))]
struct LogoutPath();

async fn logout(
    LogoutPath(): LogoutPath,
    State(sessions): State<Arc<SessionStore>>,
    authenticated: Authenticated,
) -> Result<StatusCode> {
    sessions.revoke(&authenticated.token).await?;

    info!(user_id = %authenticated.session.user_id, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/change-password", rejection(ServerError))]
struct ChangePasswordPath();

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
}

/// Admin credentials cannot be changed here, whatever the body says.
async fn change_password(
    ChangePasswordPath(): ChangePasswordPath,
    State(db): State<Arc<DbClient>>,
    RequestPrincipal(principal): RequestPrincipal,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    decide(&principal, Action::ChangePassword, Resource::Account).into_result()?;
    let Principal::User(contact) = principal else {
        return Err(ServerError::AccountNotFound);
    };

    if request.new_password.trim().is_empty() {
        return Err(ModelValidationError::EmptyField("newPassword").into());
    }

    let user = db
        .fetch_user_by_contact(&contact)
        .await?
        .ok_or(ServerError::AccountNotFound)?;
    if !user.password.verify(&request.old_password) {
        return Err(ServerError::WrongPassword);
    }

    let password = PasswordDigest::hash(&request.new_password)?;
    if !db.update_password(&contact, password).await? {
        return Err(ServerError::AccountNotFound);
    }

    info!(user_id = %user.id, "Changed password");
    Ok(StatusCode::NO_CONTENT)
}
