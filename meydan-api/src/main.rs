use meydan_api::{
    config::Config,
    server::{self, ServerState},
};
use meydan_common::model::{
    auth::{PasswordDigest, PasswordHashError},
    user::{Contact, InvalidContactError, NewUser, Role},
};
use meydan_db::{
    client::{DbClient, DbError},
    session::SessionStore,
};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error opening database: {0}")]
    Database(#[from] DbError),
    #[error("ADMIN_CONTACT is invalid: {0}")]
    AdminContact(#[from] InvalidContactError),
    #[error("Error hashing ADMIN_PASSWORD: {0}")]
    AdminPassword(#[from] PasswordHashError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "meydan_api=debug,\
                meydan_db=debug,\
                meydan_common=debug,\
                tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Config, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn bootstrap_admin(db: &DbClient, config: &Config) -> Result<(), InitError> {
    let Some(password) = &config.admin_password else {
        debug!("ADMIN_PASSWORD not set, skipping admin bootstrap");
        return Ok(());
    };

    let admin = NewUser {
        name: config.admin_name.clone(),
        contact: Contact::new(config.admin_contact.clone())?,
        password: PasswordDigest::hash(password)?,
        role: Role::Admin,
    };

    match db.ensure_admin(admin).await? {
        Some(admin) => info!(user_id = %admin.id, contact = %admin.contact, "Created admin account"),
        None => debug!("An admin account already exists"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        debug!(error = %err, "Could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let config = get_env()?;

    let db = DbClient::open(&config.database_path, config.worker_id).await?;
    bootstrap_admin(&db, &config).await?;
    let sessions = SessionStore::new(config.session_ttl());

    let app = server::app(ServerState::new(db, sessions));

    let server_address = SocketAddr::new(config.server_address, config.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
