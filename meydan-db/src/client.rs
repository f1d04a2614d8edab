use crate::{
    document::{Document, id_floor},
    record::{ListingRecord, TicketRecord, UserRecord},
};
use meydan_common::{
    model::{
        Id, MeydanSnowflakeGenerator, ModelValidationError, Transition,
        auth::{PasswordDigest, PasswordHashError},
        content::{ContentItem, ContentKind, ContentMarker},
        market::{Listing, ListingMarker, NewListing},
        ticket::{NewTicket, Ticket, TicketMarker},
        user::{Contact, NewUser, Role, User},
    },
    snowflake::{SnowflakeError, WorkerId},
};
use serde_json::{Map, Value};
use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::{Mutex, RwLock},
    task::JoinError,
};
use tracing::{debug, info};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Accessing the database file failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("The database file could not be encoded or decoded: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not issue an id: {0}")]
    Snowflake(#[from] SnowflakeError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error("The contact {0} is already registered")]
    ContactTaken(Contact),
    #[error("The database writer task failed: {0}")]
    Writer(#[from] JoinError),
}

/// Handle to the JSON document that holds every collection.
///
/// Readers work on the last committed snapshot and never wait for disk.
/// Writers are serialized: each one copies the snapshot, applies its change,
/// persists the whole document and only then publishes the new snapshot. A
/// failed write leaves both the file and the snapshot as they were. Once
/// persisting has started it runs to completion even if the caller goes
/// away, so the file is never ahead of the snapshot.
pub struct DbClient {
    path: PathBuf,
    snapshot: Arc<RwLock<Arc<Document>>>,
    writer: Arc<Mutex<MeydanSnowflakeGenerator>>,
}

impl DbClient {
    /// Opens the document at `path`, creating a seeded one if it is missing
    /// and upgrading legacy records in place.
    pub async fn open(path: impl Into<PathBuf>, worker_id: WorkerId) -> Result<Self> {
        let path = path.into();

        let document = match fs::read(&path).await {
            Ok(bytes) => {
                let mut document: Document = serde_json::from_slice(&bytes)?;
                document.migrate()?;
                document.validate()?;

                let encoded = encode(&document)?;
                if encoded == bytes {
                    debug!(path = %path.display(), "Opened database");
                } else {
                    info!(path = %path.display(), "Rewriting upgraded database");
                    persist(&path, &encoded).await?;
                }

                document
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "Creating new database");
                let document = Document::seeded();
                persist(&path, &encode(&document)?).await?;
                document
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            snapshot: Arc::new(RwLock::new(Arc::new(document))),
            writer: Arc::new(Mutex::new(MeydanSnowflakeGenerator::new(worker_id))),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn snapshot(&self) -> Arc<Document> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Runs `mutate` against a private copy of the document, then persists
    /// and publishes the copy if `mutate` succeeded.
    async fn write<T>(
        &self,
        mutate: impl FnOnce(&mut Document, &mut MeydanSnowflakeGenerator) -> Result<T>,
    ) -> Result<T> {
        let mut generator = Arc::clone(&self.writer).lock_owned().await;
        let mut document = Document::clone(&*self.snapshot().await);

        let output = mutate(&mut document, &mut *generator)?;
        let bytes = encode(&document)?;

        // The writer lock moves into the task and is released only after
        // the new snapshot is visible.
        let path = self.path.clone();
        let snapshot = Arc::clone(&self.snapshot);
        tokio::spawn(async move {
            persist(&path, &bytes).await?;
            *snapshot.write().await = Arc::new(document);
            drop(generator);
            Ok::<_, DbError>(())
        })
        .await??;

        Ok(output)
    }

    pub async fn fetch_user_by_contact(&self, contact: &Contact) -> Result<Option<User>> {
        let snapshot = self.snapshot().await;

        let record = snapshot
            .users
            .iter()
            .find(|user| user.contact == contact.get())
            .cloned();

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn create_user(&self, user: NewUser) -> Result<User> {
        self.write(|document, generator| insert_user(document, generator, user))
            .await
    }

    /// Returns `false` if no user has this contact.
    pub async fn update_password(
        &self,
        contact: &Contact,
        password: PasswordDigest,
    ) -> Result<bool> {
        self.write(|document, _| {
            let Some(user) = document
                .users
                .iter_mut()
                .find(|user| user.contact == contact.get())
            else {
                return Ok(false);
            };

            user.password_hash = password.into_inner();
            Ok(true)
        })
        .await
    }

    /// Creates `admin` with the admin role unless an admin account already
    /// exists. Returns the new account if one was made.
    pub async fn ensure_admin(&self, admin: NewUser) -> Result<Option<User>> {
        let admin_role = Role::Admin.as_str();
        if self
            .snapshot()
            .await
            .users
            .iter()
            .any(|user| user.role == admin_role)
        {
            return Ok(None);
        }

        let admin = NewUser {
            role: Role::Admin,
            ..admin
        };
        self.write(|document, generator| {
            if document.users.iter().any(|user| user.role == admin_role) {
                return Ok(None);
            }
            insert_user(document, generator, admin).map(Some)
        })
        .await
    }

    pub async fn fetch_content(&self, kind: ContentKind) -> Vec<ContentItem> {
        self.snapshot().await.content(kind).clone()
    }

    /// Appends an item built from `fields`. Any client `id` is replaced.
    pub async fn create_content(
        &self,
        kind: ContentKind,
        fields: Map<String, Value>,
    ) -> Result<ContentItem> {
        self.write(|document, generator| {
            let items = document.content_mut(kind);
            let floor = id_floor(items.iter().map(|item| item.id.get()));
            let item = ContentItem::new(generator.generate(floor)?.into(), fields);

            items.push(item.clone());
            Ok(item)
        })
        .await
    }

    /// Returns `false` if there was no such item.
    pub async fn delete_content(&self, kind: ContentKind, id: Id<ContentMarker>) -> Result<bool> {
        self.write(|document, _| {
            let items = document.content_mut(kind);
            let position = items.iter().position(|item| item.id == id);

            Ok(position.map(|position| items.remove(position)).is_some())
        })
        .await
    }

    pub async fn fetch_announcements(&self) -> Vec<String> {
        self.snapshot().await.announcements.clone()
    }

    pub async fn replace_announcements(&self, announcements: Vec<String>) -> Result<Vec<String>> {
        self.write(|document, _| {
            document.announcements.clone_from(&announcements);
            Ok(announcements)
        })
        .await
    }

    /// Every listing in insertion order, regardless of status.
    pub async fn fetch_listings(&self) -> Result<Vec<Listing>> {
        let listings = self
            .snapshot()
            .await
            .market
            .iter()
            .cloned()
            .map(Listing::try_from)
            .collect::<Result<_, _>>()?;

        Ok(listings)
    }

    pub async fn fetch_listing(&self, id: Id<ListingMarker>) -> Result<Option<Listing>> {
        let snapshot = self.snapshot().await;

        let record = snapshot
            .market
            .iter()
            .find(|listing| listing.id == id)
            .cloned();

        let listing = record.map(Listing::try_from).transpose()?;
        Ok(listing)
    }

    pub async fn create_listing(
        &self,
        listing: NewListing,
        owner: Contact,
        role: Role,
    ) -> Result<Listing> {
        self.write(|document, generator| {
            let floor = id_floor(document.market.iter().map(|listing| listing.id.get()));
            let id = generator.generate(floor)?.into();
            let listing = Listing::submit(id, listing, owner, role);

            document.market.push(ListingRecord::from(listing.clone()));
            Ok(listing)
        })
        .await
    }

    /// Approves a listing. `None` if there is no such listing.
    pub async fn approve_listing(
        &self,
        id: Id<ListingMarker>,
    ) -> Result<Option<(Listing, Transition)>> {
        self.write(|document, _| {
            let Some(record) = document.market.iter_mut().find(|listing| listing.id == id) else {
                return Ok(None);
            };

            let mut listing = Listing::try_from(record.clone())?;
            let transition = listing.approve();
            *record = ListingRecord::from(listing.clone());

            Ok(Some((listing, transition)))
        })
        .await
    }

    /// Returns `false` if there was no such listing.
    pub async fn delete_listing(&self, id: Id<ListingMarker>) -> Result<bool> {
        self.write(|document, _| {
            let position = document.market.iter().position(|listing| listing.id == id);

            Ok(position
                .map(|position| document.market.remove(position))
                .is_some())
        })
        .await
    }

    pub async fn fetch_tickets(&self) -> Result<Vec<Ticket>> {
        let tickets = self
            .snapshot()
            .await
            .tickets
            .iter()
            .cloned()
            .map(Ticket::try_from)
            .collect::<Result<_, _>>()?;

        Ok(tickets)
    }

    /// Opens a ticket for `owner`. Without a name in the request the owner's
    /// registered name is used, or the contact if they have none.
    pub async fn create_ticket(&self, ticket: NewTicket, owner: Contact) -> Result<Ticket> {
        self.write(|document, generator| {
            let fallback_name = document
                .users
                .iter()
                .find(|user| user.contact == owner.get())
                .map(|user| user.name.clone())
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| owner.get().to_owned());

            let floor = id_floor(document.tickets.iter().map(|ticket| ticket.id.get()));
            let ticket = Ticket::open(
                generator.generate(floor)?.into(),
                ticket,
                owner,
                fallback_name,
                OffsetDateTime::now_utc(),
            );

            document.tickets.push(TicketRecord::from(ticket.clone()));
            Ok(ticket)
        })
        .await
    }

    /// Resolves a ticket. `None` if there is no such ticket.
    pub async fn respond_ticket(
        &self,
        id: Id<TicketMarker>,
        response: String,
    ) -> Result<Option<(Ticket, Transition)>> {
        self.write(|document, _| {
            let Some(record) = document.tickets.iter_mut().find(|ticket| ticket.id == id) else {
                return Ok(None);
            };

            let mut ticket = Ticket::try_from(record.clone())?;
            let transition = ticket.respond(response);
            *record = TicketRecord::from(ticket.clone());

            Ok(Some((ticket, transition)))
        })
        .await
    }
}

fn insert_user(
    document: &mut Document,
    generator: &mut MeydanSnowflakeGenerator,
    user: NewUser,
) -> Result<User> {
    if document
        .users
        .iter()
        .any(|record| record.contact == user.contact.get())
    {
        return Err(DbError::ContactTaken(user.contact));
    }

    let floor = id_floor(document.users.iter().map(|record| record.id.get()));
    let user = User {
        id: generator.generate(floor)?.into(),
        name: user.name,
        contact: user.contact,
        password: user.password,
        role: user.role,
        joined_at: OffsetDateTime::now_utc(),
    };

    document.users.push(UserRecord::from(user.clone()));
    Ok(user)
}

fn encode(document: &Document) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(document)?)
}

/// Replaces the file at `path` with `bytes` by writing a synced sibling file
/// and renaming it over the original.
async fn persist(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file_name = path.file_name().map_or_else(OsString::new, OsString::from);
    file_name.push(".tmp");
    let temporary = path.with_file_name(file_name);

    let mut file = File::create(&temporary).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temporary, path).await?;
    Ok(())
}
