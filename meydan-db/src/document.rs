use crate::record::{ListingRecord, TicketRecord, UserRecord};
use meydan_common::model::{
    ModelValidationError,
    auth::{PasswordDigest, PasswordHashError},
    content::{ContentItem, ContentKind},
    market::{Listing, ListingStatus},
    ticket::Ticket,
    user::User,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

pub(crate) const DEFAULT_ANNOUNCEMENTS: [&str; 2] =
    ["Sitemize Hoş Geldiniz!", "Köy Pazarı açılmıştır."];

/// The whole database.
///
/// Missing collections read as empty. Top-level keys this version does not
/// know about are carried along in `extra` and written back untouched.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub(crate) struct Document {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub market: Vec<ListingRecord>,
    #[serde(default)]
    pub announcements: Vec<String>,
    #[serde(default)]
    pub genealogy: Vec<ContentItem>,
    #[serde(default)]
    pub gallery: Vec<ContentItem>,
    #[serde(default)]
    pub documents: Vec<ContentItem>,
    #[serde(default)]
    pub deceased: Vec<ContentItem>,
    #[serde(default)]
    pub tickets: Vec<TicketRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    pub fn seeded() -> Self {
        Self {
            announcements: DEFAULT_ANNOUNCEMENTS.map(str::to_owned).into(),
            ..Self::default()
        }
    }

    pub fn content(&self, kind: ContentKind) -> &Vec<ContentItem> {
        match kind {
            ContentKind::Genealogy => &self.genealogy,
            ContentKind::Gallery => &self.gallery,
            ContentKind::Documents => &self.documents,
            ContentKind::Deceased => &self.deceased,
        }
    }

    pub fn content_mut(&mut self, kind: ContentKind) -> &mut Vec<ContentItem> {
        match kind {
            ContentKind::Genealogy => &mut self.genealogy,
            ContentKind::Gallery => &mut self.gallery,
            ContentKind::Documents => &mut self.documents,
            ContentKind::Deceased => &mut self.deceased,
        }
    }

    /// Brings records written by older versions up to date.
    ///
    /// Listings without a status become approved and plaintext passwords are
    /// replaced by their hash.
    pub fn migrate(&mut self) -> Result<(), PasswordHashError> {
        for listing in &mut self.market {
            if listing.status.is_none() {
                info!(listing_id = %listing.id, "Marking legacy listing as approved");
                listing.status = Some(ListingStatus::Approved.as_str().to_owned());
            }
        }

        for user in &mut self.users {
            if !PasswordDigest::is_phc(&user.password_hash) {
                info!(user_id = %user.id, "Hashing legacy plaintext password");
                user.password_hash = PasswordDigest::hash(&user.password_hash)?.into_inner();
            }
        }

        Ok(())
    }

    /// Checks that every record converts into its model.
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        for user in &self.users {
            User::try_from(user.clone())?;
        }
        for listing in &self.market {
            Listing::try_from(listing.clone())?;
        }
        for ticket in &self.tickets {
            Ticket::try_from(ticket.clone())?;
        }

        Ok(())
    }
}

/// The largest id in `ids`, or zero.
pub(crate) fn id_floor(ids: impl IntoIterator<Item = u64>) -> u64 {
    ids.into_iter().max().unwrap_or(0)
}
