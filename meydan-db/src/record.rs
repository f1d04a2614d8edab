use meydan_common::{
    model::{
        Id, ModelValidationError,
        auth::PasswordDigest,
        market::{Listing, ListingMarker, ListingStatus},
        ticket::{Ticket, TicketMarker, TicketStatus},
        user::{Contact, User, UserMarker},
    },
    util::string_or_number,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A user as stored. Old documents call the hash `password`.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserRecord {
    pub id: Id<UserMarker>,
    #[serde(default)]
    pub name: String,
    pub contact: String,
    #[serde(alias = "password")]
    pub password_hash: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// A listing as stored. Listings written before moderation existed have no
/// status and count as approved.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub(crate) struct ListingRecord {
    pub id: Id<ListingMarker>,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TicketRecord {
    pub id: Id<TicketMarker>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(with = "ticket_date")]
    pub date: OffsetDateTime,
    #[serde(default = "default_ticket_status")]
    pub status: String,
    #[serde(default)]
    pub admin_response: Option<String>,
}

/// Ticket dates are written as RFC 3339. Older documents hold a bare
/// `dd.mm.yyyy` day, which is read as midnight UTC.
mod ticket_date {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use time::{
        Date, OffsetDateTime, format_description::well_known::Rfc3339,
        macros::format_description,
    };

    pub fn serialize<S>(date: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        time::serde::rfc3339::serialize(date, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        if let Ok(date) = OffsetDateTime::parse(&text, &Rfc3339) {
            return Ok(date);
        }

        let day_format = format_description!("[day padding:none].[month padding:none].[year]");
        Date::parse(text.trim(), day_format)
            .map(|day| day.midnight().assume_utc())
            .map_err(|_| D::Error::custom(format!("invalid ticket date {text:?}")))
    }
}

fn default_role() -> String {
    "user".to_owned()
}

fn default_ticket_status() -> String {
    TicketStatus::Pending.as_str().to_owned()
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            name: value.name,
            contact: Contact::new(value.contact)?,
            password: PasswordDigest::from_phc(value.password_hash)?,
            role: value.role.parse()?,
            joined_at: value.joined_at,
        })
    }
}

impl From<User> for UserRecord {
    fn from(value: User) -> Self {
        Self {
            id: value.id,
            name: value.name,
            contact: value.contact.into_inner(),
            password_hash: value.password.into_inner(),
            role: value.role.as_str().to_owned(),
            joined_at: value.joined_at,
        }
    }
}

impl TryFrom<ListingRecord> for Listing {
    type Error = ModelValidationError;

    fn try_from(value: ListingRecord) -> Result<Self, Self::Error> {
        let status = match value.status {
            Some(status) => status.parse()?,
            None => ListingStatus::Approved,
        };

        Ok(Listing::from_parts(
            value.id,
            value.title,
            value.price,
            value.phone,
            value.desc,
            value.image,
            value.owner.map(Contact::new).transpose()?,
            status,
        ))
    }
}

impl From<Listing> for ListingRecord {
    fn from(value: Listing) -> Self {
        Self {
            status: Some(value.status().as_str().to_owned()),
            id: value.id,
            title: value.title,
            price: value.price,
            phone: value.phone,
            desc: value.desc,
            image: value.image,
            owner: value.owner.map(Contact::into_inner),
        }
    }
}

impl TryFrom<TicketRecord> for Ticket {
    type Error = ModelValidationError;

    fn try_from(value: TicketRecord) -> Result<Self, Self::Error> {
        Ok(Ticket::from_parts(
            value.id,
            value.kind,
            value.name,
            Contact::new(value.user_id)?,
            value.message,
            value.date,
            value.status.parse()?,
            value.admin_response,
        )?)
    }
}

impl From<Ticket> for TicketRecord {
    fn from(value: Ticket) -> Self {
        Self {
            id: value.id,
            status: value.status().as_str().to_owned(),
            admin_response: value.admin_response().map(str::to_owned),
            kind: value.kind,
            name: value.name,
            user_id: value.user_id.into_inner(),
            message: value.message,
            date: value.date,
        }
    }
}
