use crate::{
    model::{Id, ModelValidationError, Transition, user::Contact, user::Role},
    util::string_or_number,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

pub const DEFAULT_LISTING_IMAGE: &str = "images/default_market.jpg";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct ListingMarker;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Pending,
    Approved,
}

impl ListingStatus {
    /// Listings by admins skip moderation.
    #[must_use]
    pub fn initial_for(role: Role) -> Self {
        match role {
            Role::Admin => ListingStatus::Approved,
            Role::User => ListingStatus::Pending,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Pending => "pending",
            ListingStatus::Approved => "approved",
        }
    }
}

impl Display for ListingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = ModelValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ListingStatus::Pending),
            "approved" => Ok(ListingStatus::Approved),
            other => Err(ModelValidationError::UnknownStatus(other.to_owned())),
        }
    }
}

/// A classified ad.
///
/// `owner` is `None` only for listings that predate ownership tracking.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: Id<ListingMarker>,
    pub title: String,
    pub price: String,
    pub phone: String,
    pub desc: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Contact>,
    status: ListingStatus,
}

/// Listing fields a client may choose.
///
/// Anything else in the request body, such as `status`, `owner` or `role`,
/// is dropped during deserialization.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct NewListing {
    pub title: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl NewListing {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.title.trim().is_empty() {
            return Err(ModelValidationError::EmptyField("title"));
        }

        Ok(())
    }
}

impl Listing {
    #[must_use]
    pub fn submit(id: Id<ListingMarker>, listing: NewListing, owner: Contact, role: Role) -> Self {
        let image = listing
            .image
            .filter(|image| !image.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LISTING_IMAGE.to_owned());

        Self {
            id,
            title: listing.title,
            price: listing.price,
            phone: listing.phone,
            desc: listing.desc,
            image,
            owner: Some(owner),
            status: ListingStatus::initial_for(role),
        }
    }

    /// Reassembles a stored listing.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Id<ListingMarker>,
        title: String,
        price: String,
        phone: String,
        desc: String,
        image: String,
        owner: Option<Contact>,
        status: ListingStatus,
    ) -> Self {
        Self {
            id,
            title,
            price,
            phone,
            desc,
            image,
            owner,
            status,
        }
    }

    #[must_use]
    pub fn status(&self) -> ListingStatus {
        self.status
    }

    #[must_use]
    pub fn is_owned_by(&self, contact: &Contact) -> bool {
        self.owner.as_ref() == Some(contact)
    }

    /// Moves a pending listing to approved. There is no way back.
    pub fn approve(&mut self) -> Transition {
        match self.status {
            ListingStatus::Pending => {
                self.status = ListingStatus::Approved;
                Transition::Applied
            }
            ListingStatus::Approved => Transition::Unchanged,
        }
    }
}
