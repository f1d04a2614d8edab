//! Access policy.
//!
//! Every request is resolved to a [`Principal`] first. Handlers then ask
//! [`decide`] whether that principal may perform an [`Action`] on a
//! [`Resource`] before touching the store. The decision is pure: no I/O and
//! no panics.
//!
//! | Principal   | Content, announcements | Market                                 | Tickets          |
//! |-------------|------------------------|----------------------------------------|------------------|
//! | `Anonymous` | read                   | read approved                          | none             |
//! | `User`      | read                   | read approved or own, create, delete own | create, read own |
//! | `Admin`     | read, write            | everything                             | everything       |

use crate::model::{
    content::Collection,
    market::{Listing, ListingStatus},
    user::{Contact, Role},
};
use std::fmt::{Display, Formatter};

/// Who is making a request.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub enum Principal {
    /// No credentials, or credentials that could not be verified on an
    /// endpoint where authentication is optional.
    #[default]
    Anonymous,
    User(Contact),
    Admin(Contact),
}

impl Principal {
    #[must_use]
    pub fn from_role(contact: Contact, role: Role) -> Self {
        match role {
            Role::User => Principal::User(contact),
            Role::Admin => Principal::Admin(contact),
        }
    }

    #[must_use]
    pub fn contact(&self) -> Option<&Contact> {
        match self {
            Principal::Anonymous => None,
            Principal::User(contact) | Principal::Admin(contact) => Some(contact),
        }
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        match self {
            Principal::Anonymous => None,
            Principal::User(_) => Some(Role::User),
            Principal::Admin(_) => Some(Role::Admin),
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin(_))
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::Anonymous => f.write_str("anonymous"),
            Principal::User(contact) => write!(f, "user {contact}"),
            Principal::Admin(contact) => write!(f, "admin {contact}"),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Action {
    Read,
    Create,
    /// Wholesale replacement, used for the announcement list.
    Replace,
    Delete,
    Approve,
    Respond,
    ChangePassword,
}

/// What an [`Action`] is aimed at.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Resource<'a> {
    /// A whole collection.
    Collection(Collection),
    /// One market listing, identified by its owner for the ownership rule.
    Listing { owner: Option<&'a Contact> },
    /// Every ticket regardless of owner.
    AllTickets,
    /// The tickets filed by one user.
    TicketsOf(&'a Contact),
    /// The caller's own credentials.
    Account,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum DenyReason {
    /// The action needs credentials the caller did not present.
    Unauthenticated,
    /// The caller is known but lacks the role or ownership.
    Forbidden,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

/// Allows admins only.
#[must_use]
pub fn admin_only(principal: &Principal) -> Decision {
    match principal {
        Principal::Admin(_) => Decision::Allow,
        Principal::User(_) => Decision::Deny(DenyReason::Forbidden),
        Principal::Anonymous => Decision::Deny(DenyReason::Unauthenticated),
    }
}

/// Allows any signed-in principal.
#[must_use]
pub fn authenticated(principal: &Principal) -> Decision {
    match principal {
        Principal::Admin(_) | Principal::User(_) => Decision::Allow,
        Principal::Anonymous => Decision::Deny(DenyReason::Unauthenticated),
    }
}

/// Allows admins and the given owner.
fn admin_or_owner(principal: &Principal, owner: Option<&Contact>) -> Decision {
    match principal {
        Principal::Admin(_) => Decision::Allow,
        Principal::User(contact) if Some(contact) == owner => Decision::Allow,
        Principal::User(_) => Decision::Deny(DenyReason::Forbidden),
        Principal::Anonymous => Decision::Deny(DenyReason::Unauthenticated),
    }
}

/// Decides whether `principal` may perform `action` on `resource`.
///
/// Only the four content kinds, the announcements and the market are
/// readable as whole collections. Any other pairing is forbidden, whoever
/// asks, so internal collections such as the user table never leak through
/// the generic endpoints.
#[must_use]
pub fn decide(principal: &Principal, action: Action, resource: Resource<'_>) -> Decision {
    match (action, resource) {
        (Action::Read, Resource::Collection(collection))
            if collection.content_kind().is_some()
                || matches!(collection, Collection::Announcements | Collection::Market) =>
        {
            Decision::Allow
        }
        (Action::Create | Action::Delete, Resource::Collection(collection))
            if collection.content_kind().is_some() =>
        {
            admin_only(principal)
        }
        (Action::Replace, Resource::Collection(Collection::Announcements))
        | (Action::Approve, Resource::Collection(Collection::Market))
        | (Action::Respond, Resource::Collection(Collection::Tickets))
        | (Action::Read, Resource::AllTickets) => admin_only(principal),
        (Action::Create, Resource::Collection(Collection::Market | Collection::Tickets)) => {
            authenticated(principal)
        }
        (Action::Delete, Resource::Listing { owner }) => admin_or_owner(principal, owner),
        (Action::Read, Resource::TicketsOf(user_id)) => admin_or_owner(principal, Some(user_id)),
        (Action::ChangePassword, Resource::Account) => match principal {
            Principal::User(_) => Decision::Allow,
            Principal::Admin(_) => Decision::Deny(DenyReason::Forbidden),
            Principal::Anonymous => Decision::Deny(DenyReason::Unauthenticated),
        },
        _ => Decision::Deny(DenyReason::Forbidden),
    }
}

/// Market read view: approved listings for everyone, plus a user's own
/// listings in any state, plus everything for admins.
#[must_use]
pub fn can_view_listing(principal: &Principal, listing: &Listing) -> bool {
    match principal {
        Principal::Admin(_) => true,
        Principal::User(contact) => {
            listing.status() == ListingStatus::Approved || listing.is_owned_by(contact)
        }
        Principal::Anonymous => listing.status() == ListingStatus::Approved,
    }
}
