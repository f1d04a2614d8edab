use crate::model::{Id, ModelValidationError, Transition, user::Contact};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct TicketMarker;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Pending,
    Resolved,
}

impl TicketStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Resolved => "resolved",
        }
    }
}

impl Display for TicketStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = ModelValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TicketStatus::Pending),
            "resolved" => Ok(TicketStatus::Resolved),
            other => Err(ModelValidationError::UnknownStatus(other.to_owned())),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("Ticket {id} is {status} but admin response presence is {has_response}")]
pub struct InconsistentTicketError {
    id: u64,
    status: TicketStatus,
    has_response: bool,
}

/// A support or fault request.
///
/// The admin response is present exactly when the ticket is resolved, which
/// is why the status and response are only reachable through accessors.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id<TicketMarker>,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub user_id: Contact,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    status: TicketStatus,
    admin_response: Option<String>,
}

/// Ticket fields a client may choose. The owner is always the caller.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct NewTicket {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    pub message: String,
}

impl NewTicket {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.kind.trim().is_empty() {
            return Err(ModelValidationError::EmptyField("type"));
        }
        if self.message.trim().is_empty() {
            return Err(ModelValidationError::EmptyField("message"));
        }

        Ok(())
    }
}

impl Ticket {
    /// Opens a pending ticket. `fallback_name` is used when the request did
    /// not carry a name.
    #[must_use]
    pub fn open(
        id: Id<TicketMarker>,
        ticket: NewTicket,
        owner: Contact,
        fallback_name: String,
        date: OffsetDateTime,
    ) -> Self {
        let name = ticket
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(fallback_name);

        Self {
            id,
            kind: ticket.kind,
            name,
            user_id: owner,
            message: ticket.message,
            date,
            status: TicketStatus::Pending,
            admin_response: None,
        }
    }

    /// Reassembles a ticket from stored parts, checking that the response
    /// matches the status.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Id<TicketMarker>,
        kind: String,
        name: String,
        user_id: Contact,
        message: String,
        date: OffsetDateTime,
        status: TicketStatus,
        admin_response: Option<String>,
    ) -> Result<Self, InconsistentTicketError> {
        let consistent = match status {
            TicketStatus::Pending => admin_response.is_none(),
            TicketStatus::Resolved => admin_response.is_some(),
        };
        if !consistent {
            return Err(InconsistentTicketError {
                id: id.get(),
                status,
                has_response: admin_response.is_some(),
            });
        }

        Ok(Self {
            id,
            kind,
            name,
            user_id,
            message,
            date,
            status,
            admin_response,
        })
    }

    #[must_use]
    pub fn status(&self) -> TicketStatus {
        self.status
    }

    #[must_use]
    pub fn admin_response(&self) -> Option<&str> {
        self.admin_response.as_deref()
    }

    #[must_use]
    pub fn is_owned_by(&self, contact: &Contact) -> bool {
        &self.user_id == contact
    }

    /// Resolves a pending ticket with the given response.
    ///
    /// Resolution happens once: responding to a resolved ticket keeps the
    /// first response.
    pub fn respond(&mut self, response: String) -> Transition {
        match self.status {
            TicketStatus::Pending => {
                self.status = TicketStatus::Resolved;
                self.admin_response = Some(response);
                Transition::Applied
            }
            TicketStatus::Resolved => Transition::Unchanged,
        }
    }
}
