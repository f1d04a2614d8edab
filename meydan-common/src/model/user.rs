use crate::model::{Id, ModelValidationError, auth::PasswordDigest};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;
use time::OffsetDateTime;

pub const CONTACT_MAX_LEN: usize = 100;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ModelValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(ModelValidationError::UnknownRole(other.to_owned())),
        }
    }
}

/// A registered account. The contact is the login key and is unique.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id<UserMarker>,
    pub name: String,
    pub contact: Contact,
    #[serde(skip_serializing)]
    pub password: PasswordDigest,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewUser {
    pub name: String,
    pub contact: Contact,
    pub password: PasswordDigest,
    pub role: Role,
}

/// Phone number or e-mail address a villager signs in with.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Contact(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The contact is invalid: {0:?}")]
pub struct InvalidContactError(String);

impl Contact {
    pub fn new(contact: String) -> Result<Self, InvalidContactError> {
        let trimmed = contact.trim();
        if trimmed.is_empty() || trimmed.chars().count() > CONTACT_MAX_LEN {
            return Err(InvalidContactError(contact));
        }

        if trimmed.len() == contact.len() {
            Ok(Contact(contact))
        } else {
            Ok(Contact(trimmed.to_owned()))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Contact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Contact {
    type Err = InvalidContactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

impl<'de> Deserialize<'de> for Contact {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Contact::new(inner).map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Contact"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::user::{CONTACT_MAX_LEN, Contact, Role};

    #[test]
    fn contact_is_trimmed() {
        let contact = Contact::new("  0532 000 00 00 ".to_owned()).unwrap();
        assert_eq!(contact.get(), "0532 000 00 00");
    }

    #[test]
    fn invalid_contacts() {
        assert!(Contact::new(String::new()).is_err());
        assert!(Contact::new("   ".to_owned()).is_err());
        assert!(Contact::new("x".repeat(CONTACT_MAX_LEN + 1)).is_err());
        assert!(Contact::new("ş".repeat(CONTACT_MAX_LEN)).is_ok());
    }

    #[test]
    fn roles_use_lowercase_names() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
    }
}
