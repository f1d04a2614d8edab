pub mod auth;
pub mod content;
pub mod market;
pub mod ticket;
pub mod user;

use crate::{
    model::{
        auth::{InvalidAuthTokenHashError, InvalidPasswordDigestError},
        ticket::InconsistentTicketError,
        user::InvalidContactError,
    },
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
    util::NonPositiveDurationError,
};
use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Unexpected, Visitor},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Contact(#[from] InvalidContactError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    TokenHash(#[from] InvalidAuthTokenHashError),
    #[error(transparent)]
    PasswordDigest(#[from] InvalidPasswordDigestError),
    #[error(transparent)]
    Ticket(#[from] InconsistentTicketError),
    #[error("The field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("Unknown status '{0}'")]
    UnknownStatus(String),
    #[error("Unknown role '{0}'")]
    UnknownRole(String),
}

/// Outcome of applying a state transition.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Transition {
    Applied,
    /// The record was already in the target state and was left untouched.
    Unchanged,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct MeydanEpoch;
impl Epoch for MeydanEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type MeydanSnowflake = Snowflake<MeydanEpoch>;
pub type MeydanSnowflakeGenerator = SnowflakeGenerator<MeydanEpoch>;

/// Typed record id.
///
/// Serialized as a JSON number. Deserialization also accepts the decimal
/// string form so documents written by older clients still load.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Id<Marker>(MeydanSnowflake, PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: MeydanSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> MeydanSnowflake {
        self.0
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<MeydanSnowflake> for Id<Marker> {
    fn from(value: MeydanSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(MeydanSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.get()
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(u64::from_str(s.trim())?.into())
    }
}

impl<Marker> Serialize for Id<Marker> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.get())
    }
}

struct IdVisitor<Marker>(PhantomData<Marker>);

impl<Marker> Visitor<'_> for IdVisitor<Marker> {
    type Value = Id<Marker>;

    fn expecting(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a non-negative integer id or its decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v.into())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(Id::from)
            .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse()
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de, Marker> Deserialize<'de> for Id<Marker> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(IdVisitor(PhantomData))
    }
}
