//! Module for working with snowflake IDs.
//!
//! A snowflake is a 64 bit integer laid out (most significant bit first) as a
//! 42 bit millisecond timestamp relative to an [`Epoch`], a 10 bit worker id
//! and a 12 bit sequence. Sorting snowflakes numerically sorts them by
//! creation time.
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_OFFSET: u32 = 22;
pub const TIMESTAMP_LENGTH: u32 = 42;

pub const WORKER_ID_OFFSET: u32 = 12;
pub const WORKER_ID_LENGTH: u32 = 10;

pub const SEQUENCE_LENGTH: u32 = 12;

const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_LENGTH) - 1;
const WORKER_ID_MASK: u64 = (1 << WORKER_ID_LENGTH) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_LENGTH) - 1;

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
    #[error("No snowflake greater than {0} can be represented.")]
    Exhausted(u64),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Worker id was out of range: {0}")]
pub struct WorkerIdOutOfRangeError(u16);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
pub struct WorkerId(u16);

impl WorkerId {
    #[must_use]
    pub fn new(id: u16) -> Option<Self> {
        (u64::from(id) <= WORKER_ID_MASK).then_some(Self(id))
    }

    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for WorkerId {
    type Error = WorkerIdOutOfRangeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(WorkerIdOutOfRangeError(value))
    }
}

impl<'de> Deserialize<'de> for WorkerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = u16::deserialize(deserializer)?;
        Self::new(inner)
            .ok_or_else(|| Error::invalid_value(Unexpected::Unsigned(inner.into()), &"WorkerId"))
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Milliseconds since the epoch encoded in this snowflake.
    #[must_use]
    pub fn timestamp_millis(self) -> u64 {
        (self.0 >> TIMESTAMP_OFFSET) & TIMESTAMP_MASK
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        #[allow(clippy::cast_possible_truncation)]
        let worker_id = ((self.0 >> WORKER_ID_OFFSET) & WORKER_ID_MASK) as u16;
        WorkerId(worker_id)
    }

    #[must_use]
    pub fn sequence(self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let sequence = (self.0 & SEQUENCE_MASK) as u16;
        sequence
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        #[allow(clippy::cast_possible_wrap)]
        let millis = self.timestamp_millis() as i64;
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(millis)
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

fn millis_since_epoch<SnowflakeEpoch: Epoch>(time: UtcDateTime) -> Result<u64, SnowflakeError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    if millis < 0 {
        return Err(SnowflakeError::TimeBeforeEpoch);
    }
    let millis = u64::try_from(millis).map_err(|_| SnowflakeError::TimestampTooLarge)?;
    if millis > TIMESTAMP_MASK {
        return Err(SnowflakeError::TimestampTooLarge);
    }

    Ok(millis)
}

/// Issues strictly increasing snowflakes.
///
/// When several ids are requested within the same millisecond, or the clock
/// steps backwards, the generator continues counting up from the last issued
/// value instead of reusing the timestamp. Callers may also pass a floor so
/// the new id sorts after ids issued by earlier processes.
#[derive_where(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    last: u64,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            last: 0,
            phantom_data: PhantomData,
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
        floor: u64,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeError>
    where
        SnowflakeEpoch: Epoch,
    {
        let millis = millis_since_epoch::<SnowflakeEpoch>(time)?;
        let candidate =
            millis << TIMESTAMP_OFFSET | u64::from(self.worker_id.get()) << WORKER_ID_OFFSET;

        let lower_bound = self.last.max(floor);
        let next = if candidate > lower_bound {
            candidate
        } else {
            lower_bound
                .checked_add(1)
                .ok_or(SnowflakeError::Exhausted(lower_bound))?
        };

        self.last = next;
        Ok(Snowflake::new(next))
    }

    pub fn generate(&mut self, floor: u64) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeError>
    where
        SnowflakeEpoch: Epoch,
    {
        self.generate_at(UtcDateTime::now(), floor)
    }
}
