pub mod model;
pub mod policy;
pub mod snowflake;
pub mod util;
