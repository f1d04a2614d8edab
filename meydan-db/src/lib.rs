pub mod client;
mod document;
mod record;
pub mod session;
