pub mod allocator;
pub mod application;
pub mod dns;
pub mod error;
pub mod identity;
pub mod launcher;
pub mod manager;
pub mod manifest;
pub mod model;
pub mod port;
pub mod recovery;
pub mod routing;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, ErrorKind};
pub use manager::ApplicationManager;
