pub mod conversation;
pub mod identity;
pub mod registry;
pub mod selection;
pub mod session;
pub mod upload;
