//! CLI command implementations

pub mod provision;
pub mod resolve_url;
pub mod role_request;
