//! Medical practice patient portal.
//!
//! Patients open their studies with a DNI and an access code, share them
//! through time-limited revocable links and download files through signed
//! URLs. Staff upload files, manage studies and review the audit trail.
//! All records live on a remote data platform reached through [`backend`].

pub mod audit;
pub mod backend;
pub mod config;
pub mod http;
pub mod imaging;
pub mod lifecycle;
pub mod observability;
pub mod portal;
pub mod security;
pub mod share_links;
pub mod staff;

pub use config::schema::PortalConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
