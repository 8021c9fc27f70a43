//! Bookfetch: a course-material harvester for an authenticated portal
//!
//! This crate implements a two-phase crawl against a university e-learning
//! portal: enumerate course subjects, then enumerate and download the books
//! listed under each subject. Intermediate results are persisted to on-disk
//! slots so a long run can be interrupted and resumed without re-fetching.

pub mod auth;
pub mod config;
pub mod crawl;
pub mod download;
pub mod fetch;
pub mod item;
pub mod store;

use thiserror::Error;

/// Main error type for bookfetch operations
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Item error: {0}")]
    Item(#[from] item::ItemError),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Authentication error: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Download error: {0}")]
    Download(#[from] download::DownloadError),

    /// Extraction found nothing where something was expected. Fatal for the
    /// subject phase; absorbed per subject inside the book phase.
    #[error("No {kind} entries extracted from {url}")]
    EmptyResult { kind: &'static str, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bookfetch operations
pub type Result<T> = std::result::Result<T, BotError>;

// Re-export commonly used types
pub use config::Settings;
pub use crawl::{Sequencer, BOOKS_SLOT, SUBJECTS_SLOT};
pub use item::{Book, Subject};
