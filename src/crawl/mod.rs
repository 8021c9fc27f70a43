//! Crawl sequencing for the two-phase harvest
//!
//! This module drives phase ordering: the subject phase enumerates course
//! sessions from one fixed listing page and persists them; the book phase
//! consumes that queue one subject at a time, extracts the books listed
//! under each, downloads them through the gate, and journals the results.
//!
//! Book listing requests are deliberately not parallelized: the portal has
//! shown response corruption under concurrent session use, so at most one
//! listing request is in flight at any time. (Static file downloads do not
//! share that fragility, but they run one at a time as well for
//! determinism.)

mod extract;
mod phase;

pub use extract::{
    book_query, extract_books, extract_subjects, log_listing, subject_query, BOOK_LISTING_PATH,
    SUBJECT_LISTING_PATH,
};
pub use phase::{BookPhaseState, SubjectPhaseState};

use crate::auth::{self, AuthController, CredentialsSource};
use crate::config::Settings;
use crate::download::{DownloadError, DownloadGate, DownloadReport};
use crate::fetch::{PortalClient, PortalRequest, PortalResponse};
use crate::item::{Book, RawRecord, Subject};
use crate::store::SyncStore;
use crate::{BotError, Result};
use phase::advance;

/// Slot holding the pending subject queue
pub const SUBJECTS_SLOT: &str = "subjects";

/// Slot holding the completed-books journal
pub const BOOKS_SLOT: &str = "books";

/// Orchestrates one authenticated crawl session across the phases.
pub struct Sequencer {
    client: PortalClient,
    auth: AuthController,
    store: SyncStore,
    gate: DownloadGate,
}

impl Sequencer {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = PortalClient::new(settings.base_url.clone())?;
        let source = match &settings.auth_file {
            Some(path) => CredentialsSource::File(path.clone()),
            None => CredentialsSource::Interactive,
        };
        let auth = AuthController::new(source, settings.max_login_attempts);

        Ok(Self {
            client,
            auth,
            store: SyncStore::new(&settings.state_dir),
            gate: DownloadGate::new(&settings.destination),
        })
    }

    /// Authenticates the session up front. Phases also recover from
    /// mid-crawl expiry on their own; this surfaces bad credentials before
    /// any crawling starts.
    pub async fn login(&mut self) -> Result<()> {
        self.auth.login(&self.client).await?;
        Ok(())
    }

    /// Issues a request, re-authenticating and re-issuing whenever the
    /// response trips the session-failure heuristics.
    async fn open_authenticated(&mut self, request: &PortalRequest) -> Result<PortalResponse> {
        loop {
            let response = self.client.open(request).await?;
            if !auth::is_auth_failure(&response) {
                return Ok(response);
            }
            tracing::warn!(url = %response.url, "session expired, re-authenticating");
            self.auth.login(&self.client).await?;
        }
    }

    /// Subject phase: one listing request, extract, persist.
    ///
    /// Zero extracted subjects is a site-layout or parsing-break signal and
    /// fails the whole run.
    pub async fn run_subjects(&mut self) -> Result<()> {
        let mut state = SubjectPhaseState::Start;

        // Resume: keep subjects synced by earlier runs in the queue.
        let already_synced = self.store.load(SUBJECTS_SLOT)?.len();
        if already_synced > 0 {
            tracing::info!(already_synced, "subject queue resumed from slot");
        }

        let request = PortalRequest::get(SUBJECT_LISTING_PATH).with_query(subject_query());
        let response = self.open_authenticated(&request).await?;
        advance(&mut state, SubjectPhaseState::Fetched);

        let subjects = extract_subjects(&response.text())?;
        let labels: Vec<Option<&str>> = subjects.iter().map(|subject| subject.name()).collect();
        log_listing("subject", &labels);

        if subjects.is_empty() {
            return Err(BotError::EmptyResult {
                kind: "subject",
                url: response.url.to_string(),
            });
        }
        advance(&mut state, SubjectPhaseState::Extracted);

        for subject in &subjects {
            self.store.append(SUBJECTS_SLOT, subject.to_map());
        }
        self.store.flush(SUBJECTS_SLOT)?;
        advance(&mut state, SubjectPhaseState::Persisted);
        Ok(())
    }

    /// Book phase: drain the subject queue, one listing request at a time.
    ///
    /// A subject with zero book entries is recoverable: the diagnostic is
    /// logged and the phase moves on to the next queued subject. Both slots
    /// are rewritten when the queue is drained, so an interrupted run
    /// resumes from the remaining subjects.
    pub async fn run_books(&mut self) -> Result<DownloadReport> {
        let mut state = BookPhaseState::LoadQueue;
        let pending = self.store.load(SUBJECTS_SLOT)?.len();
        let journaled = self.store.load(BOOKS_SLOT)?.len();
        tracing::info!(pending, journaled, "book phase starting");

        let mut report = DownloadReport::default();

        loop {
            let Some(raw) = self.store.pop(SUBJECTS_SLOT) else {
                advance(&mut state, BookPhaseState::Idle);
                break;
            };
            let subject = Subject::from_map(&raw)?;
            let subject_name = subject.name().unwrap_or("<unnamed>").to_string();
            let class_id = subject.class_id().unwrap_or_default().to_string();
            tracing::debug!(subject = %subject_name, "reading subject");

            advance(&mut state, BookPhaseState::IssueRequest);
            let request = PortalRequest::get(BOOK_LISTING_PATH).with_query(book_query(&class_id));
            let response = self.open_authenticated(&request).await?;
            advance(&mut state, BookPhaseState::Fetched);

            let books = extract_books(&response.text(), &subject)?;
            let labels: Vec<Option<&str>> = books.iter().map(|book| book.name()).collect();
            log_listing("book", &labels);

            if books.is_empty() {
                let diagnostic = BotError::EmptyResult {
                    kind: "book",
                    url: response.url.to_string(),
                };
                tracing::warn!(subject = %subject_name, error = %diagnostic, "skipping subject");
                advance(&mut state, BookPhaseState::LoadQueue);
                continue;
            }
            advance(&mut state, BookPhaseState::Extracted);

            for book in books {
                report.absorb(self.download_one(&book).await);
                self.store.append(BOOKS_SLOT, book.to_map());
            }
            advance(&mut state, BookPhaseState::LoadQueue);
        }

        self.store.flush(SUBJECTS_SLOT)?;
        self.store.flush(BOOKS_SLOT)?;
        tracing::info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed,
            "book phase finished"
        );
        Ok(report)
    }

    /// Replays the completed-books journal through the download gate
    /// without re-crawling the listings.
    pub async fn run_download(&mut self) -> Result<DownloadReport> {
        let records: Vec<RawRecord> = self.store.load(BOOKS_SLOT)?.to_vec();
        tracing::info!(books = records.len(), "download pass starting");

        let mut report = DownloadReport::default();
        for raw in &records {
            let book = Book::from_map(raw)?;
            report.absorb(self.download_one(&book).await);
        }

        tracing::info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed,
            "download pass finished"
        );
        Ok(report)
    }

    /// Gates and executes one book download. Failures are absorbed into the
    /// report; a single bad file never aborts the phase.
    async fn download_one(&mut self, book: &Book) -> DownloadReport {
        let mut report = DownloadReport::default();
        let label = book.name().unwrap_or("<unnamed>").to_string();

        if !self.gate.should_fetch(book) {
            tracing::info!(book = %label, "skipping book");
            report.skipped += 1;
            return report;
        }

        tracing::debug!(book = %label, "downloading book");
        match self.fetch_and_commit(book).await {
            Ok(true) => {
                tracing::info!(book = %label, "book downloaded");
                report.downloaded += 1;
            }
            Ok(false) => {
                // destination turned out to exist once headers named the file
                tracing::info!(book = %label, "skipping book");
                report.skipped += 1;
            }
            Err(err) => {
                tracing::error!(book = %label, error = %err, "book download failed");
                report.failed += 1;
            }
        }
        report
    }

    /// Fetches the payload and writes it. Returns false when the resolved
    /// destination already exists.
    async fn fetch_and_commit(&mut self, book: &Book) -> Result<bool> {
        let Some(url) = book.download_url() else {
            return Ok(false);
        };
        if book.filename().is_none() {
            tracing::warn!(
                url,
                "no filename found on URL, maybe it uses another strategy? downloading anyway"
            );
        }

        let request = PortalRequest::get(url);
        let response = self.client.open(&request).await?;

        let resolved = self
            .gate
            .resolve_filename(response.header("content-disposition"), book.filename())?;
        let Some(filename) = resolved else {
            return Err(BotError::Download(DownloadError::MissingFilename {
                book: book.name().unwrap_or("<unnamed>").to_string(),
            }));
        };

        let path = self.gate.book_path(book, &filename);
        if path.exists() {
            return Ok(false);
        }
        self.gate.commit(&path, &response.body)?;
        Ok(true)
    }
}
