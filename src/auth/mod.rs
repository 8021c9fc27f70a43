//! Session authentication
//!
//! The portal never answers an expired session with a clean status code; it
//! serves the login page (or a script that bounces to it) with HTTP 200.
//! Failure detection is therefore heuristic: look for the login form's field
//! markers or the client-side redirect script in the body. Some terminal
//! redirects land on pages that coincidentally contain the marker tokens, so
//! detection is suppressed when the recorded redirect chain ended in
//! something other than a temporary redirect.

use crate::fetch::{FetchError, PortalClient, PortalRequest, PortalResponse};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Form field carrying the username on the login page
pub const USERNAME_FIELD: &str = "id_login";

/// Form field carrying the password on the login page
pub const PASSWORD_FIELD: &str = "id_senha";

/// Login form submission endpoint
pub const LOGIN_PATH: &str = "/eadv4/login.processa";

/// Script fragment the portal serves when bouncing an expired session back
/// to the login page
const LOGIN_REDIRECT_MARKER: &[u8] = b"eadv4/login/index.jsp";

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// The configured retry cap was exhausted without a successful login.
    #[error("login abandoned after {attempts} failed attempt(s)")]
    Abandoned { attempts: u32 },

    #[error("credentials file {path}: expected two lines (username, password)")]
    MalformedCredentialsFile { path: PathBuf },

    #[error("failed to read credentials: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// States of the login session machine.
///
/// `Authenticated` is terminal for the session; `Retrying` cycles back to
/// `AwaitingResponse` with freshly sourced credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    AwaitingResponse,
    Authenticated,
    Retrying,
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

/// A username/password pair bound for the login form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// The login form body. Built fresh per submission.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            (USERNAME_FIELD.to_string(), self.username.clone()),
            (PASSWORD_FIELD.to_string(), self.password.clone()),
        ]
    }
}

/// Where credentials come from when a login (re-)attempt needs them
#[derive(Debug, Clone)]
pub enum CredentialsSource {
    /// Two newline-terminated lines: username then password
    File(PathBuf),
    /// Prompt on stdin
    Interactive,
}

impl CredentialsSource {
    /// Reads a credential pair, falling back to `previous_username` when the
    /// source yields an empty username.
    pub fn read(&self, previous_username: Option<&str>) -> Result<Credentials, AuthError> {
        let (mut username, password) = match self {
            Self::File(path) => read_credentials_file(path)?,
            Self::Interactive => prompt_credentials(previous_username)?,
        };

        if username.is_empty() {
            if let Some(previous) = previous_username {
                username = previous.to_string();
            }
        }

        Ok(Credentials { username, password })
    }
}

fn read_credentials_file(path: &Path) -> Result<(String, String), AuthError> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.lines();
    let username = lines.next().map(str::trim).map(str::to_string);
    let password = lines.next().map(str::trim).map(str::to_string);
    match (username, password) {
        (Some(username), Some(password)) => Ok((username, password)),
        _ => Err(AuthError::MalformedCredentialsFile {
            path: path.to_path_buf(),
        }),
    }
}

fn prompt_credentials(previous_username: Option<&str>) -> Result<(String, String), AuthError> {
    let header = match previous_username {
        Some(previous) => format!("Username [{}]: ", previous),
        None => "Username: ".to_string(),
    };
    let username = prompt_line(&header)?;
    let password = prompt_line("Password: ")?;
    Ok((username, password))
}

fn prompt_line(header: &str) -> Result<String, AuthError> {
    print!("{}", header);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Heuristic: does this response indicate the session is not authenticated?
///
/// True when the body contains both login-form field markers, or the
/// client-side redirect script marker. Suppressed when the response carries a
/// redirect chain whose last hop was not a 302: those are cached/terminal
/// redirects whose landing page may contain the tokens without the session
/// having expired.
pub fn is_auth_failure(response: &PortalResponse) -> bool {
    if let Some(last_hop) = response.redirects.last() {
        if *last_hop != 302 {
            return false;
        }
    }

    let has_field_markers = response.body_contains(USERNAME_FIELD.as_bytes())
        && response.body_contains(PASSWORD_FIELD.as_bytes());
    has_field_markers || response.body_contains(LOGIN_REDIRECT_MARKER)
}

/// Drives the login retry loop until the session authenticates or the
/// attempt cap is exhausted.
pub struct AuthController {
    source: CredentialsSource,
    max_attempts: u32, // 0 = retry until the operator aborts
}

impl AuthController {
    pub fn new(source: CredentialsSource, max_attempts: u32) -> Self {
        Self {
            source,
            max_attempts,
        }
    }

    /// Submits the login form and inspects the response, re-sourcing
    /// credentials and retrying on failure.
    ///
    /// Returns the authenticated response; the caller forwards control into
    /// the next crawl phase.
    pub async fn login(&self, client: &PortalClient) -> Result<PortalResponse, AuthError> {
        let mut credentials = self.source.read(None)?;
        let mut attempts = 0u32;
        let mut state = LoginState::AwaitingResponse;

        loop {
            tracing::info!(username = %credentials.username, "login attempt");
            let request = PortalRequest::form(LOGIN_PATH, credentials.form_fields());
            let response = client.open(&request).await?;
            attempts += 1;

            if !is_auth_failure(&response) {
                advance(&mut state, LoginState::Authenticated);
                tracing::info!("logged in");
                return Ok(response);
            }

            advance(&mut state, LoginState::Retrying);
            tracing::info!("authentication failed");
            tracing::info!(username = %credentials.username, "last login with username");

            if self.max_attempts != 0 && attempts >= self.max_attempts {
                return Err(AuthError::Abandoned { attempts });
            }

            tracing::info!("retrying login...");
            credentials = self.source.read(Some(&credentials.username))?;
            advance(&mut state, LoginState::AwaitingResponse);
        }
    }
}

fn advance(state: &mut LoginState, next: LoginState) {
    tracing::debug!(from = ?state, to = ?next, "login state transition");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn response_with_body(body: &[u8]) -> PortalResponse {
        let url = Url::parse("https://portal.example/eadv4/home").unwrap();
        PortalResponse::synthetic(url, 200, body.to_vec())
    }

    #[test]
    fn test_failure_on_both_field_markers() {
        let response = response_with_body(b"<input name=id_login><input name=id_senha>");
        assert!(is_auth_failure(&response));
    }

    #[test]
    fn test_no_failure_on_single_marker() {
        let response = response_with_body(b"<input name=id_login> only");
        assert!(!is_auth_failure(&response));
    }

    #[test]
    fn test_failure_on_redirect_script_marker() {
        let response = response_with_body(b"<script>location='/eadv4/login/index.jsp'</script>");
        assert!(is_auth_failure(&response));
    }

    #[test]
    fn test_terminal_redirect_suppresses_failure() {
        // A cached page marked as already-final: marker tokens present, but
        // the redirect chain ended in something other than 302. Checked
        // twice; the suppression must hold on re-inspection.
        let mut response = response_with_body(b"id_login id_senha");
        response.redirects = vec![302, 301];
        assert!(!is_auth_failure(&response));
        assert!(!is_auth_failure(&response));
    }

    #[test]
    fn test_temporary_redirect_keeps_failure() {
        let mut response = response_with_body(b"id_login id_senha");
        response.redirects = vec![301, 302];
        assert!(is_auth_failure(&response));
    }

    #[test]
    fn test_clean_body_is_not_failure() {
        let response = response_with_body(b"<html>welcome back</html>");
        assert!(!is_auth_failure(&response));
    }

    #[test]
    fn test_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth");
        std::fs::write(&path, "someone\nhunter2\n").unwrap();

        let source = CredentialsSource::File(path);
        let credentials = source.read(None).unwrap();
        assert_eq!(credentials.username, "someone");
        assert_eq!(credentials.password, "hunter2");
    }

    #[test]
    fn test_credentials_file_missing_password_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth");
        std::fs::write(&path, "someone\n").unwrap();

        let source = CredentialsSource::File(path);
        assert!(matches!(
            source.read(None),
            Err(AuthError::MalformedCredentialsFile { .. })
        ));
    }

    #[test]
    fn test_empty_username_falls_back_to_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth");
        std::fs::write(&path, "\nnewpass\n").unwrap();

        let source = CredentialsSource::File(path);
        let credentials = source.read(Some("old_user")).unwrap();
        assert_eq!(credentials.username, "old_user");
        assert_eq!(credentials.password, "newpass");
    }

    #[test]
    fn test_login_state_terminality() {
        assert!(LoginState::Authenticated.is_terminal());
        assert!(!LoginState::AwaitingResponse.is_terminal());
        assert!(!LoginState::Retrying.is_terminal());
    }
}
