use super::extract::{self, ExtractError};
use super::prompt::{self, LoginEvent, Prompt};
use super::transport::{Expectation, Session, Spawner, TransportError};
use crate::config::{CliCredentials, CliItem};
use crate::devlog::DeviceLog;
use crate::worker::RunLimit;
use std::time::Duration;

/// Message logged for an item when the session is gone
pub const CONNECTION_DEAD: &str = "CLI connection dead.";

/// Authentication failures tolerated before the worker gives up
const AUTH_FAILURE_BUDGET: u32 = 3;
/// Consecutive extraction errors per item before the session is torn down
const ERRORS_PER_ITEM: usize = 3;
/// Role selected at the `Accessrole` prompt
const ACCESS_ROLE: &str = "1";

/// Every delay and read timeout of the automaton
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliTiming {
    /// Pause before respawning a session that failed to connect
    pub spawn_backoff: Duration,
    /// Pause after a rejected login
    pub auth_backoff: Duration,
    /// Pause between login probes
    pub pacing: Duration,
    /// Wait for the transport's `Connected` banner
    pub connect: Duration,
    /// Read after the banner; a timeout here means the line stayed up
    pub settle: Duration,
    pub first_probe: Duration,
    pub reprobe: Duration,
    pub command: Duration,
    pub pager: Duration,
    /// Non-blocking read used to discard stale output
    pub drain: Duration,
}

impl Default for CliTiming {
    fn default() -> Self {
        Self {
            spawn_backoff: Duration::from_secs(10),
            auth_backoff: Duration::from_secs(10),
            pacing: Duration::from_secs(1),
            connect: Duration::from_secs(10),
            settle: Duration::from_secs(2),
            first_probe: Duration::from_secs(5),
            reprobe: Duration::from_secs(2),
            command: Duration::from_secs(3),
            pager: Duration::from_secs(5),
            drain: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Enable prompt reached
    Privileged,
    /// There was no session to log in on
    NotConnected,
    /// Timeout or EOF during login; the session was closed
    ConnectionDead,
    /// The device rejected the credentials too many times
    AuthExhausted,
    /// A stop request or the run deadline interrupted the sequence
    Interrupted,
}

#[derive(Debug)]
enum QueryFailure {
    Dead,
    Extract(ExtractError),
}

impl From<TransportError> for QueryFailure {
    fn from(_: TransportError) -> Self {
        QueryFailure::Dead
    }
}

impl From<ExtractError> for QueryFailure {
    fn from(e: ExtractError) -> Self {
        QueryFailure::Extract(e)
    }
}

/// Drives one device console: connect, log in to enable mode, read items.
///
/// Holds at most one live session. Any timeout or EOF drops it and the next
/// call to [`CliAutomaton::ensure_session`] starts over with a fresh spawn.
pub struct CliAutomaton {
    target: String,
    credentials: CliCredentials,
    items: Vec<CliItem>,
    spawner: Box<dyn Spawner>,
    session: Option<Box<dyn Session>>,
    timing: CliTiming,
    error_counter: usize,
    /// A session was acquired at least once
    ever_connected: bool,
}

impl CliAutomaton {
    pub fn new(
        target: impl Into<String>,
        credentials: CliCredentials,
        items: Vec<CliItem>,
        spawner: Box<dyn Spawner>,
    ) -> Self {
        Self {
            target: target.into(),
            credentials,
            items,
            spawner,
            session: None,
            timing: CliTiming::default(),
            error_counter: 0,
            ever_connected: false,
        }
    }

    pub fn with_timing(mut self, timing: CliTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn items(&self) -> &[CliItem] {
        &self.items
    }

    /// Make sure a logged-in session exists, spawning and logging in if needed
    pub fn ensure_session(&mut self, log: &mut DeviceLog, limit: &RunLimit) -> LoginOutcome {
        if self.session.is_some() {
            return LoginOutcome::Privileged;
        }
        if self.ever_connected {
            log.event("ERROR", "run", "CLI connection dead. Trying to respawn it...");
        } else {
            log.event("INFO", "run", "Opening the first CLI connection to DUT");
        }
        if !self.acquire(log, limit) {
            return if limit.reached() {
                LoginOutcome::Interrupted
            } else {
                LoginOutcome::NotConnected
            };
        }
        self.login(log, limit)
    }

    /// Spawn sessions until one reports `Connected` and stays up.
    ///
    /// Returns false only when the run deadline passed or a stop was requested.
    pub fn acquire(&mut self, log: &mut DeviceLog, limit: &RunLimit) -> bool {
        log.event("INFO", "spawn", "Spawning new CLI connection to DUT");
        loop {
            if limit.expired() {
                log.event(
                    "WARNING",
                    "spawn",
                    "Time limit reached before spawning a connection",
                );
                return false;
            }
            if limit.stop_requested() {
                log.event(
                    "WARNING",
                    "spawn",
                    "Stop requested before spawning a connection",
                );
                return false;
            }

            match self.spawner.spawn(&self.target) {
                Ok(mut session) => {
                    let banner = session.expect(prompt::connected_patterns(), self.timing.connect);
                    let settled = match banner {
                        Expectation::Matched(_) => Some(session.expect(&[], self.timing.settle)),
                        _ => None,
                    };
                    if matches!(settled, Some(Expectation::Timeout)) {
                        log.event("INFO", "spawn", "CLI connection successful");
                        self.session = Some(session);
                        self.error_counter = 0;
                        self.ever_connected = true;
                        return true;
                    }
                    log.event(
                        "ERROR",
                        "spawn",
                        format!(
                            "Unable to open CLI connection (banner: {:?}, settle: {:?}). Retrying in {} seconds...",
                            banner,
                            settled,
                            self.timing.spawn_backoff.as_secs()
                        ),
                    );
                    session.close();
                }
                Err(e) => log.event(
                    "ERROR",
                    "spawn",
                    format!(
                        "{}. Retrying in {} seconds...",
                        e,
                        self.timing.spawn_backoff.as_secs()
                    ),
                ),
            }
            limit.sleep(self.timing.spawn_backoff);
        }
    }

    /// Walk the prompt classes until the enable prompt is reached
    pub fn login(&mut self, log: &mut DeviceLog, limit: &RunLimit) -> LoginOutcome {
        log.event("INFO", "login", "DUT login requested");
        let Some(mut session) = self.session.take() else {
            log.event(
                "ERROR",
                "login",
                "CLI connection unexistent. Logging in not possible.",
            );
            return LoginOutcome::NotConnected;
        };

        let outcome = self.login_sequence(session.as_mut(), log, limit);
        match outcome {
            LoginOutcome::Privileged | LoginOutcome::Interrupted => self.session = Some(session),
            _ => session.close(),
        }
        outcome
    }

    fn login_sequence(
        &self,
        session: &mut dyn Session,
        log: &mut DeviceLog,
        limit: &RunLimit,
    ) -> LoginOutcome {
        let patterns = prompt::login_patterns();
        if !clear_buffer(session, self.timing.drain) || session.send("\r").is_err() {
            log.event("ERROR", "login", CONNECTION_DEAD);
            return LoginOutcome::ConnectionDead;
        }
        let mut event = LoginEvent::from_expectation(session.expect(patterns, self.timing.first_probe));
        let mut failures = 0;

        loop {
            let sent = match event {
                LoginEvent::Prompt(Prompt::Privileged) => break,
                LoginEvent::Prompt(Prompt::Username) => {
                    session.send(&format!("{}\r", self.credentials.username))
                }
                LoginEvent::Prompt(Prompt::Password | Prompt::NewPassword | Prompt::ConfirmPassword) => {
                    session.send(&format!("{}\r", self.credentials.password.expose()))
                }
                LoginEvent::Prompt(Prompt::AccessRole) => session.send(&format!("{}\r", ACCESS_ROLE)),
                LoginEvent::Prompt(Prompt::Denied | Prompt::WrongCredentials) => {
                    failures += 1;
                    log.event(
                        "ERROR",
                        "login",
                        "Authentication failed using username and password",
                    );
                    if failures >= AUTH_FAILURE_BUDGET {
                        log.event(
                            "CRITICAL",
                            "login",
                            "Authentication to DUT failed. Stopping the worker...",
                        );
                        return LoginOutcome::AuthExhausted;
                    }
                    if !limit.sleep(self.timing.auth_backoff) {
                        return LoginOutcome::Interrupted;
                    }
                    session.send("\r").and_then(|_| session.send("\r"))
                }
                LoginEvent::Prompt(Prompt::PressEnter) => session.send("\r"),
                LoginEvent::Prompt(Prompt::PrePrivileged) => session.send("enable\r"),
                LoginEvent::Prompt(Prompt::ConfigSubmode) => ["exit\r", "exit\r", "exit\r", "enable\r"]
                    .iter()
                    .try_for_each(|line| session.send(line)),
                LoginEvent::Timeout | LoginEvent::Eof => {
                    log.event("ERROR", "login", CONNECTION_DEAD);
                    return LoginOutcome::ConnectionDead;
                }
            };
            if let Err(e) = sent {
                log.event("ERROR", "login", format!("{} {}", CONNECTION_DEAD, e));
                return LoginOutcome::ConnectionDead;
            }

            if !limit.sleep(self.timing.pacing) {
                return LoginOutcome::Interrupted;
            }
            event = LoginEvent::from_expectation(session.expect(patterns, self.timing.reprobe));
        }

        log.event("INFO", "login", "DUT login successful. Enable reached.");
        LoginOutcome::Privileged
    }

    /// Query every item once. Each item gets exactly one result line.
    pub fn query_all(&mut self, log: &mut DeviceLog) {
        let threshold = self.items.len() * ERRORS_PER_ITEM;
        for item in &self.items {
            let Some(mut session) = self.session.take() else {
                log.item_error(&item.label, CONNECTION_DEAD);
                continue;
            };

            match query_item(session.as_mut(), item, &self.timing) {
                Ok(value) => {
                    log.item_value(&item.label, &value);
                    self.error_counter = 0;
                    self.session = Some(session);
                }
                Err(QueryFailure::Dead) => {
                    log.item_error(&item.label, CONNECTION_DEAD);
                    session.close();
                }
                Err(QueryFailure::Extract(e)) => {
                    log.item_error(&item.label, &e);
                    self.error_counter += 1;
                    if self.error_counter >= threshold {
                        log.event(
                            "ERROR",
                            "query",
                            format!(
                                "{} consecutive read errors. Closing the CLI connection.",
                                self.error_counter
                            ),
                        );
                        self.error_counter = 0;
                        session.close();
                    } else {
                        self.session = Some(session);
                    }
                }
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

impl std::fmt::Debug for CliAutomaton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliAutomaton")
            .field("target", &self.target)
            .field("items", &self.items)
            .field("connected", &self.session.is_some())
            .field("timing", &self.timing)
            .finish()
    }
}

/// Discard stale output. False when the session turned out to be dead.
fn clear_buffer(session: &mut dyn Session, drain: Duration) -> bool {
    match session.expect(&[], drain) {
        Expectation::Eof => false,
        _ if session.before().is_empty() => true,
        _ => session.expect(prompt::any_line(), drain) != Expectation::Eof,
    }
}

fn query_item(
    session: &mut dyn Session,
    item: &CliItem,
    timing: &CliTiming,
) -> Result<String, QueryFailure> {
    session.send("\r")?;
    if !clear_buffer(session, timing.drain) {
        return Err(QueryFailure::Dead);
    }
    session.send(&format!("{}\r", item.command))?;

    let patterns = prompt::command_patterns();
    let mut output = String::new();
    let mut expectation = session.expect(patterns, timing.command);
    loop {
        match expectation {
            Expectation::Matched(prompt::PAGER) => {
                output.push_str(session.before());
                if session.before().contains(item.label.as_str()) {
                    session.send("q\r")?;
                    break;
                }
                session.send("\n\r")?;
            }
            Expectation::Matched(_) | Expectation::Timeout => {
                output.push_str(session.before());
                break;
            }
            Expectation::Eof => return Err(QueryFailure::Dead),
        }
        expectation = session.expect(patterns, timing.pager);
    }

    Ok(extract::dotted_value(&output, &item.label)?.to_string())
}
