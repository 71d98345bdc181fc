//! Prompt classes recognized on a device console

use super::transport::Expectation;
use regex::Regex;
use std::sync::OnceLock;

/// Login prompt classes, in classification order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Username,
    Password,
    NewPassword,
    ConfirmPassword,
    AccessRole,
    /// `(Interface ...)#`, `(Config)#`, `(Factory)#`
    ConfigSubmode,
    /// Enable mode, the target of the login sequence
    Privileged,
    Denied,
    WrongCredentials,
    PressEnter,
    /// `>` prompt before `enable`
    PrePrivileged,
}

const LOGIN_PROMPTS: [(Prompt, &str); 11] = [
    (Prompt::Username, r"[Uu]ser(name)*:"),
    (Prompt::Password, r"[Pp]assword:"),
    (Prompt::NewPassword, r"(Enter )*[Nn]ew [Pp]assword:"),
    (Prompt::ConfirmPassword, r"Confirm [Nn]ew [Pp]assword:|Retype:"),
    (Prompt::AccessRole, r"Accessrole"),
    (Prompt::ConfigSubmode, r".+\((Interface|Config|Factory).*\)#"),
    (Prompt::Privileged, r".+#$"),
    (Prompt::Denied, r"Access denied"),
    (Prompt::WrongCredentials, r"Wrong username or password"),
    (Prompt::PressEnter, r"Press ENTER to get started"),
    (Prompt::PrePrivileged, r".+>$"),
];

/// Index of the pager pattern in [`command_patterns`]
pub const PAGER: usize = 0;
/// Index of the end-of-command prompt in [`command_patterns`]
pub const END_OF_COMMAND: usize = 1;

/// What a login probe observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginEvent {
    Prompt(Prompt),
    Timeout,
    Eof,
}

impl LoginEvent {
    pub fn from_expectation(expectation: Expectation) -> Self {
        match expectation {
            Expectation::Matched(index) => LOGIN_PROMPTS
                .get(index)
                .map(|(prompt, _)| LoginEvent::Prompt(*prompt))
                .unwrap_or(LoginEvent::Timeout),
            Expectation::Timeout => LoginEvent::Timeout,
            Expectation::Eof => LoginEvent::Eof,
        }
    }
}

fn compile(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|s| Regex::new(s).expect("built-in prompt pattern is valid"))
        .collect()
}

pub fn login_patterns() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        let sources: Vec<&str> = LOGIN_PROMPTS.iter().map(|(_, s)| *s).collect();
        compile(&sources)
    })
}

/// Pager prompt, then end-of-command prompt
pub fn command_patterns() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| compile(&[r"--More-- or \(q\)uit", r"\S#$"]))
}

/// Banner printed by telnet/ser2net once the transport is up
pub fn connected_patterns() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| compile(&["Connected.*"]))
}

/// One line's worth of output
pub fn any_line() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| compile(&[".+"]))
}
