//! Console polling over an interactive transport (telnet, ser2net, serial)

mod automaton;
pub mod extract;
pub mod prompt;
mod transport;

pub use automaton::{CliAutomaton, CliTiming, LoginOutcome, CONNECTION_DEAD};
pub use extract::{dotted_value, ExtractError};
pub use transport::{
    ExpectBuffer, Expectation, ProcessSession, ProcessSpawner, Session, Spawner, TransportError,
};
