//! Start-command parsing.
//!
//! Turns the start command an operator typed into the argument vector a
//! container will execute. Parsing is pure: nothing is executed and no
//! variables are expanded.
//!
//! ```
//! use anywhere_core::command::CommandParser;
//! use anywhere_core::RuntimeKind;
//!
//! let parser = CommandParser::default();
//! let argv = parser.parse("uv run mcp-anywhere serve", RuntimeKind::Uvx).unwrap();
//! assert_eq!(argv, ["uv", "run", "mcp-anywhere", "serve", "stdio"]);
//! ```

mod tokenize;
mod transport;

use thiserror::Error;

use crate::domain::{RuntimeKind, TransportMode};

pub use tokenize::{join_tokens, quote, tokenize};
pub use transport::{
    DEFAULT_TRANSPORT_TOKEN, TRANSPORT_KEYWORDS, declared_transport, invokes_builtin_serve,
    package_index, strip_version,
};

/// Name under which the gateway itself can be launched as a tool server.
pub const BUILTIN_COMMAND: &str = "mcp-anywhere";

/// A start command that cannot be turned into an argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("start command is empty")]
    Empty,

    #[error("unbalanced {quote} quote starting at byte {position}")]
    UnbalancedQuote { quote: char, position: usize },

    #[error("start command ends with a dangling backslash")]
    DanglingEscape,
}

/// Parser configured with the names that identify the builtin command.
#[derive(Debug, Clone)]
pub struct CommandParser {
    builtin_commands: Vec<String>,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new(vec![BUILTIN_COMMAND.to_string()])
    }
}

impl CommandParser {
    pub const fn new(builtin_commands: Vec<String>) -> Self {
        Self { builtin_commands }
    }

    pub fn builtin_commands(&self) -> &[String] {
        &self.builtin_commands
    }

    /// Tokenize `start_command` and apply the default-transport policy.
    pub fn parse(
        &self,
        start_command: &str,
        runtime_kind: RuntimeKind,
    ) -> Result<Vec<String>, CommandError> {
        let mut tokens = tokenize(start_command)?;
        if tokens.is_empty() || tokens.iter().all(String::is_empty) {
            return Err(CommandError::Empty);
        }
        transport::apply_default_transport(&mut tokens, runtime_kind, &self.builtin_commands);
        Ok(tokens)
    }

    /// Transport the parsed command will use.
    ///
    /// Commands that declare nothing talk over stdio.
    pub fn transport_of<S: AsRef<str>>(argv: &[S]) -> TransportMode {
        declared_transport(argv).unwrap_or_default()
    }
}

/// Parse with the default builtin command name.
pub fn parse(start_command: &str, runtime_kind: RuntimeKind) -> Result<Vec<String>, CommandError> {
    CommandParser::default().parse(start_command, runtime_kind)
}
