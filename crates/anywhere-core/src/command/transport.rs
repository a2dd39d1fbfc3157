//! Default-transport policy for start commands.
//!
//! Third-party packages are never touched: an injected argument would most
//! likely be rejected by their CLI. Only the gateway's own builtin command
//! gets `stdio` appended, and only when nothing in the tokens already names
//! a transport.

use crate::domain::{RuntimeKind, TransportMode};

/// Tokens that explicitly select a transport.
pub const TRANSPORT_KEYWORDS: &[&str] = &["http", "stdio", "--stdio", "--http"];

/// Token appended when the builtin command has no explicit transport.
pub const DEFAULT_TRANSPORT_TOKEN: &str = "stdio";

/// Subcommand that makes the builtin command run as a tool server.
const SERVE_SUBCOMMAND: &str = "serve";

const NPX_LAUNCHERS: &[&str] = &["npx", "bunx", "pnpm", "yarn", "npm", "dlx", "exec", "node"];
const UVX_LAUNCHERS: &[&str] = &[
    "uvx", "uv", "run", "tool", "pipx", "python", "python3",
];

const NPX_VALUE_FLAGS: &[&str] = &["-p", "--package", "--registry", "--cache", "--prefix"];
const UVX_VALUE_FLAGS: &[&str] = &[
    "--from",
    "--with",
    "--with-editable",
    "--with-requirements",
    "--python",
    "-p",
    "--index-url",
    "--extra-index-url",
    "--directory",
    "--project",
    "--spec",
];

fn launchers(kind: RuntimeKind) -> Vec<&'static str> {
    match kind {
        RuntimeKind::Npx => NPX_LAUNCHERS.to_vec(),
        RuntimeKind::Uvx => UVX_LAUNCHERS.to_vec(),
        // Images may wrap either ecosystem, or run the binary directly.
        RuntimeKind::Docker => NPX_LAUNCHERS.iter().chain(UVX_LAUNCHERS).copied().collect(),
    }
}

fn value_flags(kind: RuntimeKind) -> Vec<&'static str> {
    match kind {
        RuntimeKind::Npx => NPX_VALUE_FLAGS.to_vec(),
        RuntimeKind::Uvx => UVX_VALUE_FLAGS.to_vec(),
        RuntimeKind::Docker => NPX_VALUE_FLAGS.iter().chain(UVX_VALUE_FLAGS).copied().collect(),
    }
}

/// Transport explicitly named by `tokens`, if any.
///
/// Recognizes the bare keywords plus `--transport <mode>` and
/// `--transport=<mode>`.
pub fn declared_transport<S: AsRef<str>>(tokens: &[S]) -> Option<TransportMode> {
    let mut iter = tokens.iter().map(AsRef::as_ref);
    while let Some(token) = iter.next() {
        let mode = if TRANSPORT_KEYWORDS.iter().any(|k| *k == token) {
            Some(transport_from_value(token.trim_start_matches('-')))
        } else if token == "--transport" {
            iter.next().map(transport_from_value)
        } else {
            token
                .strip_prefix("--transport=")
                .map(transport_from_value)
        };
        if mode.is_some() {
            return mode;
        }
    }
    None
}

fn transport_from_value(value: &str) -> TransportMode {
    if value.eq_ignore_ascii_case("stdio") {
        TransportMode::Stdio
    } else {
        TransportMode::Http
    }
}

/// Index of the token naming the invoked package or program.
///
/// Launcher words and their flags are skipped. `None` when the command is
/// nothing but a launcher.
pub fn package_index<S: AsRef<str>>(tokens: &[S], kind: RuntimeKind) -> Option<usize> {
    let launchers = launchers(kind);
    let value_flags = value_flags(kind);

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_ref();
        if token.starts_with('-') {
            if value_flags.iter().any(|f| *f == token) {
                i += 1;
            }
        } else if !launchers.iter().any(|l| *l == program_name(token)) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Bare program name of a path-like token.
///
/// Scoped npm names (`@scope/pkg`) and URLs are not paths and come back
/// unchanged.
fn program_name(token: &str) -> &str {
    if token.starts_with('@') || token.contains("://") || !token.contains('/') {
        return token;
    }
    token
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(token)
}

/// Package identifier with any version pin or extras removed.
///
/// `@scope/pkg@1.2` becomes `@scope/pkg`, `pkg==0.3` and `pkg[cli]>=1`
/// become `pkg`.
pub fn strip_version(package: &str) -> &str {
    let package = program_name(package);
    let npm_end = package
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '@')
        .map_or(package.len(), |(i, _)| i);
    let py_end = package
        .find(['=', '<', '>', '~', '!', '['])
        .unwrap_or(package.len());
    &package[..npm_end.min(py_end)]
}

fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase().replace('_', "-")
}

/// Whether `tokens` run one of the `builtin` commands in server mode.
pub fn invokes_builtin_serve<S: AsRef<str>>(
    tokens: &[S],
    kind: RuntimeKind,
    builtin: &[String],
) -> bool {
    let Some(idx) = package_index(tokens, kind) else {
        return false;
    };
    let package = normalize_name(strip_version(tokens[idx].as_ref()));
    let is_builtin = builtin.iter().any(|b| normalize_name(b) == package);
    is_builtin
        && tokens[idx + 1..]
            .iter()
            .any(|t| t.as_ref() == SERVE_SUBCOMMAND)
}

/// Apply the default-transport policy in place.
///
/// Returns `true` when the default transport token was appended.
pub fn apply_default_transport(
    tokens: &mut Vec<String>,
    kind: RuntimeKind,
    builtin: &[String],
) -> bool {
    if declared_transport(tokens).is_some() || !invokes_builtin_serve(tokens, kind, builtin) {
        return false;
    }
    tokens.push(DEFAULT_TRANSPORT_TOKEN.to_string());
    true
}
