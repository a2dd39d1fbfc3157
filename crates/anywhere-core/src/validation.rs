//! Declarative validation of server registrations.
//!
//! Per-field constraints live in [`FIELD_RULES`]. Rules spanning several
//! fields are plain predicate functions in [`CROSS_FIELD_RULES`], evaluated
//! after every field passed its own checks. All issues are collected so the
//! operator sees everything wrong with a form at once.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::command::tokenize;
use crate::domain::{EnvVarDecl, NewServer, RuntimeKind, SecretFileMount, ServerConfig, is_git_url};

/// One problem with one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every issue found in a server registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid server configuration: {}", join_issues(.0))]
pub struct ValidationError(pub Vec<ValidationIssue>);

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|issue| issue.field == field)
    }
}

/// Borrowed view over the fields being validated.
///
/// Lets new registrations and edited records share one rule set.
#[derive(Debug, Clone, Copy)]
pub struct ServerDraft<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub runtime_kind: RuntimeKind,
    pub install_command: Option<&'a str>,
    pub start_command: &'a str,
    pub env_variables: &'a [EnvVarDecl],
    pub secret_files: &'a [SecretFileMount],
}

impl<'a> From<&'a NewServer> for ServerDraft<'a> {
    fn from(s: &'a NewServer) -> Self {
        Self {
            name: &s.name,
            source: &s.source,
            runtime_kind: s.runtime_kind,
            install_command: s.install_command.as_deref(),
            start_command: &s.start_command,
            env_variables: &s.env_variables,
            secret_files: &s.secret_files,
        }
    }
}

impl<'a> From<&'a ServerConfig> for ServerDraft<'a> {
    fn from(s: &'a ServerConfig) -> Self {
        Self {
            name: &s.name,
            source: &s.source,
            runtime_kind: s.runtime_kind,
            install_command: s.install_command.as_deref(),
            start_command: &s.start_command,
            env_variables: &s.env_variables,
            secret_files: &s.secret_files,
        }
    }
}

impl ServerDraft<'_> {
    fn install(&self) -> Option<&str> {
        self.install_command.map(str::trim).filter(|c| !c.is_empty())
    }
}

/// Constraints on one text field.
pub struct FieldRule {
    pub field: &'static str,
    pub required: bool,
    pub max_len: usize,
    /// Allowed characters, when restricted.
    pub charset: Option<(fn(char) -> bool, &'static str)>,
    pub get: for<'a> fn(&ServerDraft<'a>) -> Option<&'a str>,
}

fn name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
}

fn no_control(c: char) -> bool {
    !c.is_control()
}

fn no_whitespace(c: char) -> bool {
    !c.is_whitespace()
}

fn multiline_text(c: char) -> bool {
    c == '\n' || no_control(c)
}

fn get_name<'a>(d: &ServerDraft<'a>) -> Option<&'a str> {
    Some(d.name)
}

fn get_source<'a>(d: &ServerDraft<'a>) -> Option<&'a str> {
    Some(d.source)
}

fn get_install<'a>(d: &ServerDraft<'a>) -> Option<&'a str> {
    d.install_command
}

fn get_start<'a>(d: &ServerDraft<'a>) -> Option<&'a str> {
    Some(d.start_command)
}

pub static FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        field: "name",
        required: true,
        max_len: 64,
        charset: Some((name_char, "letters, digits, spaces, '-', '_' and '.'")),
        get: get_name,
    },
    FieldRule {
        field: "source",
        required: true,
        max_len: 512,
        charset: Some((no_whitespace, "no whitespace")),
        get: get_source,
    },
    FieldRule {
        field: "install_command",
        required: false,
        max_len: 2048,
        charset: Some((multiline_text, "no control characters")),
        get: get_install,
    },
    FieldRule {
        field: "start_command",
        required: true,
        max_len: 2048,
        charset: Some((no_control, "no control characters")),
        get: get_start,
    },
];

/// A rule over several fields. Returns the issues it found.
pub type CrossFieldRule = fn(&ServerDraft<'_>) -> Vec<ValidationIssue>;

pub static CROSS_FIELD_RULES: &[CrossFieldRule] = &[
    start_command_tokenizes,
    docker_has_no_install_step,
    git_source_needs_install_step,
    env_keys_are_identifiers,
    required_env_has_value,
    secret_mounts_are_consistent,
];

fn check_field(rule: &FieldRule, draft: &ServerDraft<'_>) -> Option<ValidationIssue> {
    let value = (rule.get)(draft).unwrap_or("");
    if value.trim().is_empty() {
        return rule
            .required
            .then(|| ValidationIssue::new(rule.field, "is required"));
    }
    if value.chars().count() > rule.max_len {
        return Some(ValidationIssue::new(
            rule.field,
            format!("must be at most {} characters", rule.max_len),
        ));
    }
    if let Some((allowed, description)) = rule.charset {
        if !value.chars().all(allowed) {
            return Some(ValidationIssue::new(
                rule.field,
                format!("may only contain {description}"),
            ));
        }
    }
    None
}

fn start_command_tokenizes(d: &ServerDraft<'_>) -> Vec<ValidationIssue> {
    match tokenize(d.start_command) {
        Ok(tokens) if tokens.iter().any(|t| !t.is_empty()) => Vec::new(),
        Ok(_) => vec![ValidationIssue::new("start_command", "is required")],
        Err(e) => vec![ValidationIssue::new("start_command", e.to_string())],
    }
}

fn docker_has_no_install_step(d: &ServerDraft<'_>) -> Vec<ValidationIssue> {
    if d.runtime_kind == RuntimeKind::Docker && d.install().is_some() {
        return vec![ValidationIssue::new(
            "install_command",
            "must be empty for prebuilt container images",
        )];
    }
    Vec::new()
}

fn git_source_needs_install_step(d: &ServerDraft<'_>) -> Vec<ValidationIssue> {
    if d.runtime_kind != RuntimeKind::Docker && is_git_url(d.source) && d.install().is_none() {
        return vec![ValidationIssue::new(
            "install_command",
            "is required when the source is a git repository",
        )];
    }
    Vec::new()
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn env_keys_are_identifiers(d: &ServerDraft<'_>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    for var in d.env_variables {
        if !is_env_key(&var.key) {
            issues.push(ValidationIssue::new(
                "env_variables",
                format!("invalid variable name {:?}", var.key),
            ));
        } else if !seen.insert(var.key.as_str()) {
            issues.push(ValidationIssue::new(
                "env_variables",
                format!("duplicate variable {}", var.key),
            ));
        }
    }
    issues
}

fn required_env_has_value(d: &ServerDraft<'_>) -> Vec<ValidationIssue> {
    d.env_variables
        .iter()
        .filter(|var| var.required && var.value.trim().is_empty())
        .map(|var| {
            ValidationIssue::new("env_variables", format!("{} requires a value", var.key))
        })
        .collect()
}

fn secret_mounts_are_consistent(d: &ServerDraft<'_>) -> Vec<ValidationIssue> {
    let declared: HashSet<&str> = d.env_variables.iter().map(|v| v.key.as_str()).collect();
    let mut names = HashSet::new();
    let mut issues = Vec::new();

    for mount in d.secret_files {
        if !is_env_key(&mount.env_var) {
            issues.push(ValidationIssue::new(
                "secret_files",
                format!("invalid variable name {:?}", mount.env_var),
            ));
        } else if declared.contains(mount.env_var.as_str()) {
            issues.push(ValidationIssue::new(
                "secret_files",
                format!("{} is also declared as an environment variable", mount.env_var),
            ));
        }
        if mount.file_name.is_empty()
            || mount.file_name.contains('/')
            || mount.file_name.starts_with('.')
        {
            issues.push(ValidationIssue::new(
                "secret_files",
                format!("invalid file name {:?}", mount.file_name),
            ));
        } else if !names.insert(mount.file_name.as_str()) {
            issues.push(ValidationIssue::new(
                "secret_files",
                format!("duplicate file name {}", mount.file_name),
            ));
        }
        if !Path::new(&mount.host_path).is_absolute() {
            issues.push(ValidationIssue::new(
                "secret_files",
                format!("host path must be absolute: {}", mount.host_path),
            ));
        }
    }
    issues
}

/// Validate a registration, returning every issue found.
///
/// Cross-field rules only run once every field passes its own rule, so a
/// missing start command is not also reported as untokenizable.
pub fn validate_server<'a>(draft: impl Into<ServerDraft<'a>>) -> Result<(), ValidationError> {
    let draft = draft.into();
    let mut issues: Vec<ValidationIssue> = FIELD_RULES
        .iter()
        .filter_map(|rule| check_field(rule, &draft))
        .collect();

    if issues.is_empty() {
        issues.extend(CROSS_FIELD_RULES.iter().flat_map(|rule| rule(&draft)));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError(issues))
    }
}
