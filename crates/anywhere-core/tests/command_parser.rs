//! Behavioural tests for start-command normalization.

use anywhere_core::RuntimeKind;
use anywhere_core::command::{CommandError, CommandParser, join_tokens, parse};

const KINDS: [RuntimeKind; 3] = [RuntimeKind::Npx, RuntimeKind::Uvx, RuntimeKind::Docker];

const COMMANDS: &[&str] = &[
    "uv run mcp-anywhere serve",
    "uvx mcp-anywhere serve http",
    "uvx fastmcp serve --stdio",
    "npx @playwright/mcp@latest",
    "npx -y @modelcontextprotocol/server-filesystem '/data/my docs'",
    "uvx --from git+https://github.com/org/tool.git tool --token \"$TOKEN\"",
    "mcp-anywhere serve --port 9000",
    "python -m mcp_anywhere serve",
    "uvx mcp-anywhere==1.2 serve --transport streamable-http",
];

#[test]
fn parsing_is_idempotent_through_join() {
    for kind in KINDS {
        for cmd in COMMANDS {
            let once = parse(cmd, kind).unwrap();
            let twice = parse(&join_tokens(&once), kind).unwrap();
            assert_eq!(once, twice, "{cmd:?} with {kind}");
        }
    }
}

#[test]
fn at_most_one_transport_token_is_appended() {
    for kind in KINDS {
        for cmd in COMMANDS {
            let argv = parse(cmd, kind).unwrap();
            let stdio_count = argv.iter().filter(|t| *t == "stdio").count();
            assert!(stdio_count <= 1, "{cmd:?} produced {argv:?}");
        }
    }
}

#[test]
fn module_invocation_of_builtin_gets_default_transport() {
    assert_eq!(
        parse("python -m mcp_anywhere serve", RuntimeKind::Uvx).unwrap(),
        ["python", "-m", "mcp_anywhere", "serve", "stdio"]
    );
}

#[test]
fn relative_paths_to_builtin_get_default_transport() {
    for cmd in [
        ".venv/bin/mcp-anywhere serve",
        "bin/mcp-anywhere serve",
        "../tools/mcp-anywhere serve",
        "./.venv/bin/mcp-anywhere serve",
        "/opt/app/.venv/bin/mcp-anywhere serve",
    ] {
        let argv = parse(cmd, RuntimeKind::Uvx).unwrap();
        assert_eq!(argv.last().map(String::as_str), Some("stdio"), "{cmd:?}");
    }
}

#[test]
fn scoped_packages_and_urls_are_not_paths() {
    assert_eq!(
        parse("npx @scope/mcp-anywhere serve", RuntimeKind::Npx).unwrap(),
        ["npx", "@scope/mcp-anywhere", "serve"]
    );
    assert_eq!(
        parse("uvx git+https://example.com/mcp-anywhere serve", RuntimeKind::Uvx).unwrap(),
        ["uvx", "git+https://example.com/mcp-anywhere", "serve"]
    );
}

#[test]
fn pinned_builtin_is_still_recognized() {
    assert_eq!(
        parse("uvx mcp-anywhere==1.2 serve", RuntimeKind::Uvx).unwrap(),
        ["uvx", "mcp-anywhere==1.2", "serve", "stdio"]
    );
}

#[test]
fn quoted_arguments_survive() {
    assert_eq!(
        parse(
            "npx -y @modelcontextprotocol/server-filesystem '/data/my docs'",
            RuntimeKind::Npx
        )
        .unwrap(),
        [
            "npx",
            "-y",
            "@modelcontextprotocol/server-filesystem",
            "/data/my docs"
        ]
    );
}

#[test]
fn malformed_commands_fail() {
    let parser = CommandParser::default();
    assert!(matches!(
        parser.parse("uvx tool --name 'x", RuntimeKind::Uvx),
        Err(CommandError::UnbalancedQuote { .. })
    ));
    assert_eq!(
        parser.parse("", RuntimeKind::Docker),
        Err(CommandError::Empty)
    );
}
