//! Image preparation for tool servers.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anywhere_core::command::quote;
use anywhere_core::domain::{RuntimeKind, ServerConfig};
use anywhere_core::ports::ImageBuildSpec;

use super::naming::{LABEL_BUILD_HASH, LABEL_MANAGED, LABEL_SERVER_ID};

/// Directory a git source is cloned into.
pub const APP_DIR: &str = "/app";

/// How the image for a server comes to exist locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePlan {
    /// Build from a generated Dockerfile; skipped when an image with the
    /// same build hash already exists.
    Build {
        spec: ImageBuildSpec,
        build_hash: String,
    },
    /// Pull a prebuilt image when it is not present.
    Pull { reference: String },
}

/// Decide how to obtain `image_tag` for `server`.
pub fn image_plan(
    server: &ServerConfig,
    image_tag: &str,
    base_image: Option<&str>,
    build_hash: &str,
) -> ImagePlan {
    match (server.runtime_kind, base_image) {
        (RuntimeKind::Docker, _) | (_, None) => ImagePlan::Pull {
            reference: image_tag.to_string(),
        },
        (_, Some(base)) => {
            let mut labels = BTreeMap::new();
            labels.insert(LABEL_SERVER_ID.to_string(), server.id.to_string());
            labels.insert(LABEL_MANAGED.to_string(), "true".to_string());
            labels.insert(LABEL_BUILD_HASH.to_string(), build_hash.to_string());
            ImagePlan::Build {
                spec: ImageBuildSpec {
                    tag: image_tag.to_string(),
                    dockerfile: render_dockerfile(server, base),
                    labels,
                },
                build_hash: build_hash.to_string(),
            }
        }
    }
}

/// Dockerfile for a package-based server.
///
/// Git sources are cloned into `/app` and the install command runs there.
pub fn render_dockerfile(server: &ServerConfig, base_image: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "FROM {base_image}");

    if server.is_git_source() {
        out.push_str(
            "RUN apt-get update \\\n    && apt-get install -y --no-install-recommends git ca-certificates \\\n    && rm -rf /var/lib/apt/lists/*\n",
        );
        let _ = writeln!(
            out,
            "RUN git clone --depth 1 {} {APP_DIR}",
            quote(server.source.trim())
        );
    }

    let _ = writeln!(out, "WORKDIR {APP_DIR}");

    if let Some(install) = server.install_step() {
        // Continuation lines keep multi-line install scripts in one layer
        let joined = install
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" \\\n    && ");
        let _ = writeln!(out, "RUN {joined}");
    }

    out
}
