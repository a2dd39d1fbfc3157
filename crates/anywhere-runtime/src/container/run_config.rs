//! Composition of the full run configuration.

use std::collections::BTreeMap;
use std::path::Path;

use anywhere_core::command::{CommandError, CommandParser};
use anywhere_core::domain::{RunConfiguration, ServerConfig};

use super::layout::{env_layout, secret_mounts};
use super::naming::{ContainerNaming, LABEL_CONFIG_HASH, LABEL_MANAGED, LABEL_SERVER_ID, config_hash};

/// Derive the run configuration of `server`.
///
/// Fails only when the start command cannot be parsed, before anything
/// touches the container engine.
pub fn build_run_config(
    server: &ServerConfig,
    parser: &CommandParser,
    naming: &ContainerNaming,
    secrets_dir: &Path,
) -> Result<RunConfiguration, CommandError> {
    let argv = parser.parse(&server.start_command, server.runtime_kind)?;
    let transport = CommandParser::transport_of(&argv);
    let env = env_layout(server, &argv);
    let mounts = secret_mounts(server, secrets_dir);
    let image_tag = naming.image_tag(server);
    let container_name = naming.container_name(server);
    let hash = config_hash(&argv, &env, &image_tag, &mounts, transport);

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_SERVER_ID.to_string(), server.id.to_string());
    labels.insert(LABEL_MANAGED.to_string(), "true".to_string());
    labels.insert(LABEL_CONFIG_HASH.to_string(), hash.clone());

    Ok(RunConfiguration {
        argv,
        env,
        container_name,
        image_tag,
        transport,
        mounts,
        labels,
        config_hash: hash,
    })
}
