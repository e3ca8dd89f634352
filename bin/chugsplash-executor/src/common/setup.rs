use std::path::Path;

use alloy_primitives::Address;
use chugsplash::{install_proxy, DeploymentConfig, LocalChain};
use tracing::debug;

use crate::Error;

/// Reads the deployment config at `path`.
pub async fn load_config(path: &Path) -> Result<DeploymentConfig, Error> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

/// The URI a config read from `path` is proposed with.
pub fn config_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Creates every proxy of `config` that has no code yet, administered by `manager`.
///
/// The proxies become part of the chain's genesis state.
pub fn install_missing_proxies(
    chain: &mut LocalChain,
    manager: Address,
    config: &DeploymentConfig,
) {
    for (name, contract) in &config.contracts {
        let Some(proxy) = contract.proxy else { continue };
        if contract.kind.is_proxy() && !chain.world().has_code(proxy) {
            debug!(
                target: "chugsplash_executor::setup",
                name,
                %proxy,
                kind = %contract.kind,
                "Installing proxy"
            );
            install_proxy(chain.world_mut(), proxy, contract.kind, manager);
        }
    }
    chain.world_mut().clear_journal();
}
