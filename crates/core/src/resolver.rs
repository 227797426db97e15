//! Get-or-create resolution of prerequisite resources
//!
//! A VM needs an image, a virtual network, and (through the network) an
//! affinity group. Each is resolved by the same cascade:
//!
//! 1. return the cached identity for the selector, if any;
//! 2. list existing resources through the CLI;
//! 3. take the first one matching the selector;
//! 4. otherwise create it (networks and affinity groups only);
//! 5. cache the identity under the selector.
//!
//! List and create failures are fatal to the scenario and are never retried.

use crate::cache::{CacheStats, ResourceCache};
use crate::command::{CommandLine, CommandResult};
use crate::config::ResourceNames;
use crate::descriptors::{AffinityGroupDescriptor, ImageDescriptor, VirtualNetworkDescriptor};
use crate::errors::{ResolveError, Result};
use crate::executor::CommandExecutor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Resolved affinity group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffinityGroup {
    pub name: String,
    pub location: String,
}

/// Resolved virtual network together with the affinity group it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualNetwork {
    pub name: String,
    pub affinity_group: String,
}

/// Per-run resolver owning the resource caches
pub struct ResourceResolver {
    executor: Arc<dyn CommandExecutor>,
    names: ResourceNames,
    images: ResourceCache<String>,
    networks: ResourceCache<VirtualNetwork>,
    affinity_groups: ResourceCache<AffinityGroup>,
}

/// Hit/miss counters of the three caches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub images: CacheStats,
    pub networks: CacheStats,
    pub affinity_groups: CacheStats,
}

impl ResourceResolver {
    /// Create a resolver with empty caches
    pub fn new(executor: Arc<dyn CommandExecutor>, names: ResourceNames) -> Self {
        Self {
            executor,
            names,
            images: ResourceCache::new("images"),
            networks: ResourceCache::new("networks"),
            affinity_groups: ResourceCache::new("affinity-groups"),
        }
    }

    /// Name of a public image for the operating system `category`
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_image(&mut self, category: &str) -> Result<String> {
        if let Some(name) = self.images.get(category) {
            debug!(image = %name, "Using cached image");
            return Ok(name);
        }

        let images: Vec<ImageDescriptor> = self.list(&["vm", "image", "list", "--json"]).await?;
        let image = images
            .into_iter()
            .find(|image| image.is_public_of_category(category))
            .ok_or_else(|| ResolveError::NoMatchingImage {
                category: category.to_string(),
            })?;

        debug!(image = %image.name, "Selected image");
        Ok(self.images.insert(category, image.name))
    }

    /// Affinity group located in `location`, created when none exists
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_affinity_group(&mut self, location: &str) -> Result<AffinityGroup> {
        if let Some(group) = self.affinity_groups.get(location) {
            debug!(affinity_group = %group.name, "Using cached affinity group");
            return Ok(group);
        }

        let groups: Vec<AffinityGroupDescriptor> = self
            .list(&["account", "affinity-group", "list", "--json"])
            .await?;

        let group = match groups.into_iter().find(|group| group.is_in(location)) {
            Some(existing) => {
                debug!(affinity_group = %existing.name, "Reusing existing affinity group");
                AffinityGroup {
                    name: existing.name,
                    location: existing.location,
                }
            }
            None => {
                let name = self.names.affinity_group.clone();
                info!(affinity_group = %name, location, "Creating affinity group");
                self.create(CommandLine::from_args([
                    "account",
                    "affinity-group",
                    "create",
                    "-l",
                    location,
                    "-e",
                    self.names.affinity_label.as_str(),
                    "-d",
                    self.names.affinity_description.as_str(),
                    name.as_str(),
                    "--json",
                ]))
                .await?;
                AffinityGroup {
                    name,
                    location: location.to_string(),
                }
            }
        };

        Ok(self.affinity_groups.insert(location, group))
    }

    /// Virtual network in state `status` that belongs to some affinity group
    ///
    /// Any network in the requested state is reusable whatever its affinity
    /// group; that group is passed along with it. When none exists, a network
    /// named `create_as` is created in the affinity group for `location`.
    /// The affinity group is resolved only on that path, never ahead of the
    /// network list; a reused network already names its group.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_virtual_network(
        &mut self,
        status: &str,
        location: &str,
        create_as: &str,
    ) -> Result<VirtualNetwork> {
        if let Some(network) = self.networks.get(status) {
            debug!(vnet = %network.name, "Using cached virtual network");
            return Ok(network);
        }

        let networks: Vec<VirtualNetworkDescriptor> =
            self.list(&["network", "vnet", "list", "--json"]).await?;

        let reusable = networks.into_iter().find_map(|network| {
            let affinity_group = network.affinity_group()?.to_string();
            network.is_reusable(status).then(|| VirtualNetwork {
                name: network.name,
                affinity_group,
            })
        });

        let network = match reusable {
            Some(existing) => {
                debug!(
                    vnet = %existing.name,
                    affinity_group = %existing.affinity_group,
                    "Reusing existing virtual network"
                );
                existing
            }
            None => {
                let group = self.resolve_affinity_group(location).await?;
                info!(vnet = create_as, affinity_group = %group.name, "Creating virtual network");
                self.create(CommandLine::from_args([
                    "network",
                    "vnet",
                    "create",
                    create_as,
                    "-a",
                    group.name.as_str(),
                    "--json",
                ]))
                .await?;
                VirtualNetwork {
                    name: create_as.to_string(),
                    affinity_group: group.name,
                }
            }
        };

        Ok(self.networks.insert(status, network))
    }

    /// Cache statistics for reporting
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            images: self.images.stats(),
            networks: self.networks.stats(),
            affinity_groups: self.affinity_groups.stats(),
        }
    }

    async fn list<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        let command = CommandLine::from_args(args.iter().copied());
        let result = self.executor.execute(&command).await?;
        if !result.success() {
            return Err(ResolveError::ListFailed {
                command: command.to_string(),
                exit_status: result.exit_status,
                text: result.text,
            }
            .into());
        }

        parse_list(&command, &result)
    }

    async fn create(&self, command: CommandLine) -> Result<()> {
        let result = self.executor.execute(&command).await?;
        if !result.success() {
            return Err(ResolveError::CreateFailed {
                command: command.to_string(),
                exit_status: result.exit_status,
                text: result.text,
            }
            .into());
        }
        Ok(())
    }
}

fn parse_list<T: DeserializeOwned>(
    command: &CommandLine,
    result: &CommandResult,
) -> Result<Vec<T>> {
    // Some CLI versions print nothing instead of [] for an empty list
    if result.text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&result.text).map_err(|source| {
        ResolveError::Parse {
            command: command.to_string(),
            source,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProvcheckError;
    use crate::executor::mock::ScriptedExecutor;

    const IMAGES: &str = r#"[
        {"name":"win2012","category":"Public","operatingSystemType":"Windows"},
        {"name":"private-ubuntu","category":"User","operatingSystemType":"Linux"},
        {"name":"ubuntu-14_04","category":"Public","oSDiskConfiguration":{"operatingSystem":"Linux"}},
        {"name":"centos","category":"Public","operatingSystemType":"Linux"}
    ]"#;

    fn resolver(executor: &Arc<ScriptedExecutor>) -> ResourceResolver {
        ResourceResolver::new(executor.clone(), ResourceNames::default())
    }

    #[tokio::test]
    async fn test_image_first_public_match_is_cached() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("vm image list --json", CommandResult::ok(IMAGES));
        let mut resolver = resolver(&executor);

        assert_eq!(resolver.resolve_image("Linux").await.unwrap(), "ubuntu-14_04");
        assert_eq!(resolver.resolve_image("linux").await.unwrap(), "ubuntu-14_04");
        assert_eq!(executor.invocation_count(), 1);
        assert_eq!(resolver.stats().images.hits, 1);
    }

    #[tokio::test]
    async fn test_image_without_match_is_an_error() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("vm image list --json", CommandResult::ok(IMAGES));
        let mut resolver = resolver(&executor);

        let err = resolver.resolve_image("FreeBSD").await.unwrap_err();
        assert!(matches!(
            err,
            ProvcheckError::Resolve(ResolveError::NoMatchingImage { .. })
        ));
    }

    #[tokio::test]
    async fn test_affinity_group_reused_by_location() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond(
            "account affinity-group list --json",
            CommandResult::ok(
                r#"[{"name":"east","location":"East US"},{"name":"west","location":"west us"}]"#,
            ),
        );
        let mut resolver = resolver(&executor);

        let group = resolver.resolve_affinity_group("West US").await.unwrap();
        assert_eq!(group.name, "west");
        let again = resolver.resolve_affinity_group("West US").await.unwrap();
        assert_eq!(again, group);

        assert_eq!(executor.invocation_count(), 1);
        assert_eq!(executor.count_calls("account affinity-group create"), 0);
    }

    #[tokio::test]
    async fn test_affinity_group_created_when_missing() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("account affinity-group list --json", CommandResult::ok("[]"));
        let mut resolver = resolver(&executor);

        let group = resolver.resolve_affinity_group("West US").await.unwrap();
        assert_eq!(group.name, "xplataffintest");
        assert_eq!(group.location, "West US");

        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].args(),
            &[
                "account",
                "affinity-group",
                "create",
                "-l",
                "West US",
                "-e",
                "xplatAffinGrp",
                "-d",
                "Test Affinty Group for xplat",
                "xplataffintest",
                "--json"
            ]
        );
    }

    #[tokio::test]
    async fn test_vnet_reused_without_creation() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond(
            "network vnet list --json",
            CommandResult::ok(r#"[{"name":"vnet1","state":"Created","affinityGroup":"ag1"}]"#),
        );
        let mut resolver = resolver(&executor);

        let network = resolver
            .resolve_virtual_network("Created", "West US", "newvnet")
            .await
            .unwrap();
        assert_eq!(
            network,
            VirtualNetwork {
                name: "vnet1".to_string(),
                affinity_group: "ag1".to_string(),
            }
        );
        assert_eq!(executor.count_calls("network vnet create"), 0);
        assert_eq!(executor.count_calls("account affinity-group"), 0);
    }

    #[tokio::test]
    async fn test_vnet_reuse_ignores_requested_location() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond(
            "network vnet list --json",
            CommandResult::ok(
                r#"[{"name":"orphan","state":"Created"},{"name":"far","state":"created","affinityGroup":"ag-east"}]"#,
            ),
        );
        let mut resolver = resolver(&executor);

        let network = resolver
            .resolve_virtual_network("Created", "West US", "newvnet")
            .await
            .unwrap();
        assert_eq!(network.name, "far");
        assert_eq!(network.affinity_group, "ag-east");
    }

    #[tokio::test]
    async fn test_vnet_created_in_resolved_affinity_group() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("network vnet list --json", CommandResult::ok("[]"));
        executor.respond(
            "account affinity-group list --json",
            CommandResult::ok(r#"[{"name":"ag1","location":"West US"}]"#),
        );
        let mut resolver = resolver(&executor);

        let network = resolver
            .resolve_virtual_network("Created", "West US", "xplattestvmVnet")
            .await
            .unwrap();
        assert_eq!(network.name, "xplattestvmVnet");
        assert_eq!(network.affinity_group, "ag1");
        assert_eq!(executor.count_calls("network vnet create"), 1);

        let cached = resolver
            .resolve_virtual_network("created", "West US", "other")
            .await
            .unwrap();
        assert_eq!(cached, network);
        assert_eq!(executor.invocation_count(), 3);
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("network vnet list --json", CommandResult::failed("forbidden"));
        let mut resolver = resolver(&executor);

        let err = resolver
            .resolve_virtual_network("Created", "West US", "v")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvcheckError::Resolve(ResolveError::ListFailed { exit_status: 1, .. })
        ));
        assert_eq!(executor.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_is_fatal_and_not_cached() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("account affinity-group list --json", CommandResult::ok("[]"));
        executor.respond(
            "account affinity-group create -l 'West US' -e xplatAffinGrp -d 'Test Affinty Group for xplat' xplataffintest --json",
            CommandResult::failed("quota"),
        );
        let mut resolver = resolver(&executor);

        let err = resolver.resolve_affinity_group("West US").await.unwrap_err();
        assert!(matches!(
            err,
            ProvcheckError::Resolve(ResolveError::CreateFailed { .. })
        ));
        assert_eq!(executor.count_calls("account affinity-group create"), 1);
        assert_eq!(resolver.stats().affinity_groups.entries, 0);
    }

    #[tokio::test]
    async fn test_unparseable_list_output() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("vm image list --json", CommandResult::ok("not json"));
        let mut resolver = resolver(&executor);

        let err = resolver.resolve_image("Linux").await.unwrap_err();
        assert!(matches!(err, ProvcheckError::Resolve(ResolveError::Parse { .. })));
    }
}
