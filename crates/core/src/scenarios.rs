//! VM provisioning scenarios
//!
//! Both scenarios exercise `vm create` on top of resolved prerequisites. The
//! first provisions a VM into an affinity group, virtual network and
//! availability set and leaves it for cleanup; the second checks that a failed
//! create leaves no cloud service behind.

use crate::command::{CommandLine, CommandResult};
use crate::errors::{Result, ScenarioError};
use crate::lifecycle::{Scenario, ScenarioContext};
use async_trait::async_trait;
use tracing::info;

/// Operating system category of the image used by every scenario
pub const IMAGE_CATEGORY: &str = "Linux";
/// Network state a reusable network must be in
pub const VNET_STATUS: &str = "Created";

/// VM with affinity group, virtual network and availability set
#[derive(Debug, Default)]
pub struct CreateVmWithAffinityVnet;

#[async_trait]
impl Scenario for CreateVmWithAffinityVnet {
    fn name(&self) -> &'static str {
        "create-vm-affinity-vnet-availset"
    }

    async fn run(&self, ctx: &mut ScenarioContext<'_>) -> Result<()> {
        let image = ctx.resolver.resolve_image(IMAGE_CATEGORY).await?;
        let network = ctx
            .resolver
            .resolve_virtual_network(VNET_STATUS, ctx.location, ctx.vm_name)
            .await?;

        let names = &ctx.config.names;
        let command = CommandLine::from_args([
            "vm",
            "create",
            "-A",
            names.availability_set.as_str(),
            "-n",
            ctx.vm_name,
            "-a",
            network.affinity_group.as_str(),
            "-w",
            network.name.as_str(),
            ctx.vm_name,
            image.as_str(),
            names.user_name.as_str(),
            names.password.as_str(),
            "--json",
        ]);

        let executor = ctx.executor;
        let outcome = ctx.retry.run(|| executor.execute(&command)).await?;
        if !outcome.result.success() {
            return Err(ScenarioError::Provisioning {
                command: redact(&command, &names.password),
                attempts: outcome.attempts,
                exit_status: outcome.result.exit_status,
                text: outcome.result.text,
            }
            .into());
        }

        info!(vm = ctx.vm_name, attempts = outcome.attempts, "VM created");
        ctx.vm.adopt(ctx.vm_name);
        Ok(())
    }
}

/// A create that fails must not leave its cloud service behind
#[derive(Debug, Default)]
pub struct CreateFailureRemovesCloudService;

#[async_trait]
impl Scenario for CreateFailureRemovesCloudService {
    fn name(&self) -> &'static str {
        "create-failure-removes-cloud-service"
    }

    async fn run(&self, ctx: &mut ScenarioContext<'_>) -> Result<()> {
        let image = ctx.resolver.resolve_image(IMAGE_CATEGORY).await?;
        let names = &ctx.config.names;

        let create = CommandLine::from_args([
            "vm",
            "create",
            "-a",
            "some_name",
            "-w",
            "some_name",
            ctx.vm_name,
            image.as_str(),
            names.user_name.as_str(),
            names.password.as_str(),
            "--json",
        ]);
        let result = ctx.executor.execute(&create).await?;
        expect_exit_status(&create, &result, 1, &names.password)?;

        let show = CommandLine::from_args(["service", "show", ctx.vm_name, "--json"]);
        let result = ctx.executor.execute(&show).await?;
        expect_exit_status(&show, &result, 1, &names.password)?;
        Ok(())
    }
}

/// Every scenario in execution order
pub fn all() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(CreateVmWithAffinityVnet),
        Box::new(CreateFailureRemovesCloudService),
    ]
}

/// Scenarios whose names are listed, in execution order
pub fn select(names: &[String]) -> Result<Vec<Box<dyn Scenario>>> {
    if names.is_empty() {
        return Ok(all());
    }

    if let Some(unknown) = names
        .iter()
        .find(|name| !all().iter().any(|s| s.name() == name.as_str()))
    {
        return Err(ScenarioError::Unknown {
            name: unknown.clone(),
        }
        .into());
    }

    Ok(all()
        .into_iter()
        .filter(|s| names.iter().any(|name| name == s.name()))
        .collect())
}

fn expect_exit_status(
    command: &CommandLine,
    result: &CommandResult,
    expected: i32,
    secret: &str,
) -> Result<()> {
    if result.exit_status == expected {
        return Ok(());
    }
    Err(ScenarioError::UnexpectedExitStatus {
        command: redact(command, secret),
        expected,
        actual: result.exit_status,
        text: result.text.clone(),
    }
    .into())
}

/// Render a command line for error messages with the password masked
fn redact(command: &CommandLine, secret: &str) -> String {
    let masked: Vec<&str> = command
        .args()
        .iter()
        .map(|arg| if arg == secret { "****" } else { arg.as_str() })
        .collect();
    shell_words::join(masked)
}
