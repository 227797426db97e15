//! Shared test helpers for core integration tests.
#![allow(dead_code)]

use provcheck_core::config::HarnessConfig;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const VM_NAME: &str = "xplattestvmVnet";
pub const IMAGE: &str = "b39f27a8b8c64d52b05eac6a62ebad85__Ubuntu-14_04-LTS-amd64-server";

/// One fixture entry: exact argument list, exit status and stdout
pub fn entry(args: &[&str], exit_status: i32, text: impl Into<String>) -> Value {
    json!({
        "args": args,
        "exitStatus": exit_status,
        "text": text.into(),
    })
}

/// Write a fixture file with the given entries and return its path
pub fn write_fixtures(dir: &Path, entries: Vec<Value>) -> PathBuf {
    let path = dir.join("fixtures.json");
    let file = json!({
        "recordedAt": "2014-06-18T21:17:03Z",
        "entries": entries,
    });
    std::fs::write(&path, serde_json::to_string_pretty(&file).unwrap()).unwrap();
    path
}

/// Replay configuration reading `fixtures` with a fixed location
pub fn replay_config(fixtures: PathBuf) -> HarnessConfig {
    HarnessConfig {
        fixtures_path: fixtures,
        location: Some("West US".to_string()),
        ..Default::default()
    }
}

pub fn image_list() -> Value {
    let images = json!([
        {
            "name": "a699494373c04fc0bc8f2bb1389d6106__Win2K8R2SP1-Datacenter",
            "category": "Public",
            "operatingSystemType": "Windows"
        },
        {
            "name": "private-ubuntu",
            "category": "User",
            "operatingSystemType": "Linux"
        },
        {
            "name": IMAGE,
            "category": "Public",
            "oSDiskConfiguration": { "operatingSystem": "Linux" }
        }
    ]);
    entry(&["vm", "image", "list", "--json"], 0, images.to_string())
}

pub fn vnet_list(networks: Value) -> Value {
    entry(&["network", "vnet", "list", "--json"], 0, networks.to_string())
}

pub fn vm_create(vnet: &str, affinity_group: &str, exit_status: i32, text: &str) -> Value {
    entry(
        &[
            "vm",
            "create",
            "-A",
            "Testset",
            "-n",
            VM_NAME,
            "-a",
            affinity_group,
            "-w",
            vnet,
            VM_NAME,
            IMAGE,
            "azureuser",
            "Pa$$word@123",
            "--json",
        ],
        exit_status,
        text,
    )
}

pub fn vm_delete(exit_status: i32) -> Value {
    entry(
        &["vm", "delete", VM_NAME, "-b", "-q", "--json"],
        exit_status,
        "",
    )
}

/// The two commands of the create-failure scenario, both failing as expected
pub fn create_failure_entries() -> Vec<Value> {
    vec![
        entry(
            &[
                "vm",
                "create",
                "-a",
                "some_name",
                "-w",
                "some_name",
                VM_NAME,
                IMAGE,
                "azureuser",
                "Pa$$word@123",
                "--json",
            ],
            1,
            "",
        ),
        entry(&["service", "show", VM_NAME, "--json"], 1, ""),
    ]
}
