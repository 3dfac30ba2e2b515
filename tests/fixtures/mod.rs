// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-topology
//!
//! Builds a small but complete topology with fixed names so every test can
//! predict every id.
//!
//! ```text
//! prod                                        environment
//! └─ prod:aws:111111111111                    provider (key: aws)
//!    └─ ...:eu-1                              region
//!       ├─ ...:eu-1:eu-1a                     zone
//!       │  └─ ...:eu-1a:p1                    partition
//!       │     └─ ...:p1:t1                    deployment target (k8s)
//!       │        └─ ...:t1:f1                 fleet
//!       └─ ...:eu-1:vpc  10.0.0.0/16          network
//!
//! app1                                        application
//! ├─ app1:main                                repo (git, rust)
//! └─ app1:web                                 stack
//!    └─ app1:web:api                          service (rust)
//!       ├─ app1:web:api:worker                proc
//!       └─ app1:web:api:prod                  deployment -> f1, current v1
//!          ├─ app1:web:api:prod:v1            release
//!          │  └─ app1:web:api:prod:v1:base    config
//!          ├─ app1:web:api:prod:worker        deployment proc -> proc worker
//!          └─ app1:web:api:prod:memory:high   allocation (key: memory)
//! ```

#![allow(dead_code)]

use cim_topology::domain::{Cidr, EntityId, EntityPatch, EntityType, NewEntity};
use cim_topology::{RegistryConfig, TopologyRegistry};

pub const PROVIDER: &str = "prod:aws:111111111111";
pub const REGION: &str = "prod:aws:111111111111:eu-1";
pub const ZONE: &str = "prod:aws:111111111111:eu-1:eu-1a";
pub const NETWORK: &str = "prod:aws:111111111111:eu-1:vpc";
pub const FLEET: &str = "prod:aws:111111111111:eu-1:eu-1a:p1:t1:f1";
pub const NETWORK_CIDR: &str = "10.0.0.0/16";

pub const STACK: &str = "app1:web";
pub const SERVICE: &str = "app1:web:api";
pub const PROC: &str = "app1:web:api:worker";
pub const DEPLOYMENT: &str = "app1:web:api:prod";
pub const RELEASE: &str = "app1:web:api:prod:v1";
pub const CONFIG: &str = "app1:web:api:prod:v1:base";
pub const DEPLOYMENT_PROC: &str = "app1:web:api:prod:worker";
pub const ALLOCATION: &str = "app1:web:api:prod:memory:high";
pub const REPO: &str = "app1:main";

pub fn id(s: &str) -> EntityId {
    EntityId::parse(s).expect("Invalid id in test fixture")
}

pub fn cidr(s: &str) -> Cidr {
    Cidr::new(s).expect("Invalid CIDR in test fixture")
}

/// Empty in-memory registry
pub fn registry() -> TopologyRegistry {
    TopologyRegistry::in_memory().expect("Failed to open in-memory registry")
}

/// Empty registry with a custom cascade bound
pub fn registry_with_limit(max_cascade_rows: usize) -> TopologyRegistry {
    TopologyRegistry::open(RegistryConfig::in_memory().with_max_cascade_rows(max_cascade_rows))
        .expect("Failed to open in-memory registry")
}

fn create(registry: &TopologyRegistry, request: NewEntity) -> EntityId {
    registry
        .create_entity(request)
        .expect("Failed to create fixture entity")
        .id
}

/// Infrastructure half of the fixture topology
pub fn seed_infrastructure(registry: &TopologyRegistry) {
    let prod = create(registry, NewEntity::root(EntityType::Environment, "prod"));
    create(registry, NewEntity::root(EntityType::ProviderType, "aws"));
    let k8s = create(registry, NewEntity::root(EntityType::DeploymentTargetType, "k8s"));

    let provider = create(
        registry,
        NewEntity::child(EntityType::Provider, prod, ["aws", "111111111111"]),
    );
    let region = create(registry, NewEntity::child(EntityType::Region, provider, ["eu-1"]));
    let zone = create(registry, NewEntity::child(EntityType::Zone, region.clone(), ["eu-1a"]));
    let partition = create(registry, NewEntity::child(EntityType::Partition, zone, ["p1"]));
    create(
        registry,
        NewEntity::child(EntityType::Network, region, ["vpc"]).cidr(cidr(NETWORK_CIDR)),
    );
    let target = create(
        registry,
        NewEntity::child(EntityType::DeploymentTarget, partition, ["t1"])
            .pointer("deployment_target_type_id", k8s),
    );
    create(registry, NewEntity::child(EntityType::Fleet, target, ["f1"]));
}

/// Application half of the fixture topology (needs the infrastructure half)
pub fn seed_application(registry: &TopologyRegistry) {
    let rust = create(registry, NewEntity::root(EntityType::Language, "rust"));
    let git = create(registry, NewEntity::root(EntityType::RepoType, "git"));
    let memory = create(registry, NewEntity::root(EntityType::AllocationType, "memory"));
    let app = create(registry, NewEntity::root(EntityType::Application, "app1"));

    create(
        registry,
        NewEntity::child(EntityType::Repo, app.clone(), ["main"])
            .pointer("repo_type_id", git)
            .pointer("language_id", rust.clone()),
    );
    let stack = create(registry, NewEntity::child(EntityType::Stack, app, ["web"]));
    let service = create(
        registry,
        NewEntity::child(EntityType::Service, stack, ["api"]).pointer("language_id", rust),
    );
    let proc = create(registry, NewEntity::child(EntityType::Proc, service.clone(), ["worker"]));
    let deployment = create(
        registry,
        NewEntity::child(EntityType::Deployment, service, ["prod"]).pointer("fleet_id", id(FLEET)),
    );
    let release = create(
        registry,
        NewEntity::child(EntityType::Release, deployment.clone(), ["v1"]),
    );
    create(registry, NewEntity::child(EntityType::Config, release.clone(), ["base"]));
    create(
        registry,
        NewEntity::child(EntityType::DeploymentProc, deployment.clone(), ["worker"])
            .pointer("proc_id", proc),
    );
    create(
        registry,
        NewEntity::child(EntityType::Allocation, deployment.clone(), [memory.as_str(), "high"]),
    );

    registry
        .update_entity(
            &deployment,
            EntityPatch::default().set_pointer("current_release_id", release),
        )
        .expect("Failed to set current release");
}

/// Registry holding the whole fixture topology
pub fn seeded_registry() -> TopologyRegistry {
    let registry = registry();
    seed_infrastructure(&registry);
    seed_application(&registry);
    registry
}
