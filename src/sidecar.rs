//! The fixed pieces injected into every mutated workload: a memory-backed
//! `secrets` volume, its mount in each container, and the init container
//! that populates it.

use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Volume, VolumeMount};

pub const SECRETS_VOLUME_NAME: &str = "secrets";
pub const SECRETS_MOUNT_PATH: &str = "/secrets";
pub const INJECTOR_CONTAINER_NAME: &str = "secrets-injector";
pub const INJECTOR_IMAGE: &str = "busybox";
pub const INJECTOR_COMMAND: [&str; 3] = ["/bin/sh", "-ec", "echo Hello >/secrets/secret.txt"];

pub fn secrets_volume() -> Volume {
    Volume {
        name: SECRETS_VOLUME_NAME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some("Memory".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn secrets_mount() -> VolumeMount {
    VolumeMount {
        name: SECRETS_VOLUME_NAME.to_string(),
        mount_path: SECRETS_MOUNT_PATH.to_string(),
        ..Default::default()
    }
}

pub fn injector_container() -> Container {
    Container {
        name: INJECTOR_CONTAINER_NAME.to_string(),
        image: Some(INJECTOR_IMAGE.to_string()),
        command: Some(INJECTOR_COMMAND.iter().map(|s| s.to_string()).collect()),
        volume_mounts: Some(vec![secrets_mount()]),
        ..Default::default()
    }
}

/// Mounts are compared by volume name and mount path only.
pub fn is_secrets_mount(mount: &VolumeMount) -> bool {
    mount.name == SECRETS_VOLUME_NAME && mount.mount_path == SECRETS_MOUNT_PATH
}
