//! JSON Patch generation for the secrets sidecar.
//!
//! Every operation is computed against the original admitted object, never
//! against the result of an earlier operation, so the operations carry no
//! ordering dependency between them.

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation, ReplaceOperation};
use k8s_openapi::api::core::v1::Container;
use serde_json::Value;

use crate::sidecar::{
    INJECTOR_CONTAINER_NAME, SECRETS_VOLUME_NAME, injector_container, is_secrets_mount,
    secrets_mount, secrets_volume,
};
use crate::workloads::Workload;

pub fn build_patch<W: Workload>(workload: &W) -> Result<Patch, serde_json::Error> {
    let mut ops = Vec::with_capacity(3);
    ops.extend(add_secrets_volume(workload)?);
    ops.extend(add_init_container(workload)?);
    ops.push(mount_secrets_volume(workload)?);
    Ok(Patch(ops))
}

/// Adds the `secrets` volume, appending when a volume list already exists.
/// Nothing is emitted if a volume with that name is already declared.
fn add_secrets_volume<W: Workload>(
    workload: &W,
) -> Result<Option<PatchOperation>, serde_json::Error> {
    let volumes = workload.volumes();
    if volumes.iter().any(|v| v.name == SECRETS_VOLUME_NAME) {
        return Ok(None);
    }

    let op = if volumes.is_empty() {
        add(
            pod_spec_pointer::<W>(&["volumes"]),
            serde_json::to_value([secrets_volume()])?,
        )
    } else {
        add(
            pod_spec_pointer::<W>(&["volumes", "-"]),
            serde_json::to_value(secrets_volume())?,
        )
    };
    Ok(Some(op))
}

/// Puts the injector first in the init container list. An existing list is
/// replaced wholesale so the injector runs before anything already declared.
fn add_init_container<W: Workload>(
    workload: &W,
) -> Result<Option<PatchOperation>, serde_json::Error> {
    let existing = workload.init_containers();
    if existing.iter().any(|c| c.name == INJECTOR_CONTAINER_NAME) {
        return Ok(None);
    }

    let path = pod_spec_pointer::<W>(&["initContainers"]);
    let mut init_containers = Vec::with_capacity(existing.len() + 1);
    init_containers.push(injector_container());

    let op = if existing.is_empty() {
        add(path, serde_json::to_value(&init_containers)?)
    } else {
        init_containers.extend(existing.iter().cloned());
        replace(path, serde_json::to_value(&init_containers)?)
    };
    Ok(Some(op))
}

/// Replaces the container list with one where every container mounts the
/// `secrets` volume. Emitted even when no container changes.
fn mount_secrets_volume<W: Workload>(workload: &W) -> Result<PatchOperation, serde_json::Error> {
    let containers: Vec<Container> = workload
        .containers()
        .iter()
        .cloned()
        .map(with_secrets_mount)
        .collect();

    Ok(replace(
        pod_spec_pointer::<W>(&["containers"]),
        serde_json::to_value(containers)?,
    ))
}

fn with_secrets_mount(mut container: Container) -> Container {
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    if !mounts.iter().any(is_secrets_mount) {
        mounts.push(secrets_mount());
    }
    container
}

fn pod_spec_pointer<W: Workload>(tail: &[&str]) -> PointerBuf {
    let mut tokens: Vec<&str> = W::POD_SPEC_PATH.to_vec();
    tokens.extend_from_slice(tail);
    PointerBuf::from_tokens(tokens)
}

fn add(path: PointerBuf, value: Value) -> PatchOperation {
    PatchOperation::Add(AddOperation { path, value })
}

fn replace(path: PointerBuf, value: Value) -> PatchOperation {
    PatchOperation::Replace(ReplaceOperation { path, value })
}
