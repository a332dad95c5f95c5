pub mod deployment;
pub mod pod;

use k8s_openapi::api::core::v1::{Container, PodSpec, Volume};
use kube::core::DynamicObject;
use serde::de::DeserializeOwned;

use crate::config::WorkloadKind;

/// A workload kind that embeds a pod spec the injector can patch.
///
/// The patch builder only reads through this trait; every operation it
/// emits is addressed relative to [`Workload::POD_SPEC_PATH`].
pub trait Workload: DeserializeOwned {
    const KIND: WorkloadKind;

    /// JSON pointer tokens locating the pod spec in the serialized object.
    const POD_SPEC_PATH: &'static [&'static str];

    fn pod_spec(&self) -> Option<&PodSpec>;

    fn volumes(&self) -> &[Volume] {
        self.pod_spec()
            .and_then(|s| s.volumes.as_deref())
            .unwrap_or_default()
    }

    fn containers(&self) -> &[Container] {
        self.pod_spec()
            .map(|s| s.containers.as_slice())
            .unwrap_or_default()
    }

    fn init_containers(&self) -> &[Container] {
        self.pod_spec()
            .and_then(|s| s.init_containers.as_deref())
            .unwrap_or_default()
    }
}

/// Re-reads the admitted object as the typed workload `W`.
pub fn decode<W: Workload>(object: &DynamicObject) -> Result<W, serde_json::Error> {
    serde_json::to_value(object).and_then(serde_json::from_value)
}
