use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::PodSpec;

use crate::config::WorkloadKind;

use super::Workload;

impl Workload for Deployment {
    const KIND: WorkloadKind = WorkloadKind::Deployment;
    const POD_SPEC_PATH: &'static [&'static str] = &["spec", "template", "spec"];

    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.as_ref()?.template.spec.as_ref()
    }
}
