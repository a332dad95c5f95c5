use json_patch::Patch;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use kube::core::{DynamicObject, TypeMeta};
use thiserror::Error;
use tracing::{error, info};

use crate::config::WorkloadKind;
use crate::patch::build_patch;
use crate::workloads::{self, Workload};

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("admission request for {0} carries no object")]
    MissingObject(WorkloadKind),
    #[error("could not decode {kind} object: {source}")]
    Decode {
        kind: WorkloadKind,
        source: serde_json::Error,
    },
    #[error("{0} object has no pod spec")]
    MissingPodSpec(WorkloadKind),
    #[error("failed to serialize patch: {0}")]
    Serialize(serde_json::Error),
}

/// Outcome of deciding on a single admission request.
#[derive(Debug)]
pub enum Verdict {
    Allowed { patch: Option<Patch> },
    Errored(String),
}

pub struct InjectionEngine {
    pub kind: WorkloadKind,
}

impl InjectionEngine {
    pub fn new(kind: WorkloadKind) -> Self {
        Self { kind }
    }

    /// Logs the request, decides on it and builds the matching response.
    pub fn review(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        info!(
            kind = %request.kind.kind,
            namespace = request.namespace.as_deref().unwrap_or_default(),
            name = %request.name,
            uid = %request.uid,
            operation = ?request.operation,
            user = request.user_info.username.as_deref().unwrap_or_default(),
            "admission review"
        );

        into_response(request, self.decide(request))
    }

    pub fn decide(&self, request: &AdmissionRequest<DynamicObject>) -> Verdict {
        if request.kind.kind != self.kind.as_str() {
            return Verdict::Allowed { patch: None };
        }

        let result = match self.kind {
            WorkloadKind::Pod => inject::<Pod>(request),
            WorkloadKind::Deployment => inject::<Deployment>(request),
        };

        match result {
            Ok(patch) => Verdict::Allowed { patch: Some(patch) },
            Err(e) => {
                error!(uid = %request.uid, "could not inject secrets sidecar: {e}");
                Verdict::Errored(e.to_string())
            }
        }
    }
}

fn inject<W: Workload>(request: &AdmissionRequest<DynamicObject>) -> Result<Patch, InjectError> {
    let object = request
        .object
        .as_ref()
        .ok_or(InjectError::MissingObject(W::KIND))?;

    let workload: W = workloads::decode(object).map_err(|source| InjectError::Decode {
        kind: W::KIND,
        source,
    })?;
    if workload.pod_spec().is_none() {
        return Err(InjectError::MissingPodSpec(W::KIND));
    }

    build_patch(&workload).map_err(InjectError::Serialize)
}

/// Errored verdicts answer with `allowed: false` and the reason in the
/// status message. The request UID is always echoed back.
pub fn into_response(
    request: &AdmissionRequest<DynamicObject>,
    verdict: Verdict,
) -> AdmissionResponse {
    match verdict {
        Verdict::Allowed { patch: None } => AdmissionResponse::from(request),
        Verdict::Allowed { patch: Some(patch) } => {
            match AdmissionResponse::from(request).with_patch(patch) {
                Ok(response) => {
                    let rendered = response
                        .patch
                        .as_deref()
                        .map(String::from_utf8_lossy)
                        .unwrap_or_default();
                    info!(uid = %request.uid, patch = %rendered, "admission response");
                    response
                }
                Err(e) => {
                    error!(uid = %request.uid, "failed to serialize patch: {e}");
                    errored_response(
                        &request.types,
                        &request.uid,
                        format!("failed to serialize patch: {e}"),
                    )
                }
            }
        }
        Verdict::Errored(reason) => errored_response(&request.types, &request.uid, reason),
    }
}

/// A rejection addressed to the request identified by `uid`, in the
/// review version it arrived with.
pub fn errored_response(types: &TypeMeta, uid: &str, reason: String) -> AdmissionResponse {
    let mut response = AdmissionResponse::invalid(reason);
    response.types = types.clone();
    response.uid = uid.to_string();
    response
}

#[cfg(test)]
pub(crate) mod tests {
    use kube::core::admission::{AdmissionReview, Operation};
    use serde_json::{json, Value};

    use super::*;

    pub(crate) fn review_json(kind: (&str, &str, &str), resource: &str, object: Value) -> Value {
        let (group, version, kind) = kind;
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "e911857d-c318-11e8-bbad-025000000001",
                "kind": {"group": group, "version": version, "kind": kind},
                "resource": {"group": group, "version": version, "resource": resource},
                "name": "web",
                "namespace": "default",
                "operation": "CREATE",
                "userInfo": {"username": "kubernetes-admin", "groups": ["system:masters"]},
                "object": object,
                "oldObject": null,
                "dryRun": false
            }
        })
    }

    pub(crate) fn deployment_object(pod_spec: Value) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {
                "selector": {"matchLabels": {"app": "web"}},
                "template": {
                    "metadata": {"labels": {"app": "web"}},
                    "spec": pod_spec
                }
            }
        })
    }

    fn request(review: Value) -> AdmissionRequest<DynamicObject> {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(review).unwrap();
        review.try_into().unwrap()
    }

    fn deployment_request(pod_spec: Value) -> AdmissionRequest<DynamicObject> {
        request(review_json(
            ("apps", "v1", "Deployment"),
            "deployments",
            deployment_object(pod_spec),
        ))
    }

    fn patch_ops(response: &AdmissionResponse) -> Vec<Value> {
        let bytes = response.patch.as_ref().expect("response carries a patch");
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_bare_deployment_gets_three_operations() {
        let engine = InjectionEngine::new(WorkloadKind::Deployment);
        let req = deployment_request(json!({"containers": [{"name": "app", "image": "app:1"}]}));
        assert_eq!(req.operation, Operation::Create);

        let response = engine.review(&req);
        assert!(response.allowed);
        assert_eq!(response.uid, req.uid);

        let ops = patch_ops(&response);
        let summary: Vec<(&str, &str)> = ops
            .iter()
            .map(|op| (op["op"].as_str().unwrap(), op["path"].as_str().unwrap()))
            .collect();
        assert_eq!(
            summary,
            [
                ("add", "/spec/template/spec/volumes"),
                ("add", "/spec/template/spec/initContainers"),
                ("replace", "/spec/template/spec/containers"),
            ]
        );
        assert_eq!(
            ops[2]["value"][0]["volumeMounts"],
            json!([{"name": "secrets", "mountPath": "/secrets"}])
        );
    }

    #[test]
    fn test_populated_deployment() {
        let engine = InjectionEngine::new(WorkloadKind::Deployment);
        let mounted = json!([{"name": "secrets", "mountPath": "/secrets"}]);
        let req = deployment_request(json!({
            "volumes": [{"name": "config", "configMap": {"name": "web-config"}}],
            "initContainers": [{"name": "migrate", "image": "migrate:1"}],
            "containers": [
                {"name": "app", "image": "app:1", "volumeMounts": mounted},
                {"name": "proxy", "image": "proxy:1", "volumeMounts": mounted}
            ]
        }));

        let response = engine.review(&req);
        assert!(response.allowed);

        let ops = patch_ops(&response);
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0]["op"], "add");
        assert_eq!(ops[0]["path"], "/spec/template/spec/volumes/-");
        assert_eq!(ops[0]["value"]["name"], "secrets");
        assert_eq!(ops[1]["op"], "replace");
        assert_eq!(ops[1]["value"][0]["name"], "secrets-injector");
        assert_eq!(ops[1]["value"][1]["name"], "migrate");
        assert_eq!(ops[2]["op"], "replace");
        assert_eq!(ops[2]["value"][0]["volumeMounts"], mounted);
        assert_eq!(ops[2]["value"][1]["volumeMounts"], mounted);
    }

    #[test]
    fn test_malformed_object_is_errored() {
        let engine = InjectionEngine::new(WorkloadKind::Deployment);
        let req = deployment_request(json!({"containers": "not-a-list"}));

        assert!(matches!(engine.decide(&req), Verdict::Errored(_)));

        let response = engine.review(&req);
        assert!(!response.allowed);
        assert!(response.patch.is_none());
        assert!(!response.result.message.is_empty());
        assert_eq!(response.uid, req.uid);
    }

    #[test]
    fn test_missing_pod_spec_is_errored() {
        let engine = InjectionEngine::new(WorkloadKind::Deployment);
        let mut object = deployment_object(json!({}));
        object["spec"]["template"]
            .as_object_mut()
            .unwrap()
            .remove("spec");
        let req = request(review_json(("apps", "v1", "Deployment"), "deployments", object));

        match engine.decide(&req) {
            Verdict::Errored(reason) => assert_eq!(reason, "Deployment object has no pod spec"),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn test_missing_object_is_errored() {
        let engine = InjectionEngine::new(WorkloadKind::Deployment);
        let req = request(review_json(("apps", "v1", "Deployment"), "deployments", Value::Null));

        let response = engine.review(&req);
        assert!(!response.allowed);
        assert!(response.result.message.contains("carries no object"));
    }

    #[test]
    fn test_other_kind_passes_through() {
        let engine = InjectionEngine::new(WorkloadKind::Deployment);
        let req = request(review_json(
            ("", "v1", "ConfigMap"),
            "configmaps",
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "web"},
                "data": {"key": "value"}
            }),
        ));

        let response = engine.review(&req);
        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert!(response.result.message.is_empty());
        assert_eq!(response.uid, req.uid);
    }

    #[test]
    fn test_pod_variant_ignores_deployments() {
        let engine = InjectionEngine::new(WorkloadKind::Pod);
        let req = deployment_request(json!({"containers": [{"name": "app", "image": "app:1"}]}));

        assert!(matches!(engine.decide(&req), Verdict::Allowed { patch: None }));
    }

    #[test]
    fn test_pod_variant() {
        let engine = InjectionEngine::new(WorkloadKind::Pod);
        let req = request(review_json(
            ("", "v1", "Pod"),
            "pods",
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "web", "namespace": "default"},
                "spec": {"containers": [{"name": "app", "image": "app:1"}]}
            }),
        ));

        let response = engine.review(&req);
        assert!(response.allowed);
        let paths: Vec<String> = patch_ops(&response)
            .iter()
            .map(|op| op["path"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(paths, ["/spec/volumes", "/spec/initContainers", "/spec/containers"]);
    }
}
