use k8s_openapi::api::core::v1::{Pod, PodSpec};

use crate::config::WorkloadKind;

use super::Workload;

impl Workload for Pod {
    const KIND: WorkloadKind = WorkloadKind::Pod;
    const POD_SPEC_PATH: &'static [&'static str] = &["spec"];

    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Pod;

    use super::Workload;

    #[test]
    fn test_pod_accessors() {
        let pod: Pod = serde_yaml::from_str(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: web
spec:
  volumes:
    - name: cache
      emptyDir: {}
  initContainers:
    - name: migrate
      image: migrate:1
  containers:
    - name: app
      image: app:1
    - name: proxy
      image: proxy:1
"#,
        )
        .unwrap();

        assert_eq!(pod.volumes().len(), 1);
        assert_eq!(pod.init_containers()[0].name, "migrate");
        assert_eq!(pod.containers().len(), 2);
    }

    #[test]
    fn test_pod_without_spec() {
        let pod = Pod::default();
        assert!(pod.pod_spec().is_none());
        assert!(pod.volumes().is_empty());
        assert!(pod.containers().is_empty());
        assert!(pod.init_containers().is_empty());
    }
}
