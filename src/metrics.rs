use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::config::WorkloadKind;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub kind: String,
    pub operation: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResponseLabels {
    pub outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RejectionLabels {
    pub reason: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    pub kind: &'static str,
}

pub struct InjectorMetrics {
    pub admission_requests_total: Family<RequestLabels, Counter>,
    pub admission_responses_total: Family<ResponseLabels, Counter>,
    pub rejected_requests_total: Family<RejectionLabels, Counter>,
    pub admission_request_duration_seconds: Histogram,
}

const DURATION_BUCKETS: [f64; 14] = [
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

impl InjectorMetrics {
    pub fn new(registry: &mut Registry, workload_kind: WorkloadKind) -> Self {
        let admission_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "injector_admission_requests",
            "Total number of decoded admission requests",
            admission_requests_total.clone(),
        );

        let admission_responses_total = Family::<ResponseLabels, Counter>::default();
        registry.register(
            "injector_admission_responses",
            "Total number of admission responses by outcome",
            admission_responses_total.clone(),
        );

        let rejected_requests_total = Family::<RejectionLabels, Counter>::default();
        registry.register(
            "injector_rejected_requests",
            "Total number of requests answered with an HTTP error status",
            rejected_requests_total.clone(),
        );

        let admission_request_duration_seconds = Histogram::new(DURATION_BUCKETS.iter().copied());
        registry.register(
            "injector_admission_request_duration_seconds",
            "Duration of admission request processing in seconds",
            admission_request_duration_seconds.clone(),
        );

        let handled_kind = Family::<KindLabels, Gauge>::default();
        registry.register(
            "injector_handled_kind",
            "Workload kind this injector mutates",
            handled_kind.clone(),
        );
        handled_kind
            .get_or_create(&KindLabels {
                kind: workload_kind.as_str(),
            })
            .set(1);

        Self {
            admission_requests_total,
            admission_responses_total,
            rejected_requests_total,
            admission_request_duration_seconds,
        }
    }
}
