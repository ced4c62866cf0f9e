use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    renewals: IntCounterVec,
    gate_decisions: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new(
                "auth_login_attempts_total",
                "Count of login attempts grouped by principal kind and outcome",
            ),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let renewals = IntCounterVec::new(
            Opts::new(
                "auth_token_renewals_total",
                "Count of access token renewals grouped by principal kind and outcome",
            ),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(renewals.clone()))?;

        let gate_decisions = IntCounterVec::new(
            Opts::new(
                "auth_gate_decisions_total",
                "Count of gate decisions grouped by route class and outcome",
            ),
            &["class", "outcome"],
        )?;
        registry.register(Box::new(gate_decisions.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            renewals,
            gate_decisions,
        })
    }

    pub fn login_attempt(&self, kind: &str, outcome: &str) {
        self.login_attempts.with_label_values(&[kind, outcome]).inc();
    }

    pub fn renewal(&self, kind: &str, outcome: &str) {
        self.renewals.with_label_values(&[kind, outcome]).inc();
    }

    pub fn gate_decision(&self, class: &str, outcome: &str) {
        self.gate_decisions.with_label_values(&[class, outcome]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
