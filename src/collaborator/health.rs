// Health check endpoints
// Liveness answers as long as the bus dispatches; readiness also requires
// that shutdown has not begun.

use std::sync::Arc;

use hyper::Method;

use crate::config::HealthConfig;
use crate::http::{response, HttpBus, Payload};
use crate::shutdown::ShutdownGate;

/// Bind the liveness and readiness selectors, unless disabled.
pub fn register(bus: &Arc<HttpBus>, config: &HealthConfig, gate: &Arc<ShutdownGate>) {
    if !config.enabled {
        return;
    }

    let responder = Arc::downgrade(bus);
    bus.on(config.liveness_path.as_str(), move |event| {
        let Some(bus) = responder.upgrade() else { return };
        let reply = probe(&event, || true);
        bus.reply(&event, Payload::Response(reply));
    });

    let responder = Arc::downgrade(bus);
    let gate = Arc::clone(gate);
    bus.on(config.readiness_path.as_str(), move |event| {
        let Some(bus) = responder.upgrade() else { return };
        let reply = probe(&event, || !gate.is_signaled());
        bus.reply(&event, Payload::Response(reply));
    });
}

fn probe(event: &crate::bus::Event<Payload>, healthy: impl Fn() -> bool) -> crate::http::FullResponse {
    match event.data() {
        Payload::Request(req) if req.method == Method::GET || req.method == Method::HEAD => {
            if healthy() {
                response::build_health_response("ok")
            } else {
                response::build_503_response()
            }
        }
        _ => response::build_405_response("GET, HEAD"),
    }
}
