//! Recursive span-tree construction

use crate::engine::Engine;
use crate::models::{
    AttributeValue, Attributes, Span, SpanId, SpanKind, TraceBatch, TraceId, ERROR, SEQUENCE_NUMBER,
    SERVICE_NAME,
};
use crate::topology::{PickRatio, ServiceRoute, ServiceTier};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use tracing::trace;

/// Builds traces rooted at one `service/route`
pub struct TraceGenerator {
    engine: Arc<Engine>,
    service: String,
    route: String,
    sequence: u64,
    rng: StdRng,
}

impl TraceGenerator {
    pub fn new(engine: Arc<Engine>, service: &str, route: &str, rng: StdRng) -> Self {
        Self {
            engine,
            service: service.to_string(),
            route: route.to_string(),
            sequence: 0,
            rng,
        }
    }

    pub fn target(&self) -> String {
        format!("{}/{}", self.service, self.route)
    }

    /// Number of spans emitted so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// One trace starting at `start_time_unix_nano`. Empty when the root
    /// route is gated off.
    pub fn generate(&mut self, start_time_unix_nano: u64) -> TraceBatch {
        let trace_id = loop {
            let id = TraceId::from_bytes(self.rng.gen());
            if !id.is_zero() {
                break id;
            }
        };
        let ratio = PickRatio::from_trace_id(&trace_id);

        let engine = Arc::clone(&self.engine);
        let mut builder = TraceBuilder {
            engine: &engine,
            trace_id,
            ratio,
            sequence: &mut self.sequence,
            rng: &mut self.rng,
            spans: Vec::new(),
        };
        builder.span(
            &self.service,
            &self.route,
            start_time_unix_nano,
            SpanId::default(),
            None,
        );

        trace!(trace_id = %trace_id.to_hex(), spans = builder.spans.len(), "Generated trace");
        TraceBatch {
            spans: builder.spans,
        }
    }
}

struct TraceBuilder<'a> {
    engine: &'a Engine,
    trace_id: TraceId,
    ratio: PickRatio,
    sequence: &'a mut u64,
    rng: &'a mut StdRng,
    spans: Vec<Span>,
}

impl<'a> TraceBuilder<'a> {
    fn span_id(&mut self) -> SpanId {
        loop {
            let id = SpanId::from_bytes(self.rng.gen());
            if !id.is_zero() {
                return id;
            }
        }
    }

    /// Emit the span for `service/route` and its subtree. Returns the index
    /// of the new span, or `None` when the route is gated off.
    fn span(
        &mut self,
        service_name: &str,
        route_name: &str,
        start: u64,
        parent_span_id: SpanId,
        parent_attributes: Option<&Attributes>,
    ) -> Option<usize> {
        let engine = self.engine;
        let flags = engine.flags();
        let service = engine.topology().service(service_name)?;
        let route = service.route(route_name)?;
        if !route.should_generate(flags) {
            return None;
        }

        let span_id = self.span_id();
        let attributes = self.attributes(service, route, parent_attributes);
        let resource = self.resource(service, route);

        let own = route.sample_latency(flags, self.ratio, &mut *self.rng);
        let mut end = start.saturating_add(own.as_nanos() as u64);

        let index = self.spans.len();
        self.spans.push(Span {
            trace_id: self.trace_id,
            span_id,
            parent_span_id,
            name: route_name.to_string(),
            kind: SpanKind::Server,
            start_time_unix_nano: start,
            end_time_unix_nano: end,
            attributes,
            resource,
        });

        for call in &route.downstream_calls {
            let offset = route.sample_latency(flags, self.ratio, &mut *self.rng);
            let child_start = start.saturating_add(offset.as_nanos() as u64);
            let parent_attributes = self.spans[index].attributes.clone();

            let Some(child) = self.span(
                &call.service,
                &call.route,
                child_start,
                span_id,
                Some(&parent_attributes),
            ) else {
                continue;
            };

            end = end.max(self.spans[child].end_time_unix_nano);
            if let Some(error) = self.spans[child].attributes.get(ERROR).cloned() {
                self.spans[index]
                    .attributes
                    .entry(ERROR.to_string())
                    .or_insert(error);
            }
        }

        self.spans[index].end_time_unix_nano = end;
        Some(index)
    }

    fn attributes(
        &mut self,
        service: &ServiceTier,
        route: &ServiceRoute,
        parent: Option<&Attributes>,
    ) -> Attributes {
        let flags = self.engine.flags();
        let mut attributes = Attributes::new();

        if let Some(set) = service.pick_tag_set(flags, self.ratio) {
            set.apply(&mut attributes, parent, &mut *self.rng);
        }
        if let Some(set) = crate::topology::pick(&route.tag_sets, flags, self.ratio) {
            set.apply(&mut attributes, parent, &mut *self.rng);
        }

        *self.sequence += 1;
        attributes.insert(
            SEQUENCE_NUMBER.to_string(),
            AttributeValue::Int(*self.sequence as i64),
        );
        attributes
    }

    fn resource(&mut self, service: &ServiceTier, route: &ServiceRoute) -> Attributes {
        let flags = self.engine.flags();
        let mut resource = Attributes::new();

        if let Some(set) = service.pick_resource_set(route, flags, self.ratio) {
            resource = set.attributes(&mut *self.rng);
            let pod = set
                .pool_key()
                .and_then(|key| self.engine.kubernetes().pick_pod(key, self.ratio));
            if let Some(identity) = pod {
                identity.substitute_attributes(&mut resource);
                resource.extend(identity.resource_attributes());
            }
        }

        resource.insert(SERVICE_NAME.to_string(), service.name.clone().into());
        resource
    }
}
