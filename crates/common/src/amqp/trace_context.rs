use lapin::types::{AMQPValue, FieldTable};
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// W3C header naming the publisher's span
pub const TRACEPARENT_HEADER: &str = "traceparent";

struct AmqpHeaderInjector<'a>(&'a mut FieldTable);

impl Injector for AmqpHeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.into(), AMQPValue::LongString(value.into()));
    }
}

struct AmqpHeaderExtractor<'a>(&'a FieldTable);

impl Extractor for AmqpHeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .inner()
            .iter()
            .find(|(name, _)| name.as_str() == key)
            .and_then(|(_, value)| match value {
                AMQPValue::LongString(text) => std::str::from_utf8(text.as_bytes()).ok(),
                AMQPValue::ShortString(text) => Some(text.as_str()),
                _ => None,
            })
    }

    fn keys(&self) -> Vec<&str> {
        self.0.inner().keys().map(|name| name.as_str()).collect()
    }
}

/// Inject the current span's W3C trace context into AMQP headers before publishing.
pub fn inject_trace_context(headers: &mut FieldTable) {
    global::get_text_map_propagator(|propagator| {
        let ctx = tracing::Span::current().context();
        propagator.inject_context(&ctx, &mut AmqpHeaderInjector(headers));
    });
}

pub fn extract_trace_context(headers: &FieldTable) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&AmqpHeaderExtractor(headers)))
}
