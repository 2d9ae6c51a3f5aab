use chrono::{DateTime, Utc};

/// Context of the element being written, handed to the [ElementConverter].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteContext {
    /// Event time of the element, if the pipeline assigned one.
    pub event_time: Option<DateTime<Utc>>,
    /// Current watermark of the writer's input.
    pub watermark: Option<DateTime<Utc>>,
}

impl WriteContext {
    pub fn new(event_time: DateTime<Utc>) -> Self {
        Self {
            event_time: Some(event_time),
            watermark: None,
        }
    }

    pub fn with_watermark(mut self, watermark: DateTime<Utc>) -> Self {
        self.watermark = Some(watermark);
        self
    }
}

/// Maps an element of the stream to a request entry the destination understands.
///
/// Entries are buffered, not elements: a failed request is easier to turn back into a retry entry
/// than into the element it came from.
pub trait ElementConverter<In, E>: Send + 'static {
    fn apply(&self, element: In, context: &WriteContext) -> E;
}

impl<In, E, F> ElementConverter<In, E> for F
where
    F: Fn(In, &WriteContext) -> E + Send + 'static,
{
    fn apply(&self, element: In, context: &WriteContext) -> E {
        self(element, context)
    }
}
