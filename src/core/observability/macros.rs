/// Creates a root span based on the provided sampling rate, as a
/// pre-filter so unsampled requests skip span bookkeeping entirely.
///
/// # Behavior
/// - If a parent span exists: always creates a child span so the
///   trace stays complete
/// - If no parent exists: samples at the configured rate
///
/// # Returns
/// A real span when a parent exists or sampling passes, otherwise
/// `Span::none()`
#[macro_export]
macro_rules! sample_or_attach_root_span {
    ($sample_percent:expr, $span_name:literal) => {{
        let current = tracing::Span::current();

        if !current.is_disabled() || rand::random::<f32>() < $sample_percent {
            tracing::info_span!($span_name)
        } else {
            tracing::Span::none()
        }
    }};
    ($sample_percent:expr, $span_name:literal, $($fields:tt)*) => {{
        let current = tracing::Span::current();

        if !current.is_disabled() || rand::random::<f32>() < $sample_percent {
            tracing::info_span!($span_name, $($fields)*)
        } else {
            tracing::Span::none()
        }
    }};
}

/// Creates an INFO-level child span only when the parent is active,
/// keeping span creation free for unsampled requests.
///
/// Returns an un-entered span, call `.entered()` or instrument with
/// it.
#[macro_export]
macro_rules! child_span_info {
    ($span_name:literal) => {{
        if !::tracing::Span::current().is_disabled() {
            ::tracing::info_span!($span_name)
        } else {
            ::tracing::Span::none()
        }
    }};
    ($span_name:literal, $($fields:tt)*) => {{
        if !::tracing::Span::current().is_disabled() {
            ::tracing::info_span!($span_name, $($fields)*)
        } else {
            ::tracing::Span::none()
        }
    }};
}
