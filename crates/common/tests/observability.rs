use common::config::LogFormat;
use metrics_exporter_prometheus::PrometheusBuilder;

// NOTE: This is an integration test so it exercises the public API surface
// (`common::observability`) instead of reaching into private internals.

#[test]
fn tracing_error_events_counter_increments_on_error_event() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let dispatch = common::observability::build_dispatch("info", LogFormat::Json);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::error!(wallet = "0xabc", "boom");
        });
    });

    let rendered = handle.render();
    assert!(
        rendered.contains("tracing_error_events"),
        "expected tracing_error_events in rendered metrics, got:\n{rendered}"
    );
}

#[test]
fn pretty_dispatch_does_not_count_info_events() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let dispatch = common::observability::build_dispatch("info", LogFormat::Pretty);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(wallets = 3, "scored");
        });
    });

    let rendered = handle.render();
    assert!(
        !rendered.contains("tracing_error_events"),
        "info events must not touch the error counter, got:\n{rendered}"
    );
}
