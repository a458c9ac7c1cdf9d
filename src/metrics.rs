use hyper::{
    header::CONTENT_TYPE,
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use lazy_static::lazy_static;
use prometheus::{labels, opts, register_counter, register_gauge, register_histogram_vec};
use prometheus::{Counter, Encoder, Gauge, HistogramVec, TextEncoder};
use const_format::concatcp;

/// Prefix shared by every metric the operator exports.
pub const METRICS_PREFIX: &str = "pipo_";

lazy_static! {
    static ref HTTP_COUNTER: Counter = register_counter!(opts!(
        concatcp!(METRICS_PREFIX, "http_requests_total"),
        "Number of HTTP requests made to the metrics server.",
        labels! {"handler" => "all",}
    ))
    .unwrap();
    static ref HTTP_BODY_GAUGE: Gauge = register_gauge!(opts!(
        concatcp!(METRICS_PREFIX, "http_response_size_bytes"),
        "Metrics server HTTP response sizes in bytes.",
        labels! {"handler" => "all",}
    ))
    .unwrap();
    static ref HTTP_REQ_HISTOGRAM: HistogramVec = register_histogram_vec!(
        concatcp!(METRICS_PREFIX, "http_request_duration_seconds"),
        "Metrics server HTTP request latencies in seconds.",
        &["handler"]
    )
    .unwrap();
}

/// Encodes every registered metric family in the text exposition format.
fn encode() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((buffer, encoder.format_type().to_owned()))
}

/// Handler to serve the prometheus metrics to the request.
async fn serve_req(_req: Request<Body>) -> Result<Response<Body>, hyper::Error> {
    HTTP_COUNTER.inc();
    let timer = HTTP_REQ_HISTOGRAM.with_label_values(&["all"]).start_timer();
    let response = match encode() {
        Ok((buffer, format_type)) => {
            HTTP_BODY_GAUGE.set(buffer.len() as f64);
            let mut response = Response::new(Body::from(buffer));
            if let Ok(value) = format_type.parse() {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            let mut response = Response::new(Body::from(e.to_string()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };
    timer.observe_duration();
    Ok(response)
}

/// Runs the prometheus metrics server on the given port.
pub async fn run_server(port: u16) {
    let addr = ([0, 0, 0, 0], port).into();
    tracing::info!("Metrics server listening on http://{}", addr);

    let serve_future = Server::bind(&addr).serve(make_service_fn(|_| async {
        Ok::<_, hyper::Error>(service_fn(serve_req))
    }));

    if let Err(err) = serve_future.await {
        panic!("metrics server error: {}", err);
    }

    panic!("metrics server exited");
}
