mod common;

use std::time::{Duration, Instant};

use common::{local_config, start_gated, str_batch, GATE_ID};
use qsse_proto::connector_client::ConnectorClient;
use qsse_proto::{insert_bin_header, BundledRows, FunctionRequestHeader, FUNCTION_REQUEST_HEADER_KEY};
use tonic::{Code, Request, Status};

async fn gate_call(addr: std::net::SocketAddr) -> Result<Vec<BundledRows>, Status> {
    let mut client = ConnectorClient::connect(format!("http://{}", addr))
        .await
        .map_err(|e| Status::unavailable(e.to_string()))?;
    let mut request = Request::new(tokio_stream::iter(vec![str_batch(&["1"])]));
    insert_bin_header(
        request.metadata_mut(),
        FUNCTION_REQUEST_HEADER_KEY,
        &FunctionRequestHeader {
            function_id: GATE_ID,
            version: String::new(),
        },
    );

    let mut stream = client.execute_function(request).await?.into_inner();
    let mut out = Vec::new();
    while let Some(batch) = stream.message().await? {
        out.push(batch);
    }
    Ok(out)
}

#[tokio::test]
async fn in_flight_call_is_abandoned_after_grace_period() {
    let mut config = local_config();
    config.shutdown_grace = Duration::from_millis(300);
    let server = start_gated(config).await;
    let gate = server.gate.clone();

    let call = tokio::spawn(gate_call(server.addr));
    gate.entered_at_least(1).await;

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(5), server.shutdown())
        .await
        .expect("serve loop did not stop after its grace period")
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));

    let outcome = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("abandoned call never ended")
        .unwrap();
    assert_eq!(outcome.unwrap_err().code(), Code::Unavailable);
}

#[tokio::test]
async fn in_flight_call_finishing_within_grace_is_answered() {
    let mut config = local_config();
    config.shutdown_grace = Duration::from_secs(10);
    let server = start_gated(config).await;
    let gate = server.gate.clone();

    let call = tokio::spawn(gate_call(server.addr));
    gate.entered_at_least(1).await;

    let stopping = tokio::spawn(server.shutdown());
    tokio::time::sleep(Duration::from_millis(100)).await;
    gate.open();

    let out = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("call did not finish")
        .unwrap()
        .unwrap();
    assert_eq!(out[0].rows[0].duals[0].str_data, "opened");

    tokio::time::timeout(Duration::from_secs(5), stopping)
        .await
        .expect("serve loop waited out the whole grace period")
        .unwrap()
        .unwrap();
}
