//! End-to-end behaviour of a configured stream device.
//!
//! Drives the protocol engine exactly as the network layer does: raw chunks
//! in, reply bytes out, with the admin surface mutating state in between.

use std::sync::Arc;
use std::time::{Duration, Instant};

use vdsim::device::StreamDevice;
use vdsim::error::SimError;
use vdsim::parameter::Value;
use vdsim::vdfile::VdFile;

const CONFIG: &str = r#"
in_terminator = "\r\n"
out_terminator = "\r\n"
mismatch = "ERR"

[[parameter]]
name = "volt"
type = "float32"
value = 1.0

[[parameter]]
name = "chan"
type = "int"
value = 1
opts = "1|2|4"

[[command]]
param = "volt"
req = "VOLT?"
res = "VOLT %.3f"
set = "VOLT %.3f"
ack = "OK"

[[command]]
param = "chan"
req = "CHAN?"
res = "CHAN %d"
set = "CHAN %d"
ack = "OK"
"#;

fn device() -> StreamDevice {
    StreamDevice::new(VdFile::from_str(CONFIG).unwrap())
}

#[tokio::test]
async fn scenario_walk() {
    let dev = device();

    assert_eq!(dev.handle(b"VOLT?\r\n").await, b"VOLT 1.000\r\n".to_vec());

    assert_eq!(dev.handle(b"VOLT 2.5\r\n").await, b"OK\r\n".to_vec());
    assert_eq!(dev.handle(b"VOLT?\r\n").await, b"VOLT 2.500\r\n".to_vec());

    assert_eq!(dev.handle(b"GARBAGE\r\n").await, b"ERR\r\n".to_vec());
}

#[tokio::test]
async fn framing_partition_law() {
    let combined = device()
        .handle(b"VOLT 2.5\r\nVOLT?\r\nGARBAGE\r\n")
        .await;

    let sequential = device();
    let mut expected = Vec::new();
    expected.extend(sequential.handle(b"VOLT 2.5\r\n").await);
    expected.extend(sequential.handle(b"VOLT?\r\n").await);
    expected.extend(sequential.handle(b"GARBAGE\r\n").await);

    assert_eq!(combined, expected);
    assert_eq!(combined, b"OK\r\nVOLT 2.500\r\nERR\r\n".to_vec());
}

#[tokio::test]
async fn set_req_round_trip_law() {
    let dev = device();
    for (set, expect) in [
        (&b"VOLT 0.125\r\n"[..], &b"VOLT 0.125\r\n"[..]),
        (b"VOLT -1.5\r\n", b"VOLT -1.500\r\n"),
        (b"VOLT 10\r\n", b"VOLT 10.000\r\n"),
    ] {
        assert_eq!(dev.handle(set).await, b"OK\r\n".to_vec());
        assert_eq!(dev.handle(b"VOLT?\r\n").await, expect.to_vec());
    }
}

#[tokio::test]
async fn opts_containment_law() {
    let dev = device();
    assert_eq!(dev.handle(b"CHAN 2\r\n").await, b"OK\r\n".to_vec());

    // A value outside the option set mismatches and leaves the cell alone.
    assert_eq!(dev.handle(b"CHAN 3\r\n").await, b"ERR\r\n".to_vec());
    assert_eq!(dev.get_parameter("chan").unwrap(), Value::Int(2));
    assert_eq!(dev.handle(b"CHAN?\r\n").await, b"CHAN 2\r\n".to_vec());
}

#[tokio::test]
async fn delay_monotonicity_and_override_laws() {
    let dev = device();

    dev.set_global_delay("res", "60ms").unwrap();
    let start = Instant::now();
    assert_eq!(dev.handle(b"VOLT?\r\n").await, b"VOLT 1.000\r\n".to_vec());
    assert!(start.elapsed() >= Duration::from_millis(60));

    // A positive per-command delay takes precedence over the global.
    dev.set_param_delay("res", "volt", "30ms").unwrap();
    assert_eq!(
        dev.get_param_delay("res", "volt").unwrap(),
        Duration::from_millis(30)
    );
    let start = Instant::now();
    dev.handle(b"VOLT?\r\n").await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(30));
    assert!(elapsed < Duration::from_millis(60));

    // Clearing both removes the wait entirely.
    dev.set_param_delay("res", "volt", "0s").unwrap();
    dev.set_global_delay("res", "0s").unwrap();
    let start = Instant::now();
    dev.handle(b"VOLT?\r\n").await;
    assert!(start.elapsed() < Duration::from_millis(30));
}

#[tokio::test]
async fn ack_delay_is_independent_of_response_delay() {
    let dev = device();
    dev.set_global_delay("ack", "50ms").unwrap();

    let start = Instant::now();
    assert_eq!(dev.handle(b"VOLT 2.5\r\n").await, b"OK\r\n".to_vec());
    assert!(start.elapsed() >= Duration::from_millis(50));

    // Requests are not slowed by the ack delay.
    let start = Instant::now();
    dev.handle(b"VOLT?\r\n").await;
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[tokio::test]
async fn mismatch_bound_and_runtime_update() {
    let dev = device();
    dev.set_mismatch("NAK").unwrap();
    assert_eq!(dev.handle(b"bogus\r\n").await, b"NAK\r\n".to_vec());

    assert_eq!(
        dev.set_mismatch(&"y".repeat(256)),
        Err(SimError::MismatchTooLong(256))
    );
    assert!(dev.set_mismatch(&"y".repeat(255)).is_ok());
}

#[tokio::test]
async fn trigger_liveness_law() {
    let dev = device();
    let mut rx = dev.take_triggered().unwrap();

    dev.set_parameter("volt", Value::String("2.5".into())).unwrap();
    dev.trigger("volt").unwrap();
    assert_eq!(rx.recv().await.unwrap(), b"VOLT 2.500\r\n".to_vec());

    // One deposit fits the slot; a second without a drain reports NoClient
    // and leaves the first payload in place.
    dev.trigger("volt").unwrap();
    assert_eq!(dev.trigger("volt"), Err(SimError::NoClient));
    assert_eq!(rx.recv().await.unwrap(), b"VOLT 2.500\r\n".to_vec());
}

#[tokio::test]
async fn concurrent_sets_serialise() {
    let dev = Arc::new(device());
    let mut tasks = Vec::new();
    for i in 1..=8u32 {
        let dev = dev.clone();
        tasks.push(tokio::spawn(async move {
            let cmd = format!("VOLT {i}.5\r\n");
            for _ in 0..50 {
                let reply = dev.handle(cmd.as_bytes()).await;
                assert_eq!(reply, b"OK\r\n".to_vec());
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    let last = match dev.get_parameter("volt").unwrap() {
        Value::Float32(v) => v,
        other => panic!("unexpected value {other:?}"),
    };
    assert!((1..=8).any(|i| (last - (i as f32 + 0.5)).abs() < f32::EPSILON));
}
