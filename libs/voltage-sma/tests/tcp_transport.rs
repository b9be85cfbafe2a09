//! Modbus/TCP transport against the simulator served on a loopback port

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::time::Duration;
use voltage_sma::catalog::{
    BMS_OPERATING_MODE, DEVICE_NAME, EXTERNAL_POWER_CONTROL, GRID_FREQUENCY,
    INVERTER_NOMINAL_POWER,
};
use voltage_sma::simulator::SimulatorServer;
use voltage_sma::{
    ModbusTcpTransport, RegisterAccess, RegisterValue, SimulatedDevice, SmaError, TransportError,
    WordTransport,
};

async fn start(device: &SimulatedDevice) -> (SimulatorServer, ModbusTcpTransport) {
    let server = device.serve("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let transport = ModbusTcpTransport::new(addr.ip().to_string(), addr.port())
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(2));
    (server, transport)
}

#[tokio::test]
async fn test_read_and_write_words() {
    let device = SimulatedDevice::new();
    device.set_words(3, 30233, &[0x0000, 0x09C4]).await;
    let (_server, mut transport) = start(&device).await;

    transport.connect().await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(
        transport.read_words(3, 30233, 2).await.unwrap(),
        vec![0x0000, 0x09C4]
    );

    transport.write_words(3, 40151, &[0x0000, 0x0322]).await.unwrap();
    assert_eq!(device.u32_at(3, 40151).await, Some(802));
}

#[tokio::test]
async fn test_exception_response() {
    let device = SimulatedDevice::new();
    let (_server, mut transport) = start(&device).await;
    transport.connect().await.unwrap();

    assert_eq!(
        transport.read_words(3, 30233, 2).await,
        Err(TransportError::Exception {
            function: 0x83,
            code: 0x02
        })
    );
    // an exception leaves the connection usable
    assert!(transport.is_connected());
}

#[tokio::test]
async fn test_injected_failure_maps_to_device_failure() {
    let device = SimulatedDevice::new();
    device.set_u32(3, 40236, 1438).await;
    device
        .fail_at(40236, TransportError::io("injected"))
        .await;
    let (_server, mut transport) = start(&device).await;
    transport.connect().await.unwrap();

    assert_eq!(
        transport.write_words(3, 40236, &[0, 2289]).await,
        Err(TransportError::Exception {
            function: 0x90,
            code: 0x04
        })
    );
}

#[tokio::test]
async fn test_session_over_tcp() {
    let device = SimulatedDevice::new();
    device.set_u32(3, 30233, 2500).await;
    device.set_u32(3, 30803, 5002).await;
    let (_server, transport) = start(&device).await;
    let mut session = RegisterAccess::new(transport);

    assert_eq!(
        session.read_register(&INVERTER_NOMINAL_POWER).await.as_f64(),
        2500.0
    );
    assert_eq!(
        session.read_register(&GRID_FREQUENCY).await.to_string(),
        "50.02"
    );

    assert!(
        session
            .write_register(&DEVICE_NAME, &RegisterValue::text("carport"))
            .await
    );
    let name = session.read_register(&DEVICE_NAME).await;
    assert!(name.as_bytes().unwrap().starts_with(b"carport\0"));

    session.set_self_consumption_mode().await.unwrap();
    assert_eq!(device.u32_at(3, 40151).await, Some(803));
    assert_eq!(
        session.read_register(&BMS_OPERATING_MODE).await.as_f64(),
        1438.0
    );
    assert_eq!(
        session.read_register(&EXTERNAL_POWER_CONTROL).await.as_f64(),
        803.0
    );
}

#[tokio::test]
async fn test_device_map_over_tcp() {
    let device = SimulatedDevice::new();
    device.set_u64(1, 42109, 0x0171_7A3B_1F2C_0003).await;
    device.set_u64(1, 42113, u64::MAX).await;
    let (_server, transport) = start(&device).await;
    let mut session = RegisterAccess::new(transport).with_unit_id(7);

    let entries = session.device_map().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].serial_number, 0x7A3B_1F2C);
    assert_eq!(session.unit_id(), 7);

    assert_eq!(session.set_default_unit_id().await, Some(3));
    assert_eq!(session.unit_id(), 3);
}

#[tokio::test]
async fn test_connection_refused() {
    // grab a free port, then close it again
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = ModbusTcpTransport::new("127.0.0.1", port)
        .with_timeouts(Duration::from_millis(500), Duration::from_millis(500));
    let mut session = RegisterAccess::new(transport);

    let err = session
        .try_read_register(&INVERTER_NOMINAL_POWER)
        .await
        .unwrap_err();
    assert!(matches!(err, SmaError::Transport(_)));
    assert!(session.read_register(&INVERTER_NOMINAL_POWER).await.is_invalid());
}

#[tokio::test]
async fn test_reconnects_after_disconnect() {
    let device = SimulatedDevice::new();
    device.set_u32(3, 30233, 2500).await;
    let (_server, transport) = start(&device).await;
    let mut session = RegisterAccess::new(transport);

    assert!(session.read_register(&INVERTER_NOMINAL_POWER).await.is_valid());
    session.adapter_mut().transport_mut().disconnect().await;
    assert!(!session.adapter().transport().is_connected());

    assert!(session.read_register(&INVERTER_NOMINAL_POWER).await.is_valid());
    assert!(session.adapter().transport().is_connected());
}

#[tokio::test]
async fn test_response_timeout_drops_connection() {
    // accepts connections and keeps them open without ever answering
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, mut accepted) = tokio::sync::mpsc::unbounded_channel();
    let acceptor = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            if tx.send(socket).is_err() {
                break;
            }
        }
    });

    let mut transport = ModbusTcpTransport::new("127.0.0.1", port)
        .with_timeouts(Duration::from_secs(2), Duration::from_millis(200));
    transport.connect().await.unwrap();

    let err = transport.read_words(3, 30233, 2).await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)));
    assert!(!transport.is_connected());

    transport.connect().await.unwrap();
    assert!(transport.is_connected());
    assert!(accepted.recv().await.is_some());
    assert!(accepted.recv().await.is_some());

    acceptor.abort();
}
