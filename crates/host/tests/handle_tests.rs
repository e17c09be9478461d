//! Device handle lifecycle tests against the mock transport

use common::test_utils::{MockBackend, MockCall, MockOp, multi_bus_backend, single_endpoint_backend};
use host::{AltSelector, ControlRequest, HandleState, Session};
use model::{UsbError, Value};
use std::time::Duration;

fn open_first(backend: MockBackend) -> (Session<MockBackend>, host::HandleId, MockBackend) {
    let probe = backend.clone();
    let mut session = Session::new(backend);
    let busses = session.busses().unwrap();
    let id = session.open(&busses[0].devices[0]).unwrap();
    probe.clear_calls();
    (session, id, probe)
}

mod claim {
    use super::*;

    #[test]
    fn test_claim_then_release() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        let handle = session.handle_mut(id).unwrap();

        assert_eq!(handle.state(), HandleState::Open);
        handle.claim_interface(0).unwrap();
        assert_eq!(handle.state(), HandleState::Claimed(0));
        handle.release_interface().unwrap();
        assert_eq!(handle.state(), HandleState::Open);

        assert_eq!(
            probe.calls(),
            vec![MockCall::ClaimInterface(0), MockCall::ReleaseInterface(0)]
        );
    }

    #[test]
    fn test_claim_by_descriptor() {
        let (mut session, id, probe) = open_first(multi_bus_backend());
        let busses = session.busses().unwrap();
        probe.clear_calls();
        let interface = &busses[0].devices[0].configurations[0].interfaces[0][0];

        session.handle_mut(id).unwrap().claim_interface(interface).unwrap();
        assert_eq!(probe.calls(), vec![MockCall::ClaimInterface(0)]);
    }

    #[test]
    fn test_second_claim_is_rejected_without_native_call() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        let handle = session.handle_mut(id).unwrap();

        handle.claim_interface(0).unwrap();
        assert_eq!(
            handle.claim_interface(1),
            Err(UsbError::InterfaceAlreadyClaimed { claimed: 0 })
        );
        assert_eq!(handle.claimed_interface(), Some(0));
        assert_eq!(probe.calls(), vec![MockCall::ClaimInterface(0)]);
    }

    #[test]
    fn test_release_without_claim() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        assert_eq!(
            session.handle_mut(id).unwrap().release_interface(),
            Err(UsbError::NoInterfaceClaimed)
        );
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn test_failed_claim_leaves_handle_open() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        probe.fail(MockOp::ClaimInterface, "resource busy");

        let handle = session.handle_mut(id).unwrap();
        assert_eq!(
            handle.claim_interface(0),
            Err(UsbError::transport("resource busy"))
        );
        assert_eq!(handle.state(), HandleState::Open);
    }

    #[test]
    fn test_failed_release_keeps_claim() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        let handle = session.handle_mut(id).unwrap();
        handle.claim_interface(0).unwrap();

        probe.fail(MockOp::ReleaseInterface, "no such device");
        assert!(handle.release_interface().is_err());
        assert_eq!(handle.state(), HandleState::Claimed(0));

        probe.clear_failure(MockOp::ReleaseInterface);
        handle.release_interface().unwrap();
        assert_eq!(handle.state(), HandleState::Open);
    }
}

mod teardown {
    use super::*;

    #[test]
    fn test_close_releases_then_closes() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        session.handle_mut(id).unwrap().claim_interface(0).unwrap();
        probe.clear_calls();

        session.close(id).unwrap();
        assert_eq!(
            probe.calls(),
            vec![MockCall::ReleaseInterface(0), MockCall::Close]
        );
        assert!(session.open_handles().is_empty());
    }

    #[test]
    fn test_close_without_claim_only_closes() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        session.close(id).unwrap();
        assert_eq!(probe.calls(), vec![MockCall::Close]);
    }

    #[test]
    fn test_close_proceeds_when_release_fails() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        session.handle_mut(id).unwrap().claim_interface(0).unwrap();
        probe.fail(MockOp::ReleaseInterface, "device gone");
        probe.clear_calls();

        session.close(id).unwrap();
        assert_eq!(
            probe.calls(),
            vec![MockCall::ReleaseInterface(0), MockCall::Close]
        );
    }

    #[test]
    fn test_closed_handle_is_gone() {
        let (mut session, id, _probe) = open_first(single_endpoint_backend(0x81));
        session.close(id).unwrap();
        assert_eq!(
            session.handle(id).unwrap_err(),
            UsbError::HandleClosed { handle: id.0 }
        );
        assert_eq!(
            session.close(id),
            Err(UsbError::HandleClosed { handle: id.0 })
        );
    }
}

mod open {
    use super::*;

    #[test]
    fn test_open_failure_passes_native_error() {
        let backend = single_endpoint_backend(0x81);
        backend.fail(MockOp::Open, "Access denied (insufficient permissions)");
        let mut session = Session::new(backend);
        let busses = session.busses().unwrap();

        assert_eq!(
            session.open(&busses[0].devices[0]),
            Err(UsbError::transport("Access denied (insufficient permissions)"))
        );
        assert!(session.open_handles().is_empty());
    }

    #[test]
    fn test_open_records_device() {
        let backend = multi_bus_backend();
        let probe = backend.clone();
        let mut session = Session::new(backend);
        let busses = session.busses().unwrap();

        let id = session.open(&busses[1].devices[0]).unwrap();
        assert_eq!(session.handle(id).unwrap().device().filename, "005");
        assert!(probe.calls().contains(&MockCall::Open {
            filename: "005".to_string()
        }));
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_set_configuration_by_value_and_descriptor() {
        let (mut session, id, probe) = open_first(multi_bus_backend());
        let busses = session.busses().unwrap();
        probe.clear_calls();
        let second = &busses[1].devices[0].configurations[1];

        let handle = session.handle_mut(id).unwrap();
        handle.set_configuration(1).unwrap();
        handle.set_configuration(second).unwrap();

        assert_eq!(
            probe.calls(),
            vec![MockCall::SetConfiguration(1), MockCall::SetConfiguration(2)]
        );
    }

    #[test]
    fn test_set_alt_interface_uses_claimed_interface() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        let handle = session.handle_mut(id).unwrap();

        assert_eq!(
            handle.set_alt_interface(1),
            Err(UsbError::NoInterfaceClaimed)
        );

        handle.claim_interface(0).unwrap();
        handle.set_alt_interface(AltSelector::Setting(1)).unwrap();
        assert_eq!(
            probe.calls(),
            vec![
                MockCall::ClaimInterface(0),
                MockCall::SetAltInterface {
                    interface: 0,
                    alternate: 1
                }
            ]
        );
    }

    #[test]
    fn test_set_alt_interface_by_descriptor() {
        let backend = multi_bus_backend();
        let probe = backend.clone();
        let mut session = Session::new(backend);
        let busses = session.busses().unwrap();
        let device = &busses[1].devices[0];
        let id = session.open(device).unwrap();
        probe.clear_calls();

        let alternate = &device.configurations[0].interfaces[0][1];
        session
            .handle_mut(id)
            .unwrap()
            .set_alt_interface(alternate)
            .unwrap();
        assert_eq!(
            probe.calls(),
            vec![MockCall::SetAltInterface {
                interface: 0,
                alternate: 1
            }]
        );
    }

    #[test]
    fn test_set_configuration_failure_passes_native_error() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        probe.fail(MockOp::SetConfiguration, "Resource busy");

        let handle = session.handle_mut(id).unwrap();
        assert_eq!(
            handle.set_configuration(1),
            Err(UsbError::transport("Resource busy"))
        );
        assert_eq!(handle.state(), HandleState::Open);
        assert_eq!(probe.calls(), vec![MockCall::SetConfiguration(1)]);
    }

    #[test]
    fn test_set_alt_interface_failure_keeps_claim() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        let handle = session.handle_mut(id).unwrap();
        handle.claim_interface(0).unwrap();
        probe.fail(MockOp::SetAltInterface, "Entity not found");

        assert_eq!(
            handle.set_alt_interface(AltSelector::Setting(2)),
            Err(UsbError::transport("Entity not found"))
        );
        assert_eq!(handle.state(), HandleState::Claimed(0));
        assert_eq!(
            probe.calls(),
            vec![
                MockCall::ClaimInterface(0),
                MockCall::SetAltInterface {
                    interface: 0,
                    alternate: 2
                }
            ]
        );
    }
}

mod control {
    use super::*;

    #[test]
    fn test_control_msg_sends_coerced_bytes() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        let request = ControlRequest::new(0x40, 0x01)
            .with_value(0x0102)
            .with_index(3);

        let n = session
            .handle_mut(id)
            .unwrap()
            .control_msg(&request, &Value::from("AB"))
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(
            probe.calls(),
            vec![MockCall::ControlMsg {
                request_type: 0x40,
                request: 0x01,
                value: 0x0102,
                index: 3,
                data: vec![0x41, 0x42],
                timeout_ms: 100,
            }]
        );
    }

    #[test]
    fn test_control_msg_coercion_failure_sends_nothing() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        let request = ControlRequest::new(0x40, 0x01);

        let result = session
            .handle_mut(id)
            .unwrap()
            .control_msg(&request, &Value::Seq(vec![Value::Int(1), Value::Float(2.5)]));

        assert!(matches!(result, Err(UsbError::InvalidArgument { .. })));
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn test_control_read_returns_device_bytes() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        probe.set_read_data(&[0x12, 0x01, 0x00, 0x02]);
        let request = ControlRequest::new(0x80, 0x06)
            .with_value(0x0100)
            .with_timeout(Duration::from_millis(500));

        let bytes = session
            .handle_mut(id)
            .unwrap()
            .control_read(&request, 18)
            .unwrap();

        assert_eq!(bytes, vec![0x12, 0x01, 0x00, 0x02]);
        match &probe.calls()[..] {
            [MockCall::ControlMsg {
                data, timeout_ms, ..
            }] => {
                assert_eq!(data.len(), 18);
                assert_eq!(*timeout_ms, 500);
            }
            other => panic!("unexpected calls: {:?}", other),
        }
    }

    #[test]
    fn test_control_read_rejects_out_request() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        let request = ControlRequest::new(0x00, 0x09);
        assert!(matches!(
            session.handle_mut(id).unwrap().control_read(&request, 8),
            Err(UsbError::InvalidArgument { .. })
        ));
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn test_control_failure_passes_native_error() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        probe.fail(MockOp::ControlMsg, "Pipe error");
        let request = ControlRequest::new(0x40, 0x01);
        assert_eq!(
            session
                .handle_mut(id)
                .unwrap()
                .control_msg(&request, &Value::Bytes(vec![1])),
            Err(UsbError::transport("Pipe error"))
        );
    }
}

mod transfers {
    use super::*;

    #[test]
    fn test_bulk_and_interrupt() {
        let (mut session, id, probe) = open_first(single_endpoint_backend(0x81));
        probe.set_read_data(&[9, 8, 7]);
        let handle = session.handle_mut(id).unwrap();
        let timeout = Duration::from_millis(100);

        assert_eq!(
            handle
                .bulk_write(0x02, &Value::from(vec![1, 2, 3, 4]), timeout)
                .unwrap(),
            4
        );
        assert_eq!(handle.bulk_read(0x81, 2, timeout).unwrap(), vec![9, 8]);
        assert_eq!(
            handle
                .interrupt_write(0x02, &Value::Seq(vec![Value::Int(5)]), timeout)
                .unwrap(),
            1
        );
        assert_eq!(
            handle.interrupt_read(0x81, 8, timeout).unwrap(),
            vec![9, 8, 7]
        );

        assert_eq!(
            probe.calls(),
            vec![
                MockCall::BulkWrite {
                    endpoint: 0x02,
                    data: vec![1, 2, 3, 4]
                },
                MockCall::BulkRead {
                    endpoint: 0x81,
                    length: 2
                },
                MockCall::InterruptWrite {
                    endpoint: 0x02,
                    data: vec![5]
                },
                MockCall::InterruptRead {
                    endpoint: 0x81,
                    length: 8
                },
            ]
        );
    }
}
