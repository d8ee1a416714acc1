mod common;

use std::thread;
use std::time::Duration;

use btbridge::backend::DiscoveryResult;
use btbridge::btuuid::{attributes, services};
use btbridge::error::ErrorKind;
use btbridge::{SecurityOptions, ServiceRecord, ServiceRecordHandle, Stack, StackConfig};
use common::{addr, init_tracing, Call, FakeStack};

fn serial_port_record(channel: u8) -> ServiceRecord {
    ServiceRecord::new()
        .with_attribute(attributes::SERVICE_RECORD_HANDLE, &[0x0a, 0x00, 0x01, 0x00, channel])
        .with_attribute(attributes::SERVICE_CLASS_ID_LIST, &[0x35, 0x03, 0x19, 0x11, 0x01])
        .with_attribute(
            attributes::PROTOCOL_DESCRIPTOR_LIST,
            &[0x35, 0x0c, 0x35, 0x03, 0x19, 0x01, 0x00, 0x35, 0x05, 0x19, 0x00, 0x03, 0x08, channel],
        )
}

fn records(channels: std::ops::Range<u8>) -> Vec<ServiceRecord> {
    channels.map(serial_port_record).collect()
}

fn stack_with_pool(capacity: usize) -> (FakeStack, Stack) {
    init_tracing();
    let fake = FakeStack::new();
    let config = StackConfig::default().with_discovery_pool_capacity(capacity);
    let stack = Stack::initialize(fake.clone(), config).unwrap();
    (fake, stack)
}

fn discover(fake: &FakeStack, stack: &Stack, records: Vec<ServiceRecord>) -> Vec<ServiceRecordHandle> {
    fake.set_discovery(DiscoveryResult::Success, records);
    let discovery = stack.start_service_discovery(addr(1), None).unwrap();
    fake.fire_discovery_complete();
    discovery.wait().unwrap()
}

fn channel_of(stack: &Stack, handle: ServiceRecordHandle) -> u8 {
    stack.service_record(handle).unwrap().unwrap().rfcomm_channel().unwrap()
}

#[test]
fn filtered_discovery_returns_records_and_sets_service_uuid() {
    let (fake, stack) = stack_with_pool(100);
    fake.set_discovery(DiscoveryResult::Success, records(1..4));

    let discovery = stack
        .start_service_discovery(addr(5), Some(services::SERIAL_PORT))
        .unwrap();
    assert_eq!(stack.client_service_uuid(), services::SERIAL_PORT);
    fake.fire_discovery_complete();
    let handles = discovery.wait().unwrap();

    assert_eq!(handles.iter().map(|h| h.index()).collect::<Vec<_>>(), [0, 1, 2]);
    assert_eq!(
        handles.iter().map(|&h| channel_of(&stack, h)).collect::<Vec<_>>(),
        [1, 2, 3]
    );
    assert_eq!(
        stack
            .service_attribute(handles[0], attributes::SERVICE_CLASS_ID_LIST)
            .unwrap()
            .as_deref(),
        Some(&[0x35, 0x03, 0x19, 0x11, 0x01][..])
    );
    assert_eq!(stack.service_attribute(handles[0], attributes::SERVICE_NAME).unwrap(), None);
    assert_eq!(
        fake.calls(),
        [
            Call::StartDiscovery(addr(5), Some(services::SERIAL_PORT)),
            Call::ReadRecords(3)
        ]
    );
}

#[test]
fn discovered_channel_is_used_to_connect() {
    let (fake, stack) = stack_with_pool(10);
    let handles = discover(&fake, &stack, records(9..10));
    let record = stack.service_record(handles[0]).unwrap().unwrap();
    assert_eq!(record.service_class_ids(), [services::SERIAL_PORT]);

    let channel = record.rfcomm_channel().unwrap();
    let connection = stack.open_connection(addr(1), channel, SecurityOptions::NONE).unwrap();
    assert!(fake.calls().contains(&Call::OpenClient(connection, 9, addr(1))));
    stack.close_connection(connection).unwrap();
}

#[test]
fn unfiltered_discovery_keeps_service_uuid() {
    let (fake, stack) = stack_with_pool(100);
    let before = stack.client_service_uuid();
    discover(&fake, &stack, records(1..2));
    assert_eq!(stack.client_service_uuid(), before);
}

#[test]
fn pool_wraps_and_stale_handles_see_newer_records() {
    let (fake, stack) = stack_with_pool(5);

    let first = discover(&fake, &stack, records(1..4));
    assert_eq!(first.iter().map(|h| h.index()).collect::<Vec<_>>(), [0, 1, 2]);

    let second = discover(&fake, &stack, records(11..14));
    assert_eq!(second.iter().map(|h| h.index()).collect::<Vec<_>>(), [0, 1, 2]);

    // The first discovery's handles now resolve to the second discovery's records.
    assert_eq!(channel_of(&stack, first[0]), 11);

    let third = discover(&fake, &stack, records(21..23));
    assert_eq!(third.iter().map(|h| h.index()).collect::<Vec<_>>(), [3, 4]);
    assert_eq!(channel_of(&stack, second[2]), 13);
}

#[test]
fn handles_outside_the_pool_are_rejected() {
    let (fake, stack) = stack_with_pool(5);
    discover(&fake, &stack, records(1..2));

    assert_eq!(
        stack.service_attribute(ServiceRecordHandle::from_index(3), 0).unwrap(),
        None
    );
    assert_eq!(stack.service_record(ServiceRecordHandle::from_index(3)).unwrap(), None);
    assert_eq!(
        stack
            .service_attribute(ServiceRecordHandle::from_index(5), 0)
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidHandle
    );
}

#[test]
fn more_records_than_the_pool_are_truncated() {
    let (fake, stack) = stack_with_pool(5);
    let handles = discover(&fake, &stack, records(1..9));
    assert_eq!(handles.len(), 5);
    assert!(fake.calls().contains(&Call::ReadRecords(5)));
}

#[test]
fn no_records_is_an_empty_result() {
    let (fake, stack) = stack_with_pool(5);
    assert!(discover(&fake, &stack, Vec::new()).is_empty());
    assert!(!fake.calls().iter().any(|c| matches!(c, Call::ReadRecords(_))));
}

#[test]
fn failed_discovery_reports_the_stack_result() {
    let (fake, stack) = stack_with_pool(5);
    fake.set_discovery(DiscoveryResult::ConnectRejected, Vec::new());
    let discovery = stack.start_service_discovery(addr(2), None).unwrap();
    fake.fire_discovery_complete();

    let err = discovery.wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Discovery(DiscoveryResult::ConnectRejected));
}

#[test]
fn reported_records_that_cannot_be_read_are_an_error() {
    let (fake, stack) = stack_with_pool(5);
    fake.set_discovery(DiscoveryResult::Success, Vec::new());
    fake.set_discovery_count(2);
    let discovery = stack.start_service_discovery(addr(2), None).unwrap();
    fake.fire_discovery_complete();

    let err = discovery.wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Stack);
    assert!(err.message().contains("expected 2"), "{err}");
}

#[test]
fn only_one_discovery_at_a_time() {
    let (fake, stack) = stack_with_pool(5);
    fake.set_discovery(DiscoveryResult::Success, records(1..2));
    let discovery = stack.start_service_discovery(addr(1), None).unwrap();
    assert_eq!(
        stack.start_service_discovery(addr(2), None).unwrap_err().kind(),
        ErrorKind::AlreadyDiscovering
    );
    fake.fire_discovery_complete();
    discovery.wait().unwrap();
    let _again = stack.start_service_discovery(addr(2), None).unwrap();
}

#[test]
fn abandoned_discovery_blocks_until_the_stack_finishes() {
    let (fake, stack) = stack_with_pool(5);
    fake.set_discovery(DiscoveryResult::Success, records(1..3));
    drop(stack.start_service_discovery(addr(1), None).unwrap());

    // The stack is still searching for the first device.
    assert_eq!(
        stack.start_service_discovery(addr(2), None).unwrap_err().kind(),
        ErrorKind::AlreadyDiscovering
    );
    fake.fire_discovery_complete();

    // Its late completion must not finish the next discovery.
    let discovery = stack.start_service_discovery(addr(2), None).unwrap();
    let waiter = thread::spawn(move || discovery.wait());
    thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished());

    fake.fire_discovery_complete();
    assert_eq!(waiter.join().unwrap().unwrap().len(), 2);
    assert_eq!(
        fake.calls(),
        [
            Call::StartDiscovery(addr(1), None),
            Call::StartDiscovery(addr(2), None),
            Call::ReadRecords(2)
        ]
    );
}

#[test]
fn completion_before_start_is_ignored() {
    let (fake, stack) = stack_with_pool(5);
    fake.set_discovery(DiscoveryResult::Success, records(1..3));
    fake.fire_discovery_complete();

    let discovery = stack.start_service_discovery(addr(1), None).unwrap();
    let waiter = thread::spawn(move || discovery.wait());
    thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished());

    fake.fire_discovery_complete();
    assert_eq!(waiter.join().unwrap().unwrap().len(), 2);
}

#[test]
fn discover_services_blocks_until_complete() {
    let (fake, stack) = stack_with_pool(5);
    fake.set_discovery(DiscoveryResult::Success, records(1..2));

    let completer = {
        let fake = fake.clone();
        thread::spawn(move || {
            fake.wait_for_call(&Call::StartDiscovery(addr(3), Some(services::OBEX_OBJECT_PUSH)));
            fake.fire_discovery_complete();
        })
    };

    let handles = stack
        .discover_services(addr(3), Some(services::OBEX_OBJECT_PUSH))
        .unwrap();
    assert_eq!(handles.len(), 1);
    completer.join().unwrap();
}

#[test]
fn teardown_wakes_discovery_waiter() {
    let (_fake, stack) = stack_with_pool(5);
    let discovery = stack.start_service_discovery(addr(1), None).unwrap();

    let waiter = thread::spawn(move || discovery.wait());
    thread::sleep(Duration::from_millis(50));
    stack.teardown();

    assert_eq!(waiter.join().unwrap().unwrap_err().kind(), ErrorKind::StackUnavailable);
    assert_eq!(
        stack.service_attribute(ServiceRecordHandle::from_index(0), 0).unwrap_err().kind(),
        ErrorKind::StackUnavailable
    );
}
