//! Broker tests: sample windows, element blocks, cycle frames and the
//! copy path between module memory and shared signals.

use evo_signals::broker::selection::{blocks, parse_operation, parse_samples, sample_windows};
use evo_signals::broker::{Block, SampleWindow};
use evo_signals::prelude::*;

fn namespace(signals: Vec<SharedSignal>) -> SignalResult<DataSourceContainer> {
    let mut ns = DataSourceContainer::new();
    ns.add_data_source("DDB1")?;
    for signal in signals {
        ns.insert_signal(signal)?;
    }
    ns.allocate(&IntrospectionRegistry::new())?;
    Ok(ns)
}

fn fill_samples(ns: &mut DataSourceContainer, path: &str, slot: usize) -> SignalResult<()> {
    let id = ns.find(path).ok_or_else(|| SignalError::SignalNotFound {
        path: path.to_string(),
    })?;
    let signal = ns.signal_mut(id).ok_or_else(|| SignalError::SignalNotFound {
        path: path.to_string(),
    })?;
    for (i, chunk) in signal.slot_mut(slot)?.chunks_exact_mut(4).enumerate() {
        chunk.copy_from_slice(&(i as u32).to_ne_bytes());
    }
    Ok(())
}

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes(c.try_into().unwrap()))
        .collect()
}

#[test]
fn test_most_recent_sample_window() -> SignalResult<()> {
    let rows = parse_samples("X", "{{0, 0, 1}}")?;
    let windows = sample_windows("X", &rows, 10)?;
    assert_eq!(windows, vec![SampleWindow { begin: 9, count: 1 }]);
    Ok(())
}

#[test]
fn test_block_from_operation_row() -> SignalResult<()> {
    let rows = parse_operation("X", "{{2, 5}}")?;
    let selected = blocks("X", &rows, 4, 4, 10)?;
    assert_eq!(selected, vec![Block { begin_byte: 8, size: 16 }]);
    Ok(())
}

#[test]
fn test_two_cycle_read_footprint() -> SignalResult<()> {
    let ns = namespace(vec![
        SharedSignal::new("X", "DDB1.X", "uint32")
            .with_elements(3)
            .with_samples(10),
    ])?;
    let mut broker = MemoryMapBroker::new(BrokerKind::InputReader);
    let definition = SignalDefinition::leaf("X", "uint32")
        .with_path("DDB1.X")
        .with_dimensions("[3]")
        .with_cycles(2);
    broker.add_signal(&ns, &IntrospectionRegistry::new(), &definition, None)?;
    broker.finalise()?;

    assert!(broker.is_sync());
    assert_eq!(broker.get_signal_number_of_samples(0)?, 1);
    assert_eq!(broker.get_signal_size(0)?, 4 * 2 * 3);
    Ok(())
}

#[test]
fn test_second_sync_signal_keeps_earlier_entries() -> SignalResult<()> {
    let registry = IntrospectionRegistry::new();
    let ns = namespace(vec![
        SharedSignal::new("X", "DDB1.X", "uint32"),
        SharedSignal::new("Y", "DDB1.Y", "uint32"),
        SharedSignal::new("Z", "DDB1.Z", "uint32"),
    ])?;
    let mut broker = MemoryMapBroker::new(BrokerKind::InputReader);
    broker.add_signal(
        &ns,
        &registry,
        &SignalDefinition::leaf("X", "uint32").with_path("DDB1.X"),
        None,
    )?;
    broker.add_signal(
        &ns,
        &registry,
        &SignalDefinition::leaf("Y", "uint32").with_path("DDB1.Y").with_cycles(1),
        None,
    )?;
    let before = broker.entries().to_vec();

    let result = broker.add_signal(
        &ns,
        &registry,
        &SignalDefinition::leaf("Z", "uint32").with_path("DDB1.Z").with_cycles(1),
        None,
    );
    assert!(matches!(result, Err(SignalError::DuplicateSync { .. })));
    assert_eq!(broker.entries(), before.as_slice());

    broker.finalise()?;
    assert_eq!(broker.get_signal(1)?.offset, 4);
    Ok(())
}

#[test]
fn test_sampled_read_copies_window_and_blocks() -> SignalResult<()> {
    let registry = IntrospectionRegistry::new();
    let mut ns = namespace(vec![
        SharedSignal::new("X", "DDB1.X", "uint32")
            .with_elements(4)
            .with_samples(5),
    ])?;
    fill_samples(&mut ns, "DDB1.X", 0)?;

    // Last three samples, elements 1 and 3 of each.
    let definition = SignalDefinition::sampled("X", "uint32", "{{2, 0, 4}}")
        .with_path("DDB1.X")
        .with_dimensions("[2]")
        .with_operation("{{1, 1}, {3, 3}}");
    let mut broker = MemoryMapBroker::new(BrokerKind::InputReader);
    broker.add_signal(&ns, &registry, &definition, None)?;
    broker.finalise()?;
    assert_eq!(broker.get_signal_number_of_samples(0)?, 3);

    broker.read(&ns, 0)?;
    assert_eq!(words(broker.signal_bytes(0)?), vec![9, 11, 13, 15, 17, 19]);
    Ok(())
}

#[test]
fn test_write_then_read_round_trip() -> SignalResult<()> {
    let registry = IntrospectionRegistry::new();
    let mut ns = namespace(vec![SharedSignal::new("X", "DDB1.X", "uint32").with_elements(2)])?;
    let definition = SignalDefinition::leaf("X", "uint32")
        .with_path("DDB1.X")
        .with_dimensions("[2]");

    let mut writer = MemoryMapBroker::new(BrokerKind::OutputWriter);
    writer.add_signal(&ns, &registry, &definition, None)?;
    writer.finalise()?;
    let mut reader = MemoryMapBroker::new(BrokerKind::InputReader);
    reader.add_signal(&ns, &registry, &definition, None)?;
    reader.finalise()?;

    let out = writer.signal_bytes_mut(0)?;
    out[0..4].copy_from_slice(&7u32.to_ne_bytes());
    out[4..8].copy_from_slice(&8u32.to_ne_bytes());
    writer.write(&mut ns, 1)?;

    reader.read(&ns, 0)?;
    assert_eq!(words(reader.signal_bytes(0)?), vec![0, 0]);
    reader.read(&ns, 1)?;
    assert_eq!(words(reader.signal_bytes(0)?), vec![7, 8]);
    Ok(())
}

#[test]
fn test_structure_members_laid_out_by_offset() -> SignalResult<()> {
    let mut registry = IntrospectionRegistry::new();
    registry.register(
        "Pair",
        ClassInfo::introspectable(
            16,
            vec![
                IntrospectionMember::new("A", "uint32", 0, Dimensions::scalar()),
                IntrospectionMember::new("B", "uint32", 8, Dimensions::from_elements(&[2])),
            ],
        ),
    );
    let mut ns = DataSourceContainer::new();
    ns.add_data_source("DDB1")?;
    let pair = SignalDefinition::node(
        "P",
        "Pair",
        vec![
            SignalDefinition::leaf("A", "uint32"),
            SignalDefinition::leaf("B", "uint32").with_dimensions("[2]"),
        ],
    )
    .with_path("DDB1.P");
    let gam = Gam::new("G", &["Run"]).with_container(SignalsContainer::new(
        "In",
        Direction::INPUT,
        vec![pair],
    ));
    let bound = bind(&mut ns, &gam, &registry)?;
    ns.allocate(&registry)?;

    let mut broker = MemoryMapBroker::new(BrokerKind::InputReader);
    for definition in bound.signals(Direction::INPUT) {
        broker.add_signal(&ns, &registry, definition, None)?;
    }
    broker.add_signal(
        &ns,
        &registry,
        &SignalDefinition::leaf("T", "uint64").with_path("GAM_Times.G.AbsoluteUsecTime"),
        None,
    )?;
    broker.finalise()?;

    let (b, index) = broker.get_signal_by_name("P.B")?;
    assert_eq!(index, 1);
    assert_eq!(b.offset, 8);
    assert_eq!(b.size, 8);
    // The next signal starts after the whole structure.
    assert_eq!(broker.get_signal(2)?.offset, 16);
    Ok(())
}

#[test]
fn test_too_many_elements_rejected() -> SignalResult<()> {
    let ns = namespace(vec![SharedSignal::new("X", "DDB1.X", "uint32").with_elements(2)])?;
    let mut broker = MemoryMapBroker::new(BrokerKind::InputReader);
    let result = broker.add_signal(
        &ns,
        &IntrospectionRegistry::new(),
        &SignalDefinition::leaf("X", "uint32")
            .with_path("DDB1.X")
            .with_dimensions("[3]"),
        None,
    );
    assert!(matches!(
        result,
        Err(SignalError::TooManyElements { requested: 3, available: 2, .. })
    ));
    assert_eq!(broker.get_number_of_signals(), 0);
    Ok(())
}
