//! Broker copy-path benchmarks.
//!
//! Measures one `read()` / `write()` of a module with a scalar, an array,
//! a sampled ring window and an element-block selection.

use criterion::{Criterion, criterion_group, criterion_main};
use evo_signals::prelude::*;
use std::hint::black_box;

fn namespace() -> DataSourceContainer {
    let mut ns = DataSourceContainer::new();
    ns.add_data_source("DDB1").expect("data source");
    for signal in [
        SharedSignal::new("Scalar", "DDB1.Scalar", "uint32"),
        SharedSignal::new("Array", "DDB1.Array", "float64").with_elements(64),
        SharedSignal::new("Ring", "DDB1.Ring", "float32")
            .with_elements(8)
            .with_samples(100),
    ] {
        ns.insert_signal(signal).expect("insert");
    }
    ns.allocate(&IntrospectionRegistry::new()).expect("allocate");
    ns
}

fn definitions() -> Vec<SignalDefinition> {
    vec![
        SignalDefinition::leaf("Scalar", "uint32").with_path("DDB1.Scalar"),
        SignalDefinition::leaf("Array", "float64")
            .with_path("DDB1.Array")
            .with_dimensions("[64]"),
        SignalDefinition::sampled("Ring", "float32", "{{1, 0, 2}}")
            .with_path("DDB1.Ring")
            .with_dimensions("[8]"),
        SignalDefinition::leaf("Blocks", "float64")
            .with_path("DDB1.Array")
            .with_dimensions("[16]")
            .with_operation("{{0, 7}, {56, 63}}"),
    ]
}

fn broker(ns: &DataSourceContainer, kind: BrokerKind) -> MemoryMapBroker {
    let registry = IntrospectionRegistry::new();
    let mut broker = MemoryMapBroker::new(kind);
    for definition in definitions() {
        broker
            .add_signal(ns, &registry, &definition, None)
            .expect("add signal");
    }
    broker.finalise().expect("finalise");
    broker
}

fn bench_read(c: &mut Criterion) {
    let ns = namespace();
    let mut reader = broker(&ns, BrokerKind::InputReader);

    c.bench_function("broker_read_mixed", |b| {
        b.iter(|| {
            reader.read(black_box(&ns), 0).unwrap();
        });
    });
}

fn bench_write(c: &mut Criterion) {
    let mut ns = namespace();
    let mut writer = broker(&ns, BrokerKind::OutputWriter);

    c.bench_function("broker_write_mixed", |b| {
        b.iter(|| {
            writer.write(black_box(&mut ns), 0).unwrap();
        });
    });
}

criterion_group!(benches, bench_read, bench_write);
criterion_main!(benches);
