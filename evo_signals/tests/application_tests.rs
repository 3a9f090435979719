//! End-to-end tests: configure, state transitions and the copy path across
//! modules, plus loading an application file.

use std::io::Write;
use std::path::Path;

use evo_signals::prelude::*;
use tempfile::NamedTempFile;

fn producer_consumer() -> SignalResult<RealTimeApplication> {
    let mut ns = DataSourceContainer::new();
    ns.add_data_source("DDB1")?;
    let a = Gam::new("A", &["s1", "s2"]).with_container(SignalsContainer::new(
        "Outputs",
        Direction::OUTPUT,
        vec![SignalDefinition::leaf("X", "uint32").with_path("DDB1.X").with_default("1")],
    ));
    let b = Gam::new("B", &["s1"]).with_container(SignalsContainer::new(
        "Inputs",
        Direction::INPUT,
        vec![SignalDefinition::leaf("X", "uint32").with_path("DDB1.X")],
    ));
    Ok(RealTimeApplication::new("e2e", IntrospectionRegistry::new(), ns, vec![a, b]))
}

fn input_word(app: &RealTimeApplication, gam: &str) -> u32 {
    let broker = app.brokers(gam).and_then(|b| b.input.as_ref()).expect("input broker");
    let bytes = broker.signal_bytes(0).expect("entry 0");
    u32::from_ne_bytes(bytes[0..4].try_into().unwrap())
}

#[test]
fn test_default_visible_after_entering_state() -> SignalResult<()> {
    let mut app = producer_consumer()?;
    app.configure()?;

    app.prepare_next_state("s1")?;
    app.change_state()?;
    assert_eq!(app.state().current_state, "s1");
    assert_eq!(app.state().active_buffer, 1);

    app.read_inputs("B")?;
    assert_eq!(input_word(&app, "B"), 1);
    Ok(())
}

#[test]
fn test_output_reaches_consumer() -> SignalResult<()> {
    let mut app = producer_consumer()?;
    app.configure()?;
    app.prepare_next_state("s1")?;
    app.change_state()?;

    let output = app
        .brokers_mut("A")
        .and_then(|b| b.output.as_mut())
        .expect("output broker");
    output.signal_bytes_mut(0)?.copy_from_slice(&42u32.to_ne_bytes());
    app.write_outputs("A")?;
    app.read_inputs("B")?;
    assert_eq!(input_word(&app, "B"), 42);
    Ok(())
}

#[test]
fn test_value_kept_while_signal_stays_in_use() -> SignalResult<()> {
    let mut app = producer_consumer()?;
    app.configure()?;
    app.prepare_next_state("s1")?;
    app.change_state()?;

    let output = app
        .brokers_mut("A")
        .and_then(|b| b.output.as_mut())
        .expect("output broker");
    output.signal_bytes_mut(0)?.copy_from_slice(&42u32.to_ne_bytes());
    app.write_outputs("A")?;

    // A stays active in s2, so the default is not applied again.
    app.prepare_next_state("s2")?;
    app.change_state()?;
    let x = app.namespace().signal_by_path("DDB1.X")?;
    let slot = x.slot(app.state().active_buffer)?;
    assert_eq!(u32::from_ne_bytes(slot[0..4].try_into().unwrap()), 42);
    Ok(())
}

#[test]
fn test_unknown_module_rejected() -> SignalResult<()> {
    let mut app = producer_consumer()?;
    app.configure()?;
    assert!(matches!(
        app.read_inputs("Nope"),
        Err(SignalError::ModuleNotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_duplicate_module_name_rejected() -> SignalResult<()> {
    let mut ns = DataSourceContainer::new();
    ns.add_data_source("DDB1")?;
    let gam = Gam::new("A", &["s1"]);
    let mut app = RealTimeApplication::new("dup", IntrospectionRegistry::new(), ns, vec![gam.clone(), gam]);
    assert!(matches!(app.configure(), Err(SignalError::DuplicateModule { .. })));
    Ok(())
}

#[test]
fn test_template_fills_defaults() -> SignalResult<()> {
    let mut ns = DataSourceContainer::new();
    ns.add_data_source("DDB1")?;
    let mut gam = Gam::new("A", &["s1"]).with_container(SignalsContainer::new(
        "Outputs",
        Direction::OUTPUT,
        vec![SignalDefinition::leaf("X", "uint16").with_path("DDB1.X")],
    ));
    gam.template = Some("Defaults".into());
    let template = Gam::new("Defaults", &[]).with_container(SignalsContainer::new(
        "Outputs",
        Direction::empty(),
        vec![SignalDefinition::leaf("X", "").with_default("7")],
    ));

    let mut app = RealTimeApplication::new("tpl", IntrospectionRegistry::new(), ns, vec![gam])
        .with_templates([("Defaults".to_string(), template)].into_iter().collect());
    app.configure()?;
    assert_eq!(app.namespace().signal_by_path("DDB1.X")?.default_value, "7");
    Ok(())
}

#[test]
fn test_sample_application_file() -> SignalResult<()> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/pid_loop.toml");
    let config = ApplicationConfig::load(&path)?;
    let mut app = RealTimeApplication::from_config(&config)?;
    app.configure()?;
    app.prepare_next_state("Run")?;
    app.change_state()?;

    let pid = app.brokers("Pid").expect("Pid brokers");
    let history = pid.input.as_ref().expect("Pid inputs");
    let (_, index) = history.get_signal_by_name("History")?;
    assert_eq!(history.get_signal_number_of_samples(index)?, 5);

    let monitor = app.brokers("Monitor").and_then(|b| b.input.as_ref()).expect("Monitor inputs");
    assert!(monitor.is_sync());

    let limits = app.namespace().signal_by_path("DDB2.Track.Limits")?;
    let slot = limits.slot(app.state().active_buffer)?;
    assert_eq!(f32::from_ne_bytes(slot[0..4].try_into().unwrap()), -1.0);

    app.read_inputs("Pid")?;
    app.write_outputs("Pid")?;
    let plan = serde_json::to_string(&app.memory_plan()).unwrap();
    assert!(plan.contains("DDB1.Command"));
    Ok(())
}

#[test]
fn test_load_from_temp_file() -> SignalResult<()> {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[shared]
service_name = "tmp"

[data.DDB1]
"+X" = {{ Type = "uint8", Default = "5" }}

[gams.B]
States = ["s1"]
"+In" = {{ IsInput = true, "+X" = {{ Type = "uint8", Path = "DDB1.X" }} }}
"#
    )
    .unwrap();
    file.flush().unwrap();

    let config = ApplicationConfig::load(file.path())?;
    let mut app = RealTimeApplication::from_config(&config)?;
    app.configure()?;
    app.prepare_next_state("s1")?;
    app.change_state()?;
    app.read_inputs("B")?;

    let broker = app.brokers("B").and_then(|b| b.input.as_ref()).expect("input broker");
    assert_eq!(broker.signal_bytes(0)?, &[5u8]);
    Ok(())
}
