//! Typed property bindings against simulated and scripted devices.

mod common;

use common::session_over;
use labwire_core::mock::{mock_port, SimulatedDevice};
use labwire_core::{
    args, codec, Binding, Field, Instrument, LinkError, PropertyTable, PropertyType, Response,
    Terminator, Value,
};
use std::sync::Arc;
use std::time::Duration;

labwire_core::wire_token! {
    /// Field units
    pub enum Unit {
        Gauss => ("1", "Gauss"),
        Tesla => ("2", "Tesla"),
        Oersted => ("3", "Oersted"),
    }
}

labwire_core::wire_token! {
    /// AC bandwidth
    pub enum Bandwidth {
        Wide => ("1", "wide"),
        Narrow => ("2", "narrow"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Mode {
    mode: u8,
    filter: bool,
    bandwidth: Bandwidth,
}

fn mode_binding() -> Arc<Binding<Mode>> {
    Arc::new(
        Binding::new("measurement_mode", "RDGMODE?", |r: &Response| {
            let (mode, filter, bandwidth) = <(u8, bool, Bandwidth)>::parse_wire(&r.text())?;
            Ok(Mode {
                mode,
                filter,
                bandwidth,
            })
        })
        .settable_with("RDGMODE {mode}, {filter}, {bandwidth}", |m: &Mode| {
            Ok(args([
                ("mode", m.mode.format_wire()),
                ("filter", m.filter.format_wire()),
                ("bandwidth", m.bandwidth.format_wire()),
            ]))
        }),
    )
}

#[tokio::test]
async fn set_then_get_round_trips_every_scalar_kind() {
    let stream = SimulatedDevice::new(Terminator::lf()).spawn();
    let mut session = session_over(stream, Terminator::lf());

    let lock: Binding<bool> = Binding::read_write("keyboard_lock", "LOCK?", "LOCK {value}");
    let range: Binding<u8> = Binding::read_write("range", "RANGE?", "RANGE {value}");
    let setpoint: Binding<f64> = Binding::new("setpoint", "RELSP?", |r: &Response| {
        codec::float(&r.text())
    })
    .settable_with("RELSP {value}", |v: &f64| Ok(args([("value", codec::scientific(*v, 3))])));
    let label: Binding<String> = Binding::read_write("label", "NAME?", "NAME {value}");
    let unit: Binding<Unit> = Binding::read_write("unit", "UNIT?", "UNIT {value}");

    for value in [true, false] {
        lock.set(&mut session, &value).await.unwrap();
        assert_eq!(lock.get(&mut session).await.unwrap(), value);
    }

    range.set(&mut session, &3).await.unwrap();
    assert_eq!(range.get(&mut session).await.unwrap(), 3);

    setpoint.set(&mut session, &-0.0125).await.unwrap();
    assert_eq!(setpoint.get(&mut session).await.unwrap(), -0.0125);

    label.set(&mut session, &"probe A".to_string()).await.unwrap();
    assert_eq!(label.get(&mut session).await.unwrap(), "probe A");

    for variant in Unit::ALL {
        unit.set(&mut session, variant).await.unwrap();
        assert_eq!(unit.get(&mut session).await.unwrap(), *variant);
    }
}

#[tokio::test]
async fn composite_field_set_rewrites_whole_tuple() {
    let device = SimulatedDevice::new(Terminator::lf()).with_register("RDGMODE?", "1,0,2");
    let log = device.log();
    let mut session = session_over(device.spawn(), Terminator::lf());

    let whole = mode_binding();
    let mode = Field::new("mode", Arc::clone(&whole), |m: &Mode| m.mode, |m, v| m.mode = v);
    let bandwidth = Field::new(
        "bandwidth",
        Arc::clone(&whole),
        |m: &Mode| m.bandwidth,
        |m, v| m.bandwidth = v,
    );

    mode.set(&mut session, 2).await.unwrap();

    assert_eq!(mode.get(&mut session).await.unwrap(), 2);
    assert_eq!(bandwidth.get(&mut session).await.unwrap(), Bandwidth::Narrow);

    let log = log.lock().await.clone();
    assert_eq!(
        log,
        vec![
            "RDGMODE?",
            "RDGMODE 2, 0, 2",
            "RDGMODE?",
            "RDGMODE?",
        ]
    );
}

#[tokio::test]
async fn read_only_set_touches_nothing() {
    let (port, mut harness) = mock_port();
    let mut session = session_over(port, Terminator::lf());

    let field: Binding<f64> = Binding::read_only("field", "RDGFIELD?");
    let err = field.set(&mut session, &1.0).await.unwrap_err();
    assert!(matches!(err, LinkError::ReadOnly(ref name) if name == "field"));

    let err = field.update(&mut session, |v| *v += 1.0).await.unwrap_err();
    assert!(matches!(err, LinkError::ReadOnly(_)));

    harness.expect_silence(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn unparseable_response_is_parse_error_not_default() {
    let (port, mut harness) = mock_port();
    let mut session = session_over(port, Terminator::lf());
    let lock: Binding<bool> = Binding::read_write("keyboard_lock", "LOCK?", "LOCK {value}");

    let get = tokio::spawn(async move { lock.get(&mut session).await });
    harness.expect_and_respond(b"LOCK?\n", b"yes\n").await;

    match get.await.unwrap().unwrap_err() {
        LinkError::Parse { property, raw, .. } => {
            assert_eq!(property, "keyboard_lock");
            assert_eq!(raw, "yes");
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn instrument_access_by_name() {
    let device = SimulatedDevice::new(Terminator::lf())
        .with_register("RDGMODE?", "1,0,1")
        .with_register("RDGFIELD?", "+4.200E-01");
    let session = session_over(device.spawn(), Terminator::lf());

    let whole = mode_binding();
    let table = PropertyTable::new()
        .with(Arc::new(Binding::<f64>::read_only("field", "RDGFIELD?")))
        .with(Arc::new(Binding::<Unit>::read_write("unit", "UNIT?", "UNIT {value}")))
        .with(Arc::new(Field::new(
            "bandwidth",
            whole,
            |m: &Mode| m.bandwidth,
            |m, v| m.bandwidth = v,
        )));
    let instrument = Instrument::new("gaussmeter", session, table);

    assert_eq!(
        instrument.get_by_name("field").await.unwrap(),
        Value::Float(0.42)
    );

    instrument.set_by_name("unit", "tesla").await.unwrap();
    assert_eq!(
        instrument.get_by_name("unit").await.unwrap(),
        Value::Text("Tesla".into())
    );

    instrument.set_by_name("bandwidth", "narrow").await.unwrap();
    assert_eq!(
        instrument.get_by_name("bandwidth").await.unwrap(),
        Value::Text("narrow".into())
    );

    assert!(matches!(
        instrument.set_by_name("field", "1.0").await,
        Err(LinkError::ReadOnly(_))
    ));
    assert!(matches!(
        instrument.set_by_name("unit", "furlong").await,
        Err(LinkError::InvalidValue { .. })
    ));
    assert!(matches!(
        instrument.get_by_name("temperature").await,
        Err(LinkError::UnknownProperty(_))
    ));
}
