use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use treelink_session::{Instrument, Session, SessionError};
use treelink_transport::{channel_pair, FrameSource, LinkConfig};
use treelink_tree::{NodeDef, NodeType, Value, DIAGNOSTIC_PATH};

fn meter_def() -> NodeDef {
    NodeDef::plain(
        "",
        vec![
            NodeDef::plain(
                "ADMIN",
                vec![
                    NodeDef::value(NodeType::U32, "CRC32"),
                    NodeDef::value(NodeType::Bin, "TREE"),
                    NodeDef::value(NodeType::Str, "DIAGNOSTIC"),
                ],
            ),
            NodeDef::plain(
                "CH1",
                vec![
                    NodeDef::chooser(
                        "MAPPING",
                        vec![
                            NodeDef::plain("CURRENT", vec![]),
                            NodeDef::plain("TEMP", vec![]),
                        ],
                    ),
                    NodeDef::value(NodeType::Flt, "VALUE"),
                ],
            ),
            NodeDef::value(NodeType::Str, "NAME"),
        ],
    )
}

fn timeouts() -> LinkConfig {
    LinkConfig {
        read_timeout: Some(Duration::from_millis(20)),
        ..LinkConfig::default()
    }
}

#[test]
fn fetch_write_and_read_back() {
    let (host, device) = channel_pair();
    let mut host_rx = host.with_config(timeouts());
    let mut device = device.with_config(timeouts());

    let running = Arc::new(AtomicBool::new(true));
    let server = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut instrument = Instrument::new(&meter_def()).unwrap();
            instrument.serve(&mut device, &running).unwrap();
        })
    };

    let session = Session::new(host_rx.sender());
    session.load_tree(&mut host_rx, Duration::from_secs(5)).unwrap();
    assert_eq!(session.generation(), 1);
    assert!(session
        .address_table()
        .iter()
        .any(|e| e.long_name == "CH1:MAPPING" && e.address == 3));

    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    session
        .subscribe("NAME", Arc::new(move |_, v| sink.lock().unwrap().push(v.clone())))
        .unwrap();

    session.execute("name bench-7").unwrap();
    session.execute("CH1:MAPPING 1").unwrap();
    session.execute("CH1:VALUE").unwrap();
    while session.value_at("CH1:VALUE").is_none() {
        session.receive(&mut host_rx).ok();
    }

    assert_eq!(session.value_at("NAME"), Some(Value::Str("bench-7".into())));
    assert_eq!(session.chosen_name("CH1:MAPPING").unwrap(), "TEMP");
    assert_eq!(session.value_at("CH1:VALUE"), Some(Value::Float(0.0)));
    assert_eq!(*names.lock().unwrap(), vec![Value::Str("bench-7".into())]);

    running.store(false, Ordering::SeqCst);
    server.join().unwrap();
}

#[test]
fn load_tree_times_out_without_instrument() {
    let (host, _device) = channel_pair();
    let mut host_rx = host.with_config(timeouts());
    let session = Session::new(host_rx.sender());

    let err = session
        .load_tree(&mut host_rx, Duration::from_millis(60))
        .unwrap_err();
    assert!(matches!(err, SessionError::Timeout(_)));
    assert_eq!(session.generation(), 0);
    assert!(session.value_at(DIAGNOSTIC_PATH).is_none());
}

#[test]
fn unsolicited_notifications_reach_subscribers() {
    let (host, mut device) = channel_pair();
    let mut host_rx = host.with_config(timeouts());
    let session = Session::new(host_rx.sender());
    let mut instrument = Instrument::new(&meter_def()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session
        .subscribe(DIAGNOSTIC_PATH, Arc::new(move |_, v| sink.lock().unwrap().push(v.clone())))
        .unwrap();

    let text = "overrange on CH1, clamped to full scale";
    instrument
        .publish(DIAGNOSTIC_PATH, Value::Str(text.into()), &mut device)
        .unwrap();
    while seen.lock().unwrap().is_empty() {
        let frame = host_rx.recv_frame().unwrap();
        session.on_frame(&frame, None).unwrap();
    }
    assert_eq!(*seen.lock().unwrap(), vec![Value::Str(text.into())]);
}
