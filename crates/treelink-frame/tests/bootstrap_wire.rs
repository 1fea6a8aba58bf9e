use bytes::Bytes;
use treelink_frame::{
    encode_command, encode_notification, split_frames, FrameWriter, Reassembler, SequenceCounter,
    DEFAULT_MAX_PAYLOAD,
};
use treelink_tree::{ConfigTree, Value, CRC32_PATH, DIAGNOSTIC_PATH, TREE_PATH};

#[test]
fn bootstrap_addresses() {
    let tree = ConfigTree::bootstrap();
    let table: Vec<(u8, String)> = tree
        .address_table()
        .into_iter()
        .map(|e| (e.address, e.long_name))
        .collect();
    assert_eq!(
        table,
        vec![
            (0, CRC32_PATH.to_string()),
            (1, TREE_PATH.to_string()),
            (2, DIAGNOSTIC_PATH.to_string()),
        ]
    );
    assert_eq!(tree.node(tree.root()).address(), None);
}

#[test]
fn read_and_write_frames() {
    let tree = ConfigTree::bootstrap();
    assert_eq!(
        encode_command(&tree, "ADMIN:DIAGNOSTIC", DEFAULT_MAX_PAYLOAD).unwrap(),
        Bytes::from_static(&[0x02])
    );
    assert_eq!(
        encode_command(&tree, "ADMIN:CRC32 42", DEFAULT_MAX_PAYLOAD).unwrap(),
        Bytes::from_static(&[0x80, 0x2A, 0x00, 0x00, 0x00])
    );
}

#[test]
fn fragmented_string_notification() {
    let mut tree = ConfigTree::bootstrap();
    let mut reassembler = Reassembler::new();

    let first = reassembler
        .deliver(&[0x02, 0x00, 0x05, b'h', b'e'], &mut tree, None)
        .unwrap();
    assert!(first.is_empty());

    let second = reassembler.deliver(b"llo", &mut tree, None).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].address, 2);
    assert_eq!(second[0].value, Value::Str("hello".into()));
    assert!(reassembler.buffered().is_empty());
}

#[test]
fn sequence_counter_wraps() {
    let mut seq = SequenceCounter::default();
    for _ in 0..256 {
        seq.advance();
    }
    assert_eq!(seq.peek(), 0);
}

#[test]
fn host_and_instrument_agree() {
    let host = ConfigTree::bootstrap();
    let mut writer = FrameWriter::new(Vec::<Bytes>::new());
    writer.send_command(&host, "ADMIN:DIAGNOSTIC").unwrap();
    let sent = writer.into_inner();
    assert_eq!(sent, vec![Bytes::from_static(&[0x00, 0x02])]);

    let long = "x".repeat(40);
    let message = encode_notification(2, &Value::Str(long.clone())).unwrap();
    let mut tree = ConfigTree::bootstrap();
    let mut reassembler = Reassembler::new();
    let mut delivered = Vec::new();
    for frame in split_frames(&message, DEFAULT_MAX_PAYLOAD) {
        delivered.extend(reassembler.deliver(&frame, &mut tree, None).unwrap());
    }
    assert_eq!(delivered.len(), 1);
    assert_eq!(tree.value_at(DIAGNOSTIC_PATH), Some(&Value::Str(long)));
}
