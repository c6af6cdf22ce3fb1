//! Wire compatibility tests
//!
//! Verify that frames produced by an ActiveMQ broker decode into events the
//! controller can route, and that acknowledgements echo the right headers.

use autotag_protocol::*;

/// A MESSAGE frame as delivered on a `client-individual` subscription.
fn broker_message(body: &str) -> Vec<u8> {
    format!(
        "MESSAGE\r\n\
         destination:/queue/alfresco.upload.events\r\n\
         message-id:ID\\cbroker-1-3\r\n\
         subscription:queue-consumer\r\n\
         ack:ID\\cbroker-1-3\r\n\
         content-type:application/json\r\n\
         content-length:{}\r\n\
         \r\n\
         {}\0",
        body.len(),
        body
    )
    .into_bytes()
}

#[test]
fn test_message_frame_yields_routable_event() {
    let body = r#"{"nodeRef":"workspace://SpacesStore/5c1f","eventType":"CONTENT_READY","path":"/Company Home/Courses/RealEstate/Module1/file.png"}"#;
    let mut buf = broker_message(body);

    let frame = Frame::decode(&mut buf).unwrap().expect("complete frame");
    assert_eq!(frame.command, Command::Message);
    assert_eq!(frame.get("ack"), Some("ID:broker-1-3"));

    let event = RepoEvent::from_json(&frame.body).unwrap();
    assert_eq!(event.event_type.job_kind(), Some(JobKind::Tagging));
    assert_eq!(event.node_id(), "5c1f");
}

#[test]
fn test_ack_echoes_message_headers() {
    let mut buf = broker_message(r#"{"nodeRef":"n","eventType":"NODE_DELETED"}"#);
    let frame = Frame::decode(&mut buf).unwrap().unwrap();

    let ack = Frame::ack(
        frame.get("ack").unwrap(),
        frame.get("subscription").unwrap(),
    );
    let mut wire = ack.encode();
    let decoded = Frame::decode(&mut wire).unwrap().unwrap();

    assert_eq!(decoded.command, Command::Ack);
    assert_eq!(decoded.get("id"), Some("ID:broker-1-3"));
    assert_eq!(decoded.get("subscription"), Some("queue-consumer"));
    assert!(decoded.body.is_empty());
}

#[test]
fn test_event_type_wire_names_are_stable() {
    let names = [
        (EventType::NodeCreated, "NODE_CREATED"),
        (EventType::ContentReady, "CONTENT_READY"),
        (EventType::BinaryChanged, "BINARY_CHANGED"),
        (EventType::MetadataChanged, "METADATA_CHANGED"),
        (EventType::AuditUpdated, "AUDIT_UPDATED"),
        (EventType::NodeDeleted, "NODE_DELETED"),
    ];
    for (event_type, wire) in names {
        assert_eq!(
            serde_json::to_value(event_type).unwrap(),
            serde_json::Value::String(wire.to_string())
        );
        assert_eq!(event_type.as_str(), wire);
    }
}
