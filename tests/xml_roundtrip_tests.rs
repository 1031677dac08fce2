use terraview_time_engine::{parse_session_state, write_session_state};

#[test]
fn test_session_roundtrip_preserves_all_fields() {
    let xml_content = include_str!("fixtures/demo_session.xml");

    let parsed = parse_session_state(xml_content).expect("Initiales Parsing fehlgeschlagen");
    let written_xml = write_session_state(&parsed).expect("XML-Export fehlgeschlagen");
    let reparsed = parse_session_state(&written_xml).expect("Re-Parsing fehlgeschlagen");

    assert_eq!(parsed, reparsed);
    assert_eq!(reparsed.time.held.len(), 2);
    assert_eq!(reparsed.animation.sequence.len(), 5);
}
