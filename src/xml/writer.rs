//! Writer für TerraView Session-Dokumente.

use super::session::SessionState;
use anyhow::Result;

/// Schreibt ein Session-Dokument als XML-String.
pub fn write_session_state(session: &SessionState) -> Result<String> {
    let mut output = String::new();
    output.push_str("<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?>\n");
    output.push_str("<TerraViewSession version=\"1\">\n");

    output.push_str("    <timeState>\n");
    if let Some(primary) = &session.time.primary {
        output.push_str(&format!(
            "        <primary>{}</primary>\n",
            primary.to_interval_string()
        ));
    }
    if !session.time.held.is_empty() {
        output.push_str("        <held>\n");
        for (constraint, span) in &session.time.held {
            match constraint {
                Some(key) => output.push_str(&format!(
                    "            <span constraint=\"{}\">{}</span>\n",
                    escape_xml(key),
                    span.to_interval_string()
                )),
                None => output.push_str(&format!(
                    "            <span>{}</span>\n",
                    span.to_interval_string()
                )),
            }
        }
        output.push_str("        </held>\n");
    }
    if let Some((fade_in, fade_out)) = &session.time.fade {
        output.push_str(&format!(
            "        <fade in=\"{}\" out=\"{}\"/>\n",
            fade_in.to_iso8601(),
            fade_out.to_iso8601()
        ));
    }
    output.push_str("    </timeState>\n");

    output.push_str("    <animationState>\n");
    output.push_str(&format!(
        "        <playState>{}</playState>\n",
        session.animation.play_state.as_tag()
    ));
    output.push_str(&format!(
        "        <millisPerFrame>{}</millisPerFrame>\n",
        session.animation.millis_per_frame
    ));
    output.push_str(&format!(
        "        <loopBehavior>{}</loopBehavior>\n",
        session.animation.loop_behavior.as_tag()
    ));
    if let Some(interval) = &session.animation.loop_interval {
        output.push_str(&format!(
            "        <loopInterval>{}</loopInterval>\n",
            interval.to_interval_string()
        ));
    }
    if let Some(advance) = &session.animation.advance_duration {
        output.push_str(&format!(
            "        <advanceDuration>{}</advanceDuration>\n",
            advance.to_iso8601()
        ));
    }
    if !session.animation.sequence.is_empty() {
        output.push_str("        <sequence>\n");
        for span in &session.animation.sequence {
            output.push_str(&format!(
                "            <span>{}</span>\n",
                span.to_interval_string()
            ));
        }
        output.push_str("        </sequence>\n");
    }
    output.push_str("    </animationState>\n");

    output.push_str("</TerraViewSession>\n");

    Ok(output)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Duration, TimeSpan};
    use crate::xml::session::TimeSessionState;

    #[test]
    fn test_escape_xml_special_chars() {
        assert_eq!(escape_xml("a&b<c>"), "a&amp;b&lt;c&gt;");
        assert_eq!(escape_xml("\"quoted\""), "&quot;quoted&quot;");
    }

    #[test]
    fn test_constraint_key_is_escaped() {
        let span = TimeSpan::parse_interval_string(
            "2024-05-01T00:00:00Z/2024-05-02T00:00:00Z",
        )
        .expect("Intervall gültig");
        let session = SessionState {
            time: TimeSessionState {
                primary: None,
                held: vec![(Some("layer<&>".to_string()), span)],
                fade: Some((Duration::seconds(2), Duration::seconds(3))),
            },
            ..SessionState::default()
        };

        let xml = write_session_state(&session).expect("Export fehlgeschlagen");
        assert!(xml.contains("constraint=\"layer&lt;&amp;&gt;\""));
        assert!(xml.contains("fade in=\"PT2S\" out=\"PT3S\""));
    }
}
