//! Parser für TerraView Session-Dokumente.

use super::session::{AnimationSessionState, PlayState, SessionState, TimeSessionState};
use crate::core::{Duration, LoopBehavior, TimeSpan};
use crate::shared::options::DEFAULT_CHANGE_RATE_MS;
use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Parsed ein Session-Dokument aus einem XML-String.
pub fn parse_session_state(xml_content: &str) -> Result<SessionState> {
    let mut reader = Reader::from_str(xml_content);
    reader.config_mut().trim_text(true);

    let mut buffer = Vec::new();

    let mut time = TimeSessionState::default();
    let mut animation = AnimationSessionState {
        millis_per_frame: DEFAULT_CHANGE_RATE_MS,
        ..AnimationSessionState::default()
    };

    let mut saw_root = false;
    let mut in_time = false;
    let mut in_animation = false;
    let mut in_held = false;
    let mut in_sequence = false;
    let mut current_tag: Option<String> = None;
    let mut current_constraint: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                let tag = reader.decoder().decode(name.as_ref())?;

                if tag == "TerraViewSession" {
                    saw_root = true;
                } else if tag == "timeState" {
                    in_time = true;
                } else if tag == "animationState" {
                    in_animation = true;
                } else if in_time && tag == "held" {
                    in_held = true;
                } else if in_animation && tag == "sequence" {
                    in_sequence = true;
                } else if (in_held || in_sequence) && tag == "span" {
                    current_tag = Some("span".to_string());
                    current_constraint = None;
                    if in_held {
                        for attr in e.attributes().with_checks(false) {
                            let attr = attr?;
                            let key = reader.decoder().decode(attr.key.as_ref())?;
                            if key == "constraint" {
                                current_constraint = Some(attr.unescape_value()?.into_owned());
                            }
                        }
                    }
                } else {
                    current_tag = Some(tag.to_string());
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.name();
                let tag = reader.decoder().decode(name.as_ref())?;
                if in_time && tag == "fade" {
                    let mut fade_in: Option<Duration> = None;
                    let mut fade_out: Option<Duration> = None;
                    for attr in e.attributes().with_checks(false) {
                        let attr = attr?;
                        let key = reader.decoder().decode(attr.key.as_ref())?;
                        let value = attr.unescape_value()?.into_owned();
                        if key == "in" {
                            fade_in = Some(
                                Duration::parse_iso8601(&value)
                                    .context("Ungueltige Fade-In-Dauer")?,
                            );
                        } else if key == "out" {
                            fade_out = Some(
                                Duration::parse_iso8601(&value)
                                    .context("Ungueltige Fade-Out-Dauer")?,
                            );
                        }
                    }
                    if let (Some(fade_in), Some(fade_out)) = (fade_in, fade_out) {
                        time.fade = Some((fade_in, fade_out));
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.xml_content()?.into_owned();

                if in_held && current_tag.as_deref() == Some("span") {
                    let span = TimeSpan::parse_interval_string(&text)
                        .context("Ungueltige gehaltene Spanne")?;
                    time.held.push((current_constraint.take(), span));
                } else if in_sequence && current_tag.as_deref() == Some("span") {
                    let span = TimeSpan::parse_interval_string(&text)
                        .context("Ungueltige Sequenz-Spanne")?;
                    animation.sequence.push(span);
                } else if in_time {
                    if current_tag.as_deref() == Some("primary") {
                        let span = TimeSpan::parse_interval_string(&text)
                            .context("Ungueltige primaere Spanne")?;
                        time.primary = Some(span);
                    }
                } else if in_animation {
                    match current_tag.as_deref() {
                        Some("playState") => {
                            animation.play_state = PlayState::from_tag(&text)
                                .with_context(|| format!("Unbekannter Abspielzustand: '{text}'"))?;
                        }
                        Some("millisPerFrame") => {
                            animation.millis_per_frame = text
                                .trim()
                                .parse::<u64>()
                                .with_context(|| format!("Ungueltige Frame-Dauer: '{text}'"))?;
                        }
                        Some("loopBehavior") => {
                            animation.loop_behavior = LoopBehavior::from_tag(&text)
                                .with_context(|| format!("Unbekanntes Loop-Verhalten: '{text}'"))?;
                        }
                        Some("loopInterval") => {
                            animation.loop_interval = Some(
                                TimeSpan::parse_interval_string(&text)
                                    .context("Ungueltiges Loop-Intervall")?,
                            );
                        }
                        Some("advanceDuration") => {
                            animation.advance_duration = Some(
                                Duration::parse_iso8601(&text)
                                    .context("Ungueltige Vorschub-Dauer")?,
                            );
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                let tag = reader.decoder().decode(name.as_ref())?;
                if tag == "timeState" {
                    in_time = false;
                } else if tag == "animationState" {
                    in_animation = false;
                } else if tag == "held" {
                    in_held = false;
                } else if tag == "sequence" {
                    in_sequence = false;
                } else if current_tag.as_deref() == Some(tag.as_ref()) || tag == "span" {
                    current_tag = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(err).context("Fehler beim Parsen des Session-XML"),
            _ => {}
        }

        buffer.clear();
    }

    if !saw_root {
        bail!("Kein <TerraViewSession>-Wurzelelement gefunden");
    }

    Ok(SessionState { time, animation })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_session() {
        let xml = r#"
        <TerraViewSession version="1">
            <timeState>
                <primary>2024-05-01T00:00:00Z/2024-05-02T00:00:00Z</primary>
                <held>
                    <span constraint="layer:roads">2024-05-01T06:00:00Z/2024-05-01T12:00:00Z</span>
                    <span>2024-05-01T00:00:00Z/2024-05-01T03:00:00Z</span>
                </held>
                <fade in="PT2S" out="PT3S"/>
            </timeState>
            <animationState>
                <playState>FORWARD</playState>
                <millisPerFrame>500</millisPerFrame>
                <loopBehavior>WRAP</loopBehavior>
                <sequence>
                    <span>2024-05-01T00:00:00Z/2024-05-01T01:00:00Z</span>
                    <span>2024-05-01T01:00:00Z/2024-05-01T02:00:00Z</span>
                </sequence>
            </animationState>
        </TerraViewSession>
        "#;

        let session = parse_session_state(xml).expect("Parsen fehlgeschlagen");
        assert!(session.time.primary.is_some());
        assert_eq!(session.time.held.len(), 2);
        assert_eq!(
            session.time.held[0].0.as_deref(),
            Some("layer:roads"),
            "Constraint-Schluessel erwartet"
        );
        assert!(session.time.held[1].0.is_none(), "Wildcard ohne Schluessel");
        assert_eq!(
            session.time.fade,
            Some((Duration::seconds(2), Duration::seconds(3)))
        );
        assert_eq!(session.animation.play_state, PlayState::Forward);
        assert_eq!(session.animation.millis_per_frame, 500);
        assert_eq!(session.animation.loop_behavior, LoopBehavior::Wrap);
        assert_eq!(session.animation.sequence.len(), 2);
    }

    #[test]
    fn test_parse_accepts_play_alias() {
        let xml = r#"
        <TerraViewSession version="1">
            <animationState>
                <playState>PLAY</playState>
            </animationState>
        </TerraViewSession>
        "#;

        let session = parse_session_state(xml).expect("Parsen fehlgeschlagen");
        assert_eq!(session.animation.play_state, PlayState::Forward);
    }

    #[test]
    fn test_parse_fails_without_root() {
        let err = parse_session_state("<anders/>").expect_err("Parser sollte fehlschlagen");
        let msg = format!("{err:#}");
        assert!(msg.contains("TerraViewSession"));
    }

    #[test]
    fn test_parse_fails_for_invalid_interval() {
        let xml = r#"
        <TerraViewSession version="1">
            <timeState>
                <primary>kein Intervall</primary>
            </timeState>
        </TerraViewSession>
        "#;

        let err = parse_session_state(xml).expect_err("Parser sollte fehlschlagen");
        let msg = format!("{err:#}");
        assert!(msg.contains("primaere Spanne"));
    }

    #[test]
    fn test_parse_continuous_fields() {
        let xml = r#"
        <TerraViewSession version="1">
            <animationState>
                <playState>STOP</playState>
                <loopInterval>2024-05-01T00:00:00Z/2024-05-03T00:00:00Z</loopInterval>
                <advanceDuration>PT1H</advanceDuration>
            </animationState>
        </TerraViewSession>
        "#;

        let session = parse_session_state(xml).expect("Parsen fehlgeschlagen");
        assert!(session.animation.loop_interval.is_some());
        assert_eq!(session.animation.advance_duration, Some(Duration::hours(1)));
    }
}
