//! XML Import/Export für TerraView Session-Dokumente.
//!
//! Das Dokument hält den Zeitzustand (primäre Spanne als ISO-8601-
//! Intervall, gehaltene Spannen, Fade-Dauern) und den Animationszustand
//! (Abspielzustand, Frame-Dauer, Loop-Verhalten, Schrittfolge).

pub mod parser;
pub mod session;
pub mod writer;

pub use parser::parse_session_state;
pub use session::{AnimationSessionState, PlayState, SessionState, TimeSessionState};
pub use writer::write_session_state;
