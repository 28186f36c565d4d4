//! Chat-room events parsed from server log lines

use std::fmt;

/// Which completion phrase an advancement line used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancementKind {
    /// "has made the advancement"
    Advancement,
    /// "has reached the goal"
    Goal,
    /// "has completed the challenge"
    Challenge,
}

impl AdvancementKind {
    /// Phrase as it appears in the server log
    pub fn phrase(self) -> &'static str {
        match self {
            AdvancementKind::Advancement => "has made the advancement",
            AdvancementKind::Goal => "has reached the goal",
            AdvancementKind::Challenge => "has completed the challenge",
        }
    }

    /// Reverse of [`AdvancementKind::phrase`]
    pub fn from_phrase(phrase: &str) -> Option<Self> {
        match phrase {
            "has made the advancement" => Some(AdvancementKind::Advancement),
            "has reached the goal" => Some(AdvancementKind::Goal),
            "has completed the challenge" => Some(AdvancementKind::Challenge),
            _ => None,
        }
    }
}

/// A structured event extracted from one log line
///
/// Rendering is independent of parsing: `to_string()` always yields the single
/// display line forwarded to the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    /// Player chat message
    Chat { player: String, message: String },
    /// Player joined the server
    Join { player: String },
    /// Player left the server
    Leave { player: String },
    /// Server-specific welcome broadcast
    Welcome { player: String, server: String },
    /// Advancement, goal or challenge completion
    Advancement {
        player: String,
        kind: AdvancementKind,
        title: String,
    },
    /// Death or misadventure; `message` is everything after the player name
    Death { player: String, message: String },
}

impl ParsedEvent {
    /// Player the event is about
    pub fn player(&self) -> &str {
        match self {
            ParsedEvent::Chat { player, .. }
            | ParsedEvent::Join { player }
            | ParsedEvent::Leave { player }
            | ParsedEvent::Welcome { player, .. }
            | ParsedEvent::Advancement { player, .. }
            | ParsedEvent::Death { player, .. } => player,
        }
    }

    /// Short label used in logs
    pub fn category(&self) -> &'static str {
        match self {
            ParsedEvent::Chat { .. } => "chat",
            ParsedEvent::Join { .. } => "join",
            ParsedEvent::Leave { .. } => "leave",
            ParsedEvent::Welcome { .. } => "welcome",
            ParsedEvent::Advancement { .. } => "advancement",
            ParsedEvent::Death { .. } => "death",
        }
    }
}

impl fmt::Display for ParsedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedEvent::Chat { player, message } => write!(f, "[CHAT] <{}> {}", player, message),
            ParsedEvent::Join { player } => write!(f, "[INFO] {} joined the game", player),
            ParsedEvent::Leave { player } => write!(f, "[INFO] {} left the game", player),
            ParsedEvent::Welcome { player, server } => {
                write!(f, "[INFO] Welcome {} to {}!", player, server)
            }
            ParsedEvent::Advancement {
                player,
                kind,
                title,
            } => write!(f, "[INFO] {} {} [{}]", player, kind.phrase(), title),
            ParsedEvent::Death { player, message } => write!(f, "[INFO] {} {}", player, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_chat() {
        let event = ParsedEvent::Chat {
            player: "Steve".into(),
            message: "hello there".into(),
        };
        assert_eq!(event.to_string(), "[CHAT] <Steve> hello there");
    }

    #[test]
    fn test_render_advancement_keeps_phrase() {
        let event = ParsedEvent::Advancement {
            player: "Alex".into(),
            kind: AdvancementKind::Challenge,
            title: "Monsters Hunted".into(),
        };
        assert_eq!(
            event.to_string(),
            "[INFO] Alex has completed the challenge [Monsters Hunted]"
        );
        assert_eq!(event.category(), "advancement");
        assert_eq!(event.player(), "Alex");
    }

    #[test]
    fn test_phrase_lookup() {
        for kind in [
            AdvancementKind::Advancement,
            AdvancementKind::Goal,
            AdvancementKind::Challenge,
        ] {
            assert_eq!(AdvancementKind::from_phrase(kind.phrase()), Some(kind));
        }
        assert_eq!(AdvancementKind::from_phrase("has won"), None);
    }
}
