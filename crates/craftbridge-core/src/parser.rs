//! Server log line parser
//!
//! Lines look like `[HH:MM:SS] [Server thread/INFO]: <payload>`. The payload is
//! tested against an ordered table of [`PatternRule`]s and the first rule that
//! matches produces the event. Rules never overlap-resolve beyond that order,
//! so more specific rules must come first.

use crate::error::{BridgeError, Result};
use crate::event::{AdvancementKind, ParsedEvent};
use regex::{Captures, Regex};

/// Cheap pre-filter: lines without this marker are never events
pub const INFO_MARKER: &str = "/INFO]: ";

/// Verb tokens that start a death/misadventure message.
///
/// This is an allow-list, not a grammar: messages starting with any other verb
/// are not reported.
pub const DEATH_VERBS: &[&str] = &[
    "was",
    "walked",
    "drowned",
    "died",
    "experienced",
    "blew",
    "hit",
    "fell",
    "went",
    "burned",
    "tried",
    "discovered",
    "froze",
    "starved",
    "suffocated",
    "left",
    "withered",
    "didn't",
];

/// Default server name used by the welcome template
pub const DEFAULT_SERVER_NAME: &str = "the server";

const ENVELOPE: &str = r"^\[\d{2}:\d{2}:\d{2}\] \[[^\]]*/INFO\]: (.*)$";
// Floodgate (Bedrock) players carry a leading dot.
const PLAYER: &str = r"\.?\w+";

/// One entry of the ordered rule table
pub struct PatternRule {
    /// Rule name, used in debug logs and tests
    pub name: &'static str,
    pattern: Regex,
    build: fn(&Captures<'_>) -> ParsedEvent,
}

impl PatternRule {
    fn new(
        name: &'static str,
        pattern: &str,
        build: fn(&Captures<'_>) -> ParsedEvent,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| BridgeError::Config(format!("invalid {} rule: {}", name, e)))?;
        Ok(Self {
            name,
            pattern,
            build,
        })
    }

    /// Try this rule against a line payload
    pub fn apply(&self, payload: &str) -> Option<ParsedEvent> {
        self.pattern.captures(payload).map(|caps| (self.build)(&caps))
    }
}

impl std::fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

fn group(caps: &Captures<'_>, index: usize) -> String {
    caps.get(index).map(|m| m.as_str().to_string()).unwrap_or_default()
}

/// Stateless log-line parser
#[derive(Debug)]
pub struct LineParser {
    envelope: Regex,
    rules: Vec<PatternRule>,
}

impl LineParser {
    /// Create a parser whose welcome rule is bound to `server_name`
    pub fn new(server_name: &str) -> Result<Self> {
        let verbs = DEATH_VERBS
            .iter()
            .map(|verb| regex::escape(verb))
            .collect::<Vec<_>>()
            .join("|");

        let rules = vec![
            PatternRule::new(
                "chat",
                r"^(?:\[[^\]]*\] )?<([^>]+)> (.*)$",
                |caps| ParsedEvent::Chat {
                    player: group(caps, 1),
                    message: group(caps, 2),
                },
            )?,
            PatternRule::new(
                "join",
                &format!(r"^({}) joined the game$", PLAYER),
                |caps| ParsedEvent::Join {
                    player: group(caps, 1),
                },
            )?,
            PatternRule::new(
                "leave",
                &format!(r"^({}) left the game$", PLAYER),
                |caps| ParsedEvent::Leave {
                    player: group(caps, 1),
                },
            )?,
            PatternRule::new(
                "welcome",
                &format!(r"^Welcome ({}) to ({})!$", PLAYER, regex::escape(server_name)),
                |caps| ParsedEvent::Welcome {
                    player: group(caps, 1),
                    server: group(caps, 2),
                },
            )?,
            PatternRule::new(
                "advancement",
                &format!(
                    r"^({}) (has made the advancement|has reached the goal|has completed the challenge) \[(.+)\]$",
                    PLAYER
                ),
                |caps| ParsedEvent::Advancement {
                    player: group(caps, 1),
                    kind: AdvancementKind::from_phrase(&group(caps, 2))
                        .unwrap_or(AdvancementKind::Advancement),
                    title: group(caps, 3),
                },
            )?,
            PatternRule::new(
                "death",
                &format!(r"^({}) ((?:{})(?:\s.*)?)$", PLAYER, verbs),
                |caps| ParsedEvent::Death {
                    player: group(caps, 1),
                    message: group(caps, 2),
                },
            )?,
        ];

        let envelope = Regex::new(ENVELOPE)
            .map_err(|e| BridgeError::Config(format!("invalid envelope: {}", e)))?;

        Ok(Self { envelope, rules })
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Parse one raw line; `None` means no rule matched
    pub fn parse(&self, line: &str) -> Option<ParsedEvent> {
        if !line.contains(INFO_MARKER) {
            return None;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        let payload = self.envelope.captures(line)?.get(1)?.as_str();

        self.rules.iter().find_map(|rule| rule.apply(payload))
    }
}
