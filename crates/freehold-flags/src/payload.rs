//! Message, location, and command payloads

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use freehold_core::{BlockPos, PlayerId, WorldId};

use crate::error::ParseError;

/// Message text shown on region entry/exit
///
/// Stored with real line breaks; the wire form uses the two-character
/// sequences `\n` and `\r`, and a lone `~` for empty text. Placeholders
/// `%player%`, `%region%`, `%world%` are substituted at render time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextValue(String);

impl TextValue {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the wire form; never fails, any string is valid text
    pub fn decode(input: &str) -> Self {
        if input == "~" {
            return Self(String::new());
        }
        let mut text = String::with_capacity(input.len());
        let mut chars = input.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => text.push('\\'),
                }
            } else {
                text.push(c);
            }
        }
        Self(text)
    }

    /// Encode to the wire form
    pub fn encode(&self) -> String {
        if self.0.is_empty() {
            return "~".to_string();
        }
        self.0.replace('\n', "\\n").replace('\r', "\\r")
    }

    /// Substitute placeholders with the given context
    pub fn render(&self, player: &PlayerId, region: &str, world: &WorldId) -> String {
        self.0
            .replace("%player%", player.as_str())
            .replace("%region%", region)
            .replace("%world%", world.as_str())
    }
}

/// A teleport anchor: world, position, and facing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub world: WorldId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl Anchor {
    /// Decode `<world> <x> <y> <z> <yaw> <pitch>`
    pub fn decode(input: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        if tokens.len() != 6 {
            return Err(ParseError::InvalidLocation(format!(
                "expected 6 fields, got {}",
                tokens.len()
            )));
        }
        let world = WorldId::new(tokens[0])
            .map_err(|e| ParseError::InvalidLocation(e.to_string()))?;
        let parse_f64 = |token: &str, field: &str| {
            token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    ParseError::InvalidLocation(format!("bad {} value {:?}", field, token))
                })
        };
        let parse_f32 = |token: &str, field: &str| {
            token
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    ParseError::InvalidLocation(format!("bad {} value {:?}", field, token))
                })
        };
        Ok(Self {
            world,
            x: parse_f64(tokens[1], "x")?,
            y: parse_f64(tokens[2], "y")?,
            z: parse_f64(tokens[3], "z")?,
            yaw: parse_f32(tokens[4], "yaw")?,
            pitch: parse_f32(tokens[5], "pitch")?,
        })
    }

    /// Encode to the wire form
    pub fn encode(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.world, self.x, self.y, self.z, self.yaw, self.pitch
        )
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self {
            world: WorldId::default(),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

impl Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Who a region command runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandSender {
    Console,
    Player,
}

impl CommandSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandSender::Console => "console",
            CommandSender::Player => "player",
        }
    }
}

impl Display for CommandSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A command template run when a player enters or leaves a region
///
/// Tokens `%player%`, `%world%`, `%x%`, `%y%`, `%z%` are resolved at
/// execution time. An empty template is inert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub sender: CommandSender,
    pub template: String,
}

impl CommandSpec {
    pub fn console(template: impl Into<String>) -> Self {
        Self {
            sender: CommandSender::Console,
            template: template.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.template.is_empty()
    }

    /// Decode `<console|player>:<command text>`
    pub fn decode(input: &str) -> Result<Self, ParseError> {
        let (sender, template) = input
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidCommand("missing sender prefix".to_string()))?;
        let sender = match sender.trim() {
            "console" => CommandSender::Console,
            "player" => CommandSender::Player,
            other => {
                return Err(ParseError::InvalidCommand(format!(
                    "unknown sender {:?}",
                    other
                )));
            }
        };
        Ok(Self {
            sender,
            template: template.to_string(),
        })
    }

    /// Encode to the wire form
    pub fn encode(&self) -> String {
        format!("{}:{}", self.sender, self.template)
    }

    /// Resolve tokens against the triggering player and position
    pub fn render(&self, player: &PlayerId, world: &WorldId, pos: BlockPos) -> String {
        self.template
            .replace("%player%", player.as_str())
            .replace("%world%", world.as_str())
            .replace("%x%", &pos.x.to_string())
            .replace("%y%", &pos.y.to_string())
            .replace("%z%", &pos.z.to_string())
    }
}

impl Default for CommandSpec {
    /// The inert command: console sender, empty template
    fn default() -> Self {
        Self::console("")
    }
}
