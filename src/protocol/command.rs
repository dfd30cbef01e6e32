// ABOUTME: Media commands a controller can send to the group
// ABOUTME: Wire names, parsing and display for the command set

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A group media command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCommand {
    /// Start or resume playback
    Play,
    /// Pause playback
    Pause,
    /// Stop playback
    Stop,
    /// Skip to the next track
    Next,
    /// Go back to the previous track
    Previous,
    /// Set group volume
    Volume,
    /// Set group mute
    Mute,
    /// Disable repeat
    RepeatOff,
    /// Repeat the current track
    RepeatOne,
    /// Repeat the whole queue
    RepeatAll,
    /// Enable shuffle
    Shuffle,
    /// Disable shuffle
    Unshuffle,
    /// Move this player to the next group
    Switch,
}

impl MediaCommand {
    /// Every command, in wire order.
    pub const ALL: [MediaCommand; 13] = [
        MediaCommand::Play,
        MediaCommand::Pause,
        MediaCommand::Stop,
        MediaCommand::Next,
        MediaCommand::Previous,
        MediaCommand::Volume,
        MediaCommand::Mute,
        MediaCommand::RepeatOff,
        MediaCommand::RepeatOne,
        MediaCommand::RepeatAll,
        MediaCommand::Shuffle,
        MediaCommand::Unshuffle,
        MediaCommand::Switch,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaCommand::Play => "play",
            MediaCommand::Pause => "pause",
            MediaCommand::Stop => "stop",
            MediaCommand::Next => "next",
            MediaCommand::Previous => "previous",
            MediaCommand::Volume => "volume",
            MediaCommand::Mute => "mute",
            MediaCommand::RepeatOff => "repeat_off",
            MediaCommand::RepeatOne => "repeat_one",
            MediaCommand::RepeatAll => "repeat_all",
            MediaCommand::Shuffle => "shuffle",
            MediaCommand::Unshuffle => "unshuffle",
            MediaCommand::Switch => "switch",
        }
    }
}

impl fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a command name is not part of the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown media command '{}'", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for MediaCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaCommand::ALL
            .into_iter()
            .find(|command| command.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}
