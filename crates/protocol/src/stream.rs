use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Typed identifier of a data stream a TPA can subscribe to.
///
/// Base tags carry no parameters; transcription and translation keys are
/// parameterized by BCP-47 language codes and compare structurally, so
/// `transcription:en-US` from two different TPAs is the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKey {
    ButtonPress,
    HeadPosition,
    PhoneNotification,
    NotificationDismissed,
    Vad,
    LocationUpdate,
    CalendarEvent,
    AudioChunk,
    GlassesBattery,
    PhoneBattery,
    Transcription { language: String },
    Translation { source: String, target: String },
}

impl StreamKey {
    pub fn transcription(language: impl Into<String>) -> Self {
        StreamKey::Transcription {
            language: language.into(),
        }
    }

    pub fn translation(source: impl Into<String>, target: impl Into<String>) -> Self {
        StreamKey::Translation {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Whether this stream requires the glasses microphone to be capturing.
    pub fn requires_microphone(&self) -> bool {
        matches!(
            self,
            StreamKey::Transcription { .. }
                | StreamKey::Translation { .. }
                | StreamKey::AudioChunk
                | StreamKey::Vad
        )
    }

    /// Whether this key names a per-language ASR stream.
    pub fn is_language_stream(&self) -> bool {
        matches!(
            self,
            StreamKey::Transcription { .. } | StreamKey::Translation { .. }
        )
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKey::ButtonPress => write!(f, "button_press"),
            StreamKey::HeadPosition => write!(f, "head_position"),
            StreamKey::PhoneNotification => write!(f, "phone_notification"),
            StreamKey::NotificationDismissed => write!(f, "notification_dismissed"),
            StreamKey::Vad => write!(f, "vad"),
            StreamKey::LocationUpdate => write!(f, "location_update"),
            StreamKey::CalendarEvent => write!(f, "calendar_event"),
            StreamKey::AudioChunk => write!(f, "audio_chunk"),
            StreamKey::GlassesBattery => write!(f, "glasses_battery"),
            StreamKey::PhoneBattery => write!(f, "phone_battery"),
            StreamKey::Transcription { language } => write!(f, "transcription:{language}"),
            StreamKey::Translation { source, target } => {
                write!(f, "translation:{source}-to-{target}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stream key: {0}")]
pub struct ParseStreamKeyError(pub String);

impl FromStr for StreamKey {
    type Err = ParseStreamKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(language) = s.strip_prefix("transcription:") {
            if language.is_empty() {
                return Err(ParseStreamKeyError(s.to_string()));
            }
            return Ok(StreamKey::transcription(language));
        }
        if let Some(pair) = s.strip_prefix("translation:") {
            return match pair.split_once("-to-") {
                Some((source, target)) if !source.is_empty() && !target.is_empty() => {
                    Ok(StreamKey::translation(source, target))
                }
                _ => Err(ParseStreamKeyError(s.to_string())),
            };
        }
        match s {
            "button_press" => Ok(StreamKey::ButtonPress),
            "head_position" => Ok(StreamKey::HeadPosition),
            "phone_notification" => Ok(StreamKey::PhoneNotification),
            "notification_dismissed" => Ok(StreamKey::NotificationDismissed),
            "vad" => Ok(StreamKey::Vad),
            "location_update" => Ok(StreamKey::LocationUpdate),
            "calendar_event" => Ok(StreamKey::CalendarEvent),
            "audio_chunk" => Ok(StreamKey::AudioChunk),
            "glasses_battery" => Ok(StreamKey::GlassesBattery),
            "phone_battery" => Ok(StreamKey::PhoneBattery),
            other => Err(ParseStreamKeyError(other.to_string())),
        }
    }
}

impl Serialize for StreamKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreamKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
