//! Google Cloud TTS voice selection.

use serde::{Deserialize, Serialize};

pub const DEFAULT_VOICE: &str = "en-US-Studio-O";

pub const VOICE_CATALOG: &[(&str, &str)] = &[
    ("studio_female", "en-US-Studio-O"),
    ("studio_male", "en-US-Studio-Q"),
    ("journey_male", "en-US-Journey-D"),
    ("journey_female", "en-US-Journey-F"),
    ("neural2_male", "en-US-Neural2-J"),
    ("neural2_female", "en-US-Neural2-F"),
    ("casual_male", "en-US-Casual-K"),
    ("news_female", "en-US-News-K"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SsmlGender {
    Male,
    Female,
}

/// The `voice` object of a synthesize request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettings {
    pub language_code: String,
    pub name: String,
    pub ssml_gender: SsmlGender,
}

impl VoiceSettings {
    fn en_us(name: &str, gender: SsmlGender) -> Self {
        Self {
            language_code: "en-US".to_string(),
            name: name.to_string(),
            ssml_gender: gender,
        }
    }

    /// Journey voices reject `<prosody>` entirely.
    pub fn supports_prosody(&self) -> bool {
        !self.name.contains("Journey")
    }

    /// Studio voices accept rate and volume but not pitch.
    pub fn supports_pitch(&self) -> bool {
        !self.name.contains("Studio")
    }
}

/// Named preset; unknown names resolve to `default`.
pub fn preset(name: &str) -> VoiceSettings {
    match name {
        "professional" => VoiceSettings::en_us("en-US-Studio-O", SsmlGender::Female),
        "conversational" => VoiceSettings::en_us("en-US-Journey-D", SsmlGender::Male),
        "news" => VoiceSettings::en_us("en-US-News-K", SsmlGender::Female),
        _ => VoiceSettings::en_us(DEFAULT_VOICE, SsmlGender::Female),
    }
}

/// Settings for a concrete voice name. Gender follows the voice letter
/// (O, F and K are female in the catalogue).
pub fn voice_by_name(name: &str) -> VoiceSettings {
    let gender = if name.ends_with(['O', 'F', 'K']) {
        SsmlGender::Female
    } else {
        SsmlGender::Male
    };
    VoiceSettings::en_us(name, gender)
}

/// Resolve a catalogue alias (`journey_male`) or pass a full voice name through.
pub fn resolve_voice(name_or_alias: &str) -> VoiceSettings {
    let name = VOICE_CATALOG
        .iter()
        .find(|(alias, _)| *alias == name_or_alias)
        .map(|(_, name)| *name)
        .unwrap_or(name_or_alias);
    voice_by_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_from_last_letter() {
        assert_eq!(voice_by_name("en-US-Studio-O").ssml_gender, SsmlGender::Female);
        assert_eq!(voice_by_name("en-US-Journey-D").ssml_gender, SsmlGender::Male);
        assert_eq!(voice_by_name("en-US-News-K").ssml_gender, SsmlGender::Female);
    }

    #[test]
    fn capability_flags() {
        let journey = voice_by_name("en-US-Journey-F");
        assert!(!journey.supports_prosody());
        let studio = voice_by_name("en-US-Studio-Q");
        assert!(studio.supports_prosody());
        assert!(!studio.supports_pitch());
        assert!(voice_by_name("en-US-Neural2-J").supports_pitch());
    }

    #[test]
    fn aliases_and_presets() {
        assert_eq!(resolve_voice("journey_male").name, "en-US-Journey-D");
        assert_eq!(resolve_voice("en-US-Wavenet-A").name, "en-US-Wavenet-A");
        assert_eq!(preset("nope").name, DEFAULT_VOICE);
    }

    #[test]
    fn serializes_in_request_shape() {
        let json = serde_json::to_value(voice_by_name("en-US-Studio-O")).unwrap();
        assert_eq!(json["languageCode"], "en-US");
        assert_eq!(json["ssmlGender"], "FEMALE");
    }
}
