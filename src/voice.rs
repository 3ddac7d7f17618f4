// Deterministic narration voice pick from whatever the platform reports.
// Exact preferred names in en-US then en-GB outrank everything else; the
// pick never flips for a fixed voice set.

use crate::types::VoiceInfo;

/// Known-good synthesis voices, best first. Plain read-only data.
pub const PREFERRED_VOICE_NAMES: [&str; 12] = [
    "Google US English",
    "Microsoft Zira - English (United States)",
    "Microsoft David - English (United States)",
    "Google UK English Female",
    "Google UK English Male",
    "Microsoft Hazel - English (Great Britain)",
    "Microsoft George - English (Great Britain)",
    "Alex",
    "Samantha",
    "Daniel",
    "Tessa",
    "Fiona",
];

/// Pick the narration voice from `voices`. `None` only when the set is
/// empty, so an empty voiceschanged delivery never clobbers an earlier pick.
pub fn select_voice(voices: &[VoiceInfo]) -> Option<&VoiceInfo> {
    if voices.is_empty() {
        return None;
    }

    // Exact preferred name in an exact locale, en-US before en-GB.
    for lang in ["en-US", "en-GB"] {
        for name in PREFERRED_VOICE_NAMES {
            if let Some(voice) = voices.iter().find(|v| v.name == name && v.lang == lang) {
                return Some(voice);
            }
        }
    }

    // Exact preferred name in any English locale.
    for name in PREFERRED_VOICE_NAMES {
        if let Some(voice) = voices
            .iter()
            .find(|v| v.name == name && v.lang.starts_with("en"))
        {
            return Some(voice);
        }
    }

    // Any English voice, best locale first, else whatever exists.
    voices
        .iter()
        .find(|v| v.lang.starts_with("en-US"))
        .or_else(|| voices.iter().find(|v| v.lang.starts_with("en-GB")))
        .or_else(|| voices.iter().find(|v| v.lang.starts_with("en")))
        .or_else(|| voices.first())
}
