// Strong typing over strings. Newtypes for slide positions, narration sessions,
// and clamped progress fractions.

use serde::{Deserialize, Serialize};

/// Narration session generation. Newtype for type safety: platform events are
/// stamped with the session they belong to, and stale sessions are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        SessionId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The session that follows this one.
    pub fn successor(&self) -> Self {
        SessionId(self.0 + 1)
    }
}

/// 1-indexed slide position as shown to the viewer. Newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlideNumber(u32);

impl SlideNumber {
    pub fn first() -> Self {
        SlideNumber(1)
    }

    pub fn from_index(index: usize) -> Self {
        SlideNumber(index as u32 + 1)
    }

    pub fn as_index(&self) -> usize {
        self.0.saturating_sub(1) as usize
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Progress fraction (0.0 to 1.0, clamped).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct Fraction(f32);

impl Fraction {
    pub const ZERO: Fraction = Fraction(0.0);
    pub const ONE: Fraction = Fraction(1.0);

    pub fn new(value: f32) -> Self {
        Fraction(value.clamp(0.0, 1.0))
    }

    pub fn as_f32(&self) -> f32 {
        self.0
    }
}

/// Opaque slide identifier from the generated script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlideId(String);

impl SlideId {
    pub fn new(id: impl Into<String>) -> Self {
        SlideId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One highlightable narration beat (3-6 words in the common case).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    pub text: String,
}

impl Phrase {
    pub fn new(text: impl Into<String>) -> Self {
        Phrase { text: text.into() }
    }
}

/// Generated content slide. `image_url` is set exactly once when resolution
/// completes (a placeholder counts as resolved).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slide {
    pub id: SlideId,
    pub caption: String,
    pub image_prompt: String,
    pub image_url: Option<String>,
    pub phrases: Vec<Phrase>,
}

/// Sponsored slide. Never narrated; its image is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdSlide {
    pub id: SlideId,
    pub image_url: String,
    pub caption: String,
    pub advertiser: String,
    pub cta: String,
    #[serde(default)]
    pub message_while_waiting: Option<String>,
}

/// Entry in the playback deck: generated content interleaved with sponsored
/// slides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeckEntry {
    Content(Slide),
    Ad(AdSlide),
}

impl DeckEntry {
    pub fn id(&self) -> &SlideId {
        match self {
            DeckEntry::Content(slide) => &slide.id,
            DeckEntry::Ad(ad) => &ad.id,
        }
    }

    pub fn caption(&self) -> &str {
        match self {
            DeckEntry::Content(slide) => &slide.caption,
            DeckEntry::Ad(ad) => &ad.caption,
        }
    }

    pub fn is_ad(&self) -> bool {
        matches!(self, DeckEntry::Ad(_))
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            DeckEntry::Content(slide) => slide.image_url.as_deref(),
            DeckEntry::Ad(ad) => Some(&ad.image_url),
        }
    }
}

/// Attribution entry for grounded search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub uri: String,
    pub title: String,
}

/// Raw grounding chunk as delivered by the content collaborator. Every
/// field is optional on the wire; only chunks carrying both a uri and a
/// title become `SourceLink`s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceChunk {
    #[serde(default)]
    pub web: Option<WebSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSource {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A synthesis voice as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub lang: String,
}

/// Where the viewer is in the reel. `phrase_index` is `None` when no phrase
/// is being narrated; it resets whenever the active slide changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub slide_number: SlideNumber,
    pub total_slides: u32,
    pub is_playing: bool,
    pub phrase_index: Option<usize>,
    pub speech_progress: Fraction,
}

/// The three tap regions laid over the reel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapZone {
    Previous,
    TogglePlay,
    Next,
}

/// Kind of boundary reported by the synthesis platform. Only word boundaries
/// advance the phrase highlight; all of them refresh progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryUnit {
    Word,
    Sentence,
    Other,
}

/// Engine configuration passed from JS.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub narration: NarrationSettings,
    #[serde(default)]
    pub ads: AdSettings,
}

/// Narration pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationSettings {
    /// Speech rate passed to the synthesizer.
    #[serde(default = "default_rate")]
    pub rate: f32,
    /// Speech pitch passed to the synthesizer.
    #[serde(default = "default_pitch")]
    pub pitch: f32,
    /// How long the full progress bar stays visible after an utterance ends
    /// before the slide is reported complete (milliseconds).
    #[serde(default = "default_completion_hold_ms")]
    pub completion_hold_ms: u32,
    /// Progress shown the instant narration starts, so the bar is visibly
    /// live before the first boundary arrives.
    #[serde(default = "default_start_epsilon")]
    pub start_epsilon: f32,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        NarrationSettings {
            rate: default_rate(),
            pitch: default_pitch(),
            completion_hold_ms: default_completion_hold_ms(),
            start_epsilon: default_start_epsilon(),
        }
    }
}

fn default_rate() -> f32 {
    1.15
}

fn default_pitch() -> f32 {
    1.0
}

fn default_completion_hold_ms() -> u32 {
    300
}

fn default_start_epsilon() -> f32 {
    0.01
}

/// Sponsored slide settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdSettings {
    /// Insert a sponsored slide after every `interval` content slides.
    /// 0 disables interleaving; the inventory then only serves as the
    /// waiting interstitial.
    #[serde(default)]
    pub interval: usize,
    #[serde(default)]
    pub inventory: Vec<AdSlide>,
}

/// Single event fed into the engine. Platform callbacks, collaborator
/// results, and viewer input all arrive through this one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReelEvent {
    /// Viewer submitted a query.
    SearchRequested { query: String },
    /// Content collaborator resolved with the raw generated script.
    ContentArrived {
        generation: u64,
        body: String,
        #[serde(default)]
        sources: Vec<SourceChunk>,
    },
    /// Content collaborator failed.
    ContentFailed { generation: u64, reason: String },
    /// Image collaborator resolved for one slide.
    ImageArrived { generation: u64, slide: SlideId, url: String },
    /// Image collaborator failed for one slide.
    ImageFailed { generation: u64, slide: SlideId, reason: String },
    /// Platform voice set changed (or was first delivered).
    VoicesChanged { voices: Vec<VoiceInfo> },
    /// Viewer tapped one of the three zones.
    Tapped { zone: TapZone },
    /// Viewer dismissed the error banner.
    ErrorDismissed,
    /// Viewer asked to replay the finished reel.
    RestartRequested,
    /// Utterance began speaking.
    NarrationStarted { session: SessionId },
    /// Synthesizer reached a boundary inside the utterance.
    NarrationBoundary {
        session: SessionId,
        unit: BoundaryUnit,
        char_index: u32,
        char_length: u32,
    },
    /// Utterance finished speaking.
    NarrationEnded { session: SessionId },
    /// Utterance failed or was interrupted by the platform.
    NarrationFailed { session: SessionId, reason: String },
    /// Completion hold timer fired.
    CompletionElapsed { session: SessionId },
}

/// Side effect the engine wants performed. Narration directives are executed
/// by the built-in adapter when connected; the rest go to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Directive {
    /// Speak `text` with the named voice. Always preceded by `CancelSpeech`
    /// when another utterance could be live.
    Speak {
        session: SessionId,
        text: String,
        voice: String,
        rate: f32,
        pitch: f32,
    },
    /// Pause the current utterance in place.
    PauseSpeech,
    /// Resume the paused utterance.
    ResumeSpeech,
    /// Cancel whatever the synthesizer holds.
    CancelSpeech,
    /// Fire `CompletionElapsed` for `session` after `delay_ms`.
    ScheduleCompletion { session: SessionId, delay_ms: u32 },
    /// Run the content collaborator for `query`.
    FetchContent { generation: u64, query: String },
    /// Run the image collaborator for one slide; the result must echo
    /// `generation` so a superseded query's late images are dropped.
    ResolveImage { generation: u64, slide: SlideId, prompt: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slide_number_index_round_trip() {
        let n = SlideNumber::from_index(4);
        assert_eq!(n.as_u32(), 5);
        assert_eq!(n.as_index(), 4);
        assert_eq!(SlideNumber::first().as_index(), 0);
    }

    #[test]
    fn fraction_clamps() {
        assert_eq!(Fraction::new(1.5), Fraction::ONE);
        assert_eq!(Fraction::new(-0.5), Fraction::ZERO);
        assert_eq!(Fraction::new(0.25).as_f32(), 0.25);
    }

    #[test]
    fn config_defaults_from_empty_json() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.narration.rate, 1.15);
        assert_eq!(config.narration.pitch, 1.0);
        assert_eq!(config.narration.completion_hold_ms, 300);
        assert_eq!(config.ads.interval, 0);
        assert!(config.ads.inventory.is_empty());
    }

    #[test]
    fn events_round_trip_through_json() {
        let event: ReelEvent = serde_json::from_str(
            r#"{"type":"NarrationBoundary","session":3,"unit":"word","char_index":12,"char_length":5}"#,
        )
        .unwrap();
        match event {
            ReelEvent::NarrationBoundary {
                session,
                unit,
                char_index,
                char_length,
            } => {
                assert_eq!(session, SessionId::new(3));
                assert_eq!(unit, BoundaryUnit::Word);
                assert_eq!(char_index, 12);
                assert_eq!(char_length, 5);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
