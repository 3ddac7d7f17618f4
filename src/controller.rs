// Playback coordination: one deck entry on stage, play or pause, narration
// kept in lockstep with whatever is showing. Slide changes are applied
// verbatim; deck bounds and advance policy belong to the session.

use crate::narration::{NarrationDriver, NarrationUpdate};
use crate::types::{
    BoundaryUnit, DeckEntry, Directive, NarrationSettings, PlaybackPosition, SessionId, SlideId,
    SlideNumber, VoiceInfo,
};

/// Coordinates the deck position, the playing flag, and the narration driver.
pub struct ReelController {
    deck: Vec<DeckEntry>,
    current: usize,
    is_playing: bool,
    voice: Option<VoiceInfo>,
    driver: NarrationDriver,
}

impl ReelController {
    pub fn new(settings: NarrationSettings) -> Self {
        ReelController {
            deck: Vec::new(),
            current: 0,
            is_playing: false,
            voice: None,
            driver: NarrationDriver::new(settings),
        }
    }

    pub fn deck(&self) -> &[DeckEntry] {
        &self.deck
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_entry(&self) -> Option<&DeckEntry> {
        self.deck.get(self.current)
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn voice(&self) -> Option<&VoiceInfo> {
        self.voice.as_ref()
    }

    pub fn position(&self) -> PlaybackPosition {
        PlaybackPosition {
            slide_number: SlideNumber::from_index(self.current),
            total_slides: self.deck.len() as u32,
            is_playing: self.is_playing,
            phrase_index: self.driver.phrase_index(),
            speech_progress: self.driver.progress(),
        }
    }

    /// Replace the deck and park on the first entry, stopped. The session
    /// decides when playback starts.
    pub fn load_deck(&mut self, deck: Vec<DeckEntry>) -> Vec<Directive> {
        self.deck = deck;
        self.current = 0;
        self.is_playing = false;
        self.driver.cancel()
    }

    /// Drop the deck entirely (new search, teardown).
    pub fn clear(&mut self) -> Vec<Directive> {
        self.deck.clear();
        self.current = 0;
        self.is_playing = false;
        self.driver.cancel()
    }

    /// Stop playback outright but keep the deck, so a finished reel can be
    /// replayed.
    pub fn stop(&mut self) -> Vec<Directive> {
        self.is_playing = false;
        self.driver.cancel()
    }

    /// Jump to `index`. The previous slide's narration is canceled before
    /// anything can be spoken for the new one, so no event from the old
    /// utterance reaches the new slide.
    pub fn go_to(&mut self, index: usize) -> Vec<Directive> {
        self.current = index;
        let mut directives = self.driver.cancel();
        directives.extend(self.sync());
        directives
    }

    pub fn set_playing(&mut self, playing: bool) -> Vec<Directive> {
        self.is_playing = playing;
        self.sync()
    }

    /// Adopt a newly selected voice. A real change mid-slide restarts the
    /// utterance from the top in the new voice; re-delivery of the same
    /// pick is inert.
    pub fn set_voice(&mut self, voice: VoiceInfo) -> Vec<Directive> {
        if self.voice.as_ref() == Some(&voice) {
            return Vec::new();
        }
        let had_voice = self.voice.is_some();
        self.voice = Some(voice);
        let mut directives = if had_voice {
            self.driver.cancel()
        } else {
            Vec::new()
        };
        directives.extend(self.sync());
        directives
    }

    /// Record a resolved image URL. Set exactly once per slide; later
    /// arrivals for the same slide are dropped.
    pub fn resolve_image(&mut self, slide: &SlideId, url: String) -> bool {
        for entry in &mut self.deck {
            if let DeckEntry::Content(s) = entry {
                if &s.id == slide {
                    if s.image_url.is_none() {
                        s.image_url = Some(url);
                        return true;
                    }
                    return false;
                }
            }
        }
        false
    }

    pub fn narration_started(&mut self, session: SessionId) -> NarrationUpdate {
        self.driver.on_started(session)
    }

    pub fn narration_boundary(
        &mut self,
        session: SessionId,
        unit: BoundaryUnit,
        char_index: u32,
        char_length: u32,
    ) -> NarrationUpdate {
        self.driver.on_boundary(session, unit, char_index, char_length)
    }

    pub fn narration_ended(&mut self, session: SessionId) -> (NarrationUpdate, Vec<Directive>) {
        self.driver.on_ended(session)
    }

    pub fn narration_failed(&mut self, session: SessionId, reason: &str) -> NarrationUpdate {
        self.driver.on_failed(session, reason)
    }

    pub fn completion_elapsed(&mut self, session: SessionId) -> NarrationUpdate {
        self.driver.on_completion_elapsed(session)
    }

    /// Bring narration in line with the stage: speak when a playable content
    /// slide is up and we are playing, pause when we are not, stay silent
    /// for ads, empty captions, and voiceless platforms.
    fn sync(&mut self) -> Vec<Directive> {
        let Some(entry) = self.deck.get(self.current) else {
            return self.driver.cancel();
        };
        let slide = match entry {
            DeckEntry::Ad(_) => return self.driver.cancel(),
            DeckEntry::Content(slide) => slide,
        };
        if slide.phrases.is_empty() {
            return self.driver.cancel();
        }
        let Some(voice) = self.voice.as_ref() else {
            return self.driver.cancel();
        };

        if self.is_playing {
            if self.driver.paused_with(&slide.caption) {
                self.driver.resume(&slide.caption)
            } else if !self.driver.engaged_with(&slide.caption) {
                self.driver.start(&slide.caption, &slide.phrases, &voice.name)
            } else {
                Vec::new()
            }
        } else {
            self.driver.pause()
        }
    }
}
