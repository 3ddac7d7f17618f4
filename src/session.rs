// Reel session lifecycle: search, script, images, playback, finish. One
// search generation at a time; results stamped with an older generation are
// discarded. Image resolution runs strictly one outstanding call at a time.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::content;
use crate::controller::ReelController;
use crate::narration::NarrationUpdate;
use crate::types::{
    AdSlide, DeckEntry, Directive, EngineConfig, ReelEvent, Slide, SlideId, SourceChunk,
    SourceLink, TapZone, VoiceInfo,
};
use crate::voice::select_voice;

/// Where the session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Searching,
    GeneratingImages,
    Ready,
    Error,
    Finished,
}

/// The whole reel session: lifecycle phase, deck construction, image
/// pipeline, attribution, and the playback controller underneath.
pub struct ReelSession {
    config: EngineConfig,
    phase: SessionPhase,
    generation: u64,
    attribution: Vec<SourceLink>,
    error: Option<String>,
    controller: ReelController,
    /// Content slides still waiting on images; the front entry is in flight.
    pending_images: VecDeque<(SlideId, String)>,
    awaiting_first_image: bool,
}

impl ReelSession {
    pub fn new(config: EngineConfig) -> Self {
        let controller = ReelController::new(config.narration.clone());
        ReelSession {
            config,
            phase: SessionPhase::Idle,
            generation: 0,
            attribution: Vec::new(),
            error: None,
            controller,
            pending_images: VecDeque::new(),
            awaiting_first_image: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attribution(&self) -> &[SourceLink] {
        &self.attribution
    }

    pub fn controller(&self) -> &ReelController {
        &self.controller
    }

    /// Sponsored slide shown while the reel is being built, if one is
    /// configured.
    pub fn waiting_ad(&self) -> Option<&AdSlide> {
        match self.phase {
            SessionPhase::Searching | SessionPhase::GeneratingImages => {
                self.config.ads.inventory.first()
            }
            _ => None,
        }
    }

    /// Apply one event and collect the side effects to perform.
    pub fn apply(&mut self, event: ReelEvent) -> Vec<Directive> {
        match event {
            ReelEvent::SearchRequested { query } => self.on_search(&query),
            ReelEvent::ContentArrived {
                generation,
                body,
                sources,
            } => self.on_content(generation, &body, &sources),
            ReelEvent::ContentFailed { generation, reason } => {
                self.on_content_failed(generation, reason)
            }
            ReelEvent::ImageArrived {
                generation,
                slide,
                url,
            } => self.on_image(generation, &slide, Some(url)),
            ReelEvent::ImageFailed {
                generation,
                slide,
                reason,
            } => {
                log::warn!("image generation failed for {}: {}", slide.as_str(), reason);
                self.on_image(generation, &slide, None)
            }
            ReelEvent::VoicesChanged { voices } => self.on_voices(&voices),
            ReelEvent::Tapped { zone } => self.on_tap(zone),
            ReelEvent::ErrorDismissed => self.on_error_dismissed(),
            ReelEvent::RestartRequested => self.on_restart(),
            ReelEvent::NarrationStarted { session } => {
                self.controller.narration_started(session);
                Vec::new()
            }
            ReelEvent::NarrationBoundary {
                session,
                unit,
                char_index,
                char_length,
            } => {
                self.controller
                    .narration_boundary(session, unit, char_index, char_length);
                Vec::new()
            }
            ReelEvent::NarrationEnded { session } => self.controller.narration_ended(session).1,
            ReelEvent::NarrationFailed { session, reason } => {
                let update = self.controller.narration_failed(session, &reason);
                self.complete_if(update)
            }
            ReelEvent::CompletionElapsed { session } => {
                let update = self.controller.completion_elapsed(session);
                self.complete_if(update)
            }
        }
    }

    fn complete_if(&mut self, update: NarrationUpdate) -> Vec<Directive> {
        if update == NarrationUpdate::Completed {
            self.advance()
        } else {
            Vec::new()
        }
    }

    fn on_search(&mut self, query: &str) -> Vec<Directive> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        self.generation += 1;
        self.phase = SessionPhase::Searching;
        self.error = None;
        self.attribution.clear();
        self.pending_images.clear();
        self.awaiting_first_image = false;
        log::info!("search started, generation {}", self.generation);

        let mut directives = self.controller.clear();
        directives.push(Directive::FetchContent {
            generation: self.generation,
            query: query.to_string(),
        });
        directives
    }

    fn on_content(
        &mut self,
        generation: u64,
        body: &str,
        sources: &[SourceChunk],
    ) -> Vec<Directive> {
        if generation != self.generation {
            log::debug!("dropping content result from stale generation {}", generation);
            return Vec::new();
        }
        match content::parse_slide_payload(body, generation) {
            Err(err) => self.fail(err.to_string()),
            Ok(slides) => {
                self.attribution = content::collect_source_links(sources);
                let deck = self.build_deck(slides);
                self.pending_images = deck
                    .iter()
                    .filter_map(|entry| match entry {
                        DeckEntry::Content(s) => Some((s.id.clone(), s.image_prompt.clone())),
                        DeckEntry::Ad(_) => None,
                    })
                    .collect();

                let mut directives = self.controller.load_deck(deck);
                self.phase = SessionPhase::GeneratingImages;
                self.awaiting_first_image = true;
                match self.next_image_request() {
                    Some(request) => directives.push(request),
                    None => directives.extend(self.enter_ready()),
                }
                directives
            }
        }
    }

    fn on_content_failed(&mut self, generation: u64, reason: String) -> Vec<Directive> {
        if generation != self.generation {
            return Vec::new();
        }
        self.fail(reason)
    }

    fn fail(&mut self, message: String) -> Vec<Directive> {
        log::warn!("reel session failed: {}", message);
        self.phase = SessionPhase::Error;
        self.error = Some(message);
        self.pending_images.clear();
        self.awaiting_first_image = false;
        self.controller.clear()
    }

    fn on_image(
        &mut self,
        generation: u64,
        slide: &SlideId,
        url: Option<String>,
    ) -> Vec<Directive> {
        // Script ids recur across queries, so the slide id alone cannot
        // tell an old query's late image from the current one.
        if generation != self.generation {
            log::debug!("dropping image result from stale generation {}", generation);
            return Vec::new();
        }
        let in_flight = self
            .pending_images
            .front()
            .map_or(false, |(front, _)| front == slide);
        if !in_flight {
            log::debug!("dropping image result for {}", slide.as_str());
            return Vec::new();
        }
        let Some((id, prompt)) = self.pending_images.pop_front() else {
            return Vec::new();
        };
        let url = url.unwrap_or_else(|| content::fallback_image_url(&prompt));
        self.controller.resolve_image(&id, url);

        let mut directives = Vec::new();
        if self.awaiting_first_image {
            self.awaiting_first_image = false;
            directives.extend(self.enter_ready());
        }
        if let Some(request) = self.next_image_request() {
            directives.push(request);
        }
        directives
    }

    fn next_image_request(&self) -> Option<Directive> {
        self.pending_images
            .front()
            .map(|(slide, prompt)| Directive::ResolveImage {
                generation: self.generation,
                slide: slide.clone(),
                prompt: prompt.clone(),
            })
    }

    fn enter_ready(&mut self) -> Vec<Directive> {
        self.phase = SessionPhase::Ready;
        log::info!(
            "reel ready: {} entries, generation {}",
            self.controller.deck().len(),
            self.generation
        );
        self.controller.set_playing(true)
    }

    fn on_voices(&mut self, voices: &[VoiceInfo]) -> Vec<Directive> {
        // An empty delivery never clobbers an earlier pick.
        match select_voice(voices) {
            Some(pick) => self.controller.set_voice(pick.clone()),
            None => Vec::new(),
        }
    }

    fn on_tap(&mut self, zone: TapZone) -> Vec<Directive> {
        match zone {
            TapZone::TogglePlay => {
                if self.phase == SessionPhase::Ready {
                    let playing = !self.controller.is_playing();
                    self.controller.set_playing(playing)
                } else {
                    Vec::new()
                }
            }
            TapZone::Previous => self.retreat(),
            TapZone::Next => self.advance(),
        }
    }

    /// Step back one slide, clamped at the first. Re-selecting the current
    /// slide would restart its narration, so the clamp is a true no-op.
    fn retreat(&mut self) -> Vec<Directive> {
        if self.phase != SessionPhase::Ready {
            return Vec::new();
        }
        let index = self.controller.current_index();
        if index == 0 {
            return Vec::new();
        }
        self.controller.go_to(index - 1)
    }

    /// Step forward one slide; walking off the end finishes the reel.
    fn advance(&mut self) -> Vec<Directive> {
        if self.phase != SessionPhase::Ready {
            return Vec::new();
        }
        let next = self.controller.current_index() + 1;
        if next < self.controller.deck().len() {
            self.controller.go_to(next)
        } else {
            self.finish()
        }
    }

    fn finish(&mut self) -> Vec<Directive> {
        log::info!("reel finished, generation {}", self.generation);
        self.phase = SessionPhase::Finished;
        self.controller.stop()
    }

    fn on_restart(&mut self) -> Vec<Directive> {
        if self.phase != SessionPhase::Finished {
            return Vec::new();
        }
        self.phase = SessionPhase::Ready;
        let mut directives = self.controller.go_to(0);
        directives.extend(self.controller.set_playing(true));
        directives
    }

    fn on_error_dismissed(&mut self) -> Vec<Directive> {
        if self.phase == SessionPhase::Error {
            self.phase = SessionPhase::Idle;
            self.error = None;
        }
        Vec::new()
    }

    fn build_deck(&self, slides: Vec<Slide>) -> Vec<DeckEntry> {
        let interval = self.config.ads.interval;
        let mut ads = self.config.ads.inventory.iter().cloned();
        let mut deck = Vec::with_capacity(slides.len());
        let mut since_ad = 0usize;

        for slide in slides {
            deck.push(DeckEntry::Content(slide));
            since_ad += 1;
            if interval > 0 && since_ad == interval {
                if let Some(ad) = ads.next() {
                    deck.push(DeckEntry::Ad(ad));
                    since_ad = 0;
                }
            }
        }
        deck
    }
}
