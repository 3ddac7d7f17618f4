// Render model the host paints verbatim. Every layout decision that needs
// engine state is made here; the JS side maps fields to DOM and nothing else.

use serde::{Deserialize, Serialize};

use crate::session::{ReelSession, SessionPhase};
use crate::types::{AdSlide, DeckEntry, PlaybackPosition, SourceLink};

/// Progress shown for a slide whose image is still resolving, so the bar
/// reads as live before the first boundary lands.
const LOADING_PROGRESS_FLOOR: f32 = 0.05;

const SPONSORED_BADGE: &str = "Sponsored";

/// Everything the host needs to draw one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub error: Option<String>,
    /// Sponsored interstitial shown while the reel is being built.
    pub interstitial: Option<AdView>,
    pub attribution: Vec<SourceLink>,
    pub reel: Option<ReelView>,
}

/// The reel surface itself, present once playback can be shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReelView {
    pub slide_phase: SlidePhase,
    pub slide_number: u32,
    pub total_slides: u32,
    pub is_playing: bool,
    /// One entry per deck slot: 1.0 for finished slides, 0.0 for upcoming,
    /// the live value for the current one. Never empty.
    pub progress_segments: Vec<f32>,
    pub image: ImageView,
    pub overlay: OverlayView,
    pub tap_zones_enabled: bool,
}

/// Where the current slide is within its own little lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlidePhase {
    NoSlide,
    LoadingImage,
    ReadyPaused,
    ReadyPlaying,
    SlideFinished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ImageView {
    /// Resolved image (generated or placeholder fallback).
    Url { url: String },
    /// Image resolution still in flight.
    Loading,
    /// Nothing to show at all.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum OverlayView {
    Caption { spans: Vec<PhraseSpan> },
    Ad { ad: AdView },
    Empty,
}

/// One caption phrase with its highlight flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseSpan {
    pub text: String,
    pub active: bool,
}

/// Sponsored slide layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdView {
    pub badge: String,
    pub caption: String,
    pub advertiser: String,
    pub cta: String,
    /// Only set on the waiting interstitial.
    pub message: Option<String>,
}

/// Capture the current render model from the session.
pub fn render(session: &ReelSession) -> SessionView {
    let reel = match session.phase() {
        SessionPhase::Ready | SessionPhase::Finished => Some(render_reel(session)),
        _ => None,
    };
    SessionView {
        phase: session.phase(),
        error: session.error().map(str::to_string),
        interstitial: session.waiting_ad().map(|ad| ad_view(ad, true)),
        attribution: session.attribution().to_vec(),
        reel,
    }
}

fn render_reel(session: &ReelSession) -> ReelView {
    let controller = session.controller();
    let position = controller.position();
    let entry = controller.current_entry();
    let finished = session.phase() == SessionPhase::Finished;

    let slide_phase = match entry {
        None => SlidePhase::NoSlide,
        Some(_) if finished => SlidePhase::SlideFinished,
        Some(e) if e.image_url().is_none() => SlidePhase::LoadingImage,
        Some(_) if position.is_playing => SlidePhase::ReadyPlaying,
        Some(_) => SlidePhase::ReadyPaused,
    };

    let image = match entry {
        None => ImageView::Empty,
        Some(e) => match e.image_url() {
            Some(url) => ImageView::Url {
                url: url.to_string(),
            },
            None => ImageView::Loading,
        },
    };

    let overlay = match entry {
        None => OverlayView::Empty,
        Some(DeckEntry::Ad(ad)) => OverlayView::Ad {
            ad: ad_view(ad, false),
        },
        Some(DeckEntry::Content(slide)) => OverlayView::Caption {
            spans: slide
                .phrases
                .iter()
                .enumerate()
                .map(|(i, phrase)| PhraseSpan {
                    text: phrase.text.clone(),
                    active: position.phrase_index == Some(i),
                })
                .collect(),
        },
    };

    ReelView {
        slide_phase,
        slide_number: position.slide_number.as_u32(),
        total_slides: position.total_slides,
        is_playing: position.is_playing,
        progress_segments: progress_segments(controller.deck(), &position, finished),
        image,
        overlay,
        tap_zones_enabled: !finished && !controller.deck().is_empty(),
    }
}

fn progress_segments(deck: &[DeckEntry], position: &PlaybackPosition, finished: bool) -> Vec<f32> {
    // An empty deck still renders a single empty segment.
    let slots = deck.len().max(1);
    let current = position.slide_number.as_index();

    (0..slots)
        .map(|i| {
            if deck.is_empty() || i > current {
                0.0
            } else if i < current {
                1.0
            } else {
                current_segment(&deck[i], position, finished)
            }
        })
        .collect()
}

fn current_segment(entry: &DeckEntry, position: &PlaybackPosition, finished: bool) -> f32 {
    if entry.is_ad() || finished {
        return 1.0;
    }
    if !position.is_playing {
        return 0.0;
    }
    let progress = position.speech_progress.as_f32();
    if entry.image_url().is_none() {
        progress.max(LOADING_PROGRESS_FLOOR)
    } else {
        progress
    }
}

fn ad_view(ad: &AdSlide, waiting: bool) -> AdView {
    AdView {
        badge: SPONSORED_BADGE.to_string(),
        caption: ad.caption.clone(),
        advertiser: ad.advertiser.clone(),
        cta: ad.cta.clone(),
        message: if waiting {
            ad.message_while_waiting.clone()
        } else {
            None
        },
    }
}
