// Browser adapter for the Web Speech API. Directives go in, events come
// back through the shared inbox: callbacks never touch engine state
// directly, because cancel() can fire end/error synchronously and a
// re-entrant borrow would be fatal. Handlers are detached before every
// cancel so our own teardown never echoes back as a failure.

use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    SpeechSynthesis, SpeechSynthesisErrorEvent, SpeechSynthesisEvent, SpeechSynthesisUtterance,
    SpeechSynthesisVoice,
};

use crate::types::{BoundaryUnit, Directive, ReelEvent, SessionId, VoiceInfo};
use crate::EventInbox;

/// Executes narration directives against `window.speechSynthesis` and feeds
/// the platform's callbacks back as events.
pub struct Narrator {
    synth: SpeechSynthesis,
    inbox: EventInbox,
    active: Option<ActiveUtterance>,
    hold: Option<HoldTimer>,
    _voices_changed: Closure<dyn FnMut()>,
}

/// Keeps the utterance and its handler closures alive together.
struct ActiveUtterance {
    utterance: SpeechSynthesisUtterance,
    _on_start: Closure<dyn FnMut(SpeechSynthesisEvent)>,
    _on_boundary: Closure<dyn FnMut(SpeechSynthesisEvent)>,
    _on_end: Closure<dyn FnMut(SpeechSynthesisEvent)>,
    _on_error: Closure<dyn FnMut(SpeechSynthesisErrorEvent)>,
}

struct HoldTimer {
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

impl Narrator {
    /// Bind to the platform synthesizer. Fails when the page has no window
    /// or no speech synthesis; the engine then runs silent and the host
    /// sees narration directives instead.
    pub fn connect(inbox: EventInbox) -> Result<Narrator, JsValue> {
        let window =
            web_sys::window().ok_or_else(|| JsValue::from_str("no window for narration"))?;
        let synth = window.speech_synthesis()?;

        let voices_changed = {
            let inbox = inbox.clone();
            let synth = synth.clone();
            Closure::wrap(Box::new(move || {
                push_voices(&inbox, &synth);
            }) as Box<dyn FnMut()>)
        };
        synth.set_onvoiceschanged(Some(voices_changed.as_ref().unchecked_ref()));

        let narrator = Narrator {
            synth,
            inbox,
            active: None,
            hold: None,
            _voices_changed: voices_changed,
        };
        // Some platforms have the voice set ready before the first
        // voiceschanged ever fires.
        push_voices(&narrator.inbox, &narrator.synth);
        Ok(narrator)
    }

    /// Perform one narration directive. Non-narration directives are not
    /// ours and pass through untouched.
    pub fn execute(&mut self, directive: &Directive) -> Result<(), JsValue> {
        match directive {
            Directive::Speak {
                session,
                text,
                voice,
                rate,
                pitch,
            } => self.speak(*session, text, voice, *rate, *pitch),
            Directive::PauseSpeech => {
                self.synth.pause();
                Ok(())
            }
            Directive::ResumeSpeech => {
                self.synth.resume();
                Ok(())
            }
            Directive::CancelSpeech => {
                self.teardown_utterance();
                Ok(())
            }
            Directive::ScheduleCompletion { session, delay_ms } => {
                self.schedule_completion(*session, *delay_ms)
            }
            Directive::FetchContent { .. } | Directive::ResolveImage { .. } => Ok(()),
        }
    }

    fn speak(
        &mut self,
        session: SessionId,
        text: &str,
        voice_name: &str,
        rate: f32,
        pitch: f32,
    ) -> Result<(), JsValue> {
        self.teardown_utterance();

        let utterance = SpeechSynthesisUtterance::new_with_text(text)?;
        if let Some(voice) = self.find_voice(voice_name) {
            utterance.set_voice(Some(&voice));
        }
        utterance.set_rate(rate);
        utterance.set_pitch(pitch);

        let on_start = {
            let inbox = self.inbox.clone();
            Closure::wrap(Box::new(move |_: SpeechSynthesisEvent| {
                inbox
                    .borrow_mut()
                    .push_back(ReelEvent::NarrationStarted { session });
            }) as Box<dyn FnMut(SpeechSynthesisEvent)>)
        };
        let on_boundary = {
            let inbox = self.inbox.clone();
            Closure::wrap(Box::new(move |event: SpeechSynthesisEvent| {
                inbox.borrow_mut().push_back(ReelEvent::NarrationBoundary {
                    session,
                    unit: boundary_unit(event.name().as_deref().unwrap_or("")),
                    char_index: event.char_index(),
                    char_length: char_length(&event),
                });
            }) as Box<dyn FnMut(SpeechSynthesisEvent)>)
        };
        let on_end = {
            let inbox = self.inbox.clone();
            Closure::wrap(Box::new(move |_: SpeechSynthesisEvent| {
                inbox
                    .borrow_mut()
                    .push_back(ReelEvent::NarrationEnded { session });
            }) as Box<dyn FnMut(SpeechSynthesisEvent)>)
        };
        let on_error = {
            let inbox = self.inbox.clone();
            Closure::wrap(Box::new(move |event: SpeechSynthesisErrorEvent| {
                inbox.borrow_mut().push_back(ReelEvent::NarrationFailed {
                    session,
                    reason: format!("{:?}", event.error()),
                });
            }) as Box<dyn FnMut(SpeechSynthesisErrorEvent)>)
        };

        utterance.set_onstart(Some(on_start.as_ref().unchecked_ref()));
        utterance.set_onboundary(Some(on_boundary.as_ref().unchecked_ref()));
        utterance.set_onend(Some(on_end.as_ref().unchecked_ref()));
        utterance.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        self.synth.speak(&utterance);
        self.active = Some(ActiveUtterance {
            utterance,
            _on_start: on_start,
            _on_boundary: on_boundary,
            _on_end: on_end,
            _on_error: on_error,
        });
        Ok(())
    }

    fn teardown_utterance(&mut self) {
        if let Some(active) = self.active.take() {
            active.utterance.set_onstart(None);
            active.utterance.set_onboundary(None);
            active.utterance.set_onend(None);
            active.utterance.set_onerror(None);
        }
        if self.synth.speaking() || self.synth.paused() || self.synth.pending() {
            self.synth.cancel();
        }
    }

    fn schedule_completion(&mut self, session: SessionId, delay_ms: u32) -> Result<(), JsValue> {
        self.clear_hold();
        let window =
            web_sys::window().ok_or_else(|| JsValue::from_str("no window for hold timer"))?;
        let callback = {
            let inbox = self.inbox.clone();
            Closure::wrap(Box::new(move || {
                inbox
                    .borrow_mut()
                    .push_back(ReelEvent::CompletionElapsed { session });
            }) as Box<dyn FnMut()>)
        };
        let handle = window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            delay_ms as i32,
        )?;
        self.hold = Some(HoldTimer {
            handle,
            _callback: callback,
        });
        Ok(())
    }

    fn clear_hold(&mut self) {
        if let Some(timer) = self.hold.take() {
            if let Some(window) = web_sys::window() {
                window.clear_timeout_with_handle(timer.handle);
            }
        }
    }

    fn find_voice(&self, name: &str) -> Option<SpeechSynthesisVoice> {
        self.synth
            .get_voices()
            .iter()
            .filter_map(|v| v.dyn_into::<SpeechSynthesisVoice>().ok())
            .find(|v| v.name() == name)
    }
}

impl Drop for Narrator {
    fn drop(&mut self) {
        self.teardown_utterance();
        self.clear_hold();
        self.synth.set_onvoiceschanged(None);
    }
}

fn push_voices(inbox: &EventInbox, synth: &SpeechSynthesis) {
    let voices: Vec<VoiceInfo> = synth
        .get_voices()
        .iter()
        .filter_map(|v| v.dyn_into::<SpeechSynthesisVoice>().ok())
        .map(|v| VoiceInfo {
            name: v.name(),
            lang: v.lang(),
        })
        .collect();
    // An empty set carries no information; the selector keeps its pick.
    if !voices.is_empty() {
        inbox
            .borrow_mut()
            .push_back(ReelEvent::VoicesChanged { voices });
    }
}

fn boundary_unit(name: &str) -> BoundaryUnit {
    match name {
        "word" => BoundaryUnit::Word,
        "sentence" => BoundaryUnit::Sentence,
        _ => BoundaryUnit::Other,
    }
}

/// `charLength` is missing from some engines' boundary events; treat absent
/// as zero rather than binding to it directly.
fn char_length(event: &SpeechSynthesisEvent) -> u32 {
    js_sys::Reflect::get(event.as_ref(), &JsValue::from_str("charLength"))
        .ok()
        .and_then(|v| v.as_f64())
        .map(|v| v as u32)
        .unwrap_or(0)
}

// ===== Console logging =====

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Route the `log` facade to the browser console.
pub(crate) fn init_logging() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let message = JsValue::from_str(&format!("{}", record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&message),
            log::Level::Warn => web_sys::console::warn_1(&message),
            _ => web_sys::console::log_1(&message),
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_units_map_from_event_names() {
        assert_eq!(boundary_unit("word"), BoundaryUnit::Word);
        assert_eq!(boundary_unit("sentence"), BoundaryUnit::Sentence);
        assert_eq!(boundary_unit("anything else"), BoundaryUnit::Other);
        // The bindings surface the event name as optional; an absent name
        // comes through as the empty string and stays progress-only.
        assert_eq!(boundary_unit(""), BoundaryUnit::Other);
    }
}
