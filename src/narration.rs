// Narration session driver. One logical session at a time: cancel before
// start, resume only into identical text, and platform events stamped with
// a superseded session id fall on the floor.

use crate::types::{BoundaryUnit, Directive, Fraction, NarrationSettings, Phrase, SessionId};

/// Where the live session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    /// Speak directive issued, platform has not reported start yet.
    Starting,
    Speaking,
    Paused,
    /// Utterance ended; progress pinned at 1 until the completion hold fires.
    Holding,
}

#[derive(Debug)]
struct Session {
    id: SessionId,
    text: String,
    /// Utterance length in UTF-16 code units, matching the platform's
    /// boundary offsets.
    text_units: usize,
    phrases: Vec<Phrase>,
    run: RunState,
    /// UTF-16 offset of the current phrase within the utterance text.
    phrase_start: usize,
    /// Index of the phrase the boundary scan currently sits in.
    phrase_cursor: usize,
}

/// What an applied narration event did, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationUpdate {
    /// Stale session, duplicate event, or no observable change.
    Ignored,
    /// Highlight or progress moved.
    Moved,
    /// Narration for the slide is over. Reported exactly once per session,
    /// for clean endings and failures alike.
    Completed,
}

/// Drives one utterance per content slide and tracks the highlight position
/// from synthesizer boundary callbacks.
pub struct NarrationDriver {
    settings: NarrationSettings,
    session: Option<Session>,
    next_session: SessionId,
    phrase_index: Option<usize>,
    progress: Fraction,
}

impl NarrationDriver {
    pub fn new(settings: NarrationSettings) -> Self {
        NarrationDriver {
            settings,
            session: None,
            next_session: SessionId::new(1),
            phrase_index: None,
            progress: Fraction::ZERO,
        }
    }

    /// Index of the phrase currently highlighted, if any.
    pub fn phrase_index(&self) -> Option<usize> {
        self.phrase_index
    }

    /// Utterance progress for the progress bar.
    pub fn progress(&self) -> Fraction {
        self.progress
    }

    /// Id of the live session, if one exists.
    pub fn active_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// True when a live session (in any run state) is bound to `text`.
    pub fn engaged_with(&self, text: &str) -> bool {
        self.session.as_ref().map_or(false, |s| s.text == text)
    }

    /// True when the live session is paused and bound to `text`.
    pub fn paused_with(&self, text: &str) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.run == RunState::Paused && s.text == text)
    }

    /// Begin a new session for `text`. Any live session is canceled first;
    /// its platform events become stale the moment the new id is minted.
    pub fn start(&mut self, text: &str, phrases: &[Phrase], voice: &str) -> Vec<Directive> {
        let mut directives = Vec::new();
        if self.session.is_some() {
            directives.push(Directive::CancelSpeech);
        }

        let id = self.next_session;
        self.next_session = id.successor();
        self.session = Some(Session {
            id,
            text: text.to_string(),
            text_units: text.encode_utf16().count(),
            phrases: phrases.to_vec(),
            run: RunState::Starting,
            phrase_start: 0,
            phrase_cursor: 0,
        });
        self.phrase_index = None;
        self.progress = Fraction::ZERO;

        directives.push(Directive::Speak {
            session: id,
            text: text.to_string(),
            voice: voice.to_string(),
            rate: self.settings.rate,
            pitch: self.settings.pitch,
        });
        directives
    }

    /// Pause in place. Position data is untouched so resume picks up exactly
    /// where the highlight stopped.
    pub fn pause(&mut self) -> Vec<Directive> {
        match self.session.as_mut() {
            Some(s) if matches!(s.run, RunState::Starting | RunState::Speaking) => {
                s.run = RunState::Paused;
                vec![Directive::PauseSpeech]
            }
            _ => Vec::new(),
        }
    }

    /// Resume the paused session, but only if it is still bound to `text`.
    /// A mismatch means the slide changed underneath; the caller should
    /// start fresh instead.
    pub fn resume(&mut self, text: &str) -> Vec<Directive> {
        match self.session.as_mut() {
            Some(s) if s.run == RunState::Paused && s.text == text => {
                s.run = RunState::Speaking;
                vec![Directive::ResumeSpeech]
            }
            _ => Vec::new(),
        }
    }

    /// Drop the session and zero the position. Emits a platform cancel only
    /// when something could actually be speaking.
    pub fn cancel(&mut self) -> Vec<Directive> {
        let had_session = self.session.take().is_some();
        self.phrase_index = None;
        self.progress = Fraction::ZERO;
        if had_session {
            vec![Directive::CancelSpeech]
        } else {
            Vec::new()
        }
    }

    /// Platform reported the utterance started speaking.
    pub fn on_started(&mut self, session: SessionId) -> NarrationUpdate {
        let Some(s) = self.session.as_mut().filter(|s| s.id == session) else {
            return NarrationUpdate::Ignored;
        };
        if s.run == RunState::Holding {
            return NarrationUpdate::Ignored;
        }
        // A start racing a pause keeps the paused run state.
        if s.run != RunState::Paused {
            s.run = RunState::Speaking;
        }
        s.phrase_start = 0;
        s.phrase_cursor = 0;
        let first_phrase = if s.phrases.is_empty() { None } else { Some(0) };
        self.phrase_index = first_phrase;
        self.progress = Fraction::new(self.settings.start_epsilon);
        NarrationUpdate::Moved
    }

    /// Platform reached a boundary inside the utterance. Word boundaries
    /// walk the phrase highlight; every boundary refreshes progress.
    pub fn on_boundary(
        &mut self,
        session: SessionId,
        unit: BoundaryUnit,
        char_index: u32,
        char_length: u32,
    ) -> NarrationUpdate {
        let Some(s) = self.session.as_mut().filter(|s| s.id == session) else {
            return NarrationUpdate::Ignored;
        };
        if s.run == RunState::Holding {
            return NarrationUpdate::Ignored;
        }

        let char_index = char_index as usize;
        let mut moved = false;

        if unit == BoundaryUnit::Word && !s.phrases.is_empty() {
            // Walk the cursor forward until the boundary sits inside the
            // current phrase. Offsets count UTF-16 units like the platform's
            // charIndex, cumulative over the text (+1 per joining space), so
            // a dropped boundary event cannot leave the highlight behind.
            while s.phrase_cursor < s.phrases.len() {
                let phrase_units = s.phrases[s.phrase_cursor].text.encode_utf16().count();
                if char_index < s.phrase_start + phrase_units {
                    break;
                }
                s.phrase_start += phrase_units + 1;
                s.phrase_cursor += 1;
            }
            // The trailing boundary lands past the last phrase; the
            // highlight stays there until the utterance ends.
            let target = s.phrase_cursor.min(s.phrases.len() - 1);
            if self.phrase_index != Some(target) {
                self.phrase_index = Some(target);
                moved = true;
            }
        }

        if s.text_units > 0 {
            let spoken = (char_index + char_length as usize) as f32;
            let next = Fraction::new(spoken / s.text_units as f32);
            if next != self.progress {
                self.progress = next;
                moved = true;
            }
        }

        if moved {
            NarrationUpdate::Moved
        } else {
            NarrationUpdate::Ignored
        }
    }

    /// Platform finished the utterance. Progress pins at 1 and the
    /// completion hold starts; the highlight stays on screen until the hold
    /// elapses.
    pub fn on_ended(&mut self, session: SessionId) -> (NarrationUpdate, Vec<Directive>) {
        let Some(s) = self.session.as_mut().filter(|s| s.id == session) else {
            return (NarrationUpdate::Ignored, Vec::new());
        };
        if s.run == RunState::Holding {
            return (NarrationUpdate::Ignored, Vec::new());
        }
        s.run = RunState::Holding;
        self.progress = Fraction::ONE;
        let directives = vec![Directive::ScheduleCompletion {
            session: s.id,
            delay_ms: self.settings.completion_hold_ms,
        }];
        (NarrationUpdate::Moved, directives)
    }

    /// Completion hold fired: the session is over.
    pub fn on_completion_elapsed(&mut self, session: SessionId) -> NarrationUpdate {
        let holding = self
            .session
            .as_ref()
            .map_or(false, |s| s.id == session && s.run == RunState::Holding);
        if !holding {
            return NarrationUpdate::Ignored;
        }
        self.session = None;
        self.phrase_index = None;
        NarrationUpdate::Completed
    }

    /// Platform reported an utterance failure. The slide completes
    /// immediately; a failed slide that blocks the reel is worse than one
    /// that goes silent.
    pub fn on_failed(&mut self, session: SessionId, reason: &str) -> NarrationUpdate {
        let matches = self.session.as_ref().map_or(false, |s| s.id == session);
        if !matches {
            return NarrationUpdate::Ignored;
        }
        log::warn!(
            "narration failed for session {}: {}",
            session.as_u64(),
            reason
        );
        self.session = None;
        self.phrase_index = None;
        self.progress = Fraction::ZERO;
        NarrationUpdate::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phrase::segment_caption;

    fn driver() -> NarrationDriver {
        NarrationDriver::new(NarrationSettings::default())
    }

    fn started_session(driver: &mut NarrationDriver, text: &str) -> SessionId {
        let phrases = segment_caption(text);
        driver.start(text, &phrases, "Google US English");
        let id = driver.active_session().unwrap();
        driver.on_started(id);
        id
    }

    #[test]
    fn first_start_speaks_without_cancel() {
        let mut d = driver();
        let directives = d.start("Hello there.", &segment_caption("Hello there."), "Samantha");
        assert_eq!(directives.len(), 1);
        assert!(matches!(
            &directives[0],
            Directive::Speak { text, voice, rate, pitch, .. }
                if text == "Hello there." && voice == "Samantha" && *rate == 1.15 && *pitch == 1.0
        ));
    }

    #[test]
    fn restart_cancels_previous_session_first() {
        let mut d = driver();
        d.start("first slide", &segment_caption("first slide"), "Samantha");
        let first = d.active_session().unwrap();

        let directives = d.start("second slide", &segment_caption("second slide"), "Samantha");
        assert!(matches!(directives[0], Directive::CancelSpeech));
        assert!(matches!(directives[1], Directive::Speak { .. }));
        assert_ne!(d.active_session().unwrap(), first);
    }

    #[test]
    fn started_pins_first_phrase_and_epsilon_progress() {
        let mut d = driver();
        started_session(&mut d, "A short caption to read.");
        assert_eq!(d.phrase_index(), Some(0));
        assert!((d.progress().as_f32() - 0.01).abs() < f32::EPSILON);
    }

    #[test]
    fn stale_session_events_do_nothing() {
        let mut d = driver();
        d.start("first slide", &segment_caption("first slide"), "Samantha");
        let stale = d.active_session().unwrap();
        d.start("second slide", &segment_caption("second slide"), "Samantha");

        assert_eq!(d.on_started(stale), NarrationUpdate::Ignored);
        let (update, directives) = d.on_ended(stale);
        assert_eq!(update, NarrationUpdate::Ignored);
        assert!(directives.is_empty());
        assert_eq!(
            d.on_boundary(stale, BoundaryUnit::Word, 0, 5),
            NarrationUpdate::Ignored
        );
        assert_eq!(d.phrase_index(), None);
    }

    #[test]
    fn word_boundaries_walk_the_phrases() {
        let mut d = driver();
        // Two phrases: "one two three" (13 chars) and "four five".
        let text = "one two three four five";
        let phrases = vec![Phrase::new("one two three"), Phrase::new("four five")];
        d.start(text, &phrases, "Samantha");
        let id = d.active_session().unwrap();
        d.on_started(id);
        assert_eq!(d.phrase_index(), Some(0));

        d.on_boundary(id, BoundaryUnit::Word, 4, 3); // "two"
        assert_eq!(d.phrase_index(), Some(0));

        d.on_boundary(id, BoundaryUnit::Word, 14, 4); // "four"
        assert_eq!(d.phrase_index(), Some(1));

        let update = d.on_boundary(id, BoundaryUnit::Word, 19, 4); // "five"
        assert_eq!(d.phrase_index(), Some(1));
        assert_eq!(update, NarrationUpdate::Moved);
        assert!((d.progress().as_f32() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn boundary_jump_lands_on_the_right_phrase() {
        // Three phrases; the platform drops the middle boundaries and the
        // next event lands two phrases ahead.
        let text = "one two three four five six seven eight";
        let phrases = vec![
            Phrase::new("one two three"),
            Phrase::new("four five six"),
            Phrase::new("seven eight"),
        ];
        let mut d = driver();
        d.start(text, &phrases, "Samantha");
        let id = d.active_session().unwrap();
        d.on_started(id);

        d.on_boundary(id, BoundaryUnit::Word, 28, 5); // "seven"
        assert_eq!(d.phrase_index(), Some(2));
    }

    #[test]
    fn boundary_offsets_are_utf16_units() {
        // Emoji take two UTF-16 units each; the platform indexes the
        // utterance in those units, not in scalar values.
        let text = "Fire 🔥 🔥 🔥 🔥 🔥 is hot. Water is not.";
        let phrases = vec![
            Phrase::new("Fire 🔥 🔥 🔥 🔥 🔥 is hot."),
            Phrase::new("Water is not."),
        ];
        let mut d = driver();
        d.start(text, &phrases, "Samantha");
        let id = d.active_session().unwrap();
        d.on_started(id);

        // "hot." begins at unit 23, still inside the 27-unit first phrase.
        d.on_boundary(id, BoundaryUnit::Word, 23, 4);
        assert_eq!(d.phrase_index(), Some(0));

        // "Water" begins right past the first phrase and its joining space.
        d.on_boundary(id, BoundaryUnit::Word, 28, 5);
        assert_eq!(d.phrase_index(), Some(1));
    }

    #[test]
    fn non_word_boundaries_only_refresh_progress() {
        let mut d = driver();
        let id = started_session(&mut d, "one two three four five six seven eight");
        let before = d.phrase_index();

        d.on_boundary(id, BoundaryUnit::Sentence, 20, 0);
        assert_eq!(d.phrase_index(), before);
        assert!(d.progress().as_f32() > 0.01);
    }

    #[test]
    fn boundary_progress_clamps_to_one() {
        let mut d = driver();
        let id = started_session(&mut d, "tiny");
        d.on_boundary(id, BoundaryUnit::Word, 0, 40);
        assert_eq!(d.progress(), Fraction::ONE);
    }

    #[test]
    fn ended_pins_progress_and_schedules_the_hold() {
        let mut d = driver();
        let id = started_session(&mut d, "A short caption to read.");

        let (update, directives) = d.on_ended(id);
        assert_eq!(update, NarrationUpdate::Moved);
        assert_eq!(d.progress(), Fraction::ONE);
        // Highlight stays pinned through the hold.
        assert_eq!(d.phrase_index(), Some(0));
        assert_eq!(
            directives,
            vec![Directive::ScheduleCompletion {
                session: id,
                delay_ms: 300
            }]
        );
    }

    #[test]
    fn completion_hold_reports_exactly_once() {
        let mut d = driver();
        let id = started_session(&mut d, "A short caption to read.");
        d.on_ended(id);

        assert_eq!(d.on_completion_elapsed(id), NarrationUpdate::Completed);
        assert_eq!(d.phrase_index(), None);
        assert_eq!(d.progress(), Fraction::ONE);

        // Duplicate timer fire and a spurious late end are both stale now.
        assert_eq!(d.on_completion_elapsed(id), NarrationUpdate::Ignored);
        let (update, directives) = d.on_ended(id);
        assert_eq!(update, NarrationUpdate::Ignored);
        assert!(directives.is_empty());
    }

    #[test]
    fn failure_completes_once_and_swallows_spurious_end() {
        let mut d = driver();
        let id = started_session(&mut d, "A short caption to read.");
        d.on_boundary(id, BoundaryUnit::Word, 2, 5);

        assert_eq!(d.on_failed(id, "synthesis-failed"), NarrationUpdate::Completed);
        assert_eq!(d.progress(), Fraction::ZERO);
        assert_eq!(d.phrase_index(), None);

        // The platform sometimes fires end after error; it must not produce
        // a second completion.
        let (update, directives) = d.on_ended(id);
        assert_eq!(update, NarrationUpdate::Ignored);
        assert!(directives.is_empty());
        assert_eq!(d.on_completion_elapsed(id), NarrationUpdate::Ignored);
    }

    #[test]
    fn pause_resume_keeps_position_and_checks_text() {
        let text = "one two three four five";
        let phrases = vec![Phrase::new("one two three"), Phrase::new("four five")];
        let mut d = driver();
        d.start(text, &phrases, "Samantha");
        let id = d.active_session().unwrap();
        d.on_started(id);
        d.on_boundary(id, BoundaryUnit::Word, 14, 4);
        let (index, progress) = (d.phrase_index(), d.progress());

        assert_eq!(d.pause(), vec![Directive::PauseSpeech]);
        assert!(d.paused_with(text));
        assert_eq!(d.phrase_index(), index);
        assert_eq!(d.progress(), progress);

        // Resume into different text is refused.
        assert!(d.resume("something else entirely").is_empty());
        assert!(d.paused_with(text));

        assert_eq!(d.resume(text), vec![Directive::ResumeSpeech]);
        assert!(!d.paused_with(text));
        assert_eq!(d.phrase_index(), index);
        assert_eq!(d.progress(), progress);
    }

    #[test]
    fn second_pause_is_inert() {
        let mut d = driver();
        started_session(&mut d, "A short caption to read.");
        assert_eq!(d.pause(), vec![Directive::PauseSpeech]);
        assert!(d.pause().is_empty());
    }

    #[test]
    fn cancel_zeroes_position_and_emits_once() {
        let mut d = driver();
        let id = started_session(&mut d, "A short caption to read.");
        d.on_boundary(id, BoundaryUnit::Word, 8, 7);

        assert_eq!(d.cancel(), vec![Directive::CancelSpeech]);
        assert_eq!(d.phrase_index(), None);
        assert_eq!(d.progress(), Fraction::ZERO);
        assert!(d.cancel().is_empty());
    }

    #[test]
    fn hold_delay_comes_from_settings() {
        let settings = NarrationSettings {
            completion_hold_ms: 120,
            ..Default::default()
        };
        let mut d = NarrationDriver::new(settings);
        let text = "A short caption to read.";
        d.start(text, &segment_caption(text), "Samantha");
        let id = d.active_session().unwrap();
        d.on_started(id);

        let (_, directives) = d.on_ended(id);
        assert_eq!(
            directives,
            vec![Directive::ScheduleCompletion {
                session: id,
                delay_ms: 120
            }]
        );
    }

    // ===== Property-Based Tests =====
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Ev {
            Started,
            Boundary(u32, u32),
            Ended,
            Failed,
            Elapsed,
        }

        fn event_strategy() -> impl Strategy<Value = Ev> {
            prop_oneof![
                Just(Ev::Started),
                (0u32..64, 0u32..12).prop_map(|(i, l)| Ev::Boundary(i, l)),
                Just(Ev::Ended),
                Just(Ev::Failed),
                Just(Ev::Elapsed),
            ]
        }

        proptest! {
            #[test]
            fn prop_at_most_one_completion_per_session(
                events in proptest::collection::vec(event_strategy(), 0..40)
            ) {
                let mut d = NarrationDriver::new(NarrationSettings::default());
                let text = "one two three four five six seven";
                d.start(text, &segment_caption(text), "Samantha");
                let id = d.active_session().unwrap();

                let mut completions = 0;
                for event in events {
                    let update = match event {
                        Ev::Started => d.on_started(id),
                        Ev::Boundary(i, l) => d.on_boundary(id, BoundaryUnit::Word, i, l),
                        Ev::Ended => d.on_ended(id).0,
                        Ev::Failed => d.on_failed(id, "synthesis-failed"),
                        Ev::Elapsed => d.on_completion_elapsed(id),
                    };
                    if update == NarrationUpdate::Completed {
                        completions += 1;
                    }
                }
                prop_assert!(completions <= 1);
            }

            #[test]
            fn prop_progress_stays_in_unit_range(
                events in proptest::collection::vec(event_strategy(), 0..40)
            ) {
                let mut d = NarrationDriver::new(NarrationSettings::default());
                let text = "one two three four five six seven";
                d.start(text, &segment_caption(text), "Samantha");
                let id = d.active_session().unwrap();

                for event in events {
                    match event {
                        Ev::Started => { d.on_started(id); }
                        Ev::Boundary(i, l) => { d.on_boundary(id, BoundaryUnit::Word, i, l); }
                        Ev::Ended => { d.on_ended(id); }
                        Ev::Failed => { d.on_failed(id, "synthesis-failed"); }
                        Ev::Elapsed => { d.on_completion_elapsed(id); }
                    }
                    let p = d.progress().as_f32();
                    prop_assert!((0.0..=1.0).contains(&p));
                }
            }
        }
    }
}
