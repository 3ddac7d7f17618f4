// reel_core: Storyreel Rust/WASM Engine
// All "magic" lives here; JS is plumbing: it renders the view model, runs
// the two network collaborators, and forwards viewer taps.

mod content;
mod controller;
mod error;
mod narration;
mod phrase;
mod session;
mod speech;
mod types;
mod view;
mod voice;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

pub use controller::ReelController;
pub use error::ReelError;
pub use narration::{NarrationDriver, NarrationUpdate};
pub use phrase::segment_caption;
pub use session::{ReelSession, SessionPhase};
pub use speech::Narrator;
pub use types::*;
pub use view::{
    render, AdView, ImageView, OverlayView, PhraseSpan, ReelView, SessionView, SlidePhase,
};
pub use voice::{select_voice, PREFERRED_VOICE_NAMES};

/// Queue of events pushed by platform callbacks and collaborator futures,
/// drained on the next dispatch or pump.
pub(crate) type EventInbox = Rc<RefCell<VecDeque<ReelEvent>>>;

/// Initialize panic hook and console logging for the browser.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    speech::init_logging();
}

/// Main engine interface exposed to JavaScript.
/// Batch interface to minimize JS↔WASM crossings: one event in, the
/// outstanding directives out, the view pulled per frame.
#[wasm_bindgen]
pub struct ReelEngine {
    session: ReelSession,
    inbox: EventInbox,
    narrator: Option<Narrator>,
    collaborators: Option<Collaborators>,
}

#[wasm_bindgen]
impl ReelEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<ReelEngine, JsValue> {
        let config: EngineConfig = serde_json::from_str(config_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?;

        Ok(ReelEngine {
            session: ReelSession::new(config),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            narrator: None,
            collaborators: None,
        })
    }

    /// Attach the built-in speech adapter. Narration directives are then
    /// executed inside the engine; without it they are returned to the
    /// host, and a host that drops them gets a silent, manually paged reel.
    pub fn connect_narrator(&mut self) -> Result<(), JsValue> {
        self.narrator = Some(Narrator::connect(self.inbox.clone())?);
        Ok(())
    }

    /// Attach the two network collaborators. `search(query)` must resolve
    /// with the raw script text or a JSON string
    /// `{"body": ..., "sources": [...]}`; `image(prompt)` must resolve
    /// with a URL or data URI. With collaborators attached the engine
    /// drives the whole acquisition pipeline itself, one call in flight at
    /// a time.
    pub fn attach_collaborators(&mut self, search: js_sys::Function, image: js_sys::Function) {
        self.collaborators = Some(Collaborators { search, image });
    }

    /// Apply one event (JSON), then everything queued by callbacks, and
    /// return the directives the host still has to perform as a JSON array.
    pub fn dispatch(&mut self, event_json: &str) -> Result<String, JsValue> {
        let event: ReelEvent = serde_json::from_str(event_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid event: {}", e)))?;
        self.run(Some(event))
    }

    /// Drain queued callback events only. Call once per animation frame.
    pub fn pump(&mut self) -> Result<String, JsValue> {
        self.run(None)
    }

    /// Current render model as JSON.
    pub fn view(&self) -> Result<String, JsValue> {
        serde_json::to_string(&view::render(&self.session))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

impl ReelEngine {
    fn run(&mut self, event: Option<ReelEvent>) -> Result<String, JsValue> {
        let mut queue: VecDeque<ReelEvent> = self.inbox.borrow_mut().drain(..).collect();
        if let Some(event) = event {
            queue.push_back(event);
        }

        let mut host_directives = Vec::new();
        while let Some(event) = queue.pop_front() {
            for directive in self.session.apply(event) {
                self.perform(directive, &mut host_directives);
            }
        }
        // Events pushed synchronously while directives execute sit in the
        // inbox until the next dispatch or pump.

        serde_json::to_string(&host_directives)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    fn perform(&mut self, directive: Directive, host: &mut Vec<Directive>) {
        match directive {
            Directive::FetchContent { generation, query } => match self.collaborators.as_ref() {
                Some(c) => c.fetch_content(self.inbox.clone(), generation, &query),
                None => host.push(Directive::FetchContent { generation, query }),
            },
            Directive::ResolveImage {
                generation,
                slide,
                prompt,
            } => match self.collaborators.as_ref() {
                Some(c) => c.resolve_image(self.inbox.clone(), generation, slide, &prompt),
                None => host.push(Directive::ResolveImage {
                    generation,
                    slide,
                    prompt,
                }),
            },
            narration => match self.narrator.as_mut() {
                Some(narrator) => {
                    if let Err(err) = narrator.execute(&narration) {
                        log::warn!("narration directive failed: {:?}", err);
                    }
                }
                None => host.push(narration),
            },
        }
    }
}

/// The two async JS functions the host supplies for network work.
struct Collaborators {
    search: js_sys::Function,
    image: js_sys::Function,
}

/// Envelope the search collaborator may resolve with.
#[derive(Debug, Deserialize)]
struct ContentPayload {
    body: String,
    #[serde(default)]
    sources: Vec<SourceChunk>,
}

impl Collaborators {
    fn fetch_content(&self, inbox: EventInbox, generation: u64, query: &str) {
        let call = self.search.call1(&JsValue::NULL, &JsValue::from_str(query));
        wasm_bindgen_futures::spawn_local(async move {
            let event = match await_string(call).await {
                // A bare string is taken as the script itself; the envelope
                // adds grounding sources.
                Ok(payload) => match serde_json::from_str::<ContentPayload>(&payload) {
                    Ok(content) => ReelEvent::ContentArrived {
                        generation,
                        body: content.body,
                        sources: content.sources,
                    },
                    Err(_) => ReelEvent::ContentArrived {
                        generation,
                        body: payload,
                        sources: Vec::new(),
                    },
                },
                Err(err) => ReelEvent::ContentFailed {
                    generation,
                    reason: js_error_message(&err),
                },
            };
            inbox.borrow_mut().push_back(event);
        });
    }

    fn resolve_image(&self, inbox: EventInbox, generation: u64, slide: SlideId, prompt: &str) {
        let call = self.image.call1(&JsValue::NULL, &JsValue::from_str(prompt));
        wasm_bindgen_futures::spawn_local(async move {
            let event = match await_string(call).await {
                Ok(url) if !url.is_empty() => ReelEvent::ImageArrived {
                    generation,
                    slide,
                    url,
                },
                Ok(_) => ReelEvent::ImageFailed {
                    generation,
                    slide,
                    reason: "collaborator resolved with an empty url".to_string(),
                },
                Err(err) => ReelEvent::ImageFailed {
                    generation,
                    slide,
                    reason: js_error_message(&err),
                },
            };
            inbox.borrow_mut().push_back(event);
        });
    }
}

async fn await_string(call: Result<JsValue, JsValue>) -> Result<String, JsValue> {
    let promise: js_sys::Promise = call?
        .dyn_into()
        .map_err(|_| JsValue::from_str("collaborator did not return a Promise"))?;
    let value = wasm_bindgen_futures::JsFuture::from(promise).await?;
    value
        .as_string()
        .ok_or_else(|| JsValue::from_str("collaborator must resolve with a string"))
}

fn js_error_message(err: &JsValue) -> String {
    if let Some(message) = err.as_string() {
        return message;
    }
    js_sys::Reflect::get(err, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| "collaborator call failed".to_string())
}
