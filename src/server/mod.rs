//! Core X11 server state
//!
//! The `XServer` owns everything shared between client connections: the
//! resource registry, the atom table, the passive key grab list, the font
//! path and the screen. Each table carries its own lock so unrelated
//! clients never serialize on a single global lock.

pub mod atoms;
pub mod client;
pub mod extensions;
pub mod listener;

pub use atoms::AtomTable;

use crate::metrics::{CellMetrics, TextMetrics};
use crate::protocol::events::{self, encode_key_event};
use crate::protocol::wire::ClientOutput;
use crate::resources::{Registry, Resource, Window};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Root window resource ID.
pub const ROOT_WINDOW_ID: u32 = 0x12c;

/// Default colormap resource ID.
pub const DEFAULT_COLORMAP_ID: u32 = 0x20;

/// The TrueColor root visual ID.
pub const ROOT_VISUAL_ID: u32 = 0x21;

/// Modifier mask wildcard for key grabs.
pub const ANY_MODIFIER: u16 = 0x8000;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub width: u16,
    pub height: u16,
    pub dpi: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            width: 1024,
            height: 768,
            dpi: 96,
        }
    }
}

/// A standing registration that converts a future matching key event into
/// a notification for the grabbing client.
#[derive(Debug, Clone)]
pub struct PassiveKeyGrab {
    pub client_id: u32,
    pub window: u32,
    /// Key code, 0 for any key.
    pub key: u8,
    /// Modifier mask, `ANY_MODIFIER` for any state.
    pub modifiers: u16,
    pub owner_events: bool,
    pub pointer_sync: bool,
    pub keyboard_sync: bool,
}

impl PassiveKeyGrab {
    /// Does a live key event trigger this grab? Wildcards apply on the
    /// grab side only.
    pub fn matches_event(&self, key: u8, modifiers: u16) -> bool {
        if self.key != 0 && self.key != key {
            return false;
        }
        if self.modifiers != ANY_MODIFIER && self.modifiers != modifiers {
            return false;
        }
        true
    }

    /// Do a grab request's parameters match this grab? Wildcards are
    /// honored on both sides.
    pub fn matches_grab(&self, key: u8, modifiers: u16) -> bool {
        if key != 0 && self.key != 0 && key != self.key {
            return false;
        }
        if modifiers != ANY_MODIFIER && self.modifiers != ANY_MODIFIER && modifiers != self.modifiers
        {
            return false;
        }
        true
    }
}

struct PointerState {
    x: i16,
    y: i16,
    buttons: u16,
}

/// The screen advertised during connection setup. Geometry and the visual
/// are immutable; the pointer and current cursor are live input state.
pub struct Screen {
    pub width: u16,
    pub height: u16,
    pub width_mm: u16,
    pub height_mm: u16,
    pub dpi: u32,
    pub root_visual: u32,
    pointer: Mutex<PointerState>,
    cursor: Mutex<Option<u32>>,
}

impl Screen {
    fn new(config: &ServerConfig) -> Self {
        let to_mm = |px: u16| (px as u32 * 254 / (config.dpi * 10)) as u16;
        Screen {
            width: config.width,
            height: config.height,
            width_mm: to_mm(config.width),
            height_mm: to_mm(config.height),
            dpi: config.dpi,
            root_visual: ROOT_VISUAL_ID,
            pointer: Mutex::new(PointerState {
                x: 0,
                y: 0,
                buttons: 0,
            }),
            cursor: Mutex::new(None),
        }
    }

    pub fn pointer_position(&self) -> (i16, i16) {
        let pointer = self.pointer.lock().unwrap();
        (pointer.x, pointer.y)
    }

    pub fn button_mask(&self) -> u16 {
        self.pointer.lock().unwrap().buttons
    }

    pub fn current_cursor(&self) -> Option<u32> {
        *self.cursor.lock().unwrap()
    }

    pub fn set_current_cursor(&self, cursor: Option<u32>) {
        *self.cursor.lock().unwrap() = cursor;
    }
}

/// The main X server
pub struct XServer {
    pub registry: Registry,
    pub atoms: AtomTable,
    grabs: Mutex<Vec<PassiveKeyGrab>>,
    font_path: Mutex<Vec<String>>,
    screen: Screen,
    metrics: Box<dyn TextMetrics>,
    clients: Mutex<HashMap<u32, Arc<ClientOutput>>>,
    next_client_id: AtomicU32,
    started: Instant,
}

impl XServer {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_metrics(config, Box::new(CellMetrics))
    }

    pub fn with_metrics(config: ServerConfig, metrics: Box<dyn TextMetrics>) -> Self {
        let server = XServer {
            registry: Registry::new(),
            atoms: AtomTable::new(),
            grabs: Mutex::new(Vec::new()),
            font_path: Mutex::new(Vec::new()),
            screen: Screen::new(&config),
            metrics,
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU32::new(1),
            started: Instant::now(),
        };

        // Permanent resources that exist before any client connects.
        let root = Window::new_root(ROOT_WINDOW_ID, config.width, config.height);
        server.registry.add(Arc::new(Resource::Window(root)));
        server.registry.add(Arc::new(Resource::Colormap(
            crate::resources::Colormap::new(DEFAULT_COLORMAP_ID, None),
        )));

        extensions::initialize();
        server
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn metrics(&self) -> &dyn TextMetrics {
        self.metrics.as_ref()
    }

    pub fn root_window(&self) -> u32 {
        ROOT_WINDOW_ID
    }

    pub fn default_colormap(&self) -> u32 {
        DEFAULT_COLORMAP_ID
    }

    /// Milliseconds since server start, the timestamp base for events.
    pub fn current_time_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    pub fn font_path(&self) -> Vec<String> {
        self.font_path.lock().unwrap().clone()
    }

    pub fn set_font_path(&self, paths: Vec<String>) {
        *self.font_path.lock().unwrap() = paths;
    }

    /// Register a connected client's output channel and assign its ID.
    pub fn register_client(&self, output: Arc<ClientOutput>) -> u32 {
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        self.clients.lock().unwrap().insert(id, output);
        id
    }

    pub fn client_output(&self, client_id: u32) -> Option<Arc<ClientOutput>> {
        self.clients.lock().unwrap().get(&client_id).cloned()
    }

    /// Tear down a disconnected client: free every resource it owns except
    /// those retained past close-down, drop its passive grabs and its
    /// extension counters, and forget its output channel.
    pub fn sweep_client(&self, client_id: u32, resources: &HashSet<u32>) {
        let mut freed = 0usize;
        for &id in resources {
            if let Some(resource) = self.registry.get(id) {
                if resource.close_down_mode() == crate::resources::CloseDownMode::Destroy {
                    self.registry.free(id);
                    freed += 1;
                }
            }
        }
        self.grabs.lock().unwrap().retain(|g| g.client_id != client_id);
        extensions::sweep_client(client_id);
        self.clients.lock().unwrap().remove(&client_id);
        log::info!("client {} swept ({} resources freed)", client_id, freed);
    }

    /// Establish a passive key grab, replacing any grab on the same window
    /// whose parameters match.
    pub fn add_key_grab(&self, grab: PassiveKeyGrab) {
        let mut grabs = self.grabs.lock().unwrap();
        grabs.retain(|g| !(g.window == grab.window && g.matches_grab(grab.key, grab.modifiers)));
        grabs.push(grab);
    }

    /// Release this client's grabs matching the given parameters.
    pub fn remove_key_grabs(&self, client_id: u32, window: u32, key: u8, modifiers: u16) {
        self.grabs.lock().unwrap().retain(|g| {
            !(g.client_id == client_id && g.window == window && g.matches_grab(key, modifiers))
        });
    }

    /// Drop every grab anchored to a destroyed window.
    pub fn remove_window_grabs(&self, window: u32) {
        self.grabs.lock().unwrap().retain(|g| g.window != window);
    }

    pub fn key_grab_count(&self) -> usize {
        self.grabs.lock().unwrap().len()
    }

    /// Inject a synthesized key event. A matching passive grab converts it
    /// into a KeyPress/KeyRelease notification for the grabbing client.
    pub fn synthesize_key(&self, keycode: u8, pressed: bool) {
        let grab = {
            let grabs = self.grabs.lock().unwrap();
            grabs.iter().find(|g| g.matches_event(keycode, 0)).cloned()
        };
        let Some(grab) = grab else {
            log::debug!("synthesized key {} ({}) had no grab", keycode, pressed);
            return;
        };

        let Some(output) = self.client_output(grab.client_id) else {
            return;
        };
        let (x, y) = self.screen.pointer_position();
        let event_type = if pressed {
            events::KEY_PRESS
        } else {
            events::KEY_RELEASE
        };
        let packet = encode_key_event(
            event_type,
            keycode,
            output.sequence(),
            self.current_time_ms(),
            self.root_window(),
            grab.window,
            x,
            y,
            0,
        );
        if let Err(e) = output.send(&packet) {
            log::warn!("key event delivery to client {} failed: {}", grab.client_id, e);
        }
    }

    /// Inject a synthesized button event.
    pub fn synthesize_button(&self, button: u8, pressed: bool) {
        if button == 0 || button > 13 {
            return;
        }
        let mut pointer = self.screen.pointer.lock().unwrap();
        let bit = 1u16 << (button - 1);
        if pressed {
            pointer.buttons |= bit;
        } else {
            pointer.buttons &= !bit;
        }
    }

    /// Inject a synthesized motion event, clamped to the screen.
    pub fn synthesize_motion(&self, x: i32, y: i32, relative: bool) {
        let mut pointer = self.screen.pointer.lock().unwrap();
        let (mut nx, mut ny) = if relative {
            (pointer.x as i32 + x, pointer.y as i32 + y)
        } else {
            (x, y)
        };
        nx = nx.clamp(0, self.screen.width as i32 - 1);
        ny = ny.clamp(0, self.screen.height as i32 - 1);
        pointer.x = nx as i16;
        pointer.y = ny as i16;
    }
}
