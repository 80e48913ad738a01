//! Server resources and the resource registry
//!
//! Every server-tracked graphical object (window, pixmap, cursor, font,
//! graphics context, colormap) is a resource addressed by a 32-bit ID. The
//! registry is the single server-wide table mapping IDs to live resources;
//! it owns creation, lookup and free. Per-type request handling is
//! dispatched through the closed `Resource` union.

pub mod colormap;
pub mod cursor;
pub mod drawable;
pub mod font;
pub mod gcontext;
pub mod pixmap;
pub mod window;

pub use colormap::Colormap;
pub use cursor::Cursor;
pub use drawable::{Drawable, Raster};
pub use font::Font;
pub use gcontext::GContext;
pub use pixmap::Pixmap;
pub use window::Window;

use crate::server::client::Client;
use crate::server::XServer;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// Policy controlling whether a resource survives its owning client's
/// disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CloseDownMode {
    Destroy = 0,
    RetainPermanent = 1,
}

/// Resource type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Window,
    Pixmap,
    Cursor,
    Font,
    GContext,
    Colormap,
}

/// State common to every resource.
#[derive(Debug)]
pub struct ResourceBase {
    pub id: u32,
    pub owner: Option<u32>,
    close_down: AtomicU8,
}

impl ResourceBase {
    pub fn new(id: u32, owner: Option<u32>) -> Self {
        ResourceBase {
            id,
            owner,
            close_down: AtomicU8::new(CloseDownMode::Destroy as u8),
        }
    }

    pub fn close_down_mode(&self) -> CloseDownMode {
        match self.close_down.load(Ordering::SeqCst) {
            0 => CloseDownMode::Destroy,
            _ => CloseDownMode::RetainPermanent,
        }
    }

    pub fn set_close_down_mode(&self, mode: CloseDownMode) {
        self.close_down.store(mode as u8, Ordering::SeqCst);
    }
}

/// A server resource: closed union over the six resource types.
pub enum Resource {
    Window(Window),
    Pixmap(Pixmap),
    Cursor(Cursor),
    Font(Font),
    GContext(GContext),
    Colormap(Colormap),
}

impl Resource {
    pub fn base(&self) -> &ResourceBase {
        match self {
            Resource::Window(w) => &w.base,
            Resource::Pixmap(p) => &p.base,
            Resource::Cursor(c) => &c.base,
            Resource::Font(f) => &f.base,
            Resource::GContext(g) => &g.base,
            Resource::Colormap(c) => &c.base,
        }
    }

    pub fn id(&self) -> u32 {
        self.base().id
    }

    pub fn owner(&self) -> Option<u32> {
        self.base().owner
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Window(_) => ResourceKind::Window,
            Resource::Pixmap(_) => ResourceKind::Pixmap,
            Resource::Cursor(_) => ResourceKind::Cursor,
            Resource::Font(_) => ResourceKind::Font,
            Resource::GContext(_) => ResourceKind::GContext,
            Resource::Colormap(_) => ResourceKind::Colormap,
        }
    }

    pub fn close_down_mode(&self) -> CloseDownMode {
        self.base().close_down_mode()
    }

    pub fn set_close_down_mode(&self, mode: CloseDownMode) {
        self.base().set_close_down_mode(mode);
    }

    /// Is the resource a drawable? (Window or Pixmap)
    pub fn is_drawable(&self) -> bool {
        matches!(self, Resource::Window(_) | Resource::Pixmap(_))
    }

    /// Is the resource a fontable? (Font or GContext)
    pub fn is_fontable(&self) -> bool {
        matches!(self, Resource::Font(_) | Resource::GContext(_))
    }

    /// Process an X request addressed to this resource. The handler owns the
    /// remaining `bytes_remaining` bytes of the request and must consume
    /// exactly that many, draining before reporting any error.
    pub fn process_request(
        &self,
        server: &XServer,
        client: &mut Client,
        opcode: u8,
        arg: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        match self {
            Resource::Window(w) => w.process_request(server, client, opcode, arg, bytes_remaining),
            Resource::Pixmap(p) => p.process_request(server, client, opcode, arg, bytes_remaining),
            Resource::Cursor(c) => c.process_request(server, client, opcode, arg, bytes_remaining),
            Resource::Font(f) => f.process_request(server, client, opcode, arg, bytes_remaining),
            Resource::GContext(g) => {
                g.process_request(server, client, opcode, arg, bytes_remaining)
            }
            Resource::Colormap(c) => {
                c.process_request(server, client, opcode, arg, bytes_remaining)
            }
        }
    }
}

/// Server-wide resource table.
///
/// Guarded by its own lock; handlers clone the `Arc` out and release the
/// table before doing any request I/O, so unrelated clients never serialize
/// on each other's requests.
#[derive(Default)]
pub struct Registry {
    table: Mutex<HashMap<u32, Arc<Resource>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Register a resource under its ID. Fails when the ID is already live.
    pub fn add(&self, resource: Arc<Resource>) -> bool {
        let mut table = self.table.lock().unwrap();
        match table.entry(resource.id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(resource);
                true
            }
        }
    }

    pub fn get(&self, id: u32) -> Option<Arc<Resource>> {
        self.table.lock().unwrap().get(&id).cloned()
    }

    /// Remove a resource. Freeing an absent ID returns None; it is the
    /// caller's protocol error, not a registry fault.
    pub fn free(&self, id: u32) -> Option<Arc<Resource>> {
        self.table.lock().unwrap().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().unwrap().is_empty()
    }
}
