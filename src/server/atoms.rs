//! Atom table
//!
//! Interned strings shared by all clients. The predefined X11 atoms occupy
//! IDs 1 through 68; everything else is allocated on first intern. The
//! table is guarded by its own lock.

use std::collections::HashMap;
use std::sync::Mutex;

/// The predefined atoms, in protocol order starting at ID 1.
const PREDEFINED: [&str; 68] = [
    "PRIMARY",
    "SECONDARY",
    "ARC",
    "ATOM",
    "BITMAP",
    "CARDINAL",
    "COLORMAP",
    "CURSOR",
    "CUT_BUFFER0",
    "CUT_BUFFER1",
    "CUT_BUFFER2",
    "CUT_BUFFER3",
    "CUT_BUFFER4",
    "CUT_BUFFER5",
    "CUT_BUFFER6",
    "CUT_BUFFER7",
    "DRAWABLE",
    "FONT",
    "INTEGER",
    "PIXMAP",
    "POINT",
    "RECTANGLE",
    "RESOURCE_MANAGER",
    "RGB_COLOR_MAP",
    "RGB_BEST_MAP",
    "RGB_BLUE_MAP",
    "RGB_DEFAULT_MAP",
    "RGB_GRAY_MAP",
    "RGB_GREEN_MAP",
    "RGB_RED_MAP",
    "STRING",
    "VISUALID",
    "WINDOW",
    "WM_COMMAND",
    "WM_HINTS",
    "WM_CLIENT_MACHINE",
    "WM_ICON_NAME",
    "WM_ICON_SIZE",
    "WM_NAME",
    "WM_NORMAL_HINTS",
    "WM_SIZE_HINTS",
    "WM_ZOOM_HINTS",
    "MIN_SPACE",
    "NORM_SPACE",
    "MAX_SPACE",
    "END_SPACE",
    "SUPERSCRIPT_X",
    "SUPERSCRIPT_Y",
    "SUBSCRIPT_X",
    "SUBSCRIPT_Y",
    "UNDERLINE_POSITION",
    "UNDERLINE_THICKNESS",
    "STRIKEOUT_ASCENT",
    "STRIKEOUT_DESCENT",
    "ITALIC_ANGLE",
    "X_HEIGHT",
    "QUAD_WIDTH",
    "WEIGHT",
    "POINT_SIZE",
    "RESOLUTION",
    "COPYRIGHT",
    "NOTICE",
    "FONT_NAME",
    "FAMILY_NAME",
    "FULL_NAME",
    "CAP_HEIGHT",
    "WM_CLASS",
    "WM_TRANSIENT_FOR",
];

struct AtomTableInner {
    by_name: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
    next_id: u32,
}

pub struct AtomTable {
    inner: Mutex<AtomTableInner>,
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomTable {
    pub fn new() -> Self {
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for (i, name) in PREDEFINED.iter().enumerate() {
            let id = i as u32 + 1;
            by_name.insert(name.to_string(), id);
            by_id.insert(id, name.to_string());
        }
        AtomTable {
            inner: Mutex::new(AtomTableInner {
                by_name,
                by_id,
                next_id: PREDEFINED.len() as u32 + 1,
            }),
        }
    }

    /// Return the atom for a name, interning it if new.
    pub fn intern(&self, name: &str) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&id) = inner.by_name.get(name) {
            return id;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.by_name.insert(name.to_string(), id);
        inner.by_id.insert(id, name.to_string());
        id
    }

    /// Return the atom for a name without interning.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.inner.lock().unwrap().by_name.get(name).copied()
    }

    pub fn name_of(&self, id: u32) -> Option<String> {
        self.inner.lock().unwrap().by_id.get(&id).cloned()
    }
}
