//! x11cell - an X11 server core for text-cell display hosts
//!
//! This library implements the server side of the X11 wire protocol: it
//! accepts client connections, parses binary requests, maintains a shared
//! table of typed resources (windows, pixmaps, cursors, fonts, graphics
//! contexts, colormaps) and emits protocol-conformant replies, events and
//! errors. Rendering is delegated to the embedding host through the raster
//! and text-metrics seams.

pub mod connection;
pub mod metrics;
pub mod protocol;
pub mod resources;
pub mod server;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version
pub const PROTOCOL_MAJOR: u16 = 11;
pub const PROTOCOL_MINOR: u16 = 0;
