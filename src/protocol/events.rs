//! X11 event packet encoding
//!
//! Events are fixed 32-byte packets. Only the input events synthesized by
//! the XTEST extension and delivered through passive key grabs are encoded
//! here.

/// Event type codes
pub const KEY_PRESS: u8 = 2;
pub const KEY_RELEASE: u8 = 3;
pub const BUTTON_PRESS: u8 = 4;
pub const BUTTON_RELEASE: u8 = 5;
pub const MOTION_NOTIFY: u8 = 6;

/// Encode a KeyPress/KeyRelease event packet.
#[allow(clippy::too_many_arguments)]
pub fn encode_key_event(
    event_type: u8,
    keycode: u8,
    sequence: u16,
    time: u32,
    root: u32,
    event_window: u32,
    root_x: i16,
    root_y: i16,
    state: u16,
) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[0] = event_type;
    buf[1] = keycode;
    buf[2..4].copy_from_slice(&sequence.to_be_bytes());
    buf[4..8].copy_from_slice(&time.to_be_bytes());
    buf[8..12].copy_from_slice(&root.to_be_bytes());
    buf[12..16].copy_from_slice(&event_window.to_be_bytes());
    // Child window: None
    buf[20..22].copy_from_slice(&root_x.to_be_bytes());
    buf[22..24].copy_from_slice(&root_y.to_be_bytes());
    // Event-relative coordinates match the root coordinates for root grabs
    buf[24..26].copy_from_slice(&root_x.to_be_bytes());
    buf[26..28].copy_from_slice(&root_y.to_be_bytes());
    buf[28..30].copy_from_slice(&state.to_be_bytes());
    buf[30] = 1; // Same screen
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_event_layout() {
        let buf = encode_key_event(KEY_PRESS, 38, 5, 1000, 0x12c, 0x200000, 10, 20, 0);
        assert_eq!(buf.len(), 32);
        assert_eq!(buf[0], KEY_PRESS);
        assert_eq!(buf[1], 38);
        assert_eq!(&buf[2..4], &[0, 5]);
        assert_eq!(&buf[12..16], &[0x00, 0x20, 0x00, 0x00]);
        assert_eq!(buf[30], 1);
    }
}
