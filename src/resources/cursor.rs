//! Cursor resources
//!
//! Cursors are two-color 32-bit rasters synthesized either from a depth-1
//! source/mask pixmap pair or from the built-in glyph catalog. Recoloring
//! substitutes the palette in place over the already-synthesized bitmap;
//! it never rebuilds from the source, so cumulative recolors are lossy by
//! design of the protocol.

use super::pixmap::Pixmap;
use super::{Resource, ResourceBase, ResourceKind};
use crate::protocol::{opcodes, ErrorCode};
use crate::server::client::Client;
use crate::server::XServer;
use std::io;
use std::sync::Mutex;

/// Fully-set pixel in a depth-1 source/mask raster.
const BIT_SET: u32 = 0xffff_ffff;

/// The predefined cursor glyph catalog: name and hotspot, indexed by half
/// the character code from the "cursor" font.
pub(crate) const GLYPHS: [(&str, i32, i32); 77] = [
    ("xc_x_cursor", 7, 7),
    ("xc_arrow", 14, 1),
    ("xc_based_arrow_down", 4, 10),
    ("xc_based_arrow_up", 4, 10),
    ("xc_boat", 14, 4),
    ("xc_bogosity", 7, 7),
    ("xc_bottom_left_corner", 1, 14),
    ("xc_bottom_right_corner", 14, 14),
    ("xc_bottom_side", 7, 14),
    ("xc_bottom_tee", 8, 10),
    ("xc_box_spiral", 8, 8),
    ("xc_center_ptr", 5, 1),
    ("xc_circle", 8, 8),
    ("xc_clock", 6, 3),
    ("xc_coffee_mug", 7, 9),
    ("xc_cross", 7, 7),
    ("xc_cross_reverse", 7, 7),
    ("xc_crosshair", 7, 7),
    ("xc_diamond_cross", 7, 7),
    ("xc_dot", 6, 6),
    ("xc_dotbox", 7, 6),
    ("xc_double_arrow", 6, 8),
    ("xc_draft_large", 14, 0),
    ("xc_draft_small", 14, 0),
    ("xc_draped_box", 7, 6),
    ("xc_exchange", 7, 7),
    ("xc_fleur", 8, 8),
    ("xc_gobbler", 14, 3),
    ("xc_gumby", 2, 0),
    ("xc_hand1", 12, 0),
    ("xc_hand2", 0, 1),
    ("xc_heart", 6, 8),
    ("xc_icon", 8, 8),
    ("xc_iron_cross", 8, 7),
    ("xc_left_ptr", 1, 1),
    ("xc_left_side", 1, 7),
    ("xc_left_tee", 1, 8),
    ("xc_leftbutton", 8, 8),
    ("xc_ll_angle", 1, 10),
    ("xc_lr_angle", 10, 10),
    ("xc_man", 14, 5),
    ("xc_middlebutton", 8, 8),
    ("xc_mouse", 4, 1),
    ("xc_pencil", 11, 15),
    ("xc_pirate", 7, 12),
    ("xc_plus", 5, 6),
    ("xc_question_arrow", 5, 8),
    ("xc_right_ptr", 8, 1),
    ("xc_right_side", 14, 7),
    ("xc_right_tee", 10, 8),
    ("xc_rightbutton", 8, 8),
    ("xc_rtl_logo", 7, 7),
    ("xc_sailboat", 8, 0),
    ("xc_sb_down_arrow", 4, 15),
    ("xc_sb_h_double_arrow", 7, 4),
    ("xc_sb_left_arrow", 0, 4),
    ("xc_sb_right_arrow", 15, 4),
    ("xc_sb_up_arrow", 4, 0),
    ("xc_sb_v_double_arrow", 4, 7),
    ("xc_shuttle", 11, 0),
    ("xc_sizing", 8, 8),
    ("xc_spider", 6, 7),
    ("xc_spraycan", 10, 2),
    ("xc_star", 7, 7),
    ("xc_target", 7, 7),
    ("xc_tcross", 7, 7),
    ("xc_top_left_arrow", 1, 1),
    ("xc_top_left_corner", 1, 1),
    ("xc_top_right_corner", 14, 1),
    ("xc_top_side", 7, 1),
    ("xc_top_tee", 8, 1),
    ("xc_trek", 4, 0),
    ("xc_ul_angle", 1, 1),
    ("xc_umbrella", 8, 2),
    ("xc_ur_angle", 10, 1),
    ("xc_watch", 15, 9),
    ("xc_xterm", 4, 8),
];

struct CursorImage {
    width: u16,
    height: u16,
    pixels: Vec<u32>,
    foreground: u32,
    background: u32,
}

pub struct Cursor {
    pub base: ResourceBase,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
    image: Mutex<CursorImage>,
}

impl Cursor {
    /// Synthesize a cursor from a depth-1 source pixmap and optional mask.
    /// With no mask every pixel is opaque foreground-or-background; a mask
    /// pixel that is not fully set makes the result pixel transparent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_pixmaps(
        id: u32,
        owner: Option<u32>,
        source: &Pixmap,
        mask: Option<&Pixmap>,
        hotspot_x: i32,
        hotspot_y: i32,
        foreground: u32,
        background: u32,
    ) -> Self {
        let width = source.drawable.width;
        let height = source.drawable.height;
        let mut pixels = source.drawable.snapshot();

        match mask {
            None => {
                for pixel in pixels.iter_mut() {
                    *pixel = if *pixel == BIT_SET {
                        foreground
                    } else {
                        background
                    };
                }
            }
            Some(mask) => {
                let mask_pixels = mask.drawable.snapshot();
                for (pixel, mask_pixel) in pixels.iter_mut().zip(mask_pixels.iter()) {
                    *pixel = if *mask_pixel != BIT_SET {
                        0
                    } else if *pixel == BIT_SET {
                        foreground
                    } else {
                        background
                    };
                }
            }
        }

        Cursor {
            base: ResourceBase::new(id, owner),
            hotspot_x,
            hotspot_y,
            image: Mutex::new(CursorImage {
                width,
                height,
                pixels,
                foreground,
                background,
            }),
        }
    }

    /// Synthesize a cursor from the glyph catalog. The character code is
    /// halved to index the catalog and clamped to entry 0; a space mask
    /// character yields an empty bitmap. Glyph art proper lives in the
    /// host; the server renders a crosshair anchored at the hotspot.
    pub fn from_glyph(
        id: u32,
        owner: Option<u32>,
        source_char: u16,
        mask_char: u16,
        foreground: u32,
        background: u32,
    ) -> Self {
        let mut index = (source_char / 2) as usize;
        if index >= GLYPHS.len() {
            index = 0;
        }
        let (name, hotspot_x, hotspot_y) = GLYPHS[index];
        log::debug!("glyph cursor {} (char {})", name, source_char);

        let pixels = if mask_char == 32 {
            vec![0u32; 16 * 16]
        } else {
            let mut pixels = vec![0xffff_ffffu32; 16 * 16];
            for y in 0..16i32 {
                for x in 0..16i32 {
                    if x == hotspot_x.clamp(0, 15) || y == hotspot_y.clamp(0, 15) {
                        pixels[(y * 16 + x) as usize] = 0xff00_0000;
                    }
                }
            }
            pixels
        };

        let cursor = Cursor {
            base: ResourceBase::new(id, owner),
            hotspot_x,
            hotspot_y,
            image: Mutex::new(CursorImage {
                width: 16,
                height: 16,
                pixels,
                foreground: 0xff00_0000,
                background: 0xffff_ffff,
            }),
        };
        cursor.set_color(foreground, background);
        cursor
    }

    /// Recolor in place: pixels equal to the old foreground/background
    /// become the new ones. A no-op when the colors are unchanged.
    pub fn set_color(&self, foreground: u32, background: u32) {
        let mut image = self.image.lock().unwrap();
        if foreground == image.foreground && background == image.background {
            return;
        }
        let (old_fg, old_bg) = (image.foreground, image.background);
        for pixel in image.pixels.iter_mut() {
            if *pixel == old_fg {
                *pixel = foreground;
            } else if *pixel == old_bg {
                *pixel = background;
            }
        }
        image.foreground = foreground;
        image.background = background;
    }

    pub fn colors(&self) -> (u32, u32) {
        let image = self.image.lock().unwrap();
        (image.foreground, image.background)
    }

    pub fn bitmap(&self) -> Vec<u32> {
        self.image.lock().unwrap().pixels.clone()
    }

    pub fn size(&self) -> (u16, u16) {
        let image = self.image.lock().unwrap();
        (image.width, image.height)
    }

    /// Process a CreateCursor or CreateGlyphCursor request.
    pub fn process_create(
        server: &XServer,
        client: &mut Client,
        opcode: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining != 28 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcode, 0);
        }

        if opcode == opcodes::CREATE_CURSOR {
            let cid = client.reader.read_u32()?;
            let sid = client.reader.read_u32()?;
            let mid = client.reader.read_u32()?;
            let fg = read_color(client)?;
            let bg = read_color(client)?;
            let x = client.reader.read_i16()?;
            let y = client.reader.read_i16()?;

            let source = match server.registry.get(sid) {
                Some(r) if r.kind() == ResourceKind::Pixmap => r,
                _ => return client.send_error(ErrorCode::Pixmap, opcode, sid),
            };
            let mask = if mid != 0 {
                match server.registry.get(mid) {
                    Some(r) if r.kind() == ResourceKind::Pixmap => Some(r),
                    _ => return client.send_error(ErrorCode::Pixmap, opcode, mid),
                }
            } else {
                None
            };

            let source = match &*source {
                Resource::Pixmap(p) => p,
                _ => unreachable!(),
            };
            if source.depth() != 1 {
                return client.send_error(ErrorCode::Match, opcode, sid);
            }
            let mask_pixmap = match &mask {
                Some(r) => match &**r {
                    Resource::Pixmap(p) => {
                        if p.depth() != 1
                            || p.drawable.width != source.drawable.width
                            || p.drawable.height != source.drawable.height
                        {
                            return client.send_error(ErrorCode::Match, opcode, mid);
                        }
                        Some(p)
                    }
                    _ => unreachable!(),
                },
                None => None,
            };

            let cursor = Cursor::from_pixmaps(
                cid,
                Some(client.id),
                source,
                mask_pixmap,
                x as i32,
                y as i32,
                fg,
                bg,
            );
            client.register(server, Resource::Cursor(cursor), opcode)
        } else {
            let cid = client.reader.read_u32()?;
            let sid = client.reader.read_u32()?;
            let mid = client.reader.read_u32()?;
            let source_char = client.reader.read_u16()?;
            let mask_char = client.reader.read_u16()?;
            let fg = read_color(client)?;
            let bg = read_color(client)?;

            match server.registry.get(sid) {
                Some(r) if r.kind() == ResourceKind::Font => {}
                _ => return client.send_error(ErrorCode::Font, opcode, sid),
            }
            if mid != 0 {
                match server.registry.get(mid) {
                    Some(r) if r.kind() == ResourceKind::Font => {}
                    _ => return client.send_error(ErrorCode::Font, opcode, mid),
                }
            }

            let cursor = Cursor::from_glyph(cid, Some(client.id), source_char, mask_char, fg, bg);
            client.register(server, Resource::Cursor(cursor), opcode)
        }
    }

    pub(crate) fn process_request(
        &self,
        server: &XServer,
        client: &mut Client,
        opcode: u8,
        _arg: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        match opcode {
            opcodes::FREE_CURSOR => {
                if bytes_remaining != 0 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    client.free_resource(server, self.base.id);
                    Ok(())
                }
            }
            opcodes::RECOLOR_CURSOR => {
                if bytes_remaining != 12 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    let fg = read_color(client)?;
                    let bg = read_color(client)?;
                    self.set_color(fg, bg);
                    Ok(())
                }
            }
            _ => {
                client.reader.skip(bytes_remaining)?;
                client.send_error(ErrorCode::Implementation, opcode, self.base.id)
            }
        }
    }
}

/// Read a 16-bit-per-channel RGB triple into packed ARGB.
fn read_color(client: &mut Client) -> io::Result<u32> {
    let red = client.reader.read_u16()?;
    let green = client.reader.read_u16()?;
    let blue = client.reader.read_u16()?;
    Ok(super::colormap::from_parts_16(red, green, blue))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FG: u32 = 0xffff0000;
    const BG: u32 = 0xff0000ff;

    fn bitmap_pixmap(bits: &[(u16, u16)]) -> Pixmap {
        let pixmap = Pixmap::new(1, None, 4, 4, 1).unwrap();
        {
            let mut raster = pixmap.drawable.raster();
            raster.fill(0);
            for &(x, y) in bits {
                raster.set(x, y, BIT_SET);
            }
        }
        pixmap
    }

    #[test]
    fn test_unmasked_synthesis_is_opaque() {
        let source = bitmap_pixmap(&[(0, 0), (1, 1)]);
        let cursor = Cursor::from_pixmaps(9, None, &source, None, 0, 0, FG, BG);

        let pixels = cursor.bitmap();
        assert_eq!(pixels[0], FG);
        assert_eq!(pixels[5], FG);
        assert!(pixels.iter().all(|&p| p == FG || p == BG));
    }

    #[test]
    fn test_masked_synthesis_clears_unmasked_pixels() {
        let source = bitmap_pixmap(&[(0, 0), (1, 0)]);
        let mask = bitmap_pixmap(&[(0, 0)]);
        let cursor = Cursor::from_pixmaps(9, None, &source, Some(&mask), 0, 0, FG, BG);

        let pixels = cursor.bitmap();
        assert_eq!(pixels[0], FG);
        assert_eq!(pixels[1], 0); // Source set but masked out
        assert_eq!(pixels[2], 0);
    }

    #[test]
    fn test_recolor_substitutes_in_place() {
        let source = bitmap_pixmap(&[(0, 0)]);
        let cursor = Cursor::from_pixmaps(9, None, &source, None, 0, 0, FG, BG);

        cursor.set_color(0xff111111, 0xff222222);
        let pixels = cursor.bitmap();
        assert_eq!(pixels[0], 0xff111111);
        assert_eq!(pixels[1], 0xff222222);
        assert_eq!(cursor.colors(), (0xff111111, 0xff222222));
    }

    #[test]
    fn test_recolor_to_same_colors_is_noop() {
        let source = bitmap_pixmap(&[(0, 0), (2, 2)]);
        let cursor = Cursor::from_pixmaps(9, None, &source, None, 0, 0, FG, BG);

        let before = cursor.bitmap();
        cursor.set_color(FG, BG);
        assert_eq!(cursor.bitmap(), before);
    }

    #[test]
    fn test_glyph_index_halves_and_clamps() {
        let cursor = Cursor::from_glyph(9, None, 68, 0, FG, BG);
        // 68 / 2 == 34: xc_left_ptr with hotspot (1, 1)
        assert_eq!((cursor.hotspot_x, cursor.hotspot_y), (1, 1));

        let clamped = Cursor::from_glyph(9, None, 9999, 0, FG, BG);
        assert_eq!(
            (clamped.hotspot_x, clamped.hotspot_y),
            (GLYPHS[0].1, GLYPHS[0].2)
        );
    }

    #[test]
    fn test_space_mask_char_yields_empty_bitmap() {
        let cursor = Cursor::from_glyph(9, None, 0, 32, FG, BG);
        assert_eq!(cursor.size(), (16, 16));
        assert!(cursor.bitmap().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_glyph_bitmap_uses_requested_palette() {
        let cursor = Cursor::from_glyph(9, None, 0, 0, FG, BG);
        assert!(cursor.bitmap().iter().all(|&p| p == FG || p == BG));
        assert_eq!(cursor.colors(), (FG, BG));
    }
}
