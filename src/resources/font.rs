//! Font resources and server-side font name matching
//!
//! Fonts are built from X logical font description (XLFD) names or the
//! "fixed"/"cursor" aliases. The installed catalog is a static list; name
//! patterns are matched field by field with `*` wildcards, and a mismatch
//! on the pixel- or point-size fields rescales the candidate to the
//! server's DPI instead of rejecting it. Advance-width bounds are computed
//! once at creation from the first 256 glyph metrics and never change.

use super::{Resource, ResourceBase};
use crate::metrics::{FontSpec, TextMetrics};
use crate::protocol::{opcodes, padded_len, ErrorCode, ReplyBuilder};
use crate::server::client::Client;
use crate::server::XServer;
use once_cell::sync::Lazy;
use std::io;

pub const DEFAULT_FONT_SIZE: u16 = 16;

/// Typographic points per inch, used for pixel/point size conversion.
pub const POINTS_PER_INCH: f64 = 72.27;

/// The installed font catalog. Zero pixel/point sizes mark scalable
/// entries that are instantiated through DPI rescaling.
const FONT_CATALOG: &[&str] = &[
    "-misc-fixed-medium-r-normal--0-0-0-0-m-0-iso8859-1",
    "-misc-fixed-bold-r-normal--0-0-0-0-m-0-iso8859-1",
    "-misc-fixed-medium-i-normal--0-0-0-0-m-0-iso8859-1",
    "-misc-fixed-medium-r-normal--0-0-0-0-m-0-iso10646-1",
    "-misc-fixed-bold-r-normal--0-0-0-0-m-0-iso10646-1",
    "-misc-serif-medium-r-normal--0-0-0-0-p-0-iso8859-1",
    "-misc-serif-bold-r-normal--0-0-0-0-p-0-iso8859-1",
    "-misc-serif-medium-i-normal--0-0-0-0-p-0-iso8859-1",
    "fixed",
    "cursor",
];

/// Catalog names split into their hyphen-delimited fields, computed once.
static FONT_FIELDS: Lazy<Vec<Vec<&'static str>>> = Lazy::new(|| {
    FONT_CATALOG
        .iter()
        .map(|name| name.split('-').collect())
        .collect()
});

pub struct Font {
    pub base: ResourceBase,
    pub spec: FontSpec,
    pub min_advance: f32,
    pub max_advance: f32,
    pub ascent: i16,
    pub descent: i16,
    pub max_ascent: i16,
    pub max_descent: i16,
    pub max_char: u16,
    pub name_atom: Option<u32>,
}

impl Font {
    /// Build a font from a name. Any name resolves to a typeface; XLFD
    /// names carry style and size in fixed field positions.
    pub fn from_name(
        id: u32,
        owner: Option<u32>,
        name: Option<&str>,
        metrics: &dyn TextMetrics,
    ) -> Self {
        let (spec, max_char) = parse_font_name(name);

        // Advance-width bounds over the first 256 glyphs, fixed for the
        // lifetime of the font.
        let mut min_advance = metrics.advance(&spec, 0);
        let mut max_advance = min_advance;
        for ch in 1u16..256 {
            let advance = metrics.advance(&spec, ch);
            if advance < min_advance {
                min_advance = advance;
            }
            if advance > max_advance {
                max_advance = advance;
            }
        }

        Font {
            base: ResourceBase::new(id, owner),
            ascent: metrics.ascent(&spec),
            descent: metrics.descent(&spec),
            max_ascent: metrics.max_ascent(&spec),
            max_descent: metrics.max_descent(&spec),
            spec,
            min_advance,
            max_advance,
            max_char,
            name_atom: None,
        }
    }

    /// Process an OpenFont request and intern the font name as an atom.
    pub fn process_open(
        server: &XServer,
        client: &mut Client,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining < 8 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcodes::OPEN_FONT, 0);
        }
        let fid = client.reader.read_u32()?;
        let name_len = client.reader.read_u16()? as usize;
        client.reader.skip(2)?;

        let rest = bytes_remaining - 8;
        if rest != padded_len(name_len) {
            client.reader.skip(rest)?;
            return client.send_error(ErrorCode::Length, opcodes::OPEN_FONT, 0);
        }
        let name_bytes = client.reader.read_vec(name_len)?;
        client.reader.skip(rest - name_len)?;
        let name = String::from_utf8_lossy(&name_bytes).to_string();

        let mut font = Font::from_name(fid, Some(client.id), Some(&name), server.metrics());
        font.name_atom = Some(server.atoms.intern(&name));

        client.register(server, Resource::Font(font), opcodes::OPEN_FONT)
    }

    pub(crate) fn process_request(
        &self,
        server: &XServer,
        client: &mut Client,
        opcode: u8,
        arg: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        match opcode {
            opcodes::CLOSE_FONT => {
                if bytes_remaining != 0 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    client.free_resource(server, self.base.id);
                    Ok(())
                }
            }
            opcodes::QUERY_FONT => {
                if bytes_remaining != 0 {
                    client.reader.skip(bytes_remaining)?;
                    client.send_error(ErrorCode::Length, opcode, 0)
                } else {
                    self.write_query_font(server, client)
                }
            }
            opcodes::QUERY_TEXT_EXTENTS => {
                self.handle_query_text_extents(server, client, arg, bytes_remaining)
            }
            _ => {
                client.reader.skip(bytes_remaining)?;
                client.send_error(ErrorCode::Implementation, opcode, 0)
            }
        }
    }

    fn write_query_font(&self, server: &XServer, client: &Client) -> io::Result<()> {
        let name_property = self
            .name_atom
            .map(|atom| (server.atoms.intern("FONT"), atom));

        let mut reply = ReplyBuilder::new(0, client.sequence());
        // Min bounds
        reply
            .put_i16(0)
            .put_i16(0)
            .put_i16(self.min_advance as i16)
            .put_i16(0)
            .put_i16(0)
            .put_u16(0)
            .put_pad(4);
        // Max bounds
        reply
            .put_i16(0)
            .put_i16(self.max_advance as i16)
            .put_i16(self.max_advance as i16)
            .put_i16(self.max_ascent)
            .put_i16(self.max_descent)
            .put_u16(0)
            .put_pad(4);
        reply
            .put_u16(32) // Min char or byte2
            .put_u16(self.max_char)
            .put_u16(32) // Default char
            .put_u16(if name_property.is_some() { 1 } else { 0 })
            .put_u8(0) // Draw direction: left to right
            .put_u8(0) // Min byte 1
            .put_u8(0) // Max byte 1
            .put_u8(0) // All chars exist: false
            .put_i16(self.ascent)
            .put_i16(self.descent)
            .put_u32(0); // No per-char infos
        if let Some((font_atom, value)) = name_property {
            reply.put_u32(font_atom).put_u32(value);
        }
        client.send_reply(&reply.finish())
    }

    /// Answer a QueryTextExtents request. Also the target of fontable
    /// GContexts, which delegate here with their own font.
    pub(crate) fn handle_query_text_extents(
        &self,
        server: &XServer,
        client: &mut Client,
        odd_length: u8,
        bytes_remaining: usize,
    ) -> io::Result<()> {
        if bytes_remaining < 4 || bytes_remaining % 4 != 0 {
            client.reader.skip(bytes_remaining)?;
            return client.send_error(ErrorCode::Length, opcodes::QUERY_TEXT_EXTENTS, 0);
        }
        let pad = if odd_length == 0 { 0 } else { 2 };
        let count = (bytes_remaining - pad) / 2;
        let mut chars = Vec::with_capacity(count);
        for _ in 0..count {
            chars.push(client.reader.read_u16()?);
        }
        client.reader.skip(pad)?;

        let width = server.metrics().text_width(&self.spec, &chars).round() as i32;

        let mut reply = ReplyBuilder::new(0, client.sequence());
        reply
            .put_i16(self.ascent)
            .put_i16(self.descent)
            .put_i16(self.ascent) // Overall ascent
            .put_i16(self.descent) // Overall descent
            .put_i32(width)
            .put_i32(0) // Overall left
            .put_i32(width) // Overall right
            .put_pad(4);
        client.send_reply(&reply.finish())
    }
}

/// Resolve a font name to a typeface spec and the highest encoded
/// character. Field positions follow the 15-field XLFD layout.
fn parse_font_name(name: Option<&str>) -> (FontSpec, u16) {
    let name = match name {
        None => return (FontSpec::new("serif", false, false, DEFAULT_FONT_SIZE), 255),
        Some(n) => n,
    };
    if name.eq_ignore_ascii_case("cursor") {
        return (FontSpec::new("serif", false, false, DEFAULT_FONT_SIZE), 255);
    }
    if name.eq_ignore_ascii_case("fixed") {
        return (
            FontSpec::new("monospace", false, false, DEFAULT_FONT_SIZE),
            255,
        );
    }

    let fields: Vec<&str> = name.split('-').collect();
    if fields.len() != 15 {
        return (FontSpec::new("serif", false, false, DEFAULT_FONT_SIZE), 255);
    }

    let bold = fields[3].eq_ignore_ascii_case("bold");
    let italic = fields[4].eq_ignore_ascii_case("i");
    let size = match fields[7].parse::<u16>() {
        Ok(n) if n > 0 => n,
        _ => DEFAULT_FONT_SIZE,
    };
    let family = if !fields[11].eq_ignore_ascii_case("p") {
        "monospace"
    } else if fields[2].eq_ignore_ascii_case("default") || fields[2].eq_ignore_ascii_case("sans serif")
    {
        "sans serif"
    } else if fields[2].eq_ignore_ascii_case("serif") {
        "serif"
    } else {
        fields[2]
    };
    let max_char = if fields[13].eq_ignore_ascii_case("iso10646") {
        65534
    } else {
        255
    };

    (FontSpec::new(family, bold, italic, size), max_char)
}

/// Does the catalog entry match the pattern? Returns the name to report,
/// which may be a rescaled synthesis of the entry.
fn font_matches_pattern(idx: usize, pattern: &str, pfields: &[&str], dpi: u32) -> Option<String> {
    let name = FONT_CATALOG[idx];

    if pattern == "*" {
        return Some(name.to_string());
    }

    let fields = &FONT_FIELDS[idx];
    if fields.len() < pfields.len() {
        return None;
    }
    if fields.len() == 1 {
        return if pattern.eq_ignore_ascii_case(name) {
            Some(name.to_string())
        } else {
            None
        };
    }

    // A pattern starting with * is matched right-aligned.
    let offset = if pfields[0] == "*" {
        fields.len() - pfields.len()
    } else {
        0
    };
    let mut rescale = false;

    for (i, pfield) in pfields.iter().enumerate() {
        if *pfield == "*" {
            continue;
        }
        let foff = offset + i;
        if foff == 0 || foff == 9 || foff == 10 {
            // Leading empty field; resolution fields never participate.
            continue;
        }
        if fields[foff].eq_ignore_ascii_case(pfield) {
            continue;
        }
        if (7..=8).contains(&foff) {
            rescale = true;
        } else {
            return None;
        }
    }

    if !rescale {
        return Some(name.to_string());
    }

    let mut pixels: i64 = 0;
    let mut points: i64 = 0;
    if offset <= 7 {
        if let Some(f) = pfields.get(7 - offset) {
            pixels = f.parse().unwrap_or(0);
        }
    }
    if offset <= 8 {
        if let Some(f) = pfields.get(8 - offset) {
            points = f.parse().unwrap_or(0);
        }
    }

    if pixels == 0 && points == 0 {
        return Some(name.to_string());
    }
    if pixels == 0 {
        pixels = (points as f64 * dpi as f64 / POINTS_PER_INCH).round() as i64;
    } else if points == 0 {
        points = (pixels as f64 * POINTS_PER_INCH / dpi as f64).round() as i64;
    }

    Some(format!(
        "-{}-{}-{}-{}-{}-{}-{}-{}-{}-{}-{}-{}-{}-{}",
        fields[1],
        fields[2],
        fields[3],
        fields[4],
        fields[5],
        fields[6],
        pixels,
        points,
        dpi,
        dpi,
        fields[11],
        fields[12],
        fields[13],
        fields[14]
    ))
}

/// Process a ListFonts or ListFontsWithInfo request.
pub fn process_list_fonts(
    server: &XServer,
    client: &mut Client,
    opcode: u8,
    bytes_remaining: usize,
) -> io::Result<()> {
    if bytes_remaining < 4 {
        client.reader.skip(bytes_remaining)?;
        return client.send_error(ErrorCode::Length, opcode, 0);
    }
    let max_names = client.reader.read_u16()? as usize;
    let pattern_len = client.reader.read_u16()? as usize;

    let rest = bytes_remaining - 4;
    if rest != padded_len(pattern_len) {
        client.reader.skip(rest)?;
        return client.send_error(ErrorCode::Length, opcode, 0);
    }
    let pattern_bytes = client.reader.read_vec(pattern_len)?;
    client.reader.skip(rest - pattern_len)?;

    let pattern = String::from_utf8_lossy(&pattern_bytes).to_string();
    let pfields: Vec<&str> = pattern.split('-').collect();
    let dpi = server.screen().dpi;

    let mut fonts = Vec::new();
    for idx in 0..FONT_CATALOG.len() {
        if let Some(name) = font_matches_pattern(idx, &pattern, &pfields, dpi) {
            fonts.push(name);
            if fonts.len() >= max_names {
                break;
            }
        }
    }
    log::debug!("ListFonts pattern {:?} matched {} fonts", pattern, fonts.len());

    if opcode == opcodes::LIST_FONTS {
        let mut reply = ReplyBuilder::new(0, client.sequence());
        reply.put_u16(fonts.len() as u16).put_pad(22);
        for name in &fonts {
            reply.put_u8(name.len() as u8);
            reply.put_bytes(name.as_bytes());
        }
        reply.align();
        client.send_reply(&reply.finish())
    } else {
        // One metrics-bearing reply per font; the remaining counter ends
        // at 1 on the last real font.
        let mut remaining = fonts.len();
        for name in &fonts {
            write_font_with_info(server, client, name, remaining as u32)?;
            remaining -= 1;
        }

        // Zero-length terminator.
        let mut reply = ReplyBuilder::new(0, client.sequence());
        reply.put_pad(52);
        client.send_reply(&reply.finish())
    }
}

/// Write one ListFontsWithInfo reply for a named font.
fn write_font_with_info(
    server: &XServer,
    client: &Client,
    name: &str,
    fonts_remaining: u32,
) -> io::Result<()> {
    let font = Font::from_name(0, None, Some(name), server.metrics());
    let name_len = name.len().min(255);

    let mut reply = ReplyBuilder::new(name_len as u8, client.sequence());
    // Min bounds
    reply
        .put_i16(0)
        .put_i16(0)
        .put_i16(font.min_advance as i16)
        .put_i16(0)
        .put_i16(0)
        .put_u16(0)
        .put_pad(4);
    // Max bounds
    reply
        .put_i16(0)
        .put_i16(font.max_advance as i16)
        .put_i16(font.max_advance as i16)
        .put_i16(font.max_ascent)
        .put_i16(font.max_descent)
        .put_u16(0)
        .put_pad(4);
    reply
        .put_u16(32) // Min char or byte2
        .put_u16(font.max_char)
        .put_u16(32) // Default char
        .put_u16(0) // No font properties
        .put_u8(0) // Draw direction: left to right
        .put_u8(0) // Min byte 1
        .put_u8(0) // Max byte 1
        .put_u8(0) // All chars exist: false
        .put_i16(font.ascent)
        .put_i16(font.descent)
        .put_u32(fonts_remaining)
        .put_bytes(&name.as_bytes()[..name_len]);
    reply.align();
    client.send_reply(&reply.finish())
}

/// Process a GetFontPath request.
pub fn process_get_font_path(
    server: &XServer,
    client: &mut Client,
    bytes_remaining: usize,
) -> io::Result<()> {
    if bytes_remaining != 0 {
        client.reader.skip(bytes_remaining)?;
        return client.send_error(ErrorCode::Length, opcodes::GET_FONT_PATH, 0);
    }

    let paths = server.font_path();
    let mut reply = ReplyBuilder::new(0, client.sequence());
    reply.put_u16(paths.len() as u16).put_pad(22);
    for path in &paths {
        reply.put_u8(path.len() as u8);
        reply.put_bytes(path.as_bytes());
    }
    reply.align();
    client.send_reply(&reply.finish())
}

/// Process a SetFontPath request. The STR list is length-checked as it is
/// consumed so a bad request still drains to its declared end.
pub fn process_set_font_path(
    server: &XServer,
    client: &mut Client,
    bytes_remaining: usize,
) -> io::Result<()> {
    if bytes_remaining < 4 {
        client.reader.skip(bytes_remaining)?;
        return client.send_error(ErrorCode::Length, opcodes::SET_FONT_PATH, 0);
    }
    let num_paths = client.reader.read_u16()? as usize;
    client.reader.skip(2)?;
    let mut remaining = bytes_remaining - 4;

    let mut paths = Vec::with_capacity(num_paths);
    let mut length_error = false;
    for _ in 0..num_paths {
        if remaining < 1 {
            length_error = true;
            break;
        }
        let len = client.reader.read_u8()? as usize;
        remaining -= 1;
        if remaining < len {
            length_error = true;
            break;
        }
        let bytes = client.reader.read_vec(len)?;
        remaining -= len;
        paths.push(String::from_utf8_lossy(&bytes).to_string());
    }

    // Only padding may be left over.
    if remaining >= 4 {
        length_error = true;
    }
    client.reader.skip(remaining)?;

    if length_error {
        client.send_error(ErrorCode::Length, opcodes::SET_FONT_PATH, 0)
    } else {
        server.set_font_path(paths);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CellMetrics;

    fn matches(pattern: &str, dpi: u32) -> Vec<String> {
        let pfields: Vec<&str> = pattern.split('-').collect();
        (0..FONT_CATALOG.len())
            .filter_map(|idx| font_matches_pattern(idx, pattern, &pfields, dpi))
            .collect()
    }

    #[test]
    fn test_star_matches_whole_catalog() {
        assert_eq!(matches("*", 96).len(), FONT_CATALOG.len());
    }

    #[test]
    fn test_single_field_alias_matches_exactly() {
        let pfields = vec!["FIXED"];
        let hits: Vec<_> = (0..FONT_CATALOG.len())
            .filter_map(|idx| font_matches_pattern(idx, "FIXED", &pfields, 96))
            .collect();
        assert_eq!(hits, vec!["fixed".to_string()]);
    }

    #[test]
    fn test_wildcard_fields_match() {
        let hits = matches("-*-fixed-*-*-*-*-0-0-*-*-*-*-iso8859-*", 96);
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.contains("-fixed-")));
    }

    #[test]
    fn test_right_aligned_pattern() {
        let hits = matches("*-iso10646-1", 96);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_zero_sizes_return_name_verbatim() {
        let hits = matches("-misc-serif-medium-r-normal--0-0-0-0-p-0-iso8859-1", 96);
        assert_eq!(
            hits,
            vec!["-misc-serif-medium-r-normal--0-0-0-0-p-0-iso8859-1".to_string()]
        );
    }

    #[test]
    fn test_pixel_size_rescales_point_size() {
        let hits = matches("-misc-fixed-medium-r-normal--12-0-*-*-m-0-iso8859-1", 96);
        // round(12 * 72.27 / 96) == 9
        assert_eq!(
            hits,
            vec!["-misc-fixed-medium-r-normal--12-9-96-96-m-0-iso8859-1".to_string()]
        );
    }

    #[test]
    fn test_point_size_rescales_pixel_size() {
        let hits = matches("-misc-fixed-medium-r-normal--0-10-*-*-m-0-iso8859-1", 96);
        // round(10 * 96 / 72.27) == 13
        assert_eq!(
            hits,
            vec!["-misc-fixed-medium-r-normal--13-10-96-96-m-0-iso8859-1".to_string()]
        );
    }

    #[test]
    fn test_mismatched_family_rejected() {
        assert!(matches("-misc-nonexistent-*-*-*-*-*-*-*-*-*-*-*-*", 96).is_empty());
    }

    #[test]
    fn test_parse_xlfd_style_and_size() {
        let (spec, max_char) =
            parse_font_name(Some("-misc-fixed-bold-i-normal--24-0-0-0-m-0-iso10646-1"));
        assert!(spec.bold);
        assert!(spec.italic);
        assert_eq!(spec.size, 24);
        assert_eq!(spec.family, "monospace");
        assert_eq!(max_char, 65534);
    }

    #[test]
    fn test_parse_alias_names() {
        let (spec, max_char) = parse_font_name(Some("fixed"));
        assert_eq!(spec.family, "monospace");
        assert_eq!(spec.size, DEFAULT_FONT_SIZE);
        assert_eq!(max_char, 255);

        let (spec, _) = parse_font_name(Some("cursor"));
        assert_eq!(spec.family, "serif");
    }

    #[test]
    fn test_advance_bounds_fixed_at_creation() {
        let metrics = CellMetrics;
        let font = Font::from_name(1, None, Some("fixed"), &metrics);
        assert!(font.min_advance > 0.0);
        assert!(font.max_advance >= font.min_advance);
        assert_eq!(font.ascent + font.descent, DEFAULT_FONT_SIZE as i16);
    }
}
