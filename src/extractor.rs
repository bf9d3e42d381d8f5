//! Content stream extraction using lopdf
//!
//! This module walks each page's content stream and collects two things:
//! positioned text items and the straight path segments that were painted.
//! The segments are what lattice table detection uses as ruling lines.
//! Form XObjects placed with `Do` are walked as part of the page.

use crate::TallyError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Nesting limit for forms drawing other forms
const MAX_FORM_DEPTH: usize = 8;

/// A `TJ` displacement larger than this (thousandths of an em) is a word gap
const TJ_SPACE_THRESHOLD: f32 = 200.0;

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

type FontMap<'a> = BTreeMap<Vec<u8>, &'a Dictionary>;

/// A text item with position information
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    /// The text content
    pub text: String,
    /// X position on page
    pub x: f32,
    /// Y position on page (PDF coordinates, origin at bottom-left)
    pub y: f32,
    /// Horizontal advance of the shown text on the page
    pub width: f32,
    /// Font name
    pub font: String,
    /// Font size
    pub font_size: f32,
    /// Page number (1-indexed)
    pub page: u32,
}

impl TextItem {
    /// Point used to decide which table cell the item falls into.
    ///
    /// `(x, y)` is the start of the baseline, which sits on or near the
    /// cell's left and bottom edges; nudge it into the glyph box.
    pub fn anchor(&self) -> (f32, f32) {
        (self.x + 1.0, self.y + self.font_size * 0.3)
    }

    /// X position where the text ends
    pub fn end_x(&self) -> f32 {
        self.x + self.width
    }
}

/// A straight path segment in page space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Segment {
    pub fn length(&self) -> f32 {
        ((self.x1 - self.x0).powi(2) + (self.y1 - self.y0).powi(2)).sqrt()
    }
}

/// Everything extracted from one page
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    /// Page number (1-indexed)
    pub page: u32,
    pub text_items: Vec<TextItem>,
    pub segments: Vec<Segment>,
}

/// Load a document from memory
pub fn load_document(buffer: &[u8]) -> Result<Document, TallyError> {
    let doc = Document::load_mem(buffer)?;
    if doc.is_encrypted() {
        return Err(TallyError::Encrypted);
    }
    Ok(doc)
}

/// Extract text and path segments from every page, in document order
pub fn extract_page_contents(
    doc: &Document,
    parallel: bool,
) -> Result<Vec<PageContent>, TallyError> {
    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();

    if parallel {
        // Indexed parallel iterators keep the input order on collect
        pages
            .par_iter()
            .map(|&(page_num, page_id)| extract_page_content(doc, page_id, page_num))
            .collect()
    } else {
        pages
            .iter()
            .map(|&(page_num, page_id)| extract_page_content(doc, page_id, page_num))
            .collect()
    }
}

/// Resource dictionaries of a page: its own first, then inherited ones
pub(crate) fn page_resources(doc: &Document, page_id: ObjectId) -> Vec<&Dictionary> {
    let Ok((inline, ids)) = doc.get_page_resources(page_id) else {
        return Vec::new();
    };
    inline
        .into_iter()
        .chain(ids.into_iter().filter_map(|id| doc.get_dictionary(id).ok()))
        .collect()
}

/// Look up an XObject by its resource name
pub(crate) fn xobject<'a>(
    doc: &'a Document,
    resources: &[&'a Dictionary],
    name: &[u8],
) -> Option<&'a Stream> {
    resources.iter().find_map(|res| {
        let xobjects = res.get_deref(b"XObject", doc).and_then(Object::as_dict).ok()?;
        xobjects.get_deref(name, doc).and_then(Object::as_stream).ok()
    })
}

pub(crate) fn is_form(stream: &Stream) -> bool {
    stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|subtype| subtype == b"Form")
}

/// Raw (decompressed) content of a form XObject
pub(crate) fn form_data(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Resource dictionary carried by a form XObject itself
pub(crate) fn own_resources<'a>(
    doc: &'a Document,
    stream: &'a Stream,
) -> Option<&'a Dictionary> {
    stream
        .dict
        .get_deref(b"Resources", doc)
        .and_then(Object::as_dict)
        .ok()
}

fn resource_fonts<'a>(doc: &'a Document, resources: &'a Dictionary) -> FontMap<'a> {
    let mut fonts = BTreeMap::new();
    if let Ok(font_dict) = resources.get_deref(b"Font", doc).and_then(Object::as_dict) {
        for (name, value) in font_dict.iter() {
            if let Ok((_, font)) = doc.dereference(value) {
                if let Ok(font) = font.as_dict() {
                    fonts.insert(name.clone(), font);
                }
            }
        }
    }
    fonts
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

/// Map a point from user space to page space through the CTM
fn transform_point(ctm: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (
        ctm[0] * x + ctm[2] * y + ctm[4],
        ctm[1] * x + ctm[3] * y + ctm[5],
    )
}

/// Path under construction between a path-building operator and the
/// painting (or discarding) operator that ends it.
#[derive(Default)]
struct PathBuilder {
    segments: Vec<Segment>,
    current: Option<(f32, f32)>,
    subpath_start: Option<(f32, f32)>,
}

impl PathBuilder {
    fn move_to(&mut self, point: (f32, f32)) {
        self.current = Some(point);
        self.subpath_start = Some(point);
    }

    fn line_to(&mut self, point: (f32, f32)) {
        if let Some(from) = self.current {
            self.segments.push(Segment {
                x0: from.0,
                y0: from.1,
                x1: point.0,
                y1: point.1,
            });
        }
        self.current = Some(point);
    }

    fn close(&mut self) {
        if let (Some(current), Some(start)) = (self.current, self.subpath_start) {
            if current != start {
                self.line_to(start);
            }
        }
    }

    fn rectangle(&mut self, corners: [(f32, f32); 4]) {
        self.move_to(corners[0]);
        self.line_to(corners[1]);
        self.line_to(corners[2]);
        self.line_to(corners[3]);
        self.close();
    }

    fn take(&mut self) -> Vec<Segment> {
        self.current = None;
        self.subpath_start = None;
        std::mem::take(&mut self.segments)
    }
}

/// Glyph widths of a font, in thousandths of an em
#[derive(Debug, Clone)]
struct FontMetrics {
    widths: Vec<f32>,
    first_char: i64,
    default_width: f32,
    /// Type0 fonts show two-byte codes
    two_byte: bool,
}

impl FontMetrics {
    fn from_font(doc: &Document, font: Option<&Dictionary>) -> Self {
        let Some(font) = font else {
            return Self::fallback();
        };

        let two_byte = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|subtype| subtype == b"Type0");
        let widths = font
            .get_deref(b"Widths", doc)
            .and_then(Object::as_array)
            .map(|widths| widths.iter().filter_map(get_number).collect())
            .unwrap_or_default();
        let first_char = font
            .get(b"FirstChar")
            .and_then(Object::as_i64)
            .unwrap_or(0);

        const FIXED_PITCH: i64 = 1;
        let flags = font
            .get_deref(b"FontDescriptor", doc)
            .and_then(Object::as_dict)
            .and_then(|descriptor| descriptor.get(b"Flags"))
            .and_then(Object::as_i64)
            .ok();
        let default_width = match flags {
            Some(flags) if flags & FIXED_PITCH != 0 => 600.0,
            Some(_) => 500.0,
            None => 550.0,
        };

        Self {
            widths,
            first_char,
            default_width,
            two_byte,
        }
    }

    fn fallback() -> Self {
        Self {
            widths: Vec::new(),
            first_char: 0,
            default_width: 550.0,
            two_byte: false,
        }
    }

    fn glyph_width(&self, code: u32) -> f32 {
        let index = code as i64 - self.first_char;
        if index >= 0 {
            if let Some(&width) = self.widths.get(index as usize) {
                if width > 0.0 {
                    return width;
                }
            }
        }
        self.default_width
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| pair.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
                .collect()
        } else {
            bytes.iter().map(|&b| b as u32).collect()
        }
    }
}

/// Text state parameters that affect glyph advance
#[derive(Debug, Clone, Copy)]
struct TextState {
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    /// `Tz` as a fraction
    horizontal_scaling: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
        }
    }
}

/// Horizontal advance in text space of showing `bytes`
fn string_advance(bytes: &[u8], metrics: &FontMetrics, state: &TextState) -> f32 {
    metrics
        .codes(bytes)
        .into_iter()
        .map(|code| {
            let mut advance = metrics.glyph_width(code) / 1000.0 * state.font_size
                + state.char_spacing;
            // Word spacing applies to the single-byte space only
            if code == 32 && !metrics.two_byte {
                advance += state.word_spacing;
            }
            advance * state.horizontal_scaling
        })
        .sum()
}

/// Text and text-space advance of a `Tj` string or `TJ` array
fn show_operand(
    operand: &Object,
    doc: &Document,
    font: Option<&Dictionary>,
    metrics: &FontMetrics,
    state: &TextState,
) -> (String, f32) {
    match operand {
        Object::Array(array) => {
            let mut text = String::new();
            let mut advance = 0.0;
            for item in array {
                match item {
                    Object::String(bytes, _) => {
                        text.push_str(&decode_string(bytes, doc, font));
                        advance += string_advance(bytes, metrics, state);
                    }
                    _ => {
                        let Some(displacement) = get_number(item) else {
                            continue;
                        };
                        advance -=
                            displacement / 1000.0 * state.font_size * state.horizontal_scaling;
                        if -displacement > TJ_SPACE_THRESHOLD
                            && !text.is_empty()
                            && !text.ends_with(' ')
                        {
                            text.push(' ');
                        }
                    }
                }
            }
            (text, advance)
        }
        Object::String(bytes, _) => (
            decode_string(bytes, doc, font),
            string_advance(bytes, metrics, state),
        ),
        _ => (String::new(), 0.0),
    }
}

/// Collects text items and painted segments while walking content
struct ContentWalker<'a> {
    doc: &'a Document,
    page: u32,
    text_items: Vec<TextItem>,
    segments: Vec<Segment>,
}

impl<'a> ContentWalker<'a> {
    fn new(doc: &'a Document, page: u32) -> Self {
        Self {
            doc,
            page,
            text_items: Vec::new(),
            segments: Vec::new(),
        }
    }

    /// Walk one content stream (a page or a form) starting from `base_ctm`
    fn walk(
        &mut self,
        operations: &[Operation],
        resources: &[&'a Dictionary],
        fonts: &FontMap<'a>,
        base_ctm: [f32; 6],
        depth: usize,
    ) {
        // Graphics state tracking
        let mut ctm = base_ctm;
        let mut ctm_stack: Vec<[f32; 6]> = Vec::new();
        let mut path = PathBuilder::default();

        // Text state tracking
        let mut metrics_cache: HashMap<String, FontMetrics> = HashMap::new();
        let mut current_font = String::new();
        let mut state = TextState::default();
        let mut leading: f32 = 0.0;
        let mut text_matrix = IDENTITY;
        let mut line_matrix = IDENTITY;
        let mut in_text_block = false;

        for op in operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => ctm_stack.push(ctm),
                "Q" => {
                    if let Some(saved) = ctm_stack.pop() {
                        ctm = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_operands(operands) {
                        ctm = multiply_matrices(&m, &ctm);
                    }
                }
                "Do" => {
                    if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                        self.draw_form(name, resources, fonts, ctm, depth);
                    }
                }

                // Path construction
                "m" => {
                    if let Some((x, y)) = point_operands(operands) {
                        path.move_to(transform_point(&ctm, x, y));
                    }
                }
                "l" => {
                    if let Some((x, y)) = point_operands(operands) {
                        path.line_to(transform_point(&ctm, x, y));
                    }
                }
                "re" => {
                    if operands.len() >= 4 {
                        let x = get_number(&operands[0]).unwrap_or(0.0);
                        let y = get_number(&operands[1]).unwrap_or(0.0);
                        let w = get_number(&operands[2]).unwrap_or(0.0);
                        let h = get_number(&operands[3]).unwrap_or(0.0);
                        path.rectangle([
                            transform_point(&ctm, x, y),
                            transform_point(&ctm, x + w, y),
                            transform_point(&ctm, x + w, y + h),
                            transform_point(&ctm, x, y + h),
                        ]);
                    }
                }
                "c" | "v" | "y" => {
                    // Curves never form rulings; only the end point matters
                    if operands.len() >= 2 {
                        let n = operands.len();
                        if let Some((x, y)) = point_operands(&operands[n - 2..]) {
                            path.current = Some(transform_point(&ctm, x, y));
                        }
                    }
                }
                "h" => path.close(),

                // Path painting
                "S" | "f" | "F" | "f*" | "B" | "B*" => self.segments.extend(path.take()),
                "s" | "b" | "b*" => {
                    path.close();
                    self.segments.extend(path.take());
                }
                "n" => {
                    path.take();
                }

                // Text
                "BT" => {
                    in_text_block = true;
                    text_matrix = IDENTITY;
                    line_matrix = IDENTITY;
                }
                "ET" => in_text_block = false,
                "Tf" => {
                    if operands.len() >= 2 {
                        if let Ok(name) = operands[0].as_name() {
                            current_font = String::from_utf8_lossy(name).to_string();
                        }
                        if let Some(size) = get_number(&operands[1]) {
                            state.font_size = size;
                        }
                    }
                }
                "Tc" => {
                    if let Some(value) = operands.first().and_then(get_number) {
                        state.char_spacing = value;
                    }
                }
                "Tw" => {
                    if let Some(value) = operands.first().and_then(get_number) {
                        state.word_spacing = value;
                    }
                }
                "Tz" => {
                    if let Some(value) = operands.first().and_then(get_number) {
                        state.horizontal_scaling = value / 100.0;
                    }
                }
                "TL" => {
                    if let Some(value) = operands.first().and_then(get_number) {
                        leading = value;
                    }
                }
                "Td" | "TD" => {
                    if let Some((tx, ty)) = point_operands(operands) {
                        if op.operator == "TD" {
                            leading = -ty;
                        }
                        // Translation is expressed in the line matrix's own space
                        line_matrix =
                            multiply_matrices(&[1.0, 0.0, 0.0, 1.0, tx, ty], &line_matrix);
                        text_matrix = line_matrix;
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_operands(operands) {
                        text_matrix = m;
                        line_matrix = m;
                    }
                }
                "T*" => {
                    line_matrix = next_line(&line_matrix, leading, state.font_size);
                    text_matrix = line_matrix;
                }
                "Tj" | "TJ" | "'" | "\"" => {
                    if op.operator == "'" || op.operator == "\"" {
                        line_matrix = next_line(&line_matrix, leading, state.font_size);
                        text_matrix = line_matrix;
                    }
                    // `"` carries word and char spacing before the string
                    if op.operator == "\"" {
                        if let Some((aw, ac)) = point_operands(operands) {
                            state.word_spacing = aw;
                            state.char_spacing = ac;
                        }
                    }
                    if !in_text_block {
                        continue;
                    }
                    let text_operand = if op.operator == "\"" {
                        operands.get(2)
                    } else {
                        operands.first()
                    };
                    let Some(operand) = text_operand else {
                        continue;
                    };

                    let font = fonts.get(current_font.as_bytes()).copied();
                    let metrics = metrics_cache
                        .entry(current_font.clone())
                        .or_insert_with(|| FontMetrics::from_font(self.doc, font));
                    let (text, advance) = show_operand(operand, self.doc, font, metrics, &state);

                    let start = multiply_matrices(&text_matrix, &ctm);
                    text_matrix =
                        multiply_matrices(&[1.0, 0.0, 0.0, 1.0, advance, 0.0], &text_matrix);
                    let end = multiply_matrices(&text_matrix, &ctm);

                    if text.trim().is_empty() {
                        continue;
                    }
                    self.text_items.push(TextItem {
                        text,
                        x: start[4],
                        y: start[5],
                        width: (end[4] - start[4]).max(0.0),
                        font: current_font.clone(),
                        font_size: effective_font_size(state.font_size, &text_matrix),
                        page: self.page,
                    });
                }
                _ => {}
            }
        }
    }

    /// Walk a form XObject placed with `Do`; images and unknown names are skipped
    fn draw_form(
        &mut self,
        name: &[u8],
        resources: &[&'a Dictionary],
        fonts: &FontMap<'a>,
        ctm: [f32; 6],
        depth: usize,
    ) {
        let Some(stream) = xobject(self.doc, resources, name) else {
            return;
        };
        if !is_form(stream) {
            return;
        }
        if depth >= MAX_FORM_DEPTH {
            log::debug!(
                "page {}: form {} nested too deep, skipped",
                self.page,
                String::from_utf8_lossy(name)
            );
            return;
        }

        let content = match Content::decode(&form_data(stream)) {
            Ok(content) => content,
            Err(e) => {
                log::debug!(
                    "page {}: form {} not decodable: {}",
                    self.page,
                    String::from_utf8_lossy(name),
                    e
                );
                return;
            }
        };

        let matrix = stream
            .dict
            .get(b"Matrix")
            .and_then(Object::as_array)
            .ok()
            .and_then(|m| matrix_operands(m.as_slice()))
            .unwrap_or(IDENTITY);
        let form_ctm = multiply_matrices(&matrix, &ctm);

        let own = own_resources(self.doc, stream);
        let resources: Vec<&'a Dictionary> =
            own.into_iter().chain(resources.iter().copied()).collect();
        let mut form_fonts = fonts.clone();
        if let Some(own) = own {
            // Names in the form's own resources shadow the placing stream's
            form_fonts.extend(resource_fonts(self.doc, own));
        }

        self.walk(&content.operations, &resources, &form_fonts, form_ctm, depth + 1);
    }
}

/// Extract text items and painted segments from a single page
fn extract_page_content(
    doc: &Document,
    page_id: ObjectId,
    page_num: u32,
) -> Result<PageContent, TallyError> {
    // Get fonts for encoding
    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
    let resources = page_resources(doc, page_id);

    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| TallyError::Parse(e.to_string()))?;
    let content = Content::decode(&content_data).map_err(|e| TallyError::Parse(e.to_string()))?;

    let mut walker = ContentWalker::new(doc, page_num);
    walker.walk(&content.operations, &resources, &fonts, IDENTITY, 0);

    Ok(PageContent {
        page: page_num,
        text_items: walker.text_items,
        segments: walker.segments,
    })
}

/// Move the line matrix down by one line of text
fn next_line(line_matrix: &[f32; 6], leading: f32, font_size: f32) -> [f32; 6] {
    let step = if leading != 0.0 {
        leading
    } else {
        font_size * 1.2
    };
    multiply_matrices(&[1.0, 0.0, 0.0, 1.0, 0.0, -step], line_matrix)
}

fn point_operands(operands: &[Object]) -> Option<(f32, f32)> {
    if operands.len() < 2 {
        return None;
    }
    Some((get_number(&operands[0])?, get_number(&operands[1])?))
}

fn matrix_operands(operands: &[Object]) -> Option<[f32; 6]> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = [0.0f32; 6];
    for (slot, operand) in m.iter_mut().zip(operands) {
        *slot = get_number(operand)?;
    }
    Some(m)
}

/// Helper to get f32 from Object
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Compute effective font size from base size and text matrix
fn effective_font_size(base_size: f32, text_matrix: &[f32; 6]) -> f32 {
    let scale_x = (text_matrix[0].powi(2) + text_matrix[1].powi(2)).sqrt();
    let scale_y = (text_matrix[2].powi(2) + text_matrix[3].powi(2)).sqrt();
    base_size * scale_x.max(scale_y)
}

/// Decode a shown string, handling the font's encoding
fn decode_string(bytes: &[u8], doc: &Document, font: Option<&Dictionary>) -> String {
    if let Some(font_dict) = font {
        if let Ok(encoding) = font_dict.get_font_encoding(doc) {
            if let Ok(text) = Document::decode_text(&encoding, bytes) {
                return text;
            }
        }
    }

    // Fallback: try UTF-16BE then Latin-1
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    bytes.iter().map(|&b| b as char).collect()
}
