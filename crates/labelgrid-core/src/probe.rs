//! Text probe: what text is visible inside a rectangle of a page
//!
//! The content-stream probe tracks just enough graphics and text state to
//! place each shown string. Glyph advances are not tracked (no font
//! metrics), so a string is attributed wholly to the point where it starts.
//! Strings are decoded through the current font's ToUnicode map when it has
//! one.

use lopdf::content::Content;
use lopdf::{Document, Object, Stream};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::document::{number, resolve, SourcePage};
use crate::font::FontDecoder;
use crate::geometry::{Affine, Rect};

/// Form XObject nesting depth the default probe will follow
const DEFAULT_MAX_FORM_DEPTH: usize = 8;

/// Read text strictly inside a rectangle of a page
pub trait TextProbe {
    /// Empty string when no text is found
    fn extract_text(&self, page: &SourcePage<'_>, rect: &Rect) -> String;
}

/// A shown string and where it starts, in page space
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// Probe that interprets the page content stream with lopdf
#[derive(Debug, Clone)]
pub struct ContentStreamProbe {
    max_form_depth: usize,
}

impl Default for ContentStreamProbe {
    fn default() -> Self {
        Self {
            max_form_depth: DEFAULT_MAX_FORM_DEPTH,
        }
    }
}

impl ContentStreamProbe {
    pub fn new(max_form_depth: usize) -> Self {
        Self { max_form_depth }
    }

    /// Every text run on the page, in content order
    pub fn text_runs(&self, page: &SourcePage<'_>) -> Vec<TextRun> {
        let content = match page.content() {
            Ok(content) => content,
            Err(e) => {
                warn!("Unreadable content on page {}: {}", page.index() + 1, e);
                return Vec::new();
            }
        };
        let mut runs = Vec::new();
        self.walk(
            page.document(),
            &content,
            page.resources(),
            Affine::IDENTITY,
            0,
            &mut runs,
        );
        runs
    }

    fn walk(
        &self,
        doc: &Document,
        content: &[u8],
        resources: Option<&Object>,
        base: Affine,
        depth: usize,
        runs: &mut Vec<TextRun>,
    ) {
        let operations = match Content::decode(content) {
            Ok(content) => content.operations,
            Err(e) => {
                debug!("Skipping undecodable content stream: {}", e);
                return;
            }
        };

        let mut ctm = base;
        let mut font: Option<Vec<u8>> = None;
        let mut saved = Vec::new();
        let mut text = TextState::default();
        let mut fonts: HashMap<Vec<u8>, FontDecoder> = HashMap::new();
        let raw = FontDecoder::default();

        for op in &operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => saved.push((ctm, font.clone())),
                "Q" => {
                    if let Some((previous, previous_font)) = saved.pop() {
                        ctm = previous;
                        font = previous_font;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix(operands) {
                        ctm = m.then(&ctm);
                    }
                }
                "BT" => text = TextState::default(),
                "Tf" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        if !fonts.contains_key(name) {
                            let decoder = FontDecoder::lookup(doc, resources, name)
                                .unwrap_or_default();
                            fonts.insert(name.clone(), decoder);
                        }
                        font = Some(name.clone());
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix(operands) {
                        text.matrix = m;
                        text.line = m;
                    }
                }
                "Td" | "TD" => {
                    if let [tx, ty] = numbers(operands)[..] {
                        if op.operator == "TD" {
                            text.leading = -ty;
                        }
                        text.move_line(tx, ty);
                    }
                }
                "TL" => {
                    if let [leading] = numbers(operands)[..] {
                        text.leading = leading;
                    }
                }
                "T*" => text.next_line(),
                "Tj" | "TJ" => {
                    let decoder = current_font(&fonts, &font, &raw);
                    push_run(runs, &text, &ctm, operands.first(), decoder);
                }
                "'" => {
                    text.next_line();
                    let decoder = current_font(&fonts, &font, &raw);
                    push_run(runs, &text, &ctm, operands.first(), decoder);
                }
                "\"" => {
                    text.next_line();
                    let decoder = current_font(&fonts, &font, &raw);
                    push_run(runs, &text, &ctm, operands.get(2), decoder);
                }
                "Do" if depth < self.max_form_depth => {
                    let Some(Object::Name(name)) = operands.first() else {
                        continue;
                    };
                    if let Some(form) = lookup_form(doc, resources, name) {
                        let form_matrix = form
                            .dict
                            .get(b"Matrix")
                            .ok()
                            .and_then(|m| m.as_array().ok())
                            .and_then(|m| matrix(m))
                            .unwrap_or(Affine::IDENTITY);
                        let form_content = form
                            .decompressed_content()
                            .unwrap_or_else(|_| form.content.clone());
                        let form_resources = form.dict.get(b"Resources").ok().or(resources);
                        self.walk(
                            doc,
                            &form_content,
                            form_resources,
                            form_matrix.then(&ctm),
                            depth + 1,
                            runs,
                        );
                    }
                }
                _ => {}
            }
        }
    }
}

impl TextProbe for ContentStreamProbe {
    fn extract_text(&self, page: &SourcePage<'_>, rect: &Rect) -> String {
        self.text_runs(page)
            .into_iter()
            .filter(|run| rect.contains_strict(run.x, run.y))
            .map(|run| run.text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy)]
struct TextState {
    matrix: Affine,
    line: Affine,
    leading: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: Affine::IDENTITY,
            line: Affine::IDENTITY,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line = Affine::translate(tx, ty).then(&self.line);
        self.matrix = self.line;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }
}

fn push_run(
    runs: &mut Vec<TextRun>,
    text: &TextState,
    ctm: &Affine,
    operand: Option<&Object>,
    font: &FontDecoder,
) {
    let Some(decoded) = operand.and_then(|o| decode_text(o, font)) else {
        return;
    };
    if decoded.trim().is_empty() {
        return;
    }
    let (x, y) = text.matrix.then(ctm).apply(0.0, 0.0);
    runs.push(TextRun { x, y, text: decoded });
}

/// Decoder for the font selected by the last `Tf`
fn current_font<'f>(
    fonts: &'f HashMap<Vec<u8>, FontDecoder>,
    font: &Option<Vec<u8>>,
    raw: &'f FontDecoder,
) -> &'f FontDecoder {
    font.as_ref().and_then(|name| fonts.get(name)).unwrap_or(raw)
}

fn lookup_form<'a>(
    doc: &'a Document,
    resources: Option<&'a Object>,
    name: &[u8],
) -> Option<&'a Stream> {
    let resources = resolve(doc, resources?)?.as_dict().ok()?;
    let xobjects = resolve(doc, resources.get(b"XObject").ok()?)?.as_dict().ok()?;
    let stream = resolve(doc, xobjects.get(name).ok()?)?.as_stream().ok()?;
    match stream.dict.get(b"Subtype") {
        Ok(Object::Name(subtype)) if subtype.as_slice() == b"Form" => Some(stream),
        _ => None,
    }
}

fn numbers(operands: &[Object]) -> Vec<f64> {
    operands.iter().filter_map(number).collect()
}

fn matrix(operands: &[Object]) -> Option<Affine> {
    match numbers(operands)[..] {
        [a, b, c, d, e, f] => Some(Affine::new(a, b, c, d, e, f)),
        _ => None,
    }
}

/// Decode a string operand (or TJ array) to text with `font`
fn decode_text(operand: &Object, font: &FontDecoder) -> Option<String> {
    match operand {
        Object::String(bytes, _) => Some(font.decode(bytes)),
        Object::Array(items) => {
            let mut text = String::new();
            for item in items {
                match item {
                    Object::String(bytes, _) => text.push_str(&font.decode(bytes)),
                    // Large negative kerning reads as a word gap
                    Object::Integer(n) if *n < -100 => text.push(' '),
                    Object::Real(n) if *n < -100.0 => text.push(' '),
                    _ => {}
                }
            }
            Some(text)
        }
        _ => None,
    }
}
