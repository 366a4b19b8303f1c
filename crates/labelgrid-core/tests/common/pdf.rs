//! Synthetic label sheets and inspection of composed output

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};

/// A4 landscape as the label printer exports it
pub const SHEET_WIDTH: f64 = 841.8898;
pub const SHEET_HEIGHT: f64 = 595.2756;

/// Baseline points inside each default template region
pub const REGION_POINTS: [(f64, f64); 3] = [(50.0, 400.0), (320.0, 400.0), (600.0, 400.0)];

pub struct Sheet {
    pub width: f64,
    pub height: f64,
    /// `(x, y, text)` runs drawn with Helvetica 10
    pub texts: Vec<(f64, f64, String)>,
}

impl Sheet {
    /// Correctly sized sheet with one text per region, `None` leaving it empty
    pub fn labels(texts: [Option<&str>; 3]) -> Self {
        let texts = REGION_POINTS
            .iter()
            .zip(texts)
            .filter_map(|(&(x, y), text)| text.map(|t| (x, y, t.to_string())))
            .collect();
        Self {
            width: SHEET_WIDTH,
            height: SHEET_HEIGHT,
            texts,
        }
    }

    pub fn sized(width: f64, height: f64, texts: Vec<(f64, f64, String)>) -> Self {
        Self {
            width,
            height,
            texts,
        }
    }
}

/// Build a PDF with one page per sheet, sharing a single font resource
pub fn build(sheets: &[Sheet]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));

    let mut kids = Vec::new();
    for sheet in sheets {
        let mut operations = Vec::new();
        for (x, y, text) in &sheet.texts {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), Object::Integer(10)],
            ));
            operations.push(Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    Object::Real(*x as f32),
                    Object::Real(*y as f32),
                ],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(text.as_str())]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

        let fonts = Dictionary::from_iter(vec![("F1", Object::Reference(font_id))]);
        let resources = Dictionary::from_iter(vec![("Font", Object::Dictionary(fonts))]);
        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    0.into(),
                    0.into(),
                    Object::Real(sheet.width as f32),
                    Object::Real(sheet.height as f32),
                ]),
            ),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(kids.len() as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// The `cm` matrices drawn on each page of a composed PDF, in content order
pub fn placements(bytes: &[u8]) -> Vec<Vec<[f32; 6]>> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
            content
                .operations
                .iter()
                .filter(|op| op.operator == "cm")
                .map(|op| {
                    let mut m = [0.0f32; 6];
                    for (slot, operand) in m.iter_mut().zip(&op.operands) {
                        *slot = operand.as_float().unwrap();
                    }
                    m
                })
                .collect()
        })
        .collect()
}
