//! Document I/O over lopdf
//!
//! - [`SourceDocument`] / [`SourcePage`]: read-only access to the sheets
//! - [`LabelArtifact`]: one cropped label as a self-contained one-page PDF
//! - [`OutputPage`] / [`OutputDocument`]: the in-memory imposed output,
//!   serialized once at the end of a run
//!
//! Labels are embedded in the output as Form XObjects. Each artifact's
//! objects are imported with remapped ids, so any number of labels from any
//! number of source files can share one output document.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::error::{LabelGridError, Result};
use crate::geometry::{Affine, PageSize, Rect};

/// Page tree depth after which attribute inheritance gives up
const MAX_INHERIT_DEPTH: usize = 32;

/// A parsed source PDF
pub struct SourceDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
}

impl SourceDocument {
    /// Open a PDF file; a missing file is `NotFound`, a damaged one `ParseError`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| LabelGridError::from_read(path, e))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc =
            Document::load_mem(bytes).map_err(|e| LabelGridError::ParseError(e.to_string()))?;
        let page_ids = doc.get_pages().values().copied().collect();
        Ok(Self { doc, page_ids })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Page by 0-based index
    pub fn page(&self, index: usize) -> Option<SourcePage<'_>> {
        self.page_ids.get(index).map(|&id| SourcePage {
            doc: &self.doc,
            index,
            id,
        })
    }

    pub fn pages(&self) -> impl Iterator<Item = SourcePage<'_>> {
        (0..self.page_count()).filter_map(move |i| self.page(i))
    }

    /// MediaBox size of a page, inherited through the page tree
    pub fn page_dimensions(&self, index: usize) -> Result<PageSize> {
        self.page(index)
            .ok_or_else(|| missing_page(index, self.page_count()))?
            .size()
    }

    /// Cut `rect` out of a page as a standalone label.
    ///
    /// The artifact's page is `[0 0 w h]`: content is clipped to the crop and
    /// shifted by `(-x0, -y0)`. Only objects reachable from the page resources
    /// are copied.
    pub fn crop_page(&self, index: usize, rect: &Rect) -> Result<LabelArtifact> {
        let page = self
            .page(index)
            .ok_or_else(|| missing_page(index, self.page_count()))?;
        let content = page.content()?;
        let resources = page.resources().cloned();

        let mut deps = BTreeSet::new();
        if let Some(res) = &resources {
            collect_references(&self.doc, res, &mut deps);
        }

        let mut doc = Document::with_version("1.5");
        for id in deps {
            if let Ok(object) = self.doc.get_object(id) {
                doc.objects.insert(id, object.clone());
            }
        }
        // New objects must not collide with the copied ids
        doc.max_id = self.doc.max_id;

        let bounds = rect.normalized();
        let body = crop_content(&content, rect)?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), body));

        let pages_id = doc.new_object_id();
        let mut page_dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("MediaBox", rect_to_array(&bounds)),
            ("Contents", Object::Reference(content_id)),
        ]);
        if let Some(res) = resources {
            page_dict.set("Resources", res);
        }
        let page_id = doc.add_object(page_dict);
        finish_page_tree(&mut doc, pages_id, vec![page_id]);

        Ok(LabelArtifact {
            document: doc,
            page_id,
            visible: bounds,
            origin: None,
        })
    }
}

/// Borrowed view of one page of a loaded PDF
#[derive(Clone, Copy)]
pub struct SourcePage<'a> {
    doc: &'a Document,
    index: usize,
    id: ObjectId,
}

impl<'a> SourcePage<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> Result<PageSize> {
        let media_box = inherited_attribute(self.doc, self.id, b"MediaBox").ok_or_else(|| {
            LabelGridError::ParseError(format!("page {} has no MediaBox", self.index + 1))
        })?;
        let rect = parse_rect(self.doc, media_box)?;
        Ok(PageSize::new(rect.width(), rect.height()))
    }

    /// Decoded, concatenated content streams
    pub fn content(&self) -> Result<Vec<u8>> {
        self.doc
            .get_page_content(self.id)
            .map_err(|e| LabelGridError::ParseError(format!("page {}: {}", self.index + 1, e)))
    }

    /// Resource dictionary (or reference to it), inherited if necessary
    pub fn resources(&self) -> Option<&'a Object> {
        inherited_attribute(self.doc, self.id, b"Resources")
    }

    pub(crate) fn document(&self) -> &'a Document {
        self.doc
    }
}

/// Where on the source an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactOrigin {
    /// 0-based source page index
    pub sheet: usize,
    /// Index into the template list
    pub template: usize,
}

/// One extracted label: a single-page document whose visible area is the crop
#[derive(Debug, Clone)]
pub struct LabelArtifact {
    document: Document,
    page_id: ObjectId,
    /// Visible box in the artifact's own page space
    visible: Rect,
    origin: Option<ArtifactOrigin>,
}

impl LabelArtifact {
    /// Load a previously saved label from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| LabelGridError::from_read(path, e))?;
        Self::from_bytes(&bytes)
    }

    /// Parse a one-page PDF. The visible area is the CropBox if present,
    /// otherwise the MediaBox.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let document =
            Document::load_mem(bytes).map_err(|e| LabelGridError::ParseError(e.to_string()))?;
        let pages = document.get_pages();
        if pages.len() != 1 {
            return Err(LabelGridError::ParseError(format!(
                "label must have exactly one page, found {}",
                pages.len()
            )));
        }
        let page_id = *pages
            .values()
            .next()
            .ok_or_else(|| LabelGridError::ParseError("label has no pages".into()))?;

        let visible_box = inherited_attribute(&document, page_id, b"CropBox")
            .or_else(|| inherited_attribute(&document, page_id, b"MediaBox"))
            .ok_or_else(|| LabelGridError::ParseError("label page has no MediaBox".into()))?;
        let visible = parse_rect(&document, visible_box)?;

        Ok(Self {
            document,
            page_id,
            visible,
            origin: None,
        })
    }

    pub(crate) fn with_origin(mut self, origin: ArtifactOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Origin-based bounding box: `[0 0 width height]`
    pub fn bounds(&self) -> Rect {
        self.visible.normalized()
    }

    pub fn origin(&self) -> Option<ArtifactOrigin> {
        self.origin
    }

    /// View of the label page, for probing its text
    pub fn page(&self) -> SourcePage<'_> {
        SourcePage {
            doc: &self.document,
            index: 0,
            id: self.page_id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut doc = self.document.clone();
        doc.compress();
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| LabelGridError::OperationError(format!("Save failed: {}", e)))?;
        Ok(buffer)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|e| LabelGridError::io(path, e))
    }
}

/// A label drawn on an output page under an affine transform
#[derive(Debug, Clone)]
pub struct Layer {
    artifact: LabelArtifact,
    transform: Affine,
}

impl Layer {
    pub fn artifact(&self) -> &LabelArtifact {
        &self.artifact
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Area the label covers on the output page
    pub fn footprint(&self) -> Rect {
        self.artifact.bounds().transformed(&self.transform)
    }
}

/// One output page, held as an ordered list of layers (first drawn first)
#[derive(Debug, Clone)]
pub struct OutputPage {
    size: PageSize,
    layers: Vec<Layer>,
}

impl OutputPage {
    pub fn blank(size: PageSize) -> Self {
        Self {
            size,
            layers: Vec::new(),
        }
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Draw `artifact` on top of the current content under `transform`
    pub fn merge_transformed(&mut self, artifact: LabelArtifact, transform: Affine) {
        self.layers.push(Layer {
            artifact,
            transform,
        });
    }

    /// Draw another page on top of this one at identity
    pub fn merge_page(&mut self, overlay: OutputPage) {
        self.layers.extend(overlay.layers);
    }
}

/// The imposed output. Always holds at least one page.
#[derive(Debug, Clone)]
pub struct OutputDocument {
    page_size: PageSize,
    pages: Vec<OutputPage>,
}

impl OutputDocument {
    /// New document with one blank page
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            pages: vec![OutputPage::blank(page_size)],
        }
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&OutputPage> {
        self.pages.get(index)
    }

    pub fn pages(&self) -> &[OutputPage] {
        &self.pages
    }

    /// Append a blank page and return its index
    pub fn append_blank_page(&mut self) -> usize {
        self.pages.push(OutputPage::blank(self.page_size));
        self.pages.len() - 1
    }

    /// Swap in `page` at `index`, returning what was there
    pub fn replace_page(&mut self, index: usize, page: OutputPage) -> Result<OutputPage> {
        let page_count = self.pages.len();
        let slot = self
            .pages
            .get_mut(index)
            .ok_or(LabelGridError::Placement { page: index, page_count })?;
        Ok(std::mem::replace(slot, page))
    }

    /// Build the PDF object graph for the whole document
    pub fn to_document(&self) -> Result<Document> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut page_ids = Vec::with_capacity(self.pages.len());

        for page in &self.pages {
            let mut xobjects = Dictionary::new();
            let mut operations = Vec::new();

            for (n, layer) in page.layers.iter().enumerate() {
                let form_id = embed_artifact(&mut doc, &layer.artifact)?;
                let name = format!("Lbl{}", n);
                xobjects.set(name.clone(), Object::Reference(form_id));

                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new("cm", reals(&layer.transform.to_array())));
                operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
                operations.push(Operation::new("Q", vec![]));
            }

            let content = Content { operations }
                .encode()
                .map_err(|e| LabelGridError::OperationError(format!("Encode failed: {}", e)))?;
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

            let resources = Dictionary::from_iter(vec![("XObject", Object::Dictionary(xobjects))]);
            let media_box = Rect::from_size(page.size.width, page.size.height)?;
            let page_dict = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("MediaBox", rect_to_array(&media_box)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Dictionary(resources)),
            ]);
            page_ids.push(doc.add_object(page_dict));
        }

        finish_page_tree(&mut doc, pages_id, page_ids);

        // Imported label page trees are unreachable once their content lives
        // in a form; drop them.
        doc.prune_objects();
        doc.compress();
        Ok(doc)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut doc = self.to_document()?;
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| LabelGridError::OperationError(format!("Save failed: {}", e)))?;
        Ok(buffer)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|e| LabelGridError::io(path, e))
    }
}

/// Import an artifact's objects and wrap its page as a Form XObject
fn embed_artifact(doc: &mut Document, artifact: &LabelArtifact) -> Result<ObjectId> {
    let id_offset = doc.max_id;
    for (&(num, gen), object) in &artifact.document.objects {
        let mut object = object.clone();
        shift_references(&mut object, id_offset);
        doc.objects.insert((num + id_offset, gen), object);
    }
    doc.max_id = doc.max_id.max(artifact.document.max_id + id_offset);

    let page = artifact.page();
    let content = page.content()?;

    let visible = artifact.visible;
    let mut form = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Form".to_vec())),
        ("BBox", rect_to_array(&visible)),
    ]);
    if visible.x0() != 0.0 || visible.y0() != 0.0 {
        let shift = Affine::translate(-visible.x0(), -visible.y0());
        form.set("Matrix", Object::Array(reals(&shift.to_array())));
    }
    if let Some(res) = page.resources() {
        let mut res = res.clone();
        shift_references(&mut res, id_offset);
        form.set("Resources", res);
    }

    Ok(doc.add_object(Stream::new(form, content)))
}

/// Clip to the crop and move its lower-left corner to the origin
fn crop_content(content: &[u8], rect: &Rect) -> Result<Vec<u8>> {
    let prologue = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("re", reals(&[0.0, 0.0, rect.width(), rect.height()])),
            Operation::new("W", vec![]),
            Operation::new("n", vec![]),
            Operation::new(
                "cm",
                reals(&Affine::translate(-rect.x0(), -rect.y0()).to_array()),
            ),
        ],
    };
    let mut body = prologue
        .encode()
        .map_err(|e| LabelGridError::OperationError(format!("Encode failed: {}", e)))?;
    body.push(b'\n');
    body.extend_from_slice(content);
    body.extend_from_slice(b"\nQ\n");
    Ok(body)
}

/// Add the Pages node and Catalog, and point the trailer at them
fn finish_page_tree(doc: &mut Document, pages_id: ObjectId, page_ids: Vec<ObjectId>) {
    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.into_iter().map(Object::Reference).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));
}

/// Follow a reference, if `object` is one
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up a page attribute, walking `/Parent` for inheritable keys
fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Parse a PDF box array, tolerating swapped corners
fn parse_rect(doc: &Document, object: &Object) -> Result<Rect> {
    let array = resolve(doc, object)
        .and_then(|o| o.as_array().ok())
        .ok_or_else(|| LabelGridError::ParseError("box is not an array".into()))?;
    if array.len() != 4 {
        return Err(LabelGridError::ParseError(format!(
            "box has {} elements, expected 4",
            array.len()
        )));
    }
    let mut values = [0.0f64; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = resolve(doc, item)
            .and_then(number)
            .ok_or_else(|| LabelGridError::ParseError("box element is not a number".into()))?;
    }
    Rect::new(
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    )
    .map_err(|e| LabelGridError::ParseError(e.to_string()))
}

pub(crate) fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn reals(values: &[f64]) -> Vec<Object> {
    values.iter().map(|&v| Object::Real(v as _)).collect()
}

fn rect_to_array(rect: &Rect) -> Object {
    Object::Array(reals(&[rect.x0(), rect.y0(), rect.x1(), rect.y1()]))
}

fn missing_page(index: usize, count: usize) -> LabelGridError {
    LabelGridError::OperationError(format!(
        "page {} does not exist (document has {} pages)",
        index + 1,
        count
    ))
}

/// Collect every object reachable from `object`, not following `/Parent`
fn collect_references(doc: &Document, object: &Object, collected: &mut BTreeSet<ObjectId>) {
    match object {
        Object::Reference(id) => {
            if collected.insert(*id) {
                if let Ok(target) = doc.get_object(*id) {
                    collect_references(doc, target, collected);
                }
            }
        }
        Object::Array(items) => {
            for item in items {
                collect_references(doc, item, collected);
            }
        }
        Object::Dictionary(dict) => collect_dict_references(doc, dict, collected),
        Object::Stream(stream) => collect_dict_references(doc, &stream.dict, collected),
        _ => {}
    }
}

fn collect_dict_references(doc: &Document, dict: &Dictionary, collected: &mut BTreeSet<ObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            collect_references(doc, value, collected);
        }
    }
}

/// Move every reference inside `object` up by `offset` ids
fn shift_references(object: &mut Object, offset: u32) {
    match object {
        Object::Reference((num, _)) => *num += offset,
        Object::Array(items) => {
            for item in items {
                shift_references(item, offset);
            }
        }
        Object::Dictionary(dict) => shift_dict_references(dict, offset),
        Object::Stream(stream) => shift_dict_references(&mut stream.dict, offset),
        _ => {}
    }
}

fn shift_dict_references(dict: &mut Dictionary, offset: u32) {
    for (_, value) in dict.iter_mut() {
        shift_references(value, offset);
    }
}
