// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF document library backed by the `lopdf` crate.
//
// Implements the page-level capabilities the composition driver and the
// recovery cascade need: tolerant loading, page copying between documents,
// rotation, and stamping text or images onto existing pages.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use pagewerk_core::error::{PagewerkError, Result};
use pagewerk_core::types::CompressionLevel;
use tracing::{debug, instrument, warn};

use crate::library::{
    DocumentLibrary, EmbeddedImage, ImageDraw, LoadOptions, PageDocument, PageSize, SaveOptions,
    TextDraw,
};
use crate::rotation::normalize_degrees;

/// Depth limit when walking up the page tree for inherited attributes.
const MAX_TREE_DEPTH: usize = 32;

/// US Letter, used when a page has no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Page attributes that may be inherited from an ancestor /Pages node.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Resource names used for stamps. Chosen to be unlikely to collide with
/// names already present in a page's resources.
const STAMP_FONT: &[u8] = b"PwStampF1";

/// Helvetica-Bold advance widths for WinAnsi codes 32..=126, in 1/1000 em.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // space../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 0..?
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // P.._
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // `..o
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // p..~
];

/// Creates and parses PDF documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLibrary;

/// A parsed PDF with its pages in reading order.
pub struct PdfFile {
    document: Document,
    page_ids: Vec<ObjectId>,
    /// Stamp font, added on first text draw.
    stamp_font: Option<ObjectId>,
}

impl DocumentLibrary for PdfLibrary {
    type Document = PdfFile;

    fn create(&self) -> PdfFile {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        document.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(Vec::new())),
                ("Count", Object::Integer(0)),
            ])),
        );
        let catalog_id = document.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        document.trailer.set("Root", Object::Reference(catalog_id));

        PdfFile {
            document,
            page_ids: Vec::new(),
            stamp_font: None,
        }
    }

    #[instrument(skip_all, fields(bytes_len = bytes.len(), lenient = options.lenient))]
    fn load(&self, bytes: &[u8], options: LoadOptions) -> Result<PdfFile> {
        let mut document = if options.lenient {
            load_lenient(bytes)?
        } else if !bytes.starts_with(b"%PDF-") {
            return Err(PagewerkError::Parse(
                "strict parse failed: missing %PDF- header at offset 0".into(),
            ));
        } else {
            Document::load_mem(bytes)
                .map_err(|err| PagewerkError::Parse(format!("strict parse failed: {err}")))?
        };

        // Encryption dictionaries are dropped so the output is written in the clear.
        if document.trailer.remove(b"Encrypt").is_some() {
            debug!("ignoring encryption dictionary");
        }

        if !options.lenient {
            page_tree_root(&document)?;
        }

        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();

        if !options.tolerate_invalid_objects {
            for (index, &page_id) in page_ids.iter().enumerate() {
                check_page(&document, page_id).map_err(|reason| {
                    PagewerkError::Parse(format!("invalid object for page {}: {reason}", index + 1))
                })?;
            }
        }

        debug!(pages = page_ids.len(), "PDF loaded");

        Ok(PdfFile {
            document,
            page_ids,
            stamp_font: None,
        })
    }
}

impl PdfFile {
    fn page_id(&self, index: usize) -> Result<ObjectId> {
        self.page_ids
            .get(index)
            .copied()
            .ok_or(PagewerkError::PageOutOfRange {
                page: index + 1,
                count: self.page_ids.len(),
            })
    }

    fn page_dict_mut(&mut self, page_id: ObjectId) -> Result<&mut Dictionary> {
        self.document
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| PagewerkError::Parse(format!("page object {page_id:?}: {err}")))
    }

    /// The root /Pages node, created if the document has none.
    fn ensure_page_tree(&mut self) -> Result<ObjectId> {
        if let Ok(pages_id) = page_tree_root(&self.document) {
            return Ok(pages_id);
        }

        warn!("document has no page tree, creating one");
        let pages_id = self.document.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(Vec::new())),
            ("Count", Object::Integer(0)),
        ]));
        let catalog_id = self.document.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        self.document.trailer.set("Root", Object::Reference(catalog_id));
        Ok(pages_id)
    }

    fn ensure_stamp_font(&mut self) -> ObjectId {
        if let Some(id) = self.stamp_font {
            return id;
        }
        let id = self.document.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica-Bold".to_vec())),
            ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
        ]));
        self.stamp_font = Some(id);
        id
    }

    fn add_opacity_state(&mut self, opacity: f32) -> ObjectId {
        self.document.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"ExtGState".to_vec())),
            ("ca", Object::Real(opacity)),
            ("CA", Object::Real(opacity)),
        ]))
    }

    /// Register `entries` under `category` (/Font, /ExtGState, /XObject) in
    /// the page's resources, materialising inherited or indirect resources
    /// as an inline dictionary on the page.
    fn add_page_resources(
        &mut self,
        page_id: ObjectId,
        category: &[u8],
        entries: &[(&[u8], ObjectId)],
    ) -> Result<()> {
        let mut resources = inherited(&self.document, page_id, b"Resources")
            .and_then(|obj| owned_dict(&self.document, &obj))
            .unwrap_or_default();

        let mut group = resources
            .get(category)
            .ok()
            .and_then(|obj| owned_dict(&self.document, obj))
            .unwrap_or_default();
        for (name, id) in entries {
            group.set(name.to_vec(), Object::Reference(*id));
        }
        resources.set(category.to_vec(), Object::Dictionary(group));

        self.page_dict_mut(page_id)?
            .set("Resources", Object::Dictionary(resources));
        Ok(())
    }

    /// Append `operations` to the page, isolated from the existing content's
    /// graphics state by wrapping that content in q/Q.
    fn append_content(&mut self, page_id: ObjectId, operations: Vec<Operation>) -> Result<()> {
        let stamp = Content { operations }
            .encode()
            .map_err(|err| PagewerkError::Save(format!("cannot encode stamp: {err}")))?;

        let mut closing = b"Q\n".to_vec();
        closing.extend_from_slice(&stamp);

        let open_id = self
            .document
            .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let close_id = self
            .document
            .add_object(Stream::new(Dictionary::new(), closing));

        let page = self.page_dict_mut(page_id)?;
        let mut contents = vec![Object::Reference(open_id)];
        match page.get(b"Contents") {
            Ok(Object::Array(existing)) => contents.extend(existing.iter().cloned()),
            Ok(existing @ Object::Reference(_)) => contents.push(existing.clone()),
            _ => {}
        }
        contents.push(Object::Reference(close_id));
        page.set("Contents", Object::Array(contents));
        Ok(())
    }

    /// Clone one page of `source` into this document, returning the new,
    /// not yet placed, page object.
    fn clone_page(
        &mut self,
        source: &PdfFile,
        index: usize,
        cloner: &mut ObjectCloner<'_>,
    ) -> Result<ObjectId> {
        let copy_error = |reason: String| PagewerkError::Copy {
            page: index,
            reason,
        };

        let page_id = source.page_id(index)?;
        check_page(&source.document, page_id).map_err(copy_error)?;

        let mut page = source
            .document
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|err| copy_error(err.to_string()))?
            .clone();

        // A page leaving its tree takes its inherited attributes with it.
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited(&source.document, page_id, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }

        let new_id = self.document.new_object_id();
        cloner.map.insert(page_id, new_id);
        let cloned = cloner.clone_object(&mut self.document, &Object::Dictionary(page));
        self.document.objects.insert(new_id, cloned);
        Ok(new_id)
    }
}

impl PageDocument for PdfFile {
    type PageRef = ObjectId;
    type Image = ObjectId;

    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_size(&self, index: usize) -> Result<PageSize> {
        let [llx, lly, urx, ury] = media_box(&self.document, self.page_id(index)?);
        Ok(PageSize::new((urx - llx).abs(), (ury - lly).abs()))
    }

    fn page_rotation(&self, index: usize) -> Result<i32> {
        let rotation = inherited(&self.document, self.page_id(index)?, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0);
        Ok(normalize_degrees(rotation as i32))
    }

    fn copy_pages(&mut self, source: &Self, indices: &[usize]) -> Result<Vec<ObjectId>> {
        let mut cloner = ObjectCloner::new(&source.document);
        indices
            .iter()
            .map(|&index| self.clone_page(source, index, &mut cloner))
            .collect()
    }

    fn add_page(&mut self, page: ObjectId) -> Result<()> {
        let pages_id = self.ensure_page_tree()?;

        let pages = self
            .document
            .get_object_mut(pages_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| PagewerkError::Parse(format!("page tree root: {err}")))?;

        match pages.get_mut(b"Kids") {
            Ok(Object::Array(kids)) => kids.push(Object::Reference(page)),
            _ => pages.set("Kids", Object::Array(vec![Object::Reference(page)])),
        }
        let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        pages.set("Count", Object::Integer(count + 1));

        self.page_dict_mut(page)?
            .set("Parent", Object::Reference(pages_id));
        self.page_ids.push(page);
        Ok(())
    }

    fn set_rotation(&mut self, index: usize, degrees: i32) -> Result<()> {
        let page_id = self.page_id(index)?;
        self.page_dict_mut(page_id)?
            .set("Rotate", Object::Integer(i64::from(normalize_degrees(degrees))));
        Ok(())
    }

    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let units: u32 = encode_win_ansi(text)
            .iter()
            .map(|&b| u32::from(HELVETICA_BOLD_WIDTHS[usize::from(b - 32)]))
            .sum();
        units as f32 * font_size / 1000.0
    }

    fn embed_image(&mut self, bytes: &[u8]) -> Result<EmbeddedImage<ObjectId>> {
        let decoded = ::image::load_from_memory(bytes)
            .map_err(|err| PagewerkError::Image(format!("failed to decode watermark image: {err}")))?;
        let (width, height) = (decoded.width(), decoded.height());

        let mut dict = Dictionary::from_iter([
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(i64::from(width))),
            ("Height", Object::Integer(i64::from(height))),
            ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
            ("BitsPerComponent", Object::Integer(8)),
        ]);

        if decoded.color().has_alpha() {
            let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p.0[3]).collect();
            let mask_id = self.document.add_object(Stream::new(
                Dictionary::from_iter([
                    ("Type", Object::Name(b"XObject".to_vec())),
                    ("Subtype", Object::Name(b"Image".to_vec())),
                    ("Width", Object::Integer(i64::from(width))),
                    ("Height", Object::Integer(i64::from(height))),
                    ("ColorSpace", Object::Name(b"DeviceGray".to_vec())),
                    ("BitsPerComponent", Object::Integer(8)),
                ]),
                alpha,
            ));
            dict.set("SMask", Object::Reference(mask_id));
        }

        let handle = self
            .document
            .add_object(Stream::new(dict, decoded.to_rgb8().into_raw()));
        debug!(width, height, "image embedded");

        Ok(EmbeddedImage {
            handle,
            width,
            height,
        })
    }

    fn draw_text(&mut self, index: usize, draw: &TextDraw) -> Result<()> {
        let page_id = self.page_id(index)?;
        let font_id = self.ensure_stamp_font();
        let gs_id = self.add_opacity_state(draw.opacity);
        let gs_name = format!("PwStampGS{}", gs_id.0).into_bytes();

        self.add_page_resources(page_id, b"Font", &[(STAMP_FONT, font_id)])?;
        self.add_page_resources(page_id, b"ExtGState", &[(gs_name.as_slice(), gs_id)])?;

        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(gs_name)]),
        ];
        operations.push(placement(draw.x, draw.y, draw.rotation));
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(STAMP_FONT.to_vec()), Object::Real(draw.font_size)],
            ),
            Operation::new(
                "rg",
                vec![
                    Object::Real(draw.color.r),
                    Object::Real(draw.color.g),
                    Object::Real(draw.color.b),
                ],
            ),
            Operation::new("Td", vec![Object::Integer(0), Object::Integer(0)]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(&draw.text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);

        self.append_content(page_id, operations)
    }

    fn draw_image(&mut self, index: usize, image: &ObjectId, draw: &ImageDraw) -> Result<()> {
        let page_id = self.page_id(index)?;
        let gs_id = self.add_opacity_state(draw.opacity);
        let gs_name = format!("PwStampGS{}", gs_id.0).into_bytes();
        let image_name = format!("PwStampIm{}", image.0).into_bytes();

        self.add_page_resources(page_id, b"ExtGState", &[(gs_name.as_slice(), gs_id)])?;
        self.add_page_resources(page_id, b"XObject", &[(image_name.as_slice(), *image)])?;

        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(gs_name)]),
            placement(draw.x, draw.y, draw.rotation),
            Operation::new(
                "cm",
                vec![
                    Object::Real(draw.width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(draw.height),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(image_name)]),
            Operation::new("Q", vec![]),
        ];

        self.append_content(page_id, operations)
    }

    #[instrument(skip_all, fields(pages = self.page_ids.len(), compression = ?options.compression))]
    fn save(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        match options.compression {
            None | Some(CompressionLevel::Low) => {}
            Some(CompressionLevel::Medium) => self.document.compress(),
            Some(CompressionLevel::High) => {
                let pruned = self.document.prune_objects();
                self.document.delete_zero_length_streams();
                self.document.renumber_objects();
                self.document.compress();
                // Renumbering invalidates cached page ids.
                self.page_ids = self.document.get_pages().into_values().collect();
                self.stamp_font = None;
                debug!(pruned = pruned.len(), "unreferenced objects pruned");
            }
        }

        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|err| PagewerkError::Save(format!("failed to serialise PDF: {err}")))?;
        debug!(output_bytes = output.len(), "PDF serialised");
        Ok(output)
    }
}

// -- Loading ------------------------------------------------------------------

/// Parse with relaxed tolerance: the raw bytes first, then the bytes with
/// junk around the header and trailer cut away, then each earlier revision
/// (everything up to a previous `%%EOF`), newest first.
fn load_lenient(bytes: &[u8]) -> Result<Document> {
    let first_error = match Document::load_mem(bytes) {
        Ok(document) => return Ok(document),
        Err(err) => err.to_string(),
    };

    for (attempt, candidate) in salvage_candidates(bytes).into_iter().enumerate() {
        match Document::load_mem(candidate) {
            Ok(document) => {
                debug!(attempt, len = candidate.len(), "lenient parse recovered document");
                return Ok(document);
            }
            Err(err) => debug!(attempt, error = %err, "lenient candidate rejected"),
        }
    }

    Err(PagewerkError::Parse(format!("lenient parse failed: {first_error}")))
}

/// Byte windows worth re-parsing, most complete first.
pub(crate) fn salvage_candidates(bytes: &[u8]) -> Vec<&[u8]> {
    let start = find_all(bytes, b"%PDF-").first().copied().unwrap_or(0);
    let body = &bytes[start..];

    let mut candidates = Vec::new();
    let eof_ends: Vec<usize> = find_all(body, b"%%EOF")
        .into_iter()
        .map(|at| end_of_line(body, at + 5))
        .collect();

    for &end in eof_ends.iter().rev() {
        let candidate = &body[..end];
        if candidate.len() != bytes.len() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    if start > 0 && eof_ends.is_empty() {
        candidates.push(body);
    }
    candidates
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    if haystack.len() < needle.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(at, _)| at)
        .collect()
}

/// Position after the end-of-line marker following `at`, if any.
fn end_of_line(bytes: &[u8], at: usize) -> usize {
    match bytes.get(at..) {
        Some([b'\r', b'\n', ..]) => at + 2,
        Some([b'\r' | b'\n', ..]) => at + 1,
        _ => at.min(bytes.len()),
    }
}

// -- Page tree helpers --------------------------------------------------------

fn page_tree_root(document: &Document) -> Result<ObjectId> {
    let catalog = document
        .catalog()
        .map_err(|err| PagewerkError::Parse(format!("no document catalog: {err}")))?;
    let pages_id = catalog
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|err| PagewerkError::Parse(format!("no page tree: {err}")))?;
    document
        .get_object(pages_id)
        .and_then(Object::as_dict)
        .map_err(|err| PagewerkError::Parse(format!("page tree root unreadable: {err}")))?;
    Ok(pages_id)
}

/// Whether a page object is usable: a dictionary whose content streams
/// all resolve.
fn check_page(document: &Document, page_id: ObjectId) -> std::result::Result<(), String> {
    let page = document
        .get_object(page_id)
        .map_err(|err| format!("missing page object {page_id:?}: {err}"))?
        .as_dict()
        .map_err(|_| format!("page object {page_id:?} is not a dictionary"))?;

    let refs: Vec<ObjectId> = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![*id],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_reference().ok())
            .collect(),
        _ => Vec::new(),
    };

    for id in refs {
        document
            .get_object(id)
            .map_err(|_| format!("content stream {id:?} is missing"))?;
    }
    Ok(())
}

/// Look `key` up on the page, then on each ancestor /Pages node.
fn inherited(document: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = document.get_object(page_id).ok()?.as_dict().ok()?;

    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = document.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

fn media_box(document: &Document, page_id: ObjectId) -> [f32; 4] {
    let Some(obj) = inherited(document, page_id, b"MediaBox") else {
        return DEFAULT_MEDIA_BOX;
    };
    let array = match &obj {
        Object::Array(items) => items.clone(),
        Object::Reference(id) => match document.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => return DEFAULT_MEDIA_BOX,
        },
        _ => return DEFAULT_MEDIA_BOX,
    };

    let values: Vec<f32> = array.iter().filter_map(number).collect();
    match values.as_slice() {
        [llx, lly, urx, ury] => [*llx, *lly, *urx, *ury],
        _ => DEFAULT_MEDIA_BOX,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Resolve a dictionary object (inline or indirect) into an owned copy.
fn owned_dict(document: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => document.get_object(*id).ok()?.as_dict().ok().cloned(),
        _ => None,
    }
}

/// `cm` operation translating to `(x, y)` and rotating `degrees`
/// counter-clockwise about that point.
fn placement(x: f32, y: f32, degrees: f32) -> Operation {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Operation::new(
        "cm",
        vec![
            Object::Real(cos),
            Object::Real(sin),
            Object::Real(-sin),
            Object::Real(cos),
            Object::Real(x),
            Object::Real(y),
        ],
    )
}

/// Encode for a WinAnsi simple font; characters outside printable ASCII
/// become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (' '..='~').contains(&c) { c as u8 } else { b'?' })
        .collect()
}

// -- Object cloning -----------------------------------------------------------

/// Deep-copies objects from one document into another, following references.
///
/// Each source object is copied at most once per cloner, so shared resources
/// stay shared and reference cycles terminate. /Parent links are dropped; the
/// caller re-parents pages when placing them.
struct ObjectCloner<'s> {
    source: &'s Document,
    map: BTreeMap<ObjectId, ObjectId>,
}

impl<'s> ObjectCloner<'s> {
    fn new(source: &'s Document) -> Self {
        Self {
            source,
            map: BTreeMap::new(),
        }
    }

    fn clone_reference(&mut self, target: &mut Document, id: ObjectId) -> ObjectId {
        if let Some(&mapped) = self.map.get(&id) {
            return mapped;
        }

        let new_id = target.new_object_id();
        self.map.insert(id, new_id);

        let cloned = match self.source.get_object(id) {
            Ok(object) => self.clone_object(target, object),
            Err(err) => {
                warn!(?id, %err, "cannot resolve reference, using Null");
                Object::Null
            }
        };
        target.objects.insert(new_id, cloned);
        new_id
    }

    fn clone_dict(&mut self, target: &mut Document, dict: &Dictionary) -> Dictionary {
        let mut cloned = Dictionary::new();
        for (key, value) in dict.iter() {
            if key == b"Parent" {
                continue;
            }
            cloned.set(key.clone(), self.clone_object(target, value));
        }
        cloned
    }

    fn clone_object(&mut self, target: &mut Document, object: &Object) -> Object {
        match object {
            Object::Dictionary(dict) => Object::Dictionary(self.clone_dict(target, dict)),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.clone_object(target, item))
                    .collect(),
            ),
            Object::Reference(id) => Object::Reference(self.clone_reference(target, *id)),
            Object::Stream(stream) => Object::Stream(Stream::new(
                self.clone_dict(target, &stream.dict),
                stream.content.clone(),
            )),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewerk_core::config::WatermarkDefaults;
    use pagewerk_core::types::{PageRange, RotationDirection};

    use crate::compose::{Composer, WatermarkSpec};
    use crate::recovery::{RecoveryCascade, Strategy};

    /// Build a PDF whose pages inherit their MediaBox from the page tree,
    /// each page drawing its own label.
    fn sample_pdf(labels: &[&str], rotation: Option<i64>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let resources_id = doc.add_object(Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
        )]));

        let mut kids = Vec::new();
        for label in labels {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*label)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let mut page = Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Reference(resources_id)),
            ]);
            if let Some(rotation) = rotation {
                page.set("Rotate", Object::Integer(rotation));
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Count", Object::Integer(kids.len() as i64)),
                ("Kids", Object::Array(kids)),
                (
                    "MediaBox",
                    Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()]),
                ),
            ])),
        );
        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut output = Vec::new();
        doc.save_to(&mut output).unwrap();
        output
    }

    /// Like `sample_pdf`, but the content stream of page `broken` is missing.
    fn pdf_with_dangling_page(labels: &[&str], broken: usize) -> Vec<u8> {
        let mut doc = Document::load_mem(&sample_pdf(labels, None)).unwrap();
        let page_id = *doc.get_pages().values().nth(broken).unwrap();
        let page = doc.get_object_mut(page_id).unwrap().as_dict_mut().unwrap();
        page.set("Contents", Object::Reference((9999, 0)));

        let mut output = Vec::new();
        doc.save_to(&mut output).unwrap();
        output
    }

    fn page_texts(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| {
                let content = doc.get_page_content(id).unwrap();
                let ops = Content::decode(&content).unwrap().operations;
                ops.iter()
                    .filter(|op| op.operator == "Tj")
                    .filter_map(|op| match op.operands.first() {
                        Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    #[test]
    fn loads_pages_with_inherited_media_box() {
        let doc = PdfLibrary
            .load(&sample_pdf(&["a", "b"], None), LoadOptions::strict())
            .unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_size(1).unwrap(), PageSize::new(595.0, 842.0));
        assert_eq!(doc.page_rotation(0).unwrap(), 0);
    }

    #[test]
    fn garbage_fails_every_load() {
        for options in [LoadOptions::strict(), LoadOptions::lenient(), LoadOptions::salvage()] {
            assert!(matches!(
                PdfLibrary.load(b"definitely not a pdf", options),
                Err(PagewerkError::Parse(_))
            ));
        }
    }

    #[test]
    fn merge_keeps_order_and_materialises_media_box() {
        let a = sample_pdf(&["A1", "A2"], None);
        let b = sample_pdf(&["B1"], None);

        let merged = Composer::new(&PdfLibrary).merge(&[&a, &b]).unwrap();
        assert_eq!(page_texts(&merged), vec!["A1", "A2", "B1"]);

        let doc = PdfLibrary.load(&merged, LoadOptions::strict()).unwrap();
        assert_eq!(doc.page_size(2).unwrap(), PageSize::new(595.0, 842.0));
    }

    #[test]
    fn split_produces_standalone_documents() {
        let source = sample_pdf(&["p1", "p2", "p3"], None);
        let ranges = [PageRange::new(1, 2, "x"), PageRange::new(3, 3, "y")];

        let outputs = Composer::new(&PdfLibrary).split(&source, &ranges).unwrap();
        assert_eq!(page_texts(&outputs[0].bytes), vec!["p1", "p2"]);
        assert_eq!(page_texts(&outputs[1].bytes), vec!["p3"]);
    }

    #[test]
    fn rotation_is_written_absolute() {
        let source = sample_pdf(&["p1", "p2"], Some(90));
        let composer = Composer::new(&PdfLibrary);
        let mut tracker = composer.rotation_tracker(&source).unwrap();
        tracker.rotate(0, RotationDirection::Clockwise).unwrap();

        let once = composer.rotate(&source, &tracker).unwrap();
        let twice = composer.rotate(&once, &tracker).unwrap();

        let doc = PdfLibrary.load(&once, LoadOptions::strict()).unwrap();
        assert_eq!(doc.page_rotation(0).unwrap(), 180);
        assert_eq!(doc.page_rotation(1).unwrap(), 90);

        // The tracker holds absolute targets, so re-applying changes nothing.
        let doc = PdfLibrary.load(&twice, LoadOptions::strict()).unwrap();
        assert_eq!(doc.page_rotation(0).unwrap(), 180);
    }

    #[test]
    fn text_watermark_is_appended_to_each_page() {
        let source = sample_pdf(&["p1", "p2"], None);
        let spec = WatermarkSpec::text("CONFIDENTIAL", &WatermarkDefaults::default());

        let stamped = Composer::new(&PdfLibrary).watermark(&source, &spec).unwrap();
        let texts = page_texts(&stamped);
        assert_eq!(texts, vec!["p1 CONFIDENTIAL", "p2 CONFIDENTIAL"]);

        let doc = Document::load_mem(&stamped).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(resources.get(b"Font").unwrap().as_dict().unwrap().has(b"F1"));
        assert!(resources.get(b"Font").unwrap().as_dict().unwrap().has(STAMP_FONT));
        assert!(resources.has(b"ExtGState"));
    }

    #[test]
    fn helvetica_bold_width() {
        let doc = PdfLibrary.create();
        // "AB" = 722 + 722 units.
        assert!((doc.text_width("AB", 10.0) - 14.44).abs() < 1e-3);
        // Unmappable characters measure as '?'.
        assert!((doc.text_width("é", 1.0) - 0.611).abs() < 1e-3);
    }

    #[test]
    fn dangling_page_rejected_strictly_but_salvageable() {
        let bytes = pdf_with_dangling_page(&["p1", "p2", "p3", "p4", "p5"], 2);
        assert!(PdfLibrary.load(&bytes, LoadOptions::strict()).is_err());
        assert!(PdfLibrary.load(&bytes, LoadOptions::lenient()).is_err());

        let source = PdfLibrary.load(&bytes, LoadOptions::salvage()).unwrap();
        let mut target = PdfLibrary.create();
        assert!(matches!(
            target.copy_pages(&source, &[2]),
            Err(PagewerkError::Copy { page: 2, .. })
        ));
    }

    #[test]
    fn junk_before_header_needs_lenient_load() {
        let mut bytes = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        bytes.extend(sample_pdf(&["p1", "p2"], None));

        assert!(matches!(
            PdfLibrary.load(&bytes, LoadOptions::strict()),
            Err(PagewerkError::Parse(_))
        ));
        let doc = PdfLibrary.load(&bytes, LoadOptions::lenient()).unwrap();
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn cascade_falls_back_to_lenient_for_junk_prefix() {
        let mut bytes = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        bytes.extend(sample_pdf(&["p1", "p2"], None));
        let mut cascade = RecoveryCascade::default();

        let report = cascade.run(&PdfLibrary, &bytes).unwrap();
        assert_eq!(report.strategy, Strategy::Lenient);
        assert_eq!(report.page_count, 2);
        assert!(report.skipped_pages.is_empty());
        assert_eq!(page_texts(&report.bytes), vec!["p1", "p2"]);
    }

    #[test]
    fn cascade_reconstructs_around_a_bad_page() {
        let bytes = pdf_with_dangling_page(&["p1", "p2", "p3", "p4", "p5"], 2);
        let mut cascade = RecoveryCascade::default();

        let report = cascade.run(&PdfLibrary, &bytes).unwrap();
        assert_eq!(report.strategy, Strategy::Reconstruct);
        assert_eq!(report.page_count, 4);
        assert_eq!(report.skipped_pages, vec![2]);
        assert_eq!(page_texts(&report.bytes), vec!["p1", "p2", "p4", "p5"]);
    }

    #[test]
    fn high_compression_keeps_pages() {
        let source = sample_pdf(&["p1", "p2"], None);
        let report = Composer::new(&PdfLibrary)
            .compress(&source, CompressionLevel::High)
            .unwrap();
        assert_eq!(page_texts(&report.bytes), vec!["p1", "p2"]);
    }

    #[test]
    fn salvage_candidates_trim_junk_and_revisions() {
        let bytes = b"junk%PDF-1.4 body %%EOF\nupdate %%EOF\ntrailing";
        let candidates = salvage_candidates(bytes);
        assert_eq!(candidates[0], &b"%PDF-1.4 body %%EOF\nupdate %%EOF\n"[..]);
        assert_eq!(candidates[1], &b"%PDF-1.4 body %%EOF\n"[..]);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn salvage_candidates_without_eof_strip_prefix() {
        let candidates = salvage_candidates(b"\x00\x00%PDF-1.7 truncated");
        assert_eq!(candidates, vec![&b"%PDF-1.7 truncated"[..]]);
    }
}
