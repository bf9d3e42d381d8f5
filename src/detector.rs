//! Fast document classification before table extraction
//!
//! Lattice extraction needs two things from a page: a text layer and painted
//! ruling lines. This module samples content streams for text operators,
//! path operators and image placements so that documents without a text
//! layer (scans) can be skipped without running the full content walk.
//! Form XObjects are scanned as part of the page that places them.

use crate::extractor::{form_data, is_form, own_resources, page_resources, xobject};
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Nesting limit for forms placing other forms
const MAX_FORM_DEPTH: usize = 8;

/// Document classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Text layer with painted lines on at least one sampled page
    Ruled,
    /// Text layer but no painted lines (no lattice table possible)
    TextOnly,
    /// No text operators, but images are placed; OCR would be needed
    Scanned,
    /// Neither text nor images on the sampled pages
    Empty,
}

/// Configuration for document classification
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Maximum number of pages to sample (default: 5)
    pub max_pages_to_sample: u32,
    /// Minimum text operator count per page to count it as having text
    pub min_text_ops_per_page: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_pages_to_sample: 5,
            min_text_ops_per_page: 1,
        }
    }
}

/// Operator counts found in a content stream
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct OperatorCounts {
    text: u32,
    paths: u32,
    images: u32,
}

impl std::ops::AddAssign for OperatorCounts {
    fn add_assign(&mut self, other: Self) {
        self.text += other.text;
        self.paths += other.paths;
        self.images += other.images;
    }
}

/// Classify a loaded document by sampling its pages
pub fn detect_document_kind(doc: &Document, config: &DetectionConfig) -> DocumentKind {
    let pages = doc.get_pages();
    let total_pages = pages.len() as u32;
    let sample = sample_page_numbers(total_pages, config.max_pages_to_sample);

    let mut pages_with_text = 0u32;
    let mut pages_with_paths = 0u32;
    let mut pages_with_images = 0u32;

    for page_num in &sample {
        if let Some(&page_id) = pages.get(page_num) {
            let counts = analyze_page_content(doc, page_id);
            if counts.images > 0 {
                pages_with_images += 1;
            }
            if counts.text >= config.min_text_ops_per_page {
                pages_with_text += 1;
                if counts.paths > 0 {
                    pages_with_paths += 1;
                }
            }
        }
    }

    log::debug!(
        "sampled {} of {} pages: {} with text, {} with text and paths, {} with images",
        sample.len(),
        total_pages,
        pages_with_text,
        pages_with_paths,
        pages_with_images
    );

    if pages_with_text == 0 {
        if pages_with_images > 0 {
            DocumentKind::Scanned
        } else {
            DocumentKind::Empty
        }
    } else if pages_with_paths == 0 {
        DocumentKind::TextOnly
    } else {
        DocumentKind::Ruled
    }
}

/// First page, last page and evenly spaced pages in between
fn sample_page_numbers(total_pages: u32, max_samples: u32) -> Vec<u32> {
    let to_sample = max_samples.min(total_pages);
    if to_sample >= total_pages {
        return (1..=total_pages).collect();
    }
    if to_sample == 0 {
        return Vec::new();
    }

    let mut indices = vec![1];
    if to_sample > 1 {
        indices.push(total_pages);
    }

    let remaining = to_sample.saturating_sub(2);
    if remaining > 0 && total_pages > 2 {
        let step = (total_pages - 2) / (remaining + 1);
        for i in 1..=remaining {
            let idx = 1 + step * i;
            if idx > 1 && idx < total_pages {
                indices.push(idx);
            }
        }
    }

    indices.sort();
    indices.dedup();
    indices
}

fn analyze_page_content(doc: &Document, page_id: ObjectId) -> OperatorCounts {
    let resources = page_resources(doc, page_id);
    let mut counts = OperatorCounts::default();

    for content_id in doc.get_page_contents(page_id) {
        if let Ok(Object::Stream(stream)) = doc.get_object(content_id) {
            let content = match stream.decompressed_content() {
                Ok(data) => data,
                Err(_) => stream.content.clone(),
            };
            counts += analyze_content(doc, &content, &resources, 0);
        }
    }

    counts
}

/// Count operators in `content` and in the forms it places
///
/// An XObject that is not a form (or cannot be resolved) counts as an image.
fn analyze_content(
    doc: &Document,
    content: &[u8],
    resources: &[&Dictionary],
    depth: usize,
) -> OperatorCounts {
    let scan = scan_content_for_operators(content);
    let mut counts = scan.counts;

    for name in &scan.xobjects {
        match xobject(doc, resources, name) {
            Some(stream) if is_form(stream) => {
                if depth >= MAX_FORM_DEPTH {
                    continue;
                }
                let form_resources: Vec<&Dictionary> = own_resources(doc, stream)
                    .into_iter()
                    .chain(resources.iter().copied())
                    .collect();
                counts += analyze_content(doc, &form_data(stream), &form_resources, depth + 1);
            }
            _ => counts.images += 1,
        }
    }

    counts
}

/// Result of scanning one content stream
#[derive(Debug, Default)]
struct ContentScan {
    counts: OperatorCounts,
    /// Names passed to `Do`, without the leading slash
    xobjects: Vec<Vec<u8>>,
}

/// Fast scan of content stream bytes for operators of interest
///
/// Operators are whitespace-delimited tokens. Counted:
/// - text showing: `Tj`, `TJ`, `'`, `"`
/// - line and rectangle construction: `l`, `re`
///
/// XObject placements (`Do`) are collected by name for the caller to
/// resolve. Tokens inside string literals are not excluded; the counts are
/// a heuristic, not a parse.
fn scan_content_for_operators(content: &[u8]) -> ContentScan {
    let mut scan = ContentScan::default();
    let mut previous: &[u8] = &[];

    for token in content
        .split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty())
    {
        match token {
            b"Tj" | b"TJ" | b"'" | b"\"" => scan.counts.text += 1,
            b"l" | b"re" => scan.counts.paths += 1,
            b"Do" => {
                if let Some(name) = previous.strip_prefix(b"/") {
                    scan.xobjects.push(name.to_vec());
                }
            }
            _ => {
                // `[(a) 10 (b)]TJ` and `(text)Tj` have no separating space
                if token.ends_with(b")Tj") || token.ends_with(b"]TJ") {
                    scan.counts.text += 1;
                }
            }
        }
        previous = token;
    }

    scan
}
