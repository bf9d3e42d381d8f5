//! Lattice table extraction
//!
//! Tables are found from their ruling lines: painted horizontal and vertical
//! segments are snapped into grid lines, the grid is cut into cells, and the
//! page's text items are dropped into the cell that contains them. One
//! [`RawPage`] is produced per PDF page.

use crate::detector::{detect_document_kind, DetectionConfig, DocumentKind};
use crate::extractor::{extract_page_contents, load_document, PageContent, Segment, TextItem};
use crate::TallyError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

/// Horizontal gap, as a fraction of the font size, that separates two words
const WORD_GAP_RATIO: f32 = 0.25;

/// Options for lattice extraction
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Segments shorter than this (points) are not rulings
    pub min_ruling_length: f32,
    /// Rulings closer than this (points) snap to the same grid line
    pub snap_tolerance: f32,
    /// Maximum drift (points) for a segment to count as horizontal or vertical
    pub orientation_tolerance: f32,
    /// Drop grid rows whose cells are all empty
    pub drop_empty_rows: bool,
    /// Skip documents with no text layer without walking their content
    pub skip_scanned: bool,
    /// Walk pages on the rayon pool
    pub parallel: bool,
    /// Sampling used to classify the document
    pub detection: DetectionConfig,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            min_ruling_length: 10.0,
            snap_tolerance: 2.0,
            orientation_tolerance: 1.0,
            drop_empty_rows: true,
            skip_scanned: true,
            parallel: false,
            detection: DetectionConfig::default(),
        }
    }
}

/// The table found on one page
///
/// `labels` are page-local and only reflect whatever the first grid row
/// happened to contain; they are not stable across pages or documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPage {
    /// Page number (1-indexed)
    pub page: u32,
    /// Column labels, one per column
    pub labels: Vec<String>,
    /// Rows top to bottom, each with one value per label
    pub rows: Vec<Vec<String>>,
}

impl RawPage {
    /// Number of columns
    pub fn width(&self) -> usize {
        self.labels.len()
    }

    /// Whether no table was found on the page
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as (label, value) pairs
    pub fn labelled_rows(&self) -> impl Iterator<Item = Vec<(&str, &str)>> + '_ {
        self.rows.iter().map(move |row| {
            self.labels
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect()
        })
    }
}

/// Extract ruled tables from a document held in memory, with default options
pub fn extract(buffer: &[u8]) -> Vec<RawPage> {
    extract_with_options(buffer, &ExtractionOptions::default())
}

/// Extract ruled tables from a document held in memory
///
/// Never fails: unreadable documents and documents without any ruled table
/// yield no pages. Otherwise one entry per PDF page, in document order, with
/// empty entries for pages that carry no table.
pub fn extract_with_options(buffer: &[u8], options: &ExtractionOptions) -> Vec<RawPage> {
    match try_extract(buffer, options) {
        Ok(pages) => {
            if pages.iter().all(RawPage::is_empty) {
                log::info!("no ruled table found in document");
                Vec::new()
            } else {
                pages
            }
        }
        Err(e) => {
            log::warn!("table extraction failed: {}", e);
            Vec::new()
        }
    }
}

/// Extract ruled tables from a PDF file
///
/// Only reading the file can fail; its content is handled as in [`extract`].
pub fn extract_path<P: AsRef<Path>>(
    path: P,
    options: &ExtractionOptions,
) -> Result<Vec<RawPage>, TallyError> {
    let buffer = std::fs::read(path)?;
    Ok(extract_with_options(&buffer, options))
}

fn try_extract(buffer: &[u8], options: &ExtractionOptions) -> Result<Vec<RawPage>, TallyError> {
    let doc = load_document(buffer)?;

    if options.skip_scanned {
        match detect_document_kind(&doc, &options.detection) {
            DocumentKind::Scanned => {
                log::warn!("document has no text layer, OCR would be required");
                return Ok(Vec::new());
            }
            DocumentKind::Empty => {
                log::info!("document has neither text nor images");
                return Ok(Vec::new());
            }
            DocumentKind::TextOnly => log::debug!("no ruling operators in sampled pages"),
            DocumentKind::Ruled => {}
        }
    }

    let contents = extract_page_contents(&doc, options.parallel)?;
    Ok(contents
        .iter()
        .map(|content| page_table(content, options))
        .collect())
}

/// Build the table for one page, or an empty page when there is no grid
pub fn page_table(content: &PageContent, options: &ExtractionOptions) -> RawPage {
    let empty = RawPage {
        page: content.page,
        ..RawPage::default()
    };

    let grids = Grid::detect_all(&content.segments, options);
    if grids.len() > 1 {
        log::debug!(
            "page {}: {} ruled regions, keeping the one with most cells",
            content.page,
            grids.len()
        );
    }
    let Some(grid) = Grid::largest(grids) else {
        return empty;
    };

    let mut rows = grid.fill(&content.text_items);
    if options.drop_empty_rows {
        rows.retain(|row| row.iter().any(|cell| !cell.is_empty()));
    }
    if rows.is_empty() {
        return empty;
    }

    let labels = rows[0]
        .iter()
        .enumerate()
        .map(|(i, text)| {
            if text.is_empty() {
                format!("Unnamed: {}", i)
            } else {
                text.clone()
            }
        })
        .collect();

    RawPage {
        page: content.page,
        labels,
        rows,
    }
}

/// Direction of a ruling line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned line painted on the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ruling {
    pub orientation: Orientation,
    /// Y for horizontal rulings, X for vertical ones
    pub position: f32,
    /// Lower end along the line's own axis
    pub start: f32,
    /// Upper end along the line's own axis
    pub end: f32,
}

impl Ruling {
    /// Classify a segment, or `None` if it is diagonal or too short
    pub fn from_segment(segment: &Segment, options: &ExtractionOptions) -> Option<Self> {
        if segment.length() < options.min_ruling_length {
            return None;
        }
        let dx = (segment.x1 - segment.x0).abs();
        let dy = (segment.y1 - segment.y0).abs();

        if dy <= options.orientation_tolerance {
            Some(Ruling {
                orientation: Orientation::Horizontal,
                position: (segment.y0 + segment.y1) / 2.0,
                start: segment.x0.min(segment.x1),
                end: segment.x0.max(segment.x1),
            })
        } else if dx <= options.orientation_tolerance {
            Some(Ruling {
                orientation: Orientation::Vertical,
                position: (segment.x0 + segment.x1) / 2.0,
                start: segment.y0.min(segment.y1),
                end: segment.y0.max(segment.y1),
            })
        } else {
            None
        }
    }

    /// Whether two rulings cross, touch or continue each other within `tolerance`
    pub fn touches(&self, other: &Ruling, tolerance: f32) -> bool {
        let overlaps = |a: &Ruling, b: &Ruling| {
            a.start <= b.end + tolerance && b.start <= a.end + tolerance
        };
        if self.orientation == other.orientation {
            (self.position - other.position).abs() <= tolerance && overlaps(self, other)
        } else {
            other.position >= self.start - tolerance
                && other.position <= self.end + tolerance
                && self.position >= other.start - tolerance
                && self.position <= other.end + tolerance
        }
    }
}

/// Classify the painted segments that can act as rulings
pub fn rulings(segments: &[Segment], options: &ExtractionOptions) -> Vec<Ruling> {
    segments
        .iter()
        .filter_map(|s| Ruling::from_segment(s, options))
        .collect()
}

/// Group rulings into connected ruled regions, in order of first ruling
///
/// Two rulings belong to the same region when a chain of touching rulings
/// links them. A boxed title or signature frame that touches nothing in the
/// table forms a region of its own.
pub fn ruled_regions(rulings: &[Ruling], tolerance: f32) -> Vec<Vec<Ruling>> {
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut parent: Vec<usize> = (0..rulings.len()).collect();
    for i in 0..rulings.len() {
        for j in (i + 1)..rulings.len() {
            if rulings[i].touches(&rulings[j], tolerance) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    let mut region_of_root: HashMap<usize, usize> = HashMap::new();
    let mut regions: Vec<Vec<Ruling>> = Vec::new();
    for (i, ruling) in rulings.iter().enumerate() {
        let root = find(&mut parent, i);
        let index = *region_of_root.entry(root).or_insert_with(|| {
            regions.push(Vec::new());
            regions.len() - 1
        });
        regions[index].push(*ruling);
    }
    regions
}

/// Grid lines of a ruled table
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// Horizontal line positions, top to bottom (descending Y)
    pub rows: Vec<f32>,
    /// Vertical line positions, left to right
    pub columns: Vec<f32>,
}

impl Grid {
    /// Grids of every ruled region on a page
    pub fn detect_all(segments: &[Segment], options: &ExtractionOptions) -> Vec<Self> {
        let rulings = rulings(segments, options);
        ruled_regions(&rulings, options.snap_tolerance)
            .iter()
            .filter_map(|region| Self::from_rulings(region, options))
            .collect()
    }

    /// The grid with the most cells; the first one on ties
    pub fn largest(grids: Vec<Self>) -> Option<Self> {
        grids.into_iter().fold(None, |best, grid| match best {
            Some(best) if best.cell_count() >= grid.cell_count() => Some(best),
            _ => Some(grid),
        })
    }

    /// Snap painted segments into a grid, keeping the largest ruled region
    pub fn from_segments(segments: &[Segment], options: &ExtractionOptions) -> Option<Self> {
        Self::largest(Self::detect_all(segments, options))
    }

    /// Snap the rulings of one ruled region into a grid
    ///
    /// Horizontal rulings only count inside the vertical extent of the
    /// vertical rulings and vice versa, so stray rules hanging off the
    /// region do not add rows or columns.
    pub fn from_rulings(rulings: &[Ruling], options: &ExtractionOptions) -> Option<Self> {
        let (horizontal, vertical): (Vec<Ruling>, Vec<Ruling>) = rulings
            .iter()
            .copied()
            .partition(|r| r.orientation == Orientation::Horizontal);

        if horizontal.len() < 2 || vertical.len() < 2 {
            return None;
        }

        let tol = options.snap_tolerance;
        let (v_x_min, v_x_max) = position_range(&vertical)?;
        let (v_y_min, v_y_max) = span_range(&vertical)?;
        let horizontal: Vec<&Ruling> = horizontal
            .iter()
            .filter(|r| {
                r.position >= v_y_min - tol
                    && r.position <= v_y_max + tol
                    && r.start <= v_x_max + tol
                    && r.end >= v_x_min - tol
            })
            .collect();

        let (h_x_min, h_x_max) = span_range(horizontal.iter().copied())?;
        let (h_y_min, h_y_max) = position_range(horizontal.iter().copied())?;
        let vertical: Vec<&Ruling> = vertical
            .iter()
            .filter(|r| {
                r.position >= h_x_min - tol
                    && r.position <= h_x_max + tol
                    && r.start <= h_y_max + tol
                    && r.end >= h_y_min - tol
            })
            .collect();

        let mut rows = cluster_values(horizontal.iter().map(|r| r.position), tol);
        rows.reverse();
        let columns = cluster_values(vertical.iter().map(|r| r.position), tol);

        if rows.len() < 2 || columns.len() < 2 {
            return None;
        }
        Some(Grid { rows, columns })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len().saturating_sub(1)
    }

    pub fn cell_count(&self) -> usize {
        self.row_count() * self.column_count()
    }

    /// Cell (row, column) containing a point
    pub fn locate(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let row = self.rows.windows(2).position(|w| y <= w[0] && y >= w[1])?;
        let col = self
            .columns
            .windows(2)
            .position(|w| x >= w[0] && x <= w[1])?;
        Some((row, col))
    }

    /// Place text items into cells and return the cell texts
    pub fn fill(&self, items: &[TextItem]) -> Vec<Vec<String>> {
        let mut cell_items: Vec<Vec<Vec<&TextItem>>> =
            vec![vec![Vec::new(); self.column_count()]; self.row_count()];

        for item in items {
            let (x, y) = item.anchor();
            if let Some((row, col)) = self.locate(x, y) {
                cell_items[row][col].push(item);
            }
        }

        cell_items
            .into_iter()
            .map(|row| row.into_iter().map(join_cell_items).collect())
            .collect()
    }
}

fn position_range<'a>(rulings: impl IntoIterator<Item = &'a Ruling>) -> Option<(f32, f32)> {
    rulings.into_iter().fold(None, |acc, r| match acc {
        None => Some((r.position, r.position)),
        Some((lo, hi)) => Some((lo.min(r.position), hi.max(r.position))),
    })
}

fn span_range<'a>(rulings: impl IntoIterator<Item = &'a Ruling>) -> Option<(f32, f32)> {
    rulings.into_iter().fold(None, |acc, r| match acc {
        None => Some((r.start, r.end)),
        Some((lo, hi)) => Some((lo.min(r.start), hi.max(r.end))),
    })
}

/// Cluster sorted values: neighbours within `tolerance` merge into their mean
pub fn cluster_values(values: impl IntoIterator<Item = f32>, tolerance: f32) -> Vec<f32> {
    let mut sorted: Vec<f32> = values.into_iter().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut clusters = Vec::new();
    let mut current: Vec<f32> = Vec::new();

    for value in sorted {
        if let Some(&last) = current.last() {
            if value - last > tolerance {
                clusters.push(current.iter().sum::<f32>() / current.len() as f32);
                current.clear();
            }
        }
        current.push(value);
    }
    if !current.is_empty() {
        clusters.push(current.iter().sum::<f32>() / current.len() as f32);
    }

    clusters
}

/// Join a cell's items in reading order: lines top to bottom, then left to right
///
/// Items on one line are glued when the gap between them is narrower than
/// a fraction of the font size, so a word drawn in fragments stays whole.
fn join_cell_items(mut items: Vec<&TextItem>) -> String {
    items.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<Vec<&TextItem>> = Vec::new();
    for item in items {
        match lines.last_mut() {
            Some(line) if same_line(line[0], item) => line.push(item),
            _ => lines.push(vec![item]),
        }
    }

    let mut text = String::new();
    for line in &mut lines {
        line.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
        if !text.is_empty() {
            text.push(' ');
        }
        let mut previous: Option<&TextItem> = None;
        for item in line.iter() {
            if let Some(prev) = previous {
                let gap = item.x - prev.end_x();
                if gap >= prev.font_size.min(item.font_size) * WORD_GAP_RATIO {
                    text.push(' ');
                }
            }
            text.push_str(&item.text);
            previous = Some(item);
        }
    }
    clean_cell_text(&text)
}

fn same_line(a: &TextItem, b: &TextItem) -> bool {
    (a.y - b.y).abs() <= a.font_size.min(b.font_size) * 0.5
}

/// Collapse whitespace runs (including line breaks inside a cell) to one space
pub fn clean_cell_text(text: &str) -> String {
    static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}
