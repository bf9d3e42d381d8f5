//! Integration tests for exam result table extraction and queries
//!
//! The PDFs are built in memory with lopdf: ruled grids are stroked lines
//! (horizontal) and thin filled rectangles (vertical), text is Helvetica
//! with WinAnsi encoding. [`Fixture`] varies how cells are drawn and what
//! else sits on the page.

use exam_tally::extractor::load_document;
use exam_tally::schema::EXAM_COLUMNS;
use exam_tally::{
    count_word, detect_document_kind, distinct_words, extract, extract_path,
    extract_with_options, list_columns, load_table, load_table_from_path, load_table_with_config,
    normalize, table_to_markdown, word_count_message, DetectionConfig, DocumentKind,
    ExtractionOptions, FrequencyIndex, MarkdownOptions, NormalizedTable, PipelineConfig, Session,
    TallyError, WidthPolicy,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::io::Write;
use std::sync::Arc;

const LEFT: f32 = 40.0;
const TOP: f32 = 760.0;
const COL_WIDTH: f32 = 64.0;
const ROW_HEIGHT: f32 = 24.0;
const FONT_SIZE: f32 = 8.0;
/// Advance of one glyph of a font without a Widths array
const GLYPH_WIDTH: f32 = 0.55 * FONT_SIZE;

/// How cell values are written into the content stream
#[derive(Debug, Clone, Copy, PartialEq)]
enum TextStyle {
    /// One `Tj` per cell
    Whole,
    /// One `TJ` per cell, words separated by -333 displacements
    WordArrays,
    /// One text object per word, each word shown as two consecutive `Tj`
    Fragments,
}

#[derive(Debug, Clone, Copy)]
struct Fixture {
    ruled: bool,
    with_text: bool,
    style: TextStyle,
    /// Ruled box around the title above the table
    title_box: bool,
    /// Ruled frame around the whole page
    page_frame: bool,
    /// Draw the page inside a form XObject placed with `Do`
    in_form: bool,
    /// Place an image and draw nothing else
    image_only: bool,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            ruled: true,
            with_text: true,
            style: TextStyle::Whole,
            title_box: false,
            page_frame: false,
            in_form: false,
            image_only: false,
        }
    }
}

/// WinAnsi agrees with Latin-1 for the accented letters used here
fn win_ansi(text: &str) -> Object {
    Object::String(
        text.chars().map(|c| c as u32 as u8).collect(),
        StringFormat::Literal,
    )
}

fn begin_text(ops: &mut Vec<Operation>, x: f32, y: f32) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
}

fn show_text(ops: &mut Vec<Operation>, text: &str, x: f32, y: f32) {
    begin_text(ops, x, y);
    ops.push(Operation::new("Tj", vec![win_ansi(text)]));
    ops.push(Operation::new("ET", vec![]));
}

fn show_cell(ops: &mut Vec<Operation>, style: TextStyle, text: &str, x: f32, y: f32) {
    match style {
        TextStyle::Whole => show_text(ops, text, x, y),
        TextStyle::WordArrays => {
            let mut array = Vec::new();
            for (i, word) in text.split(' ').enumerate() {
                if i > 0 {
                    array.push(Object::Integer(-333));
                }
                array.push(win_ansi(word));
            }
            begin_text(ops, x, y);
            ops.push(Operation::new("TJ", vec![Object::Array(array)]));
            ops.push(Operation::new("ET", vec![]));
        }
        TextStyle::Fragments => {
            let mut word_x = x;
            for word in text.split(' ') {
                let chars: Vec<char> = word.chars().collect();
                let (head, tail) = chars.split_at(chars.len() / 2);
                begin_text(ops, word_x, y);
                for piece in [head, tail] {
                    if !piece.is_empty() {
                        let piece: String = piece.iter().collect();
                        ops.push(Operation::new("Tj", vec![win_ansi(&piece)]));
                    }
                }
                ops.push(Operation::new("ET", vec![]));
                word_x += chars.len() as f32 * GLYPH_WIDTH + 5.0;
            }
        }
    }
}

fn stroke_rect(ops: &mut Vec<Operation>, x: f32, y: f32, w: f32, h: f32) {
    ops.push(Operation::new(
        "re",
        vec![x.into(), y.into(), w.into(), h.into()],
    ));
    ops.push(Operation::new("S", vec![]));
}

/// Content for one page: a title, then a ruled grid holding `rows`
///
/// Cell values containing `\n` are drawn as several lines in the cell.
fn page_operations(rows: &[Vec<&str>], fixture: &Fixture) -> Vec<Operation> {
    let mut ops = Vec::new();
    if fixture.page_frame {
        stroke_rect(&mut ops, 20.0, 20.0, 555.0, 802.0);
    }
    if fixture.title_box {
        stroke_rect(&mut ops, 200.0, TOP + 22.0, 200.0, 24.0);
    }
    if fixture.with_text {
        show_text(&mut ops, "RESULTATS DU BEPC - SESSION 2023", LEFT, TOP + 30.0);
    }

    let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.is_empty() || n_cols == 0 {
        return ops;
    }
    let right = LEFT + n_cols as f32 * COL_WIDTH;
    let bottom = TOP - rows.len() as f32 * ROW_HEIGHT;

    if fixture.ruled {
        ops.push(Operation::new("w", vec![0.5f32.into()]));
        for i in 0..=rows.len() {
            let y = TOP - i as f32 * ROW_HEIGHT;
            ops.push(Operation::new("m", vec![LEFT.into(), y.into()]));
            ops.push(Operation::new("l", vec![right.into(), y.into()]));
            ops.push(Operation::new("S", vec![]));
        }
        for j in 0..=n_cols {
            let x = LEFT + j as f32 * COL_WIDTH;
            ops.push(Operation::new(
                "re",
                vec![(x - 0.25).into(), bottom.into(), 0.5f32.into(), (TOP - bottom).into()],
            ));
            ops.push(Operation::new("f", vec![]));
        }
    }

    if fixture.with_text {
        for (i, row) in rows.iter().enumerate() {
            let cell_bottom = TOP - (i + 1) as f32 * ROW_HEIGHT;
            for (j, value) in row.iter().enumerate() {
                let x = LEFT + j as f32 * COL_WIDTH + 2.0;
                let lines: Vec<&str> = value.split('\n').collect();
                if lines.len() == 1 {
                    if !value.is_empty() {
                        show_cell(&mut ops, fixture.style, value, x, cell_bottom + 8.0);
                    }
                } else {
                    for (k, line) in lines.iter().enumerate() {
                        show_text(&mut ops, line, x, cell_bottom + 13.0 - 10.0 * k as f32);
                    }
                }
            }
        }
    }

    ops
}

fn encode(operations: Vec<Operation>) -> Vec<u8> {
    Content { operations }.encode().unwrap()
}

fn build_pdf_from(pages: &[Vec<Vec<&str>>], fixture: &Fixture) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![0],
    ));
    let font_resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for rows in pages {
        let mut xobjects = lopdf::Dictionary::new();
        let page_ops = if fixture.image_only {
            xobjects.set("Im1", image_id);
            vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![500.into(), 0.into(), 0.into(), 700.into(), 40.into(), 60.into()],
                ),
                Operation::new("Do", vec!["Im1".into()]),
                Operation::new("Q", vec![]),
            ]
        } else if fixture.in_form {
            // The form draws 100pt too high and its matrix moves it back down
            let mut form_ops = vec![Operation::new(
                "cm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 100.into()],
            )];
            form_ops.extend(page_operations(rows, fixture));
            let form_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), 595.into(), 942.into()],
                    "Matrix" => vec![
                        1.into(),
                        0.into(),
                        0.into(),
                        1.into(),
                        0.into(),
                        (-100).into(),
                    ],
                    "Resources" => font_resources_id,
                },
                encode(form_ops),
            ));
            xobjects.set("Fm1", form_id);
            vec![
                Operation::new("q", vec![]),
                Operation::new("Do", vec!["Fm1".into()]),
                Operation::new("Q", vec![]),
            ]
        } else {
            page_operations(rows, fixture)
        };

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
            "XObject" => xobjects,
        });
        let content_id = doc.add_object(Stream::new(dictionary! {}, encode(page_ops)));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages.len() as i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

fn build_pdf(pages: &[Vec<Vec<&str>>]) -> Vec<u8> {
    build_pdf_from(pages, &Fixture::default())
}

fn header() -> Vec<&'static str> {
    EXAM_COLUMNS.to_vec()
}

fn candidate<'a>(rang: &'a str, name: &'a str, centre: &'a str, mention: &'a str) -> Vec<&'a str> {
    vec!["3", rang, "2023", name, centre, "14", "CEM Grand Dakar", mention]
}

/// Page 1: header and 3 candidates, page 2: 4 candidates
fn two_page_results() -> Vec<Vec<Vec<&'static str>>> {
    vec![
        vec![
            header(),
            candidate("1", "Awa Diop", "Dakar", "Admis"),
            candidate("2", "Moussa Fall", "Dakar", "Admis"),
            candidate("3", "Fatou Ndiaye", "Thiès", "Refusé"),
        ],
        vec![
            candidate("4", "Ibrahima Sow", "Thiès", "Admis"),
            candidate("5", "Aminata Ba", "Rufisque", "Refusé"),
            candidate("6", "Cheikh Sy", "Dakar", "Refusé"),
            candidate("7", "Mariama Kane", "Rufisque", "Admis"),
        ],
    ]
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_two_page_document_end_to_end() {
    let pdf = build_pdf(&two_page_results());
    let table = load_table(&pdf);

    assert_eq!(list_columns(&table), EXAM_COLUMNS.map(String::from).to_vec());
    assert_eq!(table.row_count(), 7);

    let mentions: Vec<&str> = table.column_values("Mention").unwrap().collect();
    assert_eq!(
        mentions,
        vec!["Admis", "Admis", "Refusé", "Admis", "Refusé", "Refusé", "Admis"]
    );
    assert_eq!(count_word(&table, "Mention", "Admis"), 4);
    assert_eq!(
        word_count_message(&table, "Mention", "Admis"),
        "L'école Admis a eu 4 admis !"
    );
}

#[test]
fn test_rows_keep_names_with_spaces() {
    let table = load_table(&build_pdf(&two_page_results()));
    assert_eq!(table.rows()[0][3], "Awa Diop");
    assert_eq!(table.rows()[6][3], "Mariama Kane");
    assert_eq!(table.rows()[3][6], "CEM Grand Dakar");
}

// ============================================================================
// Table Extractor
// ============================================================================

#[test]
fn test_extract_one_page_per_pdf_page() {
    let pages = extract(&build_pdf(&two_page_results()));
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].page, 1);
    assert_eq!(pages[1].page, 2);
    assert_eq!(pages[0].rows.len(), 4);
    assert_eq!(pages[1].rows.len(), 4);
    assert!(pages.iter().all(|p| p.width() == 8));
}

#[test]
fn test_extract_labels_are_page_local() {
    let pages = extract(&build_pdf(&two_page_results()));
    assert_eq!(pages[0].labels, header());
    // The second page has no header; its labels are whatever its first row holds
    assert_eq!(pages[1].labels[3], "Ibrahima Sow");

    let first_row = pages[0].labelled_rows().nth(1).unwrap();
    assert_eq!(first_row[7], ("Mention", "Admis"));
}

#[test]
fn test_extract_keeps_page_without_table() {
    let results = two_page_results();
    let pages = vec![results[0].clone(), vec![], results[1].clone()];
    let extracted = extract(&build_pdf(&pages));
    assert_eq!(extracted.len(), 3);
    assert!(extracted[1].is_empty());

    let table = normalize(&extracted);
    assert_eq!(table.row_count(), 7);
}

#[test]
fn test_extract_joins_multi_line_cells() {
    let pages = vec![vec![
        header(),
        candidate("1", "Awa\nDiop", "Dakar", "Admis"),
        candidate("2", "Moussa Fall", "Dakar", "Admis"),
    ]];
    let table = load_table(&build_pdf(&pages));
    assert_eq!(table.rows()[0][3], "Awa Diop");
}

#[test]
fn test_extract_empty_cells() {
    let pages = vec![vec![
        header(),
        vec!["3", "1", "2023", "Awa Diop", "", "14", "", "Admis"],
    ]];
    let table = load_table(&build_pdf(&pages));
    assert_eq!(table.rows()[0][4], "");
    assert!(distinct_words(&table, "CENTRE").is_empty());
}

#[test]
fn test_unruled_document_yields_nothing() {
    let pdf = build_pdf_from(
        &two_page_results(),
        &Fixture {
            ruled: false,
            ..Fixture::default()
        },
    );
    assert!(extract(&pdf).is_empty());
    assert!(load_table(&pdf).is_empty());
}

#[test]
fn test_document_without_text_yields_nothing() {
    let pdf = build_pdf_from(
        &two_page_results(),
        &Fixture {
            with_text: false,
            ..Fixture::default()
        },
    );
    assert!(extract(&pdf).is_empty());
}

#[test]
fn test_parallel_extraction_matches_sequential() {
    let pdf = build_pdf(&two_page_results());
    let parallel = ExtractionOptions {
        parallel: true,
        ..ExtractionOptions::default()
    };
    assert_eq!(extract_with_options(&pdf, &parallel), extract(&pdf));
}

// ============================================================================
// Drawing variations
// ============================================================================

fn table_drawn_as(fixture: Fixture) -> NormalizedTable {
    load_table(&build_pdf_from(&two_page_results(), &fixture))
}

#[test]
fn test_tj_word_gaps_separate_words() {
    let table = table_drawn_as(Fixture {
        style: TextStyle::WordArrays,
        ..Fixture::default()
    });
    assert_eq!(table.row_count(), 7);
    assert_eq!(distinct_words(&table, "ORIGINE"), vec!["CEM", "Grand", "Dakar"]);
    assert_eq!(count_word(&table, "ORIGINE", "CEM"), 7);
    assert_eq!(table.rows()[0][3], "Awa Diop");
    assert_eq!(table, load_table(&build_pdf(&two_page_results())));
}

#[test]
fn test_fragmented_words_stay_whole() {
    let table = table_drawn_as(Fixture {
        style: TextStyle::Fragments,
        ..Fixture::default()
    });
    assert_eq!(distinct_words(&table, "Mention"), vec!["Admis", "Refusé"]);
    assert_eq!(count_word(&table, "Mention", "Admis"), 4);
    assert_eq!(table.rows()[2][3], "Fatou Ndiaye");
    assert_eq!(table.rows()[0][6], "CEM Grand Dakar");
    assert_eq!(list_columns(&table), EXAM_COLUMNS.map(String::from).to_vec());
}

#[test]
fn test_boxed_title_does_not_split_table() {
    let pdf = build_pdf_from(
        &two_page_results(),
        &Fixture {
            title_box: true,
            ..Fixture::default()
        },
    );
    assert!(extract(&pdf).iter().all(|page| page.width() == 8));

    let table = load_table(&pdf);
    assert_eq!(table.row_count(), 7);
    assert_eq!(count_word(&table, "Mention", "Admis"), 4);
}

#[test]
fn test_page_frame_does_not_change_table() {
    let table = table_drawn_as(Fixture {
        page_frame: true,
        ..Fixture::default()
    });
    assert_eq!(table, load_table(&build_pdf(&two_page_results())));
}

#[test]
fn test_table_inside_form_xobject() {
    let table = table_drawn_as(Fixture {
        in_form: true,
        ..Fixture::default()
    });
    assert_eq!(table.row_count(), 7);
    assert_eq!(table, load_table(&build_pdf(&two_page_results())));
}

#[test]
fn test_all_drawing_variations_together() {
    let table = table_drawn_as(Fixture {
        style: TextStyle::Fragments,
        title_box: true,
        page_frame: true,
        in_form: true,
        ..Fixture::default()
    });
    assert_eq!(table, load_table(&build_pdf(&two_page_results())));
    assert_eq!(
        word_count_message(&table, "Mention", "Admis"),
        "L'école Admis a eu 4 admis !"
    );
}

#[test]
fn test_document_kind_classification() {
    let kind = |fixture: Fixture| {
        let doc = load_document(&build_pdf_from(&two_page_results(), &fixture)).unwrap();
        detect_document_kind(&doc, &DetectionConfig::default())
    };

    assert_eq!(kind(Fixture::default()), DocumentKind::Ruled);
    assert_eq!(
        kind(Fixture {
            ruled: false,
            ..Fixture::default()
        }),
        DocumentKind::TextOnly
    );
    assert_eq!(
        kind(Fixture {
            in_form: true,
            ..Fixture::default()
        }),
        DocumentKind::Ruled
    );
    assert_eq!(
        kind(Fixture {
            image_only: true,
            ..Fixture::default()
        }),
        DocumentKind::Scanned
    );
    assert_eq!(
        kind(Fixture {
            with_text: false,
            ..Fixture::default()
        }),
        DocumentKind::Empty
    );
}

#[test]
fn test_image_only_document_yields_nothing() {
    let pdf = build_pdf_from(
        &two_page_results(),
        &Fixture {
            image_only: true,
            ..Fixture::default()
        },
    );
    assert!(extract(&pdf).is_empty());
    assert!(load_table(&pdf).is_empty());
}

// ============================================================================
// Schema Normalizer
// ============================================================================

#[test]
fn test_header_drop_removes_exactly_one_row() {
    let pages = vec![
        vec![header(), candidate("1", "A B", "Dakar", "Admis")],
        vec![
            candidate("2", "C D", "Dakar", "Admis"),
            candidate("3", "E F", "Dakar", "Refusé"),
        ],
        vec![candidate("4", "G H", "Thiès", "Admis")],
    ];
    let total_rows: usize = pages.iter().map(|p| p.len()).sum();
    let table = load_table(&build_pdf(&pages));
    assert_eq!(table.row_count(), total_rows - 1);
    assert!(table.rows().iter().all(|r| r.len() == 8));
}

#[test]
fn test_wrong_width_degrades_to_empty() {
    let pages = vec![vec![
        vec!["RANG", "PRENOM et NOM", "Mention"],
        vec!["1", "Awa Diop", "Admis"],
    ]];
    let table = load_table(&build_pdf(&pages));
    assert_eq!(table, NormalizedTable::empty());
    assert!(list_columns(&table).is_empty());
    assert_eq!(count_word(&table, "Mention", "Admis"), 0);
}

#[test]
fn test_drop_mismatched_pages_salvages_table() {
    let mut pages = two_page_results();
    pages.insert(1, vec![vec!["Total", "7"], vec!["Admis", "4"]]);
    let pdf = build_pdf(&pages);

    assert!(load_table(&pdf).is_empty());

    let mut config = PipelineConfig::default();
    config.normalize.width_policy = WidthPolicy::DropMismatchedPages;
    let table = load_table_with_config(&pdf, &config);
    assert_eq!(table.row_count(), 7);
    assert_eq!(count_word(&table, "Mention", "Admis"), 4);
}

#[test]
fn test_custom_schema_from_config() {
    let pages = vec![vec![
        vec!["Nom", "Note"],
        vec!["Awa Diop", "15"],
        vec!["Moussa Fall", "9"],
    ]];
    let config = PipelineConfig {
        schema: "Candidat,Note".parse().unwrap(),
        ..PipelineConfig::default()
    };
    let table = load_table_with_config(&build_pdf(&pages), &config);
    assert_eq!(list_columns(&table), vec!["Candidat", "Note"]);
    assert_eq!(distinct_words(&table, "Candidat"), vec!["Awa", "Diop", "Moussa", "Fall"]);
}

// ============================================================================
// Query Engine
// ============================================================================

#[test]
fn test_distinct_words_unique_and_ordered() {
    let table = load_table(&build_pdf(&two_page_results()));
    let words = distinct_words(&table, "CENTRE");
    assert_eq!(words, vec!["Dakar", "Thiès", "Rufisque"]);

    let mut deduped = words.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), words.len());

    assert_eq!(distinct_words(&table, "CENTRE"), words);
    assert!(distinct_words(&table, "Unknown").is_empty());
}

#[test]
fn test_count_word_is_case_and_accent_sensitive() {
    let table = load_table(&build_pdf(&two_page_results()));
    assert_eq!(count_word(&table, "Mention", "Refusé"), 3);
    assert_eq!(count_word(&table, "Mention", "Refuse"), 0);
    assert_eq!(count_word(&table, "Mention", "admis"), 0);
    assert_eq!(count_word(&table, "ORIGINE", "CEM"), 7);
}

#[test]
fn test_counts_bounded_by_column_total() {
    let table = load_table(&build_pdf(&two_page_results()));
    let index = FrequencyIndex::for_column(&table, "Mention").unwrap();
    assert_eq!(index.total(), 7);
    assert_eq!(index.ranked(), vec![("Admis", 4), ("Refusé", 3)]);
    for word in distinct_words(&table, "Mention") {
        let count = count_word(&table, "Mention", &word);
        assert!(count >= 1 && count <= index.total());
    }
}

#[test]
fn test_pipeline_is_idempotent() {
    let pdf = build_pdf(&two_page_results());
    let first = load_table(&pdf);
    let second = load_table(&pdf);
    assert_eq!(first, second);
    assert_eq!(
        distinct_words(&first, "Mention"),
        distinct_words(&second, "Mention")
    );
}

// ============================================================================
// Fail-soft
// ============================================================================

#[test]
fn test_non_pdf_bytes_yield_empty_table() {
    for garbage in [&b"hello world"[..], &[][..], &b"%PDF-1.4\n%%EOF"[..]] {
        let table = load_table(garbage);
        assert!(table.is_empty());
        assert_eq!(table.row_count(), 0);
        assert!(list_columns(&table).is_empty());
    }
}

// ============================================================================
// File entry points
// ============================================================================

#[test]
fn test_path_entry_points() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&build_pdf(&two_page_results())).unwrap();

    let pages = extract_path(file.path(), &ExtractionOptions::default()).unwrap();
    assert_eq!(pages.len(), 2);

    let table = load_table_from_path(file.path(), &PipelineConfig::default()).unwrap();
    assert_eq!(table.row_count(), 7);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.pdf");
    assert!(matches!(
        load_table_from_path(&missing, &PipelineConfig::default()),
        Err(TallyError::Io(_))
    ));
}

// ============================================================================
// Session and rendering
// ============================================================================

#[test]
fn test_session_flow() {
    let pdf = build_pdf(&two_page_results());
    let mut session = Session::new();

    let view = session.upload(&pdf, "bepc_2023.pdf");
    assert_eq!(view.columns, EXAM_COLUMNS.map(String::from).to_vec());
    assert_eq!(view.table.row_count(), 7);

    assert_eq!(session.word_options(&pdf, "Mention"), vec!["Admis", "Refusé"]);
    assert_eq!(
        session.word_count(&pdf, "Mention", "Refusé"),
        "L'école Refusé a eu 3 admis !"
    );

    // Queries reuse the uploaded table
    assert!(Arc::ptr_eq(&view.table, &session.table_for(&pdf)));
}

#[test]
fn test_session_new_upload_replaces_table() {
    let mut session = Session::new();
    let first = build_pdf(&two_page_results());
    session.upload(&first, "a.pdf");

    let second = build_pdf(&[vec![header(), candidate("1", "Awa Diop", "Dakar", "Admis")]]);
    let view = session.upload(&second, "b.pdf");
    assert_eq!(view.table.row_count(), 1);
    assert_eq!(session.filename(), Some("b.pdf"));
    assert_eq!(count_word(&session.table_for(&second), "Mention", "Admis"), 1);
}

#[test]
fn test_render_markdown() {
    let table = load_table(&build_pdf(&two_page_results()));
    let md = table_to_markdown(&table, &MarkdownOptions::default());
    assert!(md.starts_with("| IRE "));
    assert!(md.contains("| Awa Diop "));
    assert_eq!(md.lines().count(), 2 + 7);
}
