//! Debug tool: Print rulings, grid lines and text items per page
//!
//! Usage: debug_grid <pdf_file> [page_number]
//!
//! Shows what lattice detection sees on each page: the painted segments that
//! qualify as rulings, the ruled regions they form, the grid kept for the
//! table, and every text item with the cell it lands in.

use exam_tally::extractor::{extract_page_contents, load_document};
use exam_tally::tables::{page_table, ruled_regions, rulings, ExtractionOptions, Grid, Orientation};
use exam_tally::{detect_document_kind, DetectionConfig};
use std::env;
use std::process;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <pdf_file> [page_number]", args[0]);
        process::exit(1);
    }
    let filter_page: Option<u32> = args.get(2).and_then(|s| s.parse().ok());

    let buffer = match std::fs::read(&args[1]) {
        Ok(buffer) => buffer,
        Err(e) => {
            eprintln!("Error reading {}: {}", args[1], e);
            process::exit(1);
        }
    };
    let doc = match load_document(&buffer) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Error loading PDF: {}", e);
            process::exit(1);
        }
    };

    let options = ExtractionOptions::default();
    println!(
        "Document kind: {:?}",
        detect_document_kind(&doc, &DetectionConfig::default())
    );

    let contents = match extract_page_contents(&doc, false) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Error extracting content: {}", e);
            process::exit(1);
        }
    };

    for content in &contents {
        if filter_page.is_some_and(|p| p != content.page) {
            continue;
        }

        let rulings = rulings(&content.segments, &options);
        let horizontal = rulings
            .iter()
            .filter(|r| r.orientation == Orientation::Horizontal)
            .count();

        println!(
            "=== PAGE {} ({} segments, {} horizontal / {} vertical rulings, {} text items) ===",
            content.page,
            content.segments.len(),
            horizontal,
            rulings.len() - horizontal,
            content.text_items.len()
        );

        for (i, region) in ruled_regions(&rulings, options.snap_tolerance)
            .iter()
            .enumerate()
        {
            let cells = Grid::from_rulings(region, &options)
                .map(|g| format!("{}x{} cells", g.row_count(), g.column_count()))
                .unwrap_or_else(|| "no grid".into());
            println!("  region {}: {} rulings, {}", i, region.len(), cells);
        }

        let grid = Grid::from_segments(&content.segments, &options);
        match &grid {
            Some(grid) => {
                println!("  rows:    {:?}", grid.rows);
                println!("  columns: {:?}", grid.columns);
            }
            None => println!("  no grid"),
        }

        for item in &content.text_items {
            let (x, y) = item.anchor();
            let cell = grid.as_ref().and_then(|g| g.locate(x, y));
            println!(
                "  x={:7.1} y={:7.1} w={:6.1} fs={:5.1} cell={:<10} text={:?}",
                item.x,
                item.y,
                item.width,
                item.font_size,
                cell.map(|(r, c)| format!("{},{}", r, c))
                    .unwrap_or_else(|| "-".into()),
                item.text
            );
        }

        let table = page_table(content, &options);
        println!("  table: {} columns x {} rows", table.width(), table.rows.len());
        println!();
    }
}
