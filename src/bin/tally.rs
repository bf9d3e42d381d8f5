//! CLI tool for exploring exam result tables
//!
//! Usage: tally <pdf_file> [column] [word] [options]
//!
//! - no column: prints the columns and the first page of the table
//! - column only: prints the distinct words of that column
//! - column and word: prints the count sentence

use exam_tally::markdown::page_count;
use exam_tally::{
    table_to_markdown, FrequencyIndex, MarkdownOptions, PipelineConfig, Schema, Session,
    WidthPolicy,
};
use std::env;
use std::fs;
use std::process;

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <pdf_file> [column] [word] [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --schema A,B,C     Column names to impose (default: exam result layout)");
    eprintln!("  --drop-mismatched  Drop pages with the wrong column count instead of");
    eprintln!("                     discarding the whole table");
    eprintln!("  --page N           Table page to print (10 rows per page)");
    eprintln!("  --counts           With a column: print words with their counts");
    process::exit(1);
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("tally");

    let mut positional = Vec::new();
    let mut config = PipelineConfig::default();
    let mut markdown = MarkdownOptions::default();
    let mut with_counts = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--schema" => {
                let Some(value) = iter.next() else { usage(program) };
                config.schema = match value.parse::<Schema>() {
                    Ok(schema) => schema,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        process::exit(1);
                    }
                };
            }
            "--drop-mismatched" => {
                config.normalize.width_policy = WidthPolicy::DropMismatchedPages;
            }
            "--page" => {
                let Some(page) = iter.next().and_then(|v| v.parse::<usize>().ok()) else {
                    usage(program)
                };
                markdown.page = page.saturating_sub(1);
            }
            "--counts" => with_counts = true,
            "-h" | "--help" => usage(program),
            _ => positional.push(arg.as_str()),
        }
    }

    let Some(&pdf_path) = positional.first() else {
        usage(program)
    };

    let buffer = match fs::read(pdf_path) {
        Ok(buffer) => buffer,
        Err(e) => {
            eprintln!("Error reading {}: {}", pdf_path, e);
            process::exit(1);
        }
    };

    let mut session = Session::with_config(config);
    let view = session.upload(&buffer, pdf_path);

    match (positional.get(1), positional.get(2)) {
        (None, _) => {
            if view.table.is_empty() {
                println!("No table data found in {}", pdf_path);
                process::exit(2);
            }
            println!("Columns: {}", view.columns.join(", "));
            println!("Rows: {}", view.table.row_count());
            println!();
            print!("{}", table_to_markdown(&view.table, &markdown));
            println!();
            println!(
                "Page {} of {}",
                markdown.page + 1,
                page_count(&view.table, &markdown)
            );
        }
        (Some(column), None) => {
            if with_counts {
                let table = session.table_for(&buffer);
                let index = FrequencyIndex::for_column(&table, column).unwrap_or_default();
                for (word, count) in index.ranked() {
                    println!("{}\t{}", count, word);
                }
            } else {
                for word in session.word_options(&buffer, column) {
                    println!("{}", word);
                }
            }
        }
        (Some(column), Some(word)) => {
            println!("{}", session.word_count(&buffer, column, word));
        }
    }
}
