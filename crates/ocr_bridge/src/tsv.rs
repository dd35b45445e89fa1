//! Word boxes from Tesseract TSV output
//!
//! Columns: level, page_num, block_num, par_num, line_num, word_num, left,
//! top, width, height, conf, text. Only level-5 rows are words.

use core_pipeline::{RecognizedWord, WordBox};

const WORD_LEVEL: &str = "5";
const COLUMNS: usize = 12;

/// Parse the word rows of a Tesseract TSV dump
///
/// Header, structural and malformed rows are skipped, as are words with no
/// text or a negative confidence.
pub fn parse_words(tsv: &str) -> Vec<RecognizedWord> {
    tsv.lines().filter_map(parse_word_row).collect()
}

fn parse_word_row(line: &str) -> Option<RecognizedWord> {
    let fields: Vec<&str> = line.splitn(COLUMNS, '\t').collect();
    if fields.len() < COLUMNS || fields[0] != WORD_LEVEL {
        return None;
    }

    let left: i32 = fields[6].trim().parse().ok()?;
    let top: i32 = fields[7].trim().parse().ok()?;
    let width: i32 = fields[8].trim().parse().ok()?;
    let height: i32 = fields[9].trim().parse().ok()?;
    let confidence: f32 = fields[10].trim().parse().ok()?;
    let text = fields[11].trim();
    if text.is_empty() || confidence < 0.0 {
        return None;
    }

    Some(RecognizedWord {
        text: text.to_string(),
        bbox: WordBox {
            x0: left,
            y0: top,
            x1: left + width,
            y1: top + height,
        },
        confidence,
    })
}
