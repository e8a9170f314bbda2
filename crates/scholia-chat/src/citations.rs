//! Citation reconciliation.
//!
//! A generated answer may cite only a subset of the papers it was grounded
//! on. This module removes unused sources from the parallel arrays and
//! renumbers the surviving inline markers contiguously, so that marker `[j]`
//! always addresses position `j-1` of the filtered arrays.
//!
//! Markers are located with an explicit scanner and the text is rebuilt once
//! from a renumbering map. Bracketed numerals outside the source range (for
//! example inside a quoted title) are left untouched.

use std::collections::BTreeSet;

use tracing::warn;

/// An answer with its index-aligned source arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct CitedAnswer {
    pub text: String,
    pub publications: Vec<String>,
    pub titles: Vec<String>,
    pub ids: Vec<String>,
}

/// One inline marker occurrence: byte span and the numeral inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker {
    start: usize,
    end: usize,
    index: usize,
}

/// Scan for `[n]` occurrences. Only well-formed bracketed numerals are
/// reported; stray brackets and non-numeric contents are skipped.
fn scan_markers(text: &str) -> Vec<Marker> {
    let bytes = text.as_bytes();
    let mut markers = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            let mut j = i + 1;
            let mut index: usize = 0;
            let mut digits = 0;
            while j < bytes.len() && bytes[j].is_ascii_digit() && digits < 6 {
                index = index * 10 + usize::from(bytes[j] - b'0');
                j += 1;
                digits += 1;
            }
            if digits > 0 && j < bytes.len() && bytes[j] == b']' {
                markers.push(Marker {
                    start: i,
                    end: j + 1,
                    index,
                });
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    markers
}

/// Source indices (1-based) cited anywhere in the text, bounded by the
/// number of available sources.
fn used_indices(markers: &[Marker], source_count: usize) -> BTreeSet<usize> {
    markers
        .iter()
        .map(|m| m.index)
        .filter(|&index| index >= 1 && index <= source_count)
        .collect()
}

fn filter_used(values: &[String], used: &BTreeSet<usize>) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .filter(|(i, _)| used.contains(&(i + 1)))
        .map(|(_, v)| v.clone())
        .collect()
}

/// Reconcile an answer with the sources it actually cites.
///
/// `publications`, `titles`, and `ids` are the parallel arrays produced by
/// context assembly. Returns the renumbered text and the filtered arrays;
/// if the renumbered markers fail the contiguity check the input is returned
/// unchanged rather than risking corrupted citations.
pub fn reconcile(
    answer: &str,
    publications: &[String],
    titles: &[String],
    ids: &[String],
) -> CitedAnswer {
    let unchanged = || CitedAnswer {
        text: answer.to_string(),
        publications: publications.to_vec(),
        titles: titles.to_vec(),
        ids: ids.to_vec(),
    };

    let source_count = publications.len().min(titles.len()).min(ids.len());
    let markers = scan_markers(answer);
    let used = used_indices(&markers, source_count);

    if used.len() == source_count {
        // Every source is cited; nothing to remove or shift.
        return unchanged();
    }

    // Renumber: each used index drops by the number of unused indices below
    // it. Applied via a single rebuild, never cascaded substitution.
    let renumbered = |old: usize| -> usize {
        old - (1..old).filter(|below| !used.contains(below)).count()
    };

    let mut text = String::with_capacity(answer.len());
    let mut cursor = 0;
    for marker in &markers {
        text.push_str(&answer[cursor..marker.start]);
        if used.contains(&marker.index) {
            text.push_str(&format!("[{}]", renumbered(marker.index)));
        } else {
            // Out-of-range numeral: not a citation of ours, keep verbatim.
            text.push_str(&answer[marker.start..marker.end]);
        }
        cursor = marker.end;
    }
    text.push_str(&answer[cursor..]);

    let result = CitedAnswer {
        publications: filter_used(publications, &used),
        titles: filter_used(titles, &used),
        ids: filter_used(ids, &used),
        text,
    };

    // The surviving markers must run 1..=m with no gaps; anything else means
    // the numbering went inconsistent and the original is safer.
    let final_used = used_indices(&scan_markers(&result.text), source_count);
    let expected: BTreeSet<usize> = (1..=result.publications.len()).collect();
    if final_used != expected {
        warn!("Citation renumbering produced inconsistent markers; keeping original numbering");
        return unchanged();
    }

    result
}
