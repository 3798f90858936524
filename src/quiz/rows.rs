use anyhow::{Context, Result, bail};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::ui::prelude::{Level, emit};

const COLUMNS: [&str; 5] = [
    "pregunta",
    "correcta",
    "incorrecta1",
    "incorrecta2",
    "incorrecta3",
];

/// One line of the question table as it appears on disk.
#[derive(Debug, Deserialize)]
struct RawRow {
    pregunta: String,
    correcta: String,
    incorrecta1: String,
    incorrecta2: String,
    incorrecta3: String,
}

/// A single quiz item, mapped to exactly one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRow {
    /// 1-based position in the table; names the output file
    pub number: usize,
    pub question: String,
    pub correct: String,
    pub distractors: [String; 3],
}

impl QuizRow {
    fn from_raw(number: usize, raw: RawRow) -> Result<Self> {
        let row = Self {
            number,
            question: raw.pregunta.trim().to_string(),
            correct: raw.correcta.trim().to_string(),
            distractors: [
                raw.incorrecta1.trim().to_string(),
                raw.incorrecta2.trim().to_string(),
                raw.incorrecta3.trim().to_string(),
            ],
        };

        if row.question.is_empty() {
            bail!("empty 'pregunta' cell");
        }
        if row.correct.is_empty() || row.distractors.iter().any(String::is_empty) {
            bail!("empty answer cell");
        }
        Ok(row)
    }

    /// True when two of the four answers share the same text.
    pub fn has_duplicate_options(&self) -> bool {
        let all = self.all_options();
        all.iter()
            .enumerate()
            .any(|(i, a)| all[i + 1..].iter().any(|b| a == b))
    }

    fn all_options(&self) -> [&str; 4] {
        [
            self.correct.as_str(),
            self.distractors[0].as_str(),
            self.distractors[1].as_str(),
            self.distractors[2].as_str(),
        ]
    }
}

/// A row that could not be turned into a [`QuizRow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRow {
    pub number: usize,
    pub reason: String,
}

impl fmt::Display for InvalidRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {}", self.number, self.reason)
    }
}

/// Parsed question table. Bad rows are kept aside so the rest still run.
#[derive(Debug, Default, Clone)]
pub struct QuizTable {
    pub rows: Vec<QuizRow>,
    pub invalid: Vec<InvalidRow>,
}

impl QuizTable {
    pub fn invalid_row(&self, number: usize) -> Option<&InvalidRow> {
        self.invalid.iter().find(|bad| bad.number == number)
    }

    /// Warn about bad rows that `wanted` keeps; an empty filter keeps all.
    /// Returns how many were reported.
    pub fn report_invalid(&self, wanted: &[usize]) -> usize {
        let mut reported = 0;
        for bad in &self.invalid {
            if !wanted.is_empty() && !wanted.contains(&bad.number) {
                continue;
            }
            reported += 1;
            emit(
                Level::Warn,
                "rows.invalid",
                &format!("Skipping {bad}"),
                Some(json!({ "row": bad.number, "reason": bad.reason })),
            );
        }
        reported
    }
}

pub fn load_rows(path: &Path) -> Result<QuizTable> {
    let file =
        File::open(path).with_context(|| format!("Failed to open question table {}", path.display()))?;
    read_rows(file).with_context(|| format!("Failed to read question table {}", path.display()))
}

/// Missing columns and I/O errors fail the whole table; anything wrong
/// with a single record only sets that row aside.
pub fn read_rows<R: Read>(reader: R) -> Result<QuizTable> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
    let headers = csv_reader
        .headers()
        .context("Failed to read the header line")?
        .clone();
    let missing: Vec<&str> = COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        bail!("Missing column(s): {}", missing.join(", "));
    }

    let mut table = QuizTable::default();
    for (idx, record) in csv_reader.deserialize::<RawRow>().enumerate() {
        let number = idx + 1;
        let parsed = match record {
            Ok(raw) => QuizRow::from_raw(number, raw),
            Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => {
                return Err(err).with_context(|| format!("Failed to read row {number}"));
            }
            Err(err) => Err(anyhow::Error::new(err).context("malformed record")),
        };
        match parsed {
            Ok(row) => table.rows.push(row),
            Err(err) => table.invalid.push(InvalidRow {
                number,
                reason: format!("{err:#}"),
            }),
        }
    }
    Ok(table)
}

/// The four answers in display order (A-D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSet {
    options: [String; 4],
    correct_index: usize,
}

impl OptionSet {
    pub fn shuffled<R: Rng + ?Sized>(row: &QuizRow, rng: &mut R) -> Self {
        let mut order = [0usize, 1, 2, 3];
        order.shuffle(rng);
        let source = row.all_options();
        let options = order.map(|i| source[i].to_string());
        let correct_index = order.iter().position(|&i| i == 0).unwrap_or(0);
        Self {
            options,
            correct_index,
        }
    }

    pub fn options(&self) -> &[String; 4] {
        &self.options
    }

    pub fn correct(&self) -> &str {
        &self.options[self.correct_index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const TABLE: &str = "\
pregunta,correcta,incorrecta1,incorrecta2,incorrecta3
Capital of France?,Paris,Lyon,Nice,Rouen
\"Largest planet, by mass?\",Jupiter,Saturn,Neptune,Earth
";

    fn paris() -> QuizRow {
        read_rows(TABLE.as_bytes()).unwrap().rows.remove(0)
    }

    #[test]
    fn reads_rows_with_one_based_numbers() {
        let table = read_rows(TABLE.as_bytes()).unwrap();
        assert!(table.invalid.is_empty());
        let rows = table.rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number, 1);
        assert_eq!(rows[1].number, 2);
        assert_eq!(rows[1].question, "Largest planet, by mass?");
        assert_eq!(rows[1].distractors, ["Saturn", "Neptune", "Earth"]);
    }

    #[test]
    fn empty_question_sets_the_row_aside() {
        let table = "pregunta,correcta,incorrecta1,incorrecta2,incorrecta3\n  ,a,b,c,d\n";
        let table = read_rows(table.as_bytes()).unwrap();
        assert!(table.rows.is_empty());
        assert_eq!(table.invalid[0].number, 1);
        assert_eq!(table.invalid[0].to_string(), "Row 1: empty 'pregunta' cell");
    }

    #[test]
    fn bad_rows_do_not_hide_good_ones() {
        let table = "\
pregunta,correcta,incorrecta1,incorrecta2,incorrecta3
Capital of France?,Paris,Lyon,Nice,Rouen
2+2?,4,3,5,
Too short,a
Largest planet?,Jupiter,Saturn,Neptune,Earth
";
        let table = read_rows(table.as_bytes()).unwrap();
        let good: Vec<usize> = table.rows.iter().map(|r| r.number).collect();
        assert_eq!(good, vec![1, 4]);
        let bad: Vec<usize> = table.invalid.iter().map(|r| r.number).collect();
        assert_eq!(bad, vec![2, 3]);
        assert!(table.invalid_row(2).unwrap().reason.contains("empty answer cell"));
        assert!(table.invalid_row(1).is_none());
    }

    #[test]
    fn invalid_rows_outside_the_filter_are_not_reported() {
        let table = "pregunta,correcta,incorrecta1,incorrecta2,incorrecta3\nQ,,b,c,d\nR,,b,c,d\n";
        let table = read_rows(table.as_bytes()).unwrap();
        assert_eq!(table.report_invalid(&[]), 2);
        assert_eq!(table.report_invalid(&[2, 5]), 1);
        assert_eq!(table.report_invalid(&[5]), 0);
    }

    #[test]
    fn missing_columns_fail_the_table() {
        let table = "pregunta,correcta\nQ,A\n";
        let err = read_rows(table.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("incorrecta1"));
    }

    #[test]
    fn shuffle_preserves_the_answer_set() {
        let row = paris();
        let mut expected = vec!["Lyon", "Nice", "Paris", "Rouen"];
        expected.sort();

        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let set = OptionSet::shuffled(&row, &mut rng);
            let mut got: Vec<&str> = set.options().iter().map(String::as_str).collect();
            got.sort();
            assert_eq!(got, expected);
            assert_eq!(set.correct(), "Paris");
        }
    }

    #[test]
    fn shuffle_actually_moves_the_answer() {
        let row = paris();
        let positions: std::collections::HashSet<usize> = (0..64)
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                OptionSet::shuffled(&row, &mut rng).correct_index
            })
            .collect();
        assert!(positions.len() > 1);
    }

    #[test]
    fn detects_duplicate_options() {
        let mut row = paris();
        assert!(!row.has_duplicate_options());
        row.distractors[2] = "Paris".to_string();
        assert!(row.has_duplicate_options());
    }
}
