#[cfg(test)]
use crate::score::{Score, ScoreRef};
#[cfg(test)]
use crate::types::signature::TimeSignature;

/// Formats with at most five decimals, keeping one trailing zero.
pub fn format_float(value: f64) -> String {
    let trimmed_zeros = format!("{:.5}", value).trim_end_matches('0').to_string();

    if trimmed_zeros.ends_with('.') {
        trimmed_zeros + "0"
    } else {
        trimmed_zeros
    }
}

/// `m:ss.mmm` for listings.
pub fn format_seconds(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    format!("{}:{:02}.{:03}", millis / 60_000, millis / 1000 % 60, millis % 1000)
}

/// Score of 4/4 measures with a measure rest in every staff.
#[cfg(test)]
pub fn test_score(staves: usize, measures: usize) -> ScoreRef {
    let mut score = Score::new(staves);
    score.append_measures(measures, TimeSignature::default());
    score.into_ref()
}
