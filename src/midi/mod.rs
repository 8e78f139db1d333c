mod score_to_midi;

pub use score_to_midi::convert_score_to_midi;
