use crate::emotion::SimpleEmotion;

// Checked in order; the first group with a matching substring wins.
const KEYWORD_GROUPS: [(SimpleEmotion, &[&str]); 3] = [
    (
        SimpleEmotion::Distressed,
        &["distress", "dysregulation", "sick"],
    ),
    (SimpleEmotion::Sad, &["sad", "whine"]),
    (SimpleEmotion::Happy, &["delighted", "laugh", "happy"]),
];

/// Maps a classifier label onto the four categories; anything unrecognized
/// is neutral.
pub fn simplify_emotion(raw_label: &str) -> SimpleEmotion {
    let lower = raw_label.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(emotion, _)| *emotion)
        .unwrap_or(SimpleEmotion::Neutral)
}
