use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_PHRASES: [(&str, &str); 9] = [
    ("home", "to go home"),
    ("park", "to go to the park"),
    ("pizza", "to eat pizza"),
    ("apple", "to eat an apple"),
    ("mom", "to be with mom"),
    ("dad", "to be with dad"),
    ("school", "to go to school"),
    ("bathroom", "to go to the washroom"),
    ("help", "to get help"),
];

// Everything else, negative affect included, takes "want".
const POSITIVE_AFFECT: [&str; 3] = ["happy", "excited", "delighted"];

#[derive(thiserror::Error, Debug)]
pub enum PhraseTableError {
    #[error("failed to read phrase table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("phrase table {path} must be a JSON object of strings: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Icon id to the phrase spoken for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhraseTable {
    phrases: HashMap<String, String>,
}

impl Default for PhraseTable {
    fn default() -> Self {
        Self {
            phrases: DEFAULT_PHRASES
                .iter()
                .map(|(id, phrase)| ((*id).to_owned(), (*phrase).to_owned()))
                .collect(),
        }
    }
}

impl PhraseTable {
    /// Merges `{ "id": "phrase" }` entries from a JSON file over the current
    /// table. Existing ids are replaced.
    pub fn load_overrides(mut self, path: &Path) -> Result<Self, PhraseTableError> {
        let raw = std::fs::read(path).map_err(|source| PhraseTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extra: HashMap<String, String> =
            serde_json::from_slice(&raw).map_err(|source| PhraseTableError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), entries = extra.len(), "loaded phrase overrides");
        self.phrases.extend(extra);
        Ok(self)
    }

    /// Unknown ids are spoken as-is.
    pub fn phrase_for<'a>(&'a self, id: &'a str) -> &'a str {
        self.phrases.get(id).map_or(id, String::as_str)
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

/// Builds the first-person sentence spoken back to the caregiver.
#[derive(Clone, Debug, Default)]
pub struct SentenceComposer {
    table: PhraseTable,
}

impl SentenceComposer {
    pub fn new(table: PhraseTable) -> Self {
        Self { table }
    }

    pub fn compose<S: AsRef<str>>(&self, emotion: &str, choices: &[S]) -> String {
        let emotion = emotion.to_lowercase();
        let wants = self.choices_to_text(choices);

        if wants.is_empty() {
            return format!("I feel {emotion}.");
        }

        let verb = if POSITIVE_AFFECT.contains(&emotion.as_str()) {
            "would like"
        } else {
            "want"
        };
        format!("I feel {emotion} and I {verb} {wants}.")
    }

    /// "A", "A and B", "A, B and C".
    fn choices_to_text<S: AsRef<str>>(&self, choices: &[S]) -> String {
        let phrases: Vec<&str> = choices
            .iter()
            .map(|c| self.table.phrase_for(c.as_ref()))
            .collect();
        match phrases.split_last() {
            None => String::new(),
            Some((only, [])) => (*only).to_owned(),
            Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose(emotion: &str, choices: &[&str]) -> String {
        SentenceComposer::default().compose(emotion, choices)
    }

    #[test]
    fn no_choices_states_the_feeling() {
        assert_eq!(compose("happy", &[]), "I feel happy.");
    }

    #[test]
    fn positive_affect_would_like() {
        assert_eq!(
            compose("happy", &["pizza"]),
            "I feel happy and I would like to eat pizza."
        );
        assert_eq!(
            compose("excited", &["park"]),
            "I feel excited and I would like to go to the park."
        );
    }

    #[test]
    fn negative_affect_wants_and_joins_two() {
        assert_eq!(
            compose("sad", &["home", "mom"]),
            "I feel sad and I want to go home and to be with mom."
        );
    }

    #[test]
    fn other_emotions_default_to_want() {
        assert_eq!(
            compose("curious", &["park"]),
            "I feel curious and I want to go to the park."
        );
    }

    #[test]
    fn unknown_ids_pass_through() {
        assert_eq!(compose("happy", &["xyz"]), "I feel happy and I would like xyz.");
    }

    #[test]
    fn three_choices_use_serial_listing() {
        assert_eq!(
            compose("distressed", &["bathroom", "help", "dad"]),
            "I feel distressed and I want to go to the washroom, to get help and to be with dad."
        );
    }

    #[test]
    fn emotion_is_lowercased() {
        assert_eq!(
            compose("Happy", &["apple"]),
            "I feel happy and I would like to eat an apple."
        );
    }

    #[test]
    fn overrides_extend_and_replace_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phrases.json");
        std::fs::write(&path, r#"{"pizza": "to have pizza", "swing": "to play on the swing"}"#)
            .unwrap();

        let table = PhraseTable::default().load_overrides(&path).unwrap();
        assert_eq!(table.len(), DEFAULT_PHRASES.len() + 1);
        let composer = SentenceComposer::new(table);
        assert_eq!(
            composer.compose("happy", &["pizza", "swing"]),
            "I feel happy and I would like to have pizza and to play on the swing."
        );
    }

    #[test]
    fn malformed_override_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phrases.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            PhraseTable::default().load_overrides(&path),
            Err(PhraseTableError::Parse { .. })
        ));
    }
}
