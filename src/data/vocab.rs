use std::collections::{BTreeSet, HashMap};

pub const EOS_TOKEN: &str = "<eos>";
pub const UNK_TOKEN: &str = "<unk>";

/// Target-side vocabulary shared by every replica of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    pub const EOS_ID: usize = 0;
    pub const UNK_ID: usize = 1;

    /// Builds a vocabulary with the special tokens first and the remaining
    /// words in sorted order, so independently built copies agree on ids.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sorted: BTreeSet<String> = words
            .into_iter()
            .map(|w| w.as_ref().to_string())
            .filter(|w| !w.is_empty() && w != EOS_TOKEN && w != UNK_TOKEN)
            .collect();

        let mut tokens = Vec::with_capacity(sorted.len() + 2);
        tokens.push(EOS_TOKEN.to_string());
        tokens.push(UNK_TOKEN.to_string());
        tokens.extend(sorted);

        let index = tokens
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id))
            .collect();
        Self { tokens, index }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn id(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn token(&self, id: usize) -> &str {
        self.tokens
            .get(id)
            .map(String::as_str)
            .unwrap_or(UNK_TOKEN)
    }

    pub fn encode<S: AsRef<str>>(&self, words: &[S]) -> Vec<usize> {
        words
            .iter()
            .map(|w| self.id(w.as_ref()).unwrap_or(Self::UNK_ID))
            .collect()
    }

    /// Stops at the first `<eos>`.
    pub fn decode(&self, ids: &[usize]) -> Vec<&str> {
        ids.iter()
            .take_while(|&&id| id != Self::EOS_ID)
            .map(|&id| self.token(id))
            .collect()
    }

    pub fn decode_sentence(&self, ids: &[usize]) -> String {
        self.decode(ids).join(" ")
    }

    pub fn contains_unk(ids: &[usize]) -> bool {
        ids.contains(&Self::UNK_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specials_come_first_and_words_are_sorted() {
        let vocab = Vocabulary::from_words(["haus", "ein", "haus", "<unk>"]);
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.id(EOS_TOKEN), Some(Vocabulary::EOS_ID));
        assert_eq!(vocab.id(UNK_TOKEN), Some(Vocabulary::UNK_ID));
        assert_eq!(vocab.id("ein"), Some(2));
        assert_eq!(vocab.id("haus"), Some(3));
    }

    #[test]
    fn encode_maps_unknown_words_to_unk() {
        let vocab = Vocabulary::from_words(["ein", "haus"]);
        let ids = vocab.encode(&["ein", "boot", "haus"]);
        assert_eq!(ids, vec![2, Vocabulary::UNK_ID, 3]);
        assert!(Vocabulary::contains_unk(&ids));
    }

    #[test]
    fn decode_stops_at_eos() {
        let vocab = Vocabulary::from_words(["ein", "haus"]);
        let sentence = vocab.decode_sentence(&[2, 3, Vocabulary::EOS_ID, 2]);
        assert_eq!(sentence, "ein haus");
        assert_eq!(vocab.decode_sentence(&[99]), UNK_TOKEN);
    }
}
