//! Word-based lexical translation model used as the built-in decode capability.
//!
//! Each source word maps to a list of scored target phrases. Several model files
//! form an ensemble whose phrase probabilities are averaged. Decoding is
//! monotone: every source position contributes exactly one phrase.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

use crate::config::LexiconModelConfig;
use crate::data::Vocabulary;
use crate::decode::traits::{ReplicaFactory, SequenceDecoder};
use crate::error::TranslateError;
use crate::types::{AttentionMatrix, DecodeOutput, Payload, WorkerId};

const PROB_FLOOR: f32 = 1e-9;

/// Loads model descriptions once for the orchestrator and hands every worker
/// its own freshly loaded replica.
pub struct LexiconFactory {
    paths: Vec<PathBuf>,
    names: Vec<String>,
    vocabulary: Arc<Vocabulary>,
    default_source: Option<PathBuf>,
    default_references: Vec<PathBuf>,
}

impl LexiconFactory {
    pub fn load(paths: &[PathBuf]) -> Result<Self, TranslateError> {
        let configs = load_configs(paths)?;
        let vocabulary = Arc::new(build_vocabulary(&configs));
        let names = configs
            .iter()
            .zip(paths)
            .map(|(config, path)| config.display_name(path))
            .collect();
        let default_source = configs.iter().find_map(|c| c.valid_src.clone());
        let default_references = configs
            .iter()
            .find(|c| !c.valid_refs.is_empty())
            .map(|c| c.valid_refs.clone())
            .unwrap_or_default();

        tracing::info!(
            models = paths.len(),
            vocab = vocabulary.len(),
            "lexicon model description loaded"
        );

        Ok(Self {
            paths: paths.to_vec(),
            names,
            vocabulary,
            default_source,
            default_references,
        })
    }

    pub fn default_source(&self) -> Option<&Path> {
        self.default_source.as_deref()
    }

    pub fn default_references(&self) -> &[PathBuf] {
        &self.default_references
    }
}

impl ReplicaFactory for LexiconFactory {
    fn load_replica(&self, worker: WorkerId) -> Result<Box<dyn SequenceDecoder>, TranslateError> {
        let configs = load_configs(&self.paths)?;
        let decoder = LexiconDecoder::from_configs(&configs, Arc::clone(&self.vocabulary));
        tracing::debug!(
            worker = %worker,
            source_words = decoder.table.len(),
            "lexicon replica loaded"
        );
        Ok(Box::new(decoder))
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn model_names(&self) -> Vec<String> {
        self.names.clone()
    }
}

#[derive(Debug, Clone)]
struct PhraseOption {
    tokens: Vec<usize>,
    prob: f32,
}

#[derive(Debug, Clone)]
struct Partial {
    tokens: Vec<usize>,
    origins: Vec<usize>,
    log_prob: f32,
}

pub struct LexiconDecoder {
    /// Options per source word, most probable first.
    table: HashMap<String, Vec<PhraseOption>>,
    /// Best probability of each target token per source word.
    token_probs: HashMap<String, HashMap<usize, f32>>,
    unk_prob: f32,
    vocabulary: Arc<Vocabulary>,
}

impl LexiconDecoder {
    pub fn from_configs(configs: &[LexiconModelConfig], vocabulary: Arc<Vocabulary>) -> Self {
        let members = configs.len().max(1) as f32;
        let mut summed: HashMap<String, BTreeMap<String, f32>> = HashMap::new();
        for config in configs {
            for (word, phrases) in &config.lexicon {
                let entry = summed.entry(word.clone()).or_default();
                for (phrase, prob) in phrases {
                    *entry.entry(phrase.clone()).or_insert(0.0) += prob.max(0.0);
                }
            }
        }

        let mut table = HashMap::with_capacity(summed.len());
        let mut token_probs: HashMap<String, HashMap<usize, f32>> = HashMap::new();
        for (word, phrases) in summed {
            let mut options: Vec<PhraseOption> = phrases
                .into_iter()
                .map(|(phrase, total)| PhraseOption {
                    tokens: vocabulary.encode(&phrase.split_whitespace().collect::<Vec<_>>()),
                    prob: total / members,
                })
                .collect();
            options.sort_by(|a, b| b.prob.total_cmp(&a.prob));

            let per_token = token_probs.entry(word.clone()).or_default();
            for option in &options {
                for &token in &option.tokens {
                    let best = per_token.entry(token).or_insert(0.0);
                    *best = best.max(option.prob);
                }
            }
            table.insert(word, options);
        }

        let unk_prob = configs.iter().map(|c| c.unk_prob).sum::<f32>() / members;
        Self {
            table,
            token_probs,
            unk_prob: unk_prob.max(PROB_FLOOR),
            vocabulary,
        }
    }

    fn options(&self, word: &str) -> Vec<PhraseOption> {
        match self.table.get(word) {
            Some(options) if !options.is_empty() => options.clone(),
            _ => vec![PhraseOption {
                tokens: vec![Vocabulary::UNK_ID],
                prob: self.unk_prob,
            }],
        }
    }

    fn search(&self, source: &[String], width: usize) -> DecodeOutput {
        let mut beams = vec![Partial {
            tokens: Vec::new(),
            origins: Vec::new(),
            log_prob: 0.0,
        }];

        for (position, word) in source.iter().enumerate() {
            let options = self.options(word);
            let mut next = Vec::with_capacity(beams.len() * options.len());
            for beam in &beams {
                for option in &options {
                    let mut tokens = beam.tokens.clone();
                    tokens.extend_from_slice(&option.tokens);
                    let mut origins = beam.origins.clone();
                    origins.extend(std::iter::repeat(position).take(option.tokens.len()));
                    next.push(Partial {
                        tokens,
                        origins,
                        log_prob: beam.log_prob + option.prob.max(PROB_FLOOR).ln(),
                    });
                }
            }
            next.sort_by(|a, b| b.log_prob.total_cmp(&a.log_prob));
            next.truncate(width.max(1));
            beams = next;
        }

        self.finish(beams, source.len())
    }

    fn finish(&self, beams: Vec<Partial>, source_len: usize) -> DecodeOutput {
        let mut output = DecodeOutput {
            hypotheses: Vec::with_capacity(beams.len()),
            scores: Vec::with_capacity(beams.len()),
            alignments: Some(Vec::with_capacity(beams.len())),
        };
        for beam in beams {
            let attention = one_hot_attention(&beam.origins, source_len);
            if let Some(alignments) = output.alignments.as_mut() {
                alignments.push(attention);
            }
            output.scores.push(-beam.log_prob);
            output.hypotheses.push(beam.tokens);
        }
        output
    }

    fn lexical_prob(&self, source_word: &str, token: usize) -> f32 {
        self.token_probs
            .get(source_word)
            .and_then(|probs| probs.get(&token))
            .copied()
            .unwrap_or(0.0)
    }
}

impl SequenceDecoder for LexiconDecoder {
    fn beam_search(
        &mut self,
        payload: &Payload,
        beam_size: usize,
    ) -> Result<DecodeOutput, TranslateError> {
        Ok(self.search(&payload.source, beam_size))
    }

    fn force(&mut self, payload: &Payload) -> Result<DecodeOutput, TranslateError> {
        let target = payload.target.as_ref().ok_or_else(|| {
            TranslateError::decode("forced decoding", "payload carries no target sentence")
        })?;
        let ids = self.vocabulary.encode(target.as_slice());

        let mut neg_log_prob = 0.0f32;
        let mut attention = Vec::with_capacity(ids.len());
        for &token in &ids {
            let row: Vec<f32> = payload
                .source
                .iter()
                .map(|word| self.lexical_prob(word, token))
                .collect();
            let mass: f32 = row.iter().sum();
            let prob = if row.is_empty() {
                self.unk_prob
            } else {
                mass / row.len() as f32
            };
            neg_log_prob -= prob.max(PROB_FLOOR).ln();
            attention.push(normalize_row(row));
        }

        Ok(DecodeOutput {
            hypotheses: vec![ids],
            scores: vec![neg_log_prob],
            alignments: Some(vec![attention]),
        })
    }

    fn sample(
        &mut self,
        payload: &Payload,
        rng: &mut StdRng,
    ) -> Result<DecodeOutput, TranslateError> {
        let mut partial = Partial {
            tokens: Vec::new(),
            origins: Vec::new(),
            log_prob: 0.0,
        };
        for (position, word) in payload.source.iter().enumerate() {
            let options = self.options(word);
            let choice = WeightedIndex::new(options.iter().map(|o| o.prob.max(PROB_FLOOR)))
                .map(|dist| dist.sample(rng))
                .unwrap_or(0);
            let option = &options[choice];
            partial.tokens.extend_from_slice(&option.tokens);
            partial
                .origins
                .extend(std::iter::repeat(position).take(option.tokens.len()));
            partial.log_prob += option.prob.max(PROB_FLOOR).ln();
        }
        Ok(self.finish(vec![partial], payload.source.len()))
    }

    fn argmax(&mut self, payload: &Payload) -> Result<DecodeOutput, TranslateError> {
        Ok(self.search(&payload.source, 1))
    }
}

fn load_configs(paths: &[PathBuf]) -> Result<Vec<LexiconModelConfig>, TranslateError> {
    paths
        .iter()
        .map(|path| LexiconModelConfig::load(path))
        .collect()
}

fn build_vocabulary(configs: &[LexiconModelConfig]) -> Vocabulary {
    Vocabulary::from_words(configs.iter().flat_map(|config| {
        config
            .lexicon
            .values()
            .flatten()
            .flat_map(|(phrase, _)| phrase.split_whitespace())
    }))
}

fn one_hot_attention(origins: &[usize], source_len: usize) -> AttentionMatrix {
    origins
        .iter()
        .map(|&origin| {
            let mut row = vec![0.0f32; source_len];
            if let Some(cell) = row.get_mut(origin) {
                *cell = 1.0;
            }
            row
        })
        .collect()
}

fn normalize_row(row: Vec<f32>) -> Vec<f32> {
    let mass: f32 = row.iter().sum();
    if row.is_empty() {
        return row;
    }
    if mass <= 0.0 {
        let uniform = 1.0 / row.len() as f32;
        return vec![uniform; row.len()];
    }
    row.into_iter().map(|v| v / mass).collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn toy_config() -> LexiconModelConfig {
        serde_json::from_str(
            r#"{
                "name": "toy",
                "lexicon": {
                    "a": [["ein", 0.6], ["eine", 0.4]],
                    "house": [["haus", 0.9], ["das haus", 0.1]],
                    "big": [["gross", 1.0]]
                }
            }"#,
        )
        .expect("valid toy model")
    }

    fn toy_decoder() -> LexiconDecoder {
        let configs = vec![toy_config()];
        let vocab = Arc::new(build_vocabulary(&configs));
        LexiconDecoder::from_configs(&configs, vocab)
    }

    fn payload(source: &str) -> Payload {
        Payload {
            source: source.split_whitespace().map(str::to_string).collect(),
            ..Payload::default()
        }
    }

    #[test]
    fn beam_search_returns_best_first_with_attention() {
        let mut decoder = toy_decoder();
        let out = decoder.beam_search(&payload("a house"), 3).expect("decode");
        assert_eq!(out.hypotheses.len(), 3);
        assert_eq!(decoder.vocabulary.decode_sentence(&out.hypotheses[0]), "ein haus");
        assert!((out.scores[0] - -(0.6f32.ln() + 0.9f32.ln())).abs() < 1e-5);
        assert!(out.scores.windows(2).all(|w| w[0] <= w[1]));

        let alignments = out.alignments.expect("attention present");
        assert_eq!(alignments[0], vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn unknown_words_become_unk() {
        let mut decoder = toy_decoder();
        let out = decoder.argmax(&payload("a boat")).expect("decode");
        assert_eq!(out.hypotheses.len(), 1);
        assert!(Vocabulary::contains_unk(&out.hypotheses[0]));
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let mut decoder = toy_decoder();
        let input = payload("a house a house big");
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let a = decoder.sample(&input, &mut rng_a).expect("sample a");
        let b = decoder.sample(&input, &mut rng_b).expect("sample b");
        assert_eq!(a, b);
    }

    #[test]
    fn forced_scores_the_given_target() {
        let mut decoder = toy_decoder();
        let input = Payload {
            target: Some(vec!["ein".to_string(), "haus".to_string()]),
            ..payload("a house")
        };
        let out = decoder.force(&input).expect("force");
        assert_eq!(out.hypotheses.len(), 1);
        assert_eq!(decoder.vocabulary.decode_sentence(&out.hypotheses[0]), "ein haus");
        // mean lexical prob over two source words: (0.6 + 0) / 2 and (0 + 0.9) / 2
        let expected = -((0.3f32).ln() + (0.45f32).ln());
        assert!((out.scores[0] - expected).abs() < 1e-5);

        let attention = &out.alignments.expect("attention")[0];
        assert_eq!(attention[0], vec![1.0, 0.0]);
    }

    #[test]
    fn forced_without_target_is_an_error() {
        let mut decoder = toy_decoder();
        assert!(decoder.force(&payload("a house")).is_err());
    }

    #[test]
    fn ensemble_averages_phrase_probabilities() {
        let second: LexiconModelConfig = serde_json::from_str(
            r#"{"lexicon": {"a": [["eine", 1.0]]}}"#,
        )
        .expect("valid model");
        let configs = vec![toy_config(), second];
        let vocab = Arc::new(build_vocabulary(&configs));
        let mut decoder = LexiconDecoder::from_configs(&configs, vocab);
        let out = decoder.argmax(&payload("a")).expect("decode");
        // ein: 0.6 / 2 = 0.3, eine: (0.4 + 1.0) / 2 = 0.7
        assert_eq!(decoder.vocabulary.decode_sentence(&out.hypotheses[0]), "eine");
        assert!((out.scores[0] - -(0.7f32.ln())).abs() < 1e-5);
    }

    #[test]
    fn factory_loads_replicas_and_default_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = dir.path().join("toy.json");
        std::fs::write(
            &model,
            r#"{
                "lexicon": {"a": [["ein", 1.0]]},
                "valid_src": "dev.src",
                "valid_refs": ["dev.ref"]
            }"#,
        )
        .expect("write model");

        let factory = LexiconFactory::load(&[model]).expect("load");
        assert_eq!(factory.model_names(), vec!["toy".to_string()]);
        assert_eq!(factory.default_source(), Some(Path::new("dev.src")));
        assert_eq!(factory.default_references(), &[PathBuf::from("dev.ref")]);

        let mut replica = factory.load_replica(WorkerId(3)).expect("replica");
        let out = replica.argmax(&payload("a")).expect("decode");
        assert_eq!(factory.vocabulary().decode_sentence(&out.hypotheses[0]), "ein");
    }
}
