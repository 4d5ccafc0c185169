use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::OutputLayout;
use crate::data::Vocabulary;
use crate::error::TranslateError;
use crate::output::filters::FilterChain;
use crate::types::RankedResult;

/// Renders ranked results as text lines in one of the output layouts.
pub struct OutputFormatter<'a> {
    vocabulary: &'a Vocabulary,
    filters: &'a FilterChain,
}

impl<'a> OutputFormatter<'a> {
    pub fn new(vocabulary: &'a Vocabulary, filters: &'a FilterChain) -> Self {
        Self {
            vocabulary,
            filters,
        }
    }

    /// Token ids to post-processed text, stopping at end of sentence.
    pub fn render(&self, ids: &[usize]) -> String {
        self.filters.apply(&self.vocabulary.decode_sentence(ids))
    }

    /// Builds every output line.
    ///
    /// `selected` lists the sample indices that make up single-best output,
    /// in output order. The nbest layout ignores it and prints all candidates
    /// of all samples.
    pub fn lines(
        &self,
        layout: OutputLayout,
        results: &[RankedResult],
        selected: &[usize],
    ) -> Vec<String> {
        match layout {
            OutputLayout::Plain => selected
                .iter()
                .map(|&idx| {
                    results
                        .get(idx)
                        .and_then(RankedResult::best)
                        .map(|(ids, _)| self.render(ids))
                        .unwrap_or_default()
                })
                .collect(),
            OutputLayout::Scored => selected
                .iter()
                .map(|&idx| {
                    let (text, score) = results
                        .get(idx)
                        .and_then(RankedResult::best)
                        .map(|(ids, score)| (self.render(ids), score))
                        .unwrap_or((String::new(), f32::INFINITY));
                    scored_line(idx, &text, score)
                })
                .collect(),
            OutputLayout::Nbest => results
                .iter()
                .flat_map(|result| {
                    result
                        .hypotheses
                        .iter()
                        .zip(&result.scores)
                        .map(|(ids, &score)| {
                            scored_line(result.sample_index, &self.render(ids), score)
                        })
                })
                .collect(),
        }
    }

    pub fn write_to<W: Write>(
        &self,
        mut out: W,
        layout: OutputLayout,
        results: &[RankedResult],
        selected: &[usize],
    ) -> Result<usize, TranslateError> {
        let lines = self.lines(layout, results, selected);
        for line in &lines {
            writeln!(out, "{line}").map_err(|e| TranslateError::io("write hypotheses", e))?;
        }
        out.flush()
            .map_err(|e| TranslateError::io("flush hypotheses", e))?;
        Ok(lines.len())
    }

    pub fn write_file(
        &self,
        path: &Path,
        layout: OutputLayout,
        results: &[RankedResult],
        selected: &[usize],
    ) -> Result<usize, TranslateError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| TranslateError::io("create output directory", e))?;
        }
        let file = File::create(path).map_err(|e| TranslateError::io("create output file", e))?;
        let written = self.write_to(BufWriter::new(file), layout, results, selected)?;
        tracing::info!(path = %path.display(), lines = written, "hypotheses written");
        Ok(written)
    }
}

fn scored_line(sample_index: usize, text: &str, score: f32) -> String {
    format!("{sample_index} ||| {text} ||| {score:.6}")
}
