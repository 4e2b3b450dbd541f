//! Text model formats read by the `phrasal` binary.
//!
//! - Moses phrase tables: `source ||| target ||| scores [||| alignment [||| ...]]`
//! - ARPA back-off language models (log10, converted to natural log)
//! - Plain-text weights files (`name value` per line)
//! - Reference files for force decoding (one tokenized sentence per line)

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use phrasal_core::features::Weights;
use phrasal_core::model::{
    CompositeTranslationModel, MemoryPhraseTable, NgramLanguageModel, PhraseAlignment,
    TranslationModel,
};
use phrasal_core::sequence::Sequence;
use phrasal_core::vocab::{Symbol, Vocabulary};
use tracing::{debug, info};

/// Names given to independent phrase tables, by position on the command line.
pub const TABLE_NAMES: &[&str] = &["background-tm", "foreground-tm", "termbase-tm"];

const UNKNOWN_TOKEN: &str = "<unk>";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}:{line}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

fn open(path: &Path) -> Result<BufReader<fs::File>, LoadError> {
    fs::File::open(path)
        .map(BufReader::new)
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Iterate `(1-based line number, line)` pairs, failing on the first read error.
fn numbered_lines(path: &Path) -> Result<impl Iterator<Item = Result<(usize, String), LoadError>>, LoadError> {
    let owned = path.to_path_buf();
    Ok(open(path)?.lines().enumerate().map(move |(i, line)| {
        line.map(|l| (i + 1, l)).map_err(|source| LoadError::Io {
            path: owned.clone(),
            source,
        })
    }))
}

/// Name of the `index`-th independent table.
pub fn table_name(index: usize) -> String {
    TABLE_NAMES
        .get(index)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("tm-{index}"))
}

/// Load a Moses-style phrase table.
///
/// Scores are probabilities and are stored as natural logs under `TM.<i>`.
/// Rules whose score count differs from the first rule's are rejected.
pub fn load_phrase_table(
    path: &Path,
    name: &str,
    vocab: &Vocabulary,
) -> Result<MemoryPhraseTable, LoadError> {
    let mut table = MemoryPhraseTable::new(name);
    let mut width = None;
    let parse_err = |line: usize, reason: String| LoadError::Parse {
        path: path.to_path_buf(),
        line,
        reason,
    };

    for item in numbered_lines(path)? {
        let (lineno, line) = item?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split("|||").map(str::trim).collect();
        if fields.len() < 3 {
            return Err(parse_err(lineno, "expected `source ||| target ||| scores`".into()));
        }
        let source = vocab.intern_line(fields[0]);
        if source.is_empty() {
            return Err(parse_err(lineno, "empty source phrase".into()));
        }
        let target = Sequence::from_line(vocab, fields[1]);

        let mut scores = Vec::new();
        for tok in fields[2].split_whitespace() {
            let p: f64 = tok
                .parse()
                .map_err(|_| parse_err(lineno, format!("`{tok}` is not a number")))?;
            if !(p > 0.0 && p.is_finite()) {
                return Err(parse_err(lineno, format!("score {tok} is not a positive probability")));
            }
            scores.push(p.ln());
        }
        match width {
            None => width = Some(scores.len()),
            Some(w) if w != scores.len() => {
                return Err(parse_err(
                    lineno,
                    format!("expected {w} scores, found {}", scores.len()),
                ));
            }
            Some(_) => {}
        }

        let alignment = match fields.get(3).filter(|a| !a.is_empty()) {
            Some(text) => Some(
                PhraseAlignment::parse(text)
                    .ok_or_else(|| parse_err(lineno, format!("bad alignment `{text}`")))?,
            ),
            None => None,
        };
        table.insert(&source, target, &scores, alignment);
    }

    info!(
        table = name,
        sources = table.len(),
        rules = table.rule_count(),
        "phrase table loaded"
    );
    Ok(table)
}

/// Load one or more phrase tables. Several tables are combined into a
/// composite model whose rules carry a `TM.origin.<name>` feature.
pub fn load_translation_model(
    paths: &[PathBuf],
    vocab: &Vocabulary,
) -> Result<Arc<dyn TranslationModel>, LoadError> {
    let mut layers: Vec<Arc<dyn TranslationModel>> = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        layers.push(Arc::new(load_phrase_table(path, &table_name(i), vocab)?));
    }
    if layers.len() == 1 {
        return Ok(layers.remove(0));
    }
    Ok(Arc::new(CompositeTranslationModel::new(layers)))
}

/// Load an ARPA back-off language model.
pub fn load_arpa(path: &Path, vocab: &Vocabulary) -> Result<NgramLanguageModel, LoadError> {
    let parse_err = |line: usize, reason: String| LoadError::Parse {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut declared: Vec<usize> = Vec::new();
    let mut entries: Vec<(Vec<Symbol>, f64, f64)> = Vec::new();
    let mut unknown = None;
    let mut section: Option<usize> = None;
    let mut in_data = false;
    for item in numbered_lines(path)? {
        let (lineno, line) = item?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "\\data\\" {
            in_data = true;
            continue;
        }
        if trimmed == "\\end\\" {
            break;
        }
        if let Some(n) = trimmed
            .strip_prefix('\\')
            .and_then(|s| s.strip_suffix("-grams:"))
        {
            let n: usize = n
                .parse()
                .map_err(|_| parse_err(lineno, format!("bad section header `{trimmed}`")))?;
            section = Some(n);
            in_data = false;
            continue;
        }
        if in_data {
            if let Some(count) = trimmed.strip_prefix("ngram ") {
                let n = count
                    .split_once('=')
                    .and_then(|(n, _)| n.trim().parse::<usize>().ok())
                    .ok_or_else(|| parse_err(lineno, format!("bad count line `{trimmed}`")))?;
                declared.push(n);
            }
            continue;
        }
        let Some(n) = section else {
            continue;
        };

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < n + 1 || fields.len() > n + 2 {
            return Err(parse_err(lineno, format!("expected a {n}-gram entry")));
        }
        let logprob = log10_to_ln(fields[0], lineno, &parse_err)?;
        let backoff = match fields.get(n + 1) {
            Some(bo) => log10_to_ln(bo, lineno, &parse_err)?,
            None => 0.0,
        };
        let words = &fields[1..=n];
        if n == 1 && words[0] == UNKNOWN_TOKEN {
            unknown = Some(logprob);
            continue;
        }
        entries.push((words.iter().map(|w| vocab.intern(w)).collect(), logprob, backoff));
    }

    let order = declared.iter().copied().max().unwrap_or(0);
    if order == 0 {
        return Err(LoadError::Invalid {
            path: path.to_path_buf(),
            reason: "no \\data\\ section with n-gram counts".into(),
        });
    }

    let mut builder = NgramLanguageModel::builder(order);
    if let Some(lp) = unknown {
        builder.unknown_logprob(lp);
    }
    for (ngram, logprob, backoff) in &entries {
        builder.add(ngram, *logprob, *backoff);
    }
    info!(order, ngrams = entries.len(), "language model loaded");
    Ok(builder.build())
}

fn log10_to_ln(
    text: &str,
    lineno: usize,
    parse_err: &impl Fn(usize, String) -> LoadError,
) -> Result<f64, LoadError> {
    let v: f64 = text
        .parse()
        .map_err(|_| parse_err(lineno, format!("`{text}` is not a number")))?;
    Ok(v * std::f64::consts::LN_10)
}

/// Load a plain-text weights file.
pub fn load_weights(path: &Path) -> Result<Weights, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let weights = Weights::parse_text(&text).map_err(|e| LoadError::Invalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(count = weights.len(), "weights loaded");
    Ok(weights)
}

/// Read force-decoding references. Every file holds one reference per
/// input sentence; the result is indexed by sentence, then by file.
pub fn load_references(paths: &[PathBuf], vocab: &Vocabulary) -> Result<Vec<Vec<Sequence>>, LoadError> {
    let mut per_sentence: Vec<Vec<Sequence>> = Vec::new();
    let mut expected = None;
    for path in paths {
        let mut rows = 0;
        for item in numbered_lines(path)? {
            let (lineno, line) = item?;
            let sequence = Sequence::from_line(vocab, &line);
            match per_sentence.get_mut(lineno - 1) {
                Some(refs) => refs.push(sequence),
                None => per_sentence.push(vec![sequence]),
            }
            rows = lineno;
        }
        match expected {
            None => expected = Some(rows),
            Some(n) if n != rows => {
                return Err(LoadError::Invalid {
                    path: path.clone(),
                    reason: format!("has {rows} references, expected {n}"),
                });
            }
            Some(_) => {}
        }
    }
    Ok(per_sentence)
}
