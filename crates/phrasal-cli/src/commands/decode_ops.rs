use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use phrasal_core::engine::{DecodeOutcome, DecodeRequest, Decoder, Models};
use phrasal_core::features::Weights;
use phrasal_core::model::{LanguageModel, NgramLanguageModel};
use phrasal_core::sequence::Sequence;
use phrasal_core::settings::{parse_settings_toml, Settings};
use phrasal_core::vocab::Vocabulary;
use tracing::{info, warn};

use crate::loaders;
use crate::output::{self, NbestFormat};

macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            process::exit(1);
        })
    };
}

/// Everything the `decode` command reads from the command line.
#[derive(Debug, Default)]
pub struct DecodeOptions {
    pub config: Option<PathBuf>,
    pub ttables: Vec<PathBuf>,
    pub lm: Option<PathBuf>,
    pub weights: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub nbest_file: Option<PathBuf>,
    pub json: bool,
    pub force_decode: Vec<PathBuf>,
    pub threads: Option<usize>,
    pub nbest: Option<usize>,
}

pub fn load_settings(opts: &DecodeOptions) -> Settings {
    let mut settings = match &opts.config {
        Some(path) => {
            let content = die!(
                fs::read_to_string(path),
                "Error reading {}: {}",
                path.display()
            );
            die!(parse_settings_toml(&content), "Error in {}: {}", path.display())
        }
        None => Settings::default(),
    };
    if let Some(threads) = opts.threads {
        settings.runtime.threads = threads;
    }
    if let Some(n) = opts.nbest {
        settings.nbest.size = n;
    }
    settings
}

/// Load the models and weights and build the decoder, exiting on any
/// startup error.
pub fn build_decoder(opts: &DecodeOptions) -> Decoder {
    let settings = load_settings(opts);
    let vocab = Arc::new(Vocabulary::new());

    if opts.ttables.is_empty() {
        eprintln!("Error: at least one --ttable is required");
        process::exit(1);
    }
    let tm = die!(loaders::load_translation_model(&opts.ttables, &vocab), "Error: {}");
    let lm: Arc<dyn LanguageModel> = match &opts.lm {
        Some(path) => Arc::new(die!(loaders::load_arpa(path, &vocab), "Error: {}")),
        None => {
            warn!("no language model given, LM scores are zero");
            Arc::new(NgramLanguageModel::builder(1).unknown_logprob(0.0).build())
        }
    };

    let mut weights = Weights::from_map(&settings.weights);
    if let Some(path) = &opts.weights {
        weights.extend(&die!(loaders::load_weights(path), "Error: {}"));
    }

    let models = Models { vocab, tm, lm };
    die!(Decoder::new(models, settings, weights), "Error: {}")
}

pub fn decode(opts: &DecodeOptions) {
    let decoder = build_decoder(opts);
    let vocab = Arc::clone(decoder.vocabulary());

    let input: Box<dyn BufRead> = match &opts.input {
        Some(path) => Box::new(BufReader::new(die!(
            fs::File::open(path),
            "Error opening {}: {}",
            path.display()
        ))),
        None => Box::new(io::stdin().lock()),
    };
    let mut nbest_out = opts.nbest_file.as_ref().map(|path| {
        BufWriter::new(die!(
            fs::File::create(path),
            "Error creating {}: {}",
            path.display()
        ))
    });
    let format = if opts.json {
        NbestFormat::JsonLines
    } else {
        NbestFormat::Moses
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut write_error: Option<io::Error> = None;
    let mut sink = |outcome: DecodeOutcome| {
        if write_error.is_some() {
            return;
        }
        let list = outcome.result.unwrap_or_default();
        let mut written = output::write_best(&mut out, &list, &vocab);
        if let Some(nbest) = nbest_out.as_mut() {
            written = written.and_then(|()| {
                output::write_nbest(nbest, format, outcome.sentence_id, &list, &vocab)
            });
        }
        if let Err(e) = written {
            // Stop feeding sentences once the output is gone.
            decoder.cancel();
            write_error = Some(e);
        }
    };

    let summary = if opts.force_decode.is_empty() {
        decoder.decode_lines(input, &mut sink)
    } else {
        let references = die!(
            loaders::load_references(&opts.force_decode, &vocab),
            "Error: {}"
        );
        let requests = constrained_requests(&decoder, input, references);
        decoder.decode_batch(requests, &mut sink)
    };
    let summary = die!(summary, "Error: {}");

    if let Some(e) = write_error {
        eprintln!("Error writing output: {e}");
        process::exit(1);
    }
    die!(out.flush(), "Error writing output: {}");
    if let Some(mut nbest) = nbest_out {
        die!(nbest.flush(), "Error writing n-best list: {}");
    }
    info!(
        sentences = summary.submitted,
        failed = summary.failed,
        "decoding finished"
    );
}

/// Pair each input line with its references. Lines beyond the reference
/// files are decoded unconstrained.
fn constrained_requests<'a>(
    decoder: &'a Decoder,
    input: Box<dyn BufRead + 'a>,
    references: Vec<Vec<Sequence>>,
) -> impl Iterator<Item = DecodeRequest> + 'a {
    let mut references = references.into_iter();
    input
        .lines()
        .map_while(|line| line.map_err(|e| warn!(error = %e, "input read failed, stopping")).ok())
        .enumerate()
        .map(move |(id, line)| {
            let request = DecodeRequest::new(Sequence::from_line(decoder.vocabulary(), &line));
            let Some(refs) = references.next() else {
                warn!(sentence_id = id, "no reference, decoding unconstrained");
                return request;
            };
            match decoder.reference_constraint(refs) {
                Ok(constraint) => request.with_references(constraint),
                Err(e) => {
                    warn!(sentence_id = id, error = %e, "unusable references, decoding unconstrained");
                    request
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn options(ttable: &NamedTempFile, lm: &NamedTempFile, weights: &NamedTempFile) -> DecodeOptions {
        DecodeOptions {
            ttables: vec![ttable.path().into()],
            lm: Some(lm.path().into()),
            weights: Some(weights.path().into()),
            threads: Some(2),
            nbest: Some(3),
            ..DecodeOptions::default()
        }
    }

    #[test]
    fn models_from_files_decode_in_order() {
        let ttable = write_temp(
            "das ||| the ||| 0.9 ||| 0-0\n\
             haus ||| house ||| 0.8 ||| 0-0\n\
             haus ||| home ||| 0.2 ||| 0-0\n\
             das haus ||| the house ||| 0.7 ||| 0-0 1-1\n",
        );
        let lm = write_temp(
            "\\data\\\nngram 1=5\n\n\\1-grams:\n\
             -99 <s> -0.3\n-1 the -0.2\n-1.2 house\n-1.5 home\n-1 </s>\n\\end\\\n",
        );
        let weights = write_temp("TM.0 1\nLM 0.5\nPhrasePenalty -0.1\n");
        let decoder = build_decoder(&options(&ttable, &lm, &weights));
        assert_eq!(decoder.threads(), 2);
        assert_eq!(decoder.settings().nbest.size, 3);
        assert_eq!(decoder.weights().get("LM"), 0.5);

        let mut outputs = Vec::new();
        let summary = decoder
            .decode_lines("das haus\nhaus\n".as_bytes(), |o| {
                let list = o.result.unwrap();
                outputs.push(list[0].output.render(decoder.vocabulary()));
            })
            .unwrap();
        assert_eq!(summary.submitted, 2);
        assert_eq!(outputs, vec!["the house", "house"]);
    }

    #[test]
    fn force_decoding_requests_use_line_references() {
        let ttable = write_temp("haus ||| house ||| 0.8\nhaus ||| home ||| 0.2\n");
        let lm = write_temp("\\data\\\nngram 1=1\n\n\\1-grams:\n-1 house\n\\end\\\n");
        let weights = write_temp("TM.0 1\n");
        let decoder = build_decoder(&options(&ttable, &lm, &weights));
        let refs = vec![vec![Sequence::from_line(decoder.vocabulary(), "home")]];

        let input: Box<dyn BufRead> = Box::new("haus\nhaus\n".as_bytes());
        let requests: Vec<_> = constrained_requests(&decoder, input, refs).collect();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].references.is_some());
        assert!(requests[1].references.is_none());

        let mut outputs = Vec::new();
        decoder
            .decode_batch(requests, |o| {
                outputs.push(o.result.unwrap()[0].output.render(decoder.vocabulary()));
            })
            .unwrap();
        assert_eq!(outputs, vec!["home", "house"]);
    }
}
