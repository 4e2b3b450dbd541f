//! Console and n-best list output.

use std::collections::BTreeMap;
use std::io::{self, Write};

use phrasal_core::vocab::Vocabulary;
use phrasal_core::Translation;
use serde::Serialize;

/// N-best file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NbestFormat {
    /// `id ||| output ||| name: value ... ||| score [||| alignment]`
    Moses,
    /// One JSON object per entry.
    JsonLines,
}

#[derive(Debug, Serialize)]
struct NbestRecord<'a> {
    id: usize,
    rank: usize,
    score: f64,
    output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    features: Option<BTreeMap<&'a str, f64>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    alignment: Vec<(usize, usize)>,
}

/// Render one n-best entry as a single line without the trailing newline.
pub fn format_entry(
    format: NbestFormat,
    sentence_id: usize,
    t: &Translation,
    vocab: &Vocabulary,
) -> io::Result<String> {
    match format {
        NbestFormat::Moses => {
            let features = t.features.as_ref().map(|f| f.to_string()).unwrap_or_default();
            let mut line = format!(
                "{sentence_id} ||| {} ||| {features} ||| {}",
                t.output.render(vocab),
                t.score
            );
            let links = t.word_alignment();
            if !links.is_empty() {
                let text: Vec<String> = links.iter().map(|(s, t)| format!("{s}-{t}")).collect();
                line.push_str(" ||| ");
                line.push_str(&text.join(" "));
            }
            Ok(line)
        }
        NbestFormat::JsonLines => {
            let record = NbestRecord {
                id: sentence_id,
                rank: t.rank,
                score: t.score,
                output: t.output.render(vocab),
                features: t
                    .features
                    .as_ref()
                    .map(|f| f.iter().collect::<BTreeMap<_, _>>()),
                alignment: t.word_alignment(),
            };
            serde_json::to_string(&record).map_err(io::Error::from)
        }
    }
}

/// Write every entry of one sentence's n-best list.
pub fn write_nbest<W: Write>(
    out: &mut W,
    format: NbestFormat,
    sentence_id: usize,
    list: &[Translation],
    vocab: &Vocabulary,
) -> io::Result<()> {
    for t in list {
        writeln!(out, "{}", format_entry(format, sentence_id, t, vocab)?)?;
    }
    Ok(())
}

/// Write the 1-best output, or an empty line when there is none.
pub fn write_best<W: Write>(out: &mut W, list: &[Translation], vocab: &Vocabulary) -> io::Result<()> {
    match list.first() {
        Some(t) => writeln!(out, "{}", t.output.render(vocab)),
        None => writeln!(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phrasal_core::decoder::Span;
    use phrasal_core::features::FeatureVector;
    use phrasal_core::model::PhraseAlignment;
    use phrasal_core::sequence::Sequence;
    use phrasal_core::PhraseStep;

    fn translation(vocab: &Vocabulary) -> Translation {
        let mut features = FeatureVector::new();
        features.add("TM.0", -0.5);
        features.add("LM", -2.25);
        Translation {
            rank: 0,
            score: -1.5,
            output: Sequence::from_line(vocab, "the house"),
            features: Some(features),
            derivation: vec![PhraseStep {
                source: Span::new(0, 2),
                target: 0..2,
                alignment: PhraseAlignment::parse("0-0 1-1"),
                pass_through: false,
            }],
        }
    }

    #[test]
    fn moses_line() {
        let vocab = Vocabulary::new();
        let t = translation(&vocab);
        let line = format_entry(NbestFormat::Moses, 7, &t, &vocab).unwrap();
        assert_eq!(line, "7 ||| the house ||| LM: -2.25 TM.0: -0.5 ||| -1.5 ||| 0-0 1-1");
    }

    #[test]
    fn json_line() {
        let vocab = Vocabulary::new();
        let mut t = translation(&vocab);
        t.derivation.clear();
        let line = format_entry(NbestFormat::JsonLines, 3, &t, &vocab).unwrap();
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["id"], 3);
        assert_eq!(v["output"], "the house");
        assert_eq!(v["features"]["LM"], -2.25);
        assert!(v.get("alignment").is_none());
    }

    #[test]
    fn empty_list_prints_blank_line() {
        let vocab = Vocabulary::new();
        let mut out = Vec::new();
        write_best(&mut out, &[], &vocab).unwrap();
        write_best(&mut out, &[translation(&vocab)], &vocab).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\nthe house\n");
    }
}
