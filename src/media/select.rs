//! Audio stream selection
//!
//! Explicit index wins, then language restricts the candidates, then the
//! richest stream is ranked first by `(channels, sample_rate, bit_rate)`,
//! all descending. The sort is stable, so ties keep probe order.

use crate::types::{ProbeResult, StreamDescriptor};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use thiserror::Error;

/// How the stream was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    RequestedIndex,
    Language,
    Ranked,
}

/// The audio stream a file will be transcoded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedStream {
    pub index: u32,
    pub strategy: SelectionStrategy,
    pub stream: StreamDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("input has no audio streams")]
    NoAudioStream,

    #[error("audio stream index {index} not found (available: {available:?})")]
    IndexNotFound { index: u32, available: Vec<u32> },

    #[error("no audio stream with language '{language}' (available: {available:?})")]
    LanguageNotFound {
        language: String,
        available: Vec<String>,
    },
}

/// Pick one audio stream from a probe result
pub fn select(
    probe: &ProbeResult,
    requested_index: Option<u32>,
    requested_language: Option<&str>,
) -> Result<SelectedStream, SelectionError> {
    let streams = &probe.audio_streams;
    if streams.is_empty() {
        return Err(SelectionError::NoAudioStream);
    }

    if let Some(index) = requested_index {
        return probe
            .audio_stream(index)
            .map(|s| SelectedStream {
                index,
                strategy: SelectionStrategy::RequestedIndex,
                stream: s.clone(),
            })
            .ok_or_else(|| SelectionError::IndexNotFound {
                index,
                available: streams.iter().map(|s| s.index).collect(),
            });
    }

    let (mut candidates, strategy): (Vec<&StreamDescriptor>, _) = match requested_language {
        Some(language) => {
            let wanted = language.trim();
            let matching: Vec<_> = streams
                .iter()
                .filter(|s| {
                    s.language
                        .as_deref()
                        .is_some_and(|l| l.eq_ignore_ascii_case(wanted))
                })
                .collect();
            if matching.is_empty() {
                return Err(SelectionError::LanguageNotFound {
                    language: wanted.to_string(),
                    available: streams.iter().filter_map(|s| s.language.clone()).collect(),
                });
            }
            (matching, SelectionStrategy::Language)
        }
        None => (streams.iter().collect(), SelectionStrategy::Ranked),
    };

    candidates.sort_by_key(|s| {
        (
            Reverse(s.channels),
            Reverse(s.sample_rate),
            Reverse(s.bit_rate.unwrap_or(0)),
        )
    });

    // Non-empty: both branches above guarantee at least one candidate
    let best = candidates
        .first()
        .ok_or(SelectionError::NoAudioStream)?;

    Ok(SelectedStream {
        index: best.index,
        strategy,
        stream: (*best).clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: u32, channels: u32, sample_rate: u32) -> StreamDescriptor {
        StreamDescriptor {
            index,
            codec_name: Some("aac".into()),
            sample_rate,
            channels,
            bit_rate: None,
            channel_layout: None,
            language: None,
            bits_per_sample: None,
        }
    }

    fn probe(streams: Vec<StreamDescriptor>) -> ProbeResult {
        ProbeResult {
            audio_streams: streams,
            ..Default::default()
        }
    }

    #[test]
    fn test_ranks_channels_then_sample_rate() {
        let p = probe(vec![
            stream(0, 2, 44100),
            stream(1, 2, 48000),
            stream(2, 1, 48000),
        ]);
        let selected = select(&p, None, None).unwrap();
        assert_eq!(selected.index, 1);
        assert_eq!(selected.strategy, SelectionStrategy::Ranked);
    }

    #[test]
    fn test_bit_rate_breaks_ties_and_missing_counts_as_zero() {
        let mut a = stream(0, 2, 48000);
        let mut b = stream(1, 2, 48000);
        a.bit_rate = None;
        b.bit_rate = Some(128_000);
        let selected = select(&probe(vec![a, b]), None, None).unwrap();
        assert_eq!(selected.index, 1);
    }

    #[test]
    fn test_full_tie_keeps_probe_order() {
        let p = probe(vec![stream(4, 2, 48000), stream(2, 2, 48000)]);
        assert_eq!(select(&p, None, None).unwrap().index, 4);
    }

    #[test]
    fn test_requested_index() {
        let p = probe(vec![stream(1, 6, 48000), stream(2, 1, 8000)]);
        let selected = select(&p, Some(2), None).unwrap();
        assert_eq!(selected.index, 2);
        assert_eq!(selected.strategy, SelectionStrategy::RequestedIndex);

        let err = select(&p, Some(0), None).unwrap_err();
        assert_eq!(
            err,
            SelectionError::IndexNotFound {
                index: 0,
                available: vec![1, 2]
            }
        );
    }

    #[test]
    fn test_requested_index_beats_language() {
        let mut eng = stream(1, 2, 48000);
        eng.language = Some("eng".into());
        let p = probe(vec![eng, stream(2, 1, 8000)]);
        assert_eq!(select(&p, Some(2), Some("eng")).unwrap().index, 2);
    }

    #[test]
    fn test_language_filter_then_rank() {
        let mut eng_stereo = stream(1, 2, 48000);
        eng_stereo.language = Some("eng".into());
        let mut ger_surround = stream(2, 6, 48000);
        ger_surround.language = Some("ger".into());
        let mut eng_mono = stream(3, 1, 48000);
        eng_mono.language = Some("ENG".into());

        let p = probe(vec![eng_mono, ger_surround, eng_stereo]);
        let selected = select(&p, None, Some("eng")).unwrap();
        assert_eq!(selected.index, 1);
        assert_eq!(selected.strategy, SelectionStrategy::Language);

        let err = select(&p, None, Some("fra")).unwrap_err();
        assert!(matches!(err, SelectionError::LanguageNotFound { .. }));
    }

    #[test]
    fn test_no_audio_streams() {
        let p = probe(vec![]);
        assert_eq!(select(&p, None, None).unwrap_err(), SelectionError::NoAudioStream);
        assert_eq!(
            select(&p, Some(0), None).unwrap_err(),
            SelectionError::NoAudioStream
        );
    }
}
