//! Candidate key classification and collection

use std::fmt;

/// How likely a candidate is the database key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Printable ASCII with at least one symbol
    High,
    /// Printable ASCII, letters and digits only
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateKey {
    pub value: String,
    pub confidence: Confidence,
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

/// Classify a raw buffer read from the target.
///
/// `None` if any byte is outside printable ASCII.
pub fn classify(bytes: &[u8]) -> Option<CandidateKey> {
    if bytes.is_empty() || !bytes.iter().all(|&b| is_printable(b)) {
        return None;
    }
    let confidence = if bytes.iter().any(|b| b.is_ascii_punctuation()) {
        Confidence::High
    } else {
        Confidence::Low
    };
    Some(CandidateKey {
        value: bytes.iter().map(|&b| b as char).collect(),
        confidence,
    })
}

/// Deduplicated candidates in the order they were seen
#[derive(Debug, Clone, Default)]
pub struct KeyCollector {
    keys: Vec<CandidateKey>,
}

impl KeyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify and keep `bytes`. Returns the confidence of a kept candidate.
    pub fn record(&mut self, bytes: &[u8]) -> Option<Confidence> {
        let Some(candidate) = classify(bytes) else {
            log::debug!("Discarding non-printable candidate {}", hex::encode(bytes));
            return None;
        };
        let confidence = candidate.confidence;
        if self.keys.iter().any(|key| key.value == candidate.value) {
            log::trace!("Duplicate candidate {}", candidate.value);
        } else {
            log::info!("Candidate key ({:?}): {}", confidence, candidate.value);
            self.keys.push(candidate);
        }
        Some(confidence)
    }

    pub fn keys(&self) -> &[CandidateKey] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<CandidateKey> {
        self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// First high-confidence key
    pub fn best(&self) -> Option<&CandidateKey> {
        self.keys
            .iter()
            .find(|key| key.confidence == Confidence::High)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_is_high_confidence() {
        let key = classify(b"ab12CD!@#$%^&*()").unwrap();
        assert_eq!(key.confidence, Confidence::High);
        assert_eq!(key.value, "ab12CD!@#$%^&*()");
    }

    #[test]
    fn test_alphanumeric_is_low_confidence() {
        let key = classify(b"abcdEFGH12345678").unwrap();
        assert_eq!(key.confidence, Confidence::Low);
    }

    #[test]
    fn test_rejects_control_and_high_bytes() {
        assert!(classify(b"abcdEFGH1234567\x01").is_none());
        assert!(classify(&[0x41, 0x80, 0x41]).is_none());
        assert!(classify(b"").is_none());
    }

    #[test]
    fn test_collector_dedups_and_picks_best() {
        let mut collector = KeyCollector::new();
        assert_eq!(collector.record(b"abcdEFGH12345678"), Some(Confidence::Low));
        assert_eq!(collector.record(b"\x01bcdEFGH12345678"), None);
        assert_eq!(collector.record(b"ab12CD!@#$%^&*()"), Some(Confidence::High));
        assert_eq!(collector.record(b"abcdEFGH12345678"), Some(Confidence::Low));

        assert_eq!(collector.len(), 2);
        assert_eq!(collector.best().unwrap().value, "ab12CD!@#$%^&*()");
    }
}
