//! Morse table: character <-> representation lookup.

use lazy_static::lazy_static;
use phf::phf_map;

use crate::error::{CwError, CwResult};

/// Longest representation present in the International Morse table.
pub const MAX_REP_LEN: usize = 7;

/// International Morse code table, character -> dot/dash representation.
pub const MORSE: phf::Map<char, &'static str> = phf_map! {
    'A' => ".-",    'B' => "-...",  'C' => "-.-.",  'D' => "-..",
    'E' => ".",     'F' => "..-.",  'G' => "--.",   'H' => "....",
    'I' => "..",    'J' => ".---",  'K' => "-.-",   'L' => ".-..",
    'M' => "--",    'N' => "-.",    'O' => "---",   'P' => ".--.",
    'Q' => "--.-",  'R' => ".-.",   'S' => "...",   'T' => "-",
    'U' => "..-",   'V' => "...-", 'W' => ".--",    'X' => "-..-",
    'Y' => "-.--",  'Z' => "--..",
    '0' => "-----", '1' => ".----", '2' => "..---", '3' => "...--",
    '4' => "....-", '5' => ".....", '6' => "-....", '7' => "--...",
    '8' => "---..", '9' => "----.",
    '.' => ".-.-.-", ',' => "--..--", '?' => "..--..", '/' => "-..-.",
    '&' => ".-...", '(' => "-.--.",  ')' => "-.--.-", '+' => ".-.-.",
    '=' => "-...-", '@' => ".--.-.", ':' => "---...", '\'' => ".----.",
    '"' => ".-..-.", '!' => "-.-.--", ';' => "-.-.-.", '_' => "..--.-",
    '$' => "...-..-",
};

/// Procedural signs ("prosigns"): the characters above that the amateur-radio
/// convention overloads with a run-together multi-letter mnemonic, plus
/// whether the mnemonic is usually sent/expanded that way in practice.
pub const PROCEDURAL: phf::Map<char, (&'static str, bool)> = phf_map! {
    '+' => ("AR", true),   // end of message
    '=' => ("BT", true),   // break / new paragraph
    '(' => ("KN", true),   // invite a specific station to transmit
    '&' => ("AS", true),   // wait
    ';' => ("KA", false),  // starting signal, rarely expanded in casual QSOs
};

/// NATO/ICAO phonetic alphabet for A-Z, used by receive-side error prompts
/// and by the reference CLI application.
pub const PHONETIC: phf::Map<char, &'static str> = phf_map! {
    'A' => "Alpha",    'B' => "Bravo",    'C' => "Charlie", 'D' => "Delta",
    'E' => "Echo",     'F' => "Foxtrot",  'G' => "Golf",    'H' => "Hotel",
    'I' => "India",    'J' => "Juliett",  'K' => "Kilo",    'L' => "Lima",
    'M' => "Mike",     'N' => "November", 'O' => "Oscar",   'P' => "Papa",
    'Q' => "Quebec",   'R' => "Romeo",    'S' => "Sierra",  'T' => "Tango",
    'U' => "Uniform",  'V' => "Victor",   'W' => "Whiskey", 'X' => "X-ray",
    'Y' => "Yankee",   'Z' => "Zulu",
};

/// Hash a dot/dash representation to the `[2, 255]` fast-lookup domain.
///
/// Writes a leading sentinel `1` bit followed by one bit per symbol
/// (`.` = 0, `-` = 1). Returns `None` for empty or over-long representations
/// or representations containing a character other than `.`/`-`.
pub fn hash_representation(rep: &str) -> Option<u8> {
    let len = rep.chars().count();
    if len == 0 || len > MAX_REP_LEN {
        return None;
    }
    let mut acc: u16 = 1;
    for c in rep.chars() {
        let bit = match c {
            '.' => 0u16,
            '-' => 1u16,
            _ => return None,
        };
        acc = (acc << 1) | bit;
    }
    Some(acc as u8)
}

lazy_static! {
    /// Reverse lookup indexed by `hash_representation`; 0 means "absent".
    static ref REVERSE_HASH_TABLE: [u8; 256] = {
        let mut table = [0u8; 256];
        for (&ch, &rep) in MORSE.entries() {
            if let Some(h) = hash_representation(rep) {
                table[h as usize] = ch as u8;
            }
        }
        table
    };
}

/// Forward lookup: character -> representation.
pub fn character_to_representation(c: char) -> Option<&'static str> {
    MORSE.get(&c.to_ascii_uppercase()).copied()
}

/// Reverse lookup via the hash table.
pub fn representation_to_character(rep: &str) -> Option<char> {
    if !representation_is_valid(rep) {
        return None;
    }
    let hash = hash_representation(rep)?;
    let ch = REVERSE_HASH_TABLE[hash as usize];
    if ch == 0 {
        None
    } else {
        Some(ch as char)
    }
}

/// Linear-scan reverse lookup, used only to cross-check the hash table.
fn representation_to_character_linear(rep: &str) -> Option<char> {
    MORSE.entries().find(|(_, &v)| v == rep).map(|(&k, _)| k)
}

pub fn character_is_valid(c: char) -> bool {
    MORSE.contains_key(&c.to_ascii_uppercase())
}

pub fn string_is_valid(s: &str) -> bool {
    s.chars().all(character_is_valid)
}

pub fn representation_is_valid(rep: &str) -> bool {
    let len = rep.chars().count();
    len >= 1 && len <= MAX_REP_LEN && rep.chars().all(|c| c == '.' || c == '-')
}

/// All characters the table recognizes, sorted.
pub fn list_characters() -> String {
    let mut chars: Vec<char> = MORSE.keys().copied().collect();
    chars.sort_unstable();
    chars.into_iter().collect()
}

pub fn character_count() -> usize {
    MORSE.len()
}

pub fn lookup_procedural(c: char) -> Option<(&'static str, bool)> {
    PROCEDURAL.get(&c.to_ascii_uppercase()).copied()
}

pub fn lookup_phonetic(c: char) -> Option<&'static str> {
    PHONETIC.get(&c.to_ascii_uppercase()).copied()
}

/// Converts text to a space-separated string of representations, as the
/// reference CLI's text-output mode uses it.
pub fn text_to_morse(text: &str) -> CwResult<String> {
    let mut out = String::new();
    for ch in text.chars() {
        if ch == ' ' || ch == '\n' || ch == '\r' {
            continue;
        }
        match character_to_representation(ch) {
            Some(rep) => {
                out.push_str(rep);
                out.push(' ');
            }
            None => return Err(CwError::InvalidCharacter(ch)),
        }
    }
    Ok(out.trim().to_string())
}

// ---------- Practice Mode Content -------------------------------------------
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PracticeMode {
    RandomWords,
    Callsigns,
    QCodes,
    Numbers,
    Custom,
}

impl PracticeMode {
    pub fn get_content(&self, custom_text: Option<&str>) -> Vec<String> {
        match self {
            PracticeMode::RandomWords => [
                "THE", "QUICK", "BROWN", "FOX", "JUMPS", "OVER", "LAZY", "DOG",
                "PARIS", "CODEX", "MORSE", "HAM", "RADIO", "SIGNAL", "CODE",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            PracticeMode::Callsigns => [
                "W1AW", "K2ABC", "N3XYZ", "W4DEF", "K5GHI", "N6JKL", "W7MNO",
                "K8PQR", "N9STU", "VE3ABC", "G4HAM",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            PracticeMode::QCodes => [
                "QTH", "QRZ", "QSL", "QRM", "QRN", "QRP", "QRQ", "QRS", "QRT",
                "QRU", "QRV", "QSB", "QSY", "QSO",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            PracticeMode::Numbers => [
                "123", "456", "789", "012", "345", "678", "901", "234", "567",
                "890", "73", "88", "55",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            PracticeMode::Custom => {
                if let Some(text) = custom_text {
                    text.split_whitespace().map(|s| s.to_string()).collect()
                } else {
                    ["CQ", "DE", "TEST"].iter().map(|s| s.to_string()).collect()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_every_character() {
        for (&c, &rep) in MORSE.entries() {
            let got = representation_to_character(rep).expect("rep must resolve");
            assert_eq!(got, c, "roundtrip failed for {:?} -> {:?}", c, rep);
        }
    }

    #[test]
    fn hash_domain_is_2_to_255() {
        for &rep in MORSE.values() {
            let h = hash_representation(rep).unwrap();
            assert!((2..=255).contains(&h));
        }
    }

    #[test]
    fn hash_agrees_with_linear() {
        for &rep in MORSE.values() {
            assert_eq!(
                representation_to_character(rep),
                representation_to_character_linear(rep)
            );
        }
    }

    #[test]
    fn forward_table_is_injective() {
        let mut reps: Vec<&str> = MORSE.values().copied().collect();
        reps.sort_unstable();
        let mut deduped = reps.clone();
        deduped.dedup();
        assert_eq!(reps.len(), deduped.len(), "two characters share a representation");
    }

    #[test]
    fn rejects_malformed_representation() {
        assert!(representation_to_character("").is_none());
        assert!(representation_to_character("x").is_none());
        assert!(representation_to_character("........").is_none()); // length 8
        assert!(!representation_is_valid("-.-x"));
    }

    #[test]
    fn procedural_and_phonetic_lookup() {
        assert_eq!(lookup_procedural('+'), Some(("AR", true)));
        assert_eq!(lookup_procedural('Q'), None);
        assert_eq!(lookup_phonetic('a'), Some("Alpha"));
    }

    #[test]
    fn text_to_morse_conversion() {
        assert_eq!(text_to_morse("SOS").unwrap(), "... --- ...");
        assert_eq!(text_to_morse("AB").unwrap(), ".- -...");
    }

    #[test]
    fn text_to_morse_rejects_invalid() {
        assert!(text_to_morse("S\u{d6}S").is_err());
    }
}
