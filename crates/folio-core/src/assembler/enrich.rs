//! Derived chunk metadata: counts, language guess and the OCR-quality heuristic.

/// Number of Unicode codepoints.
pub fn char_count(text: &str) -> u64 {
    text.chars().count() as u64
}

/// Number of maximal runs of letter/digit codepoints.
pub fn word_count(text: &str) -> u64 {
    let mut count = 0;
    let mut in_word = false;
    for c in text.chars() {
        let is_word = c.is_alphanumeric();
        if is_word && !in_word {
            count += 1;
        }
        in_word = is_word;
    }
    count
}

/// Best-effort ISO 639-1 code, or an empty string when undetermined.
pub fn detect_language(text: &str) -> String {
    whatlang::detect(text)
        .and_then(|info| iso639_1(info.lang().code()))
        .unwrap_or_default()
        .to_string()
}

/// 1.0 minus the share of non-whitespace codepoints outside ASCII, Cyrillic
/// and Latin script. All-whitespace text scores 1.0.
pub fn ocr_quality(text: &str) -> f64 {
    let mut total = 0usize;
    let mut foreign = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if !(c.is_ascii() || is_cyrillic(c) || is_latin(c)) {
            foreign += 1;
        }
    }
    if total == 0 {
        return 1.0;
    }
    (1.0 - foreign as f64 / total as f64).clamp(0.0, 1.0)
}

fn is_cyrillic(c: char) -> bool {
    matches!(c,
        '\u{0400}'..='\u{052F}'
        | '\u{1C80}'..='\u{1C8F}'
        | '\u{2DE0}'..='\u{2DFF}'
        | '\u{A640}'..='\u{A69F}')
}

fn is_latin(c: char) -> bool {
    matches!(c,
        '\u{00C0}'..='\u{00D6}'
        | '\u{00D8}'..='\u{00F6}'
        | '\u{00F8}'..='\u{024F}'
        | '\u{1E00}'..='\u{1EFF}'
        | '\u{2C60}'..='\u{2C7F}'
        | '\u{A720}'..='\u{A7FF}'
        | '\u{AB30}'..='\u{AB6F}')
}

fn iso639_1(code: &str) -> Option<&'static str> {
    let two = match code {
        "eng" => "en",
        "rus" => "ru",
        "ukr" => "uk",
        "bel" => "be",
        "deu" => "de",
        "fra" => "fr",
        "spa" => "es",
        "por" => "pt",
        "ita" => "it",
        "nld" => "nl",
        "pol" => "pl",
        "ces" => "cs",
        "slk" => "sk",
        "slv" => "sl",
        "hrv" => "hr",
        "srp" => "sr",
        "bul" => "bg",
        "mkd" => "mk",
        "ron" => "ro",
        "hun" => "hu",
        "fin" => "fi",
        "swe" => "sv",
        "nob" => "nb",
        "dan" => "da",
        "est" => "et",
        "lav" => "lv",
        "lit" => "lt",
        "tur" => "tr",
        "ell" => "el",
        "heb" => "he",
        "yid" => "yi",
        "ara" => "ar",
        "pes" => "fa",
        "urd" => "ur",
        "hin" => "hi",
        "ben" => "bn",
        "mar" => "mr",
        "nep" => "ne",
        "pan" => "pa",
        "guj" => "gu",
        "ori" => "or",
        "tam" => "ta",
        "tel" => "te",
        "kan" => "kn",
        "mal" => "ml",
        "sin" => "si",
        "tha" => "th",
        "vie" => "vi",
        "ind" => "id",
        "jav" => "jv",
        "tgl" => "tl",
        "cmn" => "zh",
        "jpn" => "ja",
        "kor" => "ko",
        "kat" => "ka",
        "hye" => "hy",
        "amh" => "am",
        "aka" => "ak",
        "zul" => "zu",
        "sna" => "sn",
        "epo" => "eo",
        "lat" => "la",
        "aze" => "az",
        "uzb" => "uz",
        "tuk" => "tk",
        "khm" => "km",
        "mya" => "my",
        "cat" => "ca",
        "afr" => "af",
        _ => return None,
    };
    Some(two)
}
