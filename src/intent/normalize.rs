//! Question text normalization shared by the classifier and the extractors.

/// Lowercases, folds diacritics, and strips punctuation down to
/// space-separated alphanumeric tokens.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        for folded in fold_char(c) {
            if folded.is_ascii_alphanumeric() {
                out.push(folded);
            } else {
                out.push(' ');
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

/// Folds the Latin-1 accented characters that show up in Portuguese text.
fn fold_char(c: char) -> impl Iterator<Item = char> {
    let lower = c.to_lowercase();
    lower.map(|l| match l {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    })
}

/// A trigger term hits when every one of its words is a token of the text.
pub fn term_hits(term: &str, token_set: &[&str]) -> bool {
    term.split_whitespace().all(|word| token_set.contains(&word))
}
