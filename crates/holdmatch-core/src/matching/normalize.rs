/// Corporate suffix words dropped from company names.
const CORPORATE_SUFFIXES: [&str; 8] = ["inc", "corp", "ltd", "plc", "co", "group", "holdings", "hldgs"];

/// Canonical company name used by the name strategies.
///
/// Lowercases, removes ASCII punctuation except hyphens between two
/// alphanumerics, drops corporate suffix words and share-class markers
/// (`cl a`) after the first word, and collapses whitespace.
pub fn normalize_name(name: &str) -> String {
    let lowered: Vec<char> = name.to_lowercase().chars().collect();
    let cleaned: String = lowered
        .iter()
        .enumerate()
        .filter(|(index, ch)| !ch.is_ascii_punctuation() || is_inner_hyphen(&lowered, *index))
        .map(|(_, ch)| *ch)
        .collect();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let mut kept = Vec::with_capacity(tokens.len());
    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index];
        if index > 0 {
            if CORPORATE_SUFFIXES.contains(&token) {
                index += 1;
                continue;
            }
            if token == "cl" && tokens.get(index + 1).is_some_and(|next| is_class_letter(next)) {
                index += 2;
                continue;
            }
        }
        kept.push(token);
        index += 1;
    }

    kept.join(" ")
}

fn is_inner_hyphen(chars: &[char], index: usize) -> bool {
    let alnum = |position: Option<usize>| {
        position
            .and_then(|position| chars.get(position))
            .is_some_and(|ch| ch.is_alphanumeric())
    };
    chars[index] == '-' && alnum(index.checked_sub(1)) && alnum(Some(index + 1))
}

fn is_class_letter(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(ch), None) if ch.is_ascii_lowercase())
}
