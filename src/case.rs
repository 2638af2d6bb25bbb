//! Case conversion for derived URL segments: model names to kebab-case.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Lower,
    Upper,
    Digit,
}

fn kind(c: char) -> Option<Kind> {
    if c.is_ascii_digit() {
        Some(Kind::Digit)
    } else if c.is_uppercase() {
        Some(Kind::Upper)
    } else if c.is_alphanumeric() {
        Some(Kind::Lower)
    } else {
        None
    }
}

/// Split an identifier into words at separators, lower-to-upper transitions,
/// letter/digit transitions and the end of an acronym (`HTTPServer` -> `HTTP`, `Server`).
pub fn words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        let Some(k) = kind(c) else {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        };
        if let Some(prev) = current.chars().last().and_then(kind) {
            let next = chars.get(i + 1).copied().and_then(kind);
            let boundary = match (prev, k) {
                (Kind::Lower, Kind::Upper) => true,
                (Kind::Digit, Kind::Lower | Kind::Upper) | (Kind::Lower | Kind::Upper, Kind::Digit) => true,
                (Kind::Upper, Kind::Upper) => next == Some(Kind::Lower),
                _ => false,
            };
            if boundary {
                out.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// e.g. "Test1" -> "test-1", "modelName" -> "model-name", "HTTPServer" -> "http-server"
pub fn to_kebab_case(s: &str) -> String {
    words(s)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}
