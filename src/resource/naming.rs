//! English singular/plural forms and lower camel case for resource names.

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("ox", "oxen"),
    ("leaf", "leaves"),
    ("life", "lives"),
    ("knife", "knives"),
    ("wife", "wives"),
    ("half", "halves"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("criterion", "criteria"),
    ("datum", "data"),
];

const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "deer",
    "news",
    "media",
    "metadata",
    "feedback",
];

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Apply the casing of `original` to a lower-case replacement
fn restore_case(original: &str, replacement: &str) -> String {
    if original.chars().next().map_or(false, char::is_uppercase) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}

/// Split a name into the part that is inflected (the last word) and the rest
fn split_last_word(name: &str) -> (&str, &str) {
    let start = name
        .char_indices()
        .rev()
        .find(|(i, c)| {
            !c.is_alphanumeric()
                || (c.is_uppercase() && *i > 0)
        })
        .map(|(i, c)| if c.is_alphanumeric() { i } else { i + c.len_utf8() })
        .unwrap_or(0);
    name.split_at(start)
}

pub fn plural(name: &str) -> String {
    let (head, word) = split_last_word(name);
    format!("{}{}", head, plural_word(word))
}

pub fn singular(name: &str) -> String {
    let (head, word) = split_last_word(name);
    format!("{}{}", head, singular_word(word))
}

fn plural_word(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, many)) = IRREGULAR.iter().find(|(one, many)| *one == lower || *many == lower) {
        return restore_case(word, many);
    }

    let mut chars = lower.chars().rev();
    let last = chars.next().unwrap_or_default();
    let before = chars.next().unwrap_or_default();

    // already plural
    if last == 's' && !(lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is")) {
        word.to_string()
    } else if last == 'y' && !is_vowel(before) {
        format!("{}ies", &word[..word.len() - 1])
    } else if matches!(last, 's' | 'x' | 'z') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

fn singular_word(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((one, _)) = IRREGULAR.iter().find(|(one, many)| *many == lower || *one == lower) {
        return restore_case(word, one);
    }

    let cut = |n: usize| word[..word.len() - n].to_string();
    if lower.ends_with("ies") && lower.len() > 3 {
        format!("{}y", cut(3))
    } else if lower.ends_with("sses")
        || lower.ends_with("xes")
        || lower.ends_with("zes")
        || lower.ends_with("ches")
        || lower.ends_with("shes")
    {
        cut(2)
    } else if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        word.to_string()
    } else if lower.ends_with('s') && lower.len() > 1 {
        cut(1)
    } else {
        word.to_string()
    }
}

/// `Blog Post`, `blog_post`, `blog-post` and `BlogPost` all become `blogPost`
pub fn camel(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i == 0 {
                lower
            } else {
                let mut chars = lower.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        })
        .collect()
}
