use std::collections::HashSet;

/// Regular inflections of a single ASCII word, used to recognise the target in generated text.
#[derive(Debug, Clone)]
pub struct WordForms {
    forms: HashSet<String>,
}

impl WordForms {
    /// `None` for phrases or non-ASCII items; callers fall back to substring matching.
    pub fn build(word: &str) -> Option<Self> {
        let base = word.trim().to_ascii_lowercase();
        if base.is_empty() || !base.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        let mut forms = HashSet::new();
        forms.insert(base.clone());
        if base.len() > 1 {
            forms.insert(plural(&base));
            forms.insert(past(&base));
            forms.insert(progressive(&base));
            forms.extend(comparatives(&base));
        }
        Some(Self { forms })
    }

    pub fn contains(&self, token: &str) -> bool {
        self.forms.contains(&token.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

/// Lowercased alphabetic runs of `text`.
pub fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

/// How many times `item` (or one of its inflections) occurs in `text`.
pub fn occurrences(text: &str, item: &str) -> usize {
    match WordForms::build(item) {
        Some(forms) => tokens(text).filter(|t| forms.contains(t)).count(),
        None => {
            let target = item.trim().to_lowercase();
            if target.is_empty() {
                0
            } else {
                text.to_lowercase().matches(&target).count()
            }
        }
    }
}

pub fn contains_word_form(text: &str, item: &str) -> bool {
    occurrences(text, item) > 0
}

fn last_two(base: &str) -> (char, char) {
    let mut rev = base.chars().rev();
    let last = rev.next().unwrap_or_default();
    let prev = rev.next().unwrap_or_default();
    (last, prev)
}

fn stem(base: &str, drop: usize) -> &str {
    &base[..base.len() - drop]
}

fn plural(base: &str) -> String {
    let (last, prev) = last_two(base);
    if ["s", "x", "z", "ch", "sh", "o"].iter().any(|e| base.ends_with(e)) {
        format!("{base}es")
    } else if last == 'y' && !is_vowel(prev) {
        format!("{}ies", stem(base, 1))
    } else {
        format!("{base}s")
    }
}

fn past(base: &str) -> String {
    let (last, prev) = last_two(base);
    if last == 'e' {
        format!("{base}d")
    } else if last == 'y' && !is_vowel(prev) {
        format!("{}ied", stem(base, 1))
    } else if is_cvc(base) {
        format!("{base}{last}ed")
    } else {
        format!("{base}ed")
    }
}

fn progressive(base: &str) -> String {
    let (last, _) = last_two(base);
    if base.ends_with("ie") {
        format!("{}ying", stem(base, 2))
    } else if last == 'e' && !base.ends_with("ee") && !base.ends_with("ye") {
        format!("{}ing", stem(base, 1))
    } else if is_cvc(base) {
        format!("{base}{last}ing")
    } else {
        format!("{base}ing")
    }
}

fn comparatives(base: &str) -> [String; 2] {
    let (last, prev) = last_two(base);
    if last == 'e' {
        [format!("{base}r"), format!("{base}st")]
    } else if last == 'y' && !is_vowel(prev) {
        let s = stem(base, 1);
        [format!("{s}ier"), format!("{s}iest")]
    } else if is_cvc(base) {
        [format!("{base}{last}er"), format!("{base}{last}est")]
    } else {
        [format!("{base}er"), format!("{base}est")]
    }
}

pub(crate) fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

fn is_cvc(word: &str) -> bool {
    let chars: Vec<char> = word.chars().rev().take(3).collect();
    if word.len() < 3 || chars.len() < 3 {
        return false;
    }
    let (c1, c2, c3) = (chars[0], chars[1], chars[2]);
    !is_vowel(c1) && is_vowel(c2) && !is_vowel(c3) && !matches!(c1, 'w' | 'x' | 'y')
}
