// Left-hand-side key patterns shared by the transform operations

/// One `|`-separated alternative of a spec key
#[derive(Debug, Clone, PartialEq)]
enum Alternative {
    Literal(String),
    /// Text fragments around each `*`; `a*b*c` becomes `["a", "b", "c"]`
    Glob(Vec<String>),
}

/// A spec key such as `rating`, `a|b`, `*` or `rating-*`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct KeyPattern {
    alternatives: Vec<Alternative>,
}

impl KeyPattern {
    pub(crate) fn parse(raw: &str) -> Self {
        let alternatives = raw
            .split('|')
            .map(|alt| {
                if alt.contains('*') {
                    Alternative::Glob(alt.split('*').map(str::to_string).collect())
                } else {
                    Alternative::Literal(alt.to_string())
                }
            })
            .collect();

        Self { alternatives }
    }

    /// True when no alternative contains a wildcard
    pub(crate) fn is_literal(&self) -> bool {
        self.alternatives
            .iter()
            .all(|alt| matches!(alt, Alternative::Literal(_)))
    }

    /// The literal keys this pattern names (empty for pure wildcards)
    pub(crate) fn literals(&self) -> impl Iterator<Item = &str> {
        self.alternatives.iter().filter_map(|alt| match alt {
            Alternative::Literal(key) => Some(key.as_str()),
            Alternative::Glob(_) => None,
        })
    }

    /// Match a key, returning the captures: index 0 is the whole key,
    /// then one entry per `*` in the matching alternative.
    pub(crate) fn captures(&self, key: &str) -> Option<Vec<String>> {
        self.alternatives.iter().find_map(|alt| match alt {
            Alternative::Literal(literal) if literal == key => Some(vec![key.to_string()]),
            Alternative::Literal(_) => None,
            Alternative::Glob(parts) => glob_captures(parts, key),
        })
    }

    pub(crate) fn matches(&self, key: &str) -> bool {
        self.captures(key).is_some()
    }

    /// Ordering weight for wildcards: more fixed text is more specific, bare `*` goes last
    pub(crate) fn specificity(&self) -> usize {
        self.alternatives
            .iter()
            .map(|alt| match alt {
                Alternative::Literal(key) => key.len(),
                Alternative::Glob(parts) => parts.iter().map(String::len).sum(),
            })
            .max()
            .unwrap_or(0)
    }
}

fn glob_captures(parts: &[String], key: &str) -> Option<Vec<String>> {
    let (first, rest) = parts.split_first()?;
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return (first == key).then(|| vec![key.to_string()]),
    };

    if !key.starts_with(first.as_str()) {
        return None;
    }
    let tail_start = key.len().checked_sub(last.len())?;
    if tail_start < first.len() || !key.ends_with(last.as_str()) {
        return None;
    }

    let mut captures = vec![key.to_string()];
    let mut pos = first.len();
    for fragment in middle {
        let window = &key[pos..tail_start];
        let found = window.find(fragment.as_str())?;
        captures.push(window[..found].to_string());
        pos += found + fragment.len();
    }
    captures.push(key[pos..tail_start].to_string());

    Some(captures)
}

/// Sort wildcard entries so the most specific pattern is tried first
pub(crate) fn order_wildcards<T>(entries: &mut [(KeyPattern, T)]) {
    entries.sort_by(|(a, _), (b, _)| b.specificity().cmp(&a.specificity()));
}
