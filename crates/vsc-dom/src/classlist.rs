//! DOMTokenList (classList)

/// Space-separated token set backing `class`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DOMTokenList {
    tokens: Vec<String>,
}

impl DOMTokenList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from space-separated string
    pub fn from_string(s: &str) -> Self {
        let mut list = Self::new();
        for token in s.split_whitespace() {
            list.add(token);
        }
        list
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Add a token; returns true if the list changed
    pub fn add(&mut self, token: &str) -> bool {
        if token.is_empty() || self.contains(token) {
            return false;
        }
        self.tokens.push(token.to_string());
        true
    }

    /// Remove a token; returns true if the list changed
    pub fn remove(&mut self, token: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|t| t != token);
        before != self.tokens.len()
    }

    /// Toggle a token, returns whether it is now present
    pub fn toggle(&mut self, token: &str) -> bool {
        if !self.remove(token) {
            self.add(token);
            true
        } else {
            false
        }
    }

    /// Serialized `class` attribute value
    pub fn value(&self) -> String {
        self.tokens.join(" ")
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|s| s.as_str())
    }
}

impl std::fmt::Display for DOMTokenList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_dedups() {
        let list = DOMTokenList::from_string("vsc-controller  vsc-hidden vsc-controller");
        assert_eq!(list.len(), 2);
        assert_eq!(list.value(), "vsc-controller vsc-hidden");
    }

    #[test]
    fn test_add_remove_report_change() {
        let mut list = DOMTokenList::new();
        assert!(list.add("vsc-manual"));
        assert!(!list.add("vsc-manual"));
        assert!(list.remove("vsc-manual"));
        assert!(!list.remove("vsc-manual"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_toggle() {
        let mut list = DOMTokenList::new();
        assert!(list.toggle("vsc-hidden"));
        assert!(list.contains("vsc-hidden"));
        assert!(!list.toggle("vsc-hidden"));
        assert!(!list.contains("vsc-hidden"));
    }
}
