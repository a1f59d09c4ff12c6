/// String accumulator that tracks its length in codepoints.
#[derive(Debug, Default, Clone)]
pub(crate) struct Buffer {
    text: String,
    chars: usize,
}

impl Buffer {
    pub(crate) fn len(&self) -> usize {
        self.chars
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.chars == 0
    }

    #[cfg(test)]
    pub(crate) fn as_str(&self) -> &str {
        &self.text
    }

    pub(crate) fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
        self.chars += s.chars().count();
    }

    /// Move all of `other` onto the end of `self`, leaving `other` empty.
    pub(crate) fn append(&mut self, other: &mut Buffer) {
        self.text.push_str(&other.text);
        self.chars += other.chars;
        other.clear();
    }

    pub(crate) fn take(&mut self) -> String {
        self.chars = 0;
        std::mem::take(&mut self.text)
    }

    pub(crate) fn clear(&mut self) {
        self.text.clear();
        self.chars = 0;
    }

    pub(crate) fn trim_end(&mut self) {
        let keep = self.text.trim_end().len();
        self.chars -= self.text[keep..].chars().count();
        self.text.truncate(keep);
    }
}

impl From<&str> for Buffer {
    fn from(s: &str) -> Self {
        let mut buffer = Buffer::default();
        buffer.push_str(s);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_codepoints_not_bytes() {
        let mut b = Buffer::from("Привет");
        assert_eq!(b.len(), 6);
        b.push_str(" мир  ");
        assert_eq!(b.len(), 12);
        b.trim_end();
        assert_eq!(b.len(), 10);
        assert_eq!(b.as_str(), "Привет мир");
    }

    #[test]
    fn append_drains_source() {
        let mut a = Buffer::from("ab");
        let mut b = Buffer::from("cд");
        a.append(&mut b);
        assert_eq!(a.as_str(), "abcд");
        assert_eq!(a.len(), 4);
        assert!(b.is_empty());
        assert_eq!(b.as_str(), "");
    }
}
